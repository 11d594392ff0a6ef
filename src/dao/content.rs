use bytes::Bytes;
use tracing::info;

use super::DaoFactory;
use crate::error::{Error, Result};
use crate::types::PackageContent;

impl DaoFactory {
    /// Stores a bundle under its hash. Uploading a hash that is already
    /// stored fails with `AlreadyExists`, so each bundle is kept once.
    pub async fn upload(&self, package_hash: &str, content: impl Into<Bytes>) -> Result<()> {
        let content = PackageContent {
            package_hash: package_hash.to_string(),
            content: content.into(),
            version: 1,
        };

        if !self.driver.insert_content(&content).await? {
            return Err(Error::already_exists(format!("content {package_hash}")));
        }
        info!(package_hash, size = content.content.len(), "content uploaded");
        Ok(())
    }

    pub async fn download(&self, package_hash: &str) -> Result<Option<Bytes>> {
        Ok(self
            .driver
            .find_content(package_hash)
            .await?
            .map(|stored| stored.content))
    }
}
