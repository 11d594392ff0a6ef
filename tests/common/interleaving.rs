use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use ota_dao::dao::DaoFactory;
use ota_dao::driver::{
    AppQuery, DeploymentQuery, Driver, MemoryDriver, PackageQuery, SqliteDriver, UserQuery,
};
use ota_dao::error::{Error, Result};
use ota_dao::types::*;

/// Delegates to a real driver, but can slip in a history association
/// right before the next deployment write, or refuse associations.
pub struct InterleavingDriver {
    inner: Box<dyn Driver>,
    pending: Mutex<Option<(String, String)>>,
    fail_associate: AtomicBool,
}

impl InterleavingDriver {
    fn wrap(inner: impl Driver + 'static) -> Arc<Self> {
        Arc::new(Self {
            inner: Box::new(inner),
            pending: Mutex::new(None),
            fail_associate: AtomicBool::new(false),
        })
    }

    pub fn memory() -> Arc<Self> {
        Self::wrap(MemoryDriver::new())
    }

    pub fn sqlite() -> (Arc<Self>, TempDir) {
        let temp = TempDir::new().expect("create temp dir");
        let driver = SqliteDriver::new(temp.path().join("ota.db")).expect("open sqlite");
        (Self::wrap(driver), temp)
    }

    /// Associates `package_id` with the deployment just before the next
    /// rename or history removal reaches storage.
    pub fn associate_before_next_write(&self, deployment_id: &str, package_id: &str) {
        *self.pending.lock().unwrap() = Some((deployment_id.to_string(), package_id.to_string()));
    }

    pub fn fail_associations(&self) {
        self.fail_associate.store(true, Ordering::SeqCst);
    }

    async fn interleave(&self) -> Result<()> {
        let pending = self.pending.lock().unwrap().take();
        if let Some((deployment_id, package_id)) = pending {
            self.inner
                .associate_package(&deployment_id, &package_id)
                .await?;
        }
        Ok(())
    }
}

pub async fn dao_over(driver: &Arc<InterleavingDriver>) -> DaoFactory {
    super::init_tracing();
    let dao = DaoFactory::new(driver.clone());
    dao.init().await.expect("init driver");
    dao
}

#[async_trait]
impl Driver for InterleavingDriver {
    async fn init(&self) -> Result<()> {
        self.inner.init().await
    }

    async fn find_user(&self, query: &UserQuery) -> Result<Option<User>> {
        self.inner.find_user(query).await
    }

    async fn insert_user(&self, user: &User) -> Result<bool> {
        self.inner.insert_user(user).await
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        self.inner.update_user(user).await
    }

    async fn find_app(&self, query: &AppQuery) -> Result<Option<App>> {
        self.inner.find_app(query).await
    }

    async fn find_apps(&self, query: &AppQuery) -> Result<Vec<App>> {
        self.inner.find_apps(query).await
    }

    async fn insert_app(&self, app: &App) -> Result<bool> {
        self.inner.insert_app(app).await
    }

    async fn update_app(&self, app: &App) -> Result<()> {
        self.inner.update_app(app).await
    }

    async fn delete_app(&self, id: &str) -> Result<bool> {
        self.inner.delete_app(id).await
    }

    async fn find_deployment(&self, query: &DeploymentQuery) -> Result<Option<Deployment>> {
        self.inner.find_deployment(query).await
    }

    async fn find_deployments(&self, query: &DeploymentQuery) -> Result<Vec<Deployment>> {
        self.inner.find_deployments(query).await
    }

    async fn insert_deployment(&self, deployment: &Deployment) -> Result<bool> {
        self.inner.insert_deployment(deployment).await
    }

    async fn rename_deployment(&self, id: &str, name: &str) -> Result<()> {
        self.interleave().await?;
        self.inner.rename_deployment(id, name).await
    }

    async fn delete_deployment(&self, id: &str) -> Result<bool> {
        self.inner.delete_deployment(id).await
    }

    async fn associate_package(&self, deployment_id: &str, package_id: &str) -> Result<()> {
        if self.fail_associate.load(Ordering::SeqCst) {
            return Err(Error::invalid_state("association refused"));
        }
        self.inner.associate_package(deployment_id, package_id).await
    }

    async fn dissociate_packages(
        &self,
        deployment_id: &str,
        package_ids: &[String],
    ) -> Result<()> {
        self.interleave().await?;
        self.inner
            .dissociate_packages(deployment_id, package_ids)
            .await
    }

    async fn find_package(&self, query: &PackageQuery) -> Result<Option<Package>> {
        self.inner.find_package(query).await
    }

    async fn find_packages(&self, query: &PackageQuery) -> Result<Vec<Package>> {
        self.inner.find_packages(query).await
    }

    async fn insert_package(&self, pkg: &Package) -> Result<bool> {
        self.inner.insert_package(pkg).await
    }

    async fn update_package(&self, pkg: &Package) -> Result<()> {
        self.inner.update_package(pkg).await
    }

    async fn delete_packages(&self, query: &PackageQuery) -> Result<u64> {
        self.inner.delete_packages(query).await
    }

    async fn find_content(&self, package_hash: &str) -> Result<Option<PackageContent>> {
        self.inner.find_content(package_hash).await
    }

    async fn insert_content(&self, content: &PackageContent) -> Result<bool> {
        self.inner.insert_content(content).await
    }

    async fn find_metrics(&self, deployment_key: &str) -> Result<Vec<Metric>> {
        self.inner.find_metrics(deployment_key).await
    }

    async fn insert_metric(&self, metric: &Metric) -> Result<()> {
        self.inner.insert_metric(metric).await
    }

    async fn find_client_ratio(
        &self,
        client_unique_id: &str,
        package_hash: &str,
    ) -> Result<Option<ClientRatio>> {
        self.inner
            .find_client_ratio(client_unique_id, package_hash)
            .await
    }

    async fn upsert_client_ratio(&self, ratio: &ClientRatio) -> Result<()> {
        self.inner.upsert_client_ratio(ratio).await
    }
}
