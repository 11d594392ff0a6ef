//! Storage driver contract.
//!
//! A [`Driver`] exposes find/insert/update/delete primitives per entity
//! kind. Query structs are partial-attribute filters: every `Some` field
//! must match, and a `Vec`-valued field means "attribute is one of these".
//!
//! `insert_*` methods return `Ok(false)` when a record with the same
//! primary or unique key already exists; callers turn that into
//! [`Error::AlreadyExists`](crate::error::Error::AlreadyExists) where it
//! matters.

mod memory;
mod query;
mod schema;
mod sqlite;

pub use memory::MemoryDriver;
pub use query::{AppQuery, DeploymentQuery, PackageQuery, UserQuery};
pub use sqlite::SqliteDriver;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::*;

#[async_trait]
pub trait Driver: Send + Sync {
    async fn init(&self) -> Result<()>;

    // User operations
    async fn find_user(&self, query: &UserQuery) -> Result<Option<User>>;
    async fn insert_user(&self, user: &User) -> Result<bool>;
    async fn update_user(&self, user: &User) -> Result<()>;

    // App operations
    async fn find_app(&self, query: &AppQuery) -> Result<Option<App>>;
    async fn find_apps(&self, query: &AppQuery) -> Result<Vec<App>>;
    async fn insert_app(&self, app: &App) -> Result<bool>;
    async fn update_app(&self, app: &App) -> Result<()>;
    /// Removes the app and, at the storage layer, its deployments.
    async fn delete_app(&self, id: &str) -> Result<bool>;

    // Deployment operations
    async fn find_deployment(&self, query: &DeploymentQuery) -> Result<Option<Deployment>>;
    async fn find_deployments(&self, query: &DeploymentQuery) -> Result<Vec<Deployment>>;
    async fn insert_deployment(&self, deployment: &Deployment) -> Result<bool>;
    /// Changes only the name; key and history are left as stored.
    async fn rename_deployment(&self, id: &str, name: &str) -> Result<()>;
    async fn delete_deployment(&self, id: &str) -> Result<bool>;
    /// Links a package into the deployment's history as the new head.
    async fn associate_package(&self, deployment_id: &str, package_id: &str) -> Result<()>;
    /// Drops exactly `package_ids` from the stored history in one write.
    /// Entries associated after the caller read the history survive.
    async fn dissociate_packages(
        &self,
        deployment_id: &str,
        package_ids: &[String],
    ) -> Result<()>;

    // Package operations
    async fn find_package(&self, query: &PackageQuery) -> Result<Option<Package>>;
    async fn find_packages(&self, query: &PackageQuery) -> Result<Vec<Package>>;
    async fn insert_package(&self, pkg: &Package) -> Result<bool>;
    async fn update_package(&self, pkg: &Package) -> Result<()>;
    async fn delete_packages(&self, query: &PackageQuery) -> Result<u64>;

    // Package content operations
    async fn find_content(&self, package_hash: &str) -> Result<Option<PackageContent>>;
    async fn insert_content(&self, content: &PackageContent) -> Result<bool>;

    // Metric operations
    async fn find_metrics(&self, deployment_key: &str) -> Result<Vec<Metric>>;
    async fn insert_metric(&self, metric: &Metric) -> Result<()>;

    // Client ratio operations
    async fn find_client_ratio(
        &self,
        client_unique_id: &str,
        package_hash: &str,
    ) -> Result<Option<ClientRatio>>;
    /// Creates or replaces the record for `(client_unique_id, package_hash)`.
    async fn upsert_client_ratio(&self, ratio: &ClientRatio) -> Result<()>;
}
