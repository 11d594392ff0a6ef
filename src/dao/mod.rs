//! The orchestration layer over a storage [`Driver`].
//!
//! Multi-step operations (`create_app` with deployments, `add_package`
//! with history association) are sequences of independent driver calls.
//! A failure part way through is propagated to the caller; only
//! `add_package` attempts to undo its first write.

mod apps;
mod content;
mod history;
mod rollout;
mod users;

pub use history::sort_history;

use std::sync::Arc;

use crate::driver::{Driver, DeploymentQuery};
use crate::error::Result;
use crate::types::Deployment;

#[derive(Clone)]
pub struct DaoFactory {
    driver: Arc<dyn Driver>,
}

impl DaoFactory {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self { driver }
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Prepares the underlying storage (creates tables when missing).
    pub async fn init(&self) -> Result<()> {
        self.driver.init().await
    }

    async fn find_deployment_by_name(
        &self,
        app_id: &str,
        name: &str,
    ) -> Result<Option<Deployment>> {
        self.driver
            .find_deployment(&DeploymentQuery::app(app_id).name(name))
            .await
    }
}
