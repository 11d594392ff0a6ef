use tracing::{info, warn};

use super::DaoFactory;
use crate::driver::{DeploymentQuery, PackageQuery};
use crate::error::{Error, Result};
use crate::types::{NewPackage, Package, PackagePatch, apply_package_patch};

/// Orders packages newest first by creation time.
pub fn sort_history(mut packages: Vec<Package>) -> Vec<Package> {
    packages.sort_by(|a, b| b.created.cmp(&a.created));
    packages
}

impl DaoFactory {
    /// Release history of a deployment, newest first.
    pub async fn history(&self, app_id: &str, deployment_name: &str) -> Result<Vec<Package>> {
        match self.find_deployment_by_name(app_id, deployment_name).await? {
            Some(deployment) => self.history_by_ids(&deployment.history).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn history_by_ids(&self, ids: &[String]) -> Result<Vec<Package>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let packages = self
            .driver
            .find_packages(&PackageQuery::ids(ids.to_vec()))
            .await?;
        Ok(sort_history(packages))
    }

    /// Removes the deployment's current history entries, then deletes
    /// their packages. Packages associated meanwhile stay in the history.
    /// A failed delete leaves orphan packages, never dangling history ids.
    pub async fn clear_history(&self, app_id: &str, deployment_name: &str) -> Result<()> {
        let Some(deployment) = self.find_deployment_by_name(app_id, deployment_name).await? else {
            return Ok(());
        };
        if deployment.history.is_empty() {
            return Ok(());
        }

        self.driver
            .dissociate_packages(&deployment.id, &deployment.history)
            .await?;
        let removed = self
            .driver
            .delete_packages(&PackageQuery::ids(deployment.history))
            .await?;
        info!(app_id, deployment = deployment_name, removed, "history cleared");
        Ok(())
    }

    pub async fn history_label(
        &self,
        app_id: &str,
        deployment_name: &str,
        label: &str,
    ) -> Result<Option<Package>> {
        let Some(deployment) = self.find_deployment_by_name(app_id, deployment_name).await? else {
            return Ok(None);
        };
        if deployment.history.is_empty() {
            return Ok(None);
        }
        self.driver
            .find_package(&PackageQuery::ids(deployment.history).label(label))
            .await
    }

    /// Saves a package and makes it the head of the deployment's history.
    ///
    /// The save and the association are separate writes. If associating
    /// fails, the saved package is deleted again before the error is
    /// returned; a failing delete leaves an orphan package behind.
    pub async fn add_package(&self, deployment_key: &str, value: NewPackage) -> Result<Package> {
        let deployment = self
            .driver
            .find_deployment(&DeploymentQuery::key(deployment_key))
            .await?
            .ok_or_else(|| Error::not_found(format!("Can not find deployment {deployment_key}.")))?;

        let pkg = Package::new(value);
        if !self.driver.insert_package(&pkg).await? {
            return Err(Error::already_exists(format!("package {}", pkg.id)));
        }

        if let Err(e) = self.driver.associate_package(&deployment.id, &pkg.id).await {
            warn!(package_id = %pkg.id, deployment = %deployment.name, "association failed: {e}");
            if let Err(cleanup) = self
                .driver
                .delete_packages(&PackageQuery::id(pkg.id.clone()))
                .await
            {
                warn!(package_id = %pkg.id, "orphan package left behind: {cleanup}");
            }
            return Err(e);
        }

        info!(
            package_id = %pkg.id,
            label = %pkg.label,
            deployment = %deployment.name,
            "package added"
        );
        Ok(pkg)
    }

    /// Patches a package in the deployment's history. Without a label the
    /// history must hold exactly one package.
    pub async fn update_package(
        &self,
        deployment_key: &str,
        patch: &PackagePatch,
        label: Option<&str>,
    ) -> Result<Package> {
        let deployment = self
            .driver
            .find_deployment(&DeploymentQuery::key(deployment_key))
            .await?
            .ok_or_else(|| Error::not_found(format!("deployment {deployment_key}")))?;

        if deployment.history.is_empty() {
            return Err(Error::invalid_state(
                "can not update a package without history",
            ));
        }

        let query = match label {
            Some(label) => PackageQuery::ids(deployment.history).label(label),
            None if deployment.history.len() > 1 => {
                return Err(Error::invalid_state(format!(
                    "a label is required to pick one of {} packages",
                    deployment.history.len()
                )));
            }
            None => PackageQuery::ids(deployment.history),
        };

        let current = self
            .driver
            .find_package(&query)
            .await?
            .ok_or_else(|| Error::not_found(format!("package {}", label.unwrap_or("in history"))))?;

        let updated = apply_package_patch(&current, patch);
        self.driver.update_package(&updated).await?;
        info!(package_id = %updated.id, label = %updated.label, "package updated");
        Ok(updated)
    }

    pub async fn package_by_id(&self, id: &str) -> Result<Option<Package>> {
        if id.is_empty() {
            return Ok(None);
        }
        self.driver.find_package(&PackageQuery::id(id)).await
    }
}
