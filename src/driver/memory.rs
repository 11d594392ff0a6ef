use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{AppQuery, DeploymentQuery, Driver, PackageQuery, UserQuery};
use crate::error::{Error, Result};
use crate::types::*;

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    apps: Vec<App>,
    deployments: Vec<Deployment>,
    packages: Vec<Package>,
    contents: BTreeMap<String, PackageContent>,
    metrics: Vec<Metric>,
    client_ratios: BTreeMap<(String, String), ClientRatio>,
}

/// Driver keeping every table in process memory. Rows keep insertion
/// order, matching the SQLite driver's `rowid` ordering.
#[derive(Default)]
pub struct MemoryDriver {
    tables: Mutex<Tables>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn replace<T: Clone>(rows: &mut [T], value: &T, same: impl Fn(&T) -> bool) -> bool {
    match rows.iter_mut().find(|row| same(row)) {
        Some(row) => {
            *row = value.clone();
            true
        }
        None => false,
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    // User operations

    async fn find_user(&self, query: &UserQuery) -> Result<Option<User>> {
        Ok(self
            .tables()
            .users
            .iter()
            .find(|u| query.matches(u))
            .cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<bool> {
        let mut tables = self.tables();
        if tables
            .users
            .iter()
            .any(|u| u.id == user.id || u.email == user.email)
        {
            return Ok(false);
        }
        tables.users.push(user.clone());
        Ok(true)
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let mut tables = self.tables();
        if tables
            .users
            .iter()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(Error::already_exists(format!("user {}", user.email)));
        }
        if !replace(&mut tables.users, user, |u| u.id == user.id) {
            return Err(Error::not_found(format!("user {}", user.id)));
        }
        Ok(())
    }

    // App operations

    async fn find_app(&self, query: &AppQuery) -> Result<Option<App>> {
        Ok(self
            .tables()
            .apps
            .iter()
            .find(|a| query.matches(a))
            .cloned())
    }

    async fn find_apps(&self, query: &AppQuery) -> Result<Vec<App>> {
        Ok(self
            .tables()
            .apps
            .iter()
            .filter(|a| query.matches(a))
            .cloned()
            .collect())
    }

    async fn insert_app(&self, app: &App) -> Result<bool> {
        let mut tables = self.tables();
        if tables.apps.iter().any(|a| a.id == app.id) {
            return Ok(false);
        }
        tables.apps.push(app.clone());
        Ok(true)
    }

    async fn update_app(&self, app: &App) -> Result<()> {
        if !replace(&mut self.tables().apps, app, |a| a.id == app.id) {
            return Err(Error::not_found(format!("app {}", app.id)));
        }
        Ok(())
    }

    async fn delete_app(&self, id: &str) -> Result<bool> {
        let mut tables = self.tables();
        let before = tables.apps.len();
        tables.apps.retain(|a| a.id != id);
        let removed = tables.apps.len() < before;
        if removed {
            tables.deployments.retain(|d| d.app_id != id);
        }
        Ok(removed)
    }

    // Deployment operations

    async fn find_deployment(&self, query: &DeploymentQuery) -> Result<Option<Deployment>> {
        Ok(self
            .tables()
            .deployments
            .iter()
            .find(|d| query.matches(d))
            .cloned())
    }

    async fn find_deployments(&self, query: &DeploymentQuery) -> Result<Vec<Deployment>> {
        Ok(self
            .tables()
            .deployments
            .iter()
            .filter(|d| query.matches(d))
            .cloned()
            .collect())
    }

    async fn insert_deployment(&self, deployment: &Deployment) -> Result<bool> {
        let mut tables = self.tables();
        if !tables.apps.iter().any(|a| a.id == deployment.app_id) {
            return Err(Error::not_found(format!("app {}", deployment.app_id)));
        }
        if tables.deployments.iter().any(|d| {
            d.id == deployment.id
                || d.key == deployment.key
                || (d.app_id == deployment.app_id && d.name == deployment.name)
        }) {
            return Ok(false);
        }
        tables.deployments.push(deployment.clone());
        Ok(true)
    }

    async fn rename_deployment(&self, id: &str, name: &str) -> Result<()> {
        let mut tables = self.tables();
        let app_id = tables
            .deployments
            .iter()
            .find(|d| d.id == id)
            .map(|d| d.app_id.clone())
            .ok_or_else(|| Error::not_found(format!("deployment {id}")))?;
        if tables
            .deployments
            .iter()
            .any(|d| d.id != id && d.app_id == app_id && d.name == name)
        {
            return Err(Error::already_exists(format!("deployment {name}")));
        }
        if let Some(deployment) = tables.deployments.iter_mut().find(|d| d.id == id) {
            deployment.name = name.to_string();
        }
        Ok(())
    }

    async fn delete_deployment(&self, id: &str) -> Result<bool> {
        let mut tables = self.tables();
        let before = tables.deployments.len();
        tables.deployments.retain(|d| d.id != id);
        Ok(tables.deployments.len() < before)
    }

    async fn associate_package(&self, deployment_id: &str, package_id: &str) -> Result<()> {
        let mut tables = self.tables();
        let deployment = tables
            .deployments
            .iter_mut()
            .find(|d| d.id == deployment_id)
            .ok_or_else(|| Error::not_found(format!("deployment {deployment_id}")))?;
        deployment.history.insert(0, package_id.to_string());
        Ok(())
    }

    async fn dissociate_packages(
        &self,
        deployment_id: &str,
        package_ids: &[String],
    ) -> Result<()> {
        let mut tables = self.tables();
        let deployment = tables
            .deployments
            .iter_mut()
            .find(|d| d.id == deployment_id)
            .ok_or_else(|| Error::not_found(format!("deployment {deployment_id}")))?;
        deployment.history.retain(|id| !package_ids.contains(id));
        Ok(())
    }

    // Package operations

    async fn find_package(&self, query: &PackageQuery) -> Result<Option<Package>> {
        Ok(self
            .tables()
            .packages
            .iter()
            .find(|p| query.matches(p))
            .cloned())
    }

    async fn find_packages(&self, query: &PackageQuery) -> Result<Vec<Package>> {
        Ok(self
            .tables()
            .packages
            .iter()
            .filter(|p| query.matches(p))
            .cloned()
            .collect())
    }

    async fn insert_package(&self, pkg: &Package) -> Result<bool> {
        let mut tables = self.tables();
        if tables.packages.iter().any(|p| p.id == pkg.id) {
            return Ok(false);
        }
        tables.packages.push(pkg.clone());
        Ok(true)
    }

    async fn update_package(&self, pkg: &Package) -> Result<()> {
        if !replace(&mut self.tables().packages, pkg, |p| p.id == pkg.id) {
            return Err(Error::not_found(format!("package {}", pkg.id)));
        }
        Ok(())
    }

    async fn delete_packages(&self, query: &PackageQuery) -> Result<u64> {
        let mut tables = self.tables();
        let before = tables.packages.len();
        tables.packages.retain(|p| !query.matches(p));
        Ok((before - tables.packages.len()) as u64)
    }

    // Package content operations

    async fn find_content(&self, package_hash: &str) -> Result<Option<PackageContent>> {
        Ok(self.tables().contents.get(package_hash).cloned())
    }

    async fn insert_content(&self, content: &PackageContent) -> Result<bool> {
        let mut tables = self.tables();
        if tables.contents.contains_key(&content.package_hash) {
            return Ok(false);
        }
        tables
            .contents
            .insert(content.package_hash.clone(), content.clone());
        Ok(true)
    }

    // Metric operations

    async fn find_metrics(&self, deployment_key: &str) -> Result<Vec<Metric>> {
        Ok(self
            .tables()
            .metrics
            .iter()
            .filter(|m| m.deployment_key == deployment_key)
            .cloned()
            .collect())
    }

    async fn insert_metric(&self, metric: &Metric) -> Result<()> {
        self.tables().metrics.push(metric.clone());
        Ok(())
    }

    // Client ratio operations

    async fn find_client_ratio(
        &self,
        client_unique_id: &str,
        package_hash: &str,
    ) -> Result<Option<ClientRatio>> {
        Ok(self
            .tables()
            .client_ratios
            .get(&(client_unique_id.to_string(), package_hash.to_string()))
            .cloned())
    }

    async fn upsert_client_ratio(&self, ratio: &ClientRatio) -> Result<()> {
        self.tables().client_ratios.insert(
            (ratio.client_unique_id.clone(), ratio.package_hash.clone()),
            ratio.clone(),
        );
        Ok(())
    }
}
