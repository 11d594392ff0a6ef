use std::collections::BTreeMap;

use futures::future::try_join_all;
use tracing::{debug, info, warn};

use super::DaoFactory;
use crate::driver::{AppQuery, DeploymentQuery, PackageQuery};
use crate::error::{Error, Result};
use crate::types::{
    App, AppUpdate, AppView, Deployment, DeploymentView, NewApp, NewDeployment,
};

impl DaoFactory {
    /// Creates the app, then each requested deployment in turn.
    ///
    /// Deployments are not created atomically with the app: if one fails,
    /// the app and the deployments created before it stay persisted.
    pub async fn create_app(&self, new_app: NewApp) -> Result<AppView> {
        let app = App::new(new_app.name, new_app.collaborators);
        if !self.driver.insert_app(&app).await? {
            return Err(Error::already_exists(format!("app {}", app.id)));
        }
        info!(app_id = %app.id, name = %app.name, "app created");

        let mut names = Vec::with_capacity(new_app.deployments.len());
        for (name, deployment) in &new_app.deployments {
            if let Err(e) = self.add_deployment(&app.id, name, deployment).await {
                warn!(
                    app_id = %app.id,
                    deployment = %name,
                    created = ?names,
                    "app left with partial deployments: {e}"
                );
                return Err(e);
            }
            names.push(name.clone());
        }

        Ok(AppView {
            app,
            deployments: names,
        })
    }

    /// Deletes the app if it exists. Deployments go with it only when the
    /// driver cascades; packages are never touched.
    pub async fn remove_app(&self, app_id: &str) -> Result<()> {
        if self.driver.find_app(&AppQuery::id(app_id)).await?.is_none() {
            return Ok(());
        }
        self.driver.delete_app(app_id).await?;
        info!(app_id, "app removed");
        Ok(())
    }

    /// Replaces name and collaborators wholesale.
    pub async fn update_app(&self, id: &str, update: AppUpdate) -> Result<App> {
        let mut app = self
            .driver
            .find_app(&AppQuery::id(id))
            .await?
            .ok_or_else(|| Error::not_found(format!("app {id}")))?;

        app.name = update.name;
        app.collaborators = update.collaborators;
        self.driver.update_app(&app).await?;
        info!(app_id = %app.id, "app updated");
        Ok(app)
    }

    pub async fn app_by_id(&self, id: &str) -> Result<Option<AppView>> {
        match self.driver.find_app(&AppQuery::id(id)).await? {
            Some(app) => self.app_view(app).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn apps_for_collaborator(&self, email: &str) -> Result<Vec<AppView>> {
        let apps = self
            .driver
            .find_apps(&AppQuery::collaborator(email))
            .await?;
        try_join_all(apps.into_iter().map(|app| self.app_view(app))).await
    }

    pub async fn app_for_collaborator(
        &self,
        email: &str,
        app_name: &str,
    ) -> Result<Option<AppView>> {
        let query = AppQuery::collaborator(email).name(app_name);
        match self.driver.find_app(&query).await? {
            Some(app) => self.app_view(app).await.map(Some),
            None => Ok(None),
        }
    }

    async fn app_view(&self, app: App) -> Result<AppView> {
        let deployments = self
            .driver
            .find_deployments(&DeploymentQuery::app(&app.id))
            .await?
            .into_iter()
            .map(|d| d.name)
            .collect();
        Ok(AppView { app, deployments })
    }

    pub async fn add_deployment(
        &self,
        app_id: &str,
        name: &str,
        new_deployment: &NewDeployment,
    ) -> Result<Deployment> {
        let deployment = Deployment::new(app_id, name, &new_deployment.key);
        if !self.driver.insert_deployment(&deployment).await? {
            return Err(Error::already_exists(format!(
                "deployment {name} or its key"
            )));
        }
        info!(app_id, deployment = name, "deployment added");
        Ok(deployment)
    }

    pub async fn remove_deployment(&self, app_id: &str, name: &str) -> Result<()> {
        let deployment = self
            .find_deployment_by_name(app_id, name)
            .await?
            .ok_or_else(|| Error::not_found(format!("deployment {name}")))?;

        self.driver.delete_deployment(&deployment.id).await?;
        info!(app_id, deployment = name, "deployment removed");
        Ok(())
    }

    /// Renames in place. Only the name is written, so key and history are
    /// kept even when a package is added concurrently.
    pub async fn rename_deployment(
        &self,
        app_id: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<Deployment> {
        let mut deployment = self
            .find_deployment_by_name(app_id, old_name)
            .await?
            .ok_or_else(|| Error::not_found(format!("deployment {old_name}")))?;

        self.driver
            .rename_deployment(&deployment.id, new_name)
            .await?;
        deployment.name = new_name.to_string();
        info!(app_id, from = old_name, to = new_name, "deployment renamed");
        Ok(deployment)
    }

    /// Resolves a deployment by key together with the package it
    /// currently serves (the head of its history).
    pub async fn deployment_for_key(&self, key: &str) -> Result<Option<DeploymentView>> {
        let Some(deployment) = self.driver.find_deployment(&DeploymentQuery::key(key)).await?
        else {
            return Ok(None);
        };

        let package = match deployment.current_package_id() {
            Some(id) => self.driver.find_package(&PackageQuery::id(id)).await?,
            None => None,
        };

        Ok(Some(DeploymentView {
            deployment,
            package,
        }))
    }

    /// Resolves every named deployment of an app concurrently. Any failed
    /// resolution fails the whole call.
    pub async fn deployments_by_app(
        &self,
        app_id: &str,
        names: &[String],
    ) -> Result<BTreeMap<String, DeploymentView>> {
        if names.is_empty() {
            return Ok(BTreeMap::new());
        }

        let deployments = self
            .driver
            .find_deployments(&DeploymentQuery::app(app_id).names(names.to_vec()))
            .await?;
        debug!(app_id, found = deployments.len(), "resolving deployments");

        let views = try_join_all(
            deployments
                .iter()
                .map(|d| self.deployment_for_key(&d.key)),
        )
        .await?;

        Ok(views
            .into_iter()
            .flatten()
            .map(|view| (view.deployment.name.clone(), view))
            .collect())
    }

    pub async fn deployment_by_app(
        &self,
        app_id: &str,
        name: &str,
    ) -> Result<Option<DeploymentView>> {
        match self.find_deployment_by_name(app_id, name).await? {
            Some(deployment) => self.deployment_for_key(&deployment.key).await,
            None => Ok(None),
        }
    }
}
