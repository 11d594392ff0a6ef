use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{generate_deployment_key, next_created};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub access_keys: Vec<AccessKey>,
    #[serde(default)]
    pub linked_providers: Vec<String>,
}

impl User {
    pub fn new(new_user: NewUser) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: new_user.email,
            name: new_user.name,
            access_keys: new_user.access_keys,
            linked_providers: new_user.linked_providers,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub access_keys: Vec<AccessKey>,
    #[serde(default)]
    pub linked_providers: Vec<String>,
}

impl NewUser {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            access_keys: Vec::new(),
            linked_providers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_access_key(mut self, key: AccessKey) -> Self {
        self.access_keys.push(key);
        self
    }
}

/// Credential attached to a user. `name` holds the secret token clients
/// present; every other field is descriptive.
///
/// Unset fields are omitted in storage and filled with `null` in API
/// projections (see [`super::user_projection`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKey {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_access: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollaboratorRole {
    Owner,
    Collaborator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    pub id: String,
    pub name: String,
    /// Keyed by collaborator email.
    pub collaborators: BTreeMap<String, CollaboratorRole>,
}

impl App {
    pub fn new(name: impl Into<String>, collaborators: BTreeMap<String, CollaboratorRole>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            collaborators,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewApp {
    pub name: String,
    #[serde(default)]
    pub deployments: BTreeMap<String, NewDeployment>,
    #[serde(default)]
    pub collaborators: BTreeMap<String, CollaboratorRole>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppUpdate {
    pub name: String,
    pub collaborators: BTreeMap<String, CollaboratorRole>,
}

/// An app together with the names of its deployments, which are derived
/// from the deployment records rather than stored on the app.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppView {
    #[serde(flatten)]
    pub app: App,
    pub deployments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: String,
    pub app_id: String,
    pub name: String,
    pub key: String,
    /// Package ids, newest first.
    #[serde(rename = "history_", default)]
    pub history: Vec<String>,
}

impl Deployment {
    pub fn new(app_id: impl Into<String>, name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            app_id: app_id.into(),
            name: name.into(),
            key: key.into(),
            history: Vec::new(),
        }
    }

    #[must_use]
    pub fn current_package_id(&self) -> Option<&str> {
        self.history.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewDeployment {
    pub key: String,
}

impl NewDeployment {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// A deployment with a freshly generated key.
    #[must_use]
    pub fn generated() -> Self {
        Self {
            key: generate_deployment_key(),
        }
    }
}

/// What a deployment currently serves: the record plus its head package.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentView {
    #[serde(flatten)]
    pub deployment: Deployment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<Package>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    #[serde(rename = "id_")]
    pub id: String,
    pub label: String,
    pub app_version: String,
    #[serde(default)]
    pub description: Option<String>,
    pub package_hash: String,
    #[serde(default)]
    pub is_mandatory: bool,
    /// Percentage of clients that should receive this release.
    #[serde(default)]
    pub rollout: Option<u8>,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub release_method: Option<String>,
    #[serde(default)]
    pub original_label: Option<String>,
    #[serde(default)]
    pub original_deployment: Option<String>,
    #[serde(default)]
    pub released_by: Option<String>,
    #[serde(rename = "created_")]
    pub created: DateTime<Utc>,
}

impl Package {
    pub fn new(value: NewPackage) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            label: value.label,
            app_version: value.app_version,
            description: value.description,
            package_hash: value.package_hash,
            is_mandatory: value.is_mandatory,
            rollout: value.rollout,
            size: value.size,
            release_method: value.release_method,
            original_label: value.original_label,
            original_deployment: value.original_deployment,
            released_by: value.released_by,
            created: next_created(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPackage {
    pub label: String,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub description: Option<String>,
    pub package_hash: String,
    #[serde(default)]
    pub is_mandatory: bool,
    #[serde(default)]
    pub rollout: Option<u8>,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub release_method: Option<String>,
    #[serde(default)]
    pub original_label: Option<String>,
    #[serde(default)]
    pub original_deployment: Option<String>,
    #[serde(default)]
    pub released_by: Option<String>,
}

impl NewPackage {
    pub fn new(label: impl Into<String>, package_hash: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            package_hash: package_hash.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackageContent {
    pub package_hash: String,
    pub content: Bytes,
    /// Storage-layer concurrency marker; new content starts at 1.
    pub version: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricStatus {
    DeploymentSucceeded,
    DeploymentFailed,
    Downloaded,
}

impl MetricStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricStatus::DeploymentSucceeded => "DeploymentSucceeded",
            MetricStatus::DeploymentFailed => "DeploymentFailed",
            MetricStatus::Downloaded => "Downloaded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DeploymentSucceeded" => Some(MetricStatus::DeploymentSucceeded),
            "DeploymentFailed" => Some(MetricStatus::DeploymentFailed),
            "Downloaded" => Some(MetricStatus::Downloaded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub deployment_key: String,
    pub client_unique_id: String,
    #[serde(default)]
    pub label: Option<String>,
    pub status: MetricStatus,
    #[serde(default)]
    pub app_version: Option<String>,
    #[serde(default)]
    pub previous_label_or_app_version: Option<String>,
    #[serde(default)]
    pub previous_deployment_key: Option<String>,
}

/// Whether a client was updated last time it asked for a package under
/// staged rollout, and the rollout ratio in effect then.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRatio {
    pub client_unique_id: String,
    pub package_hash: String,
    pub ratio: f64,
    pub updated: bool,
}
