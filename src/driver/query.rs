use crate::types::{App, Deployment, Package, User};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserQuery {
    pub id: Option<String>,
    pub email: Option<String>,
    /// Matches users holding an access key with this token as its name.
    pub access_key: Option<String>,
}

impl UserQuery {
    pub fn id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Self::default()
        }
    }

    pub fn access_key(key: impl Into<String>) -> Self {
        Self {
            access_key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, user: &User) -> bool {
        self.id.as_ref().is_none_or(|id| *id == user.id)
            && self.email.as_ref().is_none_or(|email| *email == user.email)
            && self.access_key.as_ref().is_none_or(|key| {
                user.access_keys
                    .iter()
                    .any(|k| k.name.as_deref() == Some(key.as_str()))
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppQuery {
    pub id: Option<String>,
    pub name: Option<String>,
    pub collaborator: Option<String>,
}

impl AppQuery {
    pub fn id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn collaborator(email: impl Into<String>) -> Self {
        Self {
            collaborator: Some(email.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn matches(&self, app: &App) -> bool {
        self.id.as_ref().is_none_or(|id| *id == app.id)
            && self.name.as_ref().is_none_or(|name| *name == app.name)
            && self
                .collaborator
                .as_ref()
                .is_none_or(|email| app.collaborators.contains_key(email))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeploymentQuery {
    pub app_id: Option<String>,
    pub names: Option<Vec<String>>,
    pub key: Option<String>,
}

impl DeploymentQuery {
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn app(app_id: impl Into<String>) -> Self {
        Self {
            app_id: Some(app_id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn name(self, name: impl Into<String>) -> Self {
        self.names(vec![name.into()])
    }

    #[must_use]
    pub fn names(mut self, names: Vec<String>) -> Self {
        self.names = Some(names);
        self
    }

    pub fn matches(&self, deployment: &Deployment) -> bool {
        self.app_id
            .as_ref()
            .is_none_or(|app_id| *app_id == deployment.app_id)
            && self
                .names
                .as_ref()
                .is_none_or(|names| names.contains(&deployment.name))
            && self.key.as_ref().is_none_or(|key| *key == deployment.key)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageQuery {
    pub ids: Option<Vec<String>>,
    pub label: Option<String>,
}

impl PackageQuery {
    pub fn id(id: impl Into<String>) -> Self {
        Self::ids(vec![id.into()])
    }

    pub fn ids(ids: Vec<String>) -> Self {
        Self {
            ids: Some(ids),
            label: None,
        }
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn matches(&self, pkg: &Package) -> bool {
        self.ids.as_ref().is_none_or(|ids| ids.contains(&pkg.id))
            && self.label.as_ref().is_none_or(|label| *label == pkg.label)
    }
}
