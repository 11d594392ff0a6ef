use serde_json::Value;
use tracing::info;

use super::DaoFactory;
use crate::driver::UserQuery;
use crate::error::{Error, Result};
use crate::types::{NewUser, User, UserPatch, apply_user_patch, user_projection};

impl DaoFactory {
    pub async fn create_user(&self, new_user: NewUser) -> Result<User> {
        let user = User::new(new_user);
        if !self.driver.insert_user(&user).await? {
            return Err(Error::already_exists(format!(
                "User already exists {}",
                user.email
            )));
        }
        info!(user_id = %user.id, email = %user.email, "user created");
        Ok(user)
    }

    pub async fn user_by_id(&self, id: &str) -> Result<Option<User>> {
        self.driver.find_user(&UserQuery::id(id)).await
    }

    pub async fn user_by_access_key(&self, access_key: &str) -> Result<Option<User>> {
        self.driver
            .find_user(&UserQuery::access_key(access_key))
            .await
    }

    pub async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.driver.find_user(&UserQuery::email(email)).await
    }

    /// Merges `patch` into the user registered under `current_email` and
    /// returns the stored result as JSON, with every access key listing
    /// all of its fields.
    pub async fn update_user(&self, current_email: &str, patch: &UserPatch) -> Result<Value> {
        let user = self
            .user_by_email(current_email)
            .await?
            .ok_or_else(|| Error::not_found(format!("user {current_email}")))?;

        let updated = apply_user_patch(&user, patch);
        self.driver.update_user(&updated).await?;
        info!(user_id = %updated.id, "user updated");

        user_projection(&updated)
    }
}
