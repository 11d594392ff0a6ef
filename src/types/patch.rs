use serde::Deserialize;
use serde_json::{Map, Value};

use super::{AccessKey, Package, User};
use crate::error::Result;

/// Fields every access key carries in API projections.
pub const ACCESS_KEY_FIELDS: [&str; 8] = [
    "name",
    "id",
    "expires",
    "description",
    "lastAccess",
    "createdTime",
    "createdBy",
    "friendlyName",
];

/// Partial update of a user. Keys the user record does not declare are
/// dropped on deserialization; `id` cannot be patched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    pub email: Option<String>,
    pub name: Option<String>,
    pub access_keys: Option<Vec<AccessKey>>,
    pub linked_providers: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackagePatch {
    pub label: Option<String>,
    pub app_version: Option<String>,
    pub description: Option<String>,
    pub package_hash: Option<String>,
    pub is_mandatory: Option<bool>,
    pub rollout: Option<u8>,
    pub size: Option<i64>,
    pub release_method: Option<String>,
    pub released_by: Option<String>,
}

pub fn apply_user_patch(user: &User, patch: &UserPatch) -> User {
    User {
        id: user.id.clone(),
        email: patch.email.clone().unwrap_or_else(|| user.email.clone()),
        name: patch.name.clone().unwrap_or_else(|| user.name.clone()),
        access_keys: patch
            .access_keys
            .clone()
            .unwrap_or_else(|| user.access_keys.clone()),
        linked_providers: patch
            .linked_providers
            .clone()
            .unwrap_or_else(|| user.linked_providers.clone()),
    }
}

pub fn apply_package_patch(pkg: &Package, patch: &PackagePatch) -> Package {
    let mut next = pkg.clone();
    if let Some(label) = &patch.label {
        next.label = label.clone();
    }
    if let Some(app_version) = &patch.app_version {
        next.app_version = app_version.clone();
    }
    if let Some(description) = &patch.description {
        next.description = Some(description.clone());
    }
    if let Some(package_hash) = &patch.package_hash {
        next.package_hash = package_hash.clone();
    }
    if let Some(is_mandatory) = patch.is_mandatory {
        next.is_mandatory = is_mandatory;
    }
    if let Some(rollout) = patch.rollout {
        next.rollout = Some(rollout);
    }
    if let Some(size) = patch.size {
        next.size = Some(size);
    }
    if let Some(release_method) = &patch.release_method {
        next.release_method = Some(release_method.clone());
    }
    if let Some(released_by) = &patch.released_by {
        next.released_by = Some(released_by.clone());
    }
    next
}

/// Sets every listed field that is absent from `obj` to `null`.
pub fn default_null(obj: &mut Map<String, Value>, fields: &[&str]) {
    for field in fields {
        obj.entry(*field).or_insert(Value::Null);
    }
}

/// JSON projection of a user in which every access key lists all
/// [`ACCESS_KEY_FIELDS`].
pub fn user_projection(user: &User) -> Result<Value> {
    let mut value = serde_json::to_value(user)?;
    if let Some(keys) = value.get_mut("accessKeys").and_then(Value::as_array_mut) {
        for key in keys.iter_mut().filter_map(Value::as_object_mut) {
            default_null(key, &ACCESS_KEY_FIELDS);
        }
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NewPackage, NewUser};
    use serde_json::json;

    fn user() -> User {
        User::new(NewUser::new("dev@example.com", "Dev").with_access_key(AccessKey {
            name: Some("secret-token".to_string()),
            friendly_name: Some("laptop".to_string()),
            ..AccessKey::default()
        }))
    }

    #[test]
    fn test_apply_user_patch_overwrites_present_fields() {
        let original = user();
        let patch = UserPatch {
            name: Some("Renamed".to_string()),
            ..UserPatch::default()
        };
        let updated = apply_user_patch(&original, &patch);
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.email, original.email);
        assert_eq!(updated.id, original.id);
        assert_eq!(updated.access_keys, original.access_keys);
    }

    #[test]
    fn test_unknown_patch_keys_are_dropped() {
        let patch: UserPatch = serde_json::from_value(json!({
            "name": "Renamed",
            "id": "hijacked",
            "isAdmin": true,
        }))
        .unwrap();
        let original = user();
        let updated = apply_user_patch(&original, &patch);
        assert_eq!(updated.id, original.id);

        let projected = user_projection(&updated).unwrap();
        assert!(projected.get("isAdmin").is_none());
        assert_eq!(projected["name"], json!("Renamed"));
    }

    #[test]
    fn test_default_null_keeps_existing_values() {
        let mut obj = Map::new();
        obj.insert("name".to_string(), json!("kept"));
        default_null(&mut obj, &["name", "id"]);
        assert_eq!(obj["name"], json!("kept"));
        assert_eq!(obj["id"], Value::Null);
    }

    #[test]
    fn test_user_projection_fills_access_key_fields() {
        let projected = user_projection(&user()).unwrap();
        let key = projected["accessKeys"][0].as_object().unwrap();
        assert_eq!(key.len(), ACCESS_KEY_FIELDS.len());
        for field in ACCESS_KEY_FIELDS {
            assert!(key.contains_key(field), "missing {field}");
        }
        assert_eq!(key["name"], json!("secret-token"));
        assert_eq!(key["expires"], Value::Null);
        assert_eq!(key["friendlyName"], json!("laptop"));
    }

    #[test]
    fn test_apply_package_patch() {
        let pkg = Package::new(NewPackage::new("v1", "abc"));
        let patch = PackagePatch {
            is_mandatory: Some(true),
            rollout: Some(25),
            description: Some("hotfix".to_string()),
            ..PackagePatch::default()
        };
        let updated = apply_package_patch(&pkg, &patch);
        assert!(updated.is_mandatory);
        assert_eq!(updated.rollout, Some(25));
        assert_eq!(updated.description.as_deref(), Some("hotfix"));
        assert_eq!(updated.label, "v1");
        assert_eq!(updated.id, pkg.id);
        assert_eq!(updated.created, pkg.created);
    }
}
