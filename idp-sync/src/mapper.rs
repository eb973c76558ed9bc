//! Two-way dictionary between local field names and directory field names.

use errors::IdentityResult;
use idp_core::{Attributes, IdentityRecord, UserProperties};
use serde_json::Value;

use crate::error::invalid_attributes;

/// Local field name to directory field name.
pub const ATTRIBUTE_MAP: &[(&str, &str)] = &[
    ("name", "displayName"),
    ("email", "email"),
    ("phone", "phoneNumber"),
    ("avatar", "photoURL"),
    ("options", "customClaims"),
    ("disabled", "disabled"),
    ("password", "password"),
    ("emailVerified", "emailVerified")
];

pub struct AttributeMapper;

impl AttributeMapper {
    pub fn remote_name(local: &str) -> Option<&'static str> {
        ATTRIBUTE_MAP
            .iter()
            .find(|(l, _)| *l == local)
            .map(|(_, r)| *r)
    }

    pub fn local_name(remote: &str) -> Option<&'static str> {
        ATTRIBUTE_MAP
            .iter()
            .find(|(_, r)| *r == remote)
            .map(|(l, _)| *l)
    }

    /// Whether a local field is owned by the directory and must not be
    /// persisted locally.
    pub fn is_remote_owned(local: &str) -> bool {
        Self::remote_name(local).is_some()
    }

    /// Keeps only mapped fields and renames local names to directory names.
    ///
    /// Fields already carrying a directory name pass through unchanged, so
    /// the translation is idempotent; a local name wins over its directory
    /// counterpart when both are present.
    pub fn to_remote(local: &Attributes) -> Attributes {
        let mut remote = Attributes::new();
        for (name, value) in local {
            if Self::local_name(name).is_some() && Self::remote_name(name).is_none() {
                remote.insert(name.clone(), value.clone());
            }
        }
        for (local_name, remote_name) in ATTRIBUTE_MAP {
            if let Some(value) = local.get(*local_name) {
                remote.insert((*remote_name).to_string(), value.clone());
            }
        }
        remote
    }

    /// Drops every remote-owned field from a local attribute bag.
    pub fn strip_remote_owned(local: &Attributes) -> Attributes {
        local
            .iter()
            .filter(|(name, _)| !Self::is_remote_owned(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Parses a create/update payload given in local or directory names.
    ///
    /// The identity key may be supplied as `key` or `uid`; other unmapped
    /// fields are ignored.
    pub fn to_properties(attributes: &Attributes) -> IdentityResult<UserProperties> {
        let mut remote = Self::to_remote(attributes);
        for key_field in ["key", "uid"] {
            if let Some(key) = attributes.get(key_field) {
                remote.insert("key".to_string(), key.clone());
            }
        }
        UserProperties::from_attributes(&remote).map_err(|e| invalid_attributes(&e))
    }

    /// Reads a local field, preferring the directory snapshot when it carries
    /// a value and falling back to the local attributes otherwise.
    pub fn resolve(
        local_field: &str,
        identity: Option<&IdentityRecord>,
        local: &Attributes
    ) -> Option<Value> {
        Self::remote_name(local_field)
            .and_then(|remote| identity.and_then(|record| record.field(remote)))
            .filter(|value| !value.is_null())
            .or_else(|| local.get(local_field).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    fn local_shape() -> Attributes {
        attrs(json!({
            "name": "Alpha",
            "email": "a@ex.com",
            "phone": "+111",
            "avatar": "https://img/a.png",
            "options": {"role": "admin"},
            "disabled": false,
            "password": "secret",
            "emailVerified": true,
            "team_id": 4,
            "created_at": "2024-01-01"
        }))
    }

    #[test]
    fn test_to_remote_maps_and_drops() {
        let remote = AttributeMapper::to_remote(&local_shape());

        assert_eq!(
            remote,
            attrs(json!({
                "displayName": "Alpha",
                "email": "a@ex.com",
                "phoneNumber": "+111",
                "photoURL": "https://img/a.png",
                "customClaims": {"role": "admin"},
                "disabled": false,
                "password": "secret",
                "emailVerified": true
            }))
        );
    }

    #[test]
    fn test_to_remote_is_idempotent() {
        let once = AttributeMapper::to_remote(&local_shape());
        let twice = AttributeMapper::to_remote(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_to_remote_empty_and_unmapped() {
        assert!(AttributeMapper::to_remote(&Attributes::new()).is_empty());
        assert!(AttributeMapper::to_remote(&attrs(json!({"team_id": 1}))).is_empty());
    }

    #[test]
    fn test_local_name_wins_over_remote_name() {
        let remote =
            AttributeMapper::to_remote(&attrs(json!({"name": "Local", "displayName": "Remote"})));
        assert_eq!(remote["displayName"], json!("Local"));
    }

    #[test]
    fn test_strip_remote_owned() {
        let stripped = AttributeMapper::strip_remote_owned(&local_shape());
        assert_eq!(
            stripped,
            attrs(json!({"team_id": 4, "created_at": "2024-01-01"}))
        );
    }

    #[test]
    fn test_to_properties_accepts_both_namings() {
        let props = AttributeMapper::to_properties(&attrs(json!({
            "uid": "u1",
            "name": "Alpha",
            "phoneNumber": "+111",
            "options": {"tier": "gold"}
        })))
        .unwrap();

        assert_eq!(props.key.as_deref(), Some("u1"));
        assert_eq!(props.display_name.as_deref(), Some("Alpha"));
        assert_eq!(props.phone_number.as_deref(), Some("+111"));
        assert_eq!(props.custom_claims.unwrap()["tier"], json!("gold"));
    }

    #[test]
    fn test_to_properties_rejects_malformed_values() {
        let err = AttributeMapper::to_properties(&attrs(json!({"email": 42}))).unwrap_err();
        assert!(matches!(err, errors::IdentityError::Validation { .. }));
    }

    #[test]
    fn test_resolve_prefers_remote_then_local() {
        let local = attrs(json!({"name": "Local Name", "email": "local@ex.com", "team_id": 2}));
        let record = IdentityRecord {
            key: "u1".to_string(),
            display_name: Some("Remote Name".to_string()),
            ..Default::default()
        };

        assert_eq!(
            AttributeMapper::resolve("name", Some(&record), &local),
            Some(json!("Remote Name"))
        );
        assert_eq!(
            AttributeMapper::resolve("email", Some(&record), &local),
            Some(json!("local@ex.com"))
        );
        assert_eq!(
            AttributeMapper::resolve("name", None, &local),
            Some(json!("Local Name"))
        );
        assert_eq!(
            AttributeMapper::resolve("team_id", Some(&record), &local),
            Some(json!(2))
        );
        assert_eq!(AttributeMapper::resolve("avatar", Some(&record), &local), None);
    }
}
