//! Local entity holding a foreign key into the identity space.

use crate::mapper::AttributeMapper;
use idp_core::{Attributes, IdentityRecord};
use serde_json::Value;

/// A local row plus the directory snapshot attached to it.
///
/// Reads through the named accessors ([`name`](Self::name),
/// [`email`](Self::email), ...) prefer the attached snapshot and fall back to
/// the local attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalRecord {
    key_name: String,
    attributes: Attributes,
    original: Attributes,
    identity: Option<IdentityRecord>,
    exists: bool
}

impl LocalRecord {
    pub fn new(key_name: impl Into<String>) -> Self {
        Self::with_attributes(key_name, Attributes::new())
    }

    /// A record not yet persisted; every attribute counts as dirty.
    pub fn with_attributes(key_name: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            key_name: key_name.into(),
            attributes,
            original: Attributes::new(),
            identity: None,
            exists: false
        }
    }

    /// A record loaded from the local store.
    pub fn from_row(key_name: impl Into<String>, row: Attributes) -> Self {
        Self {
            key_name: key_name.into(),
            original: row.clone(),
            attributes: row,
            identity: None,
            exists: true
        }
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    /// The identity key, when the key attribute holds a non-empty string.
    pub fn key(&self) -> Option<&str> {
        self.attributes
            .get(&self.key_name)
            .and_then(Value::as_str)
            .filter(|key| !key.is_empty())
    }

    pub fn set_key(&mut self, key: impl Into<String>) {
        self.attributes
            .insert(self.key_name.clone(), Value::String(key.into()));
    }

    /// Local primary key assigned by the store.
    pub fn id(&self) -> Option<i64> {
        self.attributes.get("id").and_then(Value::as_i64)
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub(crate) fn mark_exists(&mut self, exists: bool) {
        self.exists = exists;
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn get_attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }

    /// Attributes that differ from the last synced state.
    pub fn dirty(&self) -> Attributes {
        self.attributes
            .iter()
            .filter(|(name, value)| self.original.get(*name) != Some(*value))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty().is_empty()
    }

    /// Replaces the attributes wholesale, optionally marking them as synced.
    pub fn set_raw_attributes(&mut self, attributes: Attributes, sync: bool) {
        self.attributes = attributes;
        if sync {
            self.sync_original();
        }
    }

    pub fn sync_original(&mut self) {
        self.original = self.attributes.clone();
    }

    /// Removes remote-owned fields from the local attributes.
    pub fn strip_remote_owned(&mut self) {
        self.attributes = AttributeMapper::strip_remote_owned(&self.attributes);
    }

    pub fn identity(&self) -> Option<&IdentityRecord> {
        self.identity.as_ref()
    }

    pub fn has_identity(&self) -> bool {
        self.identity.is_some()
    }

    pub fn attach_identity(&mut self, identity: Option<IdentityRecord>) {
        self.identity = identity;
    }

    /// Field value with directory precedence; see [`AttributeMapper::resolve`].
    pub fn attribute(&self, local_field: &str) -> Option<Value> {
        AttributeMapper::resolve(local_field, self.identity.as_ref(), &self.attributes)
    }

    fn string_attribute(&self, local_field: &str) -> Option<String> {
        match self.attribute(local_field)? {
            Value::String(s) => Some(s),
            _ => None
        }
    }

    pub fn name(&self) -> Option<String> {
        self.string_attribute("name")
    }

    pub fn email(&self) -> Option<String> {
        self.string_attribute("email")
    }

    pub fn phone(&self) -> Option<String> {
        self.string_attribute("phone")
    }

    pub fn avatar(&self) -> Option<String> {
        self.string_attribute("avatar")
    }

    pub fn disabled(&self) -> bool {
        self.attribute("disabled")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn email_verified(&self) -> bool {
        self.attribute("emailVerified")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Custom claims (`options` locally, `customClaims` remotely).
    pub fn options(&self) -> Attributes {
        match self.attribute("options") {
            Some(Value::Object(map)) => map,
            _ => Attributes::new()
        }
    }
}
