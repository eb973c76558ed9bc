use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumString};

/// Loosely typed attribute bag, keyed by field name.
pub type Attributes = Map<String, Value>;

/// Canonical remote identity snapshot, owned by the directory.
///
/// The cache only ever holds read-only copies of this value; mutations go
/// through the directory and come back as a fresh record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    #[serde(alias = "uid")]
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, rename = "photoURL", skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub custom_claims: Attributes
}

impl IdentityRecord {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    /// Value of a field by its remote (directory) name.
    ///
    /// Returns `None` for absent optional fields and for names the record
    /// does not carry (e.g. `password`).
    pub fn field(&self, remote_name: &str) -> Option<Value> {
        match remote_name {
            "key" | "uid" => Some(Value::String(self.key.clone())),
            "displayName" => self.display_name.clone().map(Value::String),
            "email" => self.email.clone().map(Value::String),
            "phoneNumber" => self.phone_number.clone().map(Value::String),
            "photoURL" => self.photo_url.clone().map(Value::String),
            "disabled" => Some(Value::Bool(self.disabled)),
            "emailVerified" => Some(Value::Bool(self.email_verified)),
            "customClaims" => Some(Value::Object(self.custom_claims.clone())),
            _ => None
        }
    }

    /// Search predicate: case-insensitive substring match on display name and
    /// email, plain substring match on phone number. An empty term matches.
    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        if term.is_empty() {
            return true;
        }

        let contains_lower =
            |value: &Option<String>| value.as_deref().unwrap_or("").to_lowercase().contains(&term);

        contains_lower(&self.display_name)
            || contains_lower(&self.email)
            || self.phone_number.as_deref().unwrap_or("").contains(&term)
    }
}

/// Typed create/update payload in remote field names.
///
/// Unknown attribute names are ignored when parsing from an attribute bag.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProperties {
    #[serde(default, alias = "uid", skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(
        default,
        rename = "photoURL",
        alias = "photoUrl",
        skip_serializing_if = "Option::is_none"
    )]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_claims: Option<Attributes>
}

impl std::fmt::Debug for UserProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserProperties")
            .field("key", &self.key)
            .field("display_name", &self.display_name)
            .field("email", &self.email)
            .field("phone_number", &self.phone_number)
            .field("photo_url", &self.photo_url)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("disabled", &self.disabled)
            .field("email_verified", &self.email_verified)
            .field("custom_claims", &self.custom_claims)
            .finish()
    }
}

impl UserProperties {
    pub fn from_attributes(attributes: &Attributes) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(attributes.clone()))
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overlays the present fields onto `record`. The key is never touched.
    pub fn apply_to(&self, record: &mut IdentityRecord) {
        if let Some(display_name) = &self.display_name {
            record.display_name = Some(display_name.clone());
        }
        if let Some(email) = &self.email {
            record.email = Some(email.clone());
        }
        if let Some(phone_number) = &self.phone_number {
            record.phone_number = Some(phone_number.clone());
        }
        if let Some(photo_url) = &self.photo_url {
            record.photo_url = Some(photo_url.clone());
        }
        if let Some(disabled) = self.disabled {
            record.disabled = disabled;
        }
        if let Some(email_verified) = self.email_verified {
            record.email_verified = email_verified;
        }
        if let Some(claims) = &self.custom_claims {
            record.custom_claims = claims.clone();
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SortField {
    UserId,
    Name,
    UserEmail
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum FilterField {
    UserId,
    Email,
    PhoneNumber
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryFilter {
    pub field: FilterField,
    pub value: String
}

impl QueryFilter {
    pub fn matches(&self, record: &IdentityRecord) -> bool {
        match self.field {
            FilterField::UserId => record.key == self.value,
            FilterField::Email => record.email.as_deref() == Some(self.value.as_str()),
            FilterField::PhoneNumber => record.phone_number.as_deref() == Some(self.value.as_str())
        }
    }
}

/// Listing request against the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    #[serde(default)]
    pub offset: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub sort_by: Option<SortField>,
    #[serde(default)]
    pub descending: bool,
    #[serde(default)]
    pub filter: Option<QueryFilter>
}

impl UserQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn page(offset: u32, limit: u32) -> Self {
        Self {
            offset: Some(offset),
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, field: FilterField, value: impl Into<String>) -> Self {
        self.filter = Some(QueryFilter {
            field,
            value: value.into()
        });
        self
    }

    pub fn sorted_by(mut self, field: SortField, descending: bool) -> Self {
        self.sort_by = Some(field);
        self.descending = descending;
        self
    }

    /// Evaluates the query over an in-memory record set: filter, sort, then
    /// window by offset and limit.
    pub fn apply<I>(&self, records: I) -> Vec<IdentityRecord>
    where
        I: IntoIterator<Item = IdentityRecord>
    {
        let mut selected: Vec<IdentityRecord> = records
            .into_iter()
            .filter(|r| self.filter.as_ref().is_none_or(|f| f.matches(r)))
            .collect();

        if let Some(sort_by) = self.sort_by {
            selected.sort_by(|a, b| match sort_by {
                SortField::UserId => a.key.cmp(&b.key),
                SortField::Name => a.display_name.cmp(&b.display_name),
                SortField::UserEmail => a.email.cmp(&b.email)
            });
            if self.descending {
                selected.reverse();
            }
        }

        let offset = self.offset.unwrap_or(0) as usize;
        let limit = self.limit.map_or(usize::MAX, |l| l as usize);

        selected.into_iter().skip(offset).take(limit).collect()
    }
}

/// Out-of-band email request settings (password reset, verification).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionCodeSettings {
    #[serde(default, alias = "url", skip_serializing_if = "Option::is_none")]
    pub continue_url: Option<String>,
    #[serde(default)]
    pub can_handle_code_in_app: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_link_domain: Option<String>
}

impl ActionCodeSettings {
    pub fn with_continue_url(mut self, url: impl Into<String>) -> Self {
        self.continue_url = Some(url.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDeleteFailure {
    pub index: usize,
    pub key: String,
    pub message: String
}

/// Provider report for a batched delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDeleteOutcome {
    pub success_count: usize,
    pub failure_count: usize,
    pub failures: Vec<BatchDeleteFailure>
}

/// Email/password pair for a sign-in attempt.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: Option<String>,
    pub password: Option<String>
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            password: Some(password.into())
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(key: &str, name: &str, email: &str, phone: &str) -> IdentityRecord {
        IdentityRecord {
            key: key.to_string(),
            display_name: Some(name.to_string()),
            email: Some(email.to_string()),
            phone_number: Some(phone.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_identity_record_wire_names() {
        let mut r = record("u1", "Alpha", "a@ex.com", "+111");
        r.photo_url = Some("https://img/a.png".to_string());
        let json = serde_json::to_value(&r).unwrap();

        assert_eq!(json["key"], "u1");
        assert_eq!(json["displayName"], "Alpha");
        assert_eq!(json["phoneNumber"], "+111");
        assert_eq!(json["photoURL"], "https://img/a.png");
        assert_eq!(json["emailVerified"], false);

        let parsed: IdentityRecord = serde_json::from_value(json!({"uid": "u2"})).unwrap();
        assert_eq!(parsed.key, "u2");
        assert!(parsed.custom_claims.is_empty());
    }

    #[test]
    fn test_field_lookup_by_remote_name() {
        let r = record("u1", "Alpha", "a@ex.com", "+111");
        assert_eq!(r.field("displayName"), Some(json!("Alpha")));
        assert_eq!(r.field("photoURL"), None);
        assert_eq!(r.field("disabled"), Some(json!(false)));
        assert_eq!(r.field("customClaims"), Some(json!({})));
        assert_eq!(r.field("password"), None);
    }

    #[test]
    fn test_matches_search() {
        let r = record("u1", "Alpha", "Alpha@Ex.com", "+111");
        assert!(r.matches_search(""));
        assert!(r.matches_search("ALP"));
        assert!(r.matches_search("ex.COM"));
        assert!(r.matches_search("+11"));
        assert!(!r.matches_search("beta"));
    }

    #[test]
    fn test_user_properties_ignore_unknown_attributes() {
        let mut attrs = Attributes::new();
        attrs.insert("uid".to_string(), json!("u9"));
        attrs.insert("displayName".to_string(), json!("Nine"));
        attrs.insert("x".to_string(), json!("y"));

        let props = UserProperties::from_attributes(&attrs).unwrap();
        assert_eq!(props.key.as_deref(), Some("u9"));
        assert_eq!(props.display_name.as_deref(), Some("Nine"));
        assert!(props.email.is_none());
    }

    #[test]
    fn test_user_properties_apply_keeps_key() {
        let mut r = record("u1", "Alpha", "a@ex.com", "+111");
        let props = UserProperties {
            key: Some("other".to_string()),
            display_name: Some("Edited".to_string()),
            disabled: Some(true),
            ..Default::default()
        };
        props.apply_to(&mut r);

        assert_eq!(r.key, "u1");
        assert_eq!(r.display_name.as_deref(), Some("Edited"));
        assert_eq!(r.email.as_deref(), Some("a@ex.com"));
        assert!(r.disabled);
    }

    #[test]
    fn test_password_is_redacted_in_debug() {
        let props = UserProperties {
            password: Some("hunter2".to_string()),
            ..Default::default()
        };
        assert!(!format!("{props:?}").contains("hunter2"));
        assert!(!format!("{:?}", Credentials::new("a@ex.com", "hunter2")).contains("hunter2"));
    }

    #[test]
    fn test_query_apply_filters_sorts_and_windows() {
        let records = vec![
            record("c", "Gamma", "g@ex.com", "+3"),
            record("a", "Alpha", "a@ex.com", "+1"),
            record("b", "Beta", "b@ex.com", "+2"),
        ];

        let page = UserQuery::page(1, 1).sorted_by(SortField::UserId, false);
        let keys: Vec<_> = page.apply(records.clone()).into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec!["b"]);

        let by_email = UserQuery::all().with_filter(FilterField::Email, "g@ex.com");
        assert_eq!(by_email.apply(records.clone()).len(), 1);

        let desc = UserQuery::all().sorted_by(SortField::Name, true);
        assert_eq!(desc.apply(records)[0].key, "c");
    }

    #[test]
    fn test_sort_field_wire_names() {
        assert_eq!(SortField::UserEmail.as_ref(), "USER_EMAIL");
        assert_eq!(FilterField::PhoneNumber.as_ref(), "phoneNumber");
    }
}
