//! In-memory identity directory that records every call.

use crate::directory::{
    DeleteTarget, IdentityDirectory, RESET_LINK_SENT, align_to_keys, disabled_attributes,
    email_not_found, filter_search, require_credentials, search_window
};
use crate::entity::LocalRecord;
use crate::mapper::AttributeMapper;
use crate::messages;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use errors::{IdentityError, IdentityResult};
use idp_core::{ActionCodeSettings, Attributes, Credentials, IdentityRecord, UserQuery};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRecord {
    pub method: String,
    pub arguments: Value,
    /// Position in the call log, starting at 0
    pub sequence: usize,
    pub at: DateTime<Utc>
}

/// Test double implementing [`IdentityDirectory`] over an insertion-ordered
/// in-memory record list.
///
/// It never fails at the transport level; a call is logged before the
/// result is returned, whatever the outcome.
#[derive(Default)]
pub struct FakeDirectory {
    records: Mutex<Vec<IdentityRecord>>,
    calls: Mutex<Vec<CallRecord>>
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds records without logging a call.
    pub fn with_records(records: impl IntoIterator<Item = IdentityRecord>) -> Self {
        let fake = Self::new();
        fake.records.lock().extend(records);
        fake
    }

    /// Chronological call log.
    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().clone()
    }

    pub fn method_names(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.method.clone()).collect()
    }

    pub fn called_times(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.method == method).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Fails unless `method` was called at least once.
    pub fn try_assert_called(&self, method: &str) -> Result<(), String> {
        if self.called_times(method) > 0 {
            Ok(())
        } else {
            Err(format!(
                "Expected [{method}] to be called, recorded calls: {:?}",
                self.method_names()
            ))
        }
    }

    /// Panics unless `method` was called at least once.
    pub fn assert_called(&self, method: &str) {
        if let Err(message) = self.try_assert_called(method) {
            panic!("{message}");
        }
    }

    pub fn assert_not_called(&self, method: &str) {
        let times = self.called_times(method);
        assert!(
            times == 0,
            "Expected [{method}] not to be called, but it was called {times} time(s)"
        );
    }

    fn record(&self, method: &str, arguments: Value) {
        let mut calls = self.calls.lock();
        let sequence = calls.len();
        calls.push(CallRecord {
            method: method.to_string(),
            arguments,
            sequence,
            at: Utc::now()
        });
    }

    fn lookup(&self, predicate: impl Fn(&IdentityRecord) -> bool) -> Option<IdentityRecord> {
        self.records.lock().iter().find(|r| predicate(r)).cloned()
    }

    fn insert(&self, attributes: &Attributes) -> IdentityResult<IdentityRecord> {
        let properties = AttributeMapper::to_properties(attributes)?;
        let key = properties
            .key
            .clone()
            .filter(|k| !k.is_empty())
            .unwrap_or_else(utils::generate_identity_key);

        let mut record = IdentityRecord::new(key);
        properties.apply_to(&mut record);

        let mut records = self.records.lock();
        match records.iter_mut().find(|r| r.key == record.key) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone())
        }
        Ok(record)
    }

    fn modify(
        &self,
        key: &str,
        attributes: &Attributes
    ) -> IdentityResult<Option<IdentityRecord>> {
        let properties = AttributeMapper::to_properties(attributes)?;
        let mut records = self.records.lock();
        Ok(records.iter_mut().find(|r| r.key == key).map(|record| {
            properties.apply_to(record);
            record.clone()
        }))
    }

    fn remove(&self, keys: &[String]) -> usize {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|r| !keys.contains(&r.key));
        before - records.len()
    }
}

fn redacted(attributes: &Attributes) -> Value {
    let mut shown = attributes.clone();
    if shown.contains_key("password") {
        shown.insert("password".to_string(), json!("<redacted>"));
    }
    Value::Object(shown)
}

#[async_trait]
impl IdentityDirectory for FakeDirectory {
    async fn find(&self, key: &str) -> IdentityResult<Option<IdentityRecord>> {
        self.record("find", json!([key]));
        Ok(self.lookup(|r| r.key == key))
    }

    async fn find_by_email(&self, email: &str) -> IdentityResult<Option<IdentityRecord>> {
        self.record("find_by_email", json!([email]));
        Ok(self.lookup(|r| r.email.as_deref() == Some(email)))
    }

    async fn find_by_phone(&self, phone: &str) -> IdentityResult<Option<IdentityRecord>> {
        self.record("find_by_phone", json!([phone]));
        Ok(self.lookup(|r| r.phone_number.as_deref() == Some(phone)))
    }

    async fn find_many(
        &self,
        keys: &[String],
        use_cache: bool
    ) -> IdentityResult<Vec<Option<IdentityRecord>>> {
        self.record("find_many", json!([keys, use_cache]));
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let records = self.records.lock().clone();
        Ok(align_to_keys(keys, records))
    }

    async fn create(&self, attributes: &Attributes) -> IdentityResult<IdentityRecord> {
        self.record("create", json!([redacted(attributes)]));
        self.insert(attributes)
    }

    async fn update(
        &self,
        key: &str,
        attributes: &Attributes
    ) -> IdentityResult<Option<IdentityRecord>> {
        self.record("update", json!([key, redacted(attributes)]));
        self.modify(key, attributes)
    }

    async fn upsert(
        &self,
        key: Option<&str>,
        attributes: &Attributes
    ) -> IdentityResult<IdentityRecord> {
        self.record("upsert", json!([key, redacted(attributes)]));
        if let Some(key) = key.filter(|k| !k.is_empty())
            && let Some(record) = self.modify(key, attributes)?
        {
            return Ok(record);
        }
        self.insert(attributes)
    }

    async fn delete(&self, target: DeleteTarget) -> IdentityResult<bool> {
        match target {
            DeleteTarget::One(key) => {
                self.record("delete", json!([key]));
                if key.is_empty() {
                    return Ok(false);
                }
                self.remove(std::slice::from_ref(&key));
                Ok(true)
            }
            DeleteTarget::Many(keys) => {
                self.record("delete", json!([keys]));
                Ok(self.remove(&keys) > 0)
            }
        }
    }

    async fn delete_all(&self) -> IdentityResult<usize> {
        self.record("delete_all", json!([]));
        let mut records = self.records.lock();
        let removed = records.len();
        records.clear();
        Ok(removed)
    }

    async fn update_password(&self, email: &str, password: &str) -> IdentityResult<IdentityRecord> {
        self.record("update_password", json!([email, "<redacted>"]));
        if password.is_empty() {
            return Err(IdentityError::validation(
                "password",
                "The password field is required."
            ));
        }
        self.lookup(|r| r.email.as_deref() == Some(email))
            .ok_or_else(|| email_not_found(email))
    }

    async fn query(&self, query: &UserQuery, use_cache: bool) -> IdentityResult<Vec<IdentityRecord>> {
        self.record("query", json!([query, use_cache]));
        let records = self.records.lock().clone();
        Ok(query.apply(records))
    }

    async fn all(&self) -> IdentityResult<Vec<IdentityRecord>> {
        self.record("all", json!([]));
        Ok(self.records.lock().clone())
    }

    async fn count(&self) -> IdentityResult<usize> {
        self.record("count", json!([]));
        Ok(self.records.lock().len())
    }

    async fn search(
        &self,
        term: &str,
        offset: i64,
        limit: i64,
        use_cache: bool
    ) -> IdentityResult<Vec<IdentityRecord>> {
        self.record("search", json!([term, offset, limit, use_cache]));
        let page = search_window(offset, limit).apply(self.records.lock().clone());
        Ok(filter_search(page, term))
    }

    async fn send_reset_link(&self, email: &str) -> IdentityResult<&'static str> {
        self.record("send_reset_link", json!([email]));
        Ok(RESET_LINK_SENT)
    }

    async fn send_verification_email(
        &self,
        record: &LocalRecord,
        settings: ActionCodeSettings
    ) -> IdentityResult<()> {
        self.record(
            "send_verification_email",
            json!([{"key": record.key(), "email": record.email()}, settings])
        );
        Ok(())
    }

    fn message(&self, code: &str, default: Option<&str>) -> String {
        self.record("message", json!([code, default]));
        messages::message(code, default)
    }

    async fn check(&self, email: &str, password: &str) -> bool {
        self.record("check", json!([email, "<redacted>"]));
        !email.is_empty() && !password.is_empty()
    }

    async fn attempt(&self, credentials: &Credentials) -> IdentityResult<Option<IdentityRecord>> {
        self.record("attempt", json!([{"email": credentials.email}]));
        let (email, _) = require_credentials(credentials)?;
        Ok(self.lookup(|r| r.email.as_deref() == Some(email)))
    }

    async fn enable(&self, key: &str) -> IdentityResult<Option<IdentityRecord>> {
        self.record("enable", json!([key]));
        self.modify(key, &disabled_attributes(false))
    }

    async fn disable(&self, key: &str) -> IdentityResult<Option<IdentityRecord>> {
        self.record("disable", json!([key]));
        self.modify(key, &disabled_attributes(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(value: Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_call_log_is_chronological() {
        let fake = FakeDirectory::new();
        fake.create(&attrs(json!({"uid": "u1"}))).await.unwrap();
        fake.find("u1").await.unwrap();
        fake.find_many(&["u1".to_string()], true).await.unwrap();

        let calls = fake.calls();
        assert_eq!(fake.method_names(), vec!["create", "find", "find_many"]);
        assert_eq!(
            calls.iter().map(|c| c.sequence).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(calls[1].arguments, json!(["u1"]));
    }

    #[tokio::test]
    async fn test_assertions() {
        let fake = FakeDirectory::new();
        fake.count().await.unwrap();

        fake.assert_called("count");
        fake.assert_not_called("create");
        assert_eq!(fake.called_times("count"), 1);

        let err = fake.try_assert_called("never_called").unwrap_err();
        assert!(err.contains("never_called"));
        assert!(err.contains("count"));
    }

    #[tokio::test]
    #[should_panic(expected = "Expected [never_called] to be called")]
    async fn test_assert_called_panics() {
        FakeDirectory::new().assert_called("never_called");
    }

    #[tokio::test]
    async fn test_passwords_are_not_logged() {
        let fake = FakeDirectory::new();
        fake.create(&attrs(json!({"uid": "u1", "email": "a@ex.com", "password": "hunter2"})))
            .await
            .unwrap();
        fake.check("a@ex.com", "hunter2").await;

        let log = serde_json::to_string(&fake.calls()).unwrap();
        assert!(!log.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_create_without_key_generates_one() {
        let fake = FakeDirectory::new();
        let record = fake.create(&attrs(json!({"email": "n@ex.com"}))).await.unwrap();
        assert_eq!(record.key.len(), 28);
        assert_eq!(fake.find(&record.key).await.unwrap().unwrap().email.as_deref(), Some("n@ex.com"));
    }

    #[tokio::test]
    async fn test_create_applies_options_as_claims() {
        let fake = FakeDirectory::new();
        let record = fake
            .create(&attrs(json!({"uid": "c1", "options": {"role": "admin"}})))
            .await
            .unwrap();
        assert_eq!(record.custom_claims["role"], json!("admin"));
    }

    #[tokio::test]
    async fn test_seeded_records_are_not_logged() {
        let fake = FakeDirectory::with_records([IdentityRecord::new("s1")]);
        assert!(fake.calls().is_empty());
        assert_eq!(fake.count().await.unwrap(), 1);
    }
}
