use async_trait::async_trait;
use errors::ProviderError;
use idp_core::{
    ActionCodeSettings, Attributes, BatchDeleteFailure, BatchDeleteOutcome, IdentityProvider,
    IdentityRecord, ProviderResult, UserProperties, UserQuery
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// In-memory [`IdentityProvider`] behaving like the remote service: absent
/// identities fail with `USER_NOT_FOUND`, duplicate emails with
/// `EMAIL_EXISTS`, wrong passwords with `INVALID_LOGIN_CREDENTIALS`.
///
/// Failures can be injected per method name with [`fail_next`], and every
/// call is counted per method name.
///
/// [`fail_next`]: MemoryIdentityProvider::fail_next
#[derive(Default)]
pub struct MemoryIdentityProvider {
    users: Mutex<Vec<IdentityRecord>>,
    passwords: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, ProviderError>>,
    sent_emails: Mutex<Vec<(String, String, ActionCodeSettings)>>,
    next_key: AtomicU32,
    claims_on_write: bool
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that takes custom claims on create/update directly.
    pub fn with_atomic_claims() -> Self {
        Self {
            claims_on_write: true,
            ..Self::default()
        }
    }

    pub fn seed(&self, record: IdentityRecord) {
        self.users.lock().push(record);
    }

    pub fn set_password(&self, key: &str, password: &str) {
        self.passwords
            .lock()
            .insert(key.to_string(), password.to_string());
    }

    /// Makes the next call to `method` fail with `error`.
    pub fn fail_next(&self, method: &str, error: ProviderError) {
        self.failures.lock().insert(method.to_string(), error);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == method).count()
    }

    pub fn users(&self) -> Vec<IdentityRecord> {
        self.users.lock().clone()
    }

    /// `(request type, email, settings)` of every out-of-band email sent.
    pub fn sent_emails(&self) -> Vec<(String, String, ActionCodeSettings)> {
        self.sent_emails.lock().clone()
    }

    fn enter(&self, method: &str) -> ProviderResult<()> {
        self.calls.lock().push(method.to_string());
        match self.failures.lock().remove(method) {
            Some(error) => Err(error),
            None => Ok(())
        }
    }

    fn find(&self, predicate: impl Fn(&IdentityRecord) -> bool, subject: &str) -> ProviderResult<IdentityRecord> {
        self.users
            .lock()
            .iter()
            .find(|u| predicate(u))
            .cloned()
            .ok_or_else(|| ProviderError::user_not_found(subject))
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn get_user(&self, key: &str) -> ProviderResult<IdentityRecord> {
        self.enter("get_user")?;
        self.find(|u| u.key == key, key)
    }

    async fn get_user_by_email(&self, email: &str) -> ProviderResult<IdentityRecord> {
        self.enter("get_user_by_email")?;
        self.find(|u| u.email.as_deref() == Some(email), email)
    }

    async fn get_user_by_phone(&self, phone: &str) -> ProviderResult<IdentityRecord> {
        self.enter("get_user_by_phone")?;
        self.find(|u| u.phone_number.as_deref() == Some(phone), phone)
    }

    async fn get_users(&self, keys: &[String]) -> ProviderResult<Vec<IdentityRecord>> {
        self.enter("get_users")?;
        Ok(self
            .users
            .lock()
            .iter()
            .filter(|u| keys.contains(&u.key))
            .rev()
            .cloned()
            .collect())
    }

    async fn create_user(&self, properties: &UserProperties) -> ProviderResult<IdentityRecord> {
        self.enter("create_user")?;
        if !self.claims_on_write && properties.custom_claims.is_some() {
            return Err(ProviderError::new("INVALID_CLAIMS", "claims are not accepted on create")
                .with_status(400));
        }

        let mut users = self.users.lock();
        if let Some(email) = &properties.email
            && users.iter().any(|u| u.email.as_ref() == Some(email))
        {
            return Err(ProviderError::new("EMAIL_EXISTS", "duplicate email").with_status(400));
        }

        let key = properties.key.clone().unwrap_or_else(|| {
            format!("generated-{}", self.next_key.fetch_add(1, Ordering::SeqCst))
        });
        if users.iter().any(|u| u.key == key) {
            return Err(ProviderError::new("DUPLICATE_LOCAL_ID", "duplicate key").with_status(400));
        }

        let mut record = IdentityRecord::new(key);
        properties.apply_to(&mut record);
        if let Some(password) = &properties.password {
            self.passwords
                .lock()
                .insert(record.key.clone(), password.clone());
        }
        users.push(record.clone());
        Ok(record)
    }

    async fn update_user(
        &self,
        key: &str,
        properties: &UserProperties
    ) -> ProviderResult<IdentityRecord> {
        self.enter("update_user")?;
        if !self.claims_on_write && properties.custom_claims.is_some() {
            return Err(ProviderError::new("INVALID_CLAIMS", "claims are not accepted on update")
                .with_status(400));
        }

        let mut users = self.users.lock();
        let user = users
            .iter_mut()
            .find(|u| u.key == key)
            .ok_or_else(|| ProviderError::user_not_found(key))?;
        properties.apply_to(user);
        if let Some(password) = &properties.password {
            self.passwords
                .lock()
                .insert(key.to_string(), password.clone());
        }
        Ok(user.clone())
    }

    async fn set_custom_claims(&self, key: &str, claims: &Attributes) -> ProviderResult<()> {
        self.enter("set_custom_claims")?;
        let mut users = self.users.lock();
        let user = users
            .iter_mut()
            .find(|u| u.key == key)
            .ok_or_else(|| ProviderError::user_not_found(key))?;
        user.custom_claims = claims.clone();
        Ok(())
    }

    async fn delete_user(&self, key: &str) -> ProviderResult<()> {
        self.enter("delete_user")?;
        let mut users = self.users.lock();
        let before = users.len();
        users.retain(|u| u.key != key);
        if users.len() == before {
            return Err(ProviderError::user_not_found(key));
        }
        Ok(())
    }

    async fn delete_users(
        &self,
        keys: &[String],
        force: bool
    ) -> ProviderResult<BatchDeleteOutcome> {
        self.enter("delete_users")?;
        let mut users = self.users.lock();
        let mut outcome = BatchDeleteOutcome::default();

        for (index, key) in keys.iter().enumerate() {
            let position = users.iter().position(|u| &u.key == key);
            match position {
                Some(position) if force || users[position].disabled => {
                    users.remove(position);
                    outcome.success_count += 1;
                }
                Some(_) => {
                    outcome.failure_count += 1;
                    outcome.failures.push(BatchDeleteFailure {
                        index,
                        key: key.clone(),
                        message: "NOT_DISABLED : Disable the account before batch deletion."
                            .to_string()
                    });
                }
                None => outcome.success_count += 1
            }
        }
        Ok(outcome)
    }

    async fn query_users(&self, query: &UserQuery) -> ProviderResult<Vec<IdentityRecord>> {
        self.enter("query_users")?;
        let users = self.users.lock().clone();
        Ok(query.apply(users))
    }

    async fn change_password(&self, key: &str, password: &str) -> ProviderResult<IdentityRecord> {
        self.enter("change_password")?;
        let user = self.find(|u| u.key == key, key)?;
        self.set_password(key, password);
        Ok(user)
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> ProviderResult<String> {
        self.enter("sign_in_with_password")?;
        let user = self
            .find(|u| u.email.as_deref() == Some(email), email)
            .map_err(|_| ProviderError::new("EMAIL_NOT_FOUND", email).with_status(400))?;

        match self.passwords.lock().get(&user.key) {
            Some(stored) if stored == password => Ok(user.key),
            _ => Err(ProviderError::new("INVALID_LOGIN_CREDENTIALS", email).with_status(400))
        }
    }

    async fn send_password_reset_link(
        &self,
        email: &str,
        settings: &ActionCodeSettings
    ) -> ProviderResult<()> {
        self.enter("send_password_reset_link")?;
        self.sent_emails.lock().push((
            "PASSWORD_RESET".to_string(),
            email.to_string(),
            settings.clone()
        ));
        Ok(())
    }

    async fn send_email_verification_link(
        &self,
        email: &str,
        settings: &ActionCodeSettings
    ) -> ProviderResult<()> {
        self.enter("send_email_verification_link")?;
        self.sent_emails.lock().push((
            "VERIFY_EMAIL".to_string(),
            email.to_string(),
            settings.clone()
        ));
        Ok(())
    }

    fn accepts_claims_on_write(&self) -> bool {
        self.claims_on_write
    }
}
