//! Identity Toolkit v1 REST transport.

use async_trait::async_trait;
use config::ProviderConfig;
use errors::ProviderError;
use idp_core::{
    ActionCodeSettings, Attributes, BatchDeleteFailure, BatchDeleteOutcome, FilterField,
    IdentityProvider, IdentityRecord, ProviderResult, UserProperties, UserQuery
};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, warn};

/// User as returned by `accounts:lookup` and `accounts:query`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUser {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    phone_number: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    #[serde(default)]
    email_verified: bool,
    #[serde(default)]
    disabled: bool,
    /// JSON-encoded claims object
    #[serde(default)]
    custom_attributes: Option<String>
}

impl WireUser {
    fn into_record(self) -> IdentityRecord {
        let custom_claims = self
            .custom_attributes
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Attributes>(raw).ok())
            .unwrap_or_default();

        IdentityRecord {
            key: self.local_id,
            display_name: self.display_name,
            email: self.email,
            phone_number: self.phone_number,
            photo_url: self.photo_url,
            disabled: self.disabled,
            email_verified: self.email_verified,
            custom_claims
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<WireUser>
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    user_info: Vec<WireUser>
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocalIdResponse {
    local_id: String
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchDeleteError {
    index: usize,
    #[serde(default)]
    local_id: Option<String>,
    #[serde(default)]
    message: String
}

#[derive(Debug, Default, Deserialize)]
struct BatchDeleteResponse {
    #[serde(default)]
    errors: Vec<BatchDeleteError>
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccountPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    local_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone_number: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    photo_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    disable_user: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_attributes: Option<String>
}

impl<'a> AccountPayload<'a> {
    fn from_properties(local_id: Option<&'a str>, properties: &'a UserProperties) -> Self {
        Self {
            local_id,
            email: properties.email.as_deref(),
            display_name: properties.display_name.as_deref(),
            phone_number: properties.phone_number.as_deref(),
            photo_url: properties.photo_url.as_deref(),
            password: properties.password.as_deref(),
            email_verified: properties.email_verified,
            disable_user: properties.disabled,
            custom_attributes: properties
                .custom_claims
                .as_ref()
                .map(|claims| Value::Object(claims.clone()).to_string())
        }
    }
}

fn transport_error(e: &reqwest::Error) -> ProviderError {
    ProviderError::new("NETWORK_ERROR", e.to_string())
}

/// [`IdentityProvider`] over the Identity Toolkit v1 REST API.
///
/// Admin endpoints are scoped to `projects/{project_id}` and authenticated
/// with the configured bearer token; password sign-in uses the web API key.
/// Rate-limited and 5xx responses are retried with exponential backoff.
pub struct IdentityToolkitProvider {
    client: Client,
    config: ProviderConfig
}

impl IdentityToolkitProvider {
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| transport_error(&e))?;

        Ok(Self { client, config })
    }

    fn project_url(&self, action: &str) -> String {
        format!(
            "{}/v1/projects/{}/{action}",
            self.config.base_url.trim_end_matches('/'),
            self.config.project_id
        )
    }

    /// Doubles from `initial_backoff_ms`, capped at `max_backoff_ms`.
    fn retry_strategy(&self) -> impl Iterator<Item = Duration> + use<> {
        let max_delay = Duration::from_millis(self.config.retry.max_backoff_ms);
        ExponentialBackoff::from_millis(2)
            .factor(self.config.retry.initial_backoff_ms.max(1))
            .map(move |delay| (delay / 2).min(max_delay))
            .take(self.config.retry.max_retries as usize)
    }

    async fn post<B, T>(&self, url: &str, body: &B) -> ProviderResult<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned
    {
        RetryIf::spawn(
            self.retry_strategy(),
            || self.post_once(url, body),
            |e: &ProviderError| {
                if e.is_retryable() {
                    warn!(code = %e.code, "Retrying identity provider request");
                }
                e.is_retryable()
            }
        )
        .await
    }

    async fn post_once<B, T>(&self, url: &str, body: &B) -> ProviderResult<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned
    {
        debug!(url = %url, "Making Identity Toolkit request");

        let mut request = self.client.post(url).json(body);
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| transport_error(&e))?;
        let status = response.status();

        if status.is_success() {
            return response.json::<T>().await.map_err(|e| {
                ProviderError::new("INVALID_RESPONSE", e.to_string()).with_status(status.as_u16())
            });
        }

        let body = response.text().await.unwrap_or_default();
        Err(error_from_body(status, &body))
    }

    async fn lookup(&self, field: &str, values: &[String]) -> ProviderResult<Vec<IdentityRecord>> {
        let response: LookupResponse = self
            .post(&self.project_url("accounts:lookup"), &json!({ field: values }))
            .await?;
        Ok(response.users.into_iter().map(WireUser::into_record).collect())
    }

    async fn lookup_one(&self, field: &str, value: &str) -> ProviderResult<IdentityRecord> {
        self.lookup(field, &[value.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::user_not_found(value))
    }
}

/// Translates an error response into a [`ProviderError`].
///
/// Identity Toolkit reports `{"error": {"message": "CODE : detail"}}`; the
/// whole message becomes the code so the detail survives for display.
fn error_from_body(status: StatusCode, body: &str) -> ProviderError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .ok()
        .filter(|message| !message.is_empty());

    let error = match message {
        Some(message) => ProviderError::new(message.clone(), message),
        None => ProviderError::new(
            status
                .canonical_reason()
                .unwrap_or("UNKNOWN")
                .to_uppercase()
                .replace(' ', "_"),
            body.to_string()
        )
    };
    error.with_status(status.as_u16())
}

fn query_body(query: &UserQuery) -> Value {
    let mut body = json!({ "returnUserInfo": true });
    if let Some(offset) = query.offset {
        body["offset"] = json!(offset.to_string());
    }
    if let Some(limit) = query.limit {
        body["limit"] = json!(limit.to_string());
    }
    if let Some(sort_by) = query.sort_by {
        body["sortBy"] = json!(sort_by.as_ref());
        body["order"] = json!(if query.descending { "DESC" } else { "ASC" });
    }
    if let Some(filter) = &query.filter {
        let field = match filter.field {
            FilterField::UserId => "userId",
            FilterField::Email => "email",
            FilterField::PhoneNumber => "phoneNumber"
        };
        body["expression"] = json!([{ field: filter.value }]);
    }
    body
}

fn oob_body(request_type: &str, email: &str, settings: &ActionCodeSettings) -> Value {
    let mut body = json!({
        "requestType": request_type,
        "email": email,
        "canHandleCodeInApp": settings.can_handle_code_in_app
    });
    if let Some(url) = &settings.continue_url {
        body["continueUrl"] = json!(url);
    }
    if let Some(domain) = &settings.dynamic_link_domain {
        body["dynamicLinkDomain"] = json!(domain);
    }
    body
}

#[async_trait]
impl IdentityProvider for IdentityToolkitProvider {
    async fn get_user(&self, key: &str) -> ProviderResult<IdentityRecord> {
        self.lookup_one("localId", key).await
    }

    async fn get_user_by_email(&self, email: &str) -> ProviderResult<IdentityRecord> {
        self.lookup_one("email", email).await
    }

    async fn get_user_by_phone(&self, phone: &str) -> ProviderResult<IdentityRecord> {
        self.lookup_one("phoneNumber", phone).await
    }

    async fn get_users(&self, keys: &[String]) -> ProviderResult<Vec<IdentityRecord>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.lookup("localId", keys).await
    }

    async fn create_user(&self, properties: &UserProperties) -> ProviderResult<IdentityRecord> {
        let payload = AccountPayload {
            custom_attributes: None,
            ..AccountPayload::from_properties(properties.key.as_deref(), properties)
        };
        let created: LocalIdResponse = self.post(&self.project_url("accounts"), &payload).await?;

        let mut record = IdentityRecord::new(created.local_id);
        let mut applied = properties.clone();
        applied.custom_claims = None;
        applied.apply_to(&mut record);
        Ok(record)
    }

    async fn update_user(
        &self,
        key: &str,
        properties: &UserProperties
    ) -> ProviderResult<IdentityRecord> {
        let payload = AccountPayload::from_properties(Some(key), properties);
        let _: Value = self
            .post(&self.project_url("accounts:update"), &payload)
            .await?;
        self.get_user(key).await
    }

    async fn set_custom_claims(&self, key: &str, claims: &Attributes) -> ProviderResult<()> {
        let payload = json!({
            "localId": key,
            "customAttributes": Value::Object(claims.clone()).to_string()
        });
        let _: Value = self
            .post(&self.project_url("accounts:update"), &payload)
            .await?;
        Ok(())
    }

    async fn delete_user(&self, key: &str) -> ProviderResult<()> {
        let _: Value = self
            .post(&self.project_url("accounts:delete"), &json!({ "localId": key }))
            .await?;
        Ok(())
    }

    async fn delete_users(
        &self,
        keys: &[String],
        force: bool
    ) -> ProviderResult<BatchDeleteOutcome> {
        if keys.is_empty() {
            return Ok(BatchDeleteOutcome::default());
        }
        let response: BatchDeleteResponse = self
            .post(
                &self.project_url("accounts:batchDelete"),
                &json!({ "localIds": keys, "force": force })
            )
            .await?;

        let failures: Vec<BatchDeleteFailure> = response
            .errors
            .into_iter()
            .map(|e| BatchDeleteFailure {
                key: e
                    .local_id
                    .or_else(|| keys.get(e.index).cloned())
                    .unwrap_or_default(),
                index: e.index,
                message: e.message
            })
            .collect();

        Ok(BatchDeleteOutcome {
            success_count: keys.len().saturating_sub(failures.len()),
            failure_count: failures.len(),
            failures
        })
    }

    async fn query_users(&self, query: &UserQuery) -> ProviderResult<Vec<IdentityRecord>> {
        let response: QueryResponse = self
            .post(&self.project_url("accounts:query"), &query_body(query))
            .await?;
        Ok(response
            .user_info
            .into_iter()
            .map(WireUser::into_record)
            .collect())
    }

    async fn change_password(&self, key: &str, password: &str) -> ProviderResult<IdentityRecord> {
        let _: Value = self
            .post(
                &self.project_url("accounts:update"),
                &json!({ "localId": key, "password": password })
            )
            .await?;
        self.get_user(key).await
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> ProviderResult<String> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::new("MISSING_API_KEY", "api_key is not configured"))?;

        let mut url = reqwest::Url::parse(&format!(
            "{}/v1/accounts:signInWithPassword",
            self.config.base_url.trim_end_matches('/')
        ))
        .map_err(|e| ProviderError::new("INVALID_BASE_URL", e.to_string()))?;
        url.query_pairs_mut().append_pair("key", api_key);

        let response: LocalIdResponse = self
            .post(
                url.as_str(),
                &json!({ "email": email, "password": password, "returnSecureToken": true })
            )
            .await?;
        Ok(response.local_id)
    }

    async fn send_password_reset_link(
        &self,
        email: &str,
        settings: &ActionCodeSettings
    ) -> ProviderResult<()> {
        let _: Value = self
            .post(
                &self.project_url("accounts:sendOobCode"),
                &oob_body("PASSWORD_RESET", email, settings)
            )
            .await?;
        Ok(())
    }

    async fn send_email_verification_link(
        &self,
        email: &str,
        settings: &ActionCodeSettings
    ) -> ProviderResult<()> {
        let _: Value = self
            .post(
                &self.project_url("accounts:sendOobCode"),
                &oob_body("VERIFY_EMAIL", email, settings)
            )
            .await?;
        Ok(())
    }
}
