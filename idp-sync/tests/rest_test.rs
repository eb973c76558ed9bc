use config::{ProviderConfig, RetryConfig};
use idp_core::{ActionCodeSettings, IdentityProvider, UserProperties, UserQuery};
use idp_sync::IdentityToolkitProvider;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROJECT: &str = "demo-project";

fn provider(server: &MockServer) -> IdentityToolkitProvider {
    let config = ProviderConfig {
        project_id: PROJECT.to_string(),
        api_key: Some("web-key".to_string()),
        access_token: Some("admin-token".to_string()),
        base_url: server.uri(),
        timeout_seconds: 5,
        retry: RetryConfig {
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 10
        }
    };
    IdentityToolkitProvider::new(config).unwrap()
}

fn project_path(action: &str) -> String {
    format!("/v1/projects/{PROJECT}/{action}")
}

fn error_body(message: &str) -> serde_json::Value {
    json!({"error": {"code": 400, "message": message}})
}

#[tokio::test]
async fn test_lookup_by_key_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(project_path("accounts:lookup")))
        .and(header("Authorization", "Bearer admin-token"))
        .and(body_partial_json(json!({"localId": ["u1"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": [{
                "localId": "u1",
                "email": "a@ex.com",
                "displayName": "Alpha",
                "customAttributes": "{\"role\":\"admin\"}"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let record = provider(&server).get_user("u1").await.unwrap();

    assert_eq!(record.key, "u1");
    assert_eq!(record.display_name.as_deref(), Some("Alpha"));
    assert_eq!(record.custom_claims["role"], "admin");
}

#[tokio::test]
async fn test_empty_lookup_is_user_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(project_path("accounts:lookup")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let err = provider(&server)
        .get_user_by_email("nobody@ex.com")
        .await
        .unwrap_err();

    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_create_maps_error_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(project_path("accounts")))
        .respond_with(ResponseTemplate::new(400).set_body_json(error_body("EMAIL_EXISTS")))
        .expect(1)
        .mount(&server)
        .await;

    let properties = UserProperties {
        email: Some("a@ex.com".to_string()),
        ..Default::default()
    };
    let err = provider(&server).create_user(&properties).await.unwrap_err();

    assert_eq!(err.code, "EMAIL_EXISTS");
    assert_eq!(err.status, Some(400));
}

#[tokio::test]
async fn test_create_returns_assigned_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(project_path("accounts")))
        .and(body_partial_json(json!({"email": "a@ex.com", "displayName": "Alpha"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"localId": "assigned"})))
        .mount(&server)
        .await;

    let properties = UserProperties {
        email: Some("a@ex.com".to_string()),
        display_name: Some("Alpha".to_string()),
        ..Default::default()
    };
    let record = provider(&server).create_user(&properties).await.unwrap();

    assert_eq!(record.key, "assigned");
    assert_eq!(record.email.as_deref(), Some("a@ex.com"));
}

#[tokio::test]
async fn test_unavailable_responses_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(project_path("accounts:delete")))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(project_path("accounts:delete")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    provider(&server).delete_user("u1").await.unwrap();
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(project_path("accounts:delete")))
        .respond_with(ResponseTemplate::new(400).set_body_json(error_body("USER_NOT_FOUND")))
        .expect(1)
        .mount(&server)
        .await;

    let err = provider(&server).delete_user("u1").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_batch_delete_reports_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(project_path("accounts:batchDelete")))
        .and(body_partial_json(json!({"localIds": ["a", "b", "c"], "force": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{"index": 1, "localId": "b", "message": "NOT_DISABLED"}]
        })))
        .mount(&server)
        .await;

    let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let outcome = provider(&server).delete_users(&keys, false).await.unwrap();

    assert_eq!(outcome.success_count, 2);
    assert_eq!(outcome.failure_count, 1);
    assert_eq!(outcome.failures[0].key, "b");
}

#[tokio::test]
async fn test_query_reads_user_info() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(project_path("accounts:query")))
        .and(body_partial_json(json!({"offset": "0", "limit": "2", "returnUserInfo": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "recordsCount": "2",
            "userInfo": [{"localId": "a"}, {"localId": "b", "disabled": true}]
        })))
        .mount(&server)
        .await;

    let records = provider(&server)
        .query_users(&UserQuery::page(0, 2))
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert!(records[1].disabled);
}

#[tokio::test]
async fn test_sign_in_uses_api_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/accounts:signInWithPassword"))
        .and(query_param("key", "web-key"))
        .and(body_partial_json(json!({"email": "a@ex.com", "password": "pw"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "localId": "u1",
            "idToken": "token"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/accounts:signInWithPassword"))
        .and(body_partial_json(json!({"password": "wrong"})))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(error_body("INVALID_LOGIN_CREDENTIALS"))
        )
        .mount(&server)
        .await;

    let provider = provider(&server);
    assert_eq!(
        provider.sign_in_with_password("a@ex.com", "pw").await.unwrap(),
        "u1"
    );

    let err = provider
        .sign_in_with_password("a@ex.com", "wrong")
        .await
        .unwrap_err();
    assert!(err.is_credential_rejection());
}

#[tokio::test]
async fn test_oob_code_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(project_path("accounts:sendOobCode")))
        .and(body_partial_json(json!({
            "requestType": "PASSWORD_RESET",
            "email": "a@ex.com",
            "continueUrl": "https://app.example.com/login"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"email": "a@ex.com"})))
        .expect(1)
        .mount(&server)
        .await;

    let settings = ActionCodeSettings::default().with_continue_url("https://app.example.com/login");
    provider(&server)
        .send_password_reset_link("a@ex.com", &settings)
        .await
        .unwrap();
}
