#![allow(clippy::unwrap_used)]
// Integration tests for `DeviceClient` using wiremock.

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use polsync_api::{
    Credentials, DeviceClient, Error, Location, LocationType, LockKind, LockOutcome,
    MultiConfigOperation, MultiConfigRequest, OperationAction, OperationStatus,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, DeviceClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let client = DeviceClient::with_client(reqwest::Client::new(), base_url);
    client.set_api_key(SecretString::from("test-key".to_string()));
    (server, client)
}

fn device_group() -> Location {
    Location::new(LocationType::DeviceGroup, "branch-offices")
}

// ── Authentication tests ────────────────────────────────────────────

#[tokio::test]
async fn test_keygen_success() {
    let server = MockServer::start().await;
    let client =
        DeviceClient::with_client(reqwest::Client::new(), Url::parse(&server.uri()).unwrap());

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/keygen"))
        .and(body_partial_json(json!({ "username": "admin" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "result": { "key": "LUFRPT1234" }
        })))
        .mount(&server)
        .await;

    assert!(!client.is_authenticated());
    let creds = Credentials::Password {
        username: "admin".into(),
        password: SecretString::from("hunter2".to_string()),
    };
    client.authenticate(&creds).await.unwrap();
    assert!(client.is_authenticated());
}

#[tokio::test]
async fn test_keygen_rejected() {
    let server = MockServer::start().await;
    let client =
        DeviceClient::with_client(reqwest::Client::new(), Url::parse(&server.uri()).unwrap());

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/keygen"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "status": "error",
            "message": "Invalid credentials."
        })))
        .mount(&server)
        .await;

    let secret = SecretString::from("wrong".to_string());
    let result = client.keygen("admin", &secret).await;

    match result {
        Err(Error::Authentication { message }) => assert_eq!(message, "Invalid credentials."),
        other => panic!("expected Authentication error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_requests_without_key_fail_locally() {
    let server = MockServer::start().await;
    let client =
        DeviceClient::with_client(reqwest::Client::new(), Url::parse(&server.uri()).unwrap());

    let result = client.list_objects(&device_group(), "address").await;
    assert!(matches!(result, Err(Error::NotAuthenticated)));
}

// ── Object listing tests ────────────────────────────────────────────

#[tokio::test]
async fn test_list_objects() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/config/objects/address"))
        .and(query_param("location_type", "device-group"))
        .and(query_param("location_name", "branch-offices"))
        .and(header("X-API-Key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "result": {
                "entries": [
                    { "name": "web-1", "uuid": "a1", "ip-netmask": "10.0.0.1" },
                    { "name": "web-2", "uuid": "a2", "ip-netmask": "10.0.0.2" }
                ]
            }
        })))
        .mount(&server)
        .await;

    let entries = client
        .list_objects(&device_group(), "address")
        .await
        .unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["name"], "web-1");
}

#[tokio::test]
async fn test_list_objects_empty_is_not_an_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/config/objects/tag"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "result": { "entries": [] }
        })))
        .mount(&server)
        .await;

    let entries = client.list_objects(&device_group(), "tag").await.unwrap();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn test_list_objects_missing_result_is_an_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/config/objects/tag"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "success" })))
        .mount(&server)
        .await;

    let result = client.list_objects(&device_group(), "tag").await;
    assert!(matches!(result, Err(Error::Deserialization { .. })));
}

#[tokio::test]
async fn test_non_json_body_with_multibyte_text_is_a_deserialization_error() {
    let (server, client) = setup().await;
    let body = format!("{}é not json", "x".repeat(199));

    Mock::given(method("GET"))
        .and(path("/api/v1/config/objects/tag"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.clone()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/config/multi"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.clone()))
        .mount(&server)
        .await;

    match client.list_objects(&device_group(), "tag").await {
        Err(Error::Deserialization { message, body: raw }) => {
            assert!(message.contains('é'), "{message}");
            assert!(!message.contains("not json"), "{message}");
            assert_eq!(raw, body);
        }
        other => panic!("expected Deserialization, got {other:?}"),
    }
    let result = client.multi_config(&sample_request(true)).await;
    assert!(matches!(result, Err(Error::Deserialization { .. })));
}

#[tokio::test]
async fn test_gateway_error_is_transient() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/config/objects/service"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&server)
        .await;

    let err = client
        .list_objects(&device_group(), "service")
        .await
        .unwrap_err();
    assert!(err.is_transient(), "expected transient error, got: {err:?}");
}

// ── Lock tests ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_acquire_lock() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/locks/config/acquire"))
        .and(body_partial_json(json!({
            "location": { "type": "device-group", "name": "branch-offices" },
            "comment": "rollout"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "success" })))
        .mount(&server)
        .await;

    let outcome = client
        .acquire_lock(&device_group(), LockKind::Config, "rollout")
        .await
        .unwrap();
    assert_eq!(outcome, LockOutcome::Acquired);
}

#[tokio::test]
async fn test_acquire_lock_already_owned() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/locks/commit/acquire"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "error",
            "code": "lock-already-owned",
            "message": "You already own a commit lock"
        })))
        .mount(&server)
        .await;

    let outcome = client
        .acquire_lock(&device_group(), LockKind::Commit, "rollout")
        .await
        .unwrap();
    assert_eq!(outcome, LockOutcome::AlreadyOwned);
}

#[tokio::test]
async fn test_acquire_lock_held_by_other() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/locks/config/acquire"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "status": "error",
            "code": "lock-held",
            "holder": "admin2",
            "message": "Config is locked by admin2"
        })))
        .mount(&server)
        .await;

    let err = client
        .acquire_lock(&device_group(), LockKind::Config, "rollout")
        .await
        .unwrap_err();

    assert!(err.is_lock_held());
    match err {
        Error::Device { holder, .. } => assert_eq!(holder.as_deref(), Some("admin2")),
        other => panic!("expected Device error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_release_lock_not_held() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/locks/config/release"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "error",
            "code": "lock-not-held",
            "message": "No config lock to release"
        })))
        .mount(&server)
        .await;

    let released = client
        .release_lock(&device_group(), LockKind::Config)
        .await
        .unwrap();
    assert!(!released);
}

// ── Multi-config tests ──────────────────────────────────────────────

fn sample_request(strict: bool) -> MultiConfigRequest {
    MultiConfigRequest {
        strict,
        location: device_group(),
        operations: vec![
            MultiConfigOperation {
                id: 0,
                action: OperationAction::Create,
                kind: "address".into(),
                name: "web-1".into(),
                entry: Some(json!({ "name": "web-1", "value": "10.0.0.1" })),
                uuid: None,
            },
            MultiConfigOperation {
                id: 1,
                action: OperationAction::Delete,
                kind: "address".into(),
                name: "old-host".into(),
                entry: None,
                uuid: Some("a9".into()),
            },
        ],
    }
}

#[tokio::test]
async fn test_multi_config_success() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/config/multi"))
        .and(body_partial_json(json!({ "strict": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "responses": [
                { "id": 0, "status": "success", "uuid": "new-uuid-1" },
                { "id": 1, "status": "success" }
            ]
        })))
        .mount(&server)
        .await;

    let resp = client.multi_config(&sample_request(true)).await.unwrap();

    assert!(resp.is_success());
    assert_eq!(
        resp.response_for(0).and_then(|r| r.uuid.as_deref()),
        Some("new-uuid-1")
    );
}

#[tokio::test]
async fn test_multi_config_partial_failure_is_ok() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/config/multi"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "error",
            "message": "operation 1 failed",
            "responses": [
                { "id": 0, "status": "success", "uuid": "new-uuid-1" },
                { "id": 1, "status": "error", "code": "reference-in-use", "message": "old-host is referenced" }
            ]
        })))
        .mount(&server)
        .await;

    let resp = client.multi_config(&sample_request(false)).await.unwrap();

    assert!(!resp.is_success());
    let failed = resp.response_for(1).unwrap();
    assert_eq!(failed.status, OperationStatus::Error);
    assert_eq!(failed.code.as_deref(), Some("reference-in-use"));
}

#[tokio::test]
async fn test_multi_config_rejected_without_detail() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/config/multi"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "status": "error",
            "code": "commit-pending",
            "message": "strict batches are refused while a commit is pending"
        })))
        .mount(&server)
        .await;

    let err = client
        .multi_config(&sample_request(true))
        .await
        .unwrap_err();
    assert_eq!(err.device_code(), Some("commit-pending"));
}

#[tokio::test]
async fn test_expired_key_maps_to_authentication() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/system/info"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client.system_info().await.unwrap_err();
    assert!(err.is_auth_expired());
}
