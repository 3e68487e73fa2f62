#![allow(clippy::unwrap_used)]
// `RemoteSession` against a mocked device API.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use polsync_api::DeviceClient;
use polsync_core::{
    BatchOperation, BatchOutcome, CancellationToken, CoreError, DeploymentScope,
    DesiredStateBuilder, DeviceSession, EngineConfig, LockKind, ObjectKind, ObjectRef,
    Orchestrator, RemoteSession, RunOutcome, SourceRecord, Verb,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, RemoteSession) {
    let server = MockServer::start().await;
    let client =
        DeviceClient::with_client(reqwest::Client::new(), Url::parse(&server.uri()).unwrap());
    client.set_api_key(SecretString::from("test-key".to_string()));
    (server, RemoteSession::from_client(client))
}

fn scope() -> DeploymentScope {
    DeploymentScope::firewall("vsys1")
}

async fn mount_empty_listings(server: &MockServer) {
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "result": { "entries": [] }
        })))
        .with_priority(10)
        .mount(server)
        .await;
}

async fn mount_locks(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/v1/locks/config/acquire"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "success" })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/locks/commit/acquire"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "success" })))
        .expect(1)
        .mount(server)
        .await;
    for kind in ["config", "commit"] {
        Mock::given(method("POST"))
            .and(path(format!("/api/v1/locks/{kind}/release")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "success" })))
            .expect(1)
            .mount(server)
            .await;
    }
}

// ── Session calls ───────────────────────────────────────────────────

#[tokio::test]
async fn lists_live_objects_in_canonical_form() {
    let (server, session) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/config/objects/address"))
        .and(query_param("location_type", "vsys"))
        .and(query_param("location_name", "vsys1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "result": { "entries": [
                { "name": "web-1", "@location": "vsys", "value": "10.0.0.1/32", "tags": ["prod"] },
                { "name": "db", "type": "fqdn", "value": "DB.Example.COM" }
            ] }
        })))
        .mount(&server)
        .await;

    let objects = session
        .list_objects(&scope().container(), ObjectKind::Address)
        .await
        .unwrap();
    let values: Vec<_> = objects
        .iter()
        .map(|o| {
            (
                o.definition.reference.name.clone(),
                o.definition.attributes.to_value()["value"].clone(),
            )
        })
        .collect();
    assert_eq!(
        values,
        vec![
            ("web-1".to_owned(), json!("10.0.0.1")),
            ("db".to_owned(), json!("db.example.com")),
        ]
    );
}

#[tokio::test]
async fn unknown_entry_fields_are_rejected() {
    let (server, session) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/config/objects/tag"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "result": { "entries": [ { "name": "prod", "shade": "blue" } ] }
        })))
        .mount(&server)
        .await;

    let err = session
        .list_objects(&scope().container(), ObjectKind::Tag)
        .await
        .unwrap_err();
    match err {
        CoreError::Api { code, .. } => assert_eq!(code.as_deref(), Some("unrecognized-entry")),
        other => panic!("expected Api error, got: {other:?}"),
    }
}

#[tokio::test]
async fn held_lock_maps_to_conflict_with_holder() {
    let (server, session) = setup().await;

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

    let err = session
        .acquire_lock(&scope().container(), LockKind::Config, "rollout")
        .await
        .unwrap_err();
    match err {
        CoreError::LockConflict { holder, kind, .. } => {
            assert_eq!(holder.as_deref(), Some("admin2"));
            assert_eq!(kind, LockKind::Config);
        }
        other => panic!("expected LockConflict, got: {other:?}"),
    }
}

#[tokio::test]
async fn strict_failure_marks_successes_not_attempted() {
    let (server, session) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/config/multi"))
        .and(body_partial_json(json!({
            "strict": true,
            "operations": [ { "id": 0, "action": "delete", "kind": "address", "name": "old", "uuid": "u-9" } ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "error",
            "message": "transaction rolled back",
            "responses": [
                { "id": 0, "status": "success" },
                { "id": 1, "status": "error", "code": "object-in-use", "message": "address/busy is referenced" }
            ]
        })))
        .mount(&server)
        .await;

    let ops = [
        BatchOperation {
            sequence_id: 0,
            verb: Verb::Delete,
            object: ObjectRef::new(ObjectKind::Address, "old"),
            payload: None,
            device_id: Some("u-9".into()),
        },
        BatchOperation {
            sequence_id: 1,
            verb: Verb::Delete,
            object: ObjectRef::new(ObjectKind::Address, "busy"),
            payload: None,
            device_id: None,
        },
    ];
    let results = session
        .submit_batch(&scope().container(), &ops, true)
        .await
        .unwrap();

    let outcomes: Vec<_> = results.iter().map(|r| r.outcome).collect();
    assert_eq!(outcomes, vec![BatchOutcome::NotAttempted, BatchOutcome::Failed]);
    assert_eq!(
        results[1].error.as_deref(),
        Some("address/busy is referenced (object-in-use)")
    );
}

// ── Full run ────────────────────────────────────────────────────────

#[tokio::test]
async fn run_over_http_creates_and_releases_locks() {
    let (server, session) = setup().await;
    mount_locks(&server).await;
    mount_empty_listings(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/config/multi"))
        .and(body_partial_json(json!({
            "strict": true,
            "location": { "type": "vsys", "name": "vsys1" },
            "operations": [ {
                "id": 0, "action": "create", "kind": "address", "name": "A1",
                "entry": { "name": "A1", "value": "10.0.0.0/8" }
            } ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "responses": [ { "id": 0, "status": "success", "uuid": "uuid-a1" } ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut builder = DesiredStateBuilder::new(scope());
    builder
        .add_record(SourceRecord::new(
            "objects.yaml",
            0,
            json!({ "kind": "address", "name": "A1", "value": "10.0.0.0/8" }),
        ))
        .unwrap();
    let desired = builder.build().unwrap();

    let config = EngineConfig {
        request_timeout: Duration::from_secs(5),
        ..EngineConfig::default()
    };
    let orchestrator = Orchestrator::new(Arc::new(session), config);
    let report = orchestrator
        .run(&desired, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Success);
    assert_eq!(report.created[0].device_id.as_deref(), Some("uuid-a1"));
}
