//! Integration tests for the background polling tasks: the heartbeat writes
//! liveness updates and both loops stop cleanly and stay stopped.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{session, TestBackend};
use pae_inventory::auth::Role;
use pae_inventory::tasks;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn heartbeat_updates_liveness_and_carries_the_resolved_ip() {
    let backend = TestBackend::start().await;

    Mock::given(method("GET"))
        .and(path("/ip"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ip": "203.0.113.9" })))
        .expect(1)
        .mount(&backend.server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&backend.server)
        .await;

    let handle = tasks::start_heartbeat(
        backend.app.client.clone(),
        Arc::new(session(Role::Operator)),
        format!("{}/ip", backend.server.uri()),
        Duration::from_millis(50),
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.stop().await;

    let beats: Vec<_> = backend
        .requests()
        .await
        .into_iter()
        .filter(|r| r.method.as_str() == "PATCH" && r.url.path() == "/rest/v1/users")
        .collect();
    assert!(!beats.is_empty(), "at least one heartbeat should have fired");

    let body: serde_json::Value = serde_json::from_slice(&beats[0].body).unwrap();
    assert!(body.get("last_seen_at").is_some());
    assert_eq!(body["last_ip"], "203.0.113.9");
}

#[tokio::test]
async fn heartbeat_never_fires_after_stop() {
    let backend = TestBackend::start().await;

    Mock::given(method("GET"))
        .and(path("/ip"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&backend.server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&backend.server)
        .await;

    let handle = tasks::start_heartbeat(
        backend.app.client.clone(),
        Arc::new(session(Role::Operator)),
        format!("{}/ip", backend.server.uri()),
        Duration::from_millis(40),
    );

    tokio::time::sleep(Duration::from_millis(120)).await;
    handle.stop().await;

    let count_at_stop = backend.requests().await.len();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(
        backend.requests().await.len(),
        count_at_stop,
        "no request may be issued after stop()"
    );
}

#[tokio::test]
async fn heartbeat_omits_the_ip_when_the_lookup_fails() {
    let backend = TestBackend::start().await;

    Mock::given(method("GET"))
        .and(path("/ip"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&backend.server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&backend.server)
        .await;

    let handle = tasks::start_heartbeat(
        backend.app.client.clone(),
        Arc::new(session(Role::Operator)),
        format!("{}/ip", backend.server.uri()),
        Duration::from_millis(50),
    );

    tokio::time::sleep(Duration::from_millis(150)).await;
    handle.stop().await;

    let beat = backend
        .requests()
        .await
        .into_iter()
        .find(|r| r.method.as_str() == "PATCH")
        .expect("heartbeat fired despite the failed lookup");
    let body: serde_json::Value = serde_json::from_slice(&beat.body).unwrap();
    assert!(body.get("last_ip").is_none());
}

#[tokio::test]
async fn roster_watch_publishes_snapshots_and_stops() {
    let backend = TestBackend::start().await;
    let user = session(Role::Operator);

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id_user": user.user_id,
            "username": "tester",
            "full_name": "Test User",
            "id_rol": 2,
            "is_active": true,
            "created_at": null,
            "last_seen_at": null,
            "last_ip": null
        }])))
        .mount(&backend.server)
        .await;

    let (handle, mut roster) =
        tasks::start_roster_watch(backend.app.client.clone(), Duration::from_millis(50));

    tokio::time::timeout(Duration::from_secs(2), roster.changed())
        .await
        .expect("a snapshot should arrive quickly")
        .expect("roster channel should stay open while running");
    assert_eq!(roster.borrow().len(), 1);

    handle.stop().await;
}
