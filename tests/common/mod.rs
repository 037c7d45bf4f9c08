//! Test harness: the application services wired against a wiremock backend.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pae_inventory::auth::{Role, Session};
use pae_inventory::client::BackendClient;
use pae_inventory::models::UserProfile;
use pae_inventory::App;

pub struct TestBackend {
    pub server: MockServer,
    pub app: App,
}

impl TestBackend {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let client = Arc::new(
            BackendClient::new(
                &server.uri(),
                "anon-test-key",
                Some("admin-test-key".into()),
                Duration::from_secs(5),
            )
            .expect("client against mock server"),
        );
        let app = App::new(client);
        Self { server, app }
    }

    /// Accepts audit-trail writes so audited operations do not log warnings.
    pub async fn accept_audit_entries(&self) {
        Mock::given(method("POST"))
            .and(path("/rest/v1/audit_log"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
            .mount(&self.server)
            .await;
    }

    /// All requests the mock backend received so far.
    pub async fn requests(&self) -> Vec<wiremock::Request> {
        self.server.received_requests().await.unwrap_or_default()
    }
}

pub fn session(role: Role) -> Session {
    let user_id = Uuid::new_v4();
    Session {
        user_id,
        email: Some("tester@example.com".into()),
        profile: UserProfile {
            id: user_id,
            username: "tester".into(),
            full_name: "Test User".into(),
            role_id: role.id(),
            is_active: true,
            created_at: None,
            last_seen_at: None,
            last_ip: None,
        },
        role,
    }
}

/// A stored receipt row as the backend would return it.
pub fn receipt_row(id: i64, reference: &str, status: &str) -> Value {
    json!({
        "id_guia": id,
        "numero_guia_sunagro": reference,
        "numero_guia_sisecal": null,
        "fecha": "2025-07-01",
        "vocera_nombre": "Carmen",
        "telefono_vocera": null,
        "notas": null,
        "estado": status,
        "created_by": Uuid::new_v4(),
        "approved_by": null,
        "approval_date": null,
        "approval_comments": null
    })
}

pub fn line_row(id: i64, receipt_id: i64, product_id: i64, amount: &str, lots: Value) -> Value {
    json!({
        "id_input": id,
        "id_guia": receipt_id,
        "id_product": product_id,
        "amount": amount,
        "unit_amount": null,
        "fecha": "2025-07-01",
        "lotes_detalle": lots
    })
}
