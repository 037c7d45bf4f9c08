//! Integration tests for the receipt composer: validation before network,
//! forced pending status, duplicate references, and the compensating delete
//! on partial failure.

mod common;

use assert_matches::assert_matches;
use chrono::NaiveDate;
use common::{line_row, receipt_row, session, TestBackend};
use pae_inventory::auth::Role;
use pae_inventory::errors::{ReceiptValidationError, ServiceError};
use pae_inventory::models::ReceiptStatus;
use pae_inventory::services::receipts::{LotEntry, NewReceipt, NewReceiptLine};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 7, d).unwrap()
}

fn split_lot_draft(reference: &str) -> NewReceipt {
    NewReceipt {
        sunagro_number: reference.into(),
        sisecal_number: None,
        received_on: date(1),
        contact_name: Some("Carmen".into()),
        contact_phone: None,
        notes: None,
        lines: vec![NewReceiptLine {
            product_id: 12,
            total_quantity: dec!(100),
            unit_count: Some(10),
            lots: vec![
                LotEntry::new(dec!(60), date(20)),
                LotEntry::new(dec!(40), date(28)),
            ],
        }],
    }
}

#[tokio::test]
async fn compose_stores_pending_receipt_with_lots() {
    let backend = TestBackend::start().await;
    backend.accept_audit_entries().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/guia_entrada"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!([receipt_row(42, "G-100", "Pendiente")])),
        )
        .expect(1)
        .mount(&backend.server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/input"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([line_row(
            7,
            42,
            12,
            "100.00",
            json!([
                { "cantidad": "60", "fecha_vencimiento": "2025-07-20" },
                { "cantidad": "40", "fecha_vencimiento": "2025-07-28" }
            ])
        )])))
        .expect(1)
        .mount(&backend.server)
        .await;

    let stored = backend
        .app
        .receipts
        .compose(&session(Role::Operator), split_lot_draft("G-100"))
        .await
        .expect("compose should succeed");

    assert_eq!(stored.receipt.status, ReceiptStatus::Pending);
    assert_eq!(stored.lines.len(), 1);
    assert_eq!(stored.lines[0].lots.len(), 2);

    // The header insert payload must carry the forced pending status; a
    // caller has no field through which to inject a different one.
    let requests = backend.requests().await;
    let header_request = requests
        .iter()
        .find(|r| r.url.path() == "/rest/v1/guia_entrada" && r.method.as_str() == "POST")
        .expect("header insert request");
    let body: Value = serde_json::from_slice(&header_request.body).unwrap();
    assert_eq!(body[0]["estado"], "Pendiente");
}

#[tokio::test]
async fn lot_mismatch_blocks_before_any_network_call() {
    let backend = TestBackend::start().await;

    let mut draft = split_lot_draft("G-101");
    draft.lines[0].lots = vec![
        LotEntry::new(dec!(60), date(20)),
        LotEntry::new(dec!(40.011), date(28)),
    ];

    let err = backend
        .app
        .receipts
        .compose(&session(Role::Operator), draft)
        .await
        .unwrap_err();

    assert_matches!(
        err,
        ServiceError::InvalidReceipt(ReceiptValidationError::LotMismatch { line: 0, .. })
    );
    assert!(
        backend.requests().await.is_empty(),
        "an invalid draft must not produce requests"
    );
}

#[tokio::test]
async fn duplicate_reference_is_reported_distinctly() {
    let backend = TestBackend::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/guia_entrada"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint \"guia_entrada_numero_guia_sunagro_key\"",
            "details": null
        })))
        .expect(1)
        .mount(&backend.server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/input"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&backend.server)
        .await;

    let err = backend
        .app
        .receipts
        .compose(&session(Role::Operator), split_lot_draft("G-100"))
        .await
        .unwrap_err();

    assert!(err.is_duplicate_reference());
}

#[tokio::test]
async fn failed_line_insert_removes_the_orphaned_header() {
    let backend = TestBackend::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/guia_entrada"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!([receipt_row(55, "G-102", "Pendiente")])),
        )
        .expect(1)
        .mount(&backend.server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/input"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "code": "XX000",
            "message": "line insert exploded"
        })))
        .expect(1)
        .mount(&backend.server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/guia_entrada"))
        .and(query_param("id_guia", "eq.55"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&backend.server)
        .await;

    let err = backend
        .app
        .receipts
        .compose(&session(Role::Operator), split_lot_draft("G-102"))
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::BackendError { status: 500, .. });
    // The expect(1) on the DELETE mock verifies the compensating delete when
    // the mock server shuts down.
}

#[tokio::test]
async fn view_only_role_cannot_reach_the_composer() {
    let backend = TestBackend::start().await;

    let err = backend
        .app
        .receipts
        .compose(&session(Role::Supervisor), split_lot_draft("G-103"))
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::Forbidden(_));
    assert!(backend.requests().await.is_empty());
}
