//! Integration tests for menu planning and daily operations.

mod common;

use assert_matches::assert_matches;
use chrono::NaiveDate;
use common::{session, TestBackend};
use pae_inventory::auth::Role;
use pae_inventory::errors::ServiceError;
use pae_inventory::models::operation::Shift;
use pae_inventory::services::menus::{NewMenu, NewMenuItem};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

fn a_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 7, 15).unwrap()
}

#[tokio::test]
async fn menu_with_insufficient_stock_is_refused_before_any_insert() {
    let backend = TestBackend::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/product"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id_product": 12,
            "product_name": "Arroz",
            "unit_measure": "kg",
            "stock": "10.0"
        }])))
        .expect(1)
        .mount(&backend.server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/menu_diario"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&backend.server)
        .await;

    let err = backend
        .app
        .menus
        .plan(
            &session(Role::Operator),
            NewMenu {
                date: a_date(),
                attendance_id: 3,
                notes: None,
                items: vec![NewMenuItem {
                    product_id: 12,
                    planned_quantity: dec!(25.5),
                    used_quantity: None,
                }],
            },
        )
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::InsufficientStock(msg) if msg.contains("Arroz"));
}

#[tokio::test]
async fn menu_plan_inserts_header_and_items() {
    let backend = TestBackend::start().await;
    backend.accept_audit_entries().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/product"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id_product": 12,
            "product_name": "Arroz",
            "unit_measure": "kg",
            "stock": "100.0"
        }])))
        .mount(&backend.server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/menu_diario"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "id_menu": 8,
            "fecha": "2025-07-15",
            "id_asistencia": 3,
            "notas": null,
            "created_by": null
        }])))
        .expect(1)
        .mount(&backend.server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/menu_detalle"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "id_detalle": 21,
            "id_menu": 8,
            "id_product": 12,
            "cantidad_planificada": "25.5",
            "cantidad_real_usada": null
        }])))
        .expect(1)
        .mount(&backend.server)
        .await;

    let stored = backend
        .app
        .menus
        .plan(
            &session(Role::Operator),
            NewMenu {
                date: a_date(),
                attendance_id: 3,
                notes: None,
                items: vec![NewMenuItem {
                    product_id: 12,
                    planned_quantity: dec!(25.5),
                    used_quantity: None,
                }],
            },
        )
        .await
        .expect("plan should succeed");

    assert_eq!(stored.plan.id, 8);
    assert_eq!(stored.items.len(), 1);
}

#[tokio::test]
async fn daily_operation_invokes_the_backend_procedure() {
    let backend = TestBackend::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/procesar_operacion_diaria"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "mensaje": "Operación registrada: 2 rubros descontados"
        })))
        .expect(1)
        .mount(&backend.server)
        .await;

    let summary = backend
        .app
        .operations
        .process(&session(Role::Operator), a_date(), Shift::Lunch, 774, &[3, 5])
        .await
        .expect("operation should succeed");

    assert!(summary.message.contains("2 rubros"));

    let requests = backend.requests().await;
    let rpc = requests
        .iter()
        .find(|r| r.url.path() == "/rest/v1/rpc/procesar_operacion_diaria")
        .expect("procedure call");
    let body: Value = serde_json::from_slice(&rpc.body).unwrap();
    assert_eq!(body["p_turno"], "Almuerzo");
    assert_eq!(body["p_asistencia"], 774);
    assert_eq!(body["p_rubros"], json!([3, 5]));
}

#[tokio::test]
async fn supervisors_cannot_run_operations() {
    let backend = TestBackend::start().await;

    let err = backend
        .app
        .operations
        .process(&session(Role::Supervisor), a_date(), Shift::Lunch, 774, &[3])
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::Forbidden(_));
    assert!(backend.requests().await.is_empty());
}
