use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a goods-receipt document.
///
/// A receipt is created `Pending`, moves exactly once to `Approved` or
/// `Rejected`, and is read-only history from then on. There is no edge back
/// to `Pending` and none out of a terminal state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
pub enum ReceiptStatus {
    #[serde(rename = "Pendiente")]
    #[strum(serialize = "Pendiente")]
    Pending,
    #[serde(rename = "Aprobada")]
    #[strum(serialize = "Aprobada")]
    Approved,
    #[serde(rename = "Rechazada")]
    #[strum(serialize = "Rechazada")]
    Rejected,
}

impl ReceiptStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ReceiptStatus::Approved | ReceiptStatus::Rejected)
    }
}

/// A dated quantity inside a receipt line. Lots have no identity of their
/// own; the owning line stores them as one embedded array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    #[serde(rename = "cantidad")]
    pub quantity: Decimal,
    #[serde(rename = "fecha_vencimiento")]
    pub expires_on: NaiveDate,
}

/// One product within a receipt, with its declared total and lot breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptLine {
    #[serde(rename = "id_input")]
    pub id: i64,
    #[serde(rename = "id_guia")]
    pub receipt_id: i64,
    #[serde(rename = "id_product")]
    pub product_id: i64,
    pub amount: Decimal,
    /// Physical package count, informational only.
    #[serde(rename = "unit_amount")]
    pub unit_count: Option<i32>,
    #[serde(rename = "fecha")]
    pub received_on: NaiveDate,
    #[serde(rename = "lotes_detalle", default)]
    pub lots: Vec<Lot>,
}

/// A goods-receipt document ("guía de entrada").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    #[serde(rename = "id_guia")]
    pub id: i64,
    /// Primary regulatory document number, unique across all receipts.
    #[serde(rename = "numero_guia_sunagro")]
    pub sunagro_number: String,
    #[serde(rename = "numero_guia_sisecal")]
    pub sisecal_number: Option<String>,
    #[serde(rename = "fecha")]
    pub received_on: NaiveDate,
    #[serde(rename = "vocera_nombre")]
    pub contact_name: Option<String>,
    #[serde(rename = "telefono_vocera")]
    pub contact_phone: Option<String>,
    #[serde(rename = "notas")]
    pub notes: Option<String>,
    #[serde(rename = "estado")]
    pub status: ReceiptStatus,
    pub created_by: Uuid,
    pub approved_by: Option<Uuid>,
    pub approval_date: Option<DateTime<Utc>>,
    pub approval_comments: Option<String>,
}

/// A receipt together with its lines, as returned by list queries that embed
/// the `input` relation.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiptWithLines {
    #[serde(flatten)]
    pub receipt: Receipt,
    #[serde(rename = "input", default)]
    pub lines: Vec<ReceiptLine>,
}
