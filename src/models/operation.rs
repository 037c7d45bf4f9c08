use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Meal shift of a daily operation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
pub enum Shift {
    #[serde(rename = "Desayuno")]
    #[strum(serialize = "Desayuno")]
    Breakfast,
    #[serde(rename = "Almuerzo")]
    #[strum(serialize = "Almuerzo")]
    Lunch,
    #[serde(rename = "Merienda")]
    #[strum(serialize = "Merienda")]
    Snack,
}

/// A processed daily kitchen operation. The stock deduction itself is
/// performed by the backend procedure; this row is its record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyOperation {
    #[serde(rename = "id_registro")]
    pub id: i64,
    #[serde(rename = "fecha")]
    pub date: NaiveDate,
    #[serde(rename = "turno")]
    pub shift: Shift,
    #[serde(rename = "asistencia_total")]
    pub attendance: i32,
    #[serde(rename = "notas")]
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
}

/// A stock deduction produced by a daily operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockIssue {
    #[serde(rename = "id_output")]
    pub id: i64,
    #[serde(rename = "id_registro")]
    pub operation_id: Option<i64>,
    #[serde(rename = "id_product")]
    pub product_id: i64,
    pub amount: Decimal,
    #[serde(rename = "fecha")]
    pub date: NaiveDate,
    #[serde(rename = "motivo")]
    pub reason: Option<String>,
}
