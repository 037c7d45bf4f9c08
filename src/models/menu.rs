use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A planned menu for one day, tied to an attendance record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuPlan {
    #[serde(rename = "id_menu")]
    pub id: i64,
    #[serde(rename = "fecha")]
    pub date: NaiveDate,
    #[serde(rename = "id_asistencia")]
    pub attendance_id: i64,
    #[serde(rename = "notas")]
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
}

/// One product on a menu, with the planned quantity and the quantity
/// actually used once the meal is served.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuItem {
    #[serde(rename = "id_detalle")]
    pub id: i64,
    #[serde(rename = "id_menu")]
    pub menu_id: i64,
    #[serde(rename = "id_product")]
    pub product_id: i64,
    #[serde(rename = "cantidad_planificada")]
    pub planned_quantity: Decimal,
    #[serde(rename = "cantidad_real_usada")]
    pub used_quantity: Option<Decimal>,
}
