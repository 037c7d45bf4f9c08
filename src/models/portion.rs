use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::product::UnitMeasure;

/// Portion-yield configuration for a product: how many students one unit of
/// the product serves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortionRecipe {
    #[serde(rename = "id_porcion")]
    pub id: i64,
    #[serde(rename = "id_product")]
    pub product_id: i64,
    #[serde(rename = "rendimiento_por_unidad")]
    pub yield_per_unit: Decimal,
    pub unit_measure: UnitMeasure,
    #[serde(rename = "notas")]
    pub notes: Option<String>,
}

impl PortionRecipe {
    /// Quantity of product needed to serve `attendance` students.
    pub fn required_quantity(&self, attendance: i32) -> Decimal {
        Decimal::from(attendance) / self.yield_per_unit
    }
}
