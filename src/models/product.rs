use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Unit of measure for a product's stock. Stored as lowercase strings by the
/// backend.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
pub enum UnitMeasure {
    #[serde(rename = "kg")]
    #[strum(serialize = "kg")]
    Kilograms,
    #[serde(rename = "lt")]
    #[strum(serialize = "lt")]
    Liters,
    #[serde(rename = "unidades")]
    #[strum(serialize = "unidades")]
    Units,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    #[serde(rename = "id_category")]
    pub id: i64,
    #[serde(rename = "category_name")]
    pub name: String,
}

/// A product in the item master. Stock is never written through product
/// updates; it moves only via receipt approval and daily operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "id_product")]
    pub id: i64,
    #[serde(rename = "product_name")]
    pub name: String,
    #[serde(rename = "product_code")]
    pub code: Option<String>,
    pub stock: Decimal,
    pub unit_measure: UnitMeasure,
    pub expiration_date: Option<NaiveDate>,
    pub description: Option<String>,
    #[serde(rename = "id_category")]
    pub category_id: Option<i64>,
}

/// Coarse stock classification used by listings and the stock report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum StockLevel {
    Low,
    Medium,
    Ok,
}

/// Expiry classification relative to a reference date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExpiryStatus {
    Expired,
    Critical { days_left: i64 },
    Warning { days_left: i64 },
    None,
}

impl Product {
    pub fn stock_level(&self) -> StockLevel {
        if self.stock < dec!(10) {
            StockLevel::Low
        } else if self.stock < dec!(50) {
            StockLevel::Medium
        } else {
            StockLevel::Ok
        }
    }

    pub fn expiry_status(&self, today: NaiveDate) -> ExpiryStatus {
        let Some(expires) = self.expiration_date else {
            return ExpiryStatus::None;
        };
        let days_left = (expires - today).num_days();
        if days_left < 0 {
            ExpiryStatus::Expired
        } else if days_left <= 7 {
            ExpiryStatus::Critical { days_left }
        } else if days_left <= 30 {
            ExpiryStatus::Warning { days_left }
        } else {
            ExpiryStatus::None
        }
    }
}
