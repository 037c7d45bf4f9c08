use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};
use validator::Validate;

use crate::auth::Session;
use crate::client::BackendClient;
use crate::errors::ServiceError;
use crate::models::product::{Category, Product, UnitMeasure};
use crate::models::AuditAction;
use crate::services::audit::AuditService;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewProduct {
    #[serde(rename = "product_name")]
    #[validate(length(min = 1, message = "the product name is required"))]
    pub name: String,
    #[serde(rename = "product_code")]
    pub code: Option<String>,
    #[serde(rename = "stock")]
    pub initial_stock: Decimal,
    pub unit_measure: UnitMeasure,
    pub expiration_date: Option<NaiveDate>,
    pub description: Option<String>,
    #[serde(rename = "id_category")]
    pub category_id: Option<i64>,
}

/// Product update payload. Deliberately carries no stock field: stock is
/// controlled exclusively by receipt approvals and daily operations.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateProduct {
    #[serde(rename = "product_name")]
    #[validate(length(min = 1, message = "the product name is required"))]
    pub name: String,
    #[serde(rename = "product_code")]
    pub code: Option<String>,
    pub unit_measure: UnitMeasure,
    pub expiration_date: Option<NaiveDate>,
    pub description: Option<String>,
    #[serde(rename = "id_category")]
    pub category_id: Option<i64>,
}

/// Item-master maintenance.
#[derive(Clone)]
pub struct ProductService {
    client: Arc<BackendClient>,
    audit: Option<Arc<AuditService>>,
}

impl ProductService {
    pub fn new(client: Arc<BackendClient>, audit: Option<Arc<AuditService>>) -> Self {
        Self { client, audit }
    }

    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Product>, ServiceError> {
        self.client
            .table("product")
            .select("*")
            .order("product_name.asc")
            .fetch()
            .await
    }

    #[instrument(skip(self))]
    pub async fn get(&self, product_id: i64) -> Result<Product, ServiceError> {
        self.client
            .table("product")
            .select("*")
            .eq("id_product", product_id)
            .fetch_one()
            .await
    }

    #[instrument(skip(self))]
    pub async fn categories(&self) -> Result<Vec<Category>, ServiceError> {
        self.client
            .table("category")
            .select("*")
            .order("category_name.asc")
            .fetch()
            .await
    }

    #[instrument(skip(self, session, product), fields(name = %product.name))]
    pub async fn create(
        &self,
        session: &Session,
        product: NewProduct,
    ) -> Result<Product, ServiceError> {
        session.require_compose()?;
        product
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let created: Product = self.client.table("product").insert_one(&[product]).await?;
        info!(product_id = created.id, "product created");

        if let Some(audit) = &self.audit {
            audit
                .record(
                    session,
                    AuditAction::Create,
                    "product",
                    Some(created.id.to_string()),
                    json!({ "product_name": created.name }),
                )
                .await;
        }
        Ok(created)
    }

    #[instrument(skip(self, session, update))]
    pub async fn update(
        &self,
        session: &Session,
        product_id: i64,
        update: UpdateProduct,
    ) -> Result<(), ServiceError> {
        session.require_compose()?;
        update
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        self.client
            .table("product")
            .eq("id_product", product_id)
            .update(&update)
            .await?;

        if let Some(audit) = &self.audit {
            audit
                .record(
                    session,
                    AuditAction::Update,
                    "product",
                    Some(product_id.to_string()),
                    json!({ "product_name": update.name }),
                )
                .await;
        }
        Ok(())
    }

    #[instrument(skip(self, session))]
    pub async fn delete(&self, session: &Session, product_id: i64) -> Result<(), ServiceError> {
        session.require_compose()?;

        self.client
            .table("product")
            .eq("id_product", product_id)
            .delete()
            .await?;
        info!(product_id, "product deleted");

        if let Some(audit) = &self.audit {
            audit
                .record(
                    session,
                    AuditAction::Delete,
                    "product",
                    Some(product_id.to_string()),
                    json!({}),
                )
                .await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn update_payload_never_contains_stock() {
        let update = UpdateProduct {
            name: "Arroz".into(),
            code: None,
            unit_measure: UnitMeasure::Kilograms,
            expiration_date: None,
            description: None,
            category_id: Some(2),
        };
        let value = serde_json::to_value(update).unwrap();
        assert!(value.get("stock").is_none());
    }

    #[test]
    fn new_product_serializes_initial_stock_as_stock() {
        let product = NewProduct {
            name: "Caraotas".into(),
            code: Some("CB-01".into()),
            initial_stock: dec!(120.5),
            unit_measure: UnitMeasure::Kilograms,
            expiration_date: None,
            description: None,
            category_id: None,
        };
        let value = serde_json::to_value(product).unwrap();
        assert_eq!(value["stock"], serde_json::json!("120.5"));
        assert_eq!(value["unit_measure"], "kg");
    }
}
