use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::auth::Session;
use crate::client::BackendClient;
use crate::errors::ServiceError;
use crate::models::portion::PortionRecipe;
use crate::models::product::UnitMeasure;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPortion {
    #[serde(rename = "id_product")]
    pub product_id: i64,
    #[serde(rename = "rendimiento_por_unidad")]
    pub yield_per_unit: Decimal,
    pub unit_measure: UnitMeasure,
    #[serde(rename = "notas")]
    pub notes: Option<String>,
}

/// A portion recipe joined with its product, as needed to compute what an
/// operation will consume.
#[derive(Debug, Clone, Deserialize)]
pub struct PortionWithProduct {
    #[serde(flatten)]
    pub recipe: PortionRecipe,
    pub product: PortionProductRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortionProductRef {
    pub product_name: String,
    pub unit_measure: UnitMeasure,
    pub stock: Decimal,
}

/// What cooking for a given head count would consume, per configured
/// product, and whether current stock covers it.
#[derive(Debug, Clone, Serialize)]
pub struct PortionRequirement {
    pub product_id: i64,
    pub product_name: String,
    pub unit_measure: UnitMeasure,
    pub required: Decimal,
    pub stock: Decimal,
    pub sufficient: bool,
}

/// Portion-yield configuration.
#[derive(Clone)]
pub struct PortionService {
    client: Arc<BackendClient>,
}

impl PortionService {
    pub fn new(client: Arc<BackendClient>) -> Self {
        Self { client }
    }

    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<PortionRecipe>, ServiceError> {
        self.client
            .table("receta_porcion")
            .select("*")
            .order("id_porcion.desc")
            .fetch()
            .await
    }

    #[instrument(skip(self, session, portion), fields(product_id = portion.product_id))]
    pub async fn configure(
        &self,
        session: &Session,
        portion: NewPortion,
    ) -> Result<PortionRecipe, ServiceError> {
        session.require_compose()?;
        validate_yield(portion.yield_per_unit)?;

        let created: PortionRecipe = self
            .client
            .table("receta_porcion")
            .insert_one(&[portion])
            .await?;
        info!(portion_id = created.id, "portion configured");
        Ok(created)
    }

    #[instrument(skip(self, session, portion))]
    pub async fn update(
        &self,
        session: &Session,
        portion_id: i64,
        portion: NewPortion,
    ) -> Result<(), ServiceError> {
        session.require_compose()?;
        validate_yield(portion.yield_per_unit)?;

        self.client
            .table("receta_porcion")
            .eq("id_porcion", portion_id)
            .update(&portion)
            .await
    }

    #[instrument(skip(self, session))]
    pub async fn delete(&self, session: &Session, portion_id: i64) -> Result<(), ServiceError> {
        session.require_compose()?;

        self.client
            .table("receta_porcion")
            .eq("id_porcion", portion_id)
            .delete()
            .await
    }

    /// Per-product consumption preview for a head count, against the
    /// configured yields and current stock.
    #[instrument(skip(self))]
    pub async fn requirements(
        &self,
        attendance: i32,
    ) -> Result<Vec<PortionRequirement>, ServiceError> {
        let recipes: Vec<PortionWithProduct> = self
            .client
            .table("receta_porcion")
            .select("*,product(product_name,unit_measure,stock)")
            .fetch()
            .await?;

        Ok(recipes
            .into_iter()
            .map(|entry| {
                let required = entry.recipe.required_quantity(attendance);
                PortionRequirement {
                    product_id: entry.recipe.product_id,
                    product_name: entry.product.product_name,
                    unit_measure: entry.product.unit_measure,
                    required,
                    stock: entry.product.stock,
                    sufficient: entry.product.stock >= required,
                }
            })
            .collect())
    }
}

fn validate_yield(yield_per_unit: Decimal) -> Result<(), ServiceError> {
    if yield_per_unit <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "the yield per unit must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn non_positive_yield_is_rejected() {
        assert!(validate_yield(Decimal::ZERO).is_err());
        assert!(validate_yield(dec!(-3)).is_err());
        assert!(validate_yield(dec!(0.5)).is_ok());
    }
}
