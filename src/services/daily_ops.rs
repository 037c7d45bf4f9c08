use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::auth::Session;
use crate::client::BackendClient;
use crate::errors::ServiceError;
use crate::models::operation::{DailyOperation, Shift, StockIssue};

/// Result reported by the daily-operation procedure.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationSummary {
    #[serde(rename = "mensaje")]
    pub message: String,
}

/// Processes daily kitchen operations. The backend procedure records the
/// operation, computes each product's consumption from the configured
/// yields, and deducts stock lot by lot (oldest first); this client only
/// validates the request and renders the result.
#[derive(Clone)]
pub struct DailyOperationService {
    client: Arc<BackendClient>,
}

impl DailyOperationService {
    pub fn new(client: Arc<BackendClient>) -> Self {
        Self { client }
    }

    #[instrument(skip(self, session), fields(user = %session.profile.username, %date, %shift))]
    pub async fn process(
        &self,
        session: &Session,
        date: NaiveDate,
        shift: Shift,
        attendance: i32,
        product_ids: &[i64],
    ) -> Result<OperationSummary, ServiceError> {
        session.require_compose()?;

        if attendance < 1 {
            return Err(ServiceError::ValidationError(
                "attendance must be at least one student".to_string(),
            ));
        }
        if product_ids.is_empty() {
            return Err(ServiceError::ValidationError(
                "select at least one product to cook".to_string(),
            ));
        }
        let unique: HashSet<i64> = product_ids.iter().copied().collect();
        if unique.len() != product_ids.len() {
            return Err(ServiceError::ValidationError(
                "the same product cannot be selected more than once".to_string(),
            ));
        }

        let summary: OperationSummary = self
            .client
            .rpc(
                "procesar_operacion_diaria",
                &json!({
                    "p_fecha": date,
                    "p_turno": shift,
                    "p_asistencia": attendance,
                    "p_rubros": product_ids,
                }),
            )
            .await?;

        info!(products = product_ids.len(), "daily operation processed");
        Ok(summary)
    }

    /// Recent operations, newest first.
    #[instrument(skip(self))]
    pub async fn list(&self, limit: u32) -> Result<Vec<DailyOperation>, ServiceError> {
        self.client
            .table("registro_diario")
            .select("*")
            .order("fecha.desc")
            .limit(limit)
            .fetch()
            .await
    }

    /// The stock deductions recorded for one operation.
    #[instrument(skip(self))]
    pub async fn issues(&self, operation_id: i64) -> Result<Vec<StockIssue>, ServiceError> {
        self.client
            .table("output")
            .select("*")
            .eq("id_registro", operation_id)
            .order("id_output.asc")
            .fetch()
            .await
    }
}
