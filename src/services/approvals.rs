use std::sync::Arc;

use dashmap::DashMap;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::auth::Session;
use crate::client::BackendClient;
use crate::errors::ServiceError;
use crate::models::receipt::{Receipt, ReceiptWithLines};

/// Result reported by the approval procedure. The line count comes from the
/// backend's return value, not from a client-side recount.
#[derive(Debug, Clone, Deserialize)]
pub struct ApprovalOutcome {
    #[serde(rename = "productos_procesados")]
    pub products_processed: u32,
}

/// Drives the receipt decision workflow: lists pending receipts and
/// delegates the one-way `Pendiente -> Aprobada | Rechazada` transition to
/// the backend procedures, which also perform the stock mutation and the
/// audit-trail write.
///
/// A per-receipt in-flight set refuses a second decision while one is still
/// on the wire, so a single client cannot double-submit.
#[derive(Clone)]
pub struct ApprovalService {
    client: Arc<BackendClient>,
    in_flight: Arc<DashMap<i64, ()>>,
}

impl ApprovalService {
    pub fn new(client: Arc<BackendClient>) -> Self {
        Self {
            client,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Pending receipts, newest received first, with embedded lines.
    #[instrument(skip(self))]
    pub async fn list_pending(&self) -> Result<Vec<ReceiptWithLines>, ServiceError> {
        self.client
            .table("guia_entrada")
            .select("*,input(*)")
            .eq("estado", "Pendiente")
            .order("fecha.desc")
            .fetch()
            .await
    }

    /// Approves a pending receipt. The backend procedure flips the state and
    /// increments stock atomically; this is the only path by which receipt
    /// quantities reach product stock.
    #[instrument(skip(self, session), fields(user = %session.profile.username))]
    pub async fn approve(
        &self,
        session: &Session,
        receipt_id: i64,
        comments: Option<String>,
    ) -> Result<ApprovalOutcome, ServiceError> {
        session.require_approve()?;
        let _guard = self.begin_decision(receipt_id)?;

        let receipt = self.fetch_pending(receipt_id).await?;

        let outcome: ApprovalOutcome = self
            .client
            .rpc(
                "aprobar_guia",
                &json!({
                    "p_id_guia": receipt_id,
                    "p_comentarios": comments,
                }),
            )
            .await?;

        info!(
            receipt_id,
            reference = %receipt.sunagro_number,
            products = outcome.products_processed,
            "receipt approved"
        );
        Ok(outcome)
    }

    /// Rejects a pending receipt. The reason is mandatory: an empty or
    /// whitespace-only reason fails locally and never reaches the network.
    /// Rejection never mutates stock.
    #[instrument(skip(self, session, reason), fields(user = %session.profile.username))]
    pub async fn reject(
        &self,
        session: &Session,
        receipt_id: i64,
        reason: &str,
    ) -> Result<(), ServiceError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ServiceError::MissingRejectionReason);
        }
        session.require_approve()?;
        let _guard = self.begin_decision(receipt_id)?;

        let receipt = self.fetch_pending(receipt_id).await?;

        self.client
            .rpc::<_, serde_json::Value>(
                "rechazar_guia",
                &json!({
                    "p_id_guia": receipt_id,
                    "p_motivo": reason,
                }),
            )
            .await?;

        warn!(
            receipt_id,
            reference = %receipt.sunagro_number,
            "receipt rejected"
        );
        Ok(())
    }

    /// Loads the receipt and refuses locally if it is already terminal; no
    /// decision request goes out for decided receipts.
    async fn fetch_pending(&self, receipt_id: i64) -> Result<Receipt, ServiceError> {
        let receipt: Receipt = self
            .client
            .table("guia_entrada")
            .select("*")
            .eq("id_guia", receipt_id)
            .fetch_one()
            .await?;

        if receipt.status.is_terminal() {
            return Err(ServiceError::AlreadyDecided {
                id: receipt_id,
                status: receipt.status,
            });
        }
        Ok(receipt)
    }

    fn begin_decision(&self, receipt_id: i64) -> Result<DecisionGuard<'_>, ServiceError> {
        if self.in_flight.insert(receipt_id, ()).is_some() {
            return Err(ServiceError::DecisionInFlight(receipt_id));
        }
        Ok(DecisionGuard {
            set: &self.in_flight,
            receipt_id,
        })
    }
}

/// Releases the in-flight slot once the decision response is processed,
/// whichever way the call ends.
struct DecisionGuard<'a> {
    set: &'a DashMap<i64, ()>,
    receipt_id: i64,
}

impl Drop for DecisionGuard<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.receipt_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Role, Session};
    use crate::models::UserProfile;
    use assert_matches::assert_matches;
    use uuid::Uuid;

    fn service() -> ApprovalService {
        // Unroutable address: any test reaching the network would fail with
        // a transport error instead of the locally raised variants below.
        let client = Arc::new(
            BackendClient::new(
                "http://127.0.0.1:1",
                "key",
                None,
                std::time::Duration::from_secs(1),
            )
            .unwrap(),
        );
        ApprovalService::new(client)
    }

    fn session(role: Role) -> Session {
        Session {
            user_id: Uuid::nil(),
            email: None,
            profile: UserProfile {
                id: Uuid::nil(),
                username: "tester".into(),
                full_name: "Tester".into(),
                role_id: role.id(),
                is_active: true,
                created_at: None,
                last_seen_at: None,
                last_ip: None,
            },
            role,
        }
    }

    #[tokio::test]
    async fn non_approver_is_blocked_before_any_request() {
        let service = service();
        let err = service
            .approve(&session(Role::Operator), 1, None)
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::Forbidden(_));
    }

    #[tokio::test]
    async fn empty_rejection_reason_fails_locally() {
        let service = service();
        for reason in ["", "   ", "\n\t"] {
            let err = service
                .reject(&session(Role::Director), 1, reason)
                .await
                .unwrap_err();
            assert_matches!(err, ServiceError::MissingRejectionReason);
        }
    }

    #[tokio::test]
    async fn second_decision_while_in_flight_is_refused() {
        let service = service();
        service.in_flight.insert(7, ());
        let err = service
            .approve(&session(Role::Developer), 7, None)
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::DecisionInFlight(7));
    }

    #[tokio::test]
    async fn guard_is_released_after_a_failed_decision() {
        let service = service();
        // The fetch fails (unroutable backend), which must still release the
        // in-flight slot.
        let _ = service.approve(&session(Role::Director), 9, None).await;
        assert!(!service.in_flight.contains_key(&9));
    }
}
