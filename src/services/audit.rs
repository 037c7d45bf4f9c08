use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::auth::Session;
use crate::client::BackendClient;
use crate::errors::ServiceError;
use crate::models::{AuditAction, AuditEntry};

/// Writes and reads the client-originated part of the audit trail.
/// Approval and rejection entries are written by the backend procedures,
/// not through this service.
#[derive(Clone)]
pub struct AuditService {
    client: Arc<BackendClient>,
}

#[derive(Serialize)]
struct NewAuditRow<'a> {
    id_user: Uuid,
    action_type: AuditAction,
    table_affected: &'a str,
    record_id: Option<String>,
    details: Value,
}

impl AuditService {
    pub fn new(client: Arc<BackendClient>) -> Self {
        Self { client }
    }

    /// Appends an audit entry. Best-effort: a failed write is logged and
    /// never fails the operation being audited.
    #[instrument(skip(self, session, details), fields(user = %session.profile.username))]
    pub async fn record(
        &self,
        session: &Session,
        action: AuditAction,
        table_affected: &str,
        record_id: Option<String>,
        details: Value,
    ) {
        let row = NewAuditRow {
            id_user: session.user_id,
            action_type: action,
            table_affected,
            record_id,
            details,
        };

        if let Err(err) = self
            .client
            .table("audit_log")
            .insert::<_, Value>(&[row])
            .await
        {
            warn!(table_affected, error = %err, "audit entry could not be written");
        }
    }

    /// Recent audit entries, newest first. Restricted to the roles with
    /// management authority.
    #[instrument(skip(self, session))]
    pub async fn list(
        &self,
        session: &Session,
        limit: u32,
    ) -> Result<Vec<AuditEntry>, ServiceError> {
        if !session.capabilities().can_manage_users {
            return Err(ServiceError::Forbidden(
                "only the Director can view the audit trail".to_string(),
            ));
        }

        self.client
            .table("audit_log")
            .select("*")
            .order("created_at.desc")
            .limit(limit)
            .fetch()
            .await
    }
}
