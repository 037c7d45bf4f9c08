use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Action recorded in the audit trail. `Approve`/`Reject` entries are
/// written by the backend procedures; the rest originate from this client.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Approve,
    Reject,
    Login,
    Logout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    #[serde(rename = "id_log")]
    pub id: i64,
    #[serde(rename = "id_user")]
    pub user_id: Option<Uuid>,
    pub action_type: AuditAction,
    pub table_affected: String,
    pub record_id: Option<String>,
    pub details: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}
