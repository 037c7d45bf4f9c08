use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Profile row for an account, keyed by the auth subject id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "id_user")]
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    #[serde(rename = "id_rol")]
    pub role_id: i16,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
    /// Liveness columns maintained by the heartbeat task.
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_ip: Option<String>,
}

fn default_active() -> bool {
    true
}
