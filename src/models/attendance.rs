use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Daily head count of students served.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    #[serde(rename = "id_asistencia")]
    pub id: i64,
    #[serde(rename = "fecha")]
    pub date: NaiveDate,
    #[serde(rename = "total_alumnos")]
    pub student_count: i32,
    #[serde(rename = "notas")]
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
}
