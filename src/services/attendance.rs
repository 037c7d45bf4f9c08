use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::auth::Session;
use crate::client::BackendClient;
use crate::errors::ServiceError;
use crate::models::{AttendanceRecord, AuditAction};
use crate::services::audit::AuditService;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewAttendance {
    pub date: NaiveDate,
    #[validate(range(min = 1, message = "attendance must be at least one student"))]
    pub student_count: i32,
    pub notes: Option<String>,
}

#[derive(Serialize)]
struct AttendanceRow<'a> {
    fecha: NaiveDate,
    total_alumnos: i32,
    notas: Option<&'a str>,
    created_by: Uuid,
}

/// Daily attendance registry.
#[derive(Clone)]
pub struct AttendanceService {
    client: Arc<BackendClient>,
    audit: Option<Arc<AuditService>>,
}

impl AttendanceService {
    pub fn new(client: Arc<BackendClient>, audit: Option<Arc<AuditService>>) -> Self {
        Self { client, audit }
    }

    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<AttendanceRecord>, ServiceError> {
        self.client
            .table("asistencia_diaria")
            .select("*")
            .order("fecha.desc")
            .fetch()
            .await
    }

    /// Most recent head count, used to prefill portion calculations.
    #[instrument(skip(self))]
    pub async fn latest(&self) -> Result<Option<AttendanceRecord>, ServiceError> {
        self.client
            .table("asistencia_diaria")
            .select("*")
            .order("fecha.desc")
            .fetch_optional()
            .await
    }

    #[instrument(skip(self, session, attendance), fields(date = %attendance.date))]
    pub async fn record(
        &self,
        session: &Session,
        attendance: NewAttendance,
    ) -> Result<AttendanceRecord, ServiceError> {
        session.require_compose()?;
        attendance
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let row = AttendanceRow {
            fecha: attendance.date,
            total_alumnos: attendance.student_count,
            notas: attendance.notes.as_deref(),
            created_by: session.user_id,
        };
        let created: AttendanceRecord = self
            .client
            .table("asistencia_diaria")
            .insert_one(&[row])
            .await?;
        info!(attendance_id = created.id, "attendance recorded");

        if let Some(audit) = &self.audit {
            audit
                .record(
                    session,
                    AuditAction::Create,
                    "asistencia_diaria",
                    Some(created.id.to_string()),
                    json!({ "fecha": created.date, "total_alumnos": created.student_count }),
                )
                .await;
        }
        Ok(created)
    }

    #[instrument(skip(self, session, attendance))]
    pub async fn update(
        &self,
        session: &Session,
        attendance_id: i64,
        attendance: NewAttendance,
    ) -> Result<(), ServiceError> {
        session.require_compose()?;
        attendance
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        self.client
            .table("asistencia_diaria")
            .eq("id_asistencia", attendance_id)
            .update(&json!({
                "fecha": attendance.date,
                "total_alumnos": attendance.student_count,
                "notas": attendance.notes,
            }))
            .await?;

        if let Some(audit) = &self.audit {
            audit
                .record(
                    session,
                    AuditAction::Update,
                    "asistencia_diaria",
                    Some(attendance_id.to_string()),
                    json!({ "total_alumnos": attendance.student_count }),
                )
                .await;
        }
        Ok(())
    }

    #[instrument(skip(self, session))]
    pub async fn delete(&self, session: &Session, attendance_id: i64) -> Result<(), ServiceError> {
        session.require_compose()?;

        self.client
            .table("asistencia_diaria")
            .eq("id_asistencia", attendance_id)
            .delete()
            .await?;

        if let Some(audit) = &self.audit {
            audit
                .record(
                    session,
                    AuditAction::Delete,
                    "asistencia_diaria",
                    Some(attendance_id.to_string()),
                    json!({}),
                )
                .await;
        }
        Ok(())
    }
}
