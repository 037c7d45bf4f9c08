use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{Role, Session};
use crate::client::BackendClient;
use crate::errors::ServiceError;
use crate::models::{AuditAction, UserProfile};
use crate::services::audit::AuditService;

const MIN_PASSWORD_LEN: u64 = 6;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewUserAccount {
    #[validate(email(message = "a valid email address is required"))]
    pub email: String,
    #[validate(length(min = 6, message = "the password needs at least 6 characters"))]
    pub password: String,
    #[validate(length(min = 1, message = "the full name is required"))]
    pub full_name: String,
    #[validate(length(min = 1, message = "the username is required"))]
    pub username: String,
    pub role: Role,
}

/// Profile update. The username is immutable once created; there is
/// deliberately no field for it here.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateUserAccount {
    #[validate(length(min = 1, message = "the full name is required"))]
    pub full_name: String,
    pub role: Role,
}

#[derive(Serialize)]
struct NewProfileRow<'a> {
    id_user: Uuid,
    username: &'a str,
    full_name: &'a str,
    id_rol: i16,
    is_active: bool,
}

/// Account administration: roster, provisioning, updates, deactivation and
/// password resets. Provisioning and resets go through the administrative
/// auth surface and therefore need the administrative key.
#[derive(Clone)]
pub struct UserService {
    client: Arc<BackendClient>,
    audit: Option<Arc<AuditService>>,
}

impl UserService {
    pub fn new(client: Arc<BackendClient>, audit: Option<Arc<AuditService>>) -> Self {
        Self { client, audit }
    }

    #[instrument(skip(self))]
    pub async fn roster(&self) -> Result<Vec<UserProfile>, ServiceError> {
        self.client
            .table("users")
            .select("*")
            .order("created_at.desc")
            .fetch()
            .await
    }

    /// Provisions an auth account plus its profile row. If the profile
    /// insert fails the auth account is deleted again so the two stores stay
    /// consistent.
    #[instrument(skip(self, session, account), fields(username = %account.username))]
    pub async fn create(
        &self,
        session: &Session,
        account: NewUserAccount,
    ) -> Result<UserProfile, ServiceError> {
        session.require_manage_users()?;
        check_assignable(session.role, account.role)?;
        account
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let auth_user = self
            .client
            .admin_create_user(&account.email, &account.password)
            .await?;

        let row = NewProfileRow {
            id_user: auth_user.id,
            username: &account.username,
            full_name: &account.full_name,
            id_rol: account.role.id(),
            is_active: true,
        };
        let profile: UserProfile = match self.client.table("users").insert_one(&[row]).await {
            Ok(profile) => profile,
            Err(err) => {
                error!(user_id = %auth_user.id, error = %err, "profile insert failed; removing auth account");
                if let Err(cleanup) = self.client.admin_delete_user(auth_user.id).await {
                    error!(user_id = %auth_user.id, error = %cleanup, "failed to remove orphaned auth account");
                }
                return Err(err);
            }
        };

        info!(user_id = %profile.id, role = %account.role, "account created");

        if let Some(audit) = &self.audit {
            audit
                .record(
                    session,
                    AuditAction::Create,
                    "users",
                    Some(profile.id.to_string()),
                    json!({ "username": profile.username, "id_rol": profile.role_id }),
                )
                .await;
        }
        Ok(profile)
    }

    #[instrument(skip(self, session, update))]
    pub async fn update(
        &self,
        session: &Session,
        user_id: Uuid,
        update: UpdateUserAccount,
    ) -> Result<(), ServiceError> {
        session.require_manage_users()?;
        update
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let target = self.fetch_profile(user_id).await?;
        guard_target(session, &target)?;
        check_assignable(session.role, update.role)?;

        self.client
            .table("users")
            .eq("id_user", user_id)
            .update(&json!({
                "full_name": update.full_name,
                "id_rol": update.role.id(),
            }))
            .await?;

        if let Some(audit) = &self.audit {
            audit
                .record(
                    session,
                    AuditAction::Update,
                    "users",
                    Some(user_id.to_string()),
                    json!({ "id_rol": update.role.id() }),
                )
                .await;
        }
        Ok(())
    }

    /// Activates or deactivates an account. A deactivated account keeps its
    /// history but can no longer establish a session.
    #[instrument(skip(self, session))]
    pub async fn set_active(
        &self,
        session: &Session,
        user_id: Uuid,
        active: bool,
    ) -> Result<(), ServiceError> {
        session.require_manage_users()?;

        let target = self.fetch_profile(user_id).await?;
        guard_target(session, &target)?;

        self.client
            .table("users")
            .eq("id_user", user_id)
            .update(&json!({ "is_active": active }))
            .await?;

        info!(user_id = %user_id, active, "account activation changed");

        if let Some(audit) = &self.audit {
            audit
                .record(
                    session,
                    AuditAction::Update,
                    "users",
                    Some(user_id.to_string()),
                    json!({ "is_active": active }),
                )
                .await;
        }
        Ok(())
    }

    #[instrument(skip(self, session, new_password))]
    pub async fn reset_password(
        &self,
        session: &Session,
        user_id: Uuid,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        session.require_manage_users()?;
        if (new_password.len() as u64) < MIN_PASSWORD_LEN {
            return Err(ServiceError::ValidationError(
                "the password needs at least 6 characters".to_string(),
            ));
        }

        let target = self.fetch_profile(user_id).await?;
        guard_target(session, &target)?;

        self.client.admin_update_password(user_id, new_password).await?;
        info!(user_id = %user_id, "password reset");
        Ok(())
    }

    async fn fetch_profile(&self, user_id: Uuid) -> Result<UserProfile, ServiceError> {
        self.client
            .table("users")
            .select("*")
            .eq("id_user", user_id)
            .fetch_one()
            .await
    }
}

/// Protection rules over an existing account: no self-service edits through
/// the administration surface, nobody touches a Developer, and a Director
/// cannot modify another Director.
fn guard_target(session: &Session, target: &UserProfile) -> Result<(), ServiceError> {
    if target.id == session.user_id {
        return Err(ServiceError::Forbidden(
            "your own account cannot be modified here".to_string(),
        ));
    }
    let target_role = Role::from_id(target.role_id)?;
    if target_role == Role::Developer {
        return Err(ServiceError::Forbidden(
            "Developer accounts cannot be modified".to_string(),
        ));
    }
    if session.role == Role::Director && target_role == Role::Director {
        return Err(ServiceError::Forbidden(
            "a Director cannot modify another Director".to_string(),
        ));
    }
    Ok(())
}

/// Role-assignment rules: Developer accounts are never provisioned through
/// this surface, and a Director can only grant Operator or Supervisor.
fn check_assignable(granter: Role, granted: Role) -> Result<(), ServiceError> {
    if granted == Role::Developer {
        return Err(ServiceError::Forbidden(
            "Developer accounts cannot be assigned".to_string(),
        ));
    }
    if granter == Role::Director && granted == Role::Director {
        return Err(ServiceError::Forbidden(
            "a Director cannot grant the Director role".to_string(),
        ));
    }
    Ok(())
}
