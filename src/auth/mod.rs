/*!
 * Session establishment and role-based capability resolution.
 *
 * Authorization is attribute-based: a single role attribute on the profile
 * drives every gating decision, resolved in exactly one place
 * (`Role::capabilities`). Components consume the capability set; no view or
 * service re-derives permissions from raw role ids. The client-side checks
 * are advisory only; the backend re-checks authority on every mutation.
 */

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::client::BackendClient;
use crate::errors::ServiceError;
use crate::models::UserProfile;

/// Authorization level of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum Role {
    /// Full authority, including approvals and user management.
    Director,
    /// Day-to-day data entry: receipts, attendance, menus, operations.
    Operator,
    /// Read-only oversight.
    Supervisor,
    /// Technical owner; same authority as the Director.
    Developer,
}

impl Role {
    pub fn from_id(id: i16) -> Result<Self, ServiceError> {
        match id {
            1 => Ok(Role::Director),
            2 => Ok(Role::Operator),
            3 => Ok(Role::Supervisor),
            4 => Ok(Role::Developer),
            other => Err(ServiceError::UnknownRole(other)),
        }
    }

    pub fn id(self) -> i16 {
        match self {
            Role::Director => 1,
            Role::Operator => 2,
            Role::Supervisor => 3,
            Role::Developer => 4,
        }
    }

    /// Resolves the capability set for this role. Single source of truth for
    /// authorization across every component.
    pub fn capabilities(self) -> Capabilities {
        match self {
            Role::Director | Role::Developer => Capabilities {
                can_compose: true,
                can_approve: true,
                can_manage_users: true,
                view_only: false,
            },
            Role::Operator => Capabilities {
                can_compose: true,
                can_approve: false,
                can_manage_users: false,
                view_only: false,
            },
            Role::Supervisor => Capabilities {
                can_compose: false,
                can_approve: false,
                can_manage_users: false,
                view_only: true,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub can_compose: bool,
    pub can_approve: bool,
    pub can_manage_users: bool,
    pub view_only: bool,
}

/// An authenticated session: the identity and role every service receives
/// explicitly instead of reading ambient state.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub profile: UserProfile,
    pub role: Role,
}

impl Session {
    pub fn capabilities(&self) -> Capabilities {
        self.role.capabilities()
    }

    pub fn require_compose(&self) -> Result<(), ServiceError> {
        if self.capabilities().can_compose {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "this role cannot register data".to_string(),
            ))
        }
    }

    pub fn require_approve(&self) -> Result<(), ServiceError> {
        if self.capabilities().can_approve {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "only the Director can decide receipts".to_string(),
            ))
        }
    }

    pub fn require_manage_users(&self) -> Result<(), ServiceError> {
        if self.capabilities().can_manage_users {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "only the Director can manage accounts".to_string(),
            ))
        }
    }
}

/// Signs in against the auth endpoint, loads the caller's profile and role,
/// and returns the session context. Disabled accounts are signed out again
/// and refused.
#[instrument(skip(client, password))]
pub async fn sign_in(
    client: &Arc<BackendClient>,
    email: &str,
    password: &str,
) -> Result<Session, ServiceError> {
    let user = client.sign_in(email, password).await?;

    let profile: UserProfile = client
        .table("users")
        .select("*")
        .eq("id_user", user.id)
        .fetch_one()
        .await?;

    if !profile.is_active {
        let _ = client.sign_out().await;
        return Err(ServiceError::Forbidden(
            "this account has been deactivated".to_string(),
        ));
    }

    let role = Role::from_id(profile.role_id)?;
    info!(user = %profile.username, role = %role, "session established");

    Ok(Session {
        user_id: user.id,
        email: user.email,
        profile,
        role,
    })
}

/// Ends the session and clears the client's bearer token.
pub async fn sign_out(client: &Arc<BackendClient>) -> Result<(), ServiceError> {
    client.sign_out().await
}

/// Rebuilds a session from a persisted access token (used by the CLI between
/// invocations). Fails if the token no longer resolves to an active profile.
pub async fn resume(
    client: &Arc<BackendClient>,
    user_id: Uuid,
    access_token: String,
) -> Result<Session, ServiceError> {
    client.set_bearer(Some(access_token));

    let profile: UserProfile = client
        .table("users")
        .select("*")
        .eq("id_user", user_id)
        .fetch_one()
        .await?;

    if !profile.is_active {
        client.set_bearer(None);
        return Err(ServiceError::Forbidden(
            "this account has been deactivated".to_string(),
        ));
    }

    let role = Role::from_id(profile.role_id)?;
    Ok(Session {
        user_id,
        email: None,
        profile,
        role,
    })
}
