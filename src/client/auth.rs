//! Auth endpoints: password-grant sign-in, sign-out, and the administrative
//! user-provisioning surface (requires the administrative key).

use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use super::BackendClient;
use crate::errors::ServiceError;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SignInResponse {
    access_token: String,
    user: AuthUser,
}

/// Error payload shape returned by the auth endpoints, which differs from
/// the table endpoints.
#[derive(Debug, Deserialize)]
struct AuthErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl BackendClient {
    /// Signs in with the password grant and installs the returned access
    /// token as the session bearer.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, ServiceError> {
        debug!(email, "signing in");
        let url = self.endpoint("auth/v1/token")?;
        let response = self
            .http()
            .request(Method::POST, url)
            .query(&[("grant_type", "password")])
            .header("apikey", self.anon_key())
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        let response = check_auth(response).await?;
        let tokens: SignInResponse = response.json().await?;
        self.set_bearer(Some(tokens.access_token));
        Ok(tokens.user)
    }

    /// Revokes the current session token. The local bearer is cleared even
    /// when the revocation call fails.
    pub async fn sign_out(&self) -> Result<(), ServiceError> {
        let result = async {
            let response = self.request(Method::POST, "auth/v1/logout")?.send().await?;
            check_auth(response).await?;
            Ok(())
        }
        .await;
        self.set_bearer(None);
        result
    }

    /// Creates a confirmed auth account. Administrative key required.
    pub async fn admin_create_user(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthUser, ServiceError> {
        let admin_key = self.admin_key()?.to_string();
        debug!(email, "provisioning auth account");
        let url = self.endpoint("auth/v1/admin/users")?;
        let response = self
            .http()
            .request(Method::POST, url)
            .header("apikey", admin_key.as_str())
            .bearer_auth(&admin_key)
            .json(&json!({
                "email": email,
                "password": password,
                "email_confirm": true,
            }))
            .send()
            .await?;

        let response = check_auth(response).await?;
        Ok(response.json().await?)
    }

    /// Resets an account's password. Administrative key required.
    pub async fn admin_update_password(
        &self,
        user_id: Uuid,
        password: &str,
    ) -> Result<(), ServiceError> {
        let admin_key = self.admin_key()?.to_string();
        let url = self.endpoint(&format!("auth/v1/admin/users/{}", user_id))?;
        let response = self
            .http()
            .request(Method::PUT, url)
            .header("apikey", admin_key.as_str())
            .bearer_auth(&admin_key)
            .json(&json!({ "password": password }))
            .send()
            .await?;
        check_auth(response).await?;
        Ok(())
    }

    /// Deletes an auth account. Used as the compensating step when profile
    /// creation fails after the account was provisioned.
    pub async fn admin_delete_user(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let admin_key = self.admin_key()?.to_string();
        let url = self.endpoint(&format!("auth/v1/admin/users/{}", user_id))?;
        let response = self
            .http()
            .request(Method::DELETE, url)
            .header("apikey", admin_key.as_str())
            .bearer_auth(&admin_key)
            .send()
            .await?;
        check_auth(response).await?;
        Ok(())
    }
}

async fn check_auth(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<AuthErrorBody>(&text)
        .ok()
        .and_then(|body| body.error_description.or(body.msg).or(body.error))
        .unwrap_or(text);

    Err(match status {
        reqwest::StatusCode::BAD_REQUEST | reqwest::StatusCode::UNAUTHORIZED => {
            ServiceError::Unauthorized(message)
        }
        reqwest::StatusCode::FORBIDDEN => ServiceError::Forbidden(message),
        _ => ServiceError::backend(status.as_u16(), message),
    })
}
