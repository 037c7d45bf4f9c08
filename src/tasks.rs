//! Cancellable background polling: the session liveness heartbeat and the
//! user-roster refresh.
//!
//! Both loops are plain re-fetch-and-overwrite operations with no
//! coordination between sessions; the backend arbitrates consistency. Each
//! is tied to an explicit [`TaskHandle`]: `stop()` ends the loop and awaits
//! it, and dropping the handle aborts the task so no timer outlives its
//! owner.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::auth::Session;
use crate::client::BackendClient;
use crate::errors::ServiceError;
use crate::models::UserProfile;

/// Handle to a running polling task.
pub struct TaskHandle {
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl TaskHandle {
    /// Signals the loop to end and waits for it to finish its current
    /// iteration. Nothing fires after this returns.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[derive(Debug, Deserialize)]
struct IpLookupResponse {
    ip: String,
}

/// Starts the liveness heartbeat for a session. The public IP is resolved
/// once at startup through the third-party lookup endpoint; failure to
/// resolve it is tolerated and the heartbeat simply omits the address.
pub fn start_heartbeat(
    client: Arc<BackendClient>,
    session: Arc<Session>,
    ip_lookup_url: String,
    interval: Duration,
) -> TaskHandle {
    let (shutdown, mut signal) = watch::channel(false);
    let handle = tokio::spawn(async move {
        let ip = resolve_public_ip(&client, &ip_lookup_url).await;
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = beat(&client, &session, ip.as_deref()).await {
                        warn!(error = %err, "heartbeat update failed");
                    }
                }
                _ = signal.changed() => {
                    info!("heartbeat stopped");
                    break;
                }
            }
        }
    });

    TaskHandle {
        shutdown,
        handle: Some(handle),
    }
}

/// Starts the periodic roster refresh. The latest snapshot is published on
/// the returned watch channel; each refresh overwrites the previous one.
pub fn start_roster_watch(
    client: Arc<BackendClient>,
    interval: Duration,
) -> (TaskHandle, watch::Receiver<Vec<UserProfile>>) {
    let (roster_tx, roster_rx) = watch::channel(Vec::new());
    let (shutdown, mut signal) = watch::channel(false);
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match fetch_roster(&client).await {
                        Ok(users) => {
                            debug!(count = users.len(), "roster refreshed");
                            let _ = roster_tx.send(users);
                        }
                        Err(err) => warn!(error = %err, "roster refresh failed"),
                    }
                }
                _ = signal.changed() => {
                    info!("roster refresh stopped");
                    break;
                }
            }
        }
    });

    (
        TaskHandle {
            shutdown,
            handle: Some(handle),
        },
        roster_rx,
    )
}

#[instrument(skip(client))]
async fn resolve_public_ip(client: &BackendClient, lookup_url: &str) -> Option<String> {
    let result = async {
        let response = client.http().get(lookup_url).send().await?;
        response.json::<IpLookupResponse>().await
    }
    .await;

    match result {
        Ok(body) => {
            debug!(ip = %body.ip, "public IP resolved");
            Some(body.ip)
        }
        Err(err) => {
            warn!(error = %err, "public IP lookup failed; heartbeat will omit the address");
            None
        }
    }
}

async fn beat(
    client: &BackendClient,
    session: &Session,
    ip: Option<&str>,
) -> Result<(), ServiceError> {
    let mut payload = json!({ "last_seen_at": Utc::now() });
    if let Some(ip) = ip {
        payload["last_ip"] = json!(ip);
    }

    client
        .table("users")
        .eq("id_user", session.user_id)
        .update(&payload)
        .await
}

async fn fetch_roster(client: &BackendClient) -> Result<Vec<UserProfile>, ServiceError> {
    client
        .table("users")
        .select("*")
        .order("created_at.desc")
        .fetch()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use uuid::Uuid;

    fn test_client() -> Arc<BackendClient> {
        Arc::new(
            BackendClient::new(
                "http://127.0.0.1:1",
                "key",
                None,
                Duration::from_millis(200),
            )
            .unwrap(),
        )
    }

    fn test_session() -> Arc<Session> {
        Arc::new(Session {
            user_id: Uuid::nil(),
            email: None,
            profile: UserProfile {
                id: Uuid::nil(),
                username: "op".into(),
                full_name: "Operator".into(),
                role_id: Role::Operator.id(),
                is_active: true,
                created_at: None,
                last_seen_at: None,
                last_ip: None,
            },
            role: Role::Operator,
        })
    }

    #[tokio::test]
    async fn heartbeat_stops_promptly() {
        let handle = start_heartbeat(
            test_client(),
            test_session(),
            "http://127.0.0.1:1/ip".into(),
            Duration::from_secs(3600),
        );
        tokio::time::timeout(Duration::from_secs(5), handle.stop())
            .await
            .expect("stop() should resolve well before the next tick");
    }

    #[tokio::test]
    async fn roster_watch_stops_promptly_and_starts_empty() {
        let (handle, roster) = start_roster_watch(test_client(), Duration::from_secs(3600));
        assert!(roster.borrow().is_empty());
        tokio::time::timeout(Duration::from_secs(5), handle.stop())
            .await
            .expect("stop() should resolve well before the next tick");
    }
}
