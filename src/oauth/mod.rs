//! OAuth provider supervision
//!
//! One supervisor task per remote-oauth upstream. The task polls token
//! status and branches on it: while the token is valid it sleeps until
//! shortly before expiry; once a refresh is due it fires one and parks
//! until the refresh event arrives (or gives up after a hard timeout).
//! A stopped supervisor stays stopped until `mcp-add` starts a new one.

pub mod credentials;
pub mod dcr;

use crate::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use credentials::{CredentialStore, REFRESH_MARGIN_SECS};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Never arm the expiry timer for less than this.
const MIN_REFRESH_DELAY: Duration = Duration::from_secs(60);

/// How long a fired refresh may take before the supervisor gives up.
const REFRESH_EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Events delivered to a supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderEvent {
    /// A token transitioned to valid (refresh completed, or the
    /// authorization callback landed).
    TokenRefreshed,
    /// The auth API rejected us; the supervisor must stop.
    Unauthorized,
}

/// Re-federates one upstream after its token changed.
pub type ReloadFn = Arc<dyn Fn(String) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Handle to one running supervisor.
pub struct OAuthProvider {
    name: String,
    events: mpsc::Sender<ProviderEvent>,
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

impl OAuthProvider {
    /// Spawn a supervisor for `name`. The task exits when the parent
    /// token cancels, `stop` is called, or the state machine stops.
    pub fn start(
        name: String,
        store: Arc<dyn CredentialStore>,
        reload: ReloadFn,
        parent: &CancellationToken,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(8);
        let stop = parent.child_token();

        let handle = tokio::spawn(run_supervisor(
            name.clone(),
            store,
            reload,
            events_tx.clone(),
            events_rx,
            stop.clone(),
        ));

        Self {
            name,
            events: events_tx,
            stop,
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deliver a token-refreshed event (e.g. from the authorization
    /// callback or an auth SSE stream).
    pub fn notify_token_refreshed(&self) {
        let _ = self.events.try_send(ProviderEvent::TokenRefreshed);
    }

    /// Signal the supervisor to exit.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Wait for the supervisor task to finish.
    pub async fn join(self) {
        let _ = self.handle.await;
    }

    pub fn is_stopped(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Delay until the next evaluation while a token is still valid:
/// (expiry − now) − refresh margin, floored at one minute.
pub(crate) fn compute_refresh_delay(
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Duration {
    let Some(expires_at) = expires_at else {
        return MIN_REFRESH_DELAY;
    };

    let until_refresh = (expires_at - now) - ChronoDuration::seconds(REFRESH_MARGIN_SECS);
    match until_refresh.to_std() {
        Ok(delay) => delay.max(MIN_REFRESH_DELAY),
        Err(_) => MIN_REFRESH_DELAY,
    }
}

async fn run_supervisor(
    name: String,
    store: Arc<dyn CredentialStore>,
    reload: ReloadFn,
    events_tx: mpsc::Sender<ProviderEvent>,
    mut events_rx: mpsc::Receiver<ProviderEvent>,
    stop: CancellationToken,
) {
    loop {
        let status = match store.status(&name).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!("oauth provider '{}': cannot read token status: {}", name, e);
                break;
            }
        };

        if status.needs_refresh {
            spawn_refresh(&name, &store, &events_tx);

            tokio::select! {
                event = events_rx.recv() => match event {
                    Some(ProviderEvent::TokenRefreshed) => {
                        run_reload(&reload, &name).await;
                        continue;
                    }
                    Some(ProviderEvent::Unauthorized) | None => break,
                },
                _ = tokio::time::sleep(REFRESH_EVENT_TIMEOUT) => {
                    tracing::warn!("oauth provider '{}': refresh event lost, stopping", name);
                    break;
                }
                _ = stop.cancelled() => break,
            }
        } else {
            let delay = compute_refresh_delay(status.expires_at, Utc::now());

            tokio::select! {
                _ = tokio::time::sleep(delay) => continue,
                event = events_rx.recv() => match event {
                    Some(ProviderEvent::TokenRefreshed) => {
                        run_reload(&reload, &name).await;
                        continue;
                    }
                    Some(ProviderEvent::Unauthorized) | None => break,
                },
                _ = stop.cancelled() => break,
            }
        }
    }

    tracing::debug!("oauth provider '{}' stopped", name);
}

/// Fire the refresh without blocking the evaluate loop; the outcome comes
/// back as an event.
fn spawn_refresh(
    name: &str,
    store: &Arc<dyn CredentialStore>,
    events_tx: &mpsc::Sender<ProviderEvent>,
) {
    let name = name.to_string();
    let store = store.clone();
    let events_tx = events_tx.clone();

    tokio::spawn(async move {
        match store.refresh(&name).await {
            Ok(()) => {
                let _ = events_tx.send(ProviderEvent::TokenRefreshed).await;
            }
            Err(e) if e.is_unauthorized() => {
                tracing::warn!("oauth refresh for '{}' unauthorized", name);
                let _ = events_tx.send(ProviderEvent::Unauthorized).await;
            }
            Err(e) => {
                // Transient failure: no event, the 10s ceiling handles it.
                tracing::warn!("oauth refresh for '{}' failed: {}", name, e);
            }
        }
    });
}

async fn run_reload(reload: &ReloadFn, name: &str) {
    if let Err(e) = reload(name.to_string()).await {
        tracing::warn!("reload after token refresh for '{}' failed: {}", name, e);
    }
}

#[cfg(test)]
mod provider_test;
