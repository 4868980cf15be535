use super::credentials::{CredentialStore, StoredCredential, TokenStatus};
use super::*;
use crate::error::OAuthError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn test_refresh_delay_floors_at_one_minute() {
    // 4:30 until expiry minus the 5:00 margin is negative; floor wins.
    let now = Utc::now();
    let expires = now + ChronoDuration::seconds(4 * 60 + 30);
    assert_eq!(
        compute_refresh_delay(Some(expires), now),
        Duration::from_secs(60)
    );
}

#[test]
fn test_refresh_delay_subtracts_margin() {
    let now = Utc::now();
    let expires = now + ChronoDuration::minutes(30);
    assert_eq!(
        compute_refresh_delay(Some(expires), now),
        Duration::from_secs(25 * 60)
    );
}

#[test]
fn test_refresh_delay_without_expiry() {
    assert_eq!(compute_refresh_delay(None, Utc::now()), Duration::from_secs(60));
}

#[test]
fn test_refresh_delay_for_expired_token() {
    let now = Utc::now();
    let expires = now - ChronoDuration::minutes(1);
    assert_eq!(
        compute_refresh_delay(Some(expires), now),
        Duration::from_secs(60)
    );
}

/// Store that replays a scripted sequence of statuses.
struct ScriptedStore {
    statuses: Mutex<VecDeque<TokenStatus>>,
    refresh_ok: bool,
    refreshes: AtomicUsize,
}

impl ScriptedStore {
    fn new(statuses: Vec<TokenStatus>, refresh_ok: bool) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            refresh_ok,
            refreshes: AtomicUsize::new(0),
        }
    }

    fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CredentialStore for ScriptedStore {
    async fn status(&self, server: &str) -> crate::Result<TokenStatus> {
        self.statuses
            .lock()
            .pop_front()
            .ok_or_else(|| OAuthError::NoCredential(server.to_string()).into())
    }

    async fn access_token(&self, _server: &str) -> crate::Result<Option<String>> {
        Ok(Some("token".into()))
    }

    async fn refresh(&self, server: &str) -> crate::Result<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.refresh_ok {
            Ok(())
        } else {
            Err(OAuthError::Unauthorized(server.to_string()).into())
        }
    }

    async fn store(&self, _server: &str, _credential: StoredCredential) -> crate::Result<()> {
        Ok(())
    }

    async fn remove(&self, _server: &str) -> crate::Result<()> {
        Ok(())
    }
}

fn recording_reload() -> (ReloadFn, Arc<Mutex<Vec<String>>>) {
    let calls: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let recorded = calls.clone();
    let reload: ReloadFn = Arc::new(move |name: String| {
        let recorded = recorded.clone();
        Box::pin(async move {
            recorded.lock().push(name);
            Ok(())
        })
    });
    (reload, calls)
}

fn valid_status(minutes: i64) -> TokenStatus {
    TokenStatus {
        expires_at: Some(Utc::now() + ChronoDuration::minutes(minutes)),
        needs_refresh: false,
    }
}

fn refresh_due_status() -> TokenStatus {
    TokenStatus {
        expires_at: Some(Utc::now() + ChronoDuration::minutes(2)),
        needs_refresh: true,
    }
}

#[tokio::test]
async fn test_supervisor_stops_when_status_unreadable() {
    let store = Arc::new(ScriptedStore::new(vec![], true));
    let (reload, calls) = recording_reload();
    let parent = CancellationToken::new();

    let provider = OAuthProvider::start("gh".into(), store, reload, &parent);
    provider.join().await;

    assert!(calls.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_refresh_then_reload() {
    // First poll wants a refresh; the follow-up poll sees a fresh token.
    let store = Arc::new(ScriptedStore::new(
        vec![refresh_due_status(), valid_status(60)],
        true,
    ));
    let (reload, calls) = recording_reload();
    let parent = CancellationToken::new();

    let provider = OAuthProvider::start("notion-remote".into(), store.clone(), reload, &parent);

    // Let the refresh task fire its event and the reload run.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(store.refresh_count(), 1);
    assert_eq!(calls.lock().as_slice(), ["notion-remote".to_string()]);
    assert!(!provider.is_stopped());

    provider.stop();
    provider.join().await;
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_stops_when_refresh_event_lost() {
    struct SilentStore;

    #[async_trait::async_trait]
    impl CredentialStore for SilentStore {
        async fn status(&self, _server: &str) -> crate::Result<TokenStatus> {
            Ok(TokenStatus {
                expires_at: Some(Utc::now()),
                needs_refresh: true,
            })
        }

        async fn access_token(&self, _server: &str) -> crate::Result<Option<String>> {
            Ok(None)
        }

        async fn refresh(&self, _server: &str) -> crate::Result<()> {
            // Hang past the supervisor's ceiling; no event ever arrives.
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        async fn store(&self, _server: &str, _credential: StoredCredential) -> crate::Result<()> {
            Ok(())
        }

        async fn remove(&self, _server: &str) -> crate::Result<()> {
            Ok(())
        }
    }

    let (reload, calls) = recording_reload();
    let parent = CancellationToken::new();

    let provider = OAuthProvider::start("gh".into(), Arc::new(SilentStore), reload, &parent);
    provider.join().await;

    // Stopped via the 10s ceiling without ever reloading.
    assert!(calls.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_stops_on_unauthorized_refresh() {
    let store = Arc::new(ScriptedStore::new(vec![refresh_due_status()], false));
    let (reload, calls) = recording_reload();
    let parent = CancellationToken::new();

    let provider = OAuthProvider::start("gh".into(), store.clone(), reload, &parent);
    provider.join().await;

    assert_eq!(store.refresh_count(), 1);
    assert!(calls.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_external_event_triggers_reload_while_valid() {
    let store = Arc::new(ScriptedStore::new(
        vec![valid_status(60), valid_status(60)],
        true,
    ));
    let (reload, calls) = recording_reload();
    let parent = CancellationToken::new();

    let provider = OAuthProvider::start("notion-remote".into(), store, reload, &parent);

    tokio::time::sleep(Duration::from_millis(10)).await;
    provider.notify_token_refreshed();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(calls.lock().as_slice(), ["notion-remote".to_string()]);

    provider.stop();
    provider.join().await;
}
