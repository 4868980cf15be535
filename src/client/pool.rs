//! Upstream client pool
//!
//! At most one live session per upstream. Concurrent acquires during
//! startup share the eventual session: the first caller starts it behind
//! a placeholder slot, the rest wait on the slot's watch channel. The
//! pool lock is only ever held for map bookkeeping, never across
//! startup.
//!
//! Idle policy: a session whose ref count reaches zero stays warm until
//! its upstream is removed or the pool shuts down.

use super::{SessionFactory, UpstreamRpc};
use crate::catalog::ServerConfig;
use crate::config::StartContext;
use crate::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::watch;

enum PoolSlot {
    /// Startup in flight; waiters hang off the receiver.
    Starting(watch::Receiver<()>),
    Ready(ReadyEntry),
}

struct ReadyEntry {
    session: Arc<dyn UpstreamRpc>,
    refs: usize,
}

pub struct ClientPool {
    factory: Arc<dyn SessionFactory>,
    entries: Mutex<HashMap<String, PoolSlot>>,
}

/// Borrowed session. Dropping the handle releases the pool reference;
/// the session itself stays alive for any in-flight callers.
pub struct ClientHandle {
    pool: Arc<ClientPool>,
    name: String,
    session: Arc<dyn UpstreamRpc>,
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Deref for ClientHandle {
    type Target = dyn UpstreamRpc;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        self.pool.release(&self.name);
    }
}

/// Removes an abandoned Starting slot if the starter never finished
/// (error or cancellation); dropping the sender wakes all waiters.
struct StartGuard<'a> {
    pool: &'a ClientPool,
    name: &'a str,
    completed: bool,
    _tx: watch::Sender<()>,
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            let mut entries = self.pool.entries.lock();
            if matches!(entries.get(self.name), Some(PoolSlot::Starting(_))) {
                entries.remove(self.name);
            }
        }
    }
}

enum Action {
    Use(Arc<dyn UpstreamRpc>),
    Wait(watch::Receiver<()>),
    Start(watch::Sender<()>),
}

impl ClientPool {
    pub fn new(factory: Arc<dyn SessionFactory>) -> Arc<Self> {
        Arc::new(Self {
            factory,
            entries: Mutex::new(HashMap::new()),
        })
    }

    /// Borrow the session for `server`, starting it if necessary.
    pub async fn acquire(
        self: &Arc<Self>,
        server: &ServerConfig,
        ctx: &StartContext,
    ) -> Result<ClientHandle> {
        loop {
            let action = {
                let mut entries = self.entries.lock();
                match entries.get_mut(&server.name) {
                    Some(PoolSlot::Ready(entry)) => {
                        entry.refs += 1;
                        Action::Use(entry.session.clone())
                    }
                    Some(PoolSlot::Starting(rx)) => Action::Wait(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(());
                        entries.insert(server.name.clone(), PoolSlot::Starting(rx));
                        Action::Start(tx)
                    }
                }
            };

            match action {
                Action::Use(session) => {
                    return Ok(ClientHandle {
                        pool: self.clone(),
                        name: server.name.clone(),
                        session,
                    });
                }
                Action::Wait(mut rx) => {
                    // Wakes on completion or on the starter dropping out.
                    let _ = rx.changed().await;
                }
                Action::Start(tx) => {
                    let mut guard = StartGuard {
                        pool: self,
                        name: &server.name,
                        completed: false,
                        _tx: tx,
                    };

                    let session = self.factory.start(server, ctx).await?;

                    let mut entries = self.entries.lock();
                    entries.insert(
                        server.name.clone(),
                        PoolSlot::Ready(ReadyEntry {
                            session: session.clone(),
                            refs: 1,
                        }),
                    );
                    guard.completed = true;
                    drop(entries);

                    return Ok(ClientHandle {
                        pool: self.clone(),
                        name: server.name.clone(),
                        session,
                    });
                }
            }
        }
    }

    fn release(&self, name: &str) {
        let mut entries = self.entries.lock();
        if let Some(PoolSlot::Ready(entry)) = entries.get_mut(name) {
            entry.refs = entry.refs.saturating_sub(1);
        }
    }

    /// Tear down one upstream's session. In-flight borrows keep the
    /// session alive until they drop.
    pub fn remove(&self, name: &str) {
        if self.entries.lock().remove(name).is_some() {
            tracing::debug!("closed pooled session for '{}'", name);
        }
    }

    /// Tear down every session.
    pub fn shutdown(&self) {
        self.entries.lock().clear();
    }

    #[cfg(test)]
    pub(crate) fn ref_count(&self, name: &str) -> Option<usize> {
        match self.entries.lock().get(name) {
            Some(PoolSlot::Ready(entry)) => Some(entry.refs),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "pool_test.rs"]
mod pool_test;
