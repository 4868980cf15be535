//! Gateway core
//!
//! `Gateway` owns the configuration snapshot, the capability state (one
//! coarse lock), the upstream client pool, and the OAuth supervisors.
//! Federation (`federation`), reconciliation (`reconcile`) and the
//! aggregate MCP server (`server`) all hang off it.

pub mod federation;
pub mod reconcile;
pub mod server;

pub use server::McpGatewayServer;

use crate::capabilities::{CapabilityRegistry, ServerCapabilitySet, ToolRegistration};
use crate::client::{ChangeNotice, ClientPool};
use crate::config::Configuration;
use crate::dynamic::code_mode::CodeRuntime;
use crate::health::Health;
use crate::oauth::credentials::CredentialStore;
use crate::oauth::{OAuthProvider, ReloadFn};
use crate::secrets::SecretsProvider;
use crate::Result;
use parking_lot::Mutex;
use rmcp::service::{Peer, RoleServer};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Which capability kinds a reconcile touched; drives the listChanged
/// notifications sent to connected clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangedKinds {
    pub tools: bool,
    pub prompts: bool,
    pub resources: bool,
}

impl ChangedKinds {
    pub fn any(&self) -> bool {
        self.tools || self.prompts || self.resources
    }
}

/// Connected downstream peers, for change notifications.
#[derive(Default)]
pub struct NotificationBroker {
    peers: tokio::sync::Mutex<Vec<Peer<RoleServer>>>,
}

impl NotificationBroker {
    pub async fn register(&self, peer: Peer<RoleServer>) {
        self.peers.lock().await.push(peer);
    }

    /// Fan the listChanged notifications out to every live peer; peers
    /// that fail to accept one are dropped.
    pub async fn notify(&self, kinds: ChangedKinds) {
        if !kinds.any() {
            return;
        }

        let peers = {
            let guard = self.peers.lock().await;
            guard.clone()
        };

        let mut dead = Vec::new();
        for (i, peer) in peers.iter().enumerate() {
            let mut failed = false;
            if kinds.tools {
                failed |= peer.notify_tool_list_changed().await.is_err();
            }
            if kinds.prompts {
                failed |= peer.notify_prompt_list_changed().await.is_err();
            }
            if kinds.resources {
                failed |= peer.notify_resource_list_changed().await.is_err();
            }
            if failed {
                dead.push(i);
            }
        }

        if !dead.is_empty() {
            let mut guard = self.peers.lock().await;
            let mut index = 0usize;
            guard.retain(|_| {
                let drop_it = dead.contains(&index);
                index += 1;
                !drop_it
            });
        }
    }
}

/// Everything guarded by the capability lock.
#[derive(Default)]
pub struct GatewayState {
    pub registry: CapabilityRegistry,
    pub per_server: HashMap<String, ServerCapabilitySet>,
}

pub struct Gateway {
    /// Configuration snapshot; cloned by readers, mutated by meta-tools.
    configuration: Mutex<Configuration>,

    /// The capability lock.
    state: Mutex<GatewayState>,

    pool: Arc<ClientPool>,
    secrets: Arc<dyn SecretsProvider>,
    credentials: Arc<dyn CredentialStore>,
    code_runtime: Option<Arc<dyn CodeRuntime>>,

    health: Health,
    broker: NotificationBroker,
    providers: Mutex<HashMap<String, OAuthProvider>>,

    /// Tools added at runtime under the dynamic server (code-mode
    /// wrappers); re-registered across full reloads.
    dynamic_extra: Mutex<Vec<ToolRegistration>>,

    dynamic_tools: bool,
    shutdown: CancellationToken,
    http: reqwest::Client,
}

impl Gateway {
    pub fn new(
        configuration: Configuration,
        pool: Arc<ClientPool>,
        secrets: Arc<dyn SecretsProvider>,
        credentials: Arc<dyn CredentialStore>,
        code_runtime: Option<Arc<dyn CodeRuntime>>,
        dynamic_tools: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            configuration: Mutex::new(configuration),
            state: Mutex::new(GatewayState::default()),
            pool,
            secrets,
            credentials,
            code_runtime,
            health: Health::new(),
            broker: NotificationBroker::default(),
            providers: Mutex::new(HashMap::new()),
            dynamic_extra: Mutex::new(Vec::new()),
            dynamic_tools,
            shutdown: CancellationToken::new(),
            http: reqwest::Client::new(),
        })
    }

    pub fn health(&self) -> &Health {
        &self.health
    }

    pub fn broker(&self) -> &NotificationBroker {
        &self.broker
    }

    pub fn pool(&self) -> &Arc<ClientPool> {
        &self.pool
    }

    pub fn secrets(&self) -> &Arc<dyn SecretsProvider> {
        &self.secrets
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    pub fn code_runtime(&self) -> Option<&Arc<dyn CodeRuntime>> {
        self.code_runtime.as_ref()
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Clone of the current configuration snapshot.
    pub fn configuration_snapshot(&self) -> Configuration {
        self.configuration.lock().clone()
    }

    /// Mutate the configuration snapshot in place.
    pub fn with_configuration<R>(&self, f: impl FnOnce(&mut Configuration) -> R) -> R {
        f(&mut self.configuration.lock())
    }

    /// Run `f` under the capability lock.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut GatewayState) -> R) -> R {
        f(&mut self.state.lock())
    }

    /// Register a runtime-generated dynamic tool (code-mode wrapper).
    pub fn add_dynamic_tool(&self, registration: ToolRegistration) {
        self.dynamic_extra.lock().push(registration.clone());
        self.state.lock().registry.add_tool(registration);
    }

    pub(crate) fn dynamic_extra_snapshot(&self) -> Vec<ToolRegistration> {
        self.dynamic_extra.lock().clone()
    }

    /// Consume upstream change notices until shutdown.
    pub fn spawn_event_loop(
        self: &Arc<Self>,
        mut notices: mpsc::UnboundedReceiver<ChangeNotice>,
    ) -> JoinHandle<()> {
        let gateway = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    notice = notices.recv() => match notice {
                        Some(ChangeNotice { server }) => {
                            if let Err(e) = gateway.reload_server(&server, None).await {
                                tracing::warn!("reconcile of '{}' failed: {}", server, e);
                            }
                        }
                        None => break,
                    },
                    _ = gateway.shutdown.cancelled() => break,
                }
            }
        })
    }

    /// The reload callback handed to OAuth supervisors.
    pub fn reload_fn(self: &Arc<Self>) -> ReloadFn {
        let weak = Arc::downgrade(self);
        Arc::new(move |name: String| {
            let weak = weak.clone();
            Box::pin(async move {
                match weak.upgrade() {
                    Some(gateway) => {
                        // Drop the stale session so the restart picks up
                        // the fresh token, then re-federate.
                        gateway.pool.remove(&name);
                        gateway.reload_server(&name, None).await
                    }
                    None => Ok(()),
                }
            })
        })
    }

    /// Start an OAuth supervisor for one upstream, replacing any prior one.
    pub fn start_oauth_provider(self: &Arc<Self>, name: &str) {
        let provider = OAuthProvider::start(
            name.to_string(),
            self.credentials.clone(),
            self.reload_fn(),
            &self.shutdown,
        );
        if let Some(previous) = self.providers.lock().insert(name.to_string(), provider) {
            previous.stop();
        }
    }

    /// Start supervisors for every active, already-authorized
    /// remote-oauth upstream.
    pub async fn start_oauth_providers(self: &Arc<Self>) {
        let snapshot = self.configuration_snapshot();
        for server in snapshot.active_servers() {
            if server.oauth.is_none() {
                continue;
            }
            match self.credentials.status(&server.name).await {
                Ok(_) => self.start_oauth_provider(&server.name),
                Err(e) => {
                    tracing::debug!("no oauth supervisor for '{}': {}", server.name, e);
                }
            }
        }
    }

    /// Stop one upstream's OAuth supervisor, if running.
    pub fn stop_oauth_provider(&self, name: &str) {
        if let Some(provider) = self.providers.lock().remove(name) {
            provider.stop();
        }
    }

    /// Deliver a token-refreshed event to one upstream's supervisor.
    pub fn notify_oauth_event(&self, name: &str) -> bool {
        let providers = self.providers.lock();
        match providers.get(name) {
            Some(provider) => {
                provider.notify_token_refreshed();
                true
            }
            None => false,
        }
    }

    /// Graceful teardown: not-ready, cancel everything, close sessions.
    pub fn shutdown(&self) {
        self.health.set_ready(false);
        self.shutdown.cancel();

        let providers: Vec<_> = {
            let mut guard = self.providers.lock();
            guard.drain().map(|(_, p)| p).collect()
        };
        for provider in &providers {
            provider.stop();
        }

        self.pool.shutdown();
    }
}
