use super::*;
use crate::catalog::ServerConfig;
use crate::GatewayError;
use rmcp::model::{
    CallToolResult, GetPromptResult, JsonObject, Prompt, ReadResourceResult, Resource,
    ResourceTemplate, Tool,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct StubRpc;

#[async_trait::async_trait]
impl UpstreamRpc for StubRpc {
    async fn list_tools(&self) -> crate::Result<Vec<Tool>> {
        Ok(vec![])
    }

    async fn list_prompts(&self) -> crate::Result<Vec<Prompt>> {
        Ok(vec![])
    }

    async fn list_resources(&self) -> crate::Result<Vec<Resource>> {
        Ok(vec![])
    }

    async fn list_resource_templates(&self) -> crate::Result<Vec<ResourceTemplate>> {
        Ok(vec![])
    }

    async fn call_tool(&self, _name: &str, _args: JsonObject) -> crate::Result<CallToolResult> {
        Ok(CallToolResult::success(vec![]))
    }

    async fn get_prompt(
        &self,
        name: &str,
        _args: Option<JsonObject>,
    ) -> crate::Result<GetPromptResult> {
        Err(GatewayError::not_found("prompt", name))
    }

    async fn read_resource(&self, uri: &str) -> crate::Result<ReadResourceResult> {
        Err(GatewayError::not_found("resource", uri))
    }
}

/// Factory that counts starts, optionally failing the first N and
/// optionally stalling so concurrent acquires overlap.
struct StubFactory {
    starts: AtomicUsize,
    fail_first: usize,
    delay: Option<Duration>,
}

impl StubFactory {
    fn new() -> Self {
        Self {
            starts: AtomicUsize::new(0),
            fail_first: 0,
            delay: None,
        }
    }

    fn failing(n: usize) -> Self {
        Self {
            fail_first: n,
            ..Self::new()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SessionFactory for StubFactory {
    async fn start(
        &self,
        server: &ServerConfig,
        _ctx: &StartContext,
    ) -> crate::Result<Arc<dyn UpstreamRpc>> {
        let n = self.starts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if n < self.fail_first {
            return Err(GatewayError::upstream(&server.name, "boom"));
        }
        Ok(Arc::new(StubRpc))
    }
}

fn server(name: &str) -> ServerConfig {
    ServerConfig {
        name: name.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_acquire_shares_one_session() {
    let factory = Arc::new(StubFactory::new());
    let pool = ClientPool::new(factory.clone());
    let cfg = server("fs");
    let ctx = StartContext::default();

    let a = pool.acquire(&cfg, &ctx).await.unwrap();
    let b = pool.acquire(&cfg, &ctx).await.unwrap();

    assert_eq!(factory.start_count(), 1);
    assert_eq!(pool.ref_count("fs"), Some(2));

    drop(a);
    assert_eq!(pool.ref_count("fs"), Some(1));
    drop(b);
    assert_eq!(pool.ref_count("fs"), Some(0));
}

#[tokio::test]
async fn test_session_stays_warm_after_release() {
    let factory = Arc::new(StubFactory::new());
    let pool = ClientPool::new(factory.clone());
    let cfg = server("fs");
    let ctx = StartContext::default();

    drop(pool.acquire(&cfg, &ctx).await.unwrap());

    // Re-acquire after the count hit zero; the session was kept warm.
    let _again = pool.acquire(&cfg, &ctx).await.unwrap();
    assert_eq!(factory.start_count(), 1);
}

#[tokio::test]
async fn test_concurrent_acquires_deduplicate_startup() {
    let factory = Arc::new(StubFactory::slow(Duration::from_millis(50)));
    let pool = ClientPool::new(factory.clone());
    let cfg = server("fs");
    let ctx = StartContext::default();

    let first = {
        let pool = pool.clone();
        let cfg = cfg.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move { pool.acquire(&cfg, &ctx).await.map(|_| ()) })
    };
    let second = {
        let pool = pool.clone();
        let cfg = cfg.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move { pool.acquire(&cfg, &ctx).await.map(|_| ()) })
    };

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    assert_eq!(factory.start_count(), 1);
}

#[tokio::test]
async fn test_startup_failure_is_not_cached() {
    let factory = Arc::new(StubFactory::failing(1));
    let pool = ClientPool::new(factory.clone());
    let cfg = server("flaky");
    let ctx = StartContext::default();

    let err = pool.acquire(&cfg, &ctx).await.unwrap_err();
    assert!(matches!(err, GatewayError::Upstream { .. }));

    // The failed slot was cleared; the retry starts fresh and succeeds.
    let _ok = pool.acquire(&cfg, &ctx).await.unwrap();
    assert_eq!(factory.start_count(), 2);
}

#[tokio::test]
async fn test_remove_allows_restart() {
    let factory = Arc::new(StubFactory::new());
    let pool = ClientPool::new(factory.clone());
    let cfg = server("fs");
    let ctx = StartContext::default();

    let handle = pool.acquire(&cfg, &ctx).await.unwrap();
    pool.remove("fs");

    // The in-flight borrow still works against the old session.
    assert!(handle.list_tools().await.unwrap().is_empty());
    drop(handle);

    let _restarted = pool.acquire(&cfg, &ctx).await.unwrap();
    assert_eq!(factory.start_count(), 2);
}
