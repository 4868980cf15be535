use super::*;
use crate::test_support::{stub_gateway, StubCapabilities, StubFactory};
use std::sync::Arc;

#[tokio::test]
async fn test_reload_merges_upstream_capabilities() {
    let factory = Arc::new(
        StubFactory::new()
            .with_server("a", StubCapabilities::tools(&["x", "y"]))
            .with_server("b", StubCapabilities::tools(&["y", "z"])),
    );
    let gateway = stub_gateway(factory, &["a", "b"], false);

    gateway.reload().await.unwrap();

    // One record per key; the shared "y" resolved last-writer-wins to b.
    let (count, y_owner) = gateway.with_state(|s| {
        (
            s.registry.tool_count(),
            s.registry.tool("y").unwrap().server_name.clone(),
        )
    });
    assert_eq!(count, 3);
    assert_eq!(y_owner, "b");

    gateway.with_state(|s| {
        assert_eq!(s.per_server["a"].tool_names(), vec!["x", "y"]);
        assert_eq!(s.per_server["b"].tool_names(), vec!["y", "z"]);
    });

    assert!(gateway.health().ready());
}

#[tokio::test]
async fn test_reload_survives_unreachable_upstream() {
    // "down" has no stub entry, so its startup fails.
    let factory =
        Arc::new(StubFactory::new().with_server("up", StubCapabilities::tools(&["ping"])));
    let gateway = stub_gateway(factory, &["up", "down"], false);

    gateway.reload().await.unwrap();

    gateway.with_state(|s| {
        assert_eq!(s.registry.tool_count(), 1);
        assert!(s.per_server["down"].is_empty());
    });
    assert!(gateway.health().ready());
}

#[tokio::test]
async fn test_reload_tolerates_tool_list_failure() {
    let broken = StubCapabilities {
        fail_tool_list: true,
        ..Default::default()
    };
    let factory = Arc::new(
        StubFactory::new()
            .with_server("ok", StubCapabilities::tools(&["ping"]))
            .with_server("broken", broken),
    );
    let gateway = stub_gateway(factory, &["ok", "broken"], false);

    gateway.reload().await.unwrap();

    gateway.with_state(|s| {
        assert_eq!(s.registry.tool_count(), 1);
        assert!(s.registry.tool("ping").is_ok());
    });
}

#[tokio::test]
async fn test_reload_rebuilds_from_scratch() {
    let factory =
        Arc::new(StubFactory::new().with_server("a", StubCapabilities::tools(&["x"])));
    let gateway = stub_gateway(factory, &["a"], false);

    gateway.reload().await.unwrap();
    // Deactivate "a" and reload: its capabilities must be gone.
    gateway.with_configuration(|c| c.remove_server_name("a"));
    gateway.reload().await.unwrap();

    gateway.with_state(|s| {
        assert_eq!(s.registry.tool_count(), 0);
        assert!(s.per_server.is_empty());
    });
}

#[tokio::test]
async fn test_reload_applies_per_server_enabled_tools() {
    let factory = Arc::new(
        StubFactory::new().with_server("fs", StubCapabilities::tools(&["read", "write"])),
    );
    let gateway = stub_gateway(factory, &["fs"], false);
    gateway.with_configuration(|c| c.set_enabled_tools("fs", vec!["read".to_string()]));

    gateway.reload().await.unwrap();

    gateway.with_state(|s| {
        assert!(s.registry.tool("read").is_ok());
        assert!(s.registry.tool("write").is_err());
        assert_eq!(s.per_server["fs"].tool_names(), vec!["read"]);
    });
}

#[tokio::test]
async fn test_reload_injects_dynamic_tools() {
    let factory = Arc::new(StubFactory::new());
    let gateway = stub_gateway(factory, &[], true);

    gateway.reload().await.unwrap();

    gateway.with_state(|s| {
        for name in [
            "mcp-find",
            "mcp-add",
            "mcp-remove",
            "mcp-config-set",
            "mcp-exec",
            "code-mode",
            "mcp-registry-import",
        ] {
            let registration = s.registry.tool(name).unwrap();
            assert_eq!(registration.server_name, crate::dynamic::DYNAMIC_SERVER_NAME);
        }
    });
}

#[test]
fn test_tool_enabled_per_server_lists() {
    // Empty global list: a missing per-server list allows everything.
    assert!(tool_enabled(&[], None, "gh", None, "search"));

    let allowed = vec!["search".to_string()];
    assert!(tool_enabled(&[], Some(allowed.as_slice()), "gh", None, "search"));
    assert!(!tool_enabled(&[], Some(allowed.as_slice()), "gh", None, "delete"));

    let empty: Vec<String> = vec![];
    assert!(!tool_enabled(&[], Some(empty.as_slice()), "gh", None, "search"));
}

#[test]
fn test_tool_enabled_global_patterns() {
    let image = Some("mcp/github");

    let wildcard = vec!["*".to_string()];
    assert!(tool_enabled(&wildcard, None, "gh", image, "search"));

    let by_name = vec!["search".to_string()];
    assert!(tool_enabled(&by_name, None, "gh", image, "search"));
    assert!(!tool_enabled(&by_name, None, "gh", image, "delete"));

    let by_server = vec!["gh:search".to_string()];
    assert!(tool_enabled(&by_server, None, "gh", image, "search"));
    assert!(!tool_enabled(&by_server, None, "other", image, "search"));

    let server_wildcard = vec!["gh:*".to_string()];
    assert!(tool_enabled(&server_wildcard, None, "gh", image, "anything"));

    let by_image = vec!["mcp/github:search".to_string()];
    assert!(tool_enabled(&by_image, None, "gh", image, "search"));

    let image_wildcard = vec!["mcp/github:*".to_string()];
    assert!(tool_enabled(&image_wildcard, None, "gh", image, "anything"));
    assert!(!tool_enabled(&image_wildcard, None, "gh", None, "anything"));
}

#[test]
fn test_tool_enabled_is_case_insensitive() {
    let filters = vec!["GH:Search".to_string()];
    assert!(tool_enabled(&filters, None, "gh", None, "search"));
    assert!(tool_enabled(&filters, None, "GH", None, "SEARCH"));

    // A non-empty global list overrides the per-server default-allow.
    let per_server = vec!["other".to_string()];
    assert!(tool_enabled(&filters, Some(per_server.as_slice()), "gh", None, "search"));
}
