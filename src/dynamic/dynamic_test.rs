use super::*;
use crate::capabilities::CallContext;
use crate::catalog::SecretSpec;
use crate::test_support::{stub_gateway, StubCapabilities, StubFactory};
use rmcp::model::RawContent;
use serde_json::json;

fn args(value: Value) -> JsonObject {
    value.as_object().cloned().unwrap()
}

fn result_text(result: &CallToolResult) -> String {
    result
        .content
        .iter()
        .filter_map(|c| match &c.raw {
            RawContent::Text(text) => Some(text.text.clone()),
            _ => None,
        })
        .collect()
}

async fn call(
    gateway: &std::sync::Arc<crate::Gateway>,
    tool: &str,
    arguments: Value,
) -> CallToolResult {
    let registration = gateway
        .with_state(|s| s.registry.tool(tool).map(Clone::clone))
        .unwrap();
    registration
        .handler
        .call(&CallContext::default(), args(arguments))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_find_requires_a_query() {
    let gateway = stub_gateway(Arc::new(StubFactory::new()), &[], true);
    gateway.reload().await.unwrap();

    let result = call(&gateway, "mcp-find", json!({"query": ""})).await;

    assert_eq!(result.is_error, Some(true));
    assert_eq!(result_text(&result), "query parameter is required");
}

#[tokio::test]
async fn test_find_returns_scored_matches() {
    let factory = Arc::new(StubFactory::new());
    let gateway = stub_gateway(factory, &[], true);
    gateway.with_configuration(|c| {
        let mut entry = crate::test_support::server_config("github");
        entry.description = Some("GitHub tools".into());
        c.servers.insert("github".into(), entry);
    });
    gateway.reload().await.unwrap();

    let result = call(&gateway, "mcp-find", json!({"query": "github"})).await;

    assert_ne!(result.is_error, Some(true));
    assert!(result_text(&result).contains("\"github\""));
}

#[tokio::test]
async fn test_add_activates_and_federates() {
    let factory =
        Arc::new(StubFactory::new().with_server("fs", StubCapabilities::tools(&["read"])));
    let gateway = stub_gateway(factory, &[], true);
    gateway.with_configuration(|c| {
        c.servers
            .insert("fs".into(), crate::test_support::server_config("fs"));
    });
    gateway.reload().await.unwrap();

    let result = call(&gateway, "mcp-add", json!({"name": "fs"})).await;

    assert_ne!(result.is_error, Some(true));
    assert!(gateway.with_configuration(|c| c.server_names.contains(&"fs".to_string())));
    gateway.with_state(|s| {
        assert!(s.registry.tool("read").is_ok());
        assert_eq!(s.per_server["fs"].tool_names(), vec!["read"]);
    });
}

#[tokio::test]
async fn test_add_with_tool_selection_restricts_federation() {
    let factory = Arc::new(
        StubFactory::new().with_server("fs", StubCapabilities::tools(&["read", "write"])),
    );
    let gateway = stub_gateway(factory, &[], true);
    gateway.with_configuration(|c| {
        c.servers
            .insert("fs".into(), crate::test_support::server_config("fs"));
    });
    gateway.reload().await.unwrap();

    let result = call(&gateway, "mcp-add", json!({"name": "fs", "tools": ["read"]})).await;

    assert_ne!(result.is_error, Some(true));
    assert_eq!(
        gateway.with_configuration(|c| c.tools.get("fs").cloned()),
        Some(vec!["read".to_string()])
    );
    gateway.with_state(|s| {
        assert!(s.registry.tool("read").is_ok());
        assert!(s.registry.tool("write").is_err());
        assert_eq!(s.per_server["fs"].tool_names(), vec!["read"]);
    });
}

#[tokio::test]
async fn test_add_unknown_server_errors() {
    let gateway = stub_gateway(Arc::new(StubFactory::new()), &[], true);
    gateway.reload().await.unwrap();

    let result = call(&gateway, "mcp-add", json!({"name": "ghost"})).await;

    assert_eq!(result.is_error, Some(true));
    assert!(gateway.with_configuration(|c| c.server_names.is_empty()));
}

#[tokio::test]
async fn test_add_with_missing_secret_returns_form() {
    let factory = Arc::new(StubFactory::new());
    let gateway = stub_gateway(factory.clone(), &[], true);
    gateway.with_configuration(|c| {
        let mut gh = crate::test_support::server_config("gh");
        gh.secrets = vec![SecretSpec {
            name: "DYN_TEST_GH_TOKEN".into(),
            env: None,
        }];
        c.servers.insert("gh".into(), gh);
    });
    gateway.reload().await.unwrap();
    let starts_before = factory.start_count();

    let result = call(&gateway, "mcp-add", json!({"name": "gh"})).await;

    // One embedded HTML form, no federation.
    assert_eq!(result.content.len(), 1);
    match &result.content[0].raw {
        RawContent::Resource(embedded) => match &embedded.resource {
            rmcp::model::ResourceContents::TextResourceContents {
                uri,
                mime_type,
                text,
                ..
            } => {
                assert_eq!(uri, secrets_form::FORM_URI);
                assert_eq!(mime_type.as_deref(), Some(secrets_form::FORM_MIME));
                assert!(
                    text.contains(r#"name="DYN_TEST_GH_TOKEN" type="password""#),
                    "form should ask for the missing secret"
                );
            }
            other => panic!("expected text resource, got {:?}", other),
        },
        other => panic!("expected embedded resource, got {:?}", other),
    }

    // The server is active but nothing was started or registered.
    assert!(gateway.with_configuration(|c| c.server_names.contains(&"gh".to_string())));
    assert_eq!(factory.start_count(), starts_before);
    gateway.with_state(|s| assert!(!s.per_server.contains_key("gh")));
}

#[tokio::test]
async fn test_remove_drops_server() {
    let factory =
        Arc::new(StubFactory::new().with_server("fs", StubCapabilities::tools(&["read"])));
    let gateway = stub_gateway(factory, &["fs"], true);
    gateway.reload().await.unwrap();

    let result = call(&gateway, "mcp-remove", json!({"name": "fs"})).await;

    assert_ne!(result.is_error, Some(true));
    assert!(gateway.with_configuration(|c| c.server_names.is_empty()));
    gateway.with_state(|s| {
        assert!(s.registry.tool("read").is_err());
        assert!(!s.per_server.contains_key("fs"));
    });
}

#[tokio::test]
async fn test_config_set_writes_and_refederates() {
    let factory =
        Arc::new(StubFactory::new().with_server("fs", StubCapabilities::tools(&["read"])));
    let gateway = stub_gateway(factory.clone(), &["fs"], true);
    gateway.reload().await.unwrap();
    let starts_before = factory.start_count();

    let result = call(
        &gateway,
        "mcp-config-set",
        json!({"server": "fs", "key": "root", "value": "/srv"}),
    )
    .await;

    assert_ne!(result.is_error, Some(true));
    assert_eq!(
        gateway.with_configuration(|c| c.config["fs"]["root"].clone()),
        "/srv"
    );
    // The old session was dropped and a fresh one started.
    assert_eq!(factory.start_count(), starts_before + 1);
}

#[tokio::test]
async fn test_config_set_tools_key_narrows_the_tool_set() {
    let factory = Arc::new(
        StubFactory::new().with_server("fs", StubCapabilities::tools(&["read", "write"])),
    );
    let gateway = stub_gateway(factory, &["fs"], true);
    gateway.reload().await.unwrap();

    gateway.with_state(|s| assert!(s.registry.tool("write").is_ok()));

    let result = call(
        &gateway,
        "mcp-config-set",
        json!({"server": "fs", "key": "tools", "value": "read"}),
    )
    .await;

    assert_ne!(result.is_error, Some(true));
    assert_eq!(
        gateway.with_configuration(|c| c.tools.get("fs").cloned()),
        Some(vec!["read".to_string()])
    );
    gateway.with_state(|s| {
        assert!(s.registry.tool("read").is_ok());
        assert!(s.registry.tool("write").is_err());
    });
}

#[tokio::test]
async fn test_exec_invokes_registered_tool() {
    let factory =
        Arc::new(StubFactory::new().with_server("fs", StubCapabilities::tools(&["read"])));
    let gateway = stub_gateway(factory, &["fs"], true);
    gateway.reload().await.unwrap();

    let result = call(
        &gateway,
        "mcp-exec",
        json!({"name": "read", "arguments": {}}),
    )
    .await;

    assert_ne!(result.is_error, Some(true));
    assert_eq!(result_text(&result), "fs:read");

    let result = call(&gateway, "mcp-exec", json!({"name": "nope"})).await;
    assert_eq!(result.is_error, Some(true));

    let result = call(&gateway, "mcp-exec", json!({"name": "mcp-exec"})).await;
    assert_eq!(result.is_error, Some(true));
}

#[tokio::test]
async fn test_code_mode_without_runtime_errors() {
    let factory =
        Arc::new(StubFactory::new().with_server("fs", StubCapabilities::tools(&["read"])));
    let gateway = stub_gateway(factory, &["fs"], true);
    gateway.reload().await.unwrap();

    let result = call(
        &gateway,
        "code-mode",
        json!({"servers": ["fs"], "name": "files"}),
    )
    .await;

    assert_eq!(result.is_error, Some(true));
    assert!(result_text(&result).contains("runtime"));
}
