//! Telemetry for the gateway
//!
//! Prometheus counters/histograms behind lazy statics, plus a tracing
//! span per tool call. Metric labels mirror the span attributes
//! (`mcp.server.name` and friends) with underscores.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramOpts,
    HistogramVec, TextEncoder,
};

/// Tool call counter
static TOOL_CALLS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tool_call_total",
        "Total number of tool calls dispatched by the gateway",
        &["server_name", "server_type", "tool_name", "client_name"]
    )
    .unwrap()
});

/// Tool call duration histogram, in milliseconds
static TOOL_CALL_DURATION_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        HistogramOpts::new(
            "tool_call_duration_ms",
            "Duration of tool calls in milliseconds"
        ),
        &["server_name", "server_type", "tool_name", "client_name"]
    )
    .unwrap()
});

/// Capabilities seen per upstream at federation time
static FEDERATED_CAPABILITIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "federated_capabilities_total",
        "Capabilities listed per upstream during federation",
        &["server_name", "kind"]
    )
    .unwrap()
});

/// Attribute set shared by the tool-call span and metrics.
pub struct ToolCallAttributes<'a> {
    pub server_name: &'a str,
    pub server_type: &'a str,
    pub tool_name: &'a str,
    pub client_name: &'a str,
}

/// Span for one tool call, named and attributed per the MCP conventions.
pub fn tool_call_span(attrs: &ToolCallAttributes<'_>) -> tracing::Span {
    tracing::info_span!(
        "mcp.tool.call",
        mcp.server.name = %attrs.server_name,
        mcp.server.type = %attrs.server_type,
        mcp.tool.name = %attrs.tool_name,
        mcp.client.name = %attrs.client_name,
        otel.status_code = tracing::field::Empty,
    )
}

/// Record one completed tool call.
pub fn record_tool_call(attrs: &ToolCallAttributes<'_>, duration_ms: f64) {
    let labels = [
        attrs.server_name,
        attrs.server_type,
        attrs.tool_name,
        attrs.client_name,
    ];
    TOOL_CALLS_TOTAL.with_label_values(&labels).inc();
    TOOL_CALL_DURATION_MS
        .with_label_values(&labels)
        .observe(duration_ms);
}

/// Record the size of one upstream's capability list at federation time.
pub fn record_federated_capabilities(server_name: &str, kind: &str, count: usize) {
    FEDERATED_CAPABILITIES_TOTAL
        .with_label_values(&[server_name, kind])
        .inc_by(count as f64);
}

/// Gathered metrics in the Prometheus text format.
pub fn get_metrics() -> crate::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| crate::GatewayError::internal(format!("failed to encode metrics: {}", e)))?;

    String::from_utf8(buffer)
        .map_err(|e| crate::GatewayError::internal(format!("metrics are not UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_tool_call_metrics() {
        let attrs = ToolCallAttributes {
            server_name: "dynamic-mcps",
            server_type: "dynamic",
            tool_name: "mcp-find",
            client_name: "test-client",
        };

        record_tool_call(&attrs, 12.5);
        record_federated_capabilities("github", "tools", 4);

        let metrics = get_metrics().unwrap();
        assert!(metrics.contains("tool_call_total"));
        assert!(metrics.contains("tool_call_duration_ms"));
        assert!(metrics.contains("federated_capabilities_total"));
    }
}
