//! code-mode runtime seam
//!
//! Wrapping a set of federated tools into a single sandboxed
//! JavaScript-execution tool is done by an external runtime; the gateway
//! only plumbs the generated tool into the aggregate.

use crate::capabilities::{ToolHandler, ToolRegistration};
use crate::Result;
use rmcp::model::Tool;
use std::sync::Arc;

/// The tools of one upstream, as handed to the runtime.
pub struct ToolSet {
    pub server: String,
    pub tools: Vec<ToolRegistration>,
}

/// External code-execution runtime.
pub trait CodeRuntime: Send + Sync {
    /// Generate a single tool (descriptor + handler) that exposes the
    /// given tool sets to sandboxed code.
    fn wrap(&self, tool_name: &str, sets: Vec<ToolSet>) -> Result<(Tool, Arc<dyn ToolHandler>)>;
}
