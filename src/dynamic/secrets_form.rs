//! Embedded secret-entry form
//!
//! When `mcp-add` finds declared secrets missing, it returns an embedded
//! HTML resource instead of federating. The form posts the collected
//! values to the local secrets endpoint and tells the parent frame to
//! re-run the prompt.

use rmcp::model::{CallToolResult, Content, ResourceContents};

pub const FORM_URI: &str = "ui://docker/secrets/form";
pub const FORM_MIME: &str = "text/html";
const SECRETS_ENDPOINT: &str = "http://localhost:3000/secrets";

/// Render the secret-entry form for the given missing secret names.
pub(crate) fn render_form(server: &str, missing: &[String]) -> String {
    let mut inputs = String::new();
    for name in missing {
        inputs.push_str(&format!(
            "    <label for=\"{name}\">{name}</label>\n    <input id=\"{name}\" name=\"{name}\" type=\"password\" required>\n",
            name = name
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Secrets required for {server}</title></head>
<body>
  <p>The MCP server <strong>{server}</strong> needs the following secrets before it can start:</p>
  <form id="secrets-form">
{inputs}    <button type="submit">Save</button>
  </form>
  <script>
    document.getElementById('secrets-form').addEventListener('submit', async (event) => {{
      event.preventDefault();
      const data = Object.fromEntries(new FormData(event.target).entries());
      await fetch('{endpoint}', {{
        method: 'POST',
        headers: {{ 'Content-Type': 'application/json' }},
        body: JSON.stringify(data),
      }});
      window.parent.postMessage({{ type: 'prompt', payload: {{ prompt: 'add the {server} MCP server' }} }}, '*');
    }});
  </script>
</body>
</html>
"#,
        server = server,
        inputs = inputs,
        endpoint = SECRETS_ENDPOINT,
    )
}

/// The `mcp-add` result carrying the form as an embedded resource.
pub(crate) fn missing_secrets_result(server: &str, missing: &[String]) -> CallToolResult {
    let html = render_form(server, missing);

    CallToolResult::success(vec![Content::resource(ResourceContents::TextResourceContents {
        uri: FORM_URI.to_string(),
        mime_type: Some(FORM_MIME.to_string()),
        text: html,
        meta: None,
    })])
}

#[cfg(test)]
#[path = "secrets_form_test.rs"]
mod secrets_form_test;
