//! mcp-find scoring
//!
//! Scores catalog entries against a query using fixed-weight substring
//! signals, keeping the strongest signal per server. Exact matches always
//! outrank substring matches, names outrank descriptions.

use crate::catalog::ServerConfig;
use crate::config::Configuration;
use serde::Serialize;
use serde_json::Value;

pub const DEFAULT_LIMIT: usize = 10;

const SCORE_NAME_EXACT: u32 = 100;
const SCORE_DESCRIPTION_EXACT: u32 = 95;
const SCORE_TOOL_NAME_EXACT: u32 = 90;
const SCORE_NAME_SUBSTRING: u32 = 50;
const SCORE_DESCRIPTION_SUBSTRING: u32 = 45;
const SCORE_TOOL_NAME_SUBSTRING: u32 = 40;
const SCORE_TOOL_DESCRIPTION_SUBSTRING: u32 = 30;
const SCORE_IMAGE_SUBSTRING: u32 = 20;

/// One `mcp-find` hit.
#[derive(Debug, Serialize)]
pub struct FindResult {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_secrets: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_schema: Option<Value>,

    pub long_lived: bool,
}

/// Best signal for one catalog entry, zero when nothing matches.
pub(crate) fn score_server(server: &ServerConfig, query: &str) -> u32 {
    let query = query.to_lowercase();
    let mut best = 0u32;

    let mut consider = |score: u32, matched: bool| {
        if matched && score > best {
            best = score;
        }
    };

    let name = server.name.to_lowercase();
    consider(SCORE_NAME_EXACT, name == query);
    consider(SCORE_NAME_SUBSTRING, name.contains(&query));

    if let Some(description) = &server.description {
        let description = description.to_lowercase();
        consider(SCORE_DESCRIPTION_EXACT, description == query);
        consider(SCORE_DESCRIPTION_SUBSTRING, description.contains(&query));
    }

    for tool in &server.tools {
        let tool_name = tool.name.to_lowercase();
        consider(SCORE_TOOL_NAME_EXACT, tool_name == query);
        consider(SCORE_TOOL_NAME_SUBSTRING, tool_name.contains(&query));

        if let Some(description) = &tool.description {
            consider(
                SCORE_TOOL_DESCRIPTION_SUBSTRING,
                description.to_lowercase().contains(&query),
            );
        }
    }

    if let Some(image) = &server.image {
        consider(SCORE_IMAGE_SUBSTRING, image.to_lowercase().contains(&query));
    }

    best
}

/// Score every catalog entry and return the top `limit`, best first.
pub(crate) fn find_servers(
    snapshot: &Configuration,
    query: &str,
    limit: usize,
) -> Vec<FindResult> {
    let limit = if limit == 0 { DEFAULT_LIMIT } else { limit };

    let mut scored: Vec<(u32, &ServerConfig)> = snapshot
        .servers
        .values()
        .filter_map(|server| {
            let score = score_server(server, query);
            (score > 0).then_some((score, server))
        })
        .collect();

    // Stable on equal scores; tie-break on name so output is deterministic.
    scored.sort_by(|(a_score, a), (b_score, b)| {
        b_score.cmp(a_score).then_with(|| a.name.cmp(&b.name))
    });

    scored
        .into_iter()
        .take(limit)
        .map(|(_, server)| FindResult {
            name: server.name.clone(),
            description: server.description.clone(),
            required_secrets: server.secrets.iter().map(|s| s.name.clone()).collect(),
            config_schema: server.config_schema.clone(),
            long_lived: server.long_lived,
        })
        .collect()
}

#[cfg(test)]
#[path = "find_test.rs"]
mod find_test;
