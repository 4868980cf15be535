//! Reconciler
//!
//! Single-upstream diff apply, triggered by upstream listChanged
//! notifications and by meta-tool mutations. Unlike the full reload this
//! never wipes the aggregate: removals and additions are computed per
//! capability kind and applied under one hold of the capability lock, so
//! clients never observe a partially updated view.

use super::federation::list_server_set;
use super::{ChangedKinds, Gateway, GatewayState};
use crate::capabilities::ServerCapabilitySet;
use crate::Result;
use std::collections::HashSet;
use std::sync::Arc;

/// Symmetric difference of two key lists.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct KeyDiff {
    pub added: HashSet<String>,
    pub removed: Vec<String>,
}

impl KeyDiff {
    fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub(crate) fn key_diff(old: &[String], new: &[String]) -> KeyDiff {
    let old_keys: HashSet<&str> = old.iter().map(String::as_str).collect();
    let new_keys: HashSet<&str> = new.iter().map(String::as_str).collect();

    KeyDiff {
        added: new
            .iter()
            .filter(|k| !old_keys.contains(k.as_str()))
            .cloned()
            .collect(),
        removed: old
            .iter()
            .filter(|k| !new_keys.contains(k.as_str()))
            .cloned()
            .collect(),
    }
}

/// Apply a freshly listed set for one upstream to the aggregate.
///
/// Removals go first, then additions, per kind. Keys present in both the
/// old and new sets get their records replaced in place so descriptors
/// and handlers track the fresh listing. When a `tool_filter` is given,
/// tool *additions* are restricted to keys it contains.
pub(crate) fn apply_server_set(
    state: &mut GatewayState,
    name: &str,
    new_set: ServerCapabilitySet,
    tool_filter: Option<&HashSet<String>>,
) -> ChangedKinds {
    let old = state.per_server.get(name).cloned().unwrap_or_default();

    let tools = key_diff(&old.tool_names(), &new_set.tool_names());
    let prompts = key_diff(&old.prompt_names(), &new_set.prompt_names());
    let resources = key_diff(&old.resource_uris(), &new_set.resource_uris());
    let templates = key_diff(
        &old.resource_template_uris(),
        &new_set.resource_template_uris(),
    );

    state.registry.remove_tools(&tools.removed);
    state.registry.remove_prompts(&prompts.removed);
    state.registry.remove_resources(&resources.removed);
    state.registry.remove_resource_templates(&templates.removed);

    let mut kept = ServerCapabilitySet::default();

    for registration in new_set.tools {
        let key = registration.key();
        let is_addition = tools.added.contains(&key);
        if is_addition && tool_filter.is_some_and(|filter| !filter.contains(&key)) {
            continue;
        }
        state.registry.add_tool(registration.clone());
        kept.tools.push(registration);
    }
    for registration in new_set.prompts {
        state.registry.add_prompt(registration.clone());
        kept.prompts.push(registration);
    }
    for registration in new_set.resources {
        state.registry.add_resource(registration.clone());
        kept.resources.push(registration);
    }
    for registration in new_set.resource_templates {
        state.registry.add_resource_template(registration.clone());
        kept.resource_templates.push(registration);
    }

    state.per_server.insert(name.to_string(), kept);

    ChangedKinds {
        tools: !tools.is_empty(),
        prompts: !prompts.is_empty(),
        resources: !resources.is_empty() || !templates.is_empty(),
    }
}

/// Drop every capability an upstream contributed.
pub(crate) fn drop_server_set(state: &mut GatewayState, name: &str) -> ChangedKinds {
    let Some(old) = state.per_server.remove(name) else {
        return ChangedKinds::default();
    };

    state.registry.remove_tools(&old.tool_names());
    state.registry.remove_prompts(&old.prompt_names());
    state.registry.remove_resources(&old.resource_uris());
    state
        .registry
        .remove_resource_templates(&old.resource_template_uris());

    ChangedKinds {
        tools: !old.tools.is_empty(),
        prompts: !old.prompts.is_empty(),
        resources: !old.resources.is_empty() || !old.resource_templates.is_empty(),
    }
}

impl Gateway {
    /// Re-federate a single upstream and diff-apply the result.
    ///
    /// A listing failure leaves the previous aggregate state intact.
    pub async fn reload_server(
        self: &Arc<Self>,
        name: &str,
        tool_filter: Option<&HashSet<String>>,
    ) -> Result<()> {
        let snapshot = self.configuration_snapshot();
        let server = snapshot.server(name)?.clone();
        let ctx = snapshot.start_context(&server);
        let per_server_tools = snapshot.tools.get(name).cloned();

        let fresh = list_server_set(
            &self.pool,
            &server,
            &ctx,
            &snapshot.global_tools,
            per_server_tools.as_deref(),
        )
        .await?;

        let changed = self.with_state(|state| apply_server_set(state, name, fresh, tool_filter));

        tracing::debug!("reconciled '{}': {:?}", name, changed);
        self.broker.notify(changed).await;

        Ok(())
    }

    /// Remove an upstream entirely: capabilities, pooled session,
    /// OAuth supervisor.
    pub async fn remove_server(self: &Arc<Self>, name: &str) {
        let changed = self.with_state(|state| drop_server_set(state, name));
        self.pool.remove(name);
        self.stop_oauth_provider(name);
        self.broker.notify(changed).await;
    }
}

#[cfg(test)]
#[path = "reconcile_test.rs"]
mod reconcile_test;
