pub mod mcp;

use crate::core::error::AssistantError;
use crate::types::AiConfig;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A callable tool offered to the model.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    async fn call(&self, args: Value) -> Result<Value, AssistantError>;
}

struct RegistryInner {
    tools: HashMap<String, Arc<dyn Tool>>,
    // provider id -> tool names that provider has rejected
    blacklist: HashMap<String, HashSet<String>>,
    success_counts: HashMap<String, u64>,
}

/// Registered tools plus per-provider availability state. A provider that
/// rejects a tool schema gets that tool blacklisted for itself only; a
/// recorded success lifts the entry again.
pub struct ToolRegistry {
    inner: RwLock<RegistryInner>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                tools: HashMap::new(),
                blacklist: HashMap::new(),
                success_counts: HashMap::new(),
            }),
        }
    }

    pub fn register(&self, tool: Arc<dyn Tool>) {
        let mut inner = self.inner.write();
        inner.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.inner.read().tools.get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().tools.is_empty()
    }

    /// Tools offered for the next request: nothing when tools are switched
    /// off in config, otherwise everything not blacklisted for the active
    /// provider, in stable name order.
    pub fn available_tools(&self, config: &AiConfig, provider_id: &str) -> Vec<Arc<dyn Tool>> {
        if !config.features.enable_tools {
            return Vec::new();
        }
        let inner = self.inner.read();
        let blocked = inner.blacklist.get(provider_id);
        let mut tools: Vec<Arc<dyn Tool>> = inner
            .tools
            .values()
            .filter(|tool| !blocked.is_some_and(|b| b.contains(tool.name())))
            .cloned()
            .collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    pub async fn call_tool(&self, name: &str, args: Value) -> Result<Value, AssistantError> {
        let tool = self
            .get(name)
            .ok_or_else(|| AssistantError::ToolNotFound(name.to_string()))?;
        tool.call(args).await
    }

    /// A successful execution proves the provider accepts this tool; lift
    /// any blacklist entry and bump the counter.
    pub fn record_success(&self, tool_name: &str, provider_id: &str) {
        let mut inner = self.inner.write();
        if let Some(blocked) = inner.blacklist.get_mut(provider_id) {
            blocked.remove(tool_name);
        }
        *inner.success_counts.entry(tool_name.to_string()).or_insert(0) += 1;
    }

    pub fn blacklist<I>(&self, provider_id: &str, tool_names: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut inner = self.inner.write();
        let blocked = inner.blacklist.entry(provider_id.to_string()).or_default();
        for name in tool_names {
            tracing::warn!(provider = %provider_id, tool = %name, "blacklisting tool");
            blocked.insert(name);
        }
    }

    /// Drops every blacklist entry for the provider; returns how many were
    /// cleared.
    pub fn clear_blacklisted(&self, provider_id: &str) -> usize {
        let mut inner = self.inner.write();
        inner
            .blacklist
            .remove(provider_id)
            .map(|b| b.len())
            .unwrap_or(0)
    }

    pub fn blacklisted(&self, provider_id: &str) -> HashSet<String> {
        self.inner
            .read()
            .blacklist
            .get(provider_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn success_count(&self, tool_name: &str) -> u64 {
        self.inner
            .read()
            .success_counts
            .get(tool_name)
            .copied()
            .unwrap_or(0)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
