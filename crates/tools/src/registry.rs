//! Capability registry: a fixed mapping from tool name to an async provider.
//!
//! Built once at startup and shared read-only by every turn. Argument
//! schemas are documentation for the model; nothing here validates them.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

use wf_domain::tool::ToolDefinition;

use crate::catalog;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Capability trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One external capability the model can invoke mid-turn.
#[async_trait::async_trait]
pub trait Capability: Send + Sync {
    /// Name, description, and argument schema advertised to the model.
    fn definition(&self) -> ToolDefinition;

    /// Run the capability. Errors are turned into structured tool results by
    /// the dispatcher; they never abort a turn.
    async fn call(&self, args: Value) -> Result<Value>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CapabilityRegistry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Arc<dyn Capability>>,
    /// Also advertise catalogue tools that have no provider registered.
    advertise_catalog: bool,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability under its definition's name. Returns self for
    /// chaining; a later registration replaces an earlier one.
    pub fn register(mut self, capability: Arc<dyn Capability>) -> Self {
        let name = capability.definition().name;
        if self.capabilities.insert(name.clone(), capability).is_some() {
            tracing::warn!(tool = %name, "capability registered twice, keeping the last");
        }
        self
    }

    pub fn with_catalog(mut self, advertise: bool) -> Self {
        self.advertise_catalog = advertise;
        self
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(name).cloned()
    }

    /// Definitions handed to the model, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.capabilities.values().map(|c| c.definition()).collect();
        if self.advertise_catalog {
            defs.extend(
                catalog::travel_catalog()
                    .into_iter()
                    .filter(|d| !self.capabilities.contains_key(&d.name)),
            );
        }
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.capabilities.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}
