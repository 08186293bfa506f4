//! Provider registry.
//!
//! Reads the [`LlmConfig`], resolves authentication, and instantiates one
//! adapter per configured provider. Providers that fail to initialize are
//! logged and skipped rather than aborting startup.

use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::LlmProvider;
use std::collections::HashMap;
use std::sync::Arc;
use wf_domain::config::{LlmConfig, ProviderKind};
use wf_domain::error::Result;

/// Holds all instantiated LLM providers.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    default_id: Option<String>,
}

impl ProviderRegistry {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();

        for pc in &config.providers {
            let result = match pc.kind {
                ProviderKind::OpenaiCompat | ProviderKind::AzureOpenai => {
                    OpenAiCompatProvider::from_config(pc, config.default_timeout_ms)
                        .map(|p| Arc::new(p) as Arc<dyn LlmProvider>)
                }
            };

            match result {
                Ok(provider) => {
                    tracing::info!(provider_id = %pc.id, kind = ?pc.kind, "registered LLM provider");
                    providers.insert(pc.id.clone(), provider);
                }
                Err(e) => {
                    tracing::warn!(
                        provider_id = %pc.id,
                        kind = ?pc.kind,
                        error = %e,
                        "failed to initialize LLM provider, skipping"
                    );
                }
            }
        }

        if providers.is_empty() && !config.providers.is_empty() {
            tracing::warn!("no LLM providers initialized; turns will fail until auth is configured");
        }

        let default_id = config
            .default_provider
            .clone()
            .filter(|id| providers.contains_key(id))
            .or_else(|| {
                config
                    .providers
                    .iter()
                    .map(|p| p.id.clone())
                    .find(|id| providers.contains_key(id))
            });

        Ok(Self { providers, default_id })
    }

    /// Registry around already-built providers. The first id is the default.
    pub fn from_providers(list: Vec<Arc<dyn LlmProvider>>) -> Self {
        let default_id = list.first().map(|p| p.provider_id().to_owned());
        let providers = list
            .into_iter()
            .map(|p| (p.provider_id().to_owned(), p))
            .collect();
        Self { providers, default_id }
    }

    /// Look up a provider by its config id.
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(provider_id).cloned()
    }

    /// The provider used when a turn names none.
    pub fn default_provider(&self) -> Option<Arc<dyn LlmProvider>> {
        self.default_id.as_deref().and_then(|id| self.get(id))
    }

    /// Resolve `"provider_id/model"` or a bare model name to a provider and
    /// the model to request from it.
    pub fn resolve(&self, spec: Option<&str>) -> Option<(Arc<dyn LlmProvider>, Option<String>)> {
        let Some(spec) = spec else {
            return self.default_provider().map(|p| (p, None));
        };
        if let Some((pid, model)) = spec.split_once('/') {
            if let Some(p) = self.get(pid) {
                return Some((p, Some(model.to_owned())));
            }
        }
        self.default_provider().map(|p| (p, Some(spec.to_owned())))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// List all registered provider IDs (sorted).
    pub fn list_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }
}
