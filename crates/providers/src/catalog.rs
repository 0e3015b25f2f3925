//! Model catalog.
//!
//! Constructs the configured provider adapters and maps every client-facing
//! model id to its descriptor and the provider that serves it. A model is
//! *invocable* when it is marked available and its provider initialized.

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::LlmProvider;
use cg_domain::config::{LlmConfig, ModelDescriptor, ProviderKind};
use cg_domain::error::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A model id resolved to something that can be called.
#[derive(Clone)]
pub struct ResolvedModel {
    pub descriptor: ModelDescriptor,
    pub provider: Arc<dyn LlmProvider>,
    /// Self-hosted provider; gets the longer timeout.
    pub local: bool,
}

impl std::fmt::Debug for ResolvedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedModel")
            .field("model", &self.descriptor.id)
            .field("provider", &self.provider.provider_id())
            .field("local", &self.local)
            .finish()
    }
}

#[derive(Default)]
pub struct ModelCatalog {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    local_providers: HashSet<String>,
    models: Vec<ModelDescriptor>,
}

impl ModelCatalog {
    /// An empty catalog with the given model descriptors and no providers.
    pub fn new(models: Vec<ModelDescriptor>) -> Self {
        Self {
            providers: HashMap::new(),
            local_providers: HashSet::new(),
            models,
        }
    }

    /// Register a provider instance under its `provider_id()`.
    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>, local: bool) -> Self {
        let id = provider.provider_id().to_string();
        if local {
            self.local_providers.insert(id.clone());
        }
        self.providers.insert(id, provider);
        self
    }

    /// Build the catalog from the application's [`LlmConfig`].
    ///
    /// Providers that fail to initialize are logged and skipped; models
    /// they serve stay listed but are not invocable.
    pub fn from_config(config: &LlmConfig) -> Self {
        let mut catalog = Self::new(config.models.clone());

        for pc in &config.providers {
            let result: Result<Arc<dyn LlmProvider>> = match pc.kind {
                ProviderKind::OpenaiCompat => OpenAiCompatProvider::from_config(pc)
                    .map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
                ProviderKind::Anthropic => {
                    AnthropicProvider::from_config(pc).map(|p| Arc::new(p) as Arc<dyn LlmProvider>)
                }
            };

            match result {
                Ok(provider) => {
                    tracing::info!(
                        provider_id = %pc.id,
                        kind = ?pc.kind,
                        local = pc.local,
                        "registered LLM provider"
                    );
                    catalog = catalog.with_provider(provider, pc.local);
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

        catalog
    }

    pub fn descriptor(&self, model_id: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.id == model_id)
    }

    /// Resolve a model id to an invocable provider handle.
    pub fn resolve(&self, model_id: &str) -> Option<ResolvedModel> {
        let descriptor = self.descriptor(model_id)?;
        if !descriptor.available {
            return None;
        }
        let provider = self.providers.get(&descriptor.provider)?;
        Some(ResolvedModel {
            descriptor: descriptor.clone(),
            provider: provider.clone(),
            local: self.local_providers.contains(&descriptor.provider),
        })
    }

    pub fn is_invocable(&self, model_id: &str) -> bool {
        self.resolve(model_id).is_some()
    }

    /// All descriptors in configuration order.
    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }
}
