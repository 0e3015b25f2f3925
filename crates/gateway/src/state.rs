use std::sync::Arc;

use cg_domain::config::Config;
use cg_providers::ModelCatalog;
use cg_store::StoreResolver;
use cg_tools::{RemoteToolFetcher, ToolRegistry};

use crate::pipeline::invoke::ModelInvoker;

/// Shared application state passed to all API handlers.
///
/// - **Core services**: config, model catalog, store resolver
/// - **Tools**: host registry and the remote tool fetcher
/// - **Runtime**: the model invoker (owns the provider-call semaphore)
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub catalog: Arc<ModelCatalog>,
    pub stores: Arc<dyn StoreResolver>,

    // ── Tools ─────────────────────────────────────────────────────────
    pub tools: Arc<ToolRegistry>,
    pub remote_tools: Arc<dyn RemoteToolFetcher>,

    // ── Runtime ───────────────────────────────────────────────────────
    pub invoker: Arc<ModelInvoker>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        catalog: Arc<ModelCatalog>,
        stores: Arc<dyn StoreResolver>,
        tools: Arc<ToolRegistry>,
        remote_tools: Arc<dyn RemoteToolFetcher>,
    ) -> Self {
        let invoker = Arc::new(ModelInvoker::new(&config.performance));
        Self {
            config,
            catalog,
            stores,
            tools,
            remote_tools,
            invoker,
        }
    }
}
