//! AppState construction, shared by `serve` and the integration tests.

use std::sync::Arc;

use anyhow::Context;

use cg_domain::config::{Config, ConfigSeverity};
use cg_providers::ModelCatalog;
use cg_store::{MemoryStore, SharedStoreResolver, StoreHandle, StoreResolver};
use cg_tools::{HttpToolFetcher, RemoteToolFetcher, ToolRegistry};

use crate::state::AppState;

/// Validate config, initialize every collaborator and return a
/// fully-wired [`AppState`].
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    let error_count = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if error_count > 0 {
        anyhow::bail!("config validation failed with {error_count} error(s)");
    }

    // ── Model catalog ────────────────────────────────────────────────
    let catalog = Arc::new(ModelCatalog::from_config(&config.llm));
    let invocable = catalog
        .models()
        .iter()
        .filter(|m| catalog.is_invocable(&m.id))
        .count();
    if invocable == 0 {
        tracing::warn!("no invocable models; every chat turn will fail with MODEL_NOT_FOUND");
    }
    tracing::info!(
        providers = catalog.provider_count(),
        models = catalog.models().len(),
        invocable,
        "model catalog ready"
    );

    // ── Store ────────────────────────────────────────────────────────
    let stores: Arc<dyn StoreResolver> = if config.store.enabled {
        let mut store = MemoryStore::new(config.agents.clone())
            .with_premium_callers(config.store.premium_callers.iter().cloned());
        if let Some(dir) = &config.store.transcript_dir {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating transcript dir {}", dir.display()))?;
            store = store.with_transcripts(dir);
            tracing::info!(dir = %dir.display(), "transcripts enabled");
        }
        let handle: StoreHandle = Arc::new(store);
        tracing::info!("in-memory store ready");
        Arc::new(SharedStoreResolver::new(handle))
    } else {
        tracing::info!("store disabled; turns run without quota or persistence");
        Arc::new(SharedStoreResolver::disabled())
    };

    // ── Tools ────────────────────────────────────────────────────────
    let tools = Arc::new(ToolRegistry::with_builtins().context("initializing host tools")?);
    tracing::info!(tools = ?tools.names(), "host tools registered");
    let remote_tools: Arc<dyn RemoteToolFetcher> = Arc::new(
        HttpToolFetcher::new(config.tools.remote_fetch_timeout_ms)
            .context("initializing remote tool client")?,
    );

    Ok(AppState::new(config, catalog, stores, tools, remote_tools))
}
