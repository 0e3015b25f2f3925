use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde::Serialize;

use cg_domain::capability::{LlmCapabilities, ModelTier};

use crate::pipeline::entitlement::guest_accessible;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModelEntry<'a> {
    id: &'a str,
    name: &'a str,
    provider: &'a str,
    tier: ModelTier,
    guest_accessible: bool,
    #[serde(flatten)]
    capabilities: LlmCapabilities,
    /// Listed and backed by a live provider.
    invocable: bool,
}

/// `GET /api/models`: the catalog with tiers and features.
pub async fn list_models(State(state): State<AppState>) -> impl IntoResponse {
    let models: Vec<ModelEntry<'_>> = state
        .catalog
        .models()
        .iter()
        .map(|m| ModelEntry {
            id: &m.id,
            name: m.display_name(),
            provider: &m.provider,
            tier: m.tier,
            guest_accessible: guest_accessible(m.tier),
            capabilities: m.capabilities,
            invocable: state.catalog.is_invocable(&m.id),
        })
        .collect();

    Json(serde_json::json!({
        "count": models.len(),
        "models": models,
    }))
}
