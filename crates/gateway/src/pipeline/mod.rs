//! The chat turn pipeline.
//!
//! `Validating → Gating → Resolving → Sanitizing → Invoking → Streaming`.
//! Each stage either hands its result to the next or fails the turn with a
//! [`TurnError`]. Once the response is streaming, failures are reported
//! in-band by the relay.

pub mod capability;
pub mod encoder;
pub mod entitlement;
pub mod error;
pub mod invoke;
pub mod perf;
pub mod persist;
pub mod relay;
pub mod request;
pub mod sanitize;

use axum::response::Response;
use tracing::Instrument;

use cg_store::StoreHandle;

use self::error::{TurnError, TurnStage};
use self::invoke::Invocation;
use self::perf::PerformanceMonitor;
use self::relay::RelayContext;
use self::request::TurnRequest;
use crate::state::AppState;

/// Run one chat turn from a raw request body to a streaming response.
pub async fn run_chat_turn(state: AppState, body: &[u8]) -> Result<Response, TurnError> {
    let req = TurnRequest::parse(body).inspect_err(|e| {
        tracing::info!(stage = %TurnStage::Validating, code = e.code(), error = %e, "turn rejected");
    })?;

    let span = tracing::info_span!(
        "turn",
        chat_id = %req.chat_id,
        model = %req.model,
        authenticated = req.authenticated,
        agent_id = req.agent_id.as_deref().unwrap_or(""),
    );

    async move {
        let mut stage = TurnStage::Gating;
        let result = run_stages(&state, req, &mut stage).await;
        if let Err(e) = &result {
            tracing::info!(stage = %stage, code = e.code(), error = %e, "turn rejected");
        }
        result
    }
    .instrument(span)
    .await
}

async fn run_stages(
    state: &AppState,
    req: TurnRequest,
    stage: &mut TurnStage,
) -> Result<Response, TurnError> {
    let monitor = PerformanceMonitor::start(
        format!("chat-{}-{}", req.model, req.chat_id),
        &state.config.performance,
    );

    // ── Gating ───────────────────────────────────────────────────────
    *stage = TurnStage::Gating;
    let store: Option<StoreHandle> = state
        .stores
        .resolve(&req.user_id, req.authenticated)
        .await?;
    let descriptor = state
        .catalog
        .descriptor(&req.model)
        .cloned()
        .ok_or_else(|| TurnError::model_not_found(&req.model))?;
    let entitlement = entitlement::enforce(state, store.as_ref(), &req, &descriptor).await?;
    tracing::debug!(?entitlement, store = store.is_some(), "turn accepted");

    if let Some(store) = &store {
        persist::persist_user_message(store.clone(), &req);
    }

    // ── Resolving ────────────────────────────────────────────────────
    *stage = TurnStage::Resolving;
    let caps = capability::resolve(state, store.as_ref(), &req).await?;
    let api_key = provider_key(store.as_ref(), &req, caps.model.provider.provider_id()).await;
    let enable_search = req.enable_search && caps.model.descriptor.capabilities.supports_search;
    if req.enable_search && !enable_search {
        tracing::debug!(model = %caps.model.descriptor.id, "model has no search support, ignoring enableSearch");
    }

    // ── Sanitizing ───────────────────────────────────────────────────
    *stage = TurnStage::Sanitizing;
    let history = if caps.tools_changed {
        sanitize::sanitize_history(&req.messages, !caps.tools.is_empty())
    } else {
        req.messages
    };

    // ── Invoking → Streaming ─────────────────────────────────────────
    *stage = TurnStage::Invoking;
    let invocation = Invocation {
        model: caps.model,
        system_prompt: caps.system_prompt,
        history,
        tools: caps.tools,
        api_key,
        enable_search,
    };
    let ctx = RelayContext {
        chat_id: req.chat_id,
        caller_id: req.user_id,
        model_id: req.model,
        message_group_id: req.message_group_id,
        store,
        monitor,
    };
    let response = relay::stream_response(state, invocation, ctx)?;
    *stage = TurnStage::Streaming;
    Ok(response)
}

/// The caller's own key for this provider, if they stored one.
async fn provider_key(
    store: Option<&StoreHandle>,
    req: &TurnRequest,
    provider_id: &str,
) -> Option<String> {
    let store = store.filter(|_| req.authenticated)?;
    match store.provider_key(&req.user_id, provider_id).await {
        Ok(key) => key,
        Err(e) => {
            tracing::warn!(provider = %provider_id, error = %e, "provider key lookup failed, using default credential");
            None
        }
    }
}
