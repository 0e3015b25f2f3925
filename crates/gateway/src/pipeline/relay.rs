//! Stream relay.
//!
//! The invoker runs in a detached driver task and reports [`TurnEvent`]s
//! over a channel. The response body drains that channel, encoding each
//! event as a data stream line, so the first byte goes out as soon as the
//! provider produces one. The body owns the turn's cancellation guard:
//! when the client goes away the body is dropped, the token fires, and
//! the provider stream is dropped with it.
//!
//! A completed generation is only persisted once the body has handed the
//! finish line to the connection. Events sitting in the channel buffer do
//! not count as delivered.

use std::convert::Infallible;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, StatusCode};
use axum::response::Response;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use cg_domain::trace::TraceEvent;
use cg_store::StoreHandle;

use super::encoder::{
    DataStreamEncoder, CHAT_ID_HEADER, DATA_STREAM_HEADER, DATA_STREAM_VERSION,
};
use super::error::{TurnError, TurnStage};
use super::invoke::{Invocation, ModelInvoker, StreamOutcome, TurnEvent};
use super::perf::PerformanceMonitor;
use super::persist;
use crate::state::AppState;

/// What the relay needs to finish a turn after the response is returned.
pub struct RelayContext {
    pub chat_id: String,
    pub caller_id: String,
    pub model_id: String,
    pub message_group_id: Option<String>,
    pub store: Option<StoreHandle>,
    pub monitor: PerformanceMonitor,
}

/// Start the generation and return the streaming response.
pub fn stream_response(
    state: &AppState,
    invocation: Invocation,
    ctx: RelayContext,
) -> Result<Response, TurnError> {
    let encoder = DataStreamEncoder::new(&state.config.relay);
    let deadline = Duration::from_secs(state.config.server.request_timeout_secs);
    let (tx, mut rx) = mpsc::channel::<TurnEvent>(64);
    let cancel = CancellationToken::new();

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(DATA_STREAM_HEADER, DATA_STREAM_VERSION)
        .header(CHAT_ID_HEADER, ctx.chat_id.as_str());

    let guard = cancel.clone().drop_guard();
    let (delivered_tx, delivered_rx) = oneshot::channel::<()>();
    let body = async_stream::stream! {
        let _guard = guard;
        let mut delivered = Some(delivered_tx);
        while let Some(event) = rx.recv().await {
            let is_finish = matches!(event, TurnEvent::Finish { .. });
            if let Some(line) = encoder.encode(&event) {
                yield Ok::<Bytes, Infallible>(Bytes::from(line));
            }
            // Resumed only after the connection took the finish line.
            if is_finish {
                if let Some(tx) = delivered.take() {
                    let _ = tx.send(());
                }
            }
        }
    };

    let response = response
        .body(Body::from_stream(body))
        .map_err(|e| TurnError::Internal(format!("building response: {e}")))?;

    let invoker = state.invoker.clone();
    tokio::spawn(
        drive(invoker, invocation, ctx, tx, cancel, delivered_rx, deadline)
            .instrument(tracing::Span::current()),
    );

    Ok(response)
}

async fn drive(
    invoker: std::sync::Arc<ModelInvoker>,
    invocation: Invocation,
    ctx: RelayContext,
    tx: mpsc::Sender<TurnEvent>,
    cancel: CancellationToken,
    delivered: oneshot::Receiver<()>,
    deadline: Duration,
) {
    let deadline_at = Instant::now() + deadline;
    let run = invoker.run(invocation, tx.clone(), cancel.clone());
    let outcome = match tokio::time::timeout_at(deadline_at, run).await {
        Ok(outcome) => outcome,
        Err(_) => {
            tracing::warn!(deadline_secs = deadline.as_secs(), "turn deadline exceeded");
            StreamOutcome::ProviderError(
                "The response took too long and was stopped. Please try again.".into(),
            )
        }
    };

    let steps = match &outcome {
        StreamOutcome::Completed(turn) => turn.steps,
        _ => 0,
    };
    let mut label = outcome.label();

    match outcome {
        StreamOutcome::Completed(turn) => {
            let finish = TurnEvent::Finish {
                finish_reason: turn.finish_reason,
                usage: turn.usage,
            };
            let sent = tx.send(finish).await.is_ok();
            let acked = sent
                && matches!(
                    tokio::time::timeout_at(deadline_at, delivered).await,
                    Ok(Ok(()))
                );
            if acked && !cancel.is_cancelled() {
                if let Some(store) = ctx.store.clone() {
                    persist::persist_assistant_messages(
                        store,
                        ctx.chat_id.clone(),
                        ctx.caller_id.clone(),
                        ctx.model_id.clone(),
                        ctx.message_group_id.clone(),
                        turn.messages,
                    );
                }
            } else {
                label = StreamOutcome::ClientAbort.label();
                tracing::info!(chat_id = %ctx.chat_id, "client left before the finish line, not persisting");
            }
        }
        StreamOutcome::ProviderError(message) => {
            let _ = tx.send(TurnEvent::Error(message)).await;
        }
        StreamOutcome::ClientAbort => {
            tracing::info!(chat_id = %ctx.chat_id, "client disconnected, turn cancelled");
        }
    }
    drop(tx);

    let stage = final_stage(label);
    let duration_ms = ctx.monitor.finish();
    tracing::info!(stage = %stage, outcome = label, steps, duration_ms, "turn finished");
    TraceEvent::TurnFinished {
        chat_id: ctx.chat_id,
        model: ctx.model_id,
        outcome: label.to_string(),
        steps,
        duration_ms,
    }
    .emit();
}

fn final_stage(outcome: &str) -> TurnStage {
    match outcome {
        "completed" => TurnStage::Completed,
        _ => TurnStage::Failed,
    }
}
