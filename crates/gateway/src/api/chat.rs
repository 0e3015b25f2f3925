//! `POST /api/chat`: one chat turn, streamed as an AI SDK data stream.

use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};

use crate::pipeline;
use crate::state::AppState;

/// The body is taken as raw bytes so malformed JSON still gets a
/// structured `{error, code}` response.
pub async fn chat(State(state): State<AppState>, body: Bytes) -> Response {
    match pipeline::run_chat_turn(state, &body).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}
