use serde::Serialize;

/// Structured trace events emitted across all chatgate crates.
///
/// Detached tasks report their failures through these rather than
/// returning errors to anyone.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    LlmRequest {
        provider: String,
        model: String,
        streaming: bool,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    QuotaIncrementFailed {
        caller_id: String,
        authenticated: bool,
        error: String,
    },
    PersistenceFailed {
        chat_id: String,
        /// `user_message`, `assistant_messages`, `conversation` or `agent_usage`.
        stage: String,
        error: String,
    },
    ToolSourceUnavailable {
        agent_id: String,
        endpoint: String,
        error: String,
    },
    MessageAppended {
        chat_id: String,
        role: String,
        count: usize,
    },
    TurnFinished {
        chat_id: String,
        model: String,
        /// `completed`, `provider_error` or `client_abort`.
        outcome: String,
        steps: u32,
        duration_ms: u64,
    },
    SlowOperation {
        operation: String,
        duration_ms: u64,
        threshold_ms: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "cg_event");
    }
}
