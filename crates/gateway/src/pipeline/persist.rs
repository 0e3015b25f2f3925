//! Persistence sink.
//!
//! Every write here is a detached task. Failures are logged and emitted as
//! `PersistenceFailed` trace events; they never reach the caller.

use chrono::Utc;

use cg_domain::error::Result;
use cg_domain::tool::Message;
use cg_domain::trace::TraceEvent;
use cg_store::{ConversationMeta, MessageRecord, StoreHandle};

use super::request::TurnRequest;

/// Log the incoming user message and touch the conversation record.
/// Does nothing when the last message is not from the user.
pub fn persist_user_message(store: StoreHandle, req: &TurnRequest) {
    let Some(message) = req.new_user_message().cloned() else {
        return;
    };
    let record = MessageRecord::new(&req.chat_id, &req.user_id, message)
        .with_group(req.message_group_id.clone())
        .with_model(&req.model);
    let meta = ConversationMeta {
        chat_id: req.chat_id.clone(),
        caller_id: req.user_id.clone(),
        model: req.model.clone(),
        updated_at: Utc::now(),
    };
    let chat_id = req.chat_id.clone();

    tokio::spawn(async move {
        report(&chat_id, "conversation", store.upsert_conversation(meta).await);
        report(&chat_id, "user_message", store.append_messages(vec![record]).await);
    });
}

/// Store the finalized assistant (and tool) messages of a completed turn.
pub fn persist_assistant_messages(
    store: StoreHandle,
    chat_id: String,
    caller_id: String,
    model: String,
    message_group_id: Option<String>,
    messages: Vec<Message>,
) {
    if messages.is_empty() {
        return;
    }
    tokio::spawn(async move {
        let records = messages
            .into_iter()
            .map(|m| {
                MessageRecord::new(&chat_id, &caller_id, m)
                    .with_group(message_group_id.clone())
                    .with_model(&model)
            })
            .collect();
        report(
            &chat_id,
            "assistant_messages",
            store.append_messages(records).await,
        );
    });
}

/// Audit that an agent's static tools were handed to a turn.
pub fn record_agent_usage(store: StoreHandle, chat_id: String, agent_id: String, caller_id: String) {
    tokio::spawn(async move {
        report(
            &chat_id,
            "agent_usage",
            store.record_agent_usage(&agent_id, &caller_id).await,
        );
    });
}

fn report(chat_id: &str, stage: &str, result: Result<()>) {
    if let Err(e) = result {
        tracing::warn!(chat_id = %chat_id, stage, error = %e, "persistence failed");
        TraceEvent::PersistenceFailed {
            chat_id: chat_id.to_string(),
            stage: stage.to_string(),
            error: e.to_string(),
        }
        .emit();
    }
}
