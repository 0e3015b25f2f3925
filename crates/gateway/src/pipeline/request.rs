use serde::Deserialize;

use cg_domain::tool::{ContentPart, Message, MessageContent, Role};

use super::error::TurnError;

/// Wire shape of `POST /api/chat`. Everything is optional here so that
/// missing fields produce a structured 400 instead of a rejection from
/// the JSON extractor.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatBody {
    #[serde(default)]
    messages: Option<Vec<Message>>,
    #[serde(default)]
    chat_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    model: String,
    #[serde(default)]
    is_authenticated: bool,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default)]
    agent_id: Option<String>,
    #[serde(default)]
    enable_search: bool,
    #[serde(default, rename = "message_group_id")]
    message_group_id: Option<String>,
}

/// A validated chat turn request.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub messages: Vec<Message>,
    pub chat_id: String,
    pub user_id: String,
    pub model: String,
    pub authenticated: bool,
    pub system_prompt: Option<String>,
    pub agent_id: Option<String>,
    pub enable_search: bool,
    pub message_group_id: Option<String>,
}

impl TurnRequest {
    /// Parse and validate a raw request body. No side effects.
    pub fn parse(body: &[u8]) -> Result<Self, TurnError> {
        let body: ChatBody = serde_json::from_slice(body).map_err(|e| {
            TurnError::validation("INVALID_REQUEST", format!("invalid request body: {e}"))
        })?;

        let messages = body.messages.filter(|m| !m.is_empty());
        let chat_id = non_empty(body.chat_id);
        let user_id = non_empty(body.user_id);

        let mut missing = Vec::new();
        if messages.is_none() {
            missing.push("messages");
        }
        if chat_id.is_none() {
            missing.push("chatId");
        }
        if user_id.is_none() {
            missing.push("userId");
        }
        let (Some(messages), Some(chat_id), Some(user_id)) = (messages, chat_id, user_id) else {
            return Err(TurnError::validation(
                "MISSING_FIELDS",
                format!("missing required fields: {}", missing.join(", ")),
            ));
        };

        // The id is echoed back in a response header.
        if !chat_id.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(TurnError::validation(
                "INVALID_CHAT_ID",
                "chatId must be printable ASCII without spaces",
            ));
        }

        Ok(Self {
            messages,
            chat_id,
            user_id,
            model: body.model.trim().to_string(),
            authenticated: body.is_authenticated,
            system_prompt: non_empty(body.system_prompt),
            agent_id: non_empty(body.agent_id),
            enable_search: body.enable_search,
            message_group_id: non_empty(body.message_group_id),
        })
    }

    /// The message this turn answers, when it comes from the user.
    pub fn new_user_message(&self) -> Option<&Message> {
        self.messages.last().filter(|m| m.role == Role::User)
    }

    /// True when the new user message carries files or images.
    pub fn has_uploads(&self) -> bool {
        self.new_user_message().is_some_and(|m| {
            !m.attachments.is_empty()
                || matches!(&m.content, MessageContent::Parts(parts)
                    if parts.iter().any(|p| matches!(p, ContentPart::Image { .. })))
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
