//! AI SDK data stream protocol (v1) encoder.
//!
//! One `<code>:<json>\n` line per part:
//!
//! | code | part          |
//! |------|---------------|
//! | `0`  | text          |
//! | `g`  | reasoning     |
//! | `h`  | source        |
//! | `9`  | tool call     |
//! | `a`  | tool result   |
//! | `3`  | error         |
//! | `f`  | step start    |
//! | `e`  | step finish   |
//! | `d`  | finish        |

use serde::Serialize;
use serde_json::json;

use cg_domain::config::RelayConfig;
use cg_domain::stream::Usage;

use super::invoke::TurnEvent;

pub const DATA_STREAM_HEADER: &str = "x-vercel-ai-data-stream";
pub const DATA_STREAM_VERSION: &str = "v1";
pub const CHAT_ID_HEADER: &str = "x-chat-id";

#[derive(Debug, Clone, Copy)]
pub struct DataStreamEncoder {
    send_reasoning: bool,
    send_sources: bool,
}

impl DataStreamEncoder {
    pub fn new(relay: &RelayConfig) -> Self {
        Self {
            send_reasoning: relay.send_reasoning,
            send_sources: relay.send_sources,
        }
    }

    /// Encode one event. Side-channel parts the client did not opt into
    /// return `None`.
    pub fn encode(&self, event: &TurnEvent) -> Option<String> {
        match event {
            TurnEvent::Text(text) => Some(line('0', text)),
            TurnEvent::Reasoning(text) => self.send_reasoning.then(|| line('g', text)),
            TurnEvent::Source(src) => self.send_sources.then(|| {
                line(
                    'h',
                    &json!({
                        "sourceType": "url",
                        "id": src.id,
                        "url": src.url,
                        "title": src.title,
                    }),
                )
            }),
            TurnEvent::ToolCall(call) => Some(line(
                '9',
                &json!({
                    "toolCallId": call.call_id,
                    "toolName": call.tool_name,
                    "args": call.arguments,
                }),
            )),
            TurnEvent::ToolResult {
                call_id,
                result,
                is_error,
            } => Some(line(
                'a',
                &json!({ "toolCallId": call_id, "result": result, "isError": is_error }),
            )),
            TurnEvent::StepStart { message_id } => {
                Some(line('f', &json!({ "messageId": message_id })))
            }
            TurnEvent::StepFinish {
                finish_reason,
                usage,
                is_continued,
            } => Some(line(
                'e',
                &json!({
                    "finishReason": finish_reason,
                    "usage": usage_json(usage),
                    "isContinued": is_continued,
                }),
            )),
            TurnEvent::Finish {
                finish_reason,
                usage,
            } => Some(line(
                'd',
                &json!({ "finishReason": finish_reason, "usage": usage_json(usage) }),
            )),
            TurnEvent::Error(message) => Some(line('3', message)),
        }
    }
}

fn usage_json(usage: &Usage) -> serde_json::Value {
    json!({
        "promptTokens": usage.prompt_tokens,
        "completionTokens": usage.completion_tokens,
    })
}

fn line(code: char, value: &impl Serialize) -> String {
    let payload = serde_json::to_string(value).unwrap_or_else(|_| "null".into());
    format!("{code}:{payload}\n")
}
