//! Anthropic Messages API adapter.
//!
//! System messages go in the top-level `system` field, tool results travel
//! as `user` messages with `tool_result` blocks, and search uses the
//! server-side `web_search` tool.

use crate::traits::{ChatRequest, LlmProvider};
use crate::util::{from_reqwest, resolve_api_key, status_error};
use cg_domain::config::ProviderConfig;
use cg_domain::error::{Error, Result};
use cg_domain::stream::{BoxStream, SourceRef, StreamEvent, Usage};
use cg_domain::tool::{ContentPart, Message, MessageContent, Role, ToolDefinition};
use serde_json::Value;
use std::collections::HashMap;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const WEB_SEARCH_MAX_USES: u32 = 5;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct AnthropicProvider {
    id: String,
    base_url: String,
    api_key: Option<String>,
    default_model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self> {
        let api_key = resolve_api_key(&cfg.auth)?;
        let default_model = cfg
            .default_model
            .clone()
            .unwrap_or_else(|| "claude-sonnet-4-20250514".into());

        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: cfg.id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model,
            client,
        })
    }

    fn authed_post(&self, url: &str, req: &ChatRequest) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .post(url)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json");
        match req.api_key.as_ref().or(self.api_key.as_ref()) {
            Some(key) => builder.header("x-api-key", key),
            None => builder,
        }
    }

    fn build_messages_body(&self, req: &ChatRequest) -> Value {
        let model = req
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let mut system_parts: Vec<String> = Vec::new();
        let mut api_messages: Vec<Value> = Vec::new();

        for msg in &req.messages {
            match msg.role {
                Role::System => system_parts.push(msg.content.extract_all_text()),
                Role::User => api_messages.push(user_msg_to_anthropic(msg)),
                Role::Assistant => api_messages.push(assistant_msg_to_anthropic(msg)),
                Role::Tool => api_messages.push(tool_result_to_anthropic(msg)),
            }
        }

        let mut body = serde_json::json!({
            "model": model,
            "messages": api_messages,
            "stream": true,
            "max_tokens": req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });

        if !system_parts.is_empty() {
            body["system"] = Value::String(system_parts.join("\n\n"));
        }

        let mut tools: Vec<Value> = req.tools.iter().map(tool_to_anthropic).collect();
        if req.enable_search {
            tools.push(serde_json::json!({
                "type": "web_search_20250305",
                "name": "web_search",
                "max_uses": WEB_SEARCH_MAX_USES,
            }));
        }
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools);
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn user_msg_to_anthropic(msg: &Message) -> Value {
    let mut content: Vec<Value> = match &msg.content {
        MessageContent::Text(t) => vec![serde_json::json!({"type": "text", "text": t})],
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(serde_json::json!({"type": "text", "text": text})),
                ContentPart::Image { url, .. } => Some(image_block(url)),
                _ => None,
            })
            .collect(),
    };
    for att in &msg.attachments {
        let is_image = att
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"));
        if is_image {
            content.push(image_block(&att.url));
        }
    }
    serde_json::json!({"role": "user", "content": content})
}

/// `data:` URLs become base64 sources, anything else is passed by URL.
fn image_block(url: &str) -> Value {
    if let Some(rest) = url.strip_prefix("data:") {
        if let Some((meta, data)) = rest.split_once(',') {
            let media_type = meta.trim_end_matches(";base64");
            return serde_json::json!({
                "type": "image",
                "source": {"type": "base64", "media_type": media_type, "data": data},
            });
        }
    }
    serde_json::json!({"type": "image", "source": {"type": "url", "url": url}})
}

fn assistant_msg_to_anthropic(msg: &Message) -> Value {
    let content: Vec<Value> = match &msg.content {
        MessageContent::Text(t) => vec![serde_json::json!({"type": "text", "text": t})],
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(serde_json::json!({"type": "text", "text": text})),
                ContentPart::ToolUse { id, name, input } => Some(serde_json::json!({
                    "type": "tool_use",
                    "id": id,
                    "name": name,
                    "input": input,
                })),
                _ => None,
            })
            .collect(),
    };
    serde_json::json!({"role": "assistant", "content": content})
}

fn tool_result_to_anthropic(msg: &Message) -> Value {
    let content: Vec<Value> = match &msg.content {
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => Some(serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": tool_use_id,
                    "content": content,
                    "is_error": is_error,
                })),
                _ => None,
            })
            .collect(),
        MessageContent::Text(t) => vec![serde_json::json!({"type": "text", "text": t})],
    };
    serde_json::json!({"role": "user", "content": content})
}

fn tool_to_anthropic(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.parameters,
    })
}

fn parse_anthropic_usage(v: &Value) -> Option<Usage> {
    let input = v.get("input_tokens")?.as_u64()? as u32;
    let output = v.get("output_tokens").and_then(|o| o.as_u64()).unwrap_or(0) as u32;
    Some(Usage {
        prompt_tokens: input,
        completion_tokens: output,
        total_tokens: input + output,
    })
}

fn map_stop_reason(s: &str) -> String {
    match s {
        "end_turn" | "stop_sequence" => "stop".into(),
        "tool_use" => "tool_calls".into(),
        "max_tokens" => "length".into(),
        other => other.into(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming SSE
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct StreamState {
    /// block index -> (call_id, name, args_buffer)
    active_tool_calls: HashMap<u64, (String, String, String)>,
    usage: Option<Usage>,
    sources: usize,
    done_emitted: bool,
}

impl StreamState {
    fn push_source(&mut self, events: &mut Vec<Result<StreamEvent>>, v: &Value) {
        let Some(url) = v.get("url").and_then(|u| u.as_str()) else {
            return;
        };
        self.sources += 1;
        events.push(Ok(StreamEvent::Source(SourceRef {
            id: format!("src_{}", self.sources),
            url: url.to_string(),
            title: v.get("title").and_then(|t| t.as_str()).map(String::from),
        })));
    }
}

fn parse_anthropic_sse(data: &str, state: &mut StreamState) -> Vec<Result<StreamEvent>> {
    let mut events = Vec::new();

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(Error::Json(e))],
    };

    let event_type = v.get("type").and_then(|v| v.as_str()).unwrap_or("");
    let idx = v.get("index").and_then(|v| v.as_u64()).unwrap_or(0);

    match event_type {
        "message_start" => {
            state.usage = v
                .get("message")
                .and_then(|m| m.get("usage"))
                .and_then(parse_anthropic_usage);
        }

        "content_block_start" => {
            let Some(block) = v.get("content_block") else {
                return events;
            };
            match block.get("type").and_then(|v| v.as_str()).unwrap_or("") {
                "tool_use" => {
                    let call_id = block.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string();
                    let name = block.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string();
                    events.push(Ok(StreamEvent::ToolCallStarted {
                        call_id: call_id.clone(),
                        tool_name: name.clone(),
                    }));
                    state
                        .active_tool_calls
                        .insert(idx, (call_id, name, String::new()));
                }
                // Results of the server-side search tool. Cited inline
                // later through citations_delta as well.
                "web_search_tool_result" => {
                    if let Some(results) = block.get("content").and_then(|c| c.as_array()) {
                        for r in results {
                            state.push_source(&mut events, r);
                        }
                    }
                }
                _ => {}
            }
        }

        "content_block_delta" => {
            let Some(delta) = v.get("delta") else {
                return events;
            };
            match delta.get("type").and_then(|v| v.as_str()).unwrap_or("") {
                "text_delta" => {
                    if let Some(text) = delta.get("text").and_then(|v| v.as_str()) {
                        if !text.is_empty() {
                            events.push(Ok(StreamEvent::Token {
                                text: text.to_string(),
                            }));
                        }
                    }
                }
                "thinking_delta" => {
                    if let Some(text) = delta.get("thinking").and_then(|v| v.as_str()) {
                        if !text.is_empty() {
                            events.push(Ok(StreamEvent::Thinking {
                                text: text.to_string(),
                            }));
                        }
                    }
                }
                "input_json_delta" => {
                    if let Some(partial) = delta.get("partial_json").and_then(|v| v.as_str()) {
                        if let Some(tc) = state.active_tool_calls.get_mut(&idx) {
                            tc.2.push_str(partial);
                            events.push(Ok(StreamEvent::ToolCallDelta {
                                call_id: tc.0.clone(),
                                delta: partial.to_string(),
                            }));
                        }
                    }
                }
                "citations_delta" => {
                    if let Some(citation) = delta.get("citation") {
                        state.push_source(&mut events, citation);
                    }
                }
                _ => {}
            }
        }

        "content_block_stop" => {
            if let Some((call_id, tool_name, args_str)) = state.active_tool_calls.remove(&idx) {
                let arguments: Value = serde_json::from_str(&args_str)
                    .unwrap_or(Value::Object(Default::default()));
                events.push(Ok(StreamEvent::ToolCallFinished {
                    call_id,
                    tool_name,
                    arguments,
                }));
            }
        }

        "message_delta" => {
            if let Some(output) = v
                .get("usage")
                .and_then(|u| u.get("output_tokens"))
                .and_then(|v| v.as_u64())
            {
                if let Some(u) = state.usage.as_mut() {
                    u.completion_tokens = output as u32;
                    u.total_tokens = u.prompt_tokens + u.completion_tokens;
                }
            }
            let stop_reason = v
                .get("delta")
                .and_then(|d| d.get("stop_reason"))
                .and_then(|v| v.as_str())
                .map(map_stop_reason);
            if stop_reason.is_some() && !state.done_emitted {
                state.done_emitted = true;
                events.push(Ok(StreamEvent::Done {
                    usage: state.usage,
                    finish_reason: stop_reason,
                }));
            }
        }

        "message_stop" => {
            if !state.done_emitted {
                state.done_emitted = true;
                events.push(Ok(StreamEvent::Done {
                    usage: state.usage,
                    finish_reason: Some("stop".into()),
                }));
            }
        }

        "error" => {
            let msg = v
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error");
            events.push(Ok(StreamEvent::Error {
                message: msg.to_string(),
            }));
        }

        // ping and unknown event types
        _ => {}
    }

    events
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_messages_body(req);

        tracing::debug!(provider = %self.id, url = %url, "anthropic stream request");

        let resp = self
            .authed_post(&url, req)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        if !resp.status().is_success() {
            return Err(status_error(&self.id, resp).await);
        }

        let mut state = StreamState::default();
        Ok(crate::sse::sse_response_stream(resp, move |data| {
            parse_anthropic_sse(data, &mut state)
        }))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use cg_domain::config::{AuthConfig, AuthMode, ProviderKind};

    fn provider() -> AnthropicProvider {
        AnthropicProvider::from_config(&ProviderConfig {
            id: "anthropic".into(),
            kind: ProviderKind::Anthropic,
            base_url: "https://api.anthropic.com".into(),
            auth: AuthConfig {
                mode: AuthMode::None,
                ..Default::default()
            },
            default_model: None,
            local: false,
        })
        .unwrap()
    }

    fn feed(lines: &[&str]) -> Vec<StreamEvent> {
        let mut state = StreamState::default();
        lines
            .iter()
            .flat_map(|l| parse_anthropic_sse(l, &mut state))
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn system_messages_move_to_top_level_field() {
        let req = ChatRequest {
            messages: vec![Message::system("be brief"), Message::user("hi")],
            enable_search: true,
            ..Default::default()
        };
        let body = provider().build_messages_body(&req);
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["tools"][0]["name"], "web_search");
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn tool_use_block_assembles_into_finished_call() {
        let events = feed(&[
            r#"{"type":"message_start","message":{"usage":{"input_tokens":10,"output_tokens":1}}}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"toolu_1","name":"clock"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"tz\":\"UTC\"}"}}"#,
            r#"{"type":"content_block_stop","index":0}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":7}}"#,
            r#"{"type":"message_stop"}"#,
        ]);
        assert!(events.iter().any(|e| matches!(e,
            StreamEvent::ToolCallFinished { call_id, arguments, .. }
                if call_id == "toolu_1" && arguments["tz"] == "UTC")));
        let dones: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::Done { .. }))
            .collect();
        assert_eq!(dones.len(), 1);
        match dones[0] {
            StreamEvent::Done {
                usage,
                finish_reason,
            } => {
                assert_eq!(finish_reason.as_deref(), Some("tool_calls"));
                assert_eq!(usage.unwrap().total_tokens, 17);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn thinking_and_citations_are_side_channel_events() {
        let events = feed(&[
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"hmm"}}"#,
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"citations_delta","citation":{"type":"web_search_result_location","url":"https://b.example","title":"B"}}}"#,
        ]);
        assert!(matches!(&events[0], StreamEvent::Thinking { text } if text == "hmm"));
        assert!(matches!(&events[1], StreamEvent::Source(s) if s.title.as_deref() == Some("B")));
    }

    #[test]
    fn data_url_images_become_base64_sources() {
        let block = image_block("data:image/jpeg;base64,QUJD");
        assert_eq!(block["source"]["type"], "base64");
        assert_eq!(block["source"]["media_type"], "image/jpeg");
        assert_eq!(block["source"]["data"], "QUJD");
    }
}
