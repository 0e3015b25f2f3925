//! OpenAI-compatible adapter.
//!
//! Works with OpenAI, DeepSeek, Ollama, vLLM, LM Studio, OpenRouter and any
//! other endpoint that follows the OpenAI chat completions contract.

use crate::traits::{ChatRequest, LlmProvider};
use crate::util::{from_reqwest, resolve_api_key, status_error};
use cg_domain::config::ProviderConfig;
use cg_domain::error::{Error, Result};
use cg_domain::stream::{BoxStream, SourceRef, StreamEvent, Usage};
use cg_domain::tool::{ContentPart, Message, MessageContent, Role, ToolDefinition};
use serde_json::Value;
use std::collections::BTreeMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: Option<String>,
    auth_header: String,
    auth_prefix: String,
    default_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new provider from the deserialized provider config.
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self> {
        let api_key = resolve_api_key(&cfg.auth)?;
        let auth_header = cfg
            .auth
            .header
            .clone()
            .unwrap_or_else(|| "Authorization".into());
        let auth_prefix = cfg.auth.prefix.clone().unwrap_or_else(|| "Bearer ".into());
        let default_model = cfg.default_model.clone().unwrap_or_else(|| "gpt-4o".into());

        // No overall timeout: streams may legitimately run long. The turn
        // pipeline bounds open and idle time itself.
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: cfg.id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            auth_header,
            auth_prefix,
            default_model,
            client,
        })
    }

    fn authed_post(&self, url: &str, req: &ChatRequest) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        match req.api_key.as_ref().or(self.api_key.as_ref()) {
            Some(key) => builder.header(&self.auth_header, format!("{}{}", self.auth_prefix, key)),
            None => builder,
        }
    }

    fn build_chat_body(&self, req: &ChatRequest) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_openai).collect();
        let model = req.model.clone().unwrap_or_else(|| self.default_model.clone());

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": true,
            "stream_options": {"include_usage": true},
        });

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_openai).collect();
            body["tools"] = Value::Array(tools);
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        if req.enable_search {
            body["web_search_options"] = serde_json::json!({});
        }
        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn msg_to_openai(msg: &Message) -> Value {
    match msg.role {
        Role::Tool => tool_result_to_openai(msg),
        Role::Assistant => assistant_to_openai(msg),
        Role::User if has_images(msg) => user_with_images_to_openai(msg),
        _ => serde_json::json!({
            "role": msg.role.as_str(),
            "content": msg.content.extract_all_text(),
        }),
    }
}

fn has_images(msg: &Message) -> bool {
    let image_part = match &msg.content {
        MessageContent::Parts(parts) => parts.iter().any(|p| matches!(p, ContentPart::Image { .. })),
        MessageContent::Text(_) => false,
    };
    image_part || !msg.attachments.is_empty()
}

fn user_with_images_to_openai(msg: &Message) -> Value {
    let mut content = vec![serde_json::json!({
        "type": "text",
        "text": msg.content.extract_all_text(),
    })];
    if let MessageContent::Parts(parts) = &msg.content {
        for part in parts {
            if let ContentPart::Image { url, .. } = part {
                content.push(serde_json::json!({"type": "image_url", "image_url": {"url": url}}));
            }
        }
    }
    for att in &msg.attachments {
        let is_image = att
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"));
        if is_image {
            content.push(serde_json::json!({"type": "image_url", "image_url": {"url": att.url}}));
        } else {
            let name = att.name.as_deref().unwrap_or("file");
            content.push(serde_json::json!({
                "type": "text",
                "text": format!("[attachment {name}: {}]", att.url),
            }));
        }
    }
    serde_json::json!({"role": "user", "content": content})
}

fn assistant_to_openai(msg: &Message) -> Value {
    let mut obj = serde_json::json!({"role": "assistant"});
    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<Value> = Vec::new();

    match &msg.content {
        MessageContent::Text(t) => text_parts.push(t.clone()),
        MessageContent::Parts(parts) => {
            for part in parts {
                match part {
                    ContentPart::Text { text } => text_parts.push(text.clone()),
                    ContentPart::ToolUse { id, name, input } => {
                        tool_calls.push(serde_json::json!({
                            "id": id,
                            "type": "function",
                            "function": {
                                "name": name,
                                "arguments": input.to_string(),
                            }
                        }));
                    }
                    _ => {}
                }
            }
        }
    }

    obj["content"] = if text_parts.is_empty() {
        Value::Null
    } else {
        Value::String(text_parts.join("\n"))
    };
    if !tool_calls.is_empty() {
        obj["tool_calls"] = Value::Array(tool_calls);
    }
    obj
}

fn tool_result_to_openai(msg: &Message) -> Value {
    let (id, content) = match &msg.content {
        MessageContent::Parts(parts) => parts
            .iter()
            .find_map(|p| match p {
                ContentPart::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } => Some((tool_use_id.clone(), content.clone())),
                _ => None,
            })
            .unwrap_or_default(),
        MessageContent::Text(t) => (String::new(), t.clone()),
    };
    serde_json::json!({"role": "tool", "tool_call_id": id, "content": content})
}

fn tool_to_openai(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

fn parse_openai_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE streaming
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tool-call assembly state kept across SSE payloads.
///
/// OpenAI sends the call id only on the first delta of each call and keys
/// later argument fragments by `index`.
#[derive(Default)]
struct StreamState {
    /// index -> (call_id, name, args_buffer)
    calls: BTreeMap<u64, (String, String, String)>,
    finish_reason: Option<String>,
    sources: usize,
    done_emitted: bool,
}

impl StreamState {
    fn flush_tool_calls(&mut self, events: &mut Vec<Result<StreamEvent>>) {
        for (_, (call_id, tool_name, args)) in std::mem::take(&mut self.calls) {
            let arguments: Value = if args.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&args).unwrap_or(Value::Object(Default::default()))
            };
            events.push(Ok(StreamEvent::ToolCallFinished {
                call_id,
                tool_name,
                arguments,
            }));
        }
    }

    fn done(&mut self, usage: Option<Usage>) -> Result<StreamEvent> {
        self.done_emitted = true;
        Ok(StreamEvent::Done {
            usage,
            finish_reason: Some(self.finish_reason.take().unwrap_or_else(|| "stop".into())),
        })
    }
}

fn parse_sse_data(data: &str, state: &mut StreamState) -> Vec<Result<StreamEvent>> {
    let mut events = Vec::new();
    if state.done_emitted {
        return events;
    }

    if data.trim() == "[DONE]" {
        state.flush_tool_calls(&mut events);
        events.push(state.done(None));
        return events;
    }

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(Error::Json(e))],
    };

    if let Some(err) = v.get("error") {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("provider stream error");
        return vec![Ok(StreamEvent::Error {
            message: message.to_string(),
        })];
    }

    let choice = v
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first());

    let Some(choice) = choice else {
        // Usage-only chunk (stream_options.include_usage) closes the stream.
        if let Some(usage) = v.get("usage").and_then(parse_openai_usage) {
            state.flush_tool_calls(&mut events);
            events.push(state.done(Some(usage)));
        }
        return events;
    };

    let delta = choice.get("delta").unwrap_or(&Value::Null);

    if let Some(text) = delta.get("reasoning_content").and_then(|v| v.as_str()) {
        if !text.is_empty() {
            events.push(Ok(StreamEvent::Thinking {
                text: text.to_string(),
            }));
        }
    }

    if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
        if !text.is_empty() {
            events.push(Ok(StreamEvent::Token {
                text: text.to_string(),
            }));
        }
    }

    if let Some(annotations) = delta.get("annotations").and_then(|v| v.as_array()) {
        for ann in annotations {
            let Some(cite) = ann.get("url_citation") else {
                continue;
            };
            let Some(url) = cite.get("url").and_then(|u| u.as_str()) else {
                continue;
            };
            state.sources += 1;
            events.push(Ok(StreamEvent::Source(SourceRef {
                id: format!("src_{}", state.sources),
                url: url.to_string(),
                title: cite.get("title").and_then(|t| t.as_str()).map(String::from),
            })));
        }
    }

    if let Some(tc_arr) = delta.get("tool_calls").and_then(|v| v.as_array()) {
        for tc in tc_arr {
            let idx = tc.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
            let func = tc.get("function");

            if let Some(id) = tc.get("id").and_then(|v| v.as_str()) {
                let name = func
                    .and_then(|f| f.get("name"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                events.push(Ok(StreamEvent::ToolCallStarted {
                    call_id: id.to_string(),
                    tool_name: name.clone(),
                }));
                state.calls.insert(idx, (id.to_string(), name, String::new()));
            }

            if let Some(args) = func
                .and_then(|f| f.get("arguments"))
                .and_then(|v| v.as_str())
            {
                if let Some(call) = state.calls.get_mut(&idx) {
                    if !args.is_empty() {
                        call.2.push_str(args);
                        events.push(Ok(StreamEvent::ToolCallDelta {
                            call_id: call.0.clone(),
                            delta: args.to_string(),
                        }));
                    }
                }
            }
        }
    }

    if let Some(fr) = choice.get("finish_reason").and_then(|f| f.as_str()) {
        state.flush_tool_calls(&mut events);
        state.finish_reason = Some(fr.to_string());
        // Some servers put usage on the finishing chunk itself.
        if let Some(usage) = v.get("usage").and_then(parse_openai_usage) {
            events.push(state.done(Some(usage)));
        }
    }

    events
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_chat_body(req);

        tracing::debug!(provider = %self.id, url = %url, "openai_compat stream request");

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
            parse_sse_data(data, &mut state)
        }))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
