//! Model invoker: the streamed generation and its tool loop.
//!
//! Every provider failure (bad credential, outage, stall, timeout) ends in
//! [`StreamOutcome::ProviderError`]; nothing here fails synchronously. The
//! caller observes progress through [`TurnEvent`]s on an mpsc channel.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use cg_domain::config::PerformanceConfig;
use cg_domain::error::Error;
use cg_domain::stream::{SourceRef, StreamEvent, Usage};
use cg_domain::tool::{ContentPart, Message, ToolCall};
use cg_domain::trace::TraceEvent;
use cg_providers::{ChatRequest, ResolvedModel};
use cg_tools::ToolSet;

use super::error::client_error_message;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Events and outcomes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Progress of one turn, in stream order.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    StepStart {
        message_id: String,
    },
    Text(String),
    Reasoning(String),
    Source(SourceRef),
    ToolCall(ToolCall),
    ToolResult {
        call_id: String,
        result: String,
        is_error: bool,
    },
    StepFinish {
        finish_reason: String,
        usage: Usage,
        is_continued: bool,
    },
    /// Terminal: the turn completed.
    Finish {
        finish_reason: String,
        usage: Usage,
    },
    /// Terminal: the turn failed mid-stream.
    Error(String),
}

#[derive(Debug, Clone)]
pub struct CompletedTurn {
    /// Assistant and tool messages produced by this turn.
    pub messages: Vec<Message>,
    pub usage: Usage,
    pub finish_reason: String,
    pub steps: u32,
}

#[derive(Debug, Clone)]
pub enum StreamOutcome {
    Completed(CompletedTurn),
    ProviderError(String),
    ClientAbort,
}

impl StreamOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            StreamOutcome::Completed(_) => "completed",
            StreamOutcome::ProviderError(_) => "provider_error",
            StreamOutcome::ClientAbort => "client_abort",
        }
    }
}

/// Everything the provider call needs.
pub struct Invocation {
    pub model: ResolvedModel,
    pub system_prompt: String,
    pub history: Vec<Message>,
    pub tools: ToolSet,
    /// Bring-your-own key. `None` uses the provider's configured key.
    pub api_key: Option<String>,
    pub enable_search: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ModelInvoker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ModelInvoker {
    permits: Arc<Semaphore>,
    perf: PerformanceConfig,
}

/// Early exit from a step.
enum Halt {
    Abort,
    Failed(String),
}

struct StepResult {
    text: String,
    calls: Vec<ToolCall>,
    usage: Option<Usage>,
    finish_reason: Option<String>,
}

impl ModelInvoker {
    pub fn new(perf: &PerformanceConfig) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(perf.max_concurrent_provider_calls.max(1))),
            perf: perf.clone(),
        }
    }

    /// Run the generation to completion, cancellation or failure.
    pub async fn run(
        &self,
        inv: Invocation,
        tx: mpsc::Sender<TurnEvent>,
        cancel: CancellationToken,
    ) -> StreamOutcome {
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StreamOutcome::ClientAbort,
            permit = self.permits.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => return StreamOutcome::ProviderError("The server is shutting down.".into()),
            },
        };

        let mut conversation = Vec::with_capacity(inv.history.len() + 1);
        conversation.push(Message::system(&inv.system_prompt));
        conversation.extend(inv.history);

        let definitions = inv.tools.definitions();
        let mut produced: Vec<Message> = Vec::new();
        let mut total = Usage::default();
        let max_steps = self.perf.max_steps.max(1);

        for step in 0..max_steps {
            tracing::debug!(step, "model step");

            let req = ChatRequest {
                messages: conversation.clone(),
                tools: definitions.clone(),
                model: Some(inv.model.descriptor.upstream().to_string()),
                api_key: inv.api_key.clone(),
                enable_search: inv.enable_search,
                ..Default::default()
            };

            let message_id = format!("msg-{}", uuid::Uuid::new_v4().simple());
            if tx.send(TurnEvent::StepStart { message_id }).await.is_err() {
                return StreamOutcome::ClientAbort;
            }

            let result = match self.run_step(&inv.model, &req, &tx, &cancel).await {
                Ok(r) => r,
                Err(Halt::Abort) => return StreamOutcome::ClientAbort,
                Err(Halt::Failed(msg)) => return StreamOutcome::ProviderError(msg),
            };

            let step_usage = result.usage.unwrap_or_default();
            total.add(&step_usage);

            // Tool calls only continue the loop when this turn has tools.
            let run_tools = !result.calls.is_empty() && !inv.tools.is_empty();
            let mut parts = Vec::new();
            if run_tools {
                if !result.text.is_empty() {
                    parts.push(ContentPart::Text {
                        text: result.text.clone(),
                    });
                }
                for call in &result.calls {
                    parts.push(ContentPart::ToolUse {
                        id: call.call_id.clone(),
                        name: call.tool_name.clone(),
                        input: call.arguments.clone(),
                    });
                }
            }
            let assistant = if run_tools {
                Message::assistant_parts(parts)
            } else {
                Message::assistant(result.text.clone())
            };
            conversation.push(assistant.clone());
            produced.push(assistant);

            if !run_tools {
                let finish_reason = normalize_finish_reason(result.finish_reason.as_deref());
                if tx
                    .send(TurnEvent::StepFinish {
                        finish_reason: finish_reason.clone(),
                        usage: step_usage,
                        is_continued: false,
                    })
                    .await
                    .is_err()
                {
                    return StreamOutcome::ClientAbort;
                }
                return StreamOutcome::Completed(CompletedTurn {
                    messages: produced,
                    usage: total,
                    finish_reason,
                    steps: step + 1,
                });
            }

            // ── Tool dispatch ──────────────────────────────────────────
            for call in result.calls {
                if tx.send(TurnEvent::ToolCall(call.clone())).await.is_err() {
                    return StreamOutcome::ClientAbort;
                }
                let output = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return StreamOutcome::ClientAbort,
                    out = inv.tools.invoke(&call.tool_name, call.arguments.clone()) => out,
                };
                if tx
                    .send(TurnEvent::ToolResult {
                        call_id: call.call_id.clone(),
                        result: output.content.clone(),
                        is_error: output.is_error,
                    })
                    .await
                    .is_err()
                {
                    return StreamOutcome::ClientAbort;
                }
                let msg = Message::tool_output(&call.call_id, output.content, output.is_error);
                conversation.push(msg.clone());
                produced.push(msg);
            }

            if tx
                .send(TurnEvent::StepFinish {
                    finish_reason: "tool-calls".into(),
                    usage: step_usage,
                    is_continued: false,
                })
                .await
                .is_err()
            {
                return StreamOutcome::ClientAbort;
            }
        }

        tracing::info!(max_steps, "tool step ceiling reached");
        StreamOutcome::Completed(CompletedTurn {
            messages: produced,
            usage: total,
            finish_reason: "tool-calls".into(),
            steps: max_steps,
        })
    }

    /// One provider call, relayed as it streams.
    async fn run_step(
        &self,
        model: &ResolvedModel,
        req: &ChatRequest,
        tx: &mpsc::Sender<TurnEvent>,
        cancel: &CancellationToken,
    ) -> Result<StepResult, Halt> {
        let span = tracing::info_span!(
            "llm.call",
            "otel.kind" = "CLIENT",
            provider = %model.provider.provider_id(),
            model = %model.descriptor.id,
            input_tokens = tracing::field::Empty,
            output_tokens = tracing::field::Empty,
        );
        let result = self
            .stream_step(model, req, tx, cancel)
            .instrument(span.clone())
            .await;
        if let Ok(StepResult { usage: Some(u), .. }) = &result {
            span.record("input_tokens", u.prompt_tokens);
            span.record("output_tokens", u.completion_tokens);
        }
        result
    }

    async fn stream_step(
        &self,
        model: &ResolvedModel,
        req: &ChatRequest,
        tx: &mpsc::Sender<TurnEvent>,
        cancel: &CancellationToken,
    ) -> Result<StepResult, Halt> {
        let provider_id = model.provider.provider_id().to_string();
        let started = Instant::now();

        let open_timeout = self.perf.provider_timeout(model.local);
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Halt::Abort),
            r = tokio::time::timeout(open_timeout, model.provider.chat_stream(req)) => r,
        };
        let mut stream = match opened {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => return Err(provider_failure(&provider_id, &e)),
            Err(_) => {
                return Err(provider_failure(
                    &provider_id,
                    &Error::Timeout(format!("opening stream after {open_timeout:?}")),
                ))
            }
        };

        // The first event gets at least the provider timeout.
        let idle = self.perf.stream_timeout();
        let first_wait = idle.max(open_timeout);
        let mut waited_first = false;
        let mut text = String::new();
        let mut calls: Vec<ToolCall> = Vec::new();
        let mut partial: BTreeMap<String, (String, String)> = BTreeMap::new();
        let mut usage = None;
        let mut finish_reason = None;

        loop {
            let wait = if waited_first { idle } else { first_wait };
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Halt::Abort),
                n = tokio::time::timeout(wait, stream.next()) => n,
            };
            waited_first = true;
            let event = match next {
                Ok(None) => break,
                Ok(Some(Ok(ev))) => ev,
                Ok(Some(Err(e))) => return Err(provider_failure(&provider_id, &e)),
                Err(_) => {
                    return Err(provider_failure(
                        &provider_id,
                        &Error::Timeout(format!("no stream data for {wait:?}")),
                    ))
                }
            };

            let relay = match event {
                StreamEvent::Token { text: t } => {
                    text.push_str(&t);
                    Some(TurnEvent::Text(t))
                }
                StreamEvent::Thinking { text: t } => Some(TurnEvent::Reasoning(t)),
                StreamEvent::Source(src) => Some(TurnEvent::Source(src)),
                StreamEvent::ToolCallStarted { call_id, tool_name } => {
                    partial.insert(call_id, (tool_name, String::new()));
                    None
                }
                StreamEvent::ToolCallDelta { call_id, delta } => {
                    if let Some((_, args)) = partial.get_mut(&call_id) {
                        args.push_str(&delta);
                    }
                    None
                }
                StreamEvent::ToolCallFinished {
                    call_id,
                    tool_name,
                    arguments,
                } => {
                    partial.remove(&call_id);
                    calls.push(ToolCall {
                        call_id,
                        tool_name,
                        arguments,
                    });
                    None
                }
                StreamEvent::Done {
                    usage: u,
                    finish_reason: f,
                } => {
                    usage = u;
                    finish_reason = f;
                    None
                }
                StreamEvent::Error { message } => {
                    return Err(provider_failure(
                        &provider_id,
                        &Error::Provider {
                            provider: provider_id.clone(),
                            message,
                        },
                    ));
                }
            };

            if let Some(ev) = relay {
                if tx.send(ev).await.is_err() {
                    return Err(Halt::Abort);
                }
            }
        }

        // Calls that only arrived as start + deltas.
        for (call_id, (tool_name, args)) in partial {
            calls.push(ToolCall {
                call_id,
                tool_name,
                arguments: parse_arguments(&args),
            });
        }

        TraceEvent::LlmRequest {
            provider: provider_id,
            model: model.descriptor.id.clone(),
            streaming: true,
            duration_ms: started.elapsed().as_millis() as u64,
            prompt_tokens: usage.map(|u| u.prompt_tokens),
            completion_tokens: usage.map(|u| u.completion_tokens),
        }
        .emit();

        Ok(StepResult {
            text,
            calls,
            usage,
            finish_reason,
        })
    }
}

fn provider_failure(provider_id: &str, err: &Error) -> Halt {
    tracing::warn!(provider = %provider_id, error = %err, "provider call failed");
    Halt::Failed(client_error_message(err))
}

fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "tool call arguments are not valid JSON; using empty object");
        Value::Object(Default::default())
    })
}

/// Map provider finish reasons onto the data stream vocabulary.
pub fn normalize_finish_reason(reason: Option<&str>) -> String {
    match reason {
        Some("stop") | Some("end_turn") => "stop",
        Some("length") | Some("max_tokens") => "length",
        Some("tool_calls") | Some("tool_use") | Some("tool-calls") => "tool-calls",
        Some("content_filter") | Some("content-filter") => "content-filter",
        Some("error") => "error",
        Some(_) => "other",
        None => "stop",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cg_domain::capability::{LlmCapabilities, ModelTier};
    use cg_domain::config::ModelDescriptor;
    use cg_domain::stream::BoxStream;
    use cg_providers::LlmProvider;
    use cg_tools::{ToolError, ToolHandler, ToolOutput};
    use cg_domain::tool::ToolDefinition;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Replays one scripted event list per call.
    struct Scripted {
        steps: Mutex<VecDeque<Vec<cg_domain::error::Result<StreamEvent>>>>,
        seen: Mutex<Vec<ChatRequest>>,
    }

    impl Scripted {
        fn new(steps: Vec<Vec<cg_domain::error::Result<StreamEvent>>>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl LlmProvider for Scripted {
        async fn chat_stream(
            &self,
            req: &ChatRequest,
        ) -> cg_domain::error::Result<BoxStream<'static, cg_domain::error::Result<StreamEvent>>> {
            self.seen.lock().push(req.clone());
            let events = self.steps.lock().pop_front().unwrap_or_default();
            Ok(Box::pin(futures_util::stream::iter(events)))
        }
        fn provider_id(&self) -> &str {
            "scripted"
        }
    }

    struct Hanging;

    #[async_trait::async_trait]
    impl LlmProvider for Hanging {
        async fn chat_stream(
            &self,
            _req: &ChatRequest,
        ) -> cg_domain::error::Result<BoxStream<'static, cg_domain::error::Result<StreamEvent>>> {
            Ok(Box::pin(futures_util::stream::pending()))
        }
        fn provider_id(&self) -> &str {
            "hanging"
        }
    }

    /// Opens at once, then sends one token after `delay`.
    struct SlowFirstToken {
        delay: std::time::Duration,
    }

    #[async_trait::async_trait]
    impl LlmProvider for SlowFirstToken {
        async fn chat_stream(
            &self,
            _req: &ChatRequest,
        ) -> cg_domain::error::Result<BoxStream<'static, cg_domain::error::Result<StreamEvent>>> {
            let delay = self.delay;
            let stream = async_stream::stream! {
                tokio::time::sleep(delay).await;
                yield Ok::<_, Error>(StreamEvent::Token { text: "warm".into() });
                yield done("stop");
            };
            Ok(Box::pin(stream))
        }
        fn provider_id(&self) -> &str {
            "ollama"
        }
    }

    struct Upper(ToolDefinition);

    #[async_trait::async_trait]
    impl ToolHandler for Upper {
        fn definition(&self) -> &ToolDefinition {
            &self.0
        }
        async fn call(&self, args: Value) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::ok(
                args["text"].as_str().unwrap_or_default().to_uppercase(),
            ))
        }
    }

    fn resolved(provider: Arc<dyn LlmProvider>) -> ResolvedModel {
        ResolvedModel {
            descriptor: ModelDescriptor {
                id: "gpt-x".into(),
                name: None,
                provider: provider.provider_id().into(),
                upstream_model: Some("gpt-x-2026".into()),
                tier: ModelTier::Free,
                capabilities: LlmCapabilities::default(),
                available: true,
            },
            provider,
            local: false,
        }
    }

    fn invocation(provider: Arc<dyn LlmProvider>, tools: ToolSet) -> Invocation {
        Invocation {
            model: resolved(provider),
            system_prompt: "be brief".into(),
            history: vec![Message::user("hello")],
            tools,
            api_key: None,
            enable_search: false,
        }
    }

    fn upper_tools() -> ToolSet {
        let upper: Arc<dyn ToolHandler> = Arc::new(Upper(ToolDefinition {
            name: "upper".into(),
            description: "uppercase".into(),
            parameters: serde_json::json!({"type": "object"}),
        }));
        ToolSet::new(vec![upper])
    }

    async fn drain(mut rx: mpsc::Receiver<TurnEvent>) -> Vec<TurnEvent> {
        let mut out = Vec::new();
        while let Some(ev) = rx.recv().await {
            out.push(ev);
        }
        out
    }

    fn done(reason: &str) -> cg_domain::error::Result<StreamEvent> {
        Ok(StreamEvent::Done {
            usage: Some(Usage {
                prompt_tokens: 3,
                completion_tokens: 2,
                total_tokens: 5,
            }),
            finish_reason: Some(reason.into()),
        })
    }

    #[tokio::test]
    async fn plain_completion() {
        let provider = Scripted::new(vec![vec![
            Ok(StreamEvent::Token { text: "Hi ".into() }),
            Ok(StreamEvent::Token { text: "there".into() }),
            done("stop"),
        ]]);
        let invoker = ModelInvoker::new(&PerformanceConfig::default());
        let (tx, rx) = mpsc::channel(64);
        let outcome = invoker
            .run(invocation(provider.clone(), ToolSet::empty()), tx, CancellationToken::new())
            .await;

        let StreamOutcome::Completed(turn) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(turn.steps, 1);
        assert_eq!(turn.finish_reason, "stop");
        assert_eq!(turn.messages.len(), 1);
        assert_eq!(turn.messages[0].content.extract_all_text(), "Hi there");

        let seen = provider.seen.lock();
        assert_eq!(seen[0].model.as_deref(), Some("gpt-x-2026"));
        assert_eq!(seen[0].messages[0].content.text(), Some("be brief"));

        let events = drain(rx).await;
        assert!(matches!(events[0], TurnEvent::StepStart { .. }));
        assert_eq!(events[1], TurnEvent::Text("Hi ".into()));
        assert!(matches!(events.last(), Some(TurnEvent::StepFinish { .. })));
    }

    #[tokio::test]
    async fn tool_loop_runs_tools_and_continues() {
        let provider = Scripted::new(vec![
            vec![
                Ok(StreamEvent::ToolCallStarted {
                    call_id: "c1".into(),
                    tool_name: "upper".into(),
                }),
                Ok(StreamEvent::ToolCallFinished {
                    call_id: "c1".into(),
                    tool_name: "upper".into(),
                    arguments: serde_json::json!({"text": "abc"}),
                }),
                done("tool_calls"),
            ],
            vec![Ok(StreamEvent::Token { text: "ABC".into() }), done("stop")],
        ]);
        let invoker = ModelInvoker::new(&PerformanceConfig::default());
        let (tx, rx) = mpsc::channel(64);
        let outcome = invoker
            .run(invocation(provider.clone(), upper_tools()), tx, CancellationToken::new())
            .await;

        let StreamOutcome::Completed(turn) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(turn.steps, 2);
        assert_eq!(turn.usage.total_tokens, 10);
        // assistant(tool_use), tool(result), assistant(text)
        assert_eq!(turn.messages.len(), 3);
        assert!(turn.messages[0].has_tool_parts());

        // Second request carries the tool result.
        let seen = provider.seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen[1].messages.iter().any(|m| m.has_tool_parts()));

        let events = drain(rx).await;
        assert!(events.contains(&TurnEvent::ToolResult {
            call_id: "c1".into(),
            result: "ABC".into(),
            is_error: false,
        }));
    }

    #[tokio::test]
    async fn step_ceiling_stops_the_loop() {
        let call = || {
            vec![
                Ok(StreamEvent::ToolCallFinished {
                    call_id: "c".into(),
                    tool_name: "upper".into(),
                    arguments: serde_json::json!({"text": "x"}),
                }),
                done("tool_calls"),
            ]
        };
        let provider = Scripted::new(vec![call(), call(), call(), call()]);
        let perf = PerformanceConfig {
            max_steps: 2,
            ..Default::default()
        };
        let invoker = ModelInvoker::new(&perf);
        let (tx, _rx) = mpsc::channel(256);
        let outcome = invoker
            .run(invocation(provider.clone(), upper_tools()), tx, CancellationToken::new())
            .await;
        assert!(matches!(outcome, StreamOutcome::Completed(CompletedTurn { steps: 2, .. })));
        assert_eq!(provider.seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn in_band_provider_error() {
        let provider = Scripted::new(vec![vec![
            Ok(StreamEvent::Token { text: "par".into() }),
            Err(Error::ProviderStatus {
                provider: "scripted".into(),
                status: 401,
                body: "bad key".into(),
            }),
        ]]);
        let invoker = ModelInvoker::new(&PerformanceConfig::default());
        let (tx, _rx) = mpsc::channel(64);
        let outcome = invoker
            .run(invocation(provider, ToolSet::empty()), tx, CancellationToken::new())
            .await;
        let StreamOutcome::ProviderError(msg) = outcome else {
            panic!("expected provider error");
        };
        assert!(msg.contains("API key"));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_stream_times_out() {
        let perf = PerformanceConfig {
            stream_timeout_ms: 1_000,
            ..Default::default()
        };
        let invoker = ModelInvoker::new(&perf);
        let (tx, _rx) = mpsc::channel(64);
        let outcome = invoker
            .run(invocation(Arc::new(Hanging), ToolSet::empty()), tx, CancellationToken::new())
            .await;
        let StreamOutcome::ProviderError(msg) = outcome else {
            panic!("expected provider error");
        };
        assert!(msg.contains("too long"));
    }

    #[tokio::test(start_paused = true)]
    async fn local_first_token_gets_the_local_timeout() {
        let slow = || Arc::new(SlowFirstToken {
            delay: std::time::Duration::from_secs(40),
        });
        let invoker = ModelInvoker::new(&PerformanceConfig::default());

        let mut local = invocation(slow(), ToolSet::empty());
        local.model.local = true;
        let (tx, _rx) = mpsc::channel(64);
        let outcome = invoker.run(local, tx, CancellationToken::new()).await;
        let StreamOutcome::Completed(turn) = outcome else {
            panic!("local provider should get 45s for the first token");
        };
        assert_eq!(turn.messages[0].content.extract_all_text(), "warm");

        let (tx, _rx) = mpsc::channel(64);
        let hosted = invoker
            .run(invocation(slow(), ToolSet::empty()), tx, CancellationToken::new())
            .await;
        assert!(matches!(hosted, StreamOutcome::ProviderError(_)));
    }

    #[tokio::test]
    async fn in_band_error_event_is_made_friendly() {
        let provider = Scripted::new(vec![vec![
            Ok(StreamEvent::Token { text: "par".into() }),
            Ok(StreamEvent::Error {
                message: "overloaded_error: shard 7".into(),
            }),
        ]]);
        let invoker = ModelInvoker::new(&PerformanceConfig::default());
        let (tx, _rx) = mpsc::channel(64);
        let outcome = invoker
            .run(invocation(provider, ToolSet::empty()), tx, CancellationToken::new())
            .await;
        let StreamOutcome::ProviderError(msg) = outcome else {
            panic!("expected provider error");
        };
        assert!(msg.starts_with("scripted reported an error"));
        assert!(!msg.contains("shard 7"));
    }

    #[tokio::test]
    async fn cancellation_aborts() {
        let invoker = ModelInvoker::new(&PerformanceConfig::default());
        let (tx, _rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let outcome = invoker
            .run(invocation(Arc::new(Hanging), ToolSet::empty()), tx, cancel)
            .await;
        assert!(matches!(outcome, StreamOutcome::ClientAbort));
    }

    #[test]
    fn finish_reasons() {
        assert_eq!(normalize_finish_reason(Some("tool_calls")), "tool-calls");
        assert_eq!(normalize_finish_reason(Some("end_turn")), "stop");
        assert_eq!(normalize_finish_reason(Some("max_tokens")), "length");
        assert_eq!(normalize_finish_reason(Some("weird")), "other");
        assert_eq!(normalize_finish_reason(None), "stop");
    }
}
