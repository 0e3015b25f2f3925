//! Shared fakes for the chat pipeline integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use parking_lot::Mutex;
use tower::ServiceExt;

use cg_domain::capability::{LlmCapabilities, ModelTier};
use cg_domain::config::{AgentConfig, Config, ModelDescriptor, RemoteToolEndpoint};
use cg_domain::error::Result;
use cg_domain::stream::{BoxStream, StreamEvent, Usage};
use cg_domain::tool::Role;
use cg_gateway::state::AppState;
use cg_providers::{ChatRequest, LlmProvider, ModelCatalog};
use cg_store::{
    CallerProfile, ChatStore, ConversationMeta, MemoryStore, MessageRecord, SharedStoreResolver,
    StoreHandle,
};
use cg_tools::{RemoteToolFetcher, ToolError, ToolRegistry, ToolSet};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Streams a fixed list of text chunks, optionally spaced out, and
/// records whether the stream was dropped before it finished.
pub struct ScriptedProvider {
    chunks: Vec<String>,
    delay: Option<Duration>,
    failure: Option<String>,
    pub calls: AtomicUsize,
    pub requests: Mutex<Vec<ChatRequest>>,
    pub dropped_early: Arc<AtomicBool>,
}

impl ScriptedProvider {
    pub fn new(chunks: &[&str]) -> Arc<Self> {
        Self::build(chunks, None)
    }

    pub fn slow(chunks: &[&str], delay: Duration) -> Arc<Self> {
        Self::build(chunks, Some(delay))
    }

    /// Streams `chunks`, then reports `message` as an in-band error.
    pub fn failing(chunks: &[&str], message: &str) -> Arc<Self> {
        let mut provider = Self::build(chunks, None);
        if let Some(p) = Arc::get_mut(&mut provider) {
            p.failure = Some(message.to_string());
        }
        provider
    }

    fn build(chunks: &[&str], delay: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            delay,
            failure: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            dropped_early: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests.lock().last().cloned()
    }
}

/// Flags the provider stream as dropped unless it was disarmed at the end.
struct DropFlag {
    flag: Arc<AtomicBool>,
    armed: bool,
}

impl Drop for DropFlag {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(true, Ordering::SeqCst);
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat_stream(&self, req: &ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(req.clone());

        let chunks = self.chunks.clone();
        let delay = self.delay;
        let failure = self.failure.clone();
        let flag = self.dropped_early.clone();
        let stream = async_stream::stream! {
            // Owned by the generator: dropped with the stream, not before.
            let mut guard = DropFlag { flag, armed: true };
            for text in chunks {
                if let Some(d) = delay {
                    tokio::time::sleep(d).await;
                }
                yield Ok::<_, cg_domain::error::Error>(StreamEvent::Token { text });
            }
            // Consumers may stop polling once they see the terminal event.
            guard.armed = false;
            match failure {
                Some(message) => {
                    yield Ok::<_, cg_domain::error::Error>(StreamEvent::Error { message });
                }
                None => {
                    yield Ok::<_, cg_domain::error::Error>(StreamEvent::Done {
                        usage: Some(Usage { prompt_tokens: 3, completion_tokens: 5, total_tokens: 8 }),
                        finish_reason: Some("stop".into()),
                    });
                }
            }
        };
        Ok(Box::pin(stream))
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A [`MemoryStore`] that counts every mutating call.
pub struct CountingStore {
    pub inner: MemoryStore,
    pub increments: AtomicUsize,
    pub appends: AtomicUsize,
    pub upserts: AtomicUsize,
    pub usage_records: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: MemoryStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            increments: AtomicUsize::new(0),
            appends: AtomicUsize::new(0),
            upserts: AtomicUsize::new(0),
            usage_records: AtomicUsize::new(0),
        })
    }

    pub fn mutations(&self) -> usize {
        self.increments.load(Ordering::SeqCst)
            + self.appends.load(Ordering::SeqCst)
            + self.upserts.load(Ordering::SeqCst)
            + self.usage_records.load(Ordering::SeqCst)
    }

    pub fn increments(&self) -> usize {
        self.increments.load(Ordering::SeqCst)
    }

    pub fn role_count(&self, chat_id: &str, role: Role) -> usize {
        self.inner
            .messages(chat_id)
            .iter()
            .filter(|r| r.message.role == role)
            .count()
    }
}

#[async_trait::async_trait]
impl ChatStore for CountingStore {
    async fn caller_profile(&self, caller_id: &str) -> Result<CallerProfile> {
        self.inner.caller_profile(caller_id).await
    }

    async fn daily_message_count(&self, caller_id: &str, authenticated: bool) -> Result<u64> {
        self.inner.daily_message_count(caller_id, authenticated).await
    }

    async fn increment_daily_count(&self, caller_id: &str, authenticated: bool) -> Result<u64> {
        self.increments.fetch_add(1, Ordering::SeqCst);
        self.inner.increment_daily_count(caller_id, authenticated).await
    }

    async fn append_messages(&self, records: Vec<MessageRecord>) -> Result<()> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        self.inner.append_messages(records).await
    }

    async fn load_agent(&self, agent_id: &str) -> Result<Option<AgentConfig>> {
        self.inner.load_agent(agent_id).await
    }

    async fn record_agent_usage(&self, agent_id: &str, caller_id: &str) -> Result<()> {
        self.usage_records.fetch_add(1, Ordering::SeqCst);
        self.inner.record_agent_usage(agent_id, caller_id).await
    }

    async fn provider_key(&self, caller_id: &str, provider_id: &str) -> Result<Option<String>> {
        self.inner.provider_key(caller_id, provider_id).await
    }

    async fn upsert_conversation(&self, meta: ConversationMeta) -> Result<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert_conversation(meta).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Remote tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Every endpoint is unreachable.
pub struct UnreachableFetcher {
    pub attempts: AtomicUsize,
}

impl UnreachableFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            attempts: AtomicUsize::new(0),
        })
    }
}

#[async_trait::async_trait]
impl RemoteToolFetcher for UnreachableFetcher {
    async fn fetch(&self, endpoint: &RemoteToolEndpoint) -> std::result::Result<ToolSet, ToolError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ToolError::Http(format!("connection refused: {}", endpoint.url)))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn model(id: &str, tier: ModelTier) -> ModelDescriptor {
    ModelDescriptor {
        id: id.into(),
        name: None,
        provider: "scripted".into(),
        upstream_model: None,
        tier,
        capabilities: LlmCapabilities::default(),
        available: true,
    }
}

pub struct Harness {
    pub state: AppState,
    pub provider: Arc<ScriptedProvider>,
    pub store: Arc<CountingStore>,
    pub fetcher: Arc<UnreachableFetcher>,
}

impl Harness {
    pub fn new(provider: Arc<ScriptedProvider>) -> Self {
        Self::with(provider, Config::default(), HashMap::new())
    }

    pub fn with(
        provider: Arc<ScriptedProvider>,
        config: Config,
        agents: HashMap<String, AgentConfig>,
    ) -> Self {
        Self::build(provider, config, agents, true, ToolRegistry::default())
    }

    /// Same as [`Harness::with`] but no store is configured.
    pub fn without_store(provider: Arc<ScriptedProvider>, config: Config) -> Self {
        Self::build(provider, config, HashMap::new(), false, ToolRegistry::default())
    }

    /// Store-backed agents with the built-in tools registered.
    pub fn with_builtin_tools(
        provider: Arc<ScriptedProvider>,
        agents: HashMap<String, AgentConfig>,
    ) -> Self {
        let tools = ToolRegistry::with_builtins().unwrap();
        Self::build(provider, Config::default(), agents, true, tools)
    }

    fn build(
        provider: Arc<ScriptedProvider>,
        mut config: Config,
        agents: HashMap<String, AgentConfig>,
        store_enabled: bool,
        tools: ToolRegistry,
    ) -> Self {
        config.llm.default_system_prompt = "You are a helpful assistant.".into();
        let catalog = ModelCatalog::new(vec![
            model("gpt-x", ModelTier::Free),
            model("gpt-x-pro", ModelTier::Premium),
        ])
        .with_provider(provider.clone(), false);

        let store = CountingStore::new(
            MemoryStore::new(agents).with_premium_callers(["vip".to_string()]),
        );
        let resolver = if store_enabled {
            let handle: StoreHandle = store.clone();
            SharedStoreResolver::new(handle)
        } else {
            SharedStoreResolver::disabled()
        };
        let fetcher = UnreachableFetcher::new();

        let state = AppState::new(
            Arc::new(config),
            Arc::new(catalog),
            Arc::new(resolver),
            Arc::new(tools),
            fetcher.clone(),
        );
        Self {
            state,
            provider,
            store,
            fetcher,
        }
    }

    pub async fn post_chat(&self, body: serde_json::Value) -> Response<Body> {
        let request = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        cg_gateway::api::router(self.state.clone())
            .oneshot(request)
            .await
            .unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        cg_gateway::api::router(self.state.clone())
            .oneshot(request)
            .await
            .unwrap()
    }
}

pub fn chat_body(chat_id: &str, user_id: &str, model: &str, authenticated: bool) -> serde_json::Value {
    serde_json::json!({
        "messages": [{ "role": "user", "content": "hello" }],
        "chatId": chat_id,
        "userId": user_id,
        "model": model,
        "isAuthenticated": authenticated,
    })
}

pub async fn body_string(resp: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(resp: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_string(resp).await).unwrap()
}

/// Poll until `check` holds; detached tasks finish on their own schedule.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
