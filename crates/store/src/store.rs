//! Store collaborator traits.
//!
//! The turn pipeline never touches storage directly. It asks a
//! [`StoreResolver`] for an optional [`StoreHandle`] and only uses the
//! atomic operations on [`ChatStore`]: counters are incremented, messages
//! are appended, nothing is read-modified-written.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cg_domain::config::AgentConfig;
use cg_domain::error::Result;
use cg_domain::tool::Message;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerProfile {
    pub premium: bool,
}

/// One persisted message. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub chat_id: String,
    pub caller_id: String,
    pub message: Message,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    pub fn new(chat_id: &str, caller_id: &str, message: Message) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            caller_id: caller_id.to_string(),
            message,
            message_group_id: None,
            model: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_group(mut self, group: Option<String>) -> Self {
        self.message_group_id = group;
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }
}

/// Conversation-level metadata, upserted on every accepted turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMeta {
    pub chat_id: String,
    pub caller_id: String,
    pub model: String,
    pub updated_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Traits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
pub trait ChatStore: Send + Sync {
    async fn caller_profile(&self, caller_id: &str) -> Result<CallerProfile>;

    /// Messages counted today (UTC) for this caller and auth status.
    async fn daily_message_count(&self, caller_id: &str, authenticated: bool) -> Result<u64>;

    /// Atomically add one to today's counter and return the new value.
    async fn increment_daily_count(&self, caller_id: &str, authenticated: bool) -> Result<u64>;

    async fn append_messages(&self, records: Vec<MessageRecord>) -> Result<()>;

    async fn load_agent(&self, agent_id: &str) -> Result<Option<AgentConfig>>;

    async fn record_agent_usage(&self, agent_id: &str, caller_id: &str) -> Result<()>;

    /// The caller's own key for a provider, if they stored one.
    async fn provider_key(&self, caller_id: &str, provider_id: &str) -> Result<Option<String>>;

    async fn upsert_conversation(&self, meta: ConversationMeta) -> Result<()>;
}

pub type StoreHandle = Arc<dyn ChatStore>;

/// Maps an identity claim to a backing store.
///
/// `Ok(None)` is the anonymous/local path: the turn runs without quota
/// checks or persistence.
#[async_trait::async_trait]
pub trait StoreResolver: Send + Sync {
    async fn resolve(&self, caller_id: &str, authenticated: bool) -> Result<Option<StoreHandle>>;
}

/// Resolves every caller to the same store (or to none).
#[derive(Clone, Default)]
pub struct SharedStoreResolver {
    store: Option<StoreHandle>,
}

impl SharedStoreResolver {
    pub fn new(store: StoreHandle) -> Self {
        Self { store: Some(store) }
    }

    pub fn disabled() -> Self {
        Self { store: None }
    }
}

#[async_trait::async_trait]
impl StoreResolver for SharedStoreResolver {
    async fn resolve(&self, _caller_id: &str, _authenticated: bool) -> Result<Option<StoreHandle>> {
        Ok(self.store.clone())
    }
}
