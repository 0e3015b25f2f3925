//! In-memory [`ChatStore`].
//!
//! Lock-protected maps for counters, messages and conversations. Daily
//! counters reset when the UTC date rolls over. When a transcript
//! directory is configured every appended message is also written to a
//! per-conversation JSONL file.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{NaiveDate, Utc};
use parking_lot::RwLock;

use cg_domain::config::AgentConfig;
use cg_domain::error::Result;
use cg_domain::trace::TraceEvent;

use crate::store::{CallerProfile, ChatStore, ConversationMeta, MessageRecord};
use crate::transcript::{TranscriptLine, TranscriptWriter};

/// Running message count for one (caller, auth status) on one day.
struct DailyCount {
    date: NaiveDate,
    count: u64,
}

type CounterKey = (String, bool);

pub struct MemoryStore {
    premium_callers: HashSet<String>,
    agents: HashMap<String, AgentConfig>,
    counters: RwLock<HashMap<CounterKey, DailyCount>>,
    messages: RwLock<HashMap<String, Vec<MessageRecord>>>,
    conversations: RwLock<HashMap<String, ConversationMeta>>,
    agent_usage: RwLock<HashMap<String, u64>>,
    provider_keys: RwLock<HashMap<(String, String), String>>,
    transcript: Option<TranscriptWriter>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

impl MemoryStore {
    pub fn new(agents: HashMap<String, AgentConfig>) -> Self {
        Self {
            premium_callers: HashSet::new(),
            agents,
            counters: RwLock::new(HashMap::new()),
            messages: RwLock::new(HashMap::new()),
            conversations: RwLock::new(HashMap::new()),
            agent_usage: RwLock::new(HashMap::new()),
            provider_keys: RwLock::new(HashMap::new()),
            transcript: None,
        }
    }

    pub fn with_premium_callers(mut self, callers: impl IntoIterator<Item = String>) -> Self {
        self.premium_callers.extend(callers);
        self
    }

    pub fn with_transcripts(mut self, dir: &Path) -> Self {
        self.transcript = Some(TranscriptWriter::new(dir));
        self
    }

    pub fn set_provider_key(&self, caller_id: &str, provider_id: &str, key: &str) {
        self.provider_keys.write().insert(
            (caller_id.to_string(), provider_id.to_string()),
            key.to_string(),
        );
    }

    // ── Inspection ─────────────────────────────────────────────────

    pub fn messages(&self, chat_id: &str) -> Vec<MessageRecord> {
        self.messages.read().get(chat_id).cloned().unwrap_or_default()
    }

    pub fn conversation(&self, chat_id: &str) -> Option<ConversationMeta> {
        self.conversations.read().get(chat_id).cloned()
    }

    pub fn agent_usage(&self, agent_id: &str) -> u64 {
        self.agent_usage.read().get(agent_id).copied().unwrap_or(0)
    }

    // ── Date-parameterized counter operations ──────────────────────

    fn count_on(&self, caller_id: &str, authenticated: bool, today: NaiveDate) -> u64 {
        let counters = self.counters.read();
        match counters.get(&(caller_id.to_string(), authenticated)) {
            Some(c) if c.date == today => c.count,
            _ => 0,
        }
    }

    fn increment_on(&self, caller_id: &str, authenticated: bool, today: NaiveDate) -> u64 {
        let mut counters = self.counters.write();
        let entry = counters
            .entry((caller_id.to_string(), authenticated))
            .or_insert(DailyCount {
                date: today,
                count: 0,
            });

        // Day rolled over, reset.
        if entry.date != today {
            entry.date = today;
            entry.count = 0;
        }

        entry.count += 1;
        entry.count
    }
}

#[async_trait::async_trait]
impl ChatStore for MemoryStore {
    async fn caller_profile(&self, caller_id: &str) -> Result<CallerProfile> {
        Ok(CallerProfile {
            premium: self.premium_callers.contains(caller_id),
        })
    }

    async fn daily_message_count(&self, caller_id: &str, authenticated: bool) -> Result<u64> {
        Ok(self.count_on(caller_id, authenticated, Utc::now().date_naive()))
    }

    async fn increment_daily_count(&self, caller_id: &str, authenticated: bool) -> Result<u64> {
        Ok(self.increment_on(caller_id, authenticated, Utc::now().date_naive()))
    }

    async fn append_messages(&self, records: Vec<MessageRecord>) -> Result<()> {
        let Some(first) = records.first() else {
            return Ok(());
        };
        let chat_id = first.chat_id.clone();
        let role = first.message.role.as_str().to_string();
        let count = records.len();

        if let Some(writer) = &self.transcript {
            let lines: Vec<TranscriptLine> = records.iter().map(TranscriptLine::from).collect();
            writer.append_async(&chat_id, lines).await?;
        }

        {
            let mut messages = self.messages.write();
            for record in records {
                messages
                    .entry(record.chat_id.clone())
                    .or_default()
                    .push(record);
            }
        }

        TraceEvent::MessageAppended {
            chat_id,
            role,
            count,
        }
        .emit();
        Ok(())
    }

    async fn load_agent(&self, agent_id: &str) -> Result<Option<AgentConfig>> {
        Ok(self.agents.get(agent_id).cloned())
    }

    async fn record_agent_usage(&self, agent_id: &str, _caller_id: &str) -> Result<()> {
        *self
            .agent_usage
            .write()
            .entry(agent_id.to_string())
            .or_insert(0) += 1;
        Ok(())
    }

    async fn provider_key(&self, caller_id: &str, provider_id: &str) -> Result<Option<String>> {
        Ok(self
            .provider_keys
            .read()
            .get(&(caller_id.to_string(), provider_id.to_string()))
            .cloned())
    }

    async fn upsert_conversation(&self, meta: ConversationMeta) -> Result<()> {
        self.conversations.write().insert(meta.chat_id.clone(), meta);
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
