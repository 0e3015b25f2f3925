use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn pipeline stages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Optional stages of the chat pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Run tier and daily-quota checks when a store resolves.
    #[serde(default = "d_true")]
    pub entitlement: bool,
    /// Honor `agentId` on chat requests.
    #[serde(default = "d_true")]
    pub agents: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            entitlement: true,
            agents: true,
        }
    }
}

/// Which side channels the stream relay forwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "d_true")]
    pub send_reasoning: bool,
    #[serde(default = "d_true")]
    pub send_sources: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            send_reasoning: true,
            send_sources: true,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// When false no store resolves and every turn takes the unguarded path.
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Directory for per-conversation JSONL transcripts. Unset = memory only.
    #[serde(default)]
    pub transcript_dir: Option<PathBuf>,
    /// Callers treated as premium by the in-memory store.
    #[serde(default)]
    pub premium_callers: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            transcript_dir: None,
            premium_callers: Vec::new(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Default timeout for remote `tools/list` and `tools/call` requests.
    #[serde(default = "d_5000")]
    pub remote_fetch_timeout_ms: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            remote_fetch_timeout_ms: d_5000(),
        }
    }
}

fn d_true() -> bool {
    true
}
fn d_5000() -> u64 {
    5_000
}
