use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent definitions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A named bundle of system prompt and tools a chat turn can run under.
///
/// Agents are read-only to the turn pipeline. A remote endpoint takes
/// precedence over the static `tools` list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Host tool names, resolved against the tool registry.
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub remote_tools: Option<RemoteToolEndpoint>,
    /// Tool allow/deny policy.
    #[serde(default)]
    pub tool_policy: ToolPolicy,
}

impl AgentConfig {
    pub fn has_static_tools(&self) -> bool {
        !self.tools.is_empty()
    }
}

/// A JSON-RPC endpoint serving `tools/list` and `tools/call`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteToolEndpoint {
    pub url: String,
    /// Overrides `[tools] remote_fetch_timeout_ms` for this endpoint.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Tool allow/deny policy with prefix-based matching.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolPolicy {
    /// Tool name prefixes this agent may use.  `["*"]` or empty = unrestricted.
    #[serde(default)]
    pub allow: Vec<String>,
    /// Tool name prefixes this agent is denied (evaluated before allow).
    #[serde(default)]
    pub deny: Vec<String>,
}

impl ToolPolicy {
    /// Check whether the given tool name is permitted by this policy.
    ///
    /// Matching is case-insensitive. Deny always wins over allow.
    pub fn allows(&self, tool_name: &str) -> bool {
        let name = tool_name.to_ascii_lowercase();

        if self.deny.iter().any(|d| prefix_matches(&name, d)) {
            return false;
        }
        if self.allow.is_empty() || self.allow.iter().any(|a| a == "*") {
            return true;
        }
        self.allow.iter().any(|a| prefix_matches(&name, a))
    }
}

fn prefix_matches(name: &str, pattern: &str) -> bool {
    let p = pattern.to_ascii_lowercase();
    p == "*" || name == p || name.starts_with(&format!("{p}."))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
