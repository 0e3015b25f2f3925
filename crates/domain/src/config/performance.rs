use serde::{Deserialize, Serialize};
use std::time::Duration;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Performance tunables
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Timeout for opening a provider stream (hosted providers).
    #[serde(default = "d_30000")]
    pub provider_timeout_ms: u64,
    /// Timeout for providers flagged `local = true`.
    #[serde(default = "d_45000")]
    pub local_provider_timeout_ms: u64,
    /// Maximum silence between two stream events before the provider is
    /// considered stalled.
    #[serde(default = "d_30000")]
    pub stream_timeout_ms: u64,
    /// Time every turn and warn about slow ones.
    #[serde(default)]
    pub performance_mode: bool,
    /// Cap on in-flight provider calls across all turns.
    #[serde(default = "d_10")]
    pub max_concurrent_provider_calls: usize,
    /// Maximum model steps per turn (tool round-trips included).
    #[serde(default = "d_10u32")]
    pub max_steps: u32,
    #[serde(default = "d_5000")]
    pub slow_operation_ms: u64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            provider_timeout_ms: d_30000(),
            local_provider_timeout_ms: d_45000(),
            stream_timeout_ms: d_30000(),
            performance_mode: false,
            max_concurrent_provider_calls: d_10(),
            max_steps: d_10u32(),
            slow_operation_ms: d_5000(),
        }
    }
}

impl PerformanceConfig {
    pub fn provider_timeout(&self, local: bool) -> Duration {
        Duration::from_millis(if local {
            self.local_provider_timeout_ms
        } else {
            self.provider_timeout_ms
        })
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_timeout_ms)
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_30000() -> u64 {
    30_000
}
fn d_45000() -> u64 {
    45_000
}
fn d_10() -> usize {
    10
}
fn d_10u32() -> u32 {
    10
}
fn d_5000() -> u64 {
    5_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_providers_get_the_longer_timeout() {
        let cfg = PerformanceConfig::default();
        assert_eq!(cfg.provider_timeout(false), Duration::from_secs(30));
        assert_eq!(cfg.provider_timeout(true), Duration::from_secs(45));
        assert_eq!(cfg.max_steps, 10);
        assert!(!cfg.performance_mode);
    }
}
