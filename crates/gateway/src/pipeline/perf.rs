use std::time::Instant;

use cg_domain::config::PerformanceConfig;
use cg_domain::trace::TraceEvent;

/// Times one operation. Reporting only happens in performance mode.
#[derive(Debug)]
pub struct PerformanceMonitor {
    operation: String,
    started: Instant,
    enabled: bool,
    threshold_ms: u64,
}

impl PerformanceMonitor {
    pub fn start(operation: impl Into<String>, perf: &PerformanceConfig) -> Self {
        Self {
            operation: operation.into(),
            started: Instant::now(),
            enabled: perf.performance_mode,
            threshold_ms: perf.slow_operation_ms,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Stop the clock and return the elapsed milliseconds.
    pub fn finish(self) -> u64 {
        let duration_ms = self.elapsed_ms();
        if !self.enabled {
            return duration_ms;
        }
        if self.is_slow(duration_ms) {
            tracing::warn!(
                operation = %self.operation,
                duration_ms,
                threshold_ms = self.threshold_ms,
                "slow operation"
            );
            TraceEvent::SlowOperation {
                operation: self.operation,
                duration_ms,
                threshold_ms: self.threshold_ms,
            }
            .emit();
        } else {
            tracing::info!(operation = %self.operation, duration_ms, "operation completed");
        }
        duration_ms
    }

    fn is_slow(&self, duration_ms: u64) -> bool {
        duration_ms > self.threshold_ms
    }
}
