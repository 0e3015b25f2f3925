use serde::{Deserialize, Serialize};

/// Daily message ceilings, one per authentication status.
///
/// Counters roll over at the UTC date boundary; the store owns them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitlementConfig {
    #[serde(default = "d_5")]
    pub guest_daily_limit: u64,
    #[serde(default = "d_1000")]
    pub auth_daily_limit: u64,
}

impl Default for EntitlementConfig {
    fn default() -> Self {
        Self {
            guest_daily_limit: d_5(),
            auth_daily_limit: d_1000(),
        }
    }
}

impl EntitlementConfig {
    pub fn limit_for(&self, authenticated: bool) -> u64 {
        if authenticated {
            self.auth_daily_limit
        } else {
            self.guest_daily_limit
        }
    }
}

fn d_5() -> u64 {
    5
}
fn d_1000() -> u64 {
    1000
}
