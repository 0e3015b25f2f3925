use serde::{Deserialize, Serialize};

/// Access tier a model requires. Ordered: a caller allowed a tier is
/// allowed every lower one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Available to guests.
    Free,
    /// Requires a signed-in caller.
    #[default]
    Standard,
    /// Requires a premium account.
    Premium,
}

/// Entitlement level of a caller, derived from the auth flag and the
/// store's profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entitlement {
    Guest,
    Authenticated,
    Premium,
}

impl Entitlement {
    /// Highest model tier this entitlement may invoke.
    pub fn max_tier(self) -> ModelTier {
        match self {
            Entitlement::Guest => ModelTier::Free,
            Entitlement::Authenticated => ModelTier::Standard,
            Entitlement::Premium => ModelTier::Premium,
        }
    }

    pub fn allows(self, tier: ModelTier) -> bool {
        tier <= self.max_tier()
    }
}

/// Feature flags every model advertises in the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmCapabilities {
    #[serde(default)]
    pub supports_tools: bool,
    #[serde(default)]
    pub supports_search: bool,
    #[serde(default)]
    pub supports_files: bool,
    #[serde(default)]
    pub supports_reasoning: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_ordering_matches_entitlement() {
        assert!(Entitlement::Guest.allows(ModelTier::Free));
        assert!(!Entitlement::Guest.allows(ModelTier::Standard));
        assert!(Entitlement::Authenticated.allows(ModelTier::Standard));
        assert!(!Entitlement::Authenticated.allows(ModelTier::Premium));
        assert!(Entitlement::Premium.allows(ModelTier::Premium));
    }
}
