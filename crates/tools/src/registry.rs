use std::collections::HashMap;
use std::sync::Arc;

use cg_domain::config::ToolPolicy;

use crate::builtin::{ClockTool, WebFetchTool};
use crate::error::ToolError;
use crate::handler::{ToolHandler, ToolSet};

/// Host tools that agents can reference by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with `clock` and `web.fetch`.
    pub fn with_builtins() -> Result<Self, ToolError> {
        let mut reg = Self::new();
        reg.register(Arc::new(ClockTool::new()));
        reg.register(Arc::new(WebFetchTool::new()?));
        Ok(reg)
    }

    pub fn register(&mut self, tool: Arc<dyn ToolHandler>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve a static tool list against the registry. Unknown names and
    /// names the policy denies are skipped with a warning.
    pub fn select(&self, names: &[String], policy: &ToolPolicy) -> ToolSet {
        let mut selected = Vec::new();
        for name in names {
            if !policy.allows(name) {
                tracing::debug!(tool = %name, "tool denied by agent policy");
                continue;
            }
            match self.get(name) {
                Some(tool) => selected.push(tool),
                None => tracing::warn!(tool = %name, "agent references unknown tool"),
            }
        }
        ToolSet::new(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_skips_unknown_and_denied() {
        let reg = ToolRegistry::with_builtins().unwrap();
        assert_eq!(reg.names(), vec!["clock", "web.fetch"]);

        let policy = ToolPolicy {
            allow: vec![],
            deny: vec!["web".into()],
        };
        let set = reg.select(
            &["clock".into(), "web.fetch".into(), "missing".into()],
            &policy,
        );
        assert_eq!(set.names(), vec!["clock"]);
    }
}
