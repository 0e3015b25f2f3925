use std::sync::Arc;

use serde_json::Value;

use cg_domain::config::ToolPolicy;
use cg_domain::tool::ToolDefinition;

use crate::error::ToolError;

/// Output of a tool call, fed back to the model as a tool result.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// A callable capability the model may invoke.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    fn definition(&self) -> &ToolDefinition;

    async fn call(&self, args: Value) -> Result<ToolOutput, ToolError>;

    fn name(&self) -> &str {
        &self.definition().name
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ToolSet
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The concrete tools available to one turn. Possibly empty.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn ToolHandler>>,
}

impl ToolSet {
    pub fn new(tools: Vec<Arc<dyn ToolHandler>>) -> Self {
        Self { tools }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition().clone()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// Drop the tools the policy does not allow.
    pub fn allowed_by(self, policy: &ToolPolicy) -> Self {
        Self {
            tools: self
                .tools
                .into_iter()
                .filter(|t| policy.allows(t.name()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolHandler>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Run a tool by name. Unknown tools and failures become error
    /// outputs so the model can see what went wrong.
    pub async fn invoke(&self, name: &str, args: Value) -> ToolOutput {
        let Some(tool) = self.get(name) else {
            return ToolOutput::error(ToolError::UnknownTool(name.to_string()).to_string());
        };
        match tool.call(args).await {
            Ok(out) => out,
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "tool call failed");
                ToolOutput::error(e.to_string())
            }
        }
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
