//! Capability resolution: system prompt, tool set and model for one turn.

use cg_domain::config::{AgentConfig, RemoteToolEndpoint};
use cg_domain::tool::Message;
use cg_domain::trace::TraceEvent;
use cg_providers::ResolvedModel;
use cg_store::StoreHandle;
use cg_tools::ToolSet;

use super::error::TurnError;
use super::persist;
use super::request::TurnRequest;
use crate::state::AppState;

/// Where this turn's tools come from. Resolved once into a [`ToolSet`].
#[derive(Debug, Clone, PartialEq)]
pub enum ToolSource {
    None,
    Static(Vec<String>),
    Remote(RemoteToolEndpoint),
}

impl ToolSource {
    /// A remote endpoint wins over a static list.
    pub fn for_agent(agent: Option<&AgentConfig>) -> Self {
        match agent {
            Some(AgentConfig {
                remote_tools: Some(endpoint),
                ..
            }) => ToolSource::Remote(endpoint.clone()),
            Some(a) if a.has_static_tools() => ToolSource::Static(a.tools.clone()),
            _ => ToolSource::None,
        }
    }
}

#[derive(Debug)]
pub struct CapabilityResolution {
    pub system_prompt: String,
    pub tools: ToolSet,
    /// The history has tool traffic and this turn offers no tools.
    pub tools_changed: bool,
    pub model: ResolvedModel,
}

pub async fn resolve(
    state: &AppState,
    store: Option<&StoreHandle>,
    req: &TurnRequest,
) -> Result<CapabilityResolution, TurnError> {
    let agent = match req.agent_id.as_deref() {
        Some(id) if state.config.pipeline.agents => Some((id, load_agent(state, store, id).await?)),
        Some(id) => {
            tracing::debug!(agent_id = %id, "agents disabled, ignoring agentId");
            None
        }
        None => None,
    };

    let model = state
        .catalog
        .resolve(&req.model)
        .ok_or_else(|| TurnError::model_not_found(&req.model))?;

    let system_prompt = agent
        .as_ref()
        .and_then(|(_, a)| a.system_prompt.clone())
        .or_else(|| req.system_prompt.clone())
        .unwrap_or_else(|| state.config.llm.default_system_prompt.clone());

    let tools = match &agent {
        Some((agent_id, config)) => {
            let tools = build_tool_set(state, agent_id, config).await;
            if matches!(ToolSource::for_agent(Some(config)), ToolSource::Static(_)) {
                if let Some(store) = store {
                    persist::record_agent_usage(
                        store.clone(),
                        req.chat_id.clone(),
                        agent_id.to_string(),
                        req.user_id.clone(),
                    );
                }
            }
            tools
        }
        None => ToolSet::empty(),
    };

    let tools_changed = tools_changed(&req.messages, &tools.names());
    tracing::debug!(
        model = %model.descriptor.id,
        tools = tools.len(),
        tools_changed,
        "capabilities resolved"
    );

    Ok(CapabilityResolution {
        system_prompt,
        tools,
        tools_changed,
        model,
    })
}

/// Store first, then the static `[agents]` table.
async fn load_agent(
    state: &AppState,
    store: Option<&StoreHandle>,
    agent_id: &str,
) -> Result<AgentConfig, TurnError> {
    if let Some(store) = store {
        if let Some(agent) = store.load_agent(agent_id).await? {
            return Ok(agent);
        }
    }
    state
        .config
        .agents
        .get(agent_id)
        .cloned()
        .ok_or_else(|| TurnError::agent_not_found(agent_id))
}

async fn build_tool_set(state: &AppState, agent_id: &str, agent: &AgentConfig) -> ToolSet {
    match ToolSource::for_agent(Some(agent)) {
        ToolSource::None => ToolSet::empty(),
        ToolSource::Static(names) => state.tools.select(&names, &agent.tool_policy),
        ToolSource::Remote(endpoint) => match state.remote_tools.fetch(&endpoint).await {
            Ok(set) => set.allowed_by(&agent.tool_policy),
            Err(e) => {
                tracing::warn!(
                    agent_id = %agent_id,
                    endpoint = %endpoint.url,
                    error = %e,
                    "remote tool source unavailable, continuing without tools"
                );
                TraceEvent::ToolSourceUnavailable {
                    agent_id: agent_id.to_string(),
                    endpoint: endpoint.url.clone(),
                    error: e.to_string(),
                }
                .emit();
                ToolSet::empty()
            }
        },
    }
}

/// True when the history carries tool traffic but this turn offers no tools,
/// which is the only case the sanitizer rewrites.
pub fn tools_changed(history: &[Message], current: &[String]) -> bool {
    current.is_empty() && history.iter().any(Message::has_tool_parts)
}
