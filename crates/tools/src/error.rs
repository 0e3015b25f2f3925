use crate::protocol::JsonRpcError;

/// Errors from tool execution and remote tool sources.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool failed: {0}")]
    Execution(String),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error(transparent)]
    Rpc(#[from] JsonRpcError),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl ToolError {
    pub(crate) fn from_reqwest(e: reqwest::Error, timeout_ms: u64) -> Self {
        if e.is_timeout() {
            ToolError::Timeout(timeout_ms)
        } else {
            ToolError::Http(e.to_string())
        }
    }
}
