//! Remote tool sources.
//!
//! An agent may point at an HTTP endpoint that serves its tools. The
//! gateway lists them once per turn (`tools/list`) and proxies each call
//! (`tools/call`) back to the same endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use cg_domain::config::RemoteToolEndpoint;
use cg_domain::tool::ToolDefinition;

use crate::error::ToolError;
use crate::handler::{ToolHandler, ToolOutput, ToolSet};
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, ToolCallResult, ToolsListResult};

/// Fetches the tool set an agent's remote endpoint advertises.
#[async_trait::async_trait]
pub trait RemoteToolFetcher: Send + Sync {
    async fn fetch(&self, endpoint: &RemoteToolEndpoint) -> Result<ToolSet, ToolError>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP JSON-RPC client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
struct RpcClient {
    http: reqwest::Client,
    endpoint: RemoteToolEndpoint,
    timeout_ms: u64,
    next_id: Arc<AtomicU64>,
}

impl RpcClient {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, ToolError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, params);

        let mut builder = self
            .http
            .post(&self.endpoint.url)
            .timeout(Duration::from_millis(self.timeout_ms))
            .json(&req);
        for (k, v) in &self.endpoint.headers {
            builder = builder.header(k, v);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| ToolError::from_reqwest(e, self.timeout_ms))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ToolError::Http(format!(
                "{method} returned {}: {}",
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }

        let body: JsonRpcResponse = resp
            .json()
            .await
            .map_err(|e| ToolError::from_reqwest(e, self.timeout_ms))?;
        Ok(body.into_result()?)
    }
}

/// Talks to remote tool endpoints over HTTP POST.
pub struct HttpToolFetcher {
    client: reqwest::Client,
    default_timeout_ms: u64,
}

impl HttpToolFetcher {
    pub fn new(default_timeout_ms: u64) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ToolError::Http(e.to_string()))?;
        Ok(Self {
            client,
            default_timeout_ms,
        })
    }
}

#[async_trait::async_trait]
impl RemoteToolFetcher for HttpToolFetcher {
    async fn fetch(&self, endpoint: &RemoteToolEndpoint) -> Result<ToolSet, ToolError> {
        let rpc = RpcClient {
            http: self.client.clone(),
            endpoint: endpoint.clone(),
            timeout_ms: endpoint.timeout_ms.unwrap_or(self.default_timeout_ms),
            next_id: Arc::new(AtomicU64::new(1)),
        };

        let result = rpc.request("tools/list", None).await?;
        let list: ToolsListResult = serde_json::from_value(result)?;

        tracing::debug!(
            endpoint = %endpoint.url,
            count = list.tools.len(),
            "fetched remote tools"
        );

        let tools = list
            .tools
            .into_iter()
            .map(|def| {
                Arc::new(RemoteTool {
                    def,
                    rpc: rpc.clone(),
                }) as Arc<dyn ToolHandler>
            })
            .collect();
        Ok(ToolSet::new(tools))
    }
}

/// A tool whose execution happens on the remote endpoint.
struct RemoteTool {
    def: ToolDefinition,
    rpc: RpcClient,
}

#[async_trait::async_trait]
impl ToolHandler for RemoteTool {
    fn definition(&self) -> &ToolDefinition {
        &self.def
    }

    async fn call(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let params = json!({ "name": self.def.name, "arguments": args });
        let result = self.rpc.request("tools/call", Some(params)).await?;
        let result: ToolCallResult = serde_json::from_value(result)?;
        Ok(ToolOutput {
            content: result.text(),
            is_error: result.is_error,
        })
    }
}
