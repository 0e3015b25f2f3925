//! Built-in host tools.
//!
//! - `clock`: current UTC time
//! - `web.fetch`: fetch a URL with strict size and time limits

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde_json::{json, Value};

use cg_domain::tool::ToolDefinition;

use crate::error::ToolError;
use crate::handler::{ToolHandler, ToolOutput};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// clock
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ClockTool {
    def: ToolDefinition,
}

impl ClockTool {
    pub fn new() -> Self {
        Self {
            def: ToolDefinition {
                name: "clock".into(),
                description: "Current date and time in UTC (RFC 3339).".into(),
                parameters: json!({"type": "object", "properties": {}}),
            },
        }
    }
}

impl Default for ClockTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ToolHandler for ClockTool {
    fn definition(&self) -> &ToolDefinition {
        &self.def
    }

    async fn call(&self, _args: Value) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::ok(chrono::Utc::now().to_rfc3339()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// web.fetch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const FETCH_TIMEOUT_MS: u64 = 15_000;
const FETCH_MAX_BYTES: usize = 2 * 1024 * 1024;
const FETCH_MAX_TEXT_CHARS: usize = 50_000;

pub struct WebFetchTool {
    def: ToolDefinition,
    client: reqwest::Client,
}

impl WebFetchTool {
    pub fn new() -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(FETCH_TIMEOUT_MS))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| ToolError::Http(e.to_string()))?;

        Ok(Self {
            def: ToolDefinition {
                name: "web.fetch".into(),
                description: "Fetch a web page and return its readable text.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "url": { "type": "string", "description": "http(s) URL to fetch" }
                    },
                    "required": ["url"]
                }),
            },
            client,
        })
    }
}

#[async_trait::async_trait]
impl ToolHandler for WebFetchTool {
    fn definition(&self) -> &ToolDefinition {
        &self.def
    }

    async fn call(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let url = args
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArgs("missing 'url'".into()))?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ToolError::InvalidArgs(format!("not an http(s) URL: {url}")));
        }

        let mut resp = self
            .client
            .get(url)
            .header(USER_AGENT, "chatgate/0.1")
            .send()
            .await
            .map_err(|e| ToolError::from_reqwest(e, FETCH_TIMEOUT_MS))?;

        let status = resp.status();
        let is_html = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("html"));

        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| ToolError::from_reqwest(e, FETCH_TIMEOUT_MS))?
        {
            let room = FETCH_MAX_BYTES.saturating_sub(body.len());
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if body.len() >= FETCH_MAX_BYTES {
                break;
            }
        }

        let raw = String::from_utf8_lossy(&body);
        let text = if is_html { html_to_text(&raw) } else { raw.into_owned() };
        let text: String = text.chars().take(FETCH_MAX_TEXT_CHARS).collect();

        if status.is_success() {
            Ok(ToolOutput::ok(text))
        } else {
            Ok(ToolOutput::error(format!("HTTP {}: {}", status.as_u16(), text)))
        }
    }
}

/// Strip tags, drop script/style bodies, collapse blank lines.
pub(crate) fn html_to_text(html: &str) -> String {
    let mut out = String::new();
    let mut tag = String::new();
    let mut in_tag = false;
    let mut skip = false;

    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                let t = tag.to_ascii_lowercase();
                if t.starts_with("script") || t.starts_with("style") {
                    skip = true;
                } else if t.starts_with("/script") || t.starts_with("/style") {
                    skip = false;
                } else if matches!(
                    t.trim_start_matches('/').split_whitespace().next(),
                    Some("p" | "div" | "br" | "br/" | "li" | "tr" | "h1" | "h2" | "h3" | "h4")
                ) && !out.ends_with('\n')
                {
                    out.push('\n');
                }
            }
            _ if in_tag => tag.push(ch),
            _ if skip => {}
            _ => out.push(ch),
        }
    }

    let out = out
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");

    out.lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_to_text_drops_scripts_and_tags() {
        let html = "<html><head><style>p{}</style><script>var x=1;</script></head>\
                    <body><h1>Title</h1><p>Hello &amp; welcome</p><div>  spaced   out </div></body></html>";
        assert_eq!(html_to_text(html), "Title\nHello & welcome\nspaced out");
    }

    #[tokio::test]
    async fn clock_returns_rfc3339() {
        let out = ClockTool::new().call(json!({})).await.unwrap();
        assert!(!out.is_error);
        assert!(chrono::DateTime::parse_from_rfc3339(&out.content).is_ok());
    }

    #[tokio::test]
    async fn web_fetch_rejects_non_http_urls() {
        let tool = WebFetchTool::new().unwrap();
        let err = tool.call(json!({"url": "file:///etc/passwd"})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs(_)));
    }
}
