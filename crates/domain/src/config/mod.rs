mod agents;
mod entitlement;
mod llm;
mod observability;
mod performance;
mod pipeline;
mod server;

pub use agents::*;
pub use entitlement::*;
pub use llm::*;
pub use observability::*;
pub use performance::*;
pub use pipeline::*;
pub use server::*;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub entitlement: EntitlementConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Agent definitions (key = agent_id).
    #[serde(default)]
    pub agents: HashMap<String, AgentConfig>,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Environment overrides
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl Config {
    /// Apply `CG_*` environment overrides to the tunables.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Unparseable values are
    /// ignored with a warning.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parse<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(key, value = %raw, "ignoring unparseable env override");
                    None
                }
            }
        }

        let perf = &mut self.performance;
        if let Some(v) = parse("CG_PROVIDER_TIMEOUT_MS", lookup("CG_PROVIDER_TIMEOUT_MS")) {
            perf.provider_timeout_ms = v;
        }
        if let Some(v) = parse(
            "CG_LOCAL_PROVIDER_TIMEOUT_MS",
            lookup("CG_LOCAL_PROVIDER_TIMEOUT_MS"),
        ) {
            perf.local_provider_timeout_ms = v;
        }
        if let Some(v) = parse("CG_STREAM_TIMEOUT_MS", lookup("CG_STREAM_TIMEOUT_MS")) {
            perf.stream_timeout_ms = v;
        }
        if let Some(raw) = lookup("CG_PERFORMANCE_MODE") {
            perf.performance_mode = matches!(raw.trim(), "1" | "true" | "TRUE" | "yes");
        }
        if let Some(v) = parse(
            "CG_MAX_CONCURRENT_PROVIDER_CALLS",
            lookup("CG_MAX_CONCURRENT_PROVIDER_CALLS"),
        ) {
            perf.max_concurrent_provider_calls = v;
        }
        if let Some(v) = parse(
            "CG_MAX_CONCURRENT_REQUESTS",
            lookup("CG_MAX_CONCURRENT_REQUESTS"),
        ) {
            self.server.max_concurrent_requests = v;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError::error("server.port", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError::error("server.host", "host must not be empty"));
        }
        if self.server.request_timeout_secs == 0 {
            errors.push(ConfigError::error(
                "server.request_timeout_secs",
                "request timeout must be greater than 0",
            ));
        }
        if self.server.max_concurrent_requests == 0 {
            errors.push(ConfigError::error(
                "server.max_concurrent_requests",
                "must allow at least one request",
            ));
        }

        if self.performance.max_concurrent_provider_calls == 0 {
            errors.push(ConfigError::error(
                "performance.max_concurrent_provider_calls",
                "must allow at least one provider call",
            ));
        }
        if self.performance.max_steps == 0 {
            errors.push(ConfigError::error(
                "performance.max_steps",
                "max_steps must be at least 1",
            ));
        }

        if self.llm.providers.is_empty() {
            errors.push(ConfigError::warning("llm.providers", "no LLM providers configured"));
        }

        let mut provider_ids = HashSet::new();
        for (i, provider) in self.llm.providers.iter().enumerate() {
            if provider.id.is_empty() {
                errors.push(ConfigError::error(
                    format!("llm.providers[{i}].id"),
                    "provider id must not be empty",
                ));
            } else if !provider_ids.insert(provider.id.as_str()) {
                errors.push(ConfigError::error(
                    format!("llm.providers[{i}].id"),
                    format!("duplicate provider id '{}'", provider.id),
                ));
            }
            if provider.base_url.is_empty() {
                errors.push(ConfigError::error(
                    format!("llm.providers[{i}].base_url"),
                    "provider base_url must not be empty",
                ));
            }
        }

        let mut model_ids = HashSet::new();
        for (i, model) in self.llm.models.iter().enumerate() {
            if !model_ids.insert(model.id.as_str()) {
                errors.push(ConfigError::error(
                    format!("llm.models[{i}].id"),
                    format!("duplicate model id '{}'", model.id),
                ));
            }
            if !provider_ids.contains(model.provider.as_str()) {
                errors.push(ConfigError::warning(
                    format!("llm.models[{i}].provider"),
                    format!(
                        "model '{}' references unknown provider '{}' and cannot be invoked",
                        model.id, model.provider
                    ),
                ));
            }
        }

        for (id, agent) in &self.agents {
            if let Some(remote) = &agent.remote_tools {
                if !(remote.url.starts_with("http://") || remote.url.starts_with("https://")) {
                    errors.push(ConfigError::error(
                        format!("agents.{id}.remote_tools.url"),
                        "remote tool endpoint must be an http(s) URL",
                    ));
                }
            }
        }

        if self.server.cors.allowed_origins.len() == 1
            && self.server.cors.allowed_origins[0] == "*"
        {
            errors.push(ConfigError::warning(
                "server.cors.allowed_origins",
                "wildcard \"*\" allows all origins (not recommended for production)",
            ));
        }

        errors
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn errors_of(cfg: &Config) -> Vec<ConfigError> {
        cfg.validate()
            .into_iter()
            .filter(|e| e.severity == ConfigSeverity::Error)
            .collect()
    }

    #[test]
    fn empty_file_is_a_valid_config() {
        let cfg: Config = toml::from_str("").unwrap();
        assert!(errors_of(&cfg).is_empty());
        assert!(cfg.pipeline.entitlement);
        assert!(cfg.relay.send_reasoning);
        assert_eq!(cfg.entitlement.guest_daily_limit, 5);
    }

    #[test]
    fn full_config_parses() {
        let cfg: Config = toml::from_str(
            r#"
            [server]
            port = 8080

            [[llm.providers]]
            id = "openai"
            kind = "openai_compat"
            base_url = "https://api.openai.com/v1"
            auth = { env = "OPENAI_API_KEY" }

            [[llm.models]]
            id = "gpt-x"
            provider = "openai"
            tier = "free"

            [entitlement]
            guest_daily_limit = 3

            [performance]
            performance_mode = true

            [agents.research]
            system_prompt = "Research carefully."
            remote_tools = { url = "http://localhost:9000/rpc" }
        "#,
        )
        .unwrap();
        assert!(errors_of(&cfg).is_empty());
        assert_eq!(cfg.entitlement.guest_daily_limit, 3);
        assert!(cfg.performance.performance_mode);
        assert!(cfg.agents["research"].remote_tools.is_some());
    }

    #[test]
    fn duplicate_model_ids_are_errors() {
        let mut cfg = Config::default();
        let m: ModelDescriptor = toml::from_str("id = \"a\"\nprovider = \"p\"").unwrap();
        cfg.llm.models = vec![m.clone(), m];
        let errs = errors_of(&cfg);
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].field, "llm.models[1].id");
    }

    #[test]
    fn non_http_remote_endpoint_is_rejected() {
        let mut cfg = Config::default();
        cfg.agents.insert(
            "a".into(),
            AgentConfig {
                remote_tools: Some(RemoteToolEndpoint {
                    url: "ftp://nope".into(),
                    timeout_ms: None,
                    headers: HashMap::new(),
                }),
                ..Default::default()
            },
        );
        assert_eq!(errors_of(&cfg).len(), 1);
    }

    #[test]
    fn env_overrides_apply_and_ignore_garbage() {
        let mut cfg = Config::default();
        let env: HashMap<&str, &str> = [
            ("CG_PROVIDER_TIMEOUT_MS", "1000"),
            ("CG_LOCAL_PROVIDER_TIMEOUT_MS", "not-a-number"),
            ("CG_PERFORMANCE_MODE", "1"),
            ("CG_MAX_CONCURRENT_REQUESTS", "12"),
        ]
        .into_iter()
        .collect();
        cfg.apply_overrides_from(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.performance.provider_timeout_ms, 1000);
        assert_eq!(cfg.performance.local_provider_timeout_ms, 45_000);
        assert!(cfg.performance.performance_mode);
        assert_eq!(cfg.server.max_concurrent_requests, 12);
    }
}
