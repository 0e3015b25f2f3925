//! Shared utility functions for provider adapters.

use cg_domain::config::{AuthConfig, AuthMode};
use cg_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Http`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Turn a non-2xx provider response into [`Error::ProviderStatus`].
pub(crate) async fn status_error(provider: &str, resp: reqwest::Response) -> Error {
    let status = resp.status().as_u16();
    let body = match resp.text().await {
        Ok(b) => b,
        Err(e) => return from_reqwest(e),
    };
    Error::ProviderStatus {
        provider: provider.to_string(),
        status,
        body,
    }
}

/// Resolve the configured API key from an [`AuthConfig`].
///
/// Precedence:
/// 1. `mode = "none"` → no key
/// 2. `key` field (plaintext, warns)
/// 3. `env` field (reads environment variable)
///
/// A missing key is not fatal: callers may still bring their own.
pub fn resolve_api_key(auth: &AuthConfig) -> Result<Option<String>> {
    if auth.mode == AuthMode::None {
        return Ok(None);
    }

    if let Some(ref key) = auth.key {
        tracing::warn!("API key loaded from plaintext config field 'key', prefer 'env'");
        return Ok(Some(key.clone()));
    }

    if let Some(ref env_var) = auth.env {
        return match std::env::var(env_var) {
            Ok(v) if !v.trim().is_empty() => Ok(Some(v)),
            Ok(_) => Ok(None),
            Err(std::env::VarError::NotPresent) => {
                tracing::warn!(env_var = %env_var, "provider key env var not set");
                Ok(None)
            }
            Err(std::env::VarError::NotUnicode(_)) => Err(Error::Auth(format!(
                "environment variable '{env_var}' is not valid UTF-8"
            ))),
        };
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_api_key_plaintext() {
        let auth = AuthConfig {
            key: Some("sk-test-123".into()),
            ..Default::default()
        };
        assert_eq!(resolve_api_key(&auth).unwrap().as_deref(), Some("sk-test-123"));
    }

    #[test]
    fn resolve_api_key_env_var() {
        let var_name = "CG_TEST_RESOLVE_ENV_KEY_1234";
        std::env::set_var(var_name, "env-secret-value");
        let auth = AuthConfig {
            env: Some(var_name.into()),
            ..Default::default()
        };
        assert_eq!(
            resolve_api_key(&auth).unwrap().as_deref(),
            Some("env-secret-value")
        );
        std::env::remove_var(var_name);
    }

    #[test]
    fn resolve_api_key_env_var_missing_is_none() {
        let auth = AuthConfig {
            env: Some("CG_TEST_NONEXISTENT_VAR_8888".into()),
            ..Default::default()
        };
        assert!(resolve_api_key(&auth).unwrap().is_none());
    }

    #[test]
    fn resolve_api_key_mode_none_ignores_key() {
        let auth = AuthConfig {
            mode: AuthMode::None,
            key: Some("ignored".into()),
            ..Default::default()
        };
        assert!(resolve_api_key(&auth).unwrap().is_none());
    }
}
