//! The closed set of client-visible turn failures.
//!
//! Anything that goes wrong before the first streamed byte becomes a
//! [`TurnError`] with a precise status and a `{error, code}` body. Failures
//! after that point travel in-band on the stream (see `relay`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use cg_domain::error::Error;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where a turn is. Failures before `Streaming` are synchronous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStage {
    Validating,
    Gating,
    Resolving,
    Sanitizing,
    Invoking,
    Streaming,
    Completed,
    Failed,
}

impl TurnStage {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnStage::Validating => "validating",
            TurnStage::Gating => "gating",
            TurnStage::Resolving => "resolving",
            TurnStage::Sanitizing => "sanitizing",
            TurnStage::Invoking => "invoking",
            TurnStage::Streaming => "streaming",
            TurnStage::Completed => "completed",
            TurnStage::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TurnStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TurnError
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub const CODE_SIGN_IN_REQUIRED: &str = "SIGN_IN_REQUIRED";
pub const CODE_PREMIUM_REQUIRED: &str = "PREMIUM_REQUIRED";
pub const CODE_FILE_UPLOAD_NOT_ALLOWED: &str = "FILE_UPLOAD_NOT_ALLOWED";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundKind {
    Model,
    Agent,
}

impl NotFoundKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotFoundKind::Model => "model",
            NotFoundKind::Agent => "agent",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("{message}")]
    Validation { code: &'static str, message: String },

    #[error("{message}")]
    PremiumRequired { code: &'static str, message: String },

    #[error("daily message limit of {limit} reached, try again tomorrow")]
    DailyLimitReached { limit: u64 },

    #[error("{} not found: {id}", .kind.as_str())]
    ModelOrAgentNotFound { kind: NotFoundKind, id: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl TurnError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        TurnError::Validation {
            code,
            message: message.into(),
        }
    }

    pub fn premium(code: &'static str, message: impl Into<String>) -> Self {
        TurnError::PremiumRequired {
            code,
            message: message.into(),
        }
    }

    pub fn model_not_found(id: impl Into<String>) -> Self {
        TurnError::ModelOrAgentNotFound {
            kind: NotFoundKind::Model,
            id: id.into(),
        }
    }

    pub fn agent_not_found(id: impl Into<String>) -> Self {
        TurnError::ModelOrAgentNotFound {
            kind: NotFoundKind::Agent,
            id: id.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            TurnError::Validation { .. } => StatusCode::BAD_REQUEST,
            TurnError::PremiumRequired { .. } => StatusCode::PAYMENT_REQUIRED,
            TurnError::DailyLimitReached { .. } => StatusCode::FORBIDDEN,
            TurnError::ModelOrAgentNotFound { .. } => StatusCode::NOT_FOUND,
            TurnError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            TurnError::Validation { code, .. } | TurnError::PremiumRequired { code, .. } => *code,
            TurnError::DailyLimitReached { .. } => "DAILY_LIMIT_REACHED",
            TurnError::ModelOrAgentNotFound {
                kind: NotFoundKind::Model,
                ..
            } => "MODEL_NOT_FOUND",
            TurnError::ModelOrAgentNotFound {
                kind: NotFoundKind::Agent,
                ..
            } => "AGENT_NOT_FOUND",
            TurnError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<Error> for TurnError {
    fn from(e: Error) -> Self {
        TurnError::Internal(e.to_string())
    }
}

impl IntoResponse for TurnError {
    fn into_response(self) -> Response {
        let message = match &self {
            TurnError::Internal(detail) => {
                tracing::error!(error = %detail, "chat turn failed");
                "Something went wrong. Please try again.".to_string()
            }
            other => other.to_string(),
        };
        (
            self.status(),
            Json(serde_json::json!({ "error": message, "code": self.code() })),
        )
            .into_response()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-band error text
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Short, client-readable text for a provider failure. Never includes
/// upstream bodies or credentials.
pub fn client_error_message(err: &Error) -> String {
    match err {
        Error::ProviderStatus {
            provider, status, ..
        } => match *status {
            401 | 403 => format!("Invalid or missing API key for {provider}."),
            429 => format!("{provider} is rate limiting requests. Please wait and try again."),
            400 | 404 | 422 => format!("{provider} rejected the request ({status})."),
            s if s >= 500 => format!("{provider} is temporarily unavailable. Please try again."),
            s => format!("{provider} returned an unexpected status ({s})."),
        },
        Error::Timeout(_) => "The model took too long to respond. Please try again.".into(),
        Error::Http(_) => "Could not reach the model provider.".into(),
        Error::Provider { provider, .. } => {
            format!("{provider} reported an error while generating the response. Please try again.")
        }
        _ => "Something went wrong while generating the response.".into(),
    }
}
