//! `GET /api/quota?userId=&isAuthenticated=`: today's usage for a caller.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaQuery {
    pub user_id: String,
    #[serde(default)]
    pub is_authenticated: bool,
}

pub async fn get_quota(State(state): State<AppState>, Query(q): Query<QuotaQuery>) -> Response {
    let store = match state.stores.resolve(&q.user_id, q.is_authenticated).await {
        Ok(Some(store)) => store,
        Ok(None) => {
            return Json(serde_json::json!({ "enabled": false })).into_response();
        }
        Err(e) => {
            tracing::error!(error = %e, "store resolution failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "store unavailable", "code": "INTERNAL_ERROR" })),
            )
                .into_response();
        }
    };

    let limit = state.config.entitlement.limit_for(q.is_authenticated);
    match store.daily_message_count(&q.user_id, q.is_authenticated).await {
        Ok(count) => Json(serde_json::json!({
            "enabled": true,
            "authenticated": q.is_authenticated,
            "count": count,
            "limit": limit,
            "remaining": limit.saturating_sub(count),
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "quota lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "quota lookup failed", "code": "INTERNAL_ERROR" })),
            )
                .into_response()
        }
    }
}
