//! Entitlement gate: tier access, file uploads and the daily ceiling.

use cg_domain::capability::{Entitlement, ModelTier};
use cg_domain::config::ModelDescriptor;
use cg_domain::trace::TraceEvent;
use cg_store::StoreHandle;

use super::error::{
    TurnError, CODE_FILE_UPLOAD_NOT_ALLOWED, CODE_PREMIUM_REQUIRED, CODE_SIGN_IN_REQUIRED,
};
use super::request::TurnRequest;
use crate::state::AppState;

/// Enforce access policy for one turn and consume one unit of quota.
///
/// With no store there is nothing to check against: the caller gets the
/// entitlement their flag claims and nothing is counted.
pub async fn enforce(
    state: &AppState,
    store: Option<&StoreHandle>,
    req: &TurnRequest,
    model: &ModelDescriptor,
) -> Result<Entitlement, TurnError> {
    let claimed = if req.authenticated {
        Entitlement::Authenticated
    } else {
        Entitlement::Guest
    };

    let Some(store) = store else {
        tracing::debug!("no store resolved, entitlement checks skipped");
        return Ok(claimed);
    };
    if !state.config.pipeline.entitlement {
        return Ok(claimed);
    }

    let entitlement = if req.authenticated {
        let profile = store.caller_profile(&req.user_id).await?;
        if profile.premium {
            Entitlement::Premium
        } else {
            Entitlement::Authenticated
        }
    } else {
        Entitlement::Guest
    };

    check_tier(entitlement, model)?;
    check_uploads(entitlement, req, model)?;

    let limit = state.config.entitlement.limit_for(req.authenticated);
    let count = store
        .daily_message_count(&req.user_id, req.authenticated)
        .await?;
    if count >= limit {
        tracing::info!(
            caller_id = %req.user_id,
            authenticated = req.authenticated,
            count,
            limit,
            "daily message limit reached"
        );
        return Err(TurnError::DailyLimitReached { limit });
    }

    spawn_increment(store.clone(), req.user_id.clone(), req.authenticated);
    Ok(entitlement)
}

fn check_tier(entitlement: Entitlement, model: &ModelDescriptor) -> Result<(), TurnError> {
    if entitlement.allows(model.tier) {
        return Ok(());
    }
    match entitlement {
        Entitlement::Guest => Err(TurnError::premium(
            CODE_SIGN_IN_REQUIRED,
            format!("Sign in to use {}.", model.display_name()),
        )),
        _ => Err(TurnError::premium(
            CODE_PREMIUM_REQUIRED,
            format!("{} requires a premium account.", model.display_name()),
        )),
    }
}

fn check_uploads(
    entitlement: Entitlement,
    req: &TurnRequest,
    model: &ModelDescriptor,
) -> Result<(), TurnError> {
    if !req.has_uploads() {
        return Ok(());
    }
    if entitlement == Entitlement::Guest {
        return Err(TurnError::premium(
            CODE_FILE_UPLOAD_NOT_ALLOWED,
            "Sign in to upload files.",
        ));
    }
    if !model.capabilities.supports_files {
        return Err(TurnError::premium(
            CODE_FILE_UPLOAD_NOT_ALLOWED,
            format!("{} does not accept file uploads.", model.display_name()),
        ));
    }
    Ok(())
}

/// Count the accepted turn without holding up the pipeline.
fn spawn_increment(store: StoreHandle, caller_id: String, authenticated: bool) {
    tokio::spawn(async move {
        if let Err(e) = store.increment_daily_count(&caller_id, authenticated).await {
            tracing::warn!(caller_id = %caller_id, error = %e, "quota increment failed");
            TraceEvent::QuotaIncrementFailed {
                caller_id,
                authenticated,
                error: e.to_string(),
            }
            .emit();
        }
    });
}

/// Whether a tier is usable at all without an account.
pub fn guest_accessible(tier: ModelTier) -> bool {
    Entitlement::Guest.allows(tier)
}
