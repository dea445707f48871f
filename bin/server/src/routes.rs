//! HTTP routes.
//!
//! Every `/api` route resolves the caller's access context, refreshes it
//! against the shared config, and then enforces tiers server side. Step-up
//! failures are not HTTP errors: they come back as `success: false` plus a
//! notice, the same way the access core reports them.

use crate::auth::RequireIdentity;
use crate::error::ApiError;
use crate::state::{AppState, UserContext};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use dentalis_access::{
    AccessConfig, AccessConfigPatch, AccessControl, AccessTier, GuardOutcome, GuardView,
    MenuGroup, Notice, SETTINGS_RESOURCE, SessionPolicy, TierAppearance, TierChange, TierMap,
    TierOption, TierSwitcher, compose,
};
use dentalis_core::{Identity, UserKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tower_http::trace::TraceLayer;
use tracing::instrument;

/// Builds the application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/access", get(snapshot))
        .route("/api/access/switch", post(switch))
        .route("/api/access/logout", post(logout))
        .route("/api/access/menu", get(menu))
        .route("/api/access/resources/{resource}", get(resource_view))
        .route("/api/access/resources/{resource}/unlock", post(unlock))
        .route("/api/access/config", get(read_config).patch(update_config))
        .route("/api/access/config/reset", post(reset_config))
        .route("/api/gate/{resource}", get(gate))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}

/// Locks the caller's context and brings it up to date.
async fn open(
    state: &AppState,
    identity: &Identity,
) -> Result<OwnedMutexGuard<UserContext>, ApiError> {
    let mut context = state.context(&identity.user_key()).await?.lock_owned().await;
    context.refresh();
    Ok(context)
}

/// Access config endpoints need the top tier whatever the resource map says.
fn require_settings_access(control: &AccessControl) -> Result<(), ApiError> {
    if control.has_access(AccessTier::TOP) {
        Ok(())
    } else {
        Err(ApiError::TierRequired {
            resource: SETTINGS_RESOURCE.to_string(),
            required: AccessTier::TOP,
        })
    }
}

fn require_resource(control: &AccessControl, resource: &str) -> Result<(), ApiError> {
    let required = control.resource_tier(resource);
    if control.has_access(required) {
        Ok(())
    } else {
        Err(ApiError::TierRequired {
            resource: resource.to_string(),
            required,
        })
    }
}

#[derive(Debug, Serialize)]
struct AccessSnapshot {
    user_key: UserKey,
    tier: AccessTier,
    label: String,
    icon: String,
    color: String,
    options: Vec<TierOption>,
}

async fn snapshot(
    State(state): State<Arc<AppState>>,
    RequireIdentity(identity): RequireIdentity,
) -> Result<Json<AccessSnapshot>, ApiError> {
    let context = open(&state, &identity).await?;
    let control = &context.control;
    let tier = control.current_tier();
    let appearance = control.appearance(tier);
    Ok(Json(AccessSnapshot {
        user_key: control.user_key().clone(),
        tier,
        label: appearance.label.clone(),
        icon: appearance.icon.clone(),
        color: appearance.color.clone(),
        options: TierSwitcher::options(control),
    }))
}

#[derive(Debug, Deserialize)]
struct SwitchRequest {
    target: AccessTier,
    #[serde(default)]
    credential: Option<String>,
}

#[derive(Debug, Serialize)]
struct SwitchResponse {
    success: bool,
    tier: AccessTier,
    notice: Notice,
    #[serde(skip_serializing_if = "Option::is_none")]
    attempts_left: Option<u32>,
}

/// Switches tier. Credential step-ups are attempt-limited per target tier,
/// with the same lockout policy as resource prompts.
#[instrument(skip_all, fields(user = %identity.user_key(), target = %request.target))]
async fn switch(
    State(state): State<Arc<AppState>>,
    RequireIdentity(identity): RequireIdentity,
    Json(request): Json<SwitchRequest>,
) -> Result<Json<SwitchResponse>, ApiError> {
    let mut context = open(&state, &identity).await?;
    let (attempts, control) = context.switch_attempts_and_control(request.target);
    let limited = control.requires_credential(request.target);

    if limited {
        if let Err(retry_after) = attempts.begin() {
            return Ok(Json(SwitchResponse {
                success: false,
                tier: control.current_tier(),
                notice: Notice::locked_out(retry_after),
                attempts_left: Some(0),
            }));
        }
    }

    let result =
        TierSwitcher::request(control, request.target, request.credential.as_deref()).await;
    let (success, notice, attempts_left) = match &result {
        Ok(change) => {
            if limited {
                attempts.record_success();
            }
            (true, Notice::tier_switched(control, change), None)
        }
        Err(e) if limited => {
            let left = attempts.record_failure();
            let notice = match attempts.locked_for() {
                Some(retry_after) if left == 0 => Notice::locked_out(retry_after),
                _ => Notice::switch_failed(control, e),
            };
            (false, notice, Some(left))
        }
        Err(e) => (false, Notice::switch_failed(control, e), None),
    };

    Ok(Json(SwitchResponse {
        success,
        tier: control.current_tier(),
        notice,
        attempts_left,
    }))
}

#[derive(Debug, Serialize)]
struct LogoutResponse {
    tier: AccessTier,
    notice: Notice,
}

async fn logout(
    State(state): State<Arc<AppState>>,
    RequireIdentity(identity): RequireIdentity,
) -> Result<Json<LogoutResponse>, ApiError> {
    let mut context = open(&state, &identity).await?;
    context.control.logout();
    Ok(Json(LogoutResponse {
        tier: context.control.current_tier(),
        notice: Notice::logged_out(),
    }))
}

async fn menu(
    State(state): State<Arc<AppState>>,
    RequireIdentity(identity): RequireIdentity,
) -> Result<Json<Vec<MenuGroup>>, ApiError> {
    let context = open(&state, &identity).await?;
    Ok(Json(compose(&context.control, state.catalog())))
}

#[derive(Debug, Serialize)]
struct ResourceResponse {
    resource: String,
    required: AccessTier,
    view: GuardView,
}

async fn resource_view(
    State(state): State<Arc<AppState>>,
    RequireIdentity(identity): RequireIdentity,
    Path(resource): Path<String>,
) -> Result<Json<ResourceResponse>, ApiError> {
    let context = open(&state, &identity).await?;
    Ok(Json(ResourceResponse {
        required: context.control.resource_tier(&resource),
        view: context.view(&resource),
        resource,
    }))
}

#[derive(Debug, Default, Deserialize)]
struct UnlockRequest {
    #[serde(default)]
    credential: Option<String>,
}

#[derive(Debug, Serialize)]
struct UnlockResponse {
    granted: bool,
    tier: AccessTier,
    view: GuardView,
    #[serde(skip_serializing_if = "Option::is_none")]
    attempts_left: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notice: Option<Notice>,
}

#[instrument(skip_all, fields(user = %identity.user_key(), %resource))]
async fn unlock(
    State(state): State<Arc<AppState>>,
    RequireIdentity(identity): RequireIdentity,
    Path(resource): Path<String>,
    Json(request): Json<UnlockRequest>,
) -> Result<Json<UnlockResponse>, ApiError> {
    let mut context = open(&state, &identity).await?;
    let (guard, control) = context.guard_and_control(&resource);
    let from = control.current_tier();

    let outcome = guard.submit(control, request.credential.as_deref()).await;
    let (granted, attempts_left, notice) = match outcome {
        GuardOutcome::Granted => {
            let change = TierChange {
                from,
                to: control.current_tier(),
                verified: true,
            };
            if change.is_step_up() {
                (true, None, Some(Notice::tier_switched(control, &change)))
            } else {
                (true, None, None)
            }
        }
        GuardOutcome::Rejected {
            error,
            attempts_left,
        } => {
            let notice = match guard.locked_for() {
                Some(retry_after) if attempts_left == 0 => Notice::locked_out(retry_after),
                _ => Notice::switch_failed(control, &error),
            };
            (false, Some(attempts_left), Some(notice))
        }
        GuardOutcome::LockedOut { retry_after } => {
            (false, Some(0), Some(Notice::locked_out(retry_after)))
        }
    };

    let response = UnlockResponse {
        granted,
        tier: control.current_tier(),
        view: guard.view(control),
        attempts_left,
        notice,
    };
    context.prune();
    Ok(Json(response))
}

/// The config as shown to administrators: credentials are reduced to
/// whether they are set.
#[derive(Debug, Serialize)]
struct RedactedConfig {
    default_tier: AccessTier,
    credentials_set: TierMap<bool>,
    credential_free_tiers: Vec<AccessTier>,
    resource_access: BTreeMap<String, AccessTier>,
    session_policy: SessionPolicy,
    appearance: TierMap<TierAppearance>,
}

impl From<&AccessConfig> for RedactedConfig {
    fn from(config: &AccessConfig) -> Self {
        Self {
            default_tier: config.default_tier,
            credentials_set: TierMap::from_fn(|tier| config.is_credential_set(tier)),
            credential_free_tiers: config.credential_free_tiers.clone(),
            resource_access: config.resource_access.clone(),
            session_policy: config.session_policy.clone(),
            appearance: config.appearance.clone(),
        }
    }
}

/// A config update as sent by clients.
///
/// Clients never see credentials, so credentials and appearance are merged
/// per tier over the current values instead of replacing the whole table.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigUpdate {
    default_tier: Option<AccessTier>,
    credentials: Option<BTreeMap<AccessTier, String>>,
    credential_free_tiers: Option<Vec<AccessTier>>,
    resource_access: Option<BTreeMap<String, AccessTier>>,
    session_policy: Option<SessionPolicy>,
    appearance: Option<BTreeMap<AccessTier, TierAppearance>>,
}

impl ConfigUpdate {
    fn into_patch(self, current: &AccessConfig) -> Result<AccessConfigPatch, ApiError> {
        let credentials = match self.credentials {
            Some(updates) if updates.contains_key(&AccessTier::Base) => {
                return Err(ApiError::InvalidRequest {
                    reason: "the base tier has no credential".to_string(),
                });
            }
            Some(updates) => {
                let mut credentials = current.credentials.clone();
                for (tier, secret) in updates {
                    credentials[tier] = secret;
                }
                Some(credentials)
            }
            None => None,
        };

        let appearance = self.appearance.map(|updates| {
            let mut appearance = current.appearance.clone();
            for (tier, value) in updates {
                appearance[tier] = value;
            }
            appearance
        });

        Ok(AccessConfigPatch {
            default_tier: self.default_tier,
            credentials,
            credential_free_tiers: self.credential_free_tiers,
            resource_access: self.resource_access,
            session_policy: self.session_policy,
            appearance,
        })
    }
}

#[derive(Debug, Serialize)]
struct ConfigResponse {
    config: RedactedConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    notice: Option<Notice>,
}

async fn read_config(
    State(state): State<Arc<AppState>>,
    RequireIdentity(identity): RequireIdentity,
) -> Result<Json<ConfigResponse>, ApiError> {
    let context = open(&state, &identity).await?;
    require_settings_access(&context.control)?;
    Ok(Json(ConfigResponse {
        config: RedactedConfig::from(context.control.config()),
        notice: None,
    }))
}

#[instrument(skip_all, fields(user = %identity.user_key()))]
async fn update_config(
    State(state): State<Arc<AppState>>,
    RequireIdentity(identity): RequireIdentity,
    Json(update): Json<ConfigUpdate>,
) -> Result<Json<ConfigResponse>, ApiError> {
    let mut context = open(&state, &identity).await?;
    require_settings_access(&context.control)?;

    let patch = update.into_patch(context.control.config())?;
    context.control.update_config(patch)?;

    Ok(Json(ConfigResponse {
        config: RedactedConfig::from(context.control.config()),
        notice: Some(Notice::config_saved()),
    }))
}

#[instrument(skip_all, fields(user = %identity.user_key()))]
async fn reset_config(
    State(state): State<Arc<AppState>>,
    RequireIdentity(identity): RequireIdentity,
) -> Result<Json<ConfigResponse>, ApiError> {
    let mut context = open(&state, &identity).await?;
    require_settings_access(&context.control)?;

    context.control.reset_config();

    Ok(Json(ConfigResponse {
        config: RedactedConfig::from(context.control.config()),
        notice: Some(Notice::config_reset()),
    }))
}

/// Forward-auth check for the data API: 204 when the caller's tier covers
/// the resource, 403 otherwise.
async fn gate(
    State(state): State<Arc<AppState>>,
    RequireIdentity(identity): RequireIdentity,
    Path(resource): Path<String>,
) -> Result<StatusCode, ApiError> {
    let context = open(&state, &identity).await?;
    require_resource(&context.control, &resource)?;
    Ok(StatusCode::NO_CONTENT)
}
