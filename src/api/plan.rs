// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GhostPost

//! Plan tier endpoints.
//!
//! The payment collaborator confirms a purchase out of band; this route
//! records the granted tier against the user. Entitlement resolution is a
//! pure lookup, so the new limits apply from the next request onward.

use axum::{
    extract::State,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    audit_log,
    auth::Auth,
    entitlements::{PlanLimits, PlanTier},
    error::ApiError,
    state::AppState,
    storage::{AuditEventType, UserRepository},
};

/// Current plan and usage for the caller.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PlanResponse {
    pub plan: PlanTier,
    pub limits: PlanLimits,
    /// Number of capsules the caller currently owns.
    pub capsule_count: u32,
}

/// Payment-confirmed plan change.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SetPlanRequest {
    /// Purchased plan key (e.g. `time_keeper`, `time_lord`).
    pub plan_key: String,
    /// Payment reference from the provider (UTR / session id).
    pub payment_reference: String,
}

/// Response after a plan change.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SetPlanResponse {
    pub plan: PlanTier,
    pub message: String,
}

/// Read the caller's plan, limits, and usage.
#[utoipa::path(
    get,
    path = "/v1/plan",
    tag = "Plan",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current plan and usage", body = PlanResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn get_plan(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<PlanResponse>, ApiError> {
    let stored = UserRepository::new(&state.files).get_or_create(&user.user_id, &user.email)?;
    let capsule_count = state
        .capsules
        .count_by_owner(&user.user_id)
        .map_err(|e| {
            tracing::error!(error = %e, "failed to count capsules");
            ApiError::internal("internal server error")
        })?;

    Ok(Json(PlanResponse {
        plan: stored.plan,
        limits: stored.plan.limits(),
        capsule_count,
    }))
}

/// Record a payment-confirmed plan change for the caller.
#[utoipa::path(
    post,
    path = "/v1/plan",
    tag = "Plan",
    security(("bearer_auth" = [])),
    request_body = SetPlanRequest,
    responses(
        (status = 200, description = "Plan updated", body = SetPlanResponse),
        (status = 400, description = "Invalid payment reference"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn set_plan(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<SetPlanRequest>,
) -> Result<Json<SetPlanResponse>, ApiError> {
    if request.payment_reference.trim().len() < 4 {
        return Err(ApiError::bad_request("invalid payment reference"));
    }

    let tier = PlanTier::from_plan_key(&request.plan_key);
    let stored = UserRepository::new(&state.files).set_plan_tier(&user.user_id, tier)?;

    audit_log!(
        &state.files,
        AuditEventType::PlanChanged,
        &user,
        "user",
        &user.user_id
    );
    tracing::info!(user_id = %user.user_id, plan = %tier, "plan changed");

    Ok(Json(SetPlanResponse {
        plan: stored.plan,
        message: format!("Plan updated to {tier}"),
    }))
}
