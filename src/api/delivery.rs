// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GhostPost

//! Manual delivery sweep trigger.
//!
//! The background poller runs on a timer; this endpoint lets operators run
//! an extra sweep on demand. Overlap with the timer is safe: the claim on
//! the delivered flag ensures each capsule is sent at most once per unlock.

use axum::{extract::State, Json};

use crate::{auth::AdminOnly, delivery::SweepReport, error::ApiError, state::AppState};

/// Run one delivery sweep now (admin only).
#[utoipa::path(
    post,
    path = "/v1/delivery/run",
    tag = "Delivery",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Sweep report", body = SweepReport),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role required")
    )
)]
pub async fn run_delivery_sweep(
    AdminOnly(user): AdminOnly,
    State(state): State<AppState>,
) -> Result<Json<SweepReport>, ApiError> {
    tracing::info!(admin = %user.user_id, "manual delivery sweep requested");

    let report = crate::delivery::run_sweep(
        &state.capsules,
        &state.files,
        &state.cipher,
        state.notifier.as_ref(),
        state.send_timeout,
    )
    .await;

    Ok(Json(report))
}
