// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GhostPost

//! Public, unauthenticated capsule view.
//!
//! Anyone holding a capsule link can read it once the unlock date passes;
//! before that the route answers 403 with the unlock timestamp in the
//! message. This is deliberately a lower-trust channel than the
//! authenticated recipient path and exposes no recipient address.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{error::ApiError, lifecycle::CapsuleView, state::AppState};

/// Time-gated public view of one capsule.
#[utoipa::path(
    get,
    path = "/v1/view/{capsule_id}",
    tag = "View",
    params(("capsule_id" = String, Path, description = "Capsule ID from a shared link")),
    responses(
        (status = 200, description = "Unlocked capsule", body = CapsuleView),
        (status = 403, description = "Capsule is still sealed"),
        (status = 404, description = "Capsule not found")
    )
)]
pub async fn view_capsule(
    State(state): State<AppState>,
    Path(capsule_id): Path<String>,
) -> Result<Json<CapsuleView>, ApiError> {
    let view = state.lifecycle().public_view(&capsule_id)?;
    Ok(Json(view))
}
