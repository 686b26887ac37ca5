// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GhostPost

//! Capsule management endpoints.
//!
//! All routes here require authentication and enforce ownership (or, for
//! reads, recipient matching) through the lifecycle manager.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    audit_log,
    auth::Auth,
    error::ApiError,
    lifecycle::{CapsuleChanges, CapsuleView, NewCapsule, ReceivedCapsule},
    state::AppState,
    storage::AuditEventType,
};

/// Response after creating a capsule.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateCapsuleResponse {
    /// Identifier of the newly sealed capsule.
    pub capsule_id: String,
    pub message: String,
}

/// Response containing the caller's own capsules.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CapsuleListResponse {
    pub capsules: Vec<CapsuleView>,
    pub total: usize,
}

/// Response containing capsules addressed to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReceivedListResponse {
    pub capsules: Vec<ReceivedCapsule>,
    pub total: usize,
}

/// Response after deleting a capsule.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeleteCapsuleResponse {
    pub message: String,
    pub capsule_id: String,
}

/// Seal a new capsule.
#[utoipa::path(
    post,
    path = "/v1/capsules",
    tag = "Capsules",
    security(("bearer_auth" = [])),
    request_body = NewCapsule,
    responses(
        (status = 201, description = "Capsule sealed", body = CreateCapsuleResponse),
        (status = 400, description = "Missing field or invalid unlock date"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Plan limit exceeded or media not allowed")
    )
)]
pub async fn create_capsule(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<NewCapsule>,
) -> Result<(StatusCode, Json<CreateCapsuleResponse>), ApiError> {
    let capsule_id = state.lifecycle().create(&user, request)?;

    audit_log!(
        &state.files,
        AuditEventType::CapsuleCreated,
        &user,
        "capsule",
        &capsule_id
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateCapsuleResponse {
            capsule_id,
            message: "Capsule sealed".to_string(),
        }),
    ))
}

/// List the caller's own capsules, decrypted for the owner.
#[utoipa::path(
    get,
    path = "/v1/capsules",
    tag = "Capsules",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Owned capsules", body = CapsuleListResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_capsules(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<CapsuleListResponse>, ApiError> {
    let capsules = state.lifecycle().list_owned(&user)?;
    let total = capsules.len();
    Ok(Json(CapsuleListResponse { capsules, total }))
}

/// List capsules addressed to the caller's email. Sealed entries expose
/// only their arrival time.
#[utoipa::path(
    get,
    path = "/v1/capsules/received",
    tag = "Capsules",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Received capsules", body = ReceivedListResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_received_capsules(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<ReceivedListResponse>, ApiError> {
    let capsules = state.lifecycle().list_received(&user)?;
    let total = capsules.len();
    Ok(Json(ReceivedListResponse { capsules, total }))
}

/// Read one capsule: the owner any time, a matching recipient once the
/// unlock date has passed.
#[utoipa::path(
    get,
    path = "/v1/capsules/{capsule_id}",
    tag = "Capsules",
    security(("bearer_auth" = [])),
    params(("capsule_id" = String, Path, description = "Capsule ID")),
    responses(
        (status = 200, description = "Decrypted capsule", body = CapsuleView),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not your capsule, or still sealed"),
        (status = 404, description = "Capsule not found")
    )
)]
pub async fn get_capsule(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(capsule_id): Path<String>,
) -> Result<Json<CapsuleView>, ApiError> {
    let view = state.lifecycle().read(&user, &capsule_id)?;

    audit_log!(
        &state.files,
        AuditEventType::CapsuleOpened,
        &user,
        "capsule",
        &capsule_id
    );

    Ok(Json(view))
}

/// Edit a capsule. Rejected inside the final hour before unlock.
#[utoipa::path(
    patch,
    path = "/v1/capsules/{capsule_id}",
    tag = "Capsules",
    security(("bearer_auth" = [])),
    params(("capsule_id" = String, Path, description = "Capsule ID")),
    request_body = CapsuleChanges,
    responses(
        (status = 200, description = "Updated capsule", body = CapsuleView),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not your capsule"),
        (status = 404, description = "Capsule not found"),
        (status = 409, description = "Edit window closed or already unlocked")
    )
)]
pub async fn update_capsule(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(capsule_id): Path<String>,
    Json(changes): Json<CapsuleChanges>,
) -> Result<Json<CapsuleView>, ApiError> {
    let lifecycle = state.lifecycle();
    lifecycle.update(&user, &capsule_id, changes)?;

    audit_log!(
        &state.files,
        AuditEventType::CapsuleUpdated,
        &user,
        "capsule",
        &capsule_id
    );

    let view = lifecycle.read(&user, &capsule_id)?;
    Ok(Json(view))
}

/// Delete a capsule. Rejected inside the final 24 hours before unlock;
/// allowed again once unlocked.
#[utoipa::path(
    delete,
    path = "/v1/capsules/{capsule_id}",
    tag = "Capsules",
    security(("bearer_auth" = [])),
    params(("capsule_id" = String, Path, description = "Capsule ID")),
    responses(
        (status = 200, description = "Capsule deleted", body = DeleteCapsuleResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not your capsule"),
        (status = 404, description = "Capsule not found"),
        (status = 409, description = "Delete window closed")
    )
)]
pub async fn delete_capsule(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(capsule_id): Path<String>,
) -> Result<Json<DeleteCapsuleResponse>, ApiError> {
    state.lifecycle().delete(&user, &capsule_id)?;

    audit_log!(
        &state.files,
        AuditEventType::CapsuleDeleted,
        &user,
        "capsule",
        &capsule_id
    );

    Ok(Json(DeleteCapsuleResponse {
        message: "Capsule deleted".to_string(),
        capsule_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthenticatedUser, Role};
    use chrono::{Duration, Utc};

    fn member(id: &str, email: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: id.to_string(),
            email: email.to_string(),
            role: Role::Member,
            session_id: None,
        }
    }

    fn request(unlock_at: chrono::DateTime<Utc>) -> NewCapsule {
        NewCapsule {
            title: "Hello".to_string(),
            message: "From the past".to_string(),
            recipient_email: "rcpt@example.com".to_string(),
            unlock_at: unlock_at.to_rfc3339(),
            attachment: None,
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trip() {
        let (state, _dir) = AppState::for_tests();
        let user = member("user-1", "owner@example.com");

        let (status, Json(created)) = create_capsule(
            Auth(user.clone()),
            State(state.clone()),
            Json(request(Utc::now() + Duration::days(3))),
        )
        .await
        .expect("create succeeds");

        assert_eq!(status, StatusCode::CREATED);
        assert!(!created.capsule_id.is_empty());

        let Json(view) = get_capsule(
            Auth(user.clone()),
            State(state.clone()),
            Path(created.capsule_id.clone()),
        )
        .await
        .expect("owner read succeeds");

        assert_eq!(view.title, "Hello");
        assert_eq!(view.recipient_email.as_deref(), Some("rcpt@example.com"));

        let Json(listed) = list_capsules(Auth(user), State(state))
            .await
            .expect("list succeeds");
        assert_eq!(listed.total, 1);
    }

    #[tokio::test]
    async fn strangers_get_403_and_missing_capsules_404() {
        let (state, _dir) = AppState::for_tests();
        let owner = member("user-1", "owner@example.com");
        let stranger = member("user-2", "stranger@example.com");

        let (_, Json(created)) = create_capsule(
            Auth(owner),
            State(state.clone()),
            Json(request(Utc::now() + Duration::days(3))),
        )
        .await
        .unwrap();

        let err = get_capsule(
            Auth(stranger.clone()),
            State(state.clone()),
            Path(created.capsule_id),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        let err = get_capsule(Auth(stranger), State(state), Path("missing".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_and_delete_flow() {
        let (state, _dir) = AppState::for_tests();
        let user = member("user-1", "owner@example.com");

        let (_, Json(created)) = create_capsule(
            Auth(user.clone()),
            State(state.clone()),
            Json(request(Utc::now() + Duration::days(3))),
        )
        .await
        .unwrap();

        let Json(updated) = update_capsule(
            Auth(user.clone()),
            State(state.clone()),
            Path(created.capsule_id.clone()),
            Json(CapsuleChanges {
                title: Some("Renamed".to_string()),
                ..Default::default()
            }),
        )
        .await
        .expect("update succeeds");
        assert_eq!(updated.title, "Renamed");

        let Json(deleted) = delete_capsule(
            Auth(user.clone()),
            State(state.clone()),
            Path(created.capsule_id.clone()),
        )
        .await
        .expect("delete succeeds outside the lock window");
        assert_eq!(deleted.capsule_id, created.capsule_id);

        let err = get_capsule(Auth(user), State(state), Path(created.capsule_id))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn quota_rejection_maps_to_403() {
        let (state, _dir) = AppState::for_tests();
        let user = member("user-1", "owner@example.com");

        for _ in 0..3 {
            create_capsule(
                Auth(user.clone()),
                State(state.clone()),
                Json(request(Utc::now() + Duration::days(3))),
            )
            .await
            .unwrap();
        }

        let err = create_capsule(
            Auth(user),
            State(state),
            Json(request(Utc::now() + Duration::days(3))),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert!(err.message.contains("plan limit"));
    }

    #[tokio::test]
    async fn received_listing_matches_recipient_email() {
        let (state, _dir) = AppState::for_tests();
        let owner = member("user-1", "owner@example.com");
        let recipient = member("user-2", "rcpt@example.com");

        create_capsule(
            Auth(owner),
            State(state.clone()),
            Json(request(Utc::now() + Duration::days(3))),
        )
        .await
        .unwrap();

        let Json(received) = list_received_capsules(Auth(recipient), State(state.clone()))
            .await
            .unwrap();
        assert_eq!(received.total, 1);
        assert!(received.capsules[0].sealed);

        let nobody = member("user-3", "other@example.com");
        let Json(received) = list_received_capsules(Auth(nobody), State(state))
            .await
            .unwrap();
        assert_eq!(received.total, 0);
    }
}
