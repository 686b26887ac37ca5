// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GhostPost

//! HTTP boundary error type.
//!
//! Domain errors ([`CapsuleError`]) carry the reason; this adapter maps each
//! kind to a status code and a JSON body. The mapping lives here so the
//! lifecycle manager never needs to know about HTTP.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::lifecycle::CapsuleError;
use crate::storage::StorageError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<CapsuleError> for ApiError {
    fn from(e: CapsuleError) -> Self {
        let status = match &e {
            CapsuleError::MissingField(_)
            | CapsuleError::InvalidDate(_)
            | CapsuleError::UnknownMediaKind
            | CapsuleError::MediaTooLarge { .. } => StatusCode::BAD_REQUEST,

            CapsuleError::NotOwner
            | CapsuleError::Sealed { .. }
            | CapsuleError::QuotaExceeded { .. }
            | CapsuleError::HorizonExceeded { .. }
            | CapsuleError::MediaNotAllowed(_)
            | CapsuleError::VideoNotAllowed(_) => StatusCode::FORBIDDEN,

            CapsuleError::NotFound(_) => StatusCode::NOT_FOUND,

            // Time-gate violations: the request conflicts with the capsule's
            // current state, and retrying will not help.
            CapsuleError::AlreadyUnlocked
            | CapsuleError::EditWindowClosed
            | CapsuleError::DeleteWindowClosed => StatusCode::CONFLICT,

            CapsuleError::Storage(_) | CapsuleError::Cipher(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        // Internal detail stays in the logs, not the response body.
        let message = match &e {
            CapsuleError::Storage(detail) | CapsuleError::Cipher(detail) => {
                tracing::error!(detail = %detail, "internal failure serving request");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        Self { status, message }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(what) => Self::not_found(what),
            other => {
                tracing::error!(error = %other, "storage failure serving request");
                Self::internal("internal server error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use chrono::Utc;

    #[test]
    fn constructors_set_status_and_message() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "missing");

        let bad = ApiError::bad_request("bad");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn capsule_errors_map_to_distinct_statuses() {
        let cases = [
            (
                ApiError::from(CapsuleError::MissingField("title")),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(CapsuleError::InvalidDate("past".to_string())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(CapsuleError::NotOwner),
                StatusCode::FORBIDDEN,
            ),
            (
                ApiError::from(CapsuleError::Sealed {
                    unlock_at: Utc::now(),
                }),
                StatusCode::FORBIDDEN,
            ),
            (
                ApiError::from(CapsuleError::NotFound("x".to_string())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(CapsuleError::EditWindowClosed),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(CapsuleError::DeleteWindowClosed),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(CapsuleError::AlreadyUnlocked),
                StatusCode::CONFLICT,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(error.status, expected, "{}", error.message);
        }
    }

    #[test]
    fn internal_detail_is_not_leaked() {
        let error = ApiError::from(CapsuleError::Storage("redb exploded at /data".to_string()));
        assert_eq!(error.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.message, "internal server error");
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data"}"#);
    }
}
