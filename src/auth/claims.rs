// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GhostPost

//! JWT claims and the authenticated-user representation.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::roles::Role;

/// Claims this service reads from an identity-provider JWT.
///
/// The core trusts the identity verbatim: `sub` becomes the caller ID and
/// `email` the caller address used for recipient matching. Neither is ever
/// re-validated here.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtClaims {
    /// Subject - the canonical user identifier.
    pub sub: String,

    /// Email address asserted by the identity provider.
    #[serde(default)]
    pub email: String,

    /// Expiration timestamp.
    #[serde(default)]
    pub exp: i64,

    /// Issuer.
    #[serde(default)]
    pub iss: String,

    /// Session ID (provider-specific).
    #[serde(default)]
    pub sid: Option<String>,

    /// Audience (validated by the jsonwebtoken crate, not read directly).
    #[serde(default)]
    #[allow(dead_code)]
    pub aud: Option<serde_json::Value>,

    /// Provider metadata carrying the role.
    #[serde(default, rename = "publicMetadata")]
    pub public_metadata: Option<PublicMetadata>,
}

/// Identity-provider public metadata.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PublicMetadata {
    /// User's role, set in the provider dashboard.
    #[serde(default)]
    pub role: Option<String>,
}

impl JwtClaims {
    /// Role from metadata, defaulting to least privilege.
    pub fn role(&self) -> Role {
        self.public_metadata
            .as_ref()
            .and_then(|m| m.role.as_deref())
            .and_then(Role::parse)
            .unwrap_or_default()
    }
}

/// Authenticated caller, as supplied by the authentication collaborator.
///
/// This is the identity every lifecycle operation receives: `user_id` for
/// ownership checks, `email` for recipient matching.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthenticatedUser {
    /// Canonical user ID (`sub` claim).
    pub user_id: String,

    /// Caller email address (`email` claim; may be empty if the provider
    /// does not assert one, in which case recipient matching finds nothing).
    pub email: String,

    /// User's role.
    pub role: Role,

    /// Session ID, when the provider supplies one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl AuthenticatedUser {
    pub fn from_claims(claims: JwtClaims) -> Self {
        let role = claims.role();
        Self {
            user_id: claims.sub,
            email: claims.email,
            role,
            session_id: claims.sid,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
