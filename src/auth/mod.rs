// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GhostPost

//! # Authentication Module
//!
//! JWT authentication against an external identity provider. The provider
//! owns sessions and OAuth; this service only verifies the token it is
//! handed and extracts `(user_id, email, role)` from it.
//!
//! ## Auth Flow
//!
//! 1. Frontend authenticates the user with the identity provider
//! 2. Frontend sends `Authorization: Bearer <JWT>`
//! 3. Server verifies signature (JWKS), expiry, issuer, audience, and
//!    extracts the caller identity
//!
//! Without `AUTH_JWKS_URL` the server runs in development mode and performs
//! structural validation only.

pub mod claims;
pub mod error;
pub mod extractor;
pub mod jwks;
pub mod roles;

pub use claims::AuthenticatedUser;
pub use error::AuthError;
pub use extractor::{AdminOnly, Auth};
pub use jwks::JwksManager;
pub use roles::Role;
