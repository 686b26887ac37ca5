// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GhostPost

//! GhostPost Server - Digital Time Capsule Service
//!
//! Users seal messages (with an optional media attachment) addressed to a
//! recipient and a future unlock date. Content is envelope-encrypted at
//! rest, quotas follow the owner's plan tier, and a background sweep emails
//! each capsule to its recipient once the unlock date passes.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - JWT authentication against an external identity provider
//! - `crypto` - Field-level envelope encryption (AES-256-GCM)
//! - `entitlements` - Plan tiers and the limits they grant
//! - `lifecycle` - Capsule state machine (create/edit/delete/read windows)
//! - `delivery` - Scheduled sweep and notification delivery
//! - `notify` - Notification transports (SMTP, log-only)
//! - `storage` - Capsule database (redb), user records, audit log

pub mod api;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod delivery;
pub mod entitlements;
pub mod error;
pub mod lifecycle;
pub mod notify;
pub mod state;
pub mod storage;
