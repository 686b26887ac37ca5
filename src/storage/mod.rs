// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GhostPost

//! # Persistent Storage Module
//!
//! Two storage mechanisms, one root directory:
//!
//! - **Capsule records** live in an embedded redb database
//!   (`capsules.redb`): ACID single-record transactions plus the indexes the
//!   delivery sweep and listings need.
//! - **User records and audit logs** are JSON files; small collections where
//!   a directory scan is cheap.
//!
//! Sensitive capsule fields are sealed by the envelope cipher *before* they
//! reach this layer; nothing here encrypts or decrypts.
//!
//! ## Storage Layout
//!
//! ```text
//! /data/
//!   capsules.redb            # Capsule records + due/owner/recipient indexes
//!   users/
//!     {user_id}.json         # Plan tier and profile
//!   audit/
//!     {date}/events.jsonl    # Daily audit logs
//! ```

pub mod audit;
pub mod capsules;
pub mod files;
pub mod paths;
pub mod users;

pub use audit::{AuditEvent, AuditEventType, AuditRepository};
pub use capsules::{CapsuleDatabase, CapsuleDbError, CapsuleDbResult, CapsuleStatus, StoredCapsule};
pub use files::{FileStore, StorageError, StorageResult};
pub use paths::StoragePaths;
pub use users::{StoredUser, UserRepository};
