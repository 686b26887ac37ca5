// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GhostPost

//! User repository: plan tier and profile per authenticated user.
//!
//! User identity comes from the identity provider; this store only keeps
//! what the entitlement checks need. A user record is created lazily on
//! first authenticated touch, at the default (most restrictive) tier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entitlements::PlanTier;

use super::{FileStore, StorageError, StorageResult};

/// User record stored as one JSON file under `users/`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct StoredUser {
    /// Canonical user ID (identity provider `sub` claim).
    pub user_id: String,
    /// Email address, as reported by the identity provider.
    pub email: String,
    /// Current plan tier. Changed only via `set_plan_tier`.
    pub plan: PlanTier,
    /// When this record was created.
    pub created_at: DateTime<Utc>,
    /// When this record was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Repository for user records.
pub struct UserRepository<'a> {
    storage: &'a FileStore,
}

impl<'a> UserRepository<'a> {
    pub fn new(storage: &'a FileStore) -> Self {
        Self { storage }
    }

    /// Check if a user record exists.
    pub fn exists(&self, user_id: &str) -> bool {
        self.storage.exists(self.storage.paths().user(user_id))
    }

    /// Get a user by ID.
    pub fn get(&self, user_id: &str) -> StorageResult<StoredUser> {
        let path = self.storage.paths().user(user_id);
        if !self.storage.exists(&path) {
            return Err(StorageError::NotFound(format!("User {user_id}")));
        }
        self.storage.read_json(path)
    }

    /// Get the user record, creating it at the default tier on first touch.
    ///
    /// The stored email follows the identity provider: if it changed since
    /// the last request, the record is refreshed.
    pub fn get_or_create(&self, user_id: &str, email: &str) -> StorageResult<StoredUser> {
        match self.get(user_id) {
            Ok(mut user) => {
                if user.email != email {
                    user.email = email.to_string();
                    user.updated_at = Utc::now();
                    self.save(&user)?;
                }
                Ok(user)
            }
            Err(StorageError::NotFound(_)) => {
                let now = Utc::now();
                let user = StoredUser {
                    user_id: user_id.to_string(),
                    email: email.to_string(),
                    plan: PlanTier::default(),
                    created_at: now,
                    updated_at: now,
                };
                self.save(&user)?;
                Ok(user)
            }
            Err(e) => Err(e),
        }
    }

    /// Set a user's plan tier (payment collaborator entry point).
    ///
    /// The user record is created on the fly if the payment confirmation
    /// arrives before the user's first API call.
    pub fn set_plan_tier(&self, user_id: &str, tier: PlanTier) -> StorageResult<StoredUser> {
        let mut user = match self.get(user_id) {
            Ok(user) => user,
            Err(StorageError::NotFound(_)) => {
                let now = Utc::now();
                StoredUser {
                    user_id: user_id.to_string(),
                    email: String::new(),
                    plan: PlanTier::default(),
                    created_at: now,
                    updated_at: now,
                }
            }
            Err(e) => return Err(e),
        };

        user.plan = tier;
        user.updated_at = Utc::now();
        self.save(&user)?;
        Ok(user)
    }

    fn save(&self, user: &StoredUser) -> StorageResult<()> {
        self.storage
            .write_json(self.storage.paths().user(&user.user_id), user)
    }
}
