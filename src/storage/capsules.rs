// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GhostPost

//! Embedded capsule database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `capsules`: capsule_id → serialized StoredCapsule (JSON bytes)
//! - `due_index`: `unlock_ts_be|capsule_id` → capsule_id, present only while
//!   `delivered == false`; a forward range scan up to `now` yields due
//!   capsules oldest first
//! - `owner_index`: `owner_id|unlock_ts_be|capsule_id` → capsule_id
//! - `recipient_index`: `recipient_hmac|capsule_id` → capsule_id
//!
//! Every operation is a single transaction, so index entries and the record
//! they point at never diverge, and `claim_delivery` is a real compare-and-
//! set: two overlapping delivery sweeps can both see a capsule as due, but
//! only one claim succeeds.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Primary table: capsule_id → serialized StoredCapsule (JSON bytes).
const CAPSULES: TableDefinition<&str, &[u8]> = TableDefinition::new("capsules");

/// Index of undelivered capsules by unlock time (ascending).
const DUE_INDEX: TableDefinition<&[u8], &str> = TableDefinition::new("due_index");

/// Index of capsules by owner, ordered by unlock time.
const OWNER_INDEX: TableDefinition<&[u8], &str> = TableDefinition::new("owner_index");

/// Index of capsules by recipient blind index.
const RECIPIENT_INDEX: TableDefinition<&[u8], &str> = TableDefinition::new("recipient_index");

#[derive(Debug, thiserror::Error)]
pub enum CapsuleDbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("capsule not found: {0}")]
    NotFound(String),

    #[error("capsule already exists: {0}")]
    AlreadyExists(String),
}

pub type CapsuleDbResult<T> = Result<T, CapsuleDbError>;

/// Coarse lifecycle tag, kept in lockstep with the `delivered` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CapsuleStatus {
    /// Created, waiting for its unlock date.
    Pending,
    /// Notification sent; terminal for delivery purposes.
    Delivered,
}

/// Capsule record as persisted. Title, message, recipient, and attachment
/// are ciphertext envelopes; the unlock date stays plaintext because the
/// delivery sweep queries on it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredCapsule {
    /// Unique capsule identifier (UUID), immutable.
    pub id: String,
    /// Owning user, immutable; ownership never transfers.
    pub owner_user_id: String,
    /// Encrypted title envelope.
    pub title: String,
    /// Encrypted message envelope.
    pub message: String,
    /// Encrypted recipient address envelope.
    pub recipient: String,
    /// Blind index (hex HMAC) of the canonicalized recipient address.
    pub recipient_index: String,
    /// Encrypted attachment envelope, when present.
    pub attachment: Option<String>,
    /// When the capsule unlocks (UTC). Mutable only outside the edit window.
    pub unlock_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Monotonic: false → true, flipped once by a successful delivery claim.
    pub delivered: bool,
    /// Mirror of `delivered`; kept consistent by this module.
    pub status: CapsuleStatus,
}

// =============================================================================
// Index Key Helpers
// =============================================================================

fn unlock_ts_bytes(unlock_at: DateTime<Utc>) -> [u8; 8] {
    // Pre-epoch unlock dates cannot be created, but clamp defensively so the
    // index key ordering stays total.
    (unlock_at.timestamp().max(0) as u64).to_be_bytes()
}

/// `unlock_ts_be | '|' | capsule_id`
fn due_key(unlock_at: DateTime<Utc>, capsule_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + 1 + capsule_id.len());
    key.extend_from_slice(&unlock_ts_bytes(unlock_at));
    key.push(b'|');
    key.extend_from_slice(capsule_id.as_bytes());
    key
}

/// Exclusive upper bound for scanning all due keys at or before `now`.
fn due_upper_bound(now: DateTime<Utc>) -> [u8; 8] {
    ((now.timestamp().max(0) as u64).saturating_add(1)).to_be_bytes()
}

/// `owner_id | '|' | unlock_ts_be | '|' | capsule_id`
fn owner_key(owner_user_id: &str, unlock_at: DateTime<Utc>, capsule_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(owner_user_id.len() + 1 + 8 + 1 + capsule_id.len());
    key.extend_from_slice(owner_user_id.as_bytes());
    key.push(b'|');
    key.extend_from_slice(&unlock_ts_bytes(unlock_at));
    key.push(b'|');
    key.extend_from_slice(capsule_id.as_bytes());
    key
}

/// `recipient_hmac | '|' | capsule_id`
fn recipient_key(recipient_index: &str, capsule_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(recipient_index.len() + 1 + capsule_id.len());
    key.extend_from_slice(recipient_index.as_bytes());
    key.push(b'|');
    key.extend_from_slice(capsule_id.as_bytes());
    key
}

fn prefix(component: &str) -> Vec<u8> {
    let mut p = Vec::with_capacity(component.len() + 1);
    p.extend_from_slice(component.as_bytes());
    p.push(b'|');
    p
}

/// Upper bound for a prefix range scan (prefix + enough 0xFF bytes to be
/// past any valid key: the suffix is at most ts + separator + UUID).
fn prefix_end(component: &str) -> Vec<u8> {
    let mut end = prefix(component);
    end.extend_from_slice(&[0xFF; 48]);
    end
}

// =============================================================================
// CapsuleDatabase
// =============================================================================

/// Embedded ACID capsule store.
pub struct CapsuleDatabase {
    db: Database,
}

impl CapsuleDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> CapsuleDbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail.
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(CAPSULES)?;
            let _ = write_txn.open_table(DUE_INDEX)?;
            let _ = write_txn.open_table(OWNER_INDEX)?;
            let _ = write_txn.open_table(RECIPIENT_INDEX)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Insert a new capsule and all its index entries.
    pub fn create(&self, capsule: &StoredCapsule) -> CapsuleDbResult<()> {
        let record = normalized(capsule.clone());
        let json = serde_json::to_vec(&record)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut capsules = write_txn.open_table(CAPSULES)?;
            if capsules.get(record.id.as_str())?.is_some() {
                return Err(CapsuleDbError::AlreadyExists(record.id.clone()));
            }
            capsules.insert(record.id.as_str(), json.as_slice())?;

            insert_index_entries(&write_txn, &record)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look up a single capsule by id.
    pub fn get(&self, capsule_id: &str) -> CapsuleDbResult<Option<StoredCapsule>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CAPSULES)?;
        match table.get(capsule_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// All capsules owned by a user, unlock date ascending.
    pub fn list_by_owner(&self, owner_user_id: &str) -> CapsuleDbResult<Vec<StoredCapsule>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(OWNER_INDEX)?;
        let capsules = read_txn.open_table(CAPSULES)?;

        let start = prefix(owner_user_id);
        let end = prefix_end(owner_user_id);

        let mut results = Vec::new();
        for entry in index.range(start.as_slice()..end.as_slice())? {
            let entry = entry?;
            let capsule_id = entry.1.value().to_string();
            if let Some(value) = capsules.get(capsule_id.as_str())? {
                results.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(results)
    }

    /// Number of capsules owned by a user (quota input).
    pub fn count_by_owner(&self, owner_user_id: &str) -> CapsuleDbResult<u32> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(OWNER_INDEX)?;

        let start = prefix(owner_user_id);
        let end = prefix_end(owner_user_id);

        let mut count = 0u32;
        for entry in index.range(start.as_slice()..end.as_slice())? {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    /// All capsules addressed to the given recipient blind index.
    pub fn list_by_recipient(&self, recipient_index: &str) -> CapsuleDbResult<Vec<StoredCapsule>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(RECIPIENT_INDEX)?;
        let capsules = read_txn.open_table(CAPSULES)?;

        let start = prefix(recipient_index);
        let end = prefix_end(recipient_index);

        let mut results = Vec::new();
        for entry in index.range(start.as_slice()..end.as_slice())? {
            let entry = entry?;
            let capsule_id = entry.1.value().to_string();
            if let Some(value) = capsules.get(capsule_id.as_str())? {
                results.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(results)
    }

    /// All undelivered capsules whose unlock date is at or before `now`,
    /// oldest first. Index entries whose record has vanished are skipped
    /// with a warning rather than failing the sweep.
    pub fn list_due(&self, now: DateTime<Utc>) -> CapsuleDbResult<Vec<StoredCapsule>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(DUE_INDEX)?;
        let capsules = read_txn.open_table(CAPSULES)?;

        let start: &[u8] = &[];
        let end = due_upper_bound(now);

        let mut results = Vec::new();
        for entry in index.range(start..end.as_slice())? {
            let entry = entry?;
            let capsule_id = entry.1.value().to_string();
            match capsules.get(capsule_id.as_str())? {
                Some(value) => results.push(serde_json::from_slice(value.value())?),
                None => {
                    tracing::warn!(
                        capsule_id = %capsule_id,
                        "due index entry points at a missing capsule record"
                    );
                }
            }
        }
        Ok(results)
    }

    /// Rewrite a capsule record, re-keying any index whose component
    /// changed. One transaction; readers never see a torn state.
    pub fn update(&self, capsule: &StoredCapsule) -> CapsuleDbResult<()> {
        let record = normalized(capsule.clone());
        let json = serde_json::to_vec(&record)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut capsules = write_txn.open_table(CAPSULES)?;
            let old: StoredCapsule = {
                let existing = capsules
                    .get(record.id.as_str())?
                    .ok_or_else(|| CapsuleDbError::NotFound(record.id.clone()))?;
                serde_json::from_slice(existing.value())?
            };

            capsules.insert(record.id.as_str(), json.as_slice())?;

            remove_index_entries(&write_txn, &old)?;
            insert_index_entries(&write_txn, &record)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Hard-delete a capsule and its index entries.
    pub fn delete(&self, capsule_id: &str) -> CapsuleDbResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut capsules = write_txn.open_table(CAPSULES)?;
            let old: StoredCapsule = {
                let existing = capsules
                    .get(capsule_id)?
                    .ok_or_else(|| CapsuleDbError::NotFound(capsule_id.to_string()))?;
                serde_json::from_slice(existing.value())?
            };

            capsules.remove(capsule_id)?;
            remove_index_entries(&write_txn, &old)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Compare-and-set delivery claim.
    ///
    /// Atomically marks the capsule delivered and drops it from the due
    /// index, but only if it is not already delivered. Returns `true` when
    /// this call won the claim. Concurrent sweeps race here; exactly one
    /// proceeds to send.
    pub fn claim_delivery(&self, capsule_id: &str) -> CapsuleDbResult<bool> {
        let write_txn = self.db.begin_write()?;
        let claimed = {
            let mut capsules = write_txn.open_table(CAPSULES)?;
            let mut record: StoredCapsule = {
                let existing = capsules
                    .get(capsule_id)?
                    .ok_or_else(|| CapsuleDbError::NotFound(capsule_id.to_string()))?;
                serde_json::from_slice(existing.value())?
            };

            if record.delivered {
                false
            } else {
                record.delivered = true;
                record.status = CapsuleStatus::Delivered;
                record.updated_at = Utc::now();

                let json = serde_json::to_vec(&record)?;
                capsules.insert(capsule_id, json.as_slice())?;

                let mut due = write_txn.open_table(DUE_INDEX)?;
                due.remove(due_key(record.unlock_at, capsule_id).as_slice())?;
                true
            }
        };
        write_txn.commit()?;
        Ok(claimed)
    }

    /// Undo a delivery claim after a failed send so the capsule becomes due
    /// again on the next sweep. No-op if the capsule is not delivered.
    pub fn release_delivery(&self, capsule_id: &str) -> CapsuleDbResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut capsules = write_txn.open_table(CAPSULES)?;
            let mut record: StoredCapsule = {
                let existing = capsules
                    .get(capsule_id)?
                    .ok_or_else(|| CapsuleDbError::NotFound(capsule_id.to_string()))?;
                serde_json::from_slice(existing.value())?
            };

            if record.delivered {
                record.delivered = false;
                record.status = CapsuleStatus::Pending;
                record.updated_at = Utc::now();

                let json = serde_json::to_vec(&record)?;
                capsules.insert(capsule_id, json.as_slice())?;

                let mut due = write_txn.open_table(DUE_INDEX)?;
                due.insert(due_key(record.unlock_at, capsule_id).as_slice(), capsule_id)?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }
}

/// Keep the status tag in lockstep with the delivered flag.
fn normalized(mut record: StoredCapsule) -> StoredCapsule {
    record.status = if record.delivered {
        CapsuleStatus::Delivered
    } else {
        CapsuleStatus::Pending
    };
    record
}

fn insert_index_entries(
    write_txn: &redb::WriteTransaction,
    record: &StoredCapsule,
) -> CapsuleDbResult<()> {
    if !record.delivered {
        let mut due = write_txn.open_table(DUE_INDEX)?;
        due.insert(
            due_key(record.unlock_at, &record.id).as_slice(),
            record.id.as_str(),
        )?;
    }

    let mut owner = write_txn.open_table(OWNER_INDEX)?;
    owner.insert(
        owner_key(&record.owner_user_id, record.unlock_at, &record.id).as_slice(),
        record.id.as_str(),
    )?;

    let mut recipient = write_txn.open_table(RECIPIENT_INDEX)?;
    recipient.insert(
        recipient_key(&record.recipient_index, &record.id).as_slice(),
        record.id.as_str(),
    )?;

    Ok(())
}

fn remove_index_entries(
    write_txn: &redb::WriteTransaction,
    record: &StoredCapsule,
) -> CapsuleDbResult<()> {
    let mut due = write_txn.open_table(DUE_INDEX)?;
    due.remove(due_key(record.unlock_at, &record.id).as_slice())?;

    let mut owner = write_txn.open_table(OWNER_INDEX)?;
    owner.remove(owner_key(&record.owner_user_id, record.unlock_at, &record.id).as_slice())?;

    let mut recipient = write_txn.open_table(RECIPIENT_INDEX)?;
    recipient.remove(recipient_key(&record.recipient_index, &record.id).as_slice())?;

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
