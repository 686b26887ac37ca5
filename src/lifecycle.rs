// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GhostPost

//! Capsule lifecycle: creation validation, the edit/delete lock windows,
//! and decrypted read views.
//!
//! ## Time windows
//!
//! Both windows count down from the same unlock date and are checked
//! independently; the 24-hour delete window fully contains the 1-hour edit
//! window. Comparisons are strict `<` on the locked side, so a capsule at
//! exactly one hour (or exactly 24 hours) before unlock is still mutable.
//! Once the unlock date has passed, edits stay forbidden but deletion is
//! allowed again so delivered capsules can be cleaned up.
//!
//! Every operation has an `*_at(now)` variant taking an explicit clock; the
//! public methods pass `Utc::now()`.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::AuthenticatedUser;
use crate::crypto::{CipherError, FieldCipher};
use crate::entitlements::{
    classify_media, estimated_media_bytes, MediaKind, PlanLimits, PlanTier,
};
use crate::storage::{
    CapsuleDatabase, CapsuleDbError, CapsuleStatus, FileStore, StorageError, StoredCapsule,
    UserRepository,
};

/// Content edits are forbidden in the final hour before unlock.
const EDIT_LOCK_HOURS: i64 = 1;

/// Deletion is forbidden in the final 24 hours before unlock.
const DELETE_LOCK_HOURS: i64 = 24;

/// Everything that can go wrong in a lifecycle operation. Each variant
/// carries a reason specific enough for the presentation layer to render
/// accurately.
#[derive(Debug, thiserror::Error)]
pub enum CapsuleError {
    #[error("required field is missing or empty: {0}")]
    MissingField(&'static str),

    #[error("invalid unlock date: {0}")]
    InvalidDate(String),

    #[error("plan limit reached: the {tier} plan allows at most {max_capsules} capsules")]
    QuotaExceeded { tier: PlanTier, max_capsules: u32 },

    #[error("unlock date too far out: the {tier} plan supports at most {max_years} years ahead")]
    HorizonExceeded { tier: PlanTier, max_years: u32 },

    #[error("media attachments are not available on the {0} plan")]
    MediaNotAllowed(PlanTier),

    #[error("video attachments are not available on the {0} plan")]
    VideoNotAllowed(PlanTier),

    #[error("unrecognized attachment type; expected an image or video data URI")]
    UnknownMediaKind,

    #[error("attachment too large: {actual} bytes exceeds the plan limit of {limit} bytes")]
    MediaTooLarge { actual: u64, limit: u64 },

    #[error("capsule not found: {0}")]
    NotFound(String),

    #[error("capsule belongs to another user")]
    NotOwner,

    #[error("capsule is already unlocked; it can no longer be edited")]
    AlreadyUnlocked,

    #[error("capsule is sealed: editing is disabled in the final hour before release")]
    EditWindowClosed,

    #[error("capsules are locked against deletion in the final 24 hours before release")]
    DeleteWindowClosed,

    #[error("this capsule is sealed until {unlock_at}")]
    Sealed { unlock_at: DateTime<Utc> },

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("encryption failure: {0}")]
    Cipher(String),
}

impl From<CapsuleDbError> for CapsuleError {
    fn from(e: CapsuleDbError) -> Self {
        match e {
            CapsuleDbError::NotFound(id) => CapsuleError::NotFound(id),
            other => CapsuleError::Storage(other.to_string()),
        }
    }
}

impl From<StorageError> for CapsuleError {
    fn from(e: StorageError) -> Self {
        CapsuleError::Storage(e.to_string())
    }
}

impl From<CipherError> for CapsuleError {
    fn from(e: CipherError) -> Self {
        CapsuleError::Cipher(e.to_string())
    }
}

/// Input for creating a capsule. The unlock date arrives as an RFC 3339
/// string and is validated here, not at the serde boundary, so a bad date
/// maps to [`CapsuleError::InvalidDate`] rather than a generic parse error.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewCapsule {
    pub title: String,
    pub message: String,
    pub recipient_email: String,
    /// RFC 3339 timestamp, strictly in the future.
    pub unlock_at: String,
    /// Optional media payload: a `data:image/...` or `data:video/...` URI,
    /// or an opaque URL reference.
    #[serde(default)]
    pub attachment: Option<String>,
}

/// Partial update. Absent fields are left untouched; an empty attachment
/// string clears the attachment.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CapsuleChanges {
    pub title: Option<String>,
    pub message: Option<String>,
    pub recipient_email: Option<String>,
    pub unlock_at: Option<String>,
    pub attachment: Option<String>,
}

/// Decrypted capsule view.
///
/// `recipient_email` is present only for the owner; `sender_email` only for
/// recipient-facing and public views. Fields that fail to decrypt render as
/// a placeholder, never as raw ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CapsuleView {
    pub id: String,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
    pub unlock_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub delivered: bool,
    pub status: CapsuleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_email: Option<String>,
}

/// One entry in the caller's received list. Sealed capsules expose only
/// their arrival time; content fields stay absent until unlock.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReceivedCapsule {
    pub id: String,
    pub unlock_at: DateTime<Utc>,
    pub sealed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_email: Option<String>,
}

/// The capsule state machine. Borrows its collaborators per request; holds
/// no state of its own.
pub struct Lifecycle<'a> {
    capsules: &'a CapsuleDatabase,
    files: &'a FileStore,
    cipher: &'a FieldCipher,
}

impl<'a> Lifecycle<'a> {
    pub fn new(capsules: &'a CapsuleDatabase, files: &'a FileStore, cipher: &'a FieldCipher) -> Self {
        Self {
            capsules,
            files,
            cipher,
        }
    }

    fn users(&self) -> UserRepository<'a> {
        UserRepository::new(self.files)
    }

    // =========================================================================
    // Create
    // =========================================================================

    pub fn create(
        &self,
        caller: &AuthenticatedUser,
        input: NewCapsule,
    ) -> Result<String, CapsuleError> {
        self.create_at(caller, input, Utc::now())
    }

    pub fn create_at(
        &self,
        caller: &AuthenticatedUser,
        input: NewCapsule,
        now: DateTime<Utc>,
    ) -> Result<String, CapsuleError> {
        require_non_empty("title", &input.title)?;
        require_non_empty("message", &input.message)?;
        require_non_empty("recipient_email", &input.recipient_email)?;
        require_non_empty("unlock_at", &input.unlock_at)?;

        let unlock_at = parse_future_date(&input.unlock_at, now)?;

        let user = self.users().get_or_create(&caller.user_id, &caller.email)?;
        let limits = user.plan.limits();

        let owned = self.capsules.count_by_owner(&caller.user_id)?;
        if owned >= limits.max_capsules {
            return Err(CapsuleError::QuotaExceeded {
                tier: user.plan,
                max_capsules: limits.max_capsules,
            });
        }

        check_horizon(unlock_at, now, user.plan, &limits)?;

        let attachment = input.attachment.filter(|a| !a.is_empty());
        if let Some(payload) = &attachment {
            check_attachment(payload, user.plan, &limits)?;
        }

        let id = uuid::Uuid::new_v4().to_string();
        let record = StoredCapsule {
            id: id.clone(),
            owner_user_id: caller.user_id.clone(),
            title: self.cipher.encrypt_field(&input.title)?,
            message: self.cipher.encrypt_field(&input.message)?,
            recipient: self.cipher.encrypt_field(&input.recipient_email)?,
            recipient_index: self.cipher.recipient_blind_index(&input.recipient_email),
            attachment: attachment
                .map(|a| self.cipher.encrypt_field(&a))
                .transpose()?,
            unlock_at,
            created_at: now,
            updated_at: now,
            delivered: false,
            status: CapsuleStatus::Pending,
        };

        self.capsules.create(&record)?;
        Ok(id)
    }

    // =========================================================================
    // Update
    // =========================================================================

    pub fn update(
        &self,
        caller: &AuthenticatedUser,
        capsule_id: &str,
        changes: CapsuleChanges,
    ) -> Result<(), CapsuleError> {
        self.update_at(caller, capsule_id, changes, Utc::now())
    }

    pub fn update_at(
        &self,
        caller: &AuthenticatedUser,
        capsule_id: &str,
        changes: CapsuleChanges,
        now: DateTime<Utc>,
    ) -> Result<(), CapsuleError> {
        let mut record = self.get_owned(caller, capsule_id)?;

        let until_unlock = record.unlock_at.signed_duration_since(now);
        if until_unlock <= Duration::zero() {
            return Err(CapsuleError::AlreadyUnlocked);
        }
        if until_unlock < Duration::hours(EDIT_LOCK_HOURS) {
            return Err(CapsuleError::EditWindowClosed);
        }

        // Changed fields are re-validated against the owner's *current* tier,
        // not the tier at creation time.
        let user = self.users().get_or_create(&caller.user_id, &caller.email)?;
        let limits = user.plan.limits();

        if let Some(title) = &changes.title {
            require_non_empty("title", title)?;
            record.title = self.cipher.encrypt_field(title)?;
        }
        if let Some(message) = &changes.message {
            require_non_empty("message", message)?;
            record.message = self.cipher.encrypt_field(message)?;
        }
        if let Some(recipient) = &changes.recipient_email {
            require_non_empty("recipient_email", recipient)?;
            record.recipient = self.cipher.encrypt_field(recipient)?;
            record.recipient_index = self.cipher.recipient_blind_index(recipient);
        }
        if let Some(raw_unlock) = &changes.unlock_at {
            require_non_empty("unlock_at", raw_unlock)?;
            let unlock_at = parse_future_date(raw_unlock, now)?;
            check_horizon(unlock_at, now, user.plan, &limits)?;
            record.unlock_at = unlock_at;
        }
        if let Some(payload) = changes.attachment {
            if payload.is_empty() {
                record.attachment = None;
            } else {
                check_attachment(&payload, user.plan, &limits)?;
                record.attachment = Some(self.cipher.encrypt_field(&payload)?);
            }
        }

        record.updated_at = now;
        self.capsules.update(&record)?;
        Ok(())
    }

    // =========================================================================
    // Delete
    // =========================================================================

    pub fn delete(
        &self,
        caller: &AuthenticatedUser,
        capsule_id: &str,
    ) -> Result<(), CapsuleError> {
        self.delete_at(caller, capsule_id, Utc::now())
    }

    pub fn delete_at(
        &self,
        caller: &AuthenticatedUser,
        capsule_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CapsuleError> {
        let record = self.get_owned(caller, capsule_id)?;

        // Locked only while counting down; once unlocked, cleanup is allowed.
        let until_unlock = record.unlock_at.signed_duration_since(now);
        if until_unlock > Duration::zero() && until_unlock < Duration::hours(DELETE_LOCK_HOURS) {
            return Err(CapsuleError::DeleteWindowClosed);
        }

        self.capsules.delete(capsule_id)?;
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Decrypted view for an authenticated caller: the owner any time, a
    /// matching recipient once unlocked.
    pub fn read(
        &self,
        caller: &AuthenticatedUser,
        capsule_id: &str,
    ) -> Result<CapsuleView, CapsuleError> {
        self.read_at(caller, capsule_id, Utc::now())
    }

    pub fn read_at(
        &self,
        caller: &AuthenticatedUser,
        capsule_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CapsuleView, CapsuleError> {
        let record = self
            .capsules
            .get(capsule_id)?
            .ok_or_else(|| CapsuleError::NotFound(capsule_id.to_string()))?;

        if record.owner_user_id == caller.user_id {
            return Ok(self.owner_view(&record));
        }

        let caller_index = self.cipher.recipient_blind_index(&caller.email);
        if !caller.email.is_empty() && caller_index == record.recipient_index {
            if now < record.unlock_at {
                return Err(CapsuleError::Sealed {
                    unlock_at: record.unlock_at,
                });
            }
            return Ok(self.unlocked_view(&record));
        }

        Err(CapsuleError::NotOwner)
    }

    /// All capsules owned by the caller, decrypted for the owner.
    pub fn list_owned(
        &self,
        caller: &AuthenticatedUser,
    ) -> Result<Vec<CapsuleView>, CapsuleError> {
        let records = self.capsules.list_by_owner(&caller.user_id)?;
        Ok(records.iter().map(|r| self.owner_view(r)).collect())
    }

    /// All capsules addressed to the caller's email. Sealed entries expose
    /// only id and arrival time.
    pub fn list_received(
        &self,
        caller: &AuthenticatedUser,
    ) -> Result<Vec<ReceivedCapsule>, CapsuleError> {
        self.list_received_at(caller, Utc::now())
    }

    pub fn list_received_at(
        &self,
        caller: &AuthenticatedUser,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReceivedCapsule>, CapsuleError> {
        if caller.email.is_empty() {
            return Ok(Vec::new());
        }

        let index = self.cipher.recipient_blind_index(&caller.email);
        let records = self.capsules.list_by_recipient(&index)?;

        Ok(records
            .iter()
            .map(|record| {
                if now < record.unlock_at {
                    ReceivedCapsule {
                        id: record.id.clone(),
                        unlock_at: record.unlock_at,
                        sealed: true,
                        title: None,
                        message: None,
                        attachment: None,
                        sender_email: None,
                    }
                } else {
                    let view = self.unlocked_view(record);
                    ReceivedCapsule {
                        id: view.id,
                        unlock_at: view.unlock_at,
                        sealed: false,
                        title: Some(view.title),
                        message: Some(view.message),
                        attachment: view.attachment,
                        sender_email: view.sender_email,
                    }
                }
            })
            .collect())
    }

    /// Unauthenticated, time-gated view for shared links. Deliberately a
    /// lower-trust channel than the authenticated recipient path: anyone
    /// holding the link can read the capsule once it unlocks.
    pub fn public_view(&self, capsule_id: &str) -> Result<CapsuleView, CapsuleError> {
        self.public_view_at(capsule_id, Utc::now())
    }

    pub fn public_view_at(
        &self,
        capsule_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CapsuleView, CapsuleError> {
        let record = self
            .capsules
            .get(capsule_id)?
            .ok_or_else(|| CapsuleError::NotFound(capsule_id.to_string()))?;

        if now < record.unlock_at {
            return Err(CapsuleError::Sealed {
                unlock_at: record.unlock_at,
            });
        }

        Ok(self.unlocked_view(&record))
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn get_owned(
        &self,
        caller: &AuthenticatedUser,
        capsule_id: &str,
    ) -> Result<StoredCapsule, CapsuleError> {
        let record = self
            .capsules
            .get(capsule_id)?
            .ok_or_else(|| CapsuleError::NotFound(capsule_id.to_string()))?;
        if record.owner_user_id != caller.user_id {
            return Err(CapsuleError::NotOwner);
        }
        Ok(record)
    }

    fn owner_view(&self, record: &StoredCapsule) -> CapsuleView {
        CapsuleView {
            id: record.id.clone(),
            title: self
                .cipher
                .decrypt_field(&record.title)
                .plaintext_or_placeholder(),
            message: self
                .cipher
                .decrypt_field(&record.message)
                .plaintext_or_placeholder(),
            recipient_email: Some(
                self.cipher
                    .decrypt_field(&record.recipient)
                    .plaintext_or_placeholder(),
            ),
            attachment: record
                .attachment
                .as_ref()
                .and_then(|a| self.cipher.decrypt_field(a).into_plaintext()),
            unlock_at: record.unlock_at,
            created_at: record.created_at,
            delivered: record.delivered,
            status: record.status,
            sender_email: None,
        }
    }

    fn unlocked_view(&self, record: &StoredCapsule) -> CapsuleView {
        let sender_email = UserRepository::new(self.files)
            .get(&record.owner_user_id)
            .ok()
            .map(|u| u.email)
            .filter(|e| !e.is_empty());

        CapsuleView {
            id: record.id.clone(),
            title: self
                .cipher
                .decrypt_field(&record.title)
                .plaintext_or_placeholder(),
            message: self
                .cipher
                .decrypt_field(&record.message)
                .plaintext_or_placeholder(),
            recipient_email: None,
            attachment: record
                .attachment
                .as_ref()
                .and_then(|a| self.cipher.decrypt_field(a).into_plaintext()),
            unlock_at: record.unlock_at,
            created_at: record.created_at,
            delivered: record.delivered,
            status: record.status,
            sender_email,
        }
    }
}

// =============================================================================
// Validation helpers
// =============================================================================

fn require_non_empty(field: &'static str, value: &str) -> Result<(), CapsuleError> {
    if value.trim().is_empty() {
        Err(CapsuleError::MissingField(field))
    } else {
        Ok(())
    }
}

/// Parse an RFC 3339 timestamp and require it to be strictly in the future.
fn parse_future_date(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, CapsuleError> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| CapsuleError::InvalidDate(format!("could not parse '{raw}'")))?;

    if parsed <= now {
        return Err(CapsuleError::InvalidDate(
            "unlock date must be in the future".to_string(),
        ));
    }
    Ok(parsed)
}

fn check_horizon(
    unlock_at: DateTime<Utc>,
    now: DateTime<Utc>,
    tier: PlanTier,
    limits: &PlanLimits,
) -> Result<(), CapsuleError> {
    let horizon = now
        .checked_add_months(Months::new(limits.max_horizon_years * 12))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    if unlock_at > horizon {
        return Err(CapsuleError::HorizonExceeded {
            tier,
            max_years: limits.max_horizon_years,
        });
    }
    Ok(())
}

fn check_attachment(
    payload: &str,
    tier: PlanTier,
    limits: &PlanLimits,
) -> Result<(), CapsuleError> {
    match classify_media(payload) {
        MediaKind::Unknown => return Err(CapsuleError::UnknownMediaKind),
        MediaKind::Image => {
            if !limits.media_allowed {
                return Err(CapsuleError::MediaNotAllowed(tier));
            }
        }
        MediaKind::Video => {
            if !limits.media_allowed {
                return Err(CapsuleError::MediaNotAllowed(tier));
            }
            if !limits.video_allowed {
                return Err(CapsuleError::VideoNotAllowed(tier));
            }
        }
    }

    if let Some(actual) = estimated_media_bytes(payload) {
        if actual > limits.max_media_bytes {
            return Err(CapsuleError::MediaTooLarge {
                actual,
                limit: limits.max_media_bytes,
            });
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::crypto::{EncryptionKey, UNAVAILABLE_PLACEHOLDER};
    use crate::storage::StoragePaths;

    struct TestEnv {
        _dir: tempfile::TempDir,
        files: FileStore,
        capsules: CapsuleDatabase,
        cipher: FieldCipher,
    }

    impl TestEnv {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let mut files = FileStore::new(StoragePaths::new(dir.path()));
            files.initialize().unwrap();
            let capsules = CapsuleDatabase::open(&files.paths().capsule_db()).unwrap();
            let cipher = FieldCipher::new(EncryptionKey::from_bytes([3u8; 32]));
            Self {
                _dir: dir,
                files,
                capsules,
                cipher,
            }
        }

        fn lifecycle(&self) -> Lifecycle<'_> {
            Lifecycle::new(&self.capsules, &self.files, &self.cipher)
        }

        fn users(&self) -> UserRepository<'_> {
            UserRepository::new(&self.files)
        }
    }

    fn user(id: &str, email: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: id.to_string(),
            email: email.to_string(),
            role: Role::Member,
            session_id: None,
        }
    }

    fn valid_input(unlock_at: DateTime<Utc>) -> NewCapsule {
        NewCapsule {
            title: "To future me".to_string(),
            message: "Remember the summer of 2026".to_string(),
            recipient_email: "Recipient@Example.com".to_string(),
            unlock_at: unlock_at.to_rfc3339(),
            attachment: None,
        }
    }

    #[test]
    fn create_then_read_round_trips_plaintext() {
        let env = TestEnv::new();
        let lifecycle = env.lifecycle();
        let owner = user("owner-1", "owner@example.com");
        let now = Utc::now();

        let id = lifecycle
            .create_at(&owner, valid_input(now + Duration::days(7)), now)
            .unwrap();

        let view = lifecycle.read_at(&owner, &id, now).unwrap();
        assert_eq!(view.title, "To future me");
        assert_eq!(view.message, "Remember the summer of 2026");
        assert_eq!(
            view.recipient_email.as_deref(),
            Some("Recipient@Example.com")
        );
        assert!(!view.delivered);
        assert_eq!(view.status, CapsuleStatus::Pending);

        // At rest the fields are ciphertext, not the inputs.
        let stored = env.capsules.get(&id).unwrap().unwrap();
        assert_ne!(stored.title, "To future me");
        assert!(stored.title.contains(':'));
    }

    #[test]
    fn create_rejects_empty_fields() {
        let env = TestEnv::new();
        let lifecycle = env.lifecycle();
        let owner = user("owner-1", "owner@example.com");
        let now = Utc::now();

        let mut input = valid_input(now + Duration::days(1));
        input.title = "  ".to_string();
        assert!(matches!(
            lifecycle.create_at(&owner, input, now),
            Err(CapsuleError::MissingField("title"))
        ));

        let mut input = valid_input(now + Duration::days(1));
        input.recipient_email = String::new();
        assert!(matches!(
            lifecycle.create_at(&owner, input, now),
            Err(CapsuleError::MissingField("recipient_email"))
        ));
    }

    #[test]
    fn create_requires_strictly_future_unlock() {
        let env = TestEnv::new();
        let lifecycle = env.lifecycle();
        let owner = user("owner-1", "owner@example.com");
        let now = Utc::now();

        // Past.
        let input = valid_input(now - Duration::hours(1));
        assert!(matches!(
            lifecycle.create_at(&owner, input, now),
            Err(CapsuleError::InvalidDate(_))
        ));

        // Exactly now is not in the future.
        let input = valid_input(now);
        assert!(matches!(
            lifecycle.create_at(&owner, input, now),
            Err(CapsuleError::InvalidDate(_))
        ));

        // Garbage.
        let mut input = valid_input(now + Duration::days(1));
        input.unlock_at = "next tuesday".to_string();
        assert!(matches!(
            lifecycle.create_at(&owner, input, now),
            Err(CapsuleError::InvalidDate(_))
        ));
    }

    #[test]
    fn quota_is_enforced_at_the_boundary() {
        let env = TestEnv::new();
        let lifecycle = env.lifecycle();
        let owner = user("owner-1", "owner@example.com");
        let now = Utc::now();

        // Traveler allows 3 capsules.
        for _ in 0..3 {
            lifecycle
                .create_at(&owner, valid_input(now + Duration::days(1)), now)
                .unwrap();
        }

        let result = lifecycle.create_at(&owner, valid_input(now + Duration::days(1)), now);
        assert!(matches!(
            result,
            Err(CapsuleError::QuotaExceeded {
                max_capsules: 3,
                ..
            })
        ));
    }

    #[test]
    fn horizon_is_enforced_per_tier() {
        let env = TestEnv::new();
        let lifecycle = env.lifecycle();
        let owner = user("owner-1", "owner@example.com");
        let now = Utc::now();

        // Traveler: one year.
        let result = lifecycle.create_at(&owner, valid_input(now + Duration::days(400)), now);
        assert!(matches!(
            result,
            Err(CapsuleError::HorizonExceeded { max_years: 1, .. })
        ));

        // TimeKeeper: ten years is enough for 400 days.
        env.users()
            .set_plan_tier("owner-1", PlanTier::TimeKeeper)
            .unwrap();
        lifecycle
            .create_at(&owner, valid_input(now + Duration::days(400)), now)
            .unwrap();
    }

    #[test]
    fn media_rules_follow_the_tier() {
        let env = TestEnv::new();
        let lifecycle = env.lifecycle();
        let owner = user("owner-1", "owner@example.com");
        let now = Utc::now();

        let image = Some("data:image/png;base64,aGVsbG8=".to_string());
        let video = Some("data:video/mp4;base64,aGVsbG8=".to_string());

        // Traveler: no media at all.
        let mut input = valid_input(now + Duration::days(1));
        input.attachment = image.clone();
        assert!(matches!(
            lifecycle.create_at(&owner, input, now),
            Err(CapsuleError::MediaNotAllowed(PlanTier::Traveler))
        ));

        // TimeKeeper: images yes, video no.
        env.users()
            .set_plan_tier("owner-1", PlanTier::TimeKeeper)
            .unwrap();
        let mut input = valid_input(now + Duration::days(1));
        input.attachment = image.clone();
        lifecycle.create_at(&owner, input, now).unwrap();

        let mut input = valid_input(now + Duration::days(1));
        input.attachment = video.clone();
        assert!(matches!(
            lifecycle.create_at(&owner, input, now),
            Err(CapsuleError::VideoNotAllowed(PlanTier::TimeKeeper))
        ));

        // Unknown payloads are rejected, never treated as images.
        let mut input = valid_input(now + Duration::days(1));
        input.attachment = Some("data:text/plain;base64,aGVsbG8=".to_string());
        assert!(matches!(
            lifecycle.create_at(&owner, input, now),
            Err(CapsuleError::UnknownMediaKind)
        ));

        // TimeLord: video allowed.
        env.users()
            .set_plan_tier("owner-1", PlanTier::TimeLord)
            .unwrap();
        let mut input = valid_input(now + Duration::days(1));
        input.attachment = video;
        lifecycle.create_at(&owner, input, now).unwrap();
    }

    #[test]
    fn oversized_media_is_rejected_server_side() {
        let env = TestEnv::new();
        let lifecycle = env.lifecycle();
        let owner = user("owner-1", "owner@example.com");
        let now = Utc::now();

        env.users()
            .set_plan_tier("owner-1", PlanTier::TimeKeeper)
            .unwrap();

        // ~6 MiB of base64 exceeds the 5 MiB TimeKeeper ceiling.
        let body = "A".repeat(8 * 1024 * 1024);
        let mut input = valid_input(now + Duration::days(1));
        input.attachment = Some(format!("data:image/png;base64,{body}"));
        assert!(matches!(
            lifecycle.create_at(&owner, input, now),
            Err(CapsuleError::MediaTooLarge { .. })
        ));
    }

    #[test]
    fn edit_window_boundaries_are_strict() {
        let env = TestEnv::new();
        let lifecycle = env.lifecycle();
        let owner = user("owner-1", "owner@example.com");
        let now = Utc::now();
        let unlock = now + Duration::hours(2);

        let id = lifecycle.create_at(&owner, valid_input(unlock), now).unwrap();
        let retitle = CapsuleChanges {
            title: Some("Updated".to_string()),
            ..Default::default()
        };

        // 61 minutes out: allowed.
        lifecycle
            .update_at(&owner, &id, retitle.clone(), unlock - Duration::minutes(61))
            .unwrap();

        // Exactly one hour out: still allowed (strict `<`).
        lifecycle
            .update_at(&owner, &id, retitle.clone(), unlock - Duration::minutes(60))
            .unwrap();

        // 59 minutes out: sealed.
        assert!(matches!(
            lifecycle.update_at(&owner, &id, retitle.clone(), unlock - Duration::minutes(59)),
            Err(CapsuleError::EditWindowClosed)
        ));

        // Past unlock: a different, terminal answer.
        assert!(matches!(
            lifecycle.update_at(&owner, &id, retitle, unlock + Duration::seconds(1)),
            Err(CapsuleError::AlreadyUnlocked)
        ));
    }

    #[test]
    fn delete_window_boundaries_are_strict() {
        let env = TestEnv::new();
        let lifecycle = env.lifecycle();
        let owner = user("owner-1", "owner@example.com");
        let now = Utc::now();
        let unlock = now + Duration::days(7);

        let id = lifecycle.create_at(&owner, valid_input(unlock), now).unwrap();

        // 23h59m out: locked.
        assert!(matches!(
            lifecycle.delete_at(&owner, &id, unlock - Duration::minutes(23 * 60 + 59)),
            Err(CapsuleError::DeleteWindowClosed)
        ));

        // Exactly 24h out: still allowed (strict `<`).
        lifecycle
            .delete_at(&owner, &id, unlock - Duration::hours(24))
            .unwrap();

        // Recreate; 24h01m out is also allowed.
        let id = lifecycle.create_at(&owner, valid_input(unlock), now).unwrap();
        lifecycle
            .delete_at(&owner, &id, unlock - Duration::minutes(24 * 60 + 1))
            .unwrap();

        // Recreate; post-unlock cleanup is allowed again.
        let id = lifecycle.create_at(&owner, valid_input(unlock), now).unwrap();
        lifecycle
            .delete_at(&owner, &id, unlock + Duration::seconds(1))
            .unwrap();
        assert!(env.capsules.get(&id).unwrap().is_none());
    }

    #[test]
    fn only_the_owner_may_mutate() {
        let env = TestEnv::new();
        let lifecycle = env.lifecycle();
        let owner = user("owner-1", "owner@example.com");
        let stranger = user("stranger", "stranger@example.com");
        let now = Utc::now();

        let id = lifecycle
            .create_at(&owner, valid_input(now + Duration::days(7)), now)
            .unwrap();

        let changes = CapsuleChanges {
            title: Some("hijacked".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            lifecycle.update_at(&stranger, &id, changes, now),
            Err(CapsuleError::NotOwner)
        ));
        assert!(matches!(
            lifecycle.delete_at(&stranger, &id, now),
            Err(CapsuleError::NotOwner)
        ));
        assert!(matches!(
            lifecycle.update_at(
                &owner,
                "no-such-id",
                CapsuleChanges::default(),
                now
            ),
            Err(CapsuleError::NotFound(_))
        ));
    }

    #[test]
    fn update_revalidates_against_current_tier() {
        let env = TestEnv::new();
        let lifecycle = env.lifecycle();
        let owner = user("owner-1", "owner@example.com");
        let now = Utc::now();

        let id = lifecycle
            .create_at(&owner, valid_input(now + Duration::days(30)), now)
            .unwrap();

        // Traveler cannot push the unlock date past one year.
        let changes = CapsuleChanges {
            unlock_at: Some((now + Duration::days(400)).to_rfc3339()),
            ..Default::default()
        };
        assert!(matches!(
            lifecycle.update_at(&owner, &id, changes.clone(), now),
            Err(CapsuleError::HorizonExceeded { .. })
        ));

        // After an upgrade the same change is accepted.
        env.users()
            .set_plan_tier("owner-1", PlanTier::TimeKeeper)
            .unwrap();
        lifecycle.update_at(&owner, &id, changes, now).unwrap();
    }

    #[test]
    fn recipient_reads_are_gated_on_unlock() {
        let env = TestEnv::new();
        let lifecycle = env.lifecycle();
        let owner = user("owner-1", "owner@example.com");
        let recipient = user("rcpt-1", "recipient@example.com");
        let stranger = user("stranger", "stranger@example.com");
        let now = Utc::now();
        let unlock = now + Duration::hours(2);

        let id = lifecycle.create_at(&owner, valid_input(unlock), now).unwrap();

        // Sealed for the recipient before unlock (address matching is
        // case-insensitive through the blind index).
        assert!(matches!(
            lifecycle.read_at(&recipient, &id, now),
            Err(CapsuleError::Sealed { .. })
        ));

        // Readable after unlock, without the recipient_email field.
        let view = lifecycle
            .read_at(&recipient, &id, unlock + Duration::seconds(1))
            .unwrap();
        assert_eq!(view.title, "To future me");
        assert!(view.recipient_email.is_none());
        assert_eq!(view.sender_email.as_deref(), Some("owner@example.com"));

        // A stranger is rejected both before and after unlock.
        assert!(matches!(
            lifecycle.read_at(&stranger, &id, unlock + Duration::hours(1)),
            Err(CapsuleError::NotOwner)
        ));
    }

    #[test]
    fn public_view_is_purely_time_gated() {
        let env = TestEnv::new();
        let lifecycle = env.lifecycle();
        let owner = user("owner-1", "owner@example.com");
        let now = Utc::now();
        let unlock = now + Duration::hours(2);

        let id = lifecycle.create_at(&owner, valid_input(unlock), now).unwrap();

        assert!(matches!(
            lifecycle.public_view_at(&id, now),
            Err(CapsuleError::Sealed { .. })
        ));
        assert!(matches!(
            lifecycle.public_view_at("missing", now),
            Err(CapsuleError::NotFound(_))
        ));

        let view = lifecycle
            .public_view_at(&id, unlock + Duration::seconds(1))
            .unwrap();
        assert_eq!(view.message, "Remember the summer of 2026");
        assert!(view.recipient_email.is_none());
    }

    #[test]
    fn received_list_hides_sealed_content() {
        let env = TestEnv::new();
        let lifecycle = env.lifecycle();
        let owner = user("owner-1", "owner@example.com");
        let recipient = user("rcpt-1", "recipient@example.com");
        let now = Utc::now();

        let mut sealed_input = valid_input(now + Duration::days(2));
        sealed_input.title = "Sealed one".to_string();
        lifecycle.create_at(&owner, sealed_input, now).unwrap();

        let mut open_input = valid_input(now + Duration::hours(1));
        open_input.title = "Open one".to_string();
        lifecycle.create_at(&owner, open_input, now).unwrap();

        let later = now + Duration::hours(1) + Duration::seconds(1);
        let received = lifecycle.list_received_at(&recipient, later).unwrap();
        assert_eq!(received.len(), 2);

        let sealed = received.iter().find(|r| r.sealed).unwrap();
        assert!(sealed.title.is_none());
        assert!(sealed.message.is_none());

        let open = received.iter().find(|r| !r.sealed).unwrap();
        assert_eq!(open.title.as_deref(), Some("Open one"));
    }

    #[test]
    fn corrupted_field_renders_placeholder_for_owner() {
        let env = TestEnv::new();
        let lifecycle = env.lifecycle();
        let owner = user("owner-1", "owner@example.com");
        let now = Utc::now();

        let id = lifecycle
            .create_at(&owner, valid_input(now + Duration::days(1)), now)
            .unwrap();

        // Corrupt the stored title envelope.
        let mut record = env.capsules.get(&id).unwrap().unwrap();
        record.title = "not-an-envelope".to_string();
        env.capsules.update(&record).unwrap();

        let view = lifecycle.read_at(&owner, &id, now).unwrap();
        assert_eq!(view.title, UNAVAILABLE_PLACEHOLDER);
        // Untouched fields still decrypt.
        assert_eq!(view.message, "Remember the summer of 2026");
    }
}
