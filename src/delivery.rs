// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GhostPost

//! # Delivery Scheduler
//!
//! Background task that periodically sweeps for due capsules (unlock date
//! passed, not yet delivered), decrypts them, and sends the unlock
//! notification.
//!
//! ## Strategy
//!
//! Every `sweep_interval` (default 60 s) the poller runs one sweep:
//! 1. Query the due index for undelivered capsules with `unlock_at <= now`.
//! 2. For each capsule independently: decrypt, claim, render, send.
//! 3. Report counts (found / delivered / skipped / failed).
//!
//! Sweeps tolerate concurrent invocation (the admin endpoint can overlap
//! the timer): the claim on the `delivered` flag is a compare-and-set inside
//! one database transaction, so only one invocation proceeds to send a given
//! capsule. A failed send releases the claim, leaving the capsule due for
//! the next sweep, giving at-least-once delivery. A capsule whose recipient
//! cannot be decrypted is never claimed: marking it delivered would silently
//! drop the message.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::crypto::FieldCipher;
use crate::notify::{Notifier, UnlockEmailContent, UnlockNotification};
use crate::state::AppState;
use crate::storage::{
    AuditEvent, AuditEventType, AuditRepository, CapsuleDatabase, FileStore, StoredCapsule,
    UserRepository,
};

/// Outcome counts for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SweepReport {
    /// Capsules found due at sweep time.
    pub found: usize,
    /// Capsules marked delivered after a confirmed send.
    pub delivered: usize,
    /// Capsules skipped because required fields would not decrypt.
    pub skipped: usize,
    /// Capsules whose send failed; they stay due and retry next sweep.
    pub failed: usize,
}

/// Background delivery poller.
pub struct DeliveryPoller {
    state: AppState,
    sweep_interval: Duration,
}

impl DeliveryPoller {
    pub fn new(state: AppState, sweep_interval: Duration) -> Self {
        Self {
            state,
            sweep_interval,
        }
    }

    /// Run the poller loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(poller.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.sweep_interval.as_secs(),
            "delivery poller starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("delivery poller shutting down");
                return;
            }

            let report = run_sweep(
                &self.state.capsules,
                &self.state.files,
                &self.state.cipher,
                self.state.notifier.as_ref(),
                self.state.send_timeout,
            )
            .await;

            if report.found > 0 {
                info!(
                    found = report.found,
                    delivered = report.delivered,
                    skipped = report.skipped,
                    failed = report.failed,
                    "delivery sweep complete"
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(self.sweep_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("delivery poller shutting down");
                    return;
                }
            }
        }
    }
}

/// Execute one sweep at the current time.
pub async fn run_sweep(
    capsules: &CapsuleDatabase,
    files: &FileStore,
    cipher: &FieldCipher,
    notifier: &dyn Notifier,
    send_timeout: Duration,
) -> SweepReport {
    run_sweep_at(capsules, files, cipher, notifier, send_timeout, Utc::now()).await
}

/// Execute one sweep against an explicit clock.
///
/// Per-capsule failures never abort the batch; each capsule is processed
/// independently and the loop continues on any outcome.
pub async fn run_sweep_at(
    capsules: &CapsuleDatabase,
    files: &FileStore,
    cipher: &FieldCipher,
    notifier: &dyn Notifier,
    send_timeout: Duration,
    now: DateTime<Utc>,
) -> SweepReport {
    let due = match capsules.list_due(now) {
        Ok(due) => due,
        Err(e) => {
            warn!(error = %e, "delivery sweep: due query failed");
            return SweepReport::default();
        }
    };

    let mut report = SweepReport {
        found: due.len(),
        ..SweepReport::default()
    };
    if due.is_empty() {
        return report;
    }

    for capsule in &due {
        match deliver_one(capsules, files, cipher, notifier, send_timeout, capsule).await {
            DeliveryOutcome::Delivered => report.delivered += 1,
            DeliveryOutcome::Skipped => report.skipped += 1,
            DeliveryOutcome::Failed => report.failed += 1,
            DeliveryOutcome::ClaimLost => {}
        }
    }

    report
}

enum DeliveryOutcome {
    Delivered,
    /// Required fields would not decrypt; left due for a future sweep so the
    /// message is not silently dropped.
    Skipped,
    /// Send failed; claim released, retried next sweep.
    Failed,
    /// A concurrent sweep claimed this capsule first.
    ClaimLost,
}

async fn deliver_one(
    capsules: &CapsuleDatabase,
    files: &FileStore,
    cipher: &FieldCipher,
    notifier: &dyn Notifier,
    send_timeout: Duration,
    capsule: &StoredCapsule,
) -> DeliveryOutcome {
    // Required fields first: a capsule we cannot address or render must not
    // be claimed at all.
    let Some(recipient) = cipher.decrypt_field(&capsule.recipient).into_plaintext() else {
        return skip_undecryptable(files, capsule, "recipient");
    };
    let Some(title) = cipher.decrypt_field(&capsule.title).into_plaintext() else {
        return skip_undecryptable(files, capsule, "title");
    };
    let Some(message) = cipher.decrypt_field(&capsule.message).into_plaintext() else {
        return skip_undecryptable(files, capsule, "message");
    };

    // A broken attachment is logged but does not block the message text.
    let attachment = match &capsule.attachment {
        Some(envelope) => {
            let decrypted = cipher.decrypt_field(envelope).into_plaintext();
            if decrypted.is_none() {
                warn!(
                    capsule_id = %capsule.id,
                    "attachment failed to decrypt; delivering without it"
                );
            }
            decrypted
        }
        None => None,
    };

    // Claim before sending so overlapping sweeps send at most once.
    match capsules.claim_delivery(&capsule.id) {
        Ok(true) => {}
        Ok(false) => return DeliveryOutcome::ClaimLost,
        Err(e) => {
            warn!(capsule_id = %capsule.id, error = %e, "delivery claim failed");
            return DeliveryOutcome::Failed;
        }
    }

    let sender_email = UserRepository::new(files)
        .get(&capsule.owner_user_id)
        .ok()
        .map(|u| u.email)
        .filter(|e| !e.is_empty());

    let content = UnlockEmailContent::new(
        sender_email.as_deref(),
        capsule.created_at,
        &title,
        &message,
        attachment.is_some(),
    );
    let notification = UnlockNotification {
        to: recipient,
        subject: content.subject,
        text: content.text,
        html: content.html,
        attachment,
    };

    let send_result = tokio::time::timeout(send_timeout, notifier.send(&notification)).await;
    match send_result {
        Ok(Ok(())) => {
            info!(capsule_id = %capsule.id, "capsule delivered");
            let _ = AuditRepository::new(files).log(
                &AuditEvent::new(AuditEventType::CapsuleDelivered)
                    .with_resource("capsule", &capsule.id),
            );
            DeliveryOutcome::Delivered
        }
        Ok(Err(e)) => release_after_failure(capsules, files, capsule, &e.to_string()),
        Err(_) => release_after_failure(capsules, files, capsule, "send timed out"),
    }
}

fn skip_undecryptable(
    files: &FileStore,
    capsule: &StoredCapsule,
    field: &'static str,
) -> DeliveryOutcome {
    warn!(
        capsule_id = %capsule.id,
        field,
        "capsule field failed to decrypt; leaving undelivered"
    );
    let _ = AuditRepository::new(files).log(
        &AuditEvent::new(AuditEventType::DeliverySkipped)
            .with_resource("capsule", &capsule.id)
            .failed(format!("{field} failed to decrypt")),
    );
    DeliveryOutcome::Skipped
}

fn release_after_failure(
    capsules: &CapsuleDatabase,
    files: &FileStore,
    capsule: &StoredCapsule,
    reason: &str,
) -> DeliveryOutcome {
    warn!(capsule_id = %capsule.id, reason, "notification send failed; will retry next sweep");

    if let Err(e) = capsules.release_delivery(&capsule.id) {
        // The claim stays in place; operators see both log lines.
        warn!(capsule_id = %capsule.id, error = %e, "failed to release delivery claim");
    }

    let _ = AuditRepository::new(files).log(
        &AuditEvent::new(AuditEventType::DeliveryFailed)
            .with_resource("capsule", &capsule.id)
            .failed(reason),
    );
    DeliveryOutcome::Failed
}

// =============================================================================
// Tests
// =============================================================================
