// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GhostPost

//! Notification sending for unlocked capsules.
//!
//! The delivery sweep renders a notification and hands it to a [`Notifier`];
//! it neither knows nor cares how delivery is transported. Production uses
//! the SMTP notifier; without SMTP configuration the server falls back to a
//! log-only notifier so development environments still exercise the full
//! delivery path.

pub mod smtp;
pub mod templates;

pub use smtp::SmtpNotifier;
pub use templates::UnlockEmailContent;

use async_trait::async_trait;

/// Notification sending error.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("failed to send notification: {0}")]
    SendFailed(String),

    #[error("invalid notifier configuration: {0}")]
    InvalidConfig(String),
}

/// A rendered notification, ready to hand to a transport.
#[derive(Debug, Clone)]
pub struct UnlockNotification {
    /// Destination address (decrypted recipient).
    pub to: String,
    pub subject: String,
    /// Plaintext body.
    pub text: String,
    /// HTML body.
    pub html: String,
    /// Optional decrypted attachment payload (data URI).
    pub attachment: Option<String>,
}

/// Transport abstraction for delivering notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &UnlockNotification) -> Result<(), NotifyError>;
}

/// Log-only notifier for development and tests of the surrounding plumbing.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &UnlockNotification) -> Result<(), NotifyError> {
        tracing::info!(
            to = %notification.to,
            subject = %notification.subject,
            has_attachment = notification.attachment.is_some(),
            "log-only notifier: skipping real delivery"
        );
        Ok(())
    }
}
