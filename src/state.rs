// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GhostPost

//! Shared application state.
//!
//! Everything the handlers and the delivery poller need, constructed once in
//! `main` and cloned cheaply (all members are behind `Arc`). There are no
//! process-wide singletons: the cipher, notifier, and stores are explicit
//! members injected at construction time.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::JwksManager;
use crate::crypto::FieldCipher;
use crate::lifecycle::Lifecycle;
use crate::notify::Notifier;
use crate::storage::{CapsuleDatabase, FileStore};

/// Identity provider configuration used by the Auth extractor.
pub struct AuthConfig {
    /// `None` selects development mode (no signature verification).
    pub jwks: Option<JwksManager>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub files: Arc<FileStore>,
    pub capsules: Arc<CapsuleDatabase>,
    pub cipher: Arc<FieldCipher>,
    pub notifier: Arc<dyn Notifier>,
    pub auth_config: Arc<AuthConfig>,
    /// Bound on a single notification send; a timeout counts as a failure.
    pub send_timeout: Duration,
}

impl AppState {
    pub fn new(
        files: FileStore,
        capsules: CapsuleDatabase,
        cipher: FieldCipher,
        notifier: Arc<dyn Notifier>,
        auth_config: AuthConfig,
        send_timeout: Duration,
    ) -> Self {
        Self {
            files: Arc::new(files),
            capsules: Arc::new(capsules),
            cipher: Arc::new(cipher),
            notifier,
            auth_config: Arc::new(auth_config),
            send_timeout,
        }
    }

    /// Lifecycle manager borrowing this state's collaborators.
    pub fn lifecycle(&self) -> Lifecycle<'_> {
        Lifecycle::new(&self.capsules, &self.files, &self.cipher)
    }

    /// Fully wired state on a temp directory, in development auth mode.
    #[cfg(test)]
    pub fn for_tests() -> (Self, tempfile::TempDir) {
        use crate::crypto::EncryptionKey;
        use crate::notify::LogNotifier;
        use crate::storage::StoragePaths;

        let dir = tempfile::tempdir().expect("temp dir");
        let mut files = FileStore::new(StoragePaths::new(dir.path()));
        files.initialize().expect("init storage");
        let capsules =
            CapsuleDatabase::open(&files.paths().capsule_db()).expect("open capsule db");
        let cipher = FieldCipher::new(EncryptionKey::from_bytes([11u8; 32]));

        let state = Self::new(
            files,
            capsules,
            cipher,
            Arc::new(LogNotifier),
            AuthConfig {
                jwks: None,
                issuer: Some("test".to_string()),
                audience: None,
            },
            Duration::from_secs(5),
        );
        (state, dir)
    }
}
