// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GhostPost

//! Field-level envelope encryption for capsule content at rest.
//!
//! Each sensitive field (title, message, recipient address, attachment) is
//! sealed independently with AES-256-GCM under the server-held key. A fresh
//! random nonce is drawn per field so identical plaintexts never produce
//! correlated ciphertexts across capsules. The nonce travels with the
//! ciphertext as `hex(nonce):hex(ciphertext || tag)` because there is no
//! separate IV channel in the record layout.
//!
//! Decryption never panics or errors across the module boundary: any
//! structural or cryptographic failure yields [`DecryptedField::Unavailable`]
//! and a log line. Callers must treat the sentinel as "content unavailable",
//! never as displayable text.

use hmac::{Hmac, Mac};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

/// Key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// Separator between the nonce and ciphertext halves of an envelope.
const ENVELOPE_SEPARATOR: char = ':';

/// Placeholder shown to the owner when a stored field cannot be decrypted.
pub const UNAVAILABLE_PLACEHOLDER: &str = "[encrypted]";

/// Domain-separation label for deriving the blind-index MAC key.
const INDEX_KEY_LABEL: &[u8] = b"ghostpost/recipient-index/v1";

type HmacSha256 = Hmac<Sha256>;

/// Errors parsing the server encryption key. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key must be {expected} hex characters, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    #[error("key is not valid hex")]
    NotHex,
}

/// Errors sealing a field. Practically unreachable with a valid key, but
/// propagated rather than panicking in request paths.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("failed to draw random nonce")]
    NonceGeneration,

    #[error("AEAD seal failed")]
    SealFailed,
}

/// The server-held 256-bit symmetric key.
///
/// Parsed from hex exactly once at startup; the raw bytes are never logged
/// (the `Debug` impl is redacted).
#[derive(Clone)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    /// Parse a key from its 64-character hex encoding.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        if hex_str.len() != KEY_LEN * 2 {
            return Err(KeyError::WrongLength {
                expected: KEY_LEN * 2,
                actual: hex_str.len(),
            });
        }
        let bytes = hex::decode(hex_str).map_err(|_| KeyError::NotHex)?;
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&bytes);
        Ok(Self(key))
    }

    /// Construct from raw bytes (tests and key rotation tooling).
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Result of decrypting one stored field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptedField {
    /// Successfully recovered plaintext (empty input decrypts to empty).
    Plaintext(String),
    /// The envelope was structurally or cryptographically invalid.
    Unavailable,
}

impl DecryptedField {
    /// The plaintext, or `None` when the field is unavailable.
    pub fn into_plaintext(self) -> Option<String> {
        match self {
            DecryptedField::Plaintext(text) => Some(text),
            DecryptedField::Unavailable => None,
        }
    }

    /// Owner-facing rendering: real content, or a placeholder. Never raw
    /// ciphertext.
    pub fn plaintext_or_placeholder(self) -> String {
        match self {
            DecryptedField::Plaintext(text) => text,
            DecryptedField::Unavailable => UNAVAILABLE_PLACEHOLDER.to_string(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, DecryptedField::Unavailable)
    }
}

/// Symmetric envelope cipher for at-rest field encryption.
///
/// Constructed once at startup from [`EncryptionKey`] and injected where
/// needed; there is no process-wide key singleton.
pub struct FieldCipher {
    key: EncryptionKey,
    /// MAC key for the recipient blind index, derived from the main key with
    /// domain separation so index values cannot be confused with ciphertext.
    index_key: [u8; KEY_LEN],
    rng: SystemRandom,
}

impl FieldCipher {
    pub fn new(key: EncryptionKey) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(key.0);
        hasher.update(INDEX_KEY_LABEL);
        let index_key: [u8; KEY_LEN] = hasher.finalize().into();

        Self {
            key,
            index_key,
            rng: SystemRandom::new(),
        }
    }

    /// Seal one field. Empty input maps to empty output so optional fields
    /// can stay absent without producing a decoy envelope.
    pub fn encrypt_field(&self, plaintext: &str) -> Result<String, CipherError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CipherError::NonceGeneration)?;

        let unbound =
            UnboundKey::new(&AES_256_GCM, &self.key.0).map_err(|_| CipherError::SealFailed)?;
        let sealing_key = LessSafeKey::new(unbound);

        let mut buffer = plaintext.as_bytes().to_vec();
        sealing_key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut buffer,
            )
            .map_err(|_| CipherError::SealFailed)?;

        Ok(format!(
            "{}{}{}",
            hex::encode(nonce_bytes),
            ENVELOPE_SEPARATOR,
            hex::encode(buffer)
        ))
    }

    /// Open one envelope. Returns the sentinel on any failure: missing
    /// separator, bad hex, wrong nonce length, truncated ciphertext, wrong
    /// key, or a tampered tag. Plaintext accidentally passed in lands here
    /// too (no separator / bad hex) and comes back unavailable instead of
    /// being echoed as content.
    pub fn decrypt_field(&self, envelope: &str) -> DecryptedField {
        if envelope.is_empty() {
            return DecryptedField::Plaintext(String::new());
        }

        let Some((nonce_hex, ct_hex)) = envelope.split_once(ENVELOPE_SEPARATOR) else {
            tracing::warn!("field decryption failed: envelope has no separator");
            return DecryptedField::Unavailable;
        };

        let (Ok(nonce_bytes), Ok(mut ct)) = (hex::decode(nonce_hex), hex::decode(ct_hex)) else {
            tracing::warn!("field decryption failed: envelope is not hex");
            return DecryptedField::Unavailable;
        };

        let Ok(nonce_array) = <[u8; NONCE_LEN]>::try_from(nonce_bytes.as_slice()) else {
            tracing::warn!("field decryption failed: bad nonce length");
            return DecryptedField::Unavailable;
        };

        let Ok(unbound) = UnboundKey::new(&AES_256_GCM, &self.key.0) else {
            tracing::warn!("field decryption failed: key rejected");
            return DecryptedField::Unavailable;
        };
        let opening_key = LessSafeKey::new(unbound);

        let plaintext_bytes = match opening_key.open_in_place(
            Nonce::assume_unique_for_key(nonce_array),
            Aad::empty(),
            &mut ct,
        ) {
            Ok(bytes) => bytes,
            Err(_) => {
                tracing::warn!("field decryption failed: authentication failed");
                return DecryptedField::Unavailable;
            }
        };

        match String::from_utf8(plaintext_bytes.to_vec()) {
            Ok(text) => DecryptedField::Plaintext(text),
            Err(_) => {
                tracing::warn!("field decryption failed: plaintext is not UTF-8");
                DecryptedField::Unavailable
            }
        }
    }

    /// Deterministic blind index for a recipient address.
    ///
    /// The address is canonicalized first so `Alice@Example.COM ` and
    /// `alice@example.com` index identically. Used only for equality lookup;
    /// the address itself is stored as ciphertext.
    pub fn recipient_blind_index(&self, address: &str) -> String {
        let canonical = canonicalize_address(address);
        let mut mac = HmacSha256::new_from_slice(&self.index_key)
            .expect("HMAC accepts any key length");
        mac.update(canonical.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Canonical form of a recipient address: NFKC-normalized, trimmed,
/// lowercased.
pub fn canonicalize_address(address: &str) -> String {
    address.trim().nfkc().collect::<String>().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> FieldCipher {
        FieldCipher::new(EncryptionKey::from_bytes([7u8; KEY_LEN]))
    }

    #[test]
    fn key_parses_from_hex() {
        let key = EncryptionKey::from_hex(&"ab".repeat(32)).unwrap();
        assert_eq!(key.0, [0xab; 32]);
    }

    #[test]
    fn key_rejects_wrong_length() {
        let result = EncryptionKey::from_hex("abcd");
        assert!(matches!(
            result,
            Err(KeyError::WrongLength {
                expected: 64,
                actual: 4
            })
        ));
    }

    #[test]
    fn key_rejects_non_hex() {
        let result = EncryptionKey::from_hex(&"zz".repeat(32));
        assert!(matches!(result, Err(KeyError::NotHex)));
    }

    #[test]
    fn round_trip_is_identity() {
        let cipher = test_cipher();
        let envelope = cipher.encrypt_field("a message for the future").unwrap();
        assert_eq!(
            cipher.decrypt_field(&envelope),
            DecryptedField::Plaintext("a message for the future".to_string())
        );
    }

    #[test]
    fn round_trip_survives_separator_in_plaintext() {
        let cipher = test_cipher();
        let plaintext = "see you at 18:30: don't be late ::";
        let envelope = cipher.encrypt_field(plaintext).unwrap();
        assert_eq!(
            cipher.decrypt_field(&envelope),
            DecryptedField::Plaintext(plaintext.to_string())
        );
    }

    #[test]
    fn empty_input_stays_empty() {
        let cipher = test_cipher();
        assert_eq!(cipher.encrypt_field("").unwrap(), "");
        assert_eq!(
            cipher.decrypt_field(""),
            DecryptedField::Plaintext(String::new())
        );
    }

    #[test]
    fn nonces_are_fresh_per_call() {
        let cipher = test_cipher();
        let first = cipher.encrypt_field("same words").unwrap();
        let second = cipher.encrypt_field("same words").unwrap();
        assert_ne!(first, second, "identical plaintexts must not correlate");
    }

    #[test]
    fn tampered_ciphertext_is_unavailable() {
        let cipher = test_cipher();
        let envelope = cipher.encrypt_field("original").unwrap();
        // Flip one ciphertext nibble past the separator.
        let sep = envelope.find(':').unwrap();
        let mut tampered: Vec<char> = envelope.chars().collect();
        let idx = sep + 3;
        tampered[idx] = if tampered[idx] == '0' { '1' } else { '0' };
        let tampered: String = tampered.into_iter().collect();

        assert!(cipher.decrypt_field(&tampered).is_unavailable());
    }

    #[test]
    fn wrong_key_is_unavailable() {
        let cipher = test_cipher();
        let other = FieldCipher::new(EncryptionKey::from_bytes([9u8; KEY_LEN]));
        let envelope = cipher.encrypt_field("secret").unwrap();
        assert!(other.decrypt_field(&envelope).is_unavailable());
    }

    #[test]
    fn plaintext_input_is_unavailable_not_echoed() {
        let cipher = test_cipher();
        assert!(cipher.decrypt_field("never encrypted").is_unavailable());
        // Colon-bearing plaintext is still rejected (invalid hex halves).
        assert!(cipher.decrypt_field("note: hello").is_unavailable());
    }

    #[test]
    fn placeholder_rendering_never_leaks_ciphertext() {
        assert_eq!(
            DecryptedField::Unavailable.plaintext_or_placeholder(),
            UNAVAILABLE_PLACEHOLDER
        );
    }

    #[test]
    fn blind_index_is_deterministic_and_canonical() {
        let cipher = test_cipher();
        let a = cipher.recipient_blind_index("Alice@Example.COM ");
        let b = cipher.recipient_blind_index("alice@example.com");
        assert_eq!(a, b);
        assert_ne!(a, cipher.recipient_blind_index("bob@example.com"));
    }

    #[test]
    fn blind_index_differs_across_keys() {
        let cipher = test_cipher();
        let other = FieldCipher::new(EncryptionKey::from_bytes([9u8; KEY_LEN]));
        assert_ne!(
            cipher.recipient_blind_index("alice@example.com"),
            other.recipient_blind_index("alice@example.com")
        );
    }
}
