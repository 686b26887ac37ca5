// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GhostPost

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment once at startup via
//! [`Config::from_env`]. A missing or malformed `ENCRYPTION_KEY` is a fatal
//! error: the process refuses to boot rather than fall back to a weak or
//! default key.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for persistent storage | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `ENCRYPTION_KEY` | 64 hex chars (256-bit AES key) | Required |
//! | `AUTH_JWKS_URL` | Identity provider JWKS endpoint | Required for production |
//! | `AUTH_ISSUER` | Expected JWT issuer claim | Optional |
//! | `AUTH_AUDIENCE` | Expected JWT audience claim | Optional |
//! | `SMTP_HOST` | SMTP relay host (unset = log-only delivery) | Optional |
//! | `SMTP_PORT` | SMTP relay port | `587` |
//! | `SMTP_USERNAME` | SMTP username | Optional |
//! | `SMTP_PASSWORD` | SMTP password | Optional |
//! | `SMTP_TLS` | Use TLS for SMTP (`true`/`false`) | `true` |
//! | `MAIL_FROM_ADDRESS` | Sender address for notifications | `no-reply@ghostpost.local` |
//! | `MAIL_FROM_NAME` | Sender display name | `GhostPost Time Keeper` |
//! | `SWEEP_INTERVAL_SECS` | Seconds between delivery sweeps | `60` |
//! | `SEND_TIMEOUT_SECS` | Timeout for a single notification send | `15` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::crypto::{EncryptionKey, KeyError};

/// Environment variable name for the persistent data directory.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Environment variable name for the server-held symmetric encryption key.
pub const ENCRYPTION_KEY_ENV: &str = "ENCRYPTION_KEY";

const DEFAULT_DATA_DIR: &str = "/data";
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_SEND_TIMEOUT_SECS: u64 = 15;

/// Fatal configuration errors. Any of these aborts startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{ENCRYPTION_KEY_ENV} is not set; refusing to start without a key")]
    MissingEncryptionKey,

    #[error("{ENCRYPTION_KEY_ENV} is malformed: {0}")]
    MalformedEncryptionKey(#[from] KeyError),

    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },

    #[error("invalid URL in {var}: {source}")]
    InvalidUrl {
        var: &'static str,
        source: url::ParseError,
    },
}

/// SMTP relay settings for the email notifier.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
}

/// Identity provider settings for JWT verification.
#[derive(Debug, Clone, Default)]
pub struct AuthSettings {
    /// JWKS endpoint. `None` means development mode (no signature checks).
    pub jwks_url: Option<Url>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

/// Fully resolved runtime configuration.
#[derive(Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub encryption_key: EncryptionKey,
    pub auth: AuthSettings,
    pub smtp: Option<SmtpConfig>,
    pub mail_from_address: String,
    pub mail_from_name: String,
    pub sweep_interval: Duration,
    pub send_timeout: Duration,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// Returns an error (treated as fatal by `main`) when the encryption key
    /// is absent or malformed, or when any numeric/URL value fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let key_hex = env::var(ENCRYPTION_KEY_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingEncryptionKey)?;
        let encryption_key = EncryptionKey::from_hex(&key_hex)?;

        let data_dir = env::var(DATA_DIR_ENV)
            .unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string())
            .into();

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parse_env("PORT", 8080)?;

        let auth = AuthSettings {
            jwks_url: parse_optional_url("AUTH_JWKS_URL")?,
            issuer: env::var("AUTH_ISSUER").ok().filter(|v| !v.is_empty()),
            audience: env::var("AUTH_AUDIENCE").ok().filter(|v| !v.is_empty()),
        };

        let smtp = match env::var("SMTP_HOST").ok().filter(|v| !v.is_empty()) {
            Some(smtp_host) => Some(SmtpConfig {
                host: smtp_host,
                port: parse_env("SMTP_PORT", 587)?,
                username: env::var("SMTP_USERNAME").ok().filter(|v| !v.is_empty()),
                password: env::var("SMTP_PASSWORD").ok().filter(|v| !v.is_empty()),
                use_tls: parse_env("SMTP_TLS", true)?,
            }),
            None => None,
        };

        Ok(Self {
            data_dir,
            host,
            port,
            encryption_key,
            auth,
            smtp,
            mail_from_address: env::var("MAIL_FROM_ADDRESS")
                .unwrap_or_else(|_| "no-reply@ghostpost.local".to_string()),
            mail_from_name: env::var("MAIL_FROM_NAME")
                .unwrap_or_else(|_| "GhostPost Time Keeper".to_string()),
            sweep_interval: Duration::from_secs(parse_env(
                "SWEEP_INTERVAL_SECS",
                DEFAULT_SWEEP_INTERVAL_SECS,
            )?),
            send_timeout: Duration::from_secs(parse_env(
                "SEND_TIMEOUT_SECS",
                DEFAULT_SEND_TIMEOUT_SECS,
            )?),
        })
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) if !raw.is_empty() => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
        _ => Ok(default),
    }
}

fn parse_optional_url(var: &'static str) -> Result<Option<Url>, ConfigError> {
    match env::var(var) {
        Ok(raw) if !raw.is_empty() => Url::parse(&raw)
            .map(Some)
            .map_err(|source| ConfigError::InvalidUrl { var, source }),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_env_uses_default_when_unset() {
        let port: u16 = parse_env("GHOSTPOST_TEST_UNSET_PORT", 8080).unwrap();
        assert_eq!(port, 8080);
    }

    #[test]
    fn parse_env_rejects_garbage() {
        std::env::set_var("GHOSTPOST_TEST_BAD_PORT", "not-a-port");
        let result: Result<u16, _> = parse_env("GHOSTPOST_TEST_BAD_PORT", 8080);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
        std::env::remove_var("GHOSTPOST_TEST_BAD_PORT");
    }

    #[test]
    fn optional_url_rejects_malformed() {
        std::env::set_var("GHOSTPOST_TEST_BAD_URL", "not a url");
        let result = parse_optional_url("GHOSTPOST_TEST_BAD_URL");
        assert!(matches!(result, Err(ConfigError::InvalidUrl { .. })));
        std::env::remove_var("GHOSTPOST_TEST_BAD_URL");
    }
}
