// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GhostPost

//! Plan tiers and the limits they grant.
//!
//! Resolution is a pure lookup: no state, no side effects. The payment
//! collaborator changes a user's stored tier; every subsequent resolution
//! reflects the new tier immediately.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Subscription tiers. Unknown or missing tiers resolve to `Traveler`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    /// Free tier.
    Traveler,
    /// Mid tier: more capsules, longer horizon, photo attachments.
    TimeKeeper,
    /// Top tier: unlimited capsules, video attachments.
    TimeLord,
}

impl Default for PlanTier {
    fn default() -> Self {
        PlanTier::Traveler
    }
}

impl PlanTier {
    /// Parse a tier from its wire name (case-insensitive). Unknown names
    /// resolve to the most restrictive tier rather than failing.
    pub fn from_plan_key(key: &str) -> PlanTier {
        match key.to_ascii_lowercase().as_str() {
            "time_keeper" | "timekeeper" => PlanTier::TimeKeeper,
            "time_lord" | "timelord" => PlanTier::TimeLord,
            _ => PlanTier::Traveler,
        }
    }

    /// Resolve the limits this tier grants.
    pub fn limits(self) -> PlanLimits {
        match self {
            PlanTier::Traveler => PlanLimits {
                max_capsules: 3,
                max_horizon_years: 1,
                media_allowed: false,
                video_allowed: false,
                max_media_bytes: 0,
            },
            PlanTier::TimeKeeper => PlanLimits {
                max_capsules: 10,
                max_horizon_years: 10,
                media_allowed: true,
                video_allowed: false,
                max_media_bytes: 5 * 1024 * 1024,
            },
            PlanTier::TimeLord => PlanLimits {
                max_capsules: u32::MAX,
                max_horizon_years: 50,
                media_allowed: true,
                video_allowed: true,
                max_media_bytes: 100 * 1024 * 1024,
            },
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanTier::Traveler => write!(f, "traveler"),
            PlanTier::TimeKeeper => write!(f, "time_keeper"),
            PlanTier::TimeLord => write!(f, "time_lord"),
        }
    }
}

/// Quota and feature limits for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PlanLimits {
    /// Maximum number of capsules a user may own at once.
    pub max_capsules: u32,
    /// How far into the future an unlock date may be set, in calendar years.
    pub max_horizon_years: u32,
    /// Whether any media attachment is allowed.
    pub media_allowed: bool,
    /// Whether video attachments are allowed.
    pub video_allowed: bool,
    /// Ceiling on the decoded attachment size, in bytes.
    pub max_media_bytes: u64,
}

/// Attachment classification, inferred from the payload's leading type
/// marker. `Unknown` is rejected by validation, never treated as an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Unknown,
}

/// Classify an attachment payload by its data-URI prefix.
pub fn classify_media(payload: &str) -> MediaKind {
    if payload.starts_with("data:image/") {
        MediaKind::Image
    } else if payload.starts_with("data:video/") {
        MediaKind::Video
    } else {
        MediaKind::Unknown
    }
}

/// Estimated decoded size of a base64 data-URI payload.
///
/// Returns `None` for payloads without a base64 body (e.g. URLs), where the
/// size cannot be measured server-side. The estimate avoids decoding large
/// payloads just to count bytes.
pub fn estimated_media_bytes(payload: &str) -> Option<u64> {
    let (_, body) = payload.split_once(";base64,")?;
    let padding = body.bytes().rev().take_while(|&b| b == b'=').count() as u64;
    Some(((body.len() as u64 / 4) * 3).saturating_sub(padding))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traveler_is_most_restrictive() {
        let limits = PlanTier::Traveler.limits();
        assert_eq!(limits.max_capsules, 3);
        assert_eq!(limits.max_horizon_years, 1);
        assert!(!limits.media_allowed);
        assert!(!limits.video_allowed);
    }

    #[test]
    fn time_keeper_allows_images_not_video() {
        let limits = PlanTier::TimeKeeper.limits();
        assert_eq!(limits.max_capsules, 10);
        assert_eq!(limits.max_horizon_years, 10);
        assert!(limits.media_allowed);
        assert!(!limits.video_allowed);
        assert_eq!(limits.max_media_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn time_lord_is_effectively_unlimited() {
        let limits = PlanTier::TimeLord.limits();
        assert_eq!(limits.max_capsules, u32::MAX);
        assert!(limits.video_allowed);
    }

    #[test]
    fn unknown_plan_key_defaults_to_traveler() {
        assert_eq!(PlanTier::from_plan_key("TIME_KEEPER"), PlanTier::TimeKeeper);
        assert_eq!(PlanTier::from_plan_key("time_lord"), PlanTier::TimeLord);
        assert_eq!(PlanTier::from_plan_key("enterprise"), PlanTier::Traveler);
        assert_eq!(PlanTier::from_plan_key(""), PlanTier::Traveler);
    }

    #[test]
    fn classify_media_by_prefix() {
        assert_eq!(classify_media("data:image/png;base64,AAAA"), MediaKind::Image);
        assert_eq!(classify_media("data:video/mp4;base64,AAAA"), MediaKind::Video);
        assert_eq!(classify_media("https://cdn.example/x.png"), MediaKind::Unknown);
        assert_eq!(classify_media("data:text/plain;base64,AAAA"), MediaKind::Unknown);
    }

    #[test]
    fn media_size_estimate_tracks_base64_length() {
        // "hello" is aGVsbG8= in base64: 5 decoded bytes.
        assert_eq!(
            estimated_media_bytes("data:image/png;base64,aGVsbG8="),
            Some(5)
        );
        assert_eq!(estimated_media_bytes("https://cdn.example/x.png"), None);
    }
}
