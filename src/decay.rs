//! Recency decay weighting.
//!
//! Stale content keeps its data but loses ranking influence through a
//! multiplicative weight in [0, 1]. Two curves are supported:
//!
//! - Exponential: weight = 0.5^((age − grace) / half_life) past the grace
//!   period.
//! - Power-law (default, ACT-R / Wixted–Ebbesen): weight = min(1, a·t^(−b))
//!   with t = age − grace. With b = 0.5 the weight halves when elapsed time
//!   quadruples.
//!
//! The grace period is tiered by document category, and age is measured from
//! the last deliberate access when one is recorded — search hits and graph
//! traversal never reset the clock.

use crate::config::DecayConfig;
use chrono::{DateTime, Utc};

/// Decay curve selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecayCurve {
    Exponential,
    PowerLaw,
}

impl DecayCurve {
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("exponential") {
            Self::Exponential
        } else {
            Self::PowerLaw
        }
    }
}

/// Grace-period tier, derived from where a document lives in the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentCategory {
    /// Ephemeral working sessions — shortest grace.
    Session,
    /// Queued workflows — intermediate grace.
    Workflow,
    /// Everything else — longest (default) grace.
    Standard,
}

impl DocumentCategory {
    /// Classify a document by its URI path.
    pub fn from_uri(uri: &str) -> Self {
        let lowered = uri.to_lowercase();
        if lowered.contains("thinking/sequential") {
            Self::Session
        } else if lowered.contains("thinking/workflows") {
            Self::Workflow
        } else {
            Self::Standard
        }
    }
}

/// Exponential decay: 1.0 within the grace period, then halving every
/// `half_life_days` thereafter.
pub fn exponential_weight(age_days: f64, grace_days: i64, half_life_days: i64) -> f64 {
    if age_days < 0.0 {
        return 1.0;
    }
    let grace = grace_days.max(0) as f64;
    if age_days <= grace {
        return 1.0;
    }
    if half_life_days <= 0 {
        return 0.0;
    }
    let exponent = (age_days - grace) / half_life_days as f64;
    0.5f64.powf(exponent).clamp(0.0, 1.0)
}

/// Power-law decay: 1.0 within the grace period, then min(1, a·t^(−b)) where
/// t is days elapsed past the grace period.
pub fn power_law_weight(age_days: f64, grace_days: i64, a: f64, b: f64) -> f64 {
    if age_days < 0.0 {
        return 1.0;
    }
    let grace = grace_days.max(0) as f64;
    if age_days <= grace {
        return 1.0;
    }
    let t = age_days - grace;
    (a * t.powf(-b)).clamp(0.0, 1.0)
}

/// Weight for arbitrary content under the configured curve.
pub fn weight_for_age(config: &DecayConfig, age_days: f64, grace_days: i64) -> f64 {
    match DecayCurve::from_name(&config.curve) {
        DecayCurve::Exponential => {
            exponential_weight(age_days, grace_days, config.half_life_days)
        }
        DecayCurve::PowerLaw => {
            power_law_weight(age_days, grace_days, config.power_law_a, config.power_law_b)
        }
    }
}

/// Decay weight for a document row.
///
/// Age runs from `last_accessed` when recorded (access boosting) else from
/// `created`; with neither timestamp the document is treated as fresh.
/// Status-conditioned overrides: "validated" is permanently exempt,
/// "invalidated" decays aggressively (7-day grace, 14-day half-life).
pub fn document_weight(
    config: &DecayConfig,
    uri: &str,
    status: Option<&str>,
    created: Option<DateTime<Utc>>,
    last_accessed: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> f64 {
    let status = status.map(|s| s.trim().to_lowercase());
    if status.as_deref() == Some("validated") {
        return 1.0;
    }

    let Some(reference) = last_accessed.or(created) else {
        return 1.0;
    };
    let age_days = (now - reference).num_seconds() as f64 / 86_400.0;

    if status.as_deref() == Some("invalidated") {
        return exponential_weight(age_days, 7, 14);
    }

    let grace = match DocumentCategory::from_uri(uri) {
        DocumentCategory::Session => config.grace_days_sessions,
        DocumentCategory::Workflow => config.grace_days_workflows,
        DocumentCategory::Standard => config.grace_days_default,
    };

    weight_for_age(config, age_days, grace)
}
