//! # Expiration Policy
//!
//! Decides whether a stored kubeconfig must be issued, rotated, or left alone.
//!
//! A kubeconfig is rotated once `remaining <= validity * fraction`, well before it
//! actually expires, so clock skew and consumers holding the old credential have
//! room to spare. With the default fraction of 0.5 a 24h kubeconfig is rotated
//! after 12h of age.

use crate::provider::StoredCredential;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Required action for a kubeconfig secret
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// No secret exists yet
    CreateNew,
    /// The secret exists but is due for rotation
    RotateNow,
    /// The secret is fresh; look again at the given time
    NoActionNeeded(DateTime<Utc>),
}

/// Decide the action for `existing` at `now`
///
/// `rotation_threshold_fraction` must lie in `(0, 1)`; the next check for a fresh
/// kubeconfig is the moment the threshold is crossed.
///
/// The validity recorded on the secret takes precedence over the configured one. A
/// secret that has no issuance record or lacks the payload is rotated.
pub fn decide(
    now: DateTime<Utc>,
    validity: Duration,
    rotation_threshold_fraction: f64,
    existing: Option<&StoredCredential>,
) -> Action {
    let Some(existing) = existing else {
        return Action::CreateNew;
    };
    let Some(issued_at) = existing.issued_at else {
        return Action::RotateNow;
    };
    if existing.kubeconfig.as_ref().is_none_or(|k| k.is_empty()) {
        return Action::RotateNow;
    }

    let Ok(validity) = chrono::Duration::from_std(existing.validity.unwrap_or(validity)) else {
        return Action::RotateNow;
    };
    let threshold = scale(validity, rotation_threshold_fraction);
    // An unrepresentable expiry means the record is bogus.
    let Some(expires_at) = issued_at.checked_add_signed(validity) else {
        return Action::RotateNow;
    };

    let remaining = expires_at - now;
    if remaining <= threshold {
        Action::RotateNow
    } else {
        Action::NoActionNeeded(expires_at - threshold)
    }
}

/// Time after issuance at which a fresh kubeconfig becomes due
pub fn rotation_delay(validity: Duration, rotation_threshold_fraction: f64) -> Duration {
    validity.mul_f64(1.0 - rotation_threshold_fraction.clamp(0.0, 1.0))
}

fn scale(duration: chrono::Duration, fraction: f64) -> chrono::Duration {
    let millis = duration.num_milliseconds() as f64 * fraction.clamp(0.0, 1.0);
    #[allow(clippy::cast_possible_truncation, reason = "bounded by the input duration")]
    chrono::Duration::milliseconds(millis.round() as i64)
}
