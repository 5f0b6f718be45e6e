//! # Validation
//!
//! Validates duration strings used in controller configuration.

use anyhow::Result;
use regex::Regex;
use std::time::Duration;

/// Parse Kubernetes duration string into std::time::Duration
/// Supports formats: "30s", "10m", "12h", "1d"
pub fn parse_kubernetes_duration(duration_str: &str) -> Result<Duration> {
    let duration_trimmed = duration_str.trim();

    if duration_trimmed.is_empty() {
        return Err(anyhow::anyhow!("Duration string cannot be empty"));
    }

    let duration_regex = Regex::new(r"^(?P<number>\d+)(?P<unit>[smhd])$")
        .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?;

    let interval_lower = duration_trimmed.to_lowercase();

    let captures = duration_regex
        .captures(&interval_lower)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Invalid duration format '{}'. Expected format: <number><unit> (e.g., '30m', '12h', '1d')",
                duration_trimmed
            )
        })?;

    let number: u64 = captures["number"].parse().map_err(|e| {
        anyhow::anyhow!(
            "Invalid duration number '{}' in '{}': {}",
            &captures["number"],
            duration_trimmed,
            e
        )
    })?;

    if number == 0 {
        return Err(anyhow::anyhow!(
            "Duration number must be greater than 0, got '{}'",
            duration_trimmed
        ));
    }

    let multiplier = match &captures["unit"] {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        unit => {
            return Err(anyhow::anyhow!(
                "Invalid unit '{}' in duration '{}'. Expected: s, m, h, or d",
                unit,
                duration_trimmed
            ));
        }
    };

    let seconds = number.checked_mul(multiplier).ok_or_else(|| {
        anyhow::anyhow!("Duration '{}' is too large", duration_trimmed)
    })?;

    Ok(Duration::from_secs(seconds))
}

/// Validate duration string format and minimum value
///
/// # Arguments
/// * `interval` - The duration string to validate
/// * `field_name` - Name of the field for error messages
/// * `min_seconds` - Minimum allowed duration in seconds
pub fn validate_duration_interval(
    interval: &str,
    field_name: &str,
    min_seconds: u64,
) -> Result<()> {
    let interval_trimmed = interval.trim();

    if interval_trimmed.is_empty() {
        return Err(anyhow::anyhow!("{field_name} cannot be empty"));
    }

    let duration = parse_kubernetes_duration(interval_trimmed)
        .map_err(|e| anyhow::anyhow!("{field_name}: {e}"))?;

    if duration.as_secs() < min_seconds {
        return Err(anyhow::anyhow!(
            "{field_name} must be at least {min_seconds} seconds. Got: '{}' ({} seconds)",
            interval_trimmed,
            duration.as_secs()
        ));
    }

    Ok(())
}
