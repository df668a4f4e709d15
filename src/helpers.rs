//! Shared helpers for provider value normalization and input checks.
//!
//! The provider reports missing sensor readings as `null`, but a non-finite
//! number can still slip through a lenient upstream encoder. Both end up as
//! `None` here so they are stored as SQL NULL, never as a sentinel number.

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::errors::AppError;

/// Normalize a provider reading: non-finite numbers become `None`.
pub(crate) fn finite_or_none(v: Option<f64>) -> Option<f64> {
    match v {
        Some(x) if !x.is_finite() => {
            tracing::warn!("finite_or_none received non-finite value {}, storing NULL", x);
            None
        }
        other => other,
    }
}

/// Parse a provider date, accepting either `YYYY-MM-DD` or
/// `YYYY-MM-DD HH:MM:SS` (the time part is dropped).
pub(crate) fn parse_provider_date(s: &str) -> Result<NaiveDate, AppError> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|dt| dt.date()))
        .map_err(|e| AppError::ExternalServiceError(format!("Unparseable date '{}': {}", s, e)))
}

/// Reject coordinates that no provider would accept.
pub(crate) fn validate_coordinates(lat: f64, lon: f64) -> Result<(), AppError> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(AppError::BadRequest(format!("Invalid latitude {}", lat)));
    }
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(AppError::BadRequest(format!("Invalid longitude {}", lon)));
    }
    Ok(())
}

pub(crate) fn validate_date_range(start: NaiveDate, end: NaiveDate) -> Result<(), AppError> {
    if start > end {
        return Err(AppError::BadRequest(format!(
            "Start date {} is after end date {}",
            start, end
        )));
    }
    Ok(())
}

/// Split `[start, end]` into consecutive inclusive windows of at most
/// `max_days` days, in ascending order. An inverted range yields nothing.
pub(crate) fn date_windows(
    start: NaiveDate,
    end: NaiveDate,
    max_days: i64,
) -> Vec<(NaiveDate, NaiveDate)> {
    let span = Duration::days(max_days.max(1) - 1);
    let mut windows = Vec::new();
    let mut window_start = start;

    while window_start <= end {
        let window_end = window_start
            .checked_add_signed(span)
            .map_or(end, |d| d.min(end));
        windows.push((window_start, window_end));
        match window_end.succ_opt() {
            Some(next) => window_start = next,
            None => break,
        }
    }

    windows
}
