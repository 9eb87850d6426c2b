//! Queue-time detection
//!
//! Front-end servers report when they first saw a request via
//! `X-Request-Start` or `X-Queue-Start`. The value may carry a `t=` prefix;
//! nginx sends fractional epoch seconds, apache sends integer microseconds,
//! and some proxies send milliseconds, so integer values have their unit
//! inferred from magnitude. A malformed or implausible value is treated as
//! "no timestamp" rather than an error.

use std::time::{Duration, SystemTime};

use thiserror::Error;

use crate::request::RequestMeta;

/// Primary queue-time header.
pub const REQUEST_START: &str = "x-request-start";
/// Fallback queue-time header.
pub const QUEUE_START: &str = "x-queue-start";

/// Epoch seconds for 2000-01-01; anything earlier is garbage.
const SANITY_FLOOR_SECS: f64 = 946_684_800.0;
/// Upper bound keeping the value convertible to a `SystemTime`.
const SANITY_CEIL_SECS: f64 = 100_000_000_000.0;

/// Integer values above this are microseconds.
const MICROS_THRESHOLD: u64 = 100_000_000_000_000;
/// Integer values above this (and below the micros threshold) are
/// milliseconds.
const MILLIS_THRESHOLD: u64 = 100_000_000_000;

#[derive(Debug, Error)]
enum QueueTimeError {
    #[error("empty value")]
    Empty,
    #[error("unparsable value `{0}`")]
    Unparsable(String),
    #[error("timestamp {0} outside the plausible range")]
    Implausible(f64),
}

/// Extract the front-end request-start timestamp, if one was reported.
///
/// Checks `X-Request-Start` first, then `X-Queue-Start`. Missing or
/// malformed values yield `None`; the request metadata is never mutated.
pub fn request_start(meta: &RequestMeta) -> Option<SystemTime> {
    let raw = meta.header(REQUEST_START).or_else(|| meta.header(QUEUE_START))?;
    match parse_timestamp(raw) {
        Ok(start) => Some(start),
        Err(err) => {
            tracing::debug!(value = raw, error = %err, "ignoring malformed queue-time header");
            None
        }
    }
}

fn parse_timestamp(raw: &str) -> Result<SystemTime, QueueTimeError> {
    let value = raw.trim();
    let value = value.strip_prefix("t=").unwrap_or(value);
    if value.is_empty() {
        return Err(QueueTimeError::Empty);
    }

    let secs = if value.contains('.') {
        value
            .parse::<f64>()
            .map_err(|_| QueueTimeError::Unparsable(value.to_string()))?
    } else {
        let n = value
            .parse::<u64>()
            .map_err(|_| QueueTimeError::Unparsable(value.to_string()))?;
        if n >= MICROS_THRESHOLD {
            n as f64 / 1_000_000.0
        } else if n >= MILLIS_THRESHOLD {
            n as f64 / 1_000.0
        } else {
            n as f64
        }
    };

    if !secs.is_finite() || !(SANITY_FLOOR_SECS..SANITY_CEIL_SECS).contains(&secs) {
        return Err(QueueTimeError::Implausible(secs));
    }

    Ok(SystemTime::UNIX_EPOCH + Duration::from_secs_f64(secs))
}
