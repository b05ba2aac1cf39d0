//! Duration literals for config fields, in the `24h` / `30m` / `1.5h`
//! style. A literal is one or more `<number><unit>` segments; segments
//! add up, so `2h45m` is two hours and forty-five minutes. Units are
//! `ns`, `us`, `ms`, `s`, `m` and `h`. The bare literal `0` is allowed,
//! signs are not.

use chrono::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,

    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),

    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { input: String, unit: String },

    #[error("invalid number in duration {0:?}")]
    InvalidNumber(String),

    #[error("duration {0:?} is out of range")]
    OutOfRange(String),
}

/// Parse a duration literal.
///
/// # Errors
/// Returns a [`DurationError`] describing the first malformed segment.
pub fn parse(input: &str) -> Result<Duration, DurationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DurationError::Empty);
    }
    if trimmed == "0" {
        return Ok(Duration::zero());
    }
    if trimmed.starts_with('+') || trimmed.starts_with('-') {
        return Err(DurationError::InvalidNumber(input.to_string()));
    }

    let mut total_nanos = 0_f64;
    let mut rest = trimmed;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(DurationError::InvalidNumber(input.to_string()));
        }
        let (number, after) = rest.split_at(number_len);
        let value: f64 = number
            .parse()
            .map_err(|_| DurationError::InvalidNumber(input.to_string()))?;

        let unit_len = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        if unit_len == 0 {
            return Err(DurationError::MissingUnit(input.to_string()));
        }
        let (unit, next) = after.split_at(unit_len);

        let scale = match unit {
            "ns" => 1.0,
            "us" | "\u{b5}s" => 1_000.0,
            "ms" => 1_000_000.0,
            "s" => 1_000_000_000.0,
            "m" => 60.0 * 1_000_000_000.0,
            "h" => 3_600.0 * 1_000_000_000.0,
            _ => {
                return Err(DurationError::UnknownUnit {
                    input: input.to_string(),
                    unit: unit.to_string(),
                });
            }
        };

        total_nanos += value * scale;
        rest = next;
    }

    // `i64::MAX as f64` rounds up to 2^63, one past the largest
    // representable total, so equality already means overflow.
    if !total_nanos.is_finite() || total_nanos >= i64::MAX as f64 {
        return Err(DurationError::OutOfRange(input.to_string()));
    }

    #[allow(clippy::cast_possible_truncation)]
    Ok(Duration::nanoseconds(total_nanos as i64))
}
