//! Day and clock-time normalization
//!
//! Maps the free-text day names and "HH:MM" clock strings published by the
//! legacy source onto the fixed daily schedule grid. Only the hour matters:
//! a lecture starting 08:15 or 08:00 lands in the same start slot.

use thiserror::Error;
use tracing::info;

/// Day names as published by the source, Monday first
pub const DAY_NAMES: [&str; 5] = ["mandag", "tirsdag", "onsdag", "torsdag", "fredag"];

/// Legal start slots as (slot, display text), ordered
pub const START_SLOTS: [(i64, &str); 12] = [
    (8, "08:15"),
    (9, "09:15"),
    (10, "10:15"),
    (11, "11:15"),
    (12, "12:15"),
    (13, "13:15"),
    (14, "14:15"),
    (15, "15:15"),
    (16, "16:15"),
    (17, "17:15"),
    (18, "18:15"),
    (19, "19:15"),
];

/// Legal end slots as (slot, display text), ordered
pub const END_SLOTS: [(i64, &str); 12] = [
    (9, "09:00"),
    (10, "10:00"),
    (11, "11:00"),
    (12, "12:00"),
    (13, "13:00"),
    (14, "14:00"),
    (15, "15:00"),
    (16, "16:00"),
    (17, "17:00"),
    (18, "18:00"),
    (19, "19:00"),
    (20, "20:00"),
];

/// Row-scoped normalization failure; the row is skipped, the pass continues
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error("unknown day '{0}'")]
    UnknownDay(String),

    #[error("unparseable clock time '{0}'")]
    BadClock(String),

    #[error("no start slot for '{0}'")]
    NoStartSlot(String),

    #[error("no end slot for '{0}'")]
    NoEndSlot(String),
}

/// Normalized position of a lecture in the weekly grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeSlot {
    /// Monday = 0 .. Friday = 4
    pub day: i64,
    pub start_slot: i64,
    pub end_slot: i64,
}

/// Normalize a raw (day, start, end) triple
pub fn normalize(day: &str, start: &str, end: &str) -> Result<TimeSlot, NormalizationError> {
    Ok(TimeSlot {
        day: day_ordinal(day)?,
        start_slot: start_slot(start)?,
        end_slot: end_slot(end)?,
    })
}

/// Day ordinal for a source day name (case-insensitive)
pub fn day_ordinal(raw: &str) -> Result<i64, NormalizationError> {
    let name = raw.trim().to_lowercase();
    DAY_NAMES
        .iter()
        .position(|d| *d == name)
        .map(|i| i as i64)
        .ok_or_else(|| NormalizationError::UnknownDay(raw.to_string()))
}

/// Start slot for a clock string; exact hour only
pub fn start_slot(raw: &str) -> Result<i64, NormalizationError> {
    let hour = clock_hour(raw)?;
    START_SLOTS
        .iter()
        .find(|(slot, _)| *slot == hour)
        .map(|(slot, _)| *slot)
        .ok_or_else(|| NormalizationError::NoStartSlot(raw.to_string()))
}

/// End slot for a clock string
///
/// Two source quirks are corrected instead of rejected: an end hour of 8
/// becomes the 09:00 slot, and midnight becomes the last slot of the day.
pub fn end_slot(raw: &str) -> Result<i64, NormalizationError> {
    let hour = clock_hour(raw)?;
    if let Some((slot, _)) = END_SLOTS.iter().find(|(slot, _)| *slot == hour) {
        return Ok(*slot);
    }

    let (first_slot, first_text) = END_SLOTS[0];
    let (last_slot, last_text) = END_SLOTS[END_SLOTS.len() - 1];

    match hour {
        8 => {
            info!("Converting end time {} to {}", raw, first_text);
            Ok(first_slot)
        }
        0 => {
            info!("Converting end time {} to {}", raw, last_text);
            Ok(last_slot)
        }
        _ => Err(NormalizationError::NoEndSlot(raw.to_string())),
    }
}

/// Hour component of an "HH:MM" (or bare "HH") string
fn clock_hour(raw: &str) -> Result<i64, NormalizationError> {
    raw.trim()
        .split(':')
        .next()
        .and_then(|h| h.trim().parse::<u8>().ok())
        .filter(|h| *h < 24)
        .map(i64::from)
        .ok_or_else(|| NormalizationError::BadClock(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_ordinals() {
        assert_eq!(day_ordinal("mandag"), Ok(0));
        assert_eq!(day_ordinal(" Fredag "), Ok(4));
        assert_eq!(
            day_ordinal("lørdag"),
            Err(NormalizationError::UnknownDay("lørdag".to_string()))
        );
    }

    #[test]
    fn test_exact_hour_lookup() {
        assert_eq!(
            normalize("onsdag", "10:15", "12:00"),
            Ok(TimeSlot { day: 2, start_slot: 10, end_slot: 12 })
        );
        // Minutes are ignored
        assert_eq!(start_slot("08:00"), Ok(8));
        assert_eq!(end_slot("19:45"), Ok(19));
    }

    #[test]
    fn test_end_hour_eight_maps_to_nine() {
        assert_eq!(end_slot("08:00"), Ok(9));
    }

    #[test]
    fn test_midnight_maps_to_last_end_slot() {
        assert_eq!(end_slot("00:00"), Ok(20));
    }

    #[test]
    fn test_other_misses_are_errors() {
        assert_eq!(
            end_slot("21:00"),
            Err(NormalizationError::NoEndSlot("21:00".to_string()))
        );
        assert_eq!(
            start_slot("07:15"),
            Err(NormalizationError::NoStartSlot("07:15".to_string()))
        );
        // Start has no fallbacks
        assert!(start_slot("00:00").is_err());
    }

    #[test]
    fn test_garbage_clock_text() {
        assert_eq!(
            start_slot("kl. 8"),
            Err(NormalizationError::BadClock("kl. 8".to_string()))
        );
        assert!(end_slot("").is_err());
        assert!(end_slot("25:00").is_err());
    }
}
