//! Temporal coercion.
//!
//! Instants never reach the engine as timestamps: conditions and parameters
//! store them as signed epoch milliseconds.

use chrono::{DateTime, TimeZone, Utc};

/// Converts an instant to epoch milliseconds.
///
/// # Examples
///
/// ```
/// use boxquery::time::epoch_millis;
/// use chrono::{TimeZone, Utc};
///
/// let t = Utc.timestamp_millis_opt(1000).unwrap();
/// assert_eq!(epoch_millis(&t), 1000);
/// ```
#[must_use]
pub fn epoch_millis<Tz: TimeZone>(instant: &DateTime<Tz>) -> i64 {
    instant.timestamp_millis()
}

/// Converts epoch milliseconds back to an instant, if representable.
#[must_use]
pub fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Boolean storage form.
#[must_use]
pub const fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn test_epoch_plus_one_second() {
        let t = Utc.timestamp_millis_opt(1000).unwrap();
        assert_eq!(epoch_millis(&t), 1000);
    }

    #[test]
    fn test_before_epoch_is_negative() {
        let t = Utc.timestamp_millis_opt(-250).unwrap();
        assert_eq!(epoch_millis(&t), -250);
    }

    #[test]
    fn test_offset_does_not_change_instant() {
        let utc = Utc.timestamp_millis_opt(86_400_000).unwrap();
        let shifted = utc.with_timezone(&FixedOffset::east_opt(3600).unwrap());
        assert_eq!(epoch_millis(&shifted), epoch_millis(&utc));
    }

    #[test]
    fn test_round_trip() {
        assert_eq!(from_epoch_millis(42).map(|t| epoch_millis(&t)), Some(42));
    }

    #[test]
    fn test_bool_to_int() {
        assert_eq!(bool_to_int(true), 1);
        assert_eq!(bool_to_int(false), 0);
    }
}
