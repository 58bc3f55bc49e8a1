//! Holiday and weekend detection for shift weighting.

use chrono::{Datelike, NaiveDate, Weekday};

/// Fixed-date holidays, `(month, day)`. Movable feasts are out — the yards
/// we serve staff those like normal weekends anyway.
const FIXED_HOLIDAYS: [(u32, u32); 6] =
    [(1, 1), (5, 1), (12, 24), (12, 25), (12, 26), (12, 31)];

/// Weight multiplier applied to holiday/weekend shifts when the definition
/// opts in.
pub const HOLIDAY_WEIGHT_FACTOR: f64 = 1.5;

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub fn is_holiday(date: NaiveDate) -> bool {
    FIXED_HOLIDAYS.contains(&(date.month(), date.day()))
}

/// A shift counts as a holiday shift on weekends and fixed holidays alike.
pub fn is_holiday_shift(date: NaiveDate) -> bool {
    is_weekend(date) || is_holiday(date)
}

pub fn effective_weight(base_weight: f64, multiplier_enabled: bool, date: NaiveDate) -> f64 {
    if multiplier_enabled && is_holiday_shift(date) {
        base_weight * HOLIDAY_WEIGHT_FACTOR
    } else {
        base_weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn weekends_and_fixed_holidays_detected() {
        assert!(is_holiday_shift(d(2024, 1, 6))); // Saturday
        assert!(is_holiday_shift(d(2024, 1, 7))); // Sunday
        assert!(is_holiday_shift(d(2024, 12, 25))); // Wednesday, but Christmas
        assert!(!is_holiday_shift(d(2024, 1, 3))); // plain Wednesday
    }

    #[test]
    fn weight_multiplier_only_when_enabled() {
        let christmas = d(2024, 12, 25);
        assert_eq!(effective_weight(2.0, true, christmas), 3.0);
        assert_eq!(effective_weight(2.0, false, christmas), 2.0);
        assert_eq!(effective_weight(2.0, true, d(2024, 1, 3)), 2.0);
    }
}
