//! Date expansion — turns a rule plus a window into candidate dates.

use chrono::{Datelike, Duration, NaiveDate};

use crate::rrule::{Frequency, RecurrenceRule};

/// Hard cap on cursor steps so a malformed rule can never spin the sweep.
/// Hitting it logs and returns what was collected so far.
const MAX_EXPANSION_STEPS: usize = 1000;

/// Produce the ascending candidate dates for `rule` inside the generation
/// window, bounded by the pattern's validity window and the rule's own
/// UNTIL/COUNT limits.
///
/// COUNT caps the occurrences returned by this call; exact lifetime COUNT
/// tracking across runs is out of reach for a forward-window generator.
pub fn expand_dates(
    rule: &RecurrenceRule,
    window_start: NaiveDate,
    window_end: NaiveDate,
    pattern_start: NaiveDate,
    pattern_end: Option<NaiveDate>,
) -> Vec<NaiveDate> {
    let mut effective_end = window_end;
    if let Some(end) = pattern_end {
        effective_end = effective_end.min(end);
    }
    if let Some(until) = rule.until {
        effective_end = effective_end.min(until);
    }

    // Weekly rules with a BYDAY set walk every single day so each weekday
    // in range gets evaluated; everything else starts at the later of the
    // two window edges.
    let weekly_by_day = rule.freq == Frequency::Weekly && !rule.by_day.is_empty();
    let mut cursor = if weekly_by_day { window_start } else { window_start.max(pattern_start) };

    // Month/year stepping keeps the original day-of-month as the anchor so
    // a 31st clamped to Feb 28 comes back as the 31st in March.
    let anchor_day = cursor.day();

    let mut dates = Vec::new();
    let mut steps = 0usize;

    while cursor <= effective_end {
        if steps >= MAX_EXPANSION_STEPS {
            tracing::warn!(
                "Expansion hit the {MAX_EXPANSION_STEPS}-step cap, returning {} date(s) collected so far",
                dates.len()
            );
            break;
        }
        steps += 1;

        let by_day_ok = rule.by_day.is_empty() || rule.by_day.contains(&cursor.weekday());
        let by_month_day_ok = rule.by_month_day.is_none_or(|d| cursor.day() == d);
        if by_day_ok && by_month_day_ok && cursor >= window_start && cursor >= pattern_start {
            dates.push(cursor);
            if rule.count.is_some_and(|c| dates.len() as u32 >= c) {
                break;
            }
        }

        cursor = match rule.freq {
            Frequency::Daily => cursor + Duration::days(i64::from(rule.interval)),
            Frequency::Weekly if weekly_by_day => cursor + Duration::days(1),
            Frequency::Weekly => cursor + Duration::days(7 * i64::from(rule.interval)),
            Frequency::Monthly => step_months(cursor, rule.interval, anchor_day),
            Frequency::Yearly => step_years(cursor, rule.interval, anchor_day),
        };
    }

    dates
}

/// Advance by whole months, clamping the anchor day to the target month's
/// length (Jan 31 + 1 month = Feb 28/29, never Mar 3).
fn step_months(date: NaiveDate, months: u32, anchor_day: u32) -> NaiveDate {
    let total = date.year() * 12 + date.month0() as i32 + months as i32;
    let year = total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;
    let day = anchor_day.min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).expect("clamped day is valid")
}

fn step_years(date: NaiveDate, years: u32, anchor_day: u32) -> NaiveDate {
    let year = date.year() + years as i32;
    let day = anchor_day.min(days_in_month(year, date.month()));
    NaiveDate::from_ymd_opt(year, date.month(), day).expect("clamped day is valid")
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map_or(28, |d| d.day())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rrule::parse_rule;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn daily_with_interval() {
        let rule = parse_rule("FREQ=DAILY;INTERVAL=2");
        let dates = expand_dates(&rule, d(2024, 1, 1), d(2024, 1, 10), d(2024, 1, 1), None);
        assert_eq!(
            dates,
            vec![d(2024, 1, 1), d(2024, 1, 3), d(2024, 1, 5), d(2024, 1, 7), d(2024, 1, 9)]
        );
    }

    #[test]
    fn monthly_31st_clamps_and_recovers() {
        let rule = parse_rule("FREQ=MONTHLY");
        let dates = expand_dates(&rule, d(2024, 1, 31), d(2024, 5, 31), d(2024, 1, 31), None);
        // 2024 is a leap year
        assert_eq!(
            dates,
            vec![d(2024, 1, 31), d(2024, 2, 29), d(2024, 3, 31), d(2024, 4, 30), d(2024, 5, 31)]
        );
    }

    #[test]
    fn monthly_31st_non_leap_february() {
        let rule = parse_rule("FREQ=MONTHLY");
        let dates = expand_dates(&rule, d(2023, 1, 31), d(2023, 3, 31), d(2023, 1, 31), None);
        assert_eq!(dates, vec![d(2023, 1, 31), d(2023, 2, 28), d(2023, 3, 31)]);
    }

    #[test]
    fn weekly_by_day_over_two_weeks() {
        let rule = parse_rule("FREQ=WEEKLY;BYDAY=MO,WE,FR");
        // 2024-01-01 is a Monday; 14-day window
        let dates = expand_dates(&rule, d(2024, 1, 1), d(2024, 1, 14), d(2024, 1, 1), None);
        assert_eq!(dates.len(), 6);
        for date in &dates {
            assert!(matches!(
                date.weekday(),
                chrono::Weekday::Mon | chrono::Weekday::Wed | chrono::Weekday::Fri
            ));
        }
    }

    #[test]
    fn weekly_by_day_respects_pattern_start() {
        let rule = parse_rule("FREQ=WEEKLY;BYDAY=MO");
        // pattern starts mid-window; the Monday before it is excluded
        let dates = expand_dates(&rule, d(2024, 1, 1), d(2024, 1, 14), d(2024, 1, 3), None);
        assert_eq!(dates, vec![d(2024, 1, 8)]);
    }

    #[test]
    fn weekly_without_by_day_steps_whole_weeks() {
        let rule = parse_rule("FREQ=WEEKLY;INTERVAL=2");
        let dates = expand_dates(&rule, d(2024, 1, 1), d(2024, 2, 1), d(2024, 1, 1), None);
        assert_eq!(dates, vec![d(2024, 1, 1), d(2024, 1, 15), d(2024, 1, 29)]);
    }

    #[test]
    fn count_caps_occurrences() {
        let rule = parse_rule("FREQ=DAILY;COUNT=3");
        let dates = expand_dates(&rule, d(2024, 1, 1), d(2024, 12, 31), d(2024, 1, 1), None);
        assert_eq!(dates.len(), 3);
    }

    #[test]
    fn until_and_pattern_end_bound_the_window() {
        let rule = parse_rule("FREQ=DAILY;UNTIL=20240105");
        let dates =
            expand_dates(&rule, d(2024, 1, 1), d(2024, 1, 31), d(2024, 1, 1), Some(d(2024, 1, 20)));
        assert_eq!(dates.last(), Some(&d(2024, 1, 5)));

        let rule = parse_rule("FREQ=DAILY");
        let dates =
            expand_dates(&rule, d(2024, 1, 1), d(2024, 1, 31), d(2024, 1, 1), Some(d(2024, 1, 3)));
        assert_eq!(dates, vec![d(2024, 1, 1), d(2024, 1, 2), d(2024, 1, 3)]);
    }

    #[test]
    fn by_month_day_filters() {
        let rule = parse_rule("FREQ=MONTHLY;BYMONTHDAY=15");
        let dates = expand_dates(&rule, d(2024, 1, 15), d(2024, 3, 31), d(2024, 1, 15), None);
        assert_eq!(dates, vec![d(2024, 1, 15), d(2024, 2, 15), d(2024, 3, 15)]);
    }

    #[test]
    fn expansion_terminates_on_huge_windows() {
        let rule = parse_rule("FREQ=DAILY");
        // window far larger than the step cap — must stop, not spin
        let dates = expand_dates(&rule, d(2024, 1, 1), d(2100, 1, 1), d(2024, 1, 1), None);
        assert_eq!(dates.len(), MAX_EXPANSION_STEPS);
    }

    #[test]
    fn empty_window_yields_nothing() {
        let rule = parse_rule("FREQ=DAILY");
        let dates = expand_dates(&rule, d(2024, 2, 1), d(2024, 1, 1), d(2024, 1, 1), None);
        assert!(dates.is_empty());
    }
}
