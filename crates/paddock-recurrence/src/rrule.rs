//! Lightweight recurrence rule parser.
//! Supports: `KEY=VALUE` pairs separated by `;`, optional `RRULE:` prefix.
//! Keys: FREQ, INTERVAL, BYDAY, BYMONTHDAY, COUNT, UNTIL (YYYYMMDD).
//! Example: "FREQ=WEEKLY;BYDAY=MO,WE,FR" = every Mon/Wed/Fri.
//!
//! Parsing never fails: malformed values fall back to defaults so a bad
//! rule degrades to a daily pattern instead of wedging the sweep.

use chrono::{NaiveDate, Weekday};

/// Recurrence frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// Parsed recurrence rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RecurrenceRule {
    pub freq: Frequency,
    pub interval: u32,
    pub by_day: Vec<Weekday>,
    pub by_month_day: Option<u32>,
    pub count: Option<u32>,
    pub until: Option<NaiveDate>,
}

impl Default for RecurrenceRule {
    fn default() -> Self {
        Self {
            freq: Frequency::Daily,
            interval: 1,
            by_day: Vec::new(),
            by_month_day: None,
            count: None,
            until: None,
        }
    }
}

/// Parse a rule string into a `RecurrenceRule`.
pub fn parse_rule(input: &str) -> RecurrenceRule {
    let input = input.trim();
    let input = input.strip_prefix("RRULE:").unwrap_or(input);

    let mut rule = RecurrenceRule::default();

    for pair in input.split(';') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let Some((key, value)) = pair.split_once('=') else {
            tracing::warn!("Ignoring malformed rule segment: '{pair}'");
            continue;
        };

        match key.trim().to_ascii_uppercase().as_str() {
            "FREQ" => {
                rule.freq = match value.trim().to_ascii_uppercase().as_str() {
                    "DAILY" => Frequency::Daily,
                    "WEEKLY" => Frequency::Weekly,
                    "MONTHLY" => Frequency::Monthly,
                    "YEARLY" => Frequency::Yearly,
                    other => {
                        tracing::warn!("Unknown FREQ '{other}', defaulting to DAILY");
                        Frequency::Daily
                    }
                };
            }
            "INTERVAL" => {
                rule.interval = match value.trim().parse::<u32>() {
                    Ok(n) if n >= 1 => n,
                    _ => {
                        tracing::warn!("Invalid INTERVAL '{value}', defaulting to 1");
                        1
                    }
                };
            }
            "BYDAY" => {
                rule.by_day = value
                    .split(',')
                    .filter_map(|code| parse_weekday(code.trim()))
                    .collect();
            }
            "BYMONTHDAY" => {
                rule.by_month_day = match value.trim().parse::<u32>() {
                    Ok(d) if (1..=31).contains(&d) => Some(d),
                    _ => {
                        tracing::warn!("Invalid BYMONTHDAY '{value}', ignoring");
                        None
                    }
                };
            }
            "COUNT" => {
                rule.count = value.trim().parse::<u32>().ok();
            }
            "UNTIL" => {
                rule.until = NaiveDate::parse_from_str(value.trim(), "%Y%m%d").ok();
                if rule.until.is_none() {
                    tracing::warn!("Invalid UNTIL '{value}', ignoring");
                }
            }
            _ => {} // unknown keys are ignored
        }
    }

    rule
}

fn parse_weekday(code: &str) -> Option<Weekday> {
    match code.to_ascii_uppercase().as_str() {
        "MO" => Some(Weekday::Mon),
        "TU" => Some(Weekday::Tue),
        "WE" => Some(Weekday::Wed),
        "TH" => Some(Weekday::Thu),
        "FR" => Some(Weekday::Fri),
        "SA" => Some(Weekday::Sat),
        "SU" => Some(Weekday::Sun),
        other => {
            tracing::warn!("Unknown BYDAY code '{other}', ignoring");
            None
        }
    }
}
