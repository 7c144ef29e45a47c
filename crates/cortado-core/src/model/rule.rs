// ── Availability rules ──
//
// A mentor's recurring weekly windows. Wall times are UTC; a rule never
// crosses midnight. The per-day non-overlap invariant is enforced here,
// at write time, so every downstream consumer can trust the set.

use std::fmt;

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::SchedulingError;

/// One recurring weekly window during which a mentor may be booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityRule {
    pub day: Weekday,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl AvailabilityRule {
    pub fn new(day: Weekday, start: NaiveTime, end: NaiveTime) -> Self {
        Self { day, start, end }
    }
}

impl fmt::Display for AvailabilityRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}-{}",
            self.day,
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

/// Validate a replacement rule set: every rule well-formed, and no two
/// rules for the same weekday overlapping. Touching windows are legal.
pub fn validate_rule_set(rules: &[AvailabilityRule]) -> Result<(), SchedulingError> {
    for rule in rules {
        if rule.start >= rule.end {
            return Err(SchedulingError::InvalidRuleSet {
                reason: format!("rule {rule} has start at or after end"),
            });
        }
    }

    let mut sorted: Vec<&AvailabilityRule> = rules.iter().collect();
    sorted.sort_by_key(|r| (r.day.num_days_from_monday(), r.start));

    for pair in sorted.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if a.day == b.day && b.start < a.end {
            return Err(SchedulingError::InvalidRuleSet {
                reason: format!("rules {a} and {b} overlap"),
            });
        }
    }

    Ok(())
}

/// Canonical storage order: by weekday, then start time.
pub(crate) fn sort_rules(rules: &mut [AvailabilityRule]) {
    rules.sort_by_key(|r| (r.day.num_days_from_monday(), r.start));
}
