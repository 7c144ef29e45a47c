// ── Slot expansion ──
//
// Turns weekly availability rules into concrete bookable slots inside a
// requested time range. Expansion is lazy: nothing is materialized until
// the iterator is driven, and cloning the iterator restarts (or forks)
// the walk without recomputing anything.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::model::{
    AvailabilityRule, Slot, SlotStatus, TimeRange, UserId, rule::sort_rules, slot_duration,
};

/// Expands `rules` into the slots that lie entirely inside `range`.
///
/// Slots are produced in chronological order, one per hour within each
/// rule window; a trailing window remainder shorter than a full slot is
/// dropped. Slots that start before `now` are tagged [`SlotStatus::Past`],
/// everything else starts out [`SlotStatus::Open`]. Busy and reserved
/// annotations are layered on afterwards by the caller.
pub fn expand(
    mentor_id: UserId,
    rules: &[AvailabilityRule],
    range: TimeRange,
    now: DateTime<Utc>,
) -> SlotIter {
    let mut rules = rules.to_vec();
    sort_rules(&mut rules);
    SlotIter {
        mentor_id,
        rules,
        range,
        now,
        day: range.start.date_naive(),
        last_day: range.end.date_naive(),
        rule_idx: 0,
        slot_idx: 0,
    }
}

/// Lazy walk over the slots of one mentor's rule set.
///
/// Finite by construction: the walk stops once the day cursor passes the
/// end of the range. `Clone` forks the cursor, so a fresh restart is just
/// another [`expand`] call (or a clone taken before iteration began).
#[derive(Debug, Clone)]
pub struct SlotIter {
    mentor_id: UserId,
    rules: Vec<AvailabilityRule>,
    range: TimeRange,
    now: DateTime<Utc>,
    day: NaiveDate,
    last_day: NaiveDate,
    rule_idx: usize,
    slot_idx: i32,
}

impl Iterator for SlotIter {
    type Item = Slot;

    fn next(&mut self) -> Option<Slot> {
        loop {
            if self.day > self.last_day {
                return None;
            }
            let weekday = self.day.weekday();
            while let Some(rule) = self.rules.get(self.rule_idx) {
                if rule.day != weekday {
                    self.rule_idx += 1;
                    self.slot_idx = 0;
                    continue;
                }
                let window_end = self.day.and_time(rule.end).and_utc();
                let start = self.day.and_time(rule.start).and_utc() + slot_duration() * self.slot_idx;
                let end = start + slot_duration();
                if end > window_end {
                    // Window exhausted; any sub-hour remainder is not bookable.
                    self.rule_idx += 1;
                    self.slot_idx = 0;
                    continue;
                }
                self.slot_idx += 1;
                if start < self.range.start || end > self.range.end {
                    continue;
                }
                let status = if start < self.now {
                    SlotStatus::Past
                } else {
                    SlotStatus::Open
                };
                return Some(Slot {
                    mentor_id: self.mentor_id.clone(),
                    start,
                    status,
                });
            }
            self.rule_idx = 0;
            self.slot_idx = 0;
            self.day = self.day.succ_opt()?;
        }
    }
}

impl std::iter::FusedIterator for SlotIter {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{NaiveTime, TimeZone, Weekday};
    use pretty_assertions::assert_eq;

    use super::*;

    fn rule(day: Weekday, start: (u32, u32), end: (u32, u32)) -> AvailabilityRule {
        AvailabilityRule {
            day,
            start: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
        }
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    // 2026-03-01 is a Sunday, so 2026-03-02 is the only Monday in the week.
    fn week() -> TimeRange {
        TimeRange::new(utc(2026, 3, 1, 0, 0), utc(2026, 3, 8, 0, 0))
    }

    #[test]
    fn monday_rule_expands_to_three_slots() {
        let rules = [rule(Weekday::Mon, (9, 0), (12, 0))];
        let slots: Vec<Slot> =
            expand(UserId::from("m1"), &rules, week(), utc(2026, 1, 1, 0, 0)).collect();

        let starts: Vec<DateTime<Utc>> = slots.iter().map(|s| s.start).collect();
        assert_eq!(
            starts,
            vec![
                utc(2026, 3, 2, 9, 0),
                utc(2026, 3, 2, 10, 0),
                utc(2026, 3, 2, 11, 0),
            ]
        );
        assert!(slots.iter().all(|s| s.status == SlotStatus::Open));
        assert!(slots.iter().all(|s| s.mentor_id.as_str() == "m1"));
    }

    #[test]
    fn partial_trailing_window_is_dropped() {
        let rules = [rule(Weekday::Mon, (9, 0), (10, 30))];
        let starts: Vec<DateTime<Utc>> =
            expand(UserId::from("m1"), &rules, week(), utc(2026, 1, 1, 0, 0))
                .map(|s| s.start)
                .collect();
        assert_eq!(starts, vec![utc(2026, 3, 2, 9, 0)]);
    }

    #[test]
    fn window_shorter_than_a_slot_yields_nothing() {
        let rules = [rule(Weekday::Mon, (9, 0), (9, 45))];
        assert_eq!(
            expand(UserId::from("m1"), &rules, week(), utc(2026, 1, 1, 0, 0)).count(),
            0
        );
    }

    #[test]
    fn slots_before_now_are_past() {
        let rules = [rule(Weekday::Mon, (9, 0), (12, 0))];
        // Now falls exactly on the second slot boundary; only the first
        // slot has already started.
        let now = utc(2026, 3, 2, 10, 0);
        let statuses: Vec<SlotStatus> = expand(UserId::from("m1"), &rules, week(), now)
            .map(|s| s.status)
            .collect();
        assert_eq!(
            statuses,
            vec![SlotStatus::Past, SlotStatus::Open, SlotStatus::Open]
        );
    }

    #[test]
    fn multiple_rules_emit_in_chronological_order() {
        // Deliberately unsorted input.
        let rules = [
            rule(Weekday::Wed, (10, 0), (11, 0)),
            rule(Weekday::Mon, (13, 0), (15, 0)),
            rule(Weekday::Mon, (9, 0), (11, 0)),
        ];
        let starts: Vec<DateTime<Utc>> =
            expand(UserId::from("m1"), &rules, week(), utc(2026, 1, 1, 0, 0))
                .map(|s| s.start)
                .collect();
        assert_eq!(
            starts,
            vec![
                utc(2026, 3, 2, 9, 0),
                utc(2026, 3, 2, 10, 0),
                utc(2026, 3, 2, 13, 0),
                utc(2026, 3, 2, 14, 0),
                utc(2026, 3, 4, 10, 0),
            ]
        );
    }

    #[test]
    fn range_clips_to_whole_slots() {
        let rules = [rule(Weekday::Mon, (9, 0), (12, 0))];
        // Range opens mid-slot: 09:00 does not fit, 10:00 and 11:00 do.
        let range = TimeRange::new(utc(2026, 3, 2, 9, 30), utc(2026, 3, 8, 0, 0));
        let starts: Vec<DateTime<Utc>> =
            expand(UserId::from("m1"), &rules, range, utc(2026, 1, 1, 0, 0))
                .map(|s| s.start)
                .collect();
        assert_eq!(starts, vec![utc(2026, 3, 2, 10, 0), utc(2026, 3, 2, 11, 0)]);
    }

    #[test]
    fn multi_week_range_repeats_weekly() {
        let rules = [rule(Weekday::Mon, (9, 0), (10, 0))];
        let range = TimeRange::new(utc(2026, 3, 1, 0, 0), utc(2026, 3, 15, 0, 0));
        let starts: Vec<DateTime<Utc>> =
            expand(UserId::from("m1"), &rules, range, utc(2026, 1, 1, 0, 0))
                .map(|s| s.start)
                .collect();
        assert_eq!(starts, vec![utc(2026, 3, 2, 9, 0), utc(2026, 3, 9, 9, 0)]);
    }

    #[test]
    fn empty_rule_set_is_empty() {
        assert_eq!(
            expand(UserId::from("m1"), &[], week(), utc(2026, 1, 1, 0, 0)).count(),
            0
        );
    }

    #[test]
    fn iteration_is_restartable_and_clone_forks_the_cursor() {
        let rules = [rule(Weekday::Mon, (9, 0), (12, 0))];
        let iter = expand(UserId::from("m1"), &rules, week(), utc(2026, 1, 1, 0, 0));

        let first_pass: Vec<Slot> = iter.clone().collect();
        let second_pass: Vec<Slot> = iter.clone().collect();
        assert_eq!(first_pass, second_pass);

        let mut forked = iter;
        forked.next();
        let remainder: Vec<Slot> = forked.collect();
        assert_eq!(remainder, first_pass[1..]);
    }
}
