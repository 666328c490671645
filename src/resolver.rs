use std::collections::HashMap;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use tracing::debug;
use uuid::Uuid;

use crate::error::ScheduleError;
use crate::models::{SessionOutcome, SessionState, WeeklySlot};
use crate::schedule::validate_slot;

/// Recorded outcomes keyed by (slot, calendar date).
#[derive(Debug, Clone, Default)]
pub struct OutcomeIndex {
    by_slot_and_date: HashMap<(Uuid, NaiveDate), SessionOutcome>,
}

impl OutcomeIndex {
    /// Later records for the same (slot, date) replace earlier ones.
    pub fn from_outcomes<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = SessionOutcome>,
    {
        let mut index = OutcomeIndex::default();
        for outcome in outcomes {
            index.insert(outcome);
        }
        index
    }

    pub fn insert(&mut self, outcome: SessionOutcome) {
        self.by_slot_and_date
            .insert((outcome.slot_id, outcome.date), outcome);
    }

    /// Adds each slot's cached hint under the date it was recorded for,
    /// unless an explicit record already covers that date.
    pub fn merge_cached_hints(&mut self, slots: &[WeeklySlot]) {
        for hint in slots.iter().filter_map(WeeklySlot::cached_outcome) {
            self.by_slot_and_date
                .entry((hint.slot_id, hint.date))
                .or_insert(hint);
        }
    }

    pub fn get(&self, slot_id: Uuid, date: NaiveDate) -> Option<&SessionOutcome> {
        self.by_slot_and_date.get(&(slot_id, date))
    }

    pub fn len(&self) -> usize {
        self.by_slot_and_date.len()
    }
}

/// Effective state of `slot` on `reference_date`, as seen at `now`.
///
/// An outcome only counts when it was recorded for this slot on exactly
/// `reference_date`; anything else is stale and falls through to the
/// time-based rules. Inactive slots must be filtered out by the caller.
pub fn resolve_state(
    slot: &WeeklySlot,
    outcome_for_date: Option<&SessionOutcome>,
    reference_date: NaiveDate,
    now: NaiveDateTime,
) -> Result<SessionState, ScheduleError> {
    let (weekday, window) = validate_slot(slot)?;

    if let Some(outcome) = outcome_for_date {
        if outcome.slot_id == slot.id && outcome.date == reference_date {
            return Ok(outcome.kind.into());
        }
        debug!(
            slot_id = %slot.id,
            record_date = %outcome.date,
            %reference_date,
            "ignoring outcome recorded for a different occurrence"
        );
    }

    if weekday != reference_date.weekday() || reference_date != now.date() {
        return Ok(SessionState::Scheduled);
    }

    // Slot times are kept to the minute, so the end minute counts as a whole.
    let time = now.time();
    let time = NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time);
    if time < window.start {
        Ok(SessionState::PendingToday)
    } else if window.contains(time) {
        Ok(SessionState::InProgress)
    } else {
        Ok(SessionState::UnrecordedPast)
    }
}

#[derive(Debug)]
pub struct ResolvedSlot<'a> {
    pub slot: &'a WeeklySlot,
    pub state: Result<SessionState, ScheduleError>,
}

/// Resolves every active slot against today, for the weekly calendar view.
pub fn resolve_day<'a>(
    slots: &'a [WeeklySlot],
    outcomes: &OutcomeIndex,
    now: NaiveDateTime,
) -> Vec<ResolvedSlot<'a>> {
    let today = now.date();
    slots
        .iter()
        .filter(|slot| slot.active)
        .map(|slot| ResolvedSlot {
            slot,
            state: resolve_state(slot, outcomes.get(slot.id, today), today, now),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OutcomeKind;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn at(day: NaiveDate, h: u32, m: u32) -> NaiveDateTime {
        day.and_hms_opt(h, m, 0).expect("valid time")
    }

    // Tuesday 08:00-10:00, created on Monday 2024-01-01.
    fn tuesday_slot() -> WeeklySlot {
        WeeklySlot {
            id: Uuid::new_v4(),
            section_id: Uuid::new_v4(),
            day_of_week: 2,
            start_time: "08:00".to_string(),
            end_time: "10:00".to_string(),
            room: None,
            active: true,
            created_at: at(date(2024, 1, 1), 0, 0),
            last_state: None,
            last_state_date: None,
        }
    }

    fn outcome(slot: &WeeklySlot, on: NaiveDate, kind: OutcomeKind) -> SessionOutcome {
        SessionOutcome {
            slot_id: slot.id,
            date: on,
            kind,
            notes: None,
            topics: None,
        }
    }

    #[test]
    fn matching_record_wins_regardless_of_clock() {
        let slot = tuesday_slot();
        let tuesday = date(2024, 1, 9);
        let record = outcome(&slot, tuesday, OutcomeKind::Canceled);

        for now in [
            at(tuesday, 7, 0),
            at(tuesday, 9, 0),
            at(tuesday, 23, 0),
            at(date(2024, 2, 1), 12, 0),
        ] {
            assert_eq!(
                resolve_state(&slot, Some(&record), tuesday, now),
                Ok(SessionState::Canceled)
            );
        }
    }

    #[test]
    fn stale_record_does_not_leak_into_next_week() {
        let mut slot = tuesday_slot();
        slot.last_state = Some(OutcomeKind::Realized);
        slot.last_state_date = Some(date(2024, 1, 9));
        let stale = slot.cached_outcome();

        let next_tuesday = date(2024, 1, 16);
        let state = resolve_state(&slot, stale.as_ref(), next_tuesday, at(next_tuesday, 11, 0));
        assert_eq!(state, Ok(SessionState::UnrecordedPast));
    }

    #[test]
    fn record_for_another_slot_is_ignored() {
        let slot = tuesday_slot();
        let other = tuesday_slot();
        let tuesday = date(2024, 1, 9);
        let foreign = outcome(&other, tuesday, OutcomeKind::Realized);

        let state = resolve_state(&slot, Some(&foreign), tuesday, at(tuesday, 7, 59));
        assert_eq!(state, Ok(SessionState::PendingToday));
    }

    #[test]
    fn other_weekday_is_scheduled() {
        let slot = tuesday_slot();
        let wednesday = date(2024, 1, 10);
        let tuesday_record = outcome(&slot, date(2024, 1, 9), OutcomeKind::Realized);

        assert_eq!(
            resolve_state(&slot, Some(&tuesday_record), wednesday, at(wednesday, 9, 0)),
            Ok(SessionState::Scheduled)
        );
        assert_eq!(
            resolve_state(&slot, None, wednesday, at(wednesday, 9, 0)),
            Ok(SessionState::Scheduled)
        );
    }

    #[test]
    fn matching_weekday_on_another_date_is_scheduled() {
        let slot = tuesday_slot();
        let tuesday = date(2024, 1, 9);
        let later = at(date(2024, 1, 12), 9, 0);
        assert_eq!(
            resolve_state(&slot, None, tuesday, later),
            Ok(SessionState::Scheduled)
        );
    }

    #[test]
    fn today_partitions_on_inclusive_window() {
        let slot = tuesday_slot();
        let tuesday = date(2024, 1, 9);
        let cases = [
            ((7, 59), SessionState::PendingToday),
            ((8, 0), SessionState::InProgress),
            ((9, 30), SessionState::InProgress),
            ((10, 0), SessionState::InProgress),
            ((10, 1), SessionState::UnrecordedPast),
        ];

        for ((h, m), expected) in cases {
            assert_eq!(
                resolve_state(&slot, None, tuesday, at(tuesday, h, m)),
                Ok(expected),
                "at {h:02}:{m:02}"
            );
        }
    }

    #[test]
    fn seconds_within_the_end_minute_are_still_in_progress() {
        let slot = tuesday_slot();
        let tuesday = date(2024, 1, 9);
        let at_secs = |h, m, s| tuesday.and_hms_opt(h, m, s).expect("valid time");

        assert_eq!(
            resolve_state(&slot, None, tuesday, at_secs(10, 0, 30)),
            Ok(SessionState::InProgress)
        );
        assert_eq!(
            resolve_state(&slot, None, tuesday, at_secs(10, 0, 59)),
            Ok(SessionState::InProgress)
        );
        assert_eq!(
            resolve_state(&slot, None, tuesday, at_secs(7, 59, 59)),
            Ok(SessionState::PendingToday)
        );
        assert_eq!(
            resolve_state(&slot, None, tuesday, at_secs(10, 1, 0)),
            Ok(SessionState::UnrecordedPast)
        );
    }

    #[test]
    fn malformed_slot_fails_even_with_a_record() {
        let mut slot = tuesday_slot();
        slot.end_time = "late".to_string();
        let tuesday = date(2024, 1, 9);
        let record = outcome(&slot, tuesday, OutcomeKind::Realized);

        let result = resolve_state(&slot, Some(&record), tuesday, at(tuesday, 9, 0));
        assert!(matches!(
            result,
            Err(ScheduleError::MalformedSchedule { slot_id, .. }) if slot_id == slot.id
        ));
    }

    #[test]
    fn index_keeps_last_write_and_prefers_explicit_records_over_hints() {
        let mut slot = tuesday_slot();
        let tuesday = date(2024, 1, 9);
        slot.last_state = Some(OutcomeKind::Postponed);
        slot.last_state_date = Some(tuesday);

        let mut index = OutcomeIndex::from_outcomes(vec![
            outcome(&slot, tuesday, OutcomeKind::Canceled),
            outcome(&slot, tuesday, OutcomeKind::Realized),
        ]);
        index.merge_cached_hints(std::slice::from_ref(&slot));

        assert_eq!(index.len(), 1);
        assert_eq!(
            index.get(slot.id, tuesday).map(|o| o.kind),
            Some(OutcomeKind::Realized)
        );
    }

    #[test]
    fn cached_hint_only_answers_for_its_own_date() {
        let mut slot = tuesday_slot();
        slot.last_state = Some(OutcomeKind::Realized);
        slot.last_state_date = Some(date(2024, 1, 9));

        let mut index = OutcomeIndex::default();
        index.merge_cached_hints(std::slice::from_ref(&slot));

        assert!(index.get(slot.id, date(2024, 1, 9)).is_some());
        assert!(index.get(slot.id, date(2024, 1, 16)).is_none());
    }

    #[test]
    fn day_view_skips_inactive_and_reports_bad_slots() {
        let today = date(2024, 1, 9);
        let good = tuesday_slot();
        let mut retired = tuesday_slot();
        retired.active = false;
        let mut broken = tuesday_slot();
        broken.start_time = "??".to_string();
        let slots = vec![good.clone(), retired, broken.clone()];

        let index = OutcomeIndex::from_outcomes(vec![outcome(&good, today, OutcomeKind::Realized)]);
        let resolved = resolve_day(&slots, &index, at(today, 9, 0));

        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].slot.id, good.id);
        assert_eq!(resolved[0].state, Ok(SessionState::Realized));
        assert_eq!(resolved[1].slot.id, broken.id);
        assert!(resolved[1].state.is_err());
    }
}
