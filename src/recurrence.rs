use chrono::{Datelike, Days, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::error::ScheduleError;
use crate::models::{Occurrence, WeeklySlot};
use crate::resolver::{resolve_state, OutcomeIndex};
use crate::schedule::validate_slot;

/// Inclusive calendar range with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ScheduleError> {
        if end < start {
            return Err(ScheduleError::InvalidRange { start, end });
        }
        Ok(DateRange { start, end })
    }

    /// The 1st through the last day of `month`.
    pub fn month(year: i32, month: u32) -> Result<Self, ScheduleError> {
        let invalid = || ScheduleError::InvalidMonth { year, month };
        let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
        let next_first = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        };
        let last = next_first.and_then(|d| d.pred_opt()).ok_or_else(invalid)?;
        DateRange::new(first, last)
    }

    /// Week `week` (1-based) of `month`, counted in 7-day steps from the 1st
    /// and cut off at the end of the month.
    pub fn week_of_month(year: i32, month: u32, week: u32) -> Result<Self, ScheduleError> {
        let month_range = DateRange::month(year, month)?;
        let offset = u64::from(week.saturating_sub(1)) * 7;
        let start = month_range
            .start
            .checked_add_days(Days::new(offset))
            .ok_or(ScheduleError::InvalidMonth { year, month })?;

        if week == 0 {
            return Err(ScheduleError::InvalidMonth { year, month });
        }
        if start > month_range.end {
            return Err(ScheduleError::InvalidRange {
                start,
                end: month_range.end,
            });
        }

        let end = start
            .checked_add_days(Days::new(6))
            .map_or(month_range.end, |end| end.min(month_range.end));
        DateRange::new(start, end)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// Every occurrence of a set of weekly slots inside a range. Cheap to copy;
/// each call to [`Occurrences::iter`] walks the range again from the start.
#[derive(Debug, Clone, Copy)]
pub struct Occurrences<'a> {
    slots: &'a [WeeklySlot],
    outcomes: &'a OutcomeIndex,
    range: DateRange,
    now: NaiveDateTime,
}

pub fn expand_occurrences<'a>(
    slots: &'a [WeeklySlot],
    outcomes: &'a OutcomeIndex,
    range: DateRange,
    now: NaiveDateTime,
) -> Occurrences<'a> {
    Occurrences {
        slots,
        outcomes,
        range,
        now,
    }
}

impl<'a> Occurrences<'a> {
    pub fn iter(&self) -> OccurrenceIter<'a> {
        OccurrenceIter {
            source: *self,
            next_slot: 0,
            cursor: None,
        }
    }
}

impl<'a> IntoIterator for &Occurrences<'a> {
    type Item = Result<Occurrence, ScheduleError>;
    type IntoIter = OccurrenceIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

struct SlotCursor<'a> {
    slot: &'a WeeklySlot,
    next_date: Option<NaiveDate>,
}

/// Yields occurrences slot by slot in date order. A slot that fails
/// validation yields a single `Err` and nothing else.
pub struct OccurrenceIter<'a> {
    source: Occurrences<'a>,
    next_slot: usize,
    cursor: Option<SlotCursor<'a>>,
}

impl<'a> Iterator for OccurrenceIter<'a> {
    type Item = Result<Occurrence, ScheduleError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(cursor) = self.cursor.as_mut() {
                match cursor.next_date.filter(|date| *date <= self.source.range.end) {
                    Some(date) => {
                        cursor.next_date = date.checked_add_days(Days::new(7));
                        let slot = cursor.slot;
                        return Some(self.source.occurrence(slot, date));
                    }
                    None => self.cursor = None,
                }
            }

            let slot = self.source.slots.get(self.next_slot)?;
            self.next_slot += 1;
            if !slot.active {
                continue;
            }

            match first_occurrence(slot, self.source.range) {
                Ok(next_date) => self.cursor = Some(SlotCursor { slot, next_date }),
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

impl<'a> Occurrences<'a> {
    fn occurrence(&self, slot: &WeeklySlot, date: NaiveDate) -> Result<Occurrence, ScheduleError> {
        let outcome = self.outcomes.get(slot.id, date);
        let state = resolve_state(slot, outcome, date, self.now)?;
        Ok(Occurrence {
            date,
            weekday: date.weekday(),
            slot_id: slot.id,
            state,
        })
    }
}

/// First date on or after both the range start and the slot's creation
/// date that falls on the slot's weekday. Slots created after the range
/// are not validated.
fn first_occurrence(
    slot: &WeeklySlot,
    range: DateRange,
) -> Result<Option<NaiveDate>, ScheduleError> {
    if slot.created_on() > range.end {
        return Ok(None);
    }
    let (weekday, _) = validate_slot(slot)?;
    let anchor = slot.created_on().max(range.start);
    let offset = (weekday.num_days_from_sunday() + 7 - anchor.weekday().num_days_from_sunday()) % 7;
    Ok(anchor.checked_add_days(Days::new(u64::from(offset))))
}
