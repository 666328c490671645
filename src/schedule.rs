use chrono::{Datelike, NaiveDate, NaiveTime, Timelike, Weekday};

use crate::error::ScheduleError;
use crate::models::WeeklySlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time <= self.end
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

impl WeeklySlot {
    /// Parsed start/end; rejects unparseable times and empty or overnight spans.
    pub fn time_window(&self) -> Result<TimeWindow, ScheduleError> {
        let start = parse_time_of_day(&self.start_time).ok_or_else(|| {
            ScheduleError::malformed(self.id, format!("bad start time {:?}", self.start_time))
        })?;
        let end = parse_time_of_day(&self.end_time).ok_or_else(|| {
            ScheduleError::malformed(self.id, format!("bad end time {:?}", self.end_time))
        })?;

        if start >= end {
            return Err(ScheduleError::malformed(
                self.id,
                format!("start {} is not before end {}", self.start_time, self.end_time),
            ));
        }

        Ok(TimeWindow { start, end })
    }

    /// Whether a class of this slot falls on `date`.
    pub fn meets_on(&self, date: NaiveDate) -> bool {
        weekday_from_index(self.day_of_week) == Some(date.weekday()) && date >= self.created_on()
    }

    pub fn weekday(&self) -> Result<Weekday, ScheduleError> {
        weekday_from_index(self.day_of_week).ok_or_else(|| {
            ScheduleError::malformed(self.id, format!("weekday {} outside 0..=6", self.day_of_week))
        })
    }
}

/// Checks every invariant the resolver relies on.
pub fn validate_slot(slot: &WeeklySlot) -> Result<(Weekday, TimeWindow), ScheduleError> {
    Ok((slot.weekday()?, slot.time_window()?))
}

/// Accepts `HH:MM` and `HH:MM:SS`.
pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

/// 0 = Sunday .. 6 = Saturday.
pub fn weekday_from_index(index: i16) -> Option<Weekday> {
    match index {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

pub fn weekday_index(weekday: Weekday) -> i16 {
    weekday.num_days_from_sunday() as i16
}

pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Sun => "Sunday",
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
    }
}

pub fn format_12h(time: NaiveTime) -> String {
    let (is_pm, hour) = time.hour12();
    format!("{}:{:02} {}", hour, time.minute(), if is_pm { "PM" } else { "AM" })
}

/// Active slots held on `weekday`, earliest start first. Slots whose start
/// time cannot be parsed sort last.
pub fn slots_for_weekday(slots: &[WeeklySlot], weekday: Weekday) -> Vec<&WeeklySlot> {
    let day = weekday_index(weekday);
    let mut matching: Vec<&WeeklySlot> = slots
        .iter()
        .filter(|slot| slot.active && slot.day_of_week == day)
        .collect();

    matching.sort_by_key(|slot| {
        let start = parse_time_of_day(&slot.start_time);
        (start.is_none(), start)
    });
    matching
}

/// Sunday-first week order used by the calendar view.
pub const WEEK_ORDER: [Weekday; 7] = [
    Weekday::Sun,
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
];

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample_slot(day_of_week: i16, start: &str, end: &str) -> WeeklySlot {
        WeeklySlot {
            id: Uuid::new_v4(),
            section_id: Uuid::new_v4(),
            day_of_week,
            start_time: start.to_string(),
            end_time: end.to_string(),
            room: Some("B-204".to_string()),
            active: true,
            created_at: NaiveDate::from_ymd_opt(2024, 1, 1)
                .and_then(|d| d.and_hms_opt(9, 0, 0))
                .expect("valid timestamp"),
            last_state: None,
            last_state_date: None,
        }
    }

    #[test]
    fn parses_both_time_formats() {
        let expected = NaiveTime::from_hms_opt(8, 30, 0);
        assert_eq!(parse_time_of_day("08:30"), expected);
        assert_eq!(parse_time_of_day("08:30:00"), expected);
        assert_eq!(parse_time_of_day("8.30"), None);
        assert_eq!(parse_time_of_day("25:00"), None);
    }

    #[test]
    fn rejects_unparseable_and_inverted_windows() {
        let bad_start = sample_slot(2, "eight", "10:00");
        assert!(matches!(
            bad_start.time_window(),
            Err(ScheduleError::MalformedSchedule { .. })
        ));

        let inverted = sample_slot(2, "10:00", "08:00");
        assert!(inverted.time_window().is_err());

        let empty = sample_slot(2, "10:00", "10:00");
        assert!(empty.time_window().is_err());

        let ok = sample_slot(2, "08:00", "09:45");
        assert_eq!(ok.time_window().map(|w| w.duration_minutes()), Ok(105));
    }

    #[test]
    fn weekday_index_round_trips_sunday_first() {
        assert_eq!(weekday_from_index(0), Some(Weekday::Sun));
        assert_eq!(weekday_from_index(6), Some(Weekday::Sat));
        assert_eq!(weekday_from_index(7), None);
        assert_eq!(weekday_index(Weekday::Tue), 2);
        assert!(validate_slot(&sample_slot(9, "08:00", "09:00")).is_err());
    }

    #[test]
    fn meets_only_on_its_weekday_after_creation() {
        let slot = sample_slot(2, "08:00", "10:00");
        let day = |d| NaiveDate::from_ymd_opt(2024, 1, d).expect("valid date");
        assert!(slot.meets_on(day(2)));
        assert!(!slot.meets_on(day(3)));

        let mut late = slot.clone();
        late.created_at = day(10).and_hms_opt(0, 0, 0).expect("valid time");
        assert!(!late.meets_on(day(9)));
        assert!(late.meets_on(day(16)));
    }

    #[test]
    fn formats_twelve_hour_clock() {
        let time = |h, m| NaiveTime::from_hms_opt(h, m, 0).expect("valid time");
        assert_eq!(format_12h(time(8, 0)), "8:00 AM");
        assert_eq!(format_12h(time(12, 30)), "12:30 PM");
        assert_eq!(format_12h(time(0, 5)), "12:05 AM");
        assert_eq!(format_12h(time(17, 45)), "5:45 PM");
    }

    #[test]
    fn weekday_columns_skip_inactive_and_sort_by_start() {
        let late = sample_slot(3, "14:00", "16:00");
        let early = sample_slot(3, "08:00", "10:00");
        let mut inactive = sample_slot(3, "07:00", "08:00");
        inactive.active = false;
        let other_day = sample_slot(4, "07:00", "08:00");
        let slots = vec![late.clone(), inactive, early.clone(), other_day];

        let column = slots_for_weekday(&slots, Weekday::Wed);
        let ids: Vec<Uuid> = column.iter().map(|slot| slot.id).collect();
        assert_eq!(ids, vec![early.id, late.id]);
    }
}
