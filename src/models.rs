use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct WeeklySlot {
    pub id: Uuid,
    pub section_id: Uuid,
    pub day_of_week: i16,
    pub start_time: String,
    pub end_time: String,
    pub room: Option<String>,
    pub active: bool,
    pub created_at: NaiveDateTime,
    pub last_state: Option<OutcomeKind>,
    pub last_state_date: Option<NaiveDate>,
}

impl WeeklySlot {
    /// First calendar day on which the slot can occur.
    pub fn created_on(&self) -> NaiveDate {
        self.created_at.date()
    }

    /// The cached hint, keyed by the date it was recorded for. Never consulted
    /// for any other date.
    pub fn cached_outcome(&self) -> Option<SessionOutcome> {
        match (self.last_state, self.last_state_date) {
            (Some(kind), Some(date)) => Some(SessionOutcome {
                slot_id: self.id,
                date,
                kind,
                notes: None,
                topics: None,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub slot_id: Uuid,
    pub date: NaiveDate,
    pub kind: OutcomeKind,
    pub notes: Option<String>,
    pub topics: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Realized,
    Canceled,
    Postponed,
}

impl OutcomeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeKind::Realized => "realized",
            OutcomeKind::Canceled => "canceled",
            OutcomeKind::Postponed => "postponed",
        }
    }

    /// Parses a stored kind column. Empty and `pending` mean nothing was
    /// recorded.
    pub fn parse_recorded(value: &str) -> Result<Option<Self>, UnknownOutcomeKind> {
        match value.trim() {
            "" | "pending" => Ok(None),
            other => other.parse().map(Some),
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown outcome kind: {0}")]
pub struct UnknownOutcomeKind(pub String);

impl FromStr for OutcomeKind {
    type Err = UnknownOutcomeKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "realized" => Ok(OutcomeKind::Realized),
            "canceled" | "cancelled" => Ok(OutcomeKind::Canceled),
            "postponed" => Ok(OutcomeKind::Postponed),
            other => Err(UnknownOutcomeKind(other.to_string())),
        }
    }
}

/// Effective display state of one class occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Scheduled,
    PendingToday,
    InProgress,
    UnrecordedPast,
    Realized,
    Canceled,
    Postponed,
}

impl SessionState {
    pub fn label(self) -> &'static str {
        match self {
            SessionState::Scheduled => "Scheduled",
            SessionState::PendingToday => "Pending",
            SessionState::InProgress => "In progress",
            SessionState::UnrecordedPast => "Unrecorded",
            SessionState::Realized => "Realized",
            SessionState::Canceled => "Canceled",
            SessionState::Postponed => "Postponed",
        }
    }

    pub fn category(self) -> ReportCategory {
        match self {
            SessionState::Realized => ReportCategory::Realized,
            SessionState::Canceled => ReportCategory::Canceled,
            SessionState::Postponed => ReportCategory::Postponed,
            SessionState::Scheduled
            | SessionState::PendingToday
            | SessionState::InProgress
            | SessionState::UnrecordedPast => ReportCategory::Pending,
        }
    }
}

impl From<OutcomeKind> for SessionState {
    fn from(kind: OutcomeKind) -> Self {
        match kind {
            OutcomeKind::Realized => SessionState::Realized,
            OutcomeKind::Canceled => SessionState::Canceled,
            OutcomeKind::Postponed => SessionState::Postponed,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportCategory {
    Realized,
    Canceled,
    Postponed,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Occurrence {
    pub date: NaiveDate,
    pub weekday: Weekday,
    pub slot_id: Uuid,
    pub state: SessionState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub realized: usize,
    pub canceled: usize,
    pub postponed: usize,
    pub pending: usize,
}

impl StateCounts {
    pub fn record(&mut self, state: SessionState) {
        match state.category() {
            ReportCategory::Realized => self.realized += 1,
            ReportCategory::Canceled => self.canceled += 1,
            ReportCategory::Postponed => self.postponed += 1,
            ReportCategory::Pending => self.pending += 1,
        }
    }

    pub fn add(&mut self, other: &StateCounts) {
        self.realized += other.realized;
        self.canceled += other.canceled;
        self.postponed += other.postponed;
        self.pending += other.pending;
    }

    pub fn total(&self) -> usize {
        self.realized + self.canceled + self.postponed + self.pending
    }

    /// Whole-number share of `part` in the total, 0 for an empty count.
    pub fn percentage(&self, part: usize) -> u32 {
        let total = self.total();
        if total == 0 {
            return 0;
        }
        ((part as f64 / total as f64) * 100.0).round() as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeeklyReportBucket {
    pub week: u32,
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
    pub counts: StateCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyReport {
    pub year: i32,
    pub month: u32,
    pub counts: StateCounts,
    pub weeks: Vec<WeeklyReportBucket>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_and_empty_are_not_recorded_kinds() {
        assert_eq!(OutcomeKind::parse_recorded(""), Ok(None));
        assert_eq!(OutcomeKind::parse_recorded("pending"), Ok(None));
        assert_eq!(
            OutcomeKind::parse_recorded("realized"),
            Ok(Some(OutcomeKind::Realized))
        );
        assert!(OutcomeKind::parse_recorded("done").is_err());
    }

    #[test]
    fn only_recorded_states_leave_the_pending_bucket() {
        let mut counts = StateCounts::default();
        for state in [
            SessionState::Scheduled,
            SessionState::PendingToday,
            SessionState::InProgress,
            SessionState::UnrecordedPast,
            SessionState::Realized,
            SessionState::Canceled,
            SessionState::Postponed,
        ] {
            counts.record(state);
        }
        assert_eq!(counts.pending, 4);
        assert_eq!(counts.realized, 1);
        assert_eq!(counts.canceled, 1);
        assert_eq!(counts.postponed, 1);
        assert_eq!(counts.total(), 7);
    }

    #[test]
    fn percentage_rounds_and_handles_empty() {
        let empty = StateCounts::default();
        assert_eq!(empty.percentage(0), 0);

        let counts = StateCounts {
            realized: 2,
            canceled: 1,
            postponed: 0,
            pending: 0,
        };
        assert_eq!(counts.percentage(counts.realized), 67);
        assert_eq!(counts.percentage(counts.canceled), 33);
    }
}
