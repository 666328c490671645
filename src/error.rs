use chrono::NaiveDate;
use uuid::Uuid;

/// Failures raised by the schedule core. Both are surfaced immediately;
/// callers decide whether to skip a slot or abort.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("malformed schedule for slot {slot_id}: {details}")]
    MalformedSchedule { slot_id: Uuid, details: String },

    #[error("invalid date range: {end} is before {start}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("no such calendar month: {year}-{month:02}")]
    InvalidMonth { year: i32, month: u32 },
}

impl ScheduleError {
    pub fn malformed(slot_id: Uuid, details: impl Into<String>) -> Self {
        ScheduleError::MalformedSchedule {
            slot_id,
            details: details.into(),
        }
    }
}
