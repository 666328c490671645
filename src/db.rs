use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{OutcomeKind, SessionOutcome, WeeklySlot};
use crate::recurrence::DateRange;
use crate::error::ScheduleError;
use crate::schedule::validate_slot;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

const SEED_SECTION: &str = "6f1c2a4e-8d3b-4b7a-9c51-2e0d7a9f4b13";

pub async fn seed(pool: &PgPool) -> anyhow::Result<Uuid> {
    let section_id = Uuid::parse_str(SEED_SECTION)?;
    let created_at = NaiveDate::from_ymd_opt(2024, 1, 8)
        .and_then(|d| d.and_hms_opt(7, 30, 0))
        .context("invalid seed timestamp")?;

    sqlx::query(
        r#"
        INSERT INTO class_sessions.sections (id, name)
        VALUES ($1, $2)
        ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
        "#,
    )
    .bind(section_id)
    .bind("Algebra I - Section A")
    .execute(pool)
    .await?;

    let slots = vec![
        ("1b7e3c52-0a4f-4d8e-b6a1-5f9c2d7e8a01", 1i16, "08:00", "10:00", "B-204"),
        ("2c8f4d63-1b5a-4e9f-a7b2-6a0d3e8f9b02", 3i16, "10:00", "12:00", "B-204"),
        ("3d9a5e74-2c6b-4fa0-b8c3-7b1e4f9a0c03", 5i16, "14:00", "15:30", "Lab 2"),
    ];

    for &(id, day_of_week, start, end, room) in &slots {
        sqlx::query(
            r#"
            INSERT INTO class_sessions.weekly_slots
            (id, section_id, day_of_week, start_time, end_time, room, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(Uuid::parse_str(id)?)
        .bind(section_id)
        .bind(day_of_week)
        .bind(start)
        .bind(end)
        .bind(room)
        .bind(created_at)
        .execute(pool)
        .await?;
    }

    let outcomes = vec![
        (slots[0].0, (2024, 1, 8), OutcomeKind::Realized, Some("Course overview")),
        (slots[1].0, (2024, 1, 10), OutcomeKind::Realized, Some("Linear equations")),
        (slots[2].0, (2024, 1, 12), OutcomeKind::Canceled, None),
        (slots[0].0, (2024, 1, 15), OutcomeKind::Postponed, None),
    ];

    for (slot_id, (y, m, d), kind, topics) in outcomes {
        let outcome = SessionOutcome {
            slot_id: Uuid::parse_str(slot_id)?,
            date: NaiveDate::from_ymd_opt(y, m, d).context("invalid seed date")?,
            kind,
            notes: None,
            topics: topics.map(str::to_string),
        };
        upsert_outcome(pool, &outcome).await?;
    }

    Ok(section_id)
}

pub async fn fetch_section_name(
    pool: &PgPool,
    section_id: Uuid,
) -> anyhow::Result<Option<String>> {
    let row = sqlx::query("SELECT name FROM class_sessions.sections WHERE id = $1")
        .bind(section_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.get("name")))
}

fn slot_from_row(row: &PgRow) -> WeeklySlot {
    let id: Uuid = row.get("id");
    let last_state: Option<String> = row.get("last_state");
    let last_state = last_state.and_then(|value| match OutcomeKind::parse_recorded(&value) {
        Ok(kind) => kind,
        Err(err) => {
            warn!(slot_id = %id, error = %err, "ignoring unreadable cached state");
            None
        }
    });

    WeeklySlot {
        id,
        section_id: row.get("section_id"),
        day_of_week: row.get("day_of_week"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        room: row.get("room"),
        active: row.get("active"),
        created_at: row.get("created_at"),
        last_state,
        last_state_date: row.get("last_state_date"),
    }
}

/// Active slots of a section.
pub async fn fetch_active_slots(
    pool: &PgPool,
    section_id: Uuid,
) -> anyhow::Result<Vec<WeeklySlot>> {
    let rows = sqlx::query(
        r#"
        SELECT id, section_id, day_of_week, start_time, end_time, room, active,
               created_at, last_state, last_state_date
        FROM class_sessions.weekly_slots
        WHERE section_id = $1 AND active = TRUE
        ORDER BY day_of_week, start_time
        "#,
    )
    .bind(section_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to load slots for section {section_id}"))?;

    Ok(rows.iter().map(slot_from_row).collect())
}

pub async fn fetch_slot(pool: &PgPool, slot_id: Uuid) -> anyhow::Result<Option<WeeklySlot>> {
    let row = sqlx::query(
        r#"
        SELECT id, section_id, day_of_week, start_time, end_time, room, active,
               created_at, last_state, last_state_date
        FROM class_sessions.weekly_slots
        WHERE id = $1
        "#,
    )
    .bind(slot_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(slot_from_row))
}

/// Recorded outcomes of a section's slots within `range`.
pub async fn fetch_outcomes(
    pool: &PgPool,
    section_id: Uuid,
    range: DateRange,
) -> anyhow::Result<Vec<SessionOutcome>> {
    let rows = sqlx::query(
        r#"
        SELECT o.slot_id, o.session_date, o.kind, o.notes, o.topics
        FROM class_sessions.session_outcomes o
        JOIN class_sessions.weekly_slots s ON s.id = o.slot_id
        WHERE s.section_id = $1
          AND o.session_date BETWEEN $2 AND $3
        ORDER BY o.session_date, o.recorded_at
        "#,
    )
    .bind(section_id)
    .bind(range.start())
    .bind(range.end())
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to load outcomes for section {section_id}"))?;

    let mut outcomes = Vec::new();
    for row in rows {
        let kind: String = row.get("kind");
        let Some(kind) = OutcomeKind::parse_recorded(&kind)? else {
            continue;
        };

        outcomes.push(SessionOutcome {
            slot_id: row.get("slot_id"),
            date: row.get("session_date"),
            kind,
            notes: row.get("notes"),
            topics: row.get("topics"),
        });
    }

    Ok(outcomes)
}

/// Stores the outcome for (slot, date), replacing any earlier one, and
/// refreshes the slot's cached state when this is its newest record.
pub async fn upsert_outcome(pool: &PgPool, outcome: &SessionOutcome) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO class_sessions.session_outcomes
        (slot_id, session_date, kind, notes, topics)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (slot_id, session_date) DO UPDATE
        SET kind = EXCLUDED.kind,
            notes = EXCLUDED.notes,
            topics = EXCLUDED.topics,
            recorded_at = now()
        "#,
    )
    .bind(outcome.slot_id)
    .bind(outcome.date)
    .bind(outcome.kind.as_str())
    .bind(&outcome.notes)
    .bind(&outcome.topics)
    .execute(&mut *tx)
    .await
    .with_context(|| format!("failed to record outcome for slot {}", outcome.slot_id))?;

    sqlx::query(
        r#"
        UPDATE class_sessions.weekly_slots
        SET last_state = $2, last_state_date = $3
        WHERE id = $1 AND (last_state_date IS NULL OR last_state_date <= $3)
        "#,
    )
    .bind(outcome.slot_id)
    .bind(outcome.kind.as_str())
    .bind(outcome.date)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Soft delete; history keeps referencing the slot.
pub async fn deactivate_slot(pool: &PgPool, slot_id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query("UPDATE class_sessions.weekly_slots SET active = FALSE WHERE id = $1")
        .bind(slot_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[derive(Debug, Default)]
pub struct ImportSummary {
    pub inserted: usize,
    pub skipped: usize,
}

#[derive(Debug, serde::Deserialize)]
struct CsvSlotRow {
    section_name: String,
    day_of_week: i16,
    start_time: String,
    end_time: String,
    room: Option<String>,
    created_at: Option<NaiveDateTime>,
}

/// Builds and validates the slot for one CSV row. The section is resolved
/// by the caller once the row is known to be valid.
fn slot_from_csv_row(row: CsvSlotRow, now: NaiveDateTime) -> Result<WeeklySlot, ScheduleError> {
    let slot = WeeklySlot {
        id: Uuid::new_v4(),
        section_id: Uuid::nil(),
        day_of_week: row.day_of_week,
        start_time: row.start_time,
        end_time: row.end_time,
        room: row.room.filter(|room| !room.trim().is_empty()),
        active: true,
        created_at: row.created_at.unwrap_or(now),
        last_state: None,
        last_state_date: None,
    };
    validate_slot(&slot)?;
    Ok(slot)
}

pub async fn import_slots_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
) -> anyhow::Result<ImportSummary> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut summary = ImportSummary::default();
    let now = chrono::Local::now().naive_local();

    for (line, result) in reader.deserialize::<CsvSlotRow>().enumerate() {
        let row = result.with_context(|| format!("row {} of {}", line + 1, csv_path.display()))?;
        let section_name = row.section_name.clone();

        let mut slot = match slot_from_csv_row(row, now) {
            Ok(slot) => slot,
            Err(err) => {
                warn!(row = line + 1, error = %err, "skipping invalid slot row");
                summary.skipped += 1;
                continue;
            }
        };

        slot.section_id = sqlx::query(
            r#"
            INSERT INTO class_sessions.sections (id, name)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&section_name)
        .fetch_one(pool)
        .await?
        .get("id");

        let result = sqlx::query(
            r#"
            INSERT INTO class_sessions.weekly_slots
            (id, section_id, day_of_week, start_time, end_time, room, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (section_id, day_of_week, start_time) DO NOTHING
            "#,
        )
        .bind(slot.id)
        .bind(slot.section_id)
        .bind(slot.day_of_week)
        .bind(&slot.start_time)
        .bind(&slot.end_time)
        .bind(&slot.room)
        .bind(slot.created_at)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            summary.inserted += 1;
        }
    }

    info!(
        inserted = summary.inserted,
        skipped = summary.skipped,
        "slot import finished"
    );
    Ok(summary)
}
