use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod config;
mod db;
mod error;
mod models;
mod recurrence;
mod report;
mod resolver;
mod schedule;

use models::{OutcomeKind, SessionOutcome};
use recurrence::{expand_occurrences, DateRange};
use resolver::{resolve_day, OutcomeIndex};

#[derive(Parser)]
#[command(name = "class-session-ledger")]
#[command(about = "Weekly class schedules, session outcomes and attendance reports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a sample section with a few recorded sessions
    Seed,
    /// Import weekly slots from a CSV file
    ImportSlots {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Show this week's schedule with the state of today's classes
    Today {
        #[arg(long)]
        section: Uuid,
        /// Evaluate as if it were this local time (YYYY-MM-DDTHH:MM:SS)
        #[arg(long)]
        now: Option<NaiveDateTime>,
    },
    /// Record what happened in one class session
    Record {
        #[arg(long)]
        slot: Uuid,
        #[arg(long)]
        outcome: OutcomeKind,
        /// Session date, defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        topics: Option<String>,
    },
    /// Retire a slot without losing its history
    Deactivate {
        #[arg(long)]
        slot: Uuid,
    },
    /// Generate a monthly (or single week) attendance report
    Report {
        #[arg(long)]
        section: Uuid,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        month: Option<u32>,
        /// Week of the month, counted in 7-day blocks from the 1st; the last
        /// week stops at the month end instead of running into the next month
        #[arg(long)]
        week: Option<u32>,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        now: Option<NaiveDateTime>,
    },
    /// List the years a section has schedule data for
    Years {
        #[arg(long)]
        section: Uuid,
    },
}

fn init_logging() {
    let debug_enabled = std::env::var("SESSION_LEDGER_DEBUG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let settings = config::Settings::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let section_id = db::seed(&pool).await?;
            println!("Seed data inserted for section {section_id}.");
        }
        Commands::ImportSlots { csv } => {
            let summary = db::import_slots_csv(&pool, &csv).await?;
            println!(
                "Inserted {} slots from {} ({} rows skipped).",
                summary.inserted,
                csv.display(),
                summary.skipped
            );
        }
        Commands::Today { section, now } => {
            let now = now.unwrap_or_else(local_now);
            print_week_view(&pool, section, now).await?;
        }
        Commands::Record {
            slot,
            outcome,
            date,
            notes,
            topics,
        } => {
            let date = date.unwrap_or_else(|| local_now().date());
            let Some(weekly_slot) = db::fetch_slot(&pool, slot).await? else {
                bail!("slot {slot} does not exist");
            };
            if !weekly_slot.active {
                bail!("slot {slot} has been deactivated");
            }
            if !weekly_slot.meets_on(date) {
                warn!(%slot, %date, "recording an outcome for a date the slot does not meet on");
            }

            db::upsert_outcome(
                &pool,
                &SessionOutcome {
                    slot_id: slot,
                    date,
                    kind: outcome,
                    notes,
                    topics,
                },
            )
            .await?;
            info!(%slot, %date, kind = %outcome, "session outcome recorded");
            println!("Recorded {outcome} for {date}.");
        }
        Commands::Deactivate { slot } => {
            if db::deactivate_slot(&pool, slot).await? {
                println!("Slot {slot} deactivated.");
            } else {
                println!("No slot with id {slot}.");
            }
        }
        Commands::Report {
            section,
            year,
            month,
            week,
            json,
            out,
            now,
        } => {
            let now = now.unwrap_or_else(local_now);
            let year = year.unwrap_or_else(|| now.year());
            let month = month.unwrap_or_else(|| now.month());
            let rendered = build_report(&pool, section, year, month, week, json, now).await?;

            match out {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Report written to {}.", path.display());
                }
                None => print!("{rendered}"),
            }
        }
        Commands::Years { section } => {
            let slots = db::fetch_active_slots(&pool, section).await?;
            let years = report::report_years(&slots, local_now().date());
            let listed: Vec<String> = years.iter().map(i32::to_string).collect();
            println!("{}", listed.join(", "));
        }
    }

    Ok(())
}

async fn section_label(pool: &sqlx::PgPool, section: Uuid) -> anyhow::Result<String> {
    Ok(db::fetch_section_name(pool, section)
        .await?
        .unwrap_or_else(|| section.to_string()))
}

async fn build_report(
    pool: &sqlx::PgPool,
    section: Uuid,
    year: i32,
    month: u32,
    week: Option<u32>,
    json: bool,
    now: NaiveDateTime,
) -> anyhow::Result<String> {
    let range = match week {
        Some(week) => DateRange::week_of_month(year, month, week)?,
        None => DateRange::month(year, month)?,
    };

    let slots = db::fetch_active_slots(pool, section).await?;
    let recorded = db::fetch_outcomes(pool, section, range).await?;
    let mut outcomes = OutcomeIndex::from_outcomes(recorded);
    outcomes.merge_cached_hints(&slots);

    let view = expand_occurrences(&slots, &outcomes, range, now);
    let (occurrences, rejected) = report::collect_occurrences(&view);
    if !rejected.is_empty() {
        warn!(
            skipped = rejected.len(),
            "some slots were left out of the report because their schedule is malformed"
        );
    }
    info!(
        %section,
        from = %range.start(),
        to = %range.end(),
        days = range.num_days(),
        recorded = outcomes.len(),
        occurrences = occurrences.len(),
        "report computed"
    );

    let label = section_label(pool, section).await?;
    let rendered = match week {
        Some(week) => {
            let bucket = report::week_report(year, month, week, &occurrences)?;
            if json {
                serde_json::to_string_pretty(&bucket)? + "\n"
            } else {
                report::render_week_markdown(&label, &bucket)
            }
        }
        None => {
            let monthly = report::aggregate_month(year, month, &occurrences)?;
            if json {
                serde_json::to_string_pretty(&monthly)? + "\n"
            } else {
                report::render_markdown(&label, &monthly)
            }
        }
    };

    Ok(rendered)
}

async fn print_week_view(
    pool: &sqlx::PgPool,
    section: Uuid,
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    let today = now.date();
    let slots = db::fetch_active_slots(pool, section).await?;
    let mut outcomes = OutcomeIndex::from_outcomes(
        db::fetch_outcomes(pool, section, DateRange::new(today, today)?).await?,
    );
    outcomes.merge_cached_hints(&slots);

    let resolved: HashMap<Uuid, _> = resolve_day(&slots, &outcomes, now)
        .into_iter()
        .map(|entry| (entry.slot.id, entry.state))
        .collect();

    println!("{} - {}", section_label(pool, section).await?, today);
    for weekday in schedule::WEEK_ORDER {
        let column = schedule::slots_for_weekday(&slots, weekday);
        if column.is_empty() {
            continue;
        }

        let marker = if weekday == today.weekday() { " (today)" } else { "" };
        println!();
        println!("{}{}", schedule::weekday_name(weekday), marker);

        for slot in column {
            let state = match resolved.get(&slot.id) {
                Some(Ok(state)) => state.label().to_string(),
                Some(Err(err)) => {
                    warn!(error = %err, "slot cannot be shown");
                    continue;
                }
                None => continue,
            };
            let Ok(window) = slot.time_window() else {
                continue;
            };
            let room = slot.room.as_deref().unwrap_or("-");
            println!(
                "  {} - {} ({} min)  {:<8} {}",
                schedule::format_12h(window.start),
                schedule::format_12h(window.end),
                window.duration_minutes(),
                room,
                state
            );
            if let Some(notes) = outcomes
                .get(slot.id, today)
                .and_then(|outcome| outcome.notes.as_deref())
            {
                println!("      notes: {notes}");
            }
        }
    }

    Ok(())
}
