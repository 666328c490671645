use std::collections::BTreeSet;
use std::fmt::Write;

use chrono::{Datelike, Days, NaiveDate};
use tracing::warn;

use crate::error::ScheduleError;
use crate::models::{MonthlyReport, Occurrence, StateCounts, WeeklyReportBucket, WeeklySlot};
use crate::recurrence::{DateRange, Occurrences};

/// Drains an occurrence view, setting aside slots that failed validation.
pub fn collect_occurrences(
    occurrences: &Occurrences<'_>,
) -> (Vec<Occurrence>, Vec<ScheduleError>) {
    let mut valid = Vec::new();
    let mut rejected = Vec::new();

    for item in occurrences {
        match item {
            Ok(occurrence) => valid.push(occurrence),
            Err(err) => {
                warn!(error = %err, "skipping slot with inconsistent schedule data");
                rejected.push(err);
            }
        }
    }

    (valid, rejected)
}

/// Splits `range` into 7-day windows anchored at its first day and counts
/// occurrences per window. Windows without occurrences are left out.
pub fn aggregate_by_week(occurrences: &[Occurrence], range: DateRange) -> Vec<WeeklyReportBucket> {
    let mut weeks = Vec::new();
    let mut week = 1u32;
    let mut first_day = Some(range.start());

    while let Some(start) = first_day.filter(|day| *day <= range.end()) {
        let last_day = start
            .checked_add_days(Days::new(6))
            .map_or(range.end(), |day| day.min(range.end()));

        let bucket = count_window(week, start, last_day, occurrences);
        if bucket.counts.total() > 0 {
            weeks.push(bucket);
        }

        first_day = last_day.succ_opt();
        week += 1;
    }

    weeks
}

pub fn aggregate_month(
    year: i32,
    month: u32,
    occurrences: &[Occurrence],
) -> Result<MonthlyReport, ScheduleError> {
    let range = DateRange::month(year, month)?;
    let weeks = aggregate_by_week(occurrences, range);

    let mut counts = StateCounts::default();
    for week in &weeks {
        counts.add(&week.counts);
    }

    Ok(MonthlyReport {
        year,
        month,
        counts,
        weeks,
    })
}

/// A single week of the month, reported even when no class fell in it.
pub fn week_report(
    year: i32,
    month: u32,
    week: u32,
    occurrences: &[Occurrence],
) -> Result<WeeklyReportBucket, ScheduleError> {
    let range = DateRange::week_of_month(year, month, week)?;
    Ok(count_window(week, range.start(), range.end(), occurrences))
}

fn count_window(
    week: u32,
    first_day: NaiveDate,
    last_day: NaiveDate,
    occurrences: &[Occurrence],
) -> WeeklyReportBucket {
    let mut counts = StateCounts::default();
    for occurrence in occurrences
        .iter()
        .filter(|o| first_day <= o.date && o.date <= last_day)
    {
        counts.record(occurrence.state);
    }

    WeeklyReportBucket {
        week,
        first_day,
        last_day,
        counts,
    }
}

/// Years in which the section's active slots were created, newest first.
pub fn report_years(slots: &[WeeklySlot], today: NaiveDate) -> Vec<i32> {
    let years: BTreeSet<i32> = slots
        .iter()
        .filter(|slot| slot.active)
        .map(|slot| slot.created_on().year())
        .collect();

    if years.is_empty() {
        return vec![today.year()];
    }
    years.into_iter().rev().collect()
}

pub fn month_name(month: u32) -> &'static str {
    match month {
        1 => "January",
        2 => "February",
        3 => "March",
        4 => "April",
        5 => "May",
        6 => "June",
        7 => "July",
        8 => "August",
        9 => "September",
        10 => "October",
        11 => "November",
        12 => "December",
        _ => "Unknown",
    }
}

fn day_label(date: NaiveDate) -> String {
    date.format("%d %b").to_string()
}

fn write_counts(output: &mut String, counts: &StateCounts) {
    let _ = writeln!(
        output,
        "- Realized: {} ({}%)",
        counts.realized,
        counts.percentage(counts.realized)
    );
    let _ = writeln!(
        output,
        "- Canceled: {} ({}%)",
        counts.canceled,
        counts.percentage(counts.canceled)
    );
    let _ = writeln!(
        output,
        "- Postponed: {} ({}%)",
        counts.postponed,
        counts.percentage(counts.postponed)
    );
    let _ = writeln!(
        output,
        "- Pending: {} ({}%)",
        counts.pending,
        counts.percentage(counts.pending)
    );
}

pub fn render_markdown(section: &str, report: &MonthlyReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Class Attendance Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} {})",
        section,
        month_name(report.month),
        report.year
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Month Summary");

    if report.counts.total() == 0 {
        let _ = writeln!(output, "No classes scheduled for this month.");
        return output;
    }

    let _ = writeln!(output, "Total classes: {}", report.counts.total());
    write_counts(&mut output, &report.counts);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Weekly Breakdown");
    let _ = writeln!(output, "| Week | Dates | Total | Realized | Canceled | Postponed | Pending |");
    let _ = writeln!(output, "|---|---|---|---|---|---|---|");
    for week in &report.weeks {
        let _ = writeln!(
            output,
            "| {} | {} - {} | {} | {} | {} | {} | {} |",
            week.week,
            day_label(week.first_day),
            day_label(week.last_day),
            week.counts.total(),
            week.counts.realized,
            week.counts.canceled,
            week.counts.postponed,
            week.counts.pending
        );
    }

    output
}

pub fn render_week_markdown(section: &str, week: &WeeklyReportBucket) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Weekly Class Report");
    let _ = writeln!(
        output,
        "Generated for {} (week {}: {} - {})",
        section,
        week.week,
        day_label(week.first_day),
        day_label(week.last_day)
    );
    let _ = writeln!(output);

    if week.counts.total() == 0 {
        let _ = writeln!(output, "No classes scheduled for this week.");
    } else {
        let _ = writeln!(output, "Total classes: {}", week.counts.total());
        write_counts(&mut output, &week.counts);
    }

    output
}
