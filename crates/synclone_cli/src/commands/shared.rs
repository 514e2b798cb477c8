use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use clap::ValueEnum;
use console::style;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use synclone::{JsonFileStore, RunSummary, TargetId};

use crate::config::Config;

/// Output format for summaries and state listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Display as a formatted table (default)
    #[default]
    Table,
    /// Display as JSON
    Json,
}

/// Open the state store configured for this user.
pub(crate) fn open_store(config: &Config) -> Result<Arc<JsonFileStore>, Box<dyn std::error::Error>> {
    let dir = config
        .state_dir()
        .ok_or("Could not determine a state directory; set [state] dir in the config")?;
    Ok(Arc::new(JsonFileStore::new(dir)))
}

pub(crate) fn parse_id(value: &str) -> Result<TargetId, Box<dyn std::error::Error>> {
    TargetId::parse(value).ok_or_else(|| format!("'{value}' is not a valid run identifier").into())
}

/// Parse an RFC 3339 timestamp or a `YYYY-MM-DD` date (midnight UTC).
pub(crate) fn parse_date(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(timestamp) = value.parse::<DateTime<Utc>>() {
        return Ok(timestamp);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        .map_err(|_| format!("'{value}' is not a date (YYYY-MM-DD) or RFC 3339 timestamp"))
}

/// Parse an age such as `90m`, `12h`, `7d` or `2w`.
pub(crate) fn parse_age(value: &str) -> Result<TimeDelta, String> {
    let invalid = || format!("'{value}' is not an age like 12h, 7d or 2w");
    let value = value.trim();
    let split = value.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
    let (amount, unit) = value.split_at(split);
    let amount: i64 = amount.parse().map_err(|_| invalid())?;
    let unit_secs = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        "w" => 7 * 24 * 60 * 60,
        _ => return Err(invalid()),
    };
    amount
        .checked_mul(unit_secs)
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(invalid)
}

pub(crate) fn print_table<T: Tabled>(rows: impl IntoIterator<Item = T>) {
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Tabled)]
struct FailureRow {
    #[tabled(rename = "Repository")]
    repository: String,
    #[tabled(rename = "Attempts")]
    attempts: u32,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// One line of totals, e.g. `3 cloned, 5 updated, 1 failed`.
pub(crate) fn summary_line(summary: &RunSummary) -> String {
    let mut parts = vec![
        format!("{} cloned", summary.cloned),
        format!("{} updated", summary.updated),
        format!("{} skipped", summary.skipped),
        format!("{} failed", summary.failed),
    ];
    if summary.previously_completed > 0 {
        parts.push(format!("{} already done", summary.previously_completed));
    }
    if summary.not_started > 0 {
        parts.push(format!("{} not started", summary.not_started));
    }
    if summary.orphans_removed > 0 {
        parts.push(format!("{} orphans removed", summary.orphans_removed));
    }
    if summary.throttled > 0 {
        parts.push(format!("{} throttled", summary.throttled));
    }
    format!(
        "{} of {} repositories in {:.1}s",
        parts.join(", "),
        summary.total,
        summary.duration.as_secs_f64()
    )
}

/// Print a finished run for humans.
pub(crate) fn print_summary(label: &str, summary: &RunSummary, is_tty: bool) {
    if summary.dry_run {
        let actionable = summary.planned.iter().filter(|p| p.action.is_some()).count();
        println!(
            "{} {}: {} of {} repositories would change (dry run)",
            style("•").cyan(),
            label,
            actionable,
            summary.total
        );
        for plan in summary.planned.iter().filter(|p| p.action.is_none()) {
            if let Some(ref note) = plan.note {
                println!("  {} {}", plan.key, style(note).dim());
            }
        }
        for orphan in &summary.orphans {
            println!("  {} {}", orphan.display(), style("orphan, would be removed").dim());
        }
        return;
    }

    let marker = if summary.is_success() {
        style("✓").green()
    } else if summary.cancelled {
        style("⚠").yellow()
    } else {
        style("✗").red()
    };

    if is_tty {
        println!("{} {}: {}", marker, label, summary_line(summary));
    } else {
        tracing::info!(
            target_name = %label,
            cloned = summary.cloned,
            updated = summary.updated,
            skipped = summary.skipped,
            failed = summary.failed,
            not_started = summary.not_started,
            duration_secs = summary.duration.as_secs_f64(),
            "Run finished"
        );
    }

    if !summary.errors.is_empty() {
        print_table(summary.errors.iter().map(|e| FailureRow {
            repository: e.key.to_string(),
            attempts: e.attempts,
            reason: e.reason.clone(),
        }));
    }
    if summary.cancelled {
        println!("Interrupted. Continue with: synclone run {label} --resume");
    }
}
