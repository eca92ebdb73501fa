//! Command-line surface: run flags plus checkpoint inspect/reset.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use clap::{Parser, Subcommand};

use crate::config::RunOptions;

/// Harvest Q&A pairs from a mailbox's sent folder.
#[derive(Debug, Parser)]
#[command(name = "qa-harvest", version, about)]
pub struct Cli {
    /// Start of the fetch window (ISO-8601 date or timestamp, UTC).
    #[arg(long, value_parser = parse_since)]
    pub since: Option<DateTime<Utc>>,

    /// End of the fetch window, inclusive. A bare date means end of
    /// that day, UTC.
    #[arg(long, value_parser = parse_until)]
    pub until: Option<DateTime<Utc>>,

    /// Maximum number of messages to fetch.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Skip the oracle; exercise only fetch/normalize/gate/write.
    #[arg(long)]
    pub dry_run: bool,

    /// Ignore the stored checkpoint when computing the fetch window.
    #[arg(long)]
    pub no_resume: bool,

    /// Debug-level logging.
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inspect or reset the stored checkpoint.
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum CheckpointAction {
    /// Print the stored position.
    Inspect,
    /// Delete the checkpoint so the next run starts fresh.
    Reset {
        /// Skip the confirmation prompt.
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    pub fn to_run_options(&self) -> RunOptions {
        RunOptions {
            since: self.since,
            until: self.until,
            limit: self.limit,
            dry_run: self.dry_run,
            resume: !self.no_resume,
            verbose: self.verbose,
        }
    }
}

/// Checkpoint reset guard. Requires the exact token `RESET` unless
/// forced; the input function is injectable for tests.
pub fn confirm_reset(force: bool, mut input: impl FnMut(&str) -> String) -> bool {
    if force {
        return true;
    }
    input("Type RESET to delete the stored checkpoint: ").trim() == "RESET"
}

fn parse_since(value: &str) -> Result<DateTime<Utc>, String> {
    parse_bound(value, NaiveTime::MIN)
}

fn parse_until(value: &str) -> Result<DateTime<Utc>, String> {
    let end_of_day = NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN);
    parse_bound(value, end_of_day)
}

fn parse_bound(value: &str, bare_date_time: NaiveTime) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = value.parse::<NaiveDateTime>() {
        return Ok(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_time(bare_date_time).and_utc());
    }
    Err(format!("not an ISO-8601 date or timestamp: {value}"))
}
