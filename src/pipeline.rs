//! Run orchestrator. One pass over the mailbox: resolve the effective
//! window from checkpoint + options, fetch, clean each message, query
//! the oracle, gate the candidate, append the outcome, then write the
//! manifest and advance the checkpoint.
//!
//! No retries anywhere. A mailbox or oracle transport failure aborts
//! the run before the manifest is written and before the checkpoint
//! moves; records appended up to that point stay on disk.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::{AppConfig, RunOptions};
use crate::error::Result;
use crate::mailbox::{FetchQuery, MessageSource};
use crate::normalize::normalize;
use crate::oracle::{ExtractionCandidate, ExtractionOracle};
use crate::prompts::build_user_prompt;
use crate::quality::{GateOutcome, QualityState, evaluate};
use crate::records::{RejectedRecord, RunManifest};
use crate::sink::RunSink;

/// Execute one run. Returns the run's output directory.
pub async fn run_pipeline(
    config: &AppConfig,
    options: &RunOptions,
    source: &dyn MessageSource,
    oracle: &dyn ExtractionOracle,
) -> Result<PathBuf> {
    let started_at = Utc::now();
    let output_root = PathBuf::from(&config.output_dir);
    let sink = RunSink::create(&output_root, started_at).await?;
    let store = CheckpointStore::new(&output_root);
    info!(run_id = %sink.run_id(), output = %sink.run_dir().display(), "Run initialized");

    // The checkpoint is loaded even with resume disabled: it still
    // feeds the per-message skip filter below, just not the window.
    let checkpoint = store.load().await?;
    let since = resolve_since(options, checkpoint.as_ref());
    match (&checkpoint, options.resume) {
        (Some(cp), true) => info!(
            last_sent_at = %cp.last_sent_at.to_rfc3339(),
            last_message_id = %cp.last_message_id,
            "Loaded checkpoint"
        ),
        (None, true) => info!("Resume enabled but no checkpoint file found"),
        (_, false) => info!("Resume disabled; window comes from the provided options alone"),
    }

    let query = FetchQuery {
        since,
        until: options.until,
        limit: options.limit,
    };
    info!(
        since = %since.map(|s| s.to_rfc3339()).unwrap_or_else(|| "open".into()),
        until = %options.until.map(|u| u.to_rfc3339()).unwrap_or_else(|| "open".into()),
        "Fetching sent messages"
    );
    let messages = source.fetch(&query).await?;
    info!(fetched = messages.len(), "Fetch complete");

    let mut state = QualityState::new();
    let mut accepted: u64 = 0;
    let mut rejected: u64 = 0;
    let mut high_water: Option<(DateTime<Utc>, String)> = None;

    for message in &messages {
        debug!(message_id = %message.message_id, sent_at = %message.sent_at.to_rfc3339(), "Processing message");

        if let Some(cp) = &checkpoint
            && (message.sent_at, message.message_id.as_str())
                <= (cp.last_sent_at, cp.last_message_id.as_str())
        {
            debug!(message_id = %message.message_id, "Skipped by checkpoint");
            continue;
        }

        // The mark advances before the outcome is known; rejected
        // messages count as processed too.
        if high_water
            .as_ref()
            .is_none_or(|(sent_at, id)| (message.sent_at, message.message_id.as_str()) > (*sent_at, id.as_str()))
        {
            high_water = Some((message.sent_at, message.message_id.clone()));
        }

        let cleaned = normalize(&message.body);
        if !cleaned.has_enough_content {
            sink.append_rejected(&RejectedRecord::new(message, "insufficient_content"))
                .await?;
            rejected += 1;
            debug!(message_id = %message.message_id, "Rejected: insufficient_content");
            continue;
        }

        let candidate = if options.dry_run {
            debug!(message_id = %message.message_id, "Oracle skipped (dry-run)");
            ExtractionCandidate::empty("dry_run")
        } else {
            let prompt = build_user_prompt(message, &cleaned.text);
            let candidate = oracle.extract(&prompt).await?;
            debug!(
                message_id = %message.message_id,
                confidence = %format!("{:.2}", candidate.confidence),
                "Oracle extraction complete"
            );
            candidate
        };

        match evaluate(message, &candidate, config.min_confidence, &mut state) {
            GateOutcome::Accepted(record) => {
                sink.append_accepted(&record).await?;
                accepted += 1;
                debug!(message_id = %message.message_id, "Accepted");
            }
            GateOutcome::Rejected(record) => {
                debug!(message_id = %message.message_id, reason = %record.reason, "Rejected");
                sink.append_rejected(&record).await?;
                rejected += 1;
            }
        }
    }

    let finished_at = Utc::now();
    let manifest = RunManifest {
        run_id: sink.run_id().to_string(),
        started_at,
        finished_at,
        total_processed: messages.len() as u64,
        accepted_count: accepted,
        rejected_count: rejected,
        dry_run: options.dry_run,
        model: oracle.model_name().to_string(),
        min_confidence: config.min_confidence,
    };
    sink.write_manifest(&manifest).await?;

    if let Some((last_sent_at, last_message_id)) = high_water {
        let next = Checkpoint {
            last_sent_at,
            last_message_id,
        };
        store.write(&next).await?;
        info!(
            last_sent_at = %next.last_sent_at.to_rfc3339(),
            last_message_id = %next.last_message_id,
            "Checkpoint advanced"
        );
    } else {
        debug!("No messages processed; checkpoint left untouched");
    }

    info!(
        accepted,
        rejected,
        total = messages.len(),
        "Run complete"
    );
    Ok(sink.run_dir().to_path_buf())
}

/// Effective window start: the later of the user-supplied since and,
/// when resume is on, the checkpoint's position.
fn resolve_since(options: &RunOptions, checkpoint: Option<&Checkpoint>) -> Option<DateTime<Utc>> {
    let mut since = options.since;
    if options.resume
        && let Some(cp) = checkpoint
        && since.is_none_or(|s| cp.last_sent_at > s)
    {
        since = Some(cp.last_sent_at);
    }
    since
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cp(day: u32) -> Checkpoint {
        Checkpoint {
            last_sent_at: Utc.with_ymd_and_hms(2026, 2, day, 12, 0, 0).unwrap(),
            last_message_id: "m1".into(),
        }
    }

    #[test]
    fn resolve_since_prefers_later_checkpoint() {
        let options = RunOptions {
            since: Some(Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()),
            ..RunOptions::default()
        };
        let resolved = resolve_since(&options, Some(&cp(3)));
        assert_eq!(resolved, Some(cp(3).last_sent_at));
    }

    #[test]
    fn resolve_since_keeps_later_user_bound() {
        let options = RunOptions {
            since: Some(Utc.with_ymd_and_hms(2026, 2, 10, 0, 0, 0).unwrap()),
            ..RunOptions::default()
        };
        let resolved = resolve_since(&options, Some(&cp(3)));
        assert_eq!(resolved, options.since);
    }

    #[test]
    fn resolve_since_ignores_checkpoint_without_resume() {
        let options = RunOptions {
            since: Some(Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()),
            resume: false,
            ..RunOptions::default()
        };
        let resolved = resolve_since(&options, Some(&cp(3)));
        assert_eq!(resolved, options.since);
    }

    #[test]
    fn resolve_since_with_nothing_is_open() {
        let options = RunOptions::default();
        assert_eq!(resolve_since(&options, None), None);
    }
}
