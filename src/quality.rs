//! Quality gate. Decides accept/reject for one extraction candidate.
//!
//! Checks run in a fixed order and the first failure wins:
//! 1. missing question or answer
//! 2. confidence below threshold
//! 3. duplicate of a pair already accepted this run
//! 4. structural validation of the final record
//!
//! The dedup set lives for one run only and is mutated on acceptance,
//! never on rejection.

use std::collections::HashSet;

use crate::mailbox::SourceMessage;
use crate::oracle::ExtractionCandidate;
use crate::records::{QaRecord, RejectedRecord, normalize_whitespace};

/// Run-scoped dedup state, owned by the orchestrator.
#[derive(Debug, Default)]
pub struct QualityState {
    seen_pairs: HashSet<(String, String)>,
}

impl QualityState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Exactly one of these comes out of every evaluation.
#[derive(Debug)]
pub enum GateOutcome {
    Accepted(QaRecord),
    Rejected(RejectedRecord),
}

/// Evaluate a candidate against the gate checks.
pub fn evaluate(
    message: &SourceMessage,
    candidate: &ExtractionCandidate,
    min_confidence: f64,
    state: &mut QualityState,
) -> GateOutcome {
    if candidate.question.trim().is_empty() || candidate.answer.trim().is_empty() {
        return reject(message, "missing_question_or_answer", candidate);
    }

    if candidate.confidence < min_confidence {
        let reason = format!("low_confidence:{:.2}", candidate.confidence);
        return reject(message, reason, candidate);
    }

    let dedup_key = (
        dedup_component(&candidate.question),
        dedup_component(&candidate.answer),
    );
    if state.seen_pairs.contains(&dedup_key) {
        return reject(message, "duplicate_pair", candidate);
    }

    match QaRecord::new(message, candidate) {
        Ok(record) => {
            state.seen_pairs.insert(dedup_key);
            GateOutcome::Accepted(record)
        }
        Err(_) => reject(message, "schema_validation_failed", candidate),
    }
}

/// Case-folded, whitespace-collapsed form used for dedup keys.
fn dedup_component(value: &str) -> String {
    normalize_whitespace(&value.to_lowercase())
}

fn reject(
    message: &SourceMessage,
    reason: impl Into<String>,
    candidate: &ExtractionCandidate,
) -> GateOutcome {
    GateOutcome::Rejected(RejectedRecord::with_candidate(message, reason, candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn message() -> SourceMessage {
        SourceMessage {
            message_id: "m1".into(),
            thread_id: "t1".into(),
            subject: "Re: Account".into(),
            body: "sample".into(),
            sent_at: Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap(),
            sender: "agent@example.com".into(),
            recipients: vec!["user@example.com".into()],
        }
    }

    fn candidate(question: &str, answer: &str, confidence: f64) -> ExtractionCandidate {
        ExtractionCandidate {
            question: question.into(),
            answer: answer.into(),
            confidence,
            extraction_notes: String::new(),
        }
    }

    fn reason(outcome: GateOutcome) -> String {
        match outcome {
            GateOutcome::Rejected(record) => record.reason,
            GateOutcome::Accepted(record) => panic!("unexpected accept: {}", record.question),
        }
    }

    #[test]
    fn low_confidence_is_rejected() {
        let mut state = QualityState::new();
        let outcome = evaluate(
            &message(),
            &candidate("How to login?", "Use SSO on the portal page.", 0.3),
            0.65,
            &mut state,
        );
        assert_eq!(reason(outcome), "low_confidence:0.30");
    }

    #[test]
    fn empty_answer_is_rejected_regardless_of_confidence() {
        let mut state = QualityState::new();
        let outcome = evaluate(&message(), &candidate("How to login?", "   ", 0.99), 0.65, &mut state);
        assert_eq!(reason(outcome), "missing_question_or_answer");
    }

    #[test]
    fn empty_fields_win_over_low_confidence() {
        // Check order: emptiness is reported even when confidence
        // would also fail.
        let mut state = QualityState::new();
        let outcome = evaluate(&message(), &candidate("", "", 0.0), 0.65, &mut state);
        assert_eq!(reason(outcome), "missing_question_or_answer");
    }

    #[test]
    fn duplicate_pair_is_rejected_second_time() {
        let mut state = QualityState::new();
        let good = candidate(
            "How do I update billing?",
            "Open the billing page and save changes.",
            0.95,
        );

        let first = evaluate(&message(), &good, 0.65, &mut state);
        assert!(matches!(first, GateOutcome::Accepted(_)));

        let second = evaluate(&message(), &good, 0.65, &mut state);
        assert_eq!(reason(second), "duplicate_pair");
    }

    #[test]
    fn dedup_key_ignores_case_and_spacing() {
        let mut state = QualityState::new();
        let first = evaluate(
            &message(),
            &candidate(
                "How do I update billing?",
                "Open the billing page and save changes.",
                0.9,
            ),
            0.65,
            &mut state,
        );
        assert!(matches!(first, GateOutcome::Accepted(_)));

        let second = evaluate(
            &message(),
            &candidate(
                "  HOW do i   update BILLING?",
                "open the Billing page and   save changes.",
                0.9,
            ),
            0.65,
            &mut state,
        );
        assert_eq!(reason(second), "duplicate_pair");
    }

    #[test]
    fn rejection_does_not_register_dedup_key() {
        let mut state = QualityState::new();
        let low = candidate("How do I update billing?", "Open the billing page now.", 0.1);
        let outcome = evaluate(&message(), &low, 0.65, &mut state);
        assert!(reason(outcome).starts_with("low_confidence"));

        // Same pair with passing confidence is not a duplicate.
        let good = candidate("How do I update billing?", "Open the billing page now.", 0.9);
        let outcome = evaluate(&message(), &good, 0.65, &mut state);
        assert!(matches!(outcome, GateOutcome::Accepted(_)));
    }

    #[test]
    fn structural_failure_reports_schema_validation() {
        let mut state = QualityState::new();
        // Passes the emptiness and confidence checks, fails the
        // answer length minimum.
        let outcome = evaluate(&message(), &candidate("How to login?", "Use SSO.", 0.9), 0.65, &mut state);
        assert_eq!(reason(outcome), "schema_validation_failed");
    }

    #[test]
    fn overconfident_candidate_fails_schema_check() {
        let mut state = QualityState::new();
        let outcome = evaluate(
            &message(),
            &candidate("How to login?", "Use the SSO button on the portal.", 1.5),
            0.65,
            &mut state,
        );
        assert_eq!(reason(outcome), "schema_validation_failed");
    }

    #[test]
    fn rejection_carries_candidate_text() {
        let mut state = QualityState::new();
        let outcome = evaluate(
            &message(),
            &candidate("How to login?", "Use SSO on the portal page.", 0.2),
            0.65,
            &mut state,
        );
        let GateOutcome::Rejected(record) = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(record.candidate_question, "How to login?");
        assert_eq!(record.candidate_answer, "Use SSO on the portal page.");
        assert_eq!(record.message_id, "m1");
    }
}
