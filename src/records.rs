//! Persisted record schemas with validation on construction.
//!
//! `QaRecord` can only be built through [`QaRecord::new`], which
//! whitespace-normalizes the text fields and enforces the structural
//! rules. A record that exists has passed validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mailbox::SourceMessage;
use crate::oracle::ExtractionCandidate;

/// Minimum question length after whitespace normalization.
pub const MIN_QUESTION_CHARS: usize = 8;

/// Minimum answer length after whitespace normalization.
pub const MIN_ANSWER_CHARS: usize = 12;

/// Structural validation failures for an accepted record.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("{field} must be at least {min} characters, got {len}")]
    TooShort {
        field: &'static str,
        min: usize,
        len: usize,
    },

    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("confidence {value} is outside [0.0, 1.0]")]
    ConfidenceOutOfRange { value: f64 },
}

/// An accepted question/answer pair with full source provenance.
/// Append-only once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QaRecord {
    pub question: String,
    pub answer: String,
    pub confidence: f64,
    pub extraction_notes: String,
    pub message_id: String,
    pub thread_id: String,
    pub subject: String,
    pub sent_at: DateTime<Utc>,
    pub sender: String,
    pub recipients: Vec<String>,
}

impl QaRecord {
    /// Validating constructor. Text fields are whitespace-normalized
    /// before the length checks run.
    pub fn new(
        message: &SourceMessage,
        candidate: &ExtractionCandidate,
    ) -> Result<Self, RecordError> {
        let question = normalize_whitespace(&candidate.question);
        let answer = normalize_whitespace(&candidate.answer);
        let extraction_notes = normalize_whitespace(&candidate.extraction_notes);

        check_min_chars("question", &question, MIN_QUESTION_CHARS)?;
        check_min_chars("answer", &answer, MIN_ANSWER_CHARS)?;
        if !(0.0..=1.0).contains(&candidate.confidence) {
            return Err(RecordError::ConfidenceOutOfRange {
                value: candidate.confidence,
            });
        }
        check_not_empty("message_id", &message.message_id)?;
        check_not_empty("thread_id", &message.thread_id)?;
        check_not_empty("subject", &message.subject)?;
        check_not_empty("sender", &message.sender)?;

        Ok(Self {
            question,
            answer,
            confidence: candidate.confidence,
            extraction_notes,
            message_id: message.message_id.clone(),
            thread_id: message.thread_id.clone(),
            subject: message.subject.clone(),
            sent_at: message.sent_at,
            sender: message.sender.clone(),
            recipients: message.recipients.clone(),
        })
    }
}

/// A rejected message with the gate's reason code and whatever
/// candidate text existed at rejection time. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RejectedRecord {
    pub reason: String,
    pub message_id: String,
    pub thread_id: String,
    pub subject: String,
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub candidate_question: String,
    #[serde(default)]
    pub candidate_answer: String,
}

impl RejectedRecord {
    /// Rejection with no candidate text (e.g. insufficient content).
    pub fn new(message: &SourceMessage, reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            message_id: message.message_id.clone(),
            thread_id: message.thread_id.clone(),
            subject: message.subject.clone(),
            sent_at: message.sent_at,
            candidate_question: String::new(),
            candidate_answer: String::new(),
        }
    }

    /// Rejection carrying the best-effort candidate question/answer.
    pub fn with_candidate(
        message: &SourceMessage,
        reason: impl Into<String>,
        candidate: &ExtractionCandidate,
    ) -> Self {
        Self {
            candidate_question: candidate.question.clone(),
            candidate_answer: candidate.answer.clone(),
            ..Self::new(message, reason)
        }
    }
}

/// Per-run summary, written exactly once at the end of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunManifest {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Every message returned by the fetch, including ones the
    /// checkpoint filter skipped.
    pub total_processed: u64,
    pub accepted_count: u64,
    pub rejected_count: u64,
    pub dry_run: bool,
    pub model: String,
    pub min_confidence: f64,
}

/// Collapse all whitespace runs to single spaces and trim.
pub fn normalize_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn check_min_chars(field: &'static str, value: &str, min: usize) -> Result<(), RecordError> {
    let len = value.chars().count();
    if len < min {
        return Err(RecordError::TooShort { field, min, len });
    }
    Ok(())
}

fn check_not_empty(field: &'static str, value: &str) -> Result<(), RecordError> {
    if value.is_empty() {
        return Err(RecordError::Empty { field });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message() -> SourceMessage {
        SourceMessage {
            message_id: "m1".into(),
            thread_id: "t1".into(),
            subject: "Re: Login".into(),
            body: "sample".into(),
            sent_at: Utc.with_ymd_and_hms(2026, 2, 1, 10, 30, 0).unwrap(),
            sender: "agent@example.com".into(),
            recipients: vec!["user@example.com".into()],
        }
    }

    fn candidate(question: &str, answer: &str, confidence: f64) -> ExtractionCandidate {
        ExtractionCandidate {
            question: question.into(),
            answer: answer.into(),
            confidence,
            extraction_notes: "  extracted from response   ".into(),
        }
    }

    #[test]
    fn record_normalizes_whitespace() {
        let record = QaRecord::new(
            &message(),
            &candidate(
                "  How   do I reset password?  ",
                "  Use the reset link in portal.   ",
                0.8,
            ),
        )
        .unwrap();

        assert_eq!(record.question, "How do I reset password?");
        assert_eq!(record.answer, "Use the reset link in portal.");
        assert_eq!(record.extraction_notes, "extracted from response");
    }

    #[test]
    fn short_question_is_rejected() {
        let err = QaRecord::new(&message(), &candidate("Why?", "Because the cache expired.", 0.9))
            .unwrap_err();
        assert!(matches!(err, RecordError::TooShort { field: "question", .. }));
    }

    #[test]
    fn short_answer_is_rejected() {
        let err = QaRecord::new(&message(), &candidate("How do I log in?", "Use SSO.", 0.9))
            .unwrap_err();
        assert!(matches!(err, RecordError::TooShort { field: "answer", .. }));
    }

    #[test]
    fn out_of_range_confidence_is_rejected() {
        let err = QaRecord::new(
            &message(),
            &candidate("How do I log in?", "Use the SSO button on the portal.", 1.2),
        )
        .unwrap_err();
        assert!(matches!(err, RecordError::ConfidenceOutOfRange { .. }));
    }

    #[test]
    fn boundary_confidences_are_accepted() {
        for confidence in [0.0, 1.0] {
            let record = QaRecord::new(
                &message(),
                &candidate("How do I log in?", "Use the SSO button on the portal.", confidence),
            );
            assert!(record.is_ok());
        }
    }

    #[test]
    fn qa_record_rejects_unknown_fields_on_read() {
        let json = r#"{
            "question": "How do I reset my password?",
            "answer": "Use the reset link in the portal.",
            "confidence": 0.8,
            "extraction_notes": "",
            "message_id": "m1",
            "thread_id": "t1",
            "subject": "Re: Login",
            "sent_at": "2026-02-01T10:30:00Z",
            "sender": "agent@example.com",
            "recipients": [],
            "surprise": true
        }"#;
        assert!(serde_json::from_str::<QaRecord>(json).is_err());
    }

    #[test]
    fn rejected_record_defaults_candidate_fields() {
        let rejected = RejectedRecord::new(&message(), "insufficient_content");
        assert_eq!(rejected.reason, "insufficient_content");
        assert!(rejected.candidate_question.is_empty());
        assert!(rejected.candidate_answer.is_empty());
    }
}
