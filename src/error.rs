//! Error types for QA Harvest.

use std::path::PathBuf;

/// Top-level error type for the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mailbox source errors. All of these abort the run.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Connection to {host}:{port} failed: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("IMAP login failed for {username}")]
    LoginFailed { username: String },

    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Extraction oracle errors.
///
/// Only transport-level failures live here. A response whose *content*
/// is malformed JSON is not an error; it degrades to an empty
/// candidate that the quality gate rejects.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Request to {url} failed: {reason}")]
    RequestFailed { url: String, reason: String },

    #[error("Oracle returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response envelope: {0}")]
    InvalidResponse(String),
}

/// Checkpoint store errors.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("Corrupt checkpoint at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable sink errors (run directory, JSONL streams, manifest).
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, Error>;
