//! Configuration types, built from environment variables.

use chrono::{DateTime, Utc};
use secrecy::SecretString;

use crate::error::ConfigError;

/// Application configuration: mailbox connection, oracle endpoint,
/// output root, quality threshold.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// IMAP server hostname.
    pub imap_host: String,
    /// IMAP port (implicit TLS).
    pub imap_port: u16,
    /// Mailbox to harvest (the account's sent folder).
    pub mailbox: String,
    /// Primary address of the account being harvested.
    pub email: String,
    /// Login username. Defaults to the account address.
    pub username: String,
    /// Login password.
    pub password: SecretString,
    /// Base URL of the Ollama server.
    pub ollama_base_url: String,
    /// Model name passed to the oracle.
    pub ollama_model: String,
    /// Root directory for run output and the checkpoint file.
    pub output_dir: String,
    /// Minimum candidate confidence for acceptance.
    pub min_confidence: f64,
}

impl AppConfig {
    /// Build config from `QA_HARVEST_*` environment variables.
    ///
    /// Required: `QA_HARVEST_IMAP_HOST`, `QA_HARVEST_EMAIL`,
    /// `QA_HARVEST_PASSWORD`. Everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let email = required("QA_HARVEST_EMAIL")?;

        let imap_port: u16 = parsed_or("QA_HARVEST_IMAP_PORT", 993)?;
        let min_confidence: f64 = parsed_or("QA_HARVEST_MIN_CONFIDENCE", 0.65)?;

        let username = std::env::var("QA_HARVEST_USERNAME")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| email.clone());

        Ok(Self {
            imap_host: required("QA_HARVEST_IMAP_HOST")?,
            imap_port,
            mailbox: var_or("QA_HARVEST_MAILBOX", "Sent"),
            username,
            password: SecretString::from(required("QA_HARVEST_PASSWORD")?),
            email,
            ollama_base_url: var_or("QA_HARVEST_OLLAMA_BASE_URL", "http://localhost:11434")
                .trim_end_matches('/')
                .to_string(),
            ollama_model: var_or("QA_HARVEST_OLLAMA_MODEL", "gemma3:4b"),
            output_dir: Self::output_dir_from_env(),
            min_confidence,
        })
    }

    /// Output root from the environment, without touching the rest of
    /// the config. Checkpoint inspect/reset need only this.
    pub fn output_dir_from_env() -> String {
        var_or("QA_HARVEST_OUTPUT_DIR", "./output")
    }
}

/// Per-run options from the CLI.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Start of the fetch window (UTC).
    pub since: Option<DateTime<Utc>>,
    /// End of the fetch window (UTC, inclusive).
    pub until: Option<DateTime<Utc>>,
    /// Maximum number of messages to fetch.
    pub limit: Option<usize>,
    /// Skip the oracle call entirely.
    pub dry_run: bool,
    /// Use the stored checkpoint when computing the fetch window.
    pub resume: bool,
    /// Debug-level logging.
    pub verbose: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            since: None,
            until: None,
            limit: None,
            dry_run: false,
            resume: true,
            verbose: false,
        }
    }
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: name.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(default),
    }
}
