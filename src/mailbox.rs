//! Mailbox source. Fetches sent messages over IMAP-with-TLS and hands
//! them to the pipeline as `SourceMessage` values.
//!
//! IMAP SEARCH is date-granular, so the server-side SINCE/BEFORE
//! bounds are a coarse pre-filter; the exact timestamp window and the
//! fetch limit are re-applied client-side before returning.

use std::io::Write as IoWrite;
use std::net::TcpStream;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Days, Utc};
use mail_parser::MessageParser;
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::MailboxError;

// ── Types ───────────────────────────────────────────────────────────

/// One sent message as the pipeline sees it. Owned by the mailbox
/// collaborator, read-only downstream.
#[derive(Debug, Clone)]
pub struct SourceMessage {
    /// Globally unique id (Message-ID header, or generated).
    pub message_id: String,
    /// Conversation identifier.
    pub thread_id: String,
    pub subject: String,
    /// Raw body, markup and all; the normalizer cleans it.
    pub body: String,
    /// Sent time, UTC-normalized.
    pub sent_at: DateTime<Utc>,
    pub sender: String,
    pub recipients: Vec<String>,
}

/// Time window and cap for one fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchQuery {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Ordered message-fetch service the orchestrator depends on.
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn fetch(&self, query: &FetchQuery) -> Result<Vec<SourceMessage>, MailboxError>;
}

// ── IMAP implementation ─────────────────────────────────────────────

/// Connection settings for one IMAP mailbox.
#[derive(Debug, Clone)]
pub struct ImapSource {
    host: String,
    port: u16,
    mailbox: String,
    email: String,
    username: String,
    password: SecretString,
}

impl ImapSource {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            host: config.imap_host.clone(),
            port: config.imap_port,
            mailbox: config.mailbox.clone(),
            email: config.email.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }
}

#[async_trait]
impl MessageSource for ImapSource {
    async fn fetch(&self, query: &FetchQuery) -> Result<Vec<SourceMessage>, MailboxError> {
        let source = self.clone();
        let query = query.clone();
        tokio::task::spawn_blocking(move || fetch_sent_blocking(&source, &query))
            .await
            .map_err(|e| MailboxError::Protocol(format!("fetch task failed: {e}")))?
    }
}

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Fetch the sent mailbox over a blocking IMAP session.
fn fetch_sent_blocking(
    source: &ImapSource,
    query: &FetchQuery,
) -> Result<Vec<SourceMessage>, MailboxError> {
    let mut tls = connect(source)?;

    // Greeting, then login.
    let _greeting = read_line(&mut tls)?;
    let login = send_cmd(
        &mut tls,
        "A1",
        &format!(
            "LOGIN \"{}\" \"{}\"",
            source.username,
            source.password.expose_secret()
        ),
    )?;
    if !login.last().is_some_and(|l| l.contains("OK")) {
        return Err(MailboxError::LoginFailed {
            username: source.username.clone(),
        });
    }

    let select = send_cmd(&mut tls, "A2", &format!("SELECT \"{}\"", source.mailbox))?;
    if !select.last().is_some_and(|l| l.contains("OK")) {
        return Err(MailboxError::Protocol(format!(
            "cannot select mailbox {}",
            source.mailbox
        )));
    }

    let search_resp = send_cmd(&mut tls, "A3", &search_command(query))?;
    let mut ids: Vec<String> = Vec::new();
    for line in &search_resp {
        if line.starts_with("* SEARCH") {
            ids.extend(line.split_whitespace().skip(2).map(str::to_string));
        }
    }
    tracing::debug!(candidates = ids.len(), mailbox = %source.mailbox, "IMAP search complete");

    let mut messages = Vec::new();
    let mut tag_counter = 4_u32;
    for id in &ids {
        let tag = format!("A{tag_counter}");
        tag_counter += 1;
        let fetch_resp = send_cmd(&mut tls, &tag, &format!("FETCH {id} RFC822"))?;

        let raw: String = fetch_resp
            .iter()
            .skip(1)
            .take(fetch_resp.len().saturating_sub(2))
            .cloned()
            .collect();

        if let Some(parsed) = MessageParser::default().parse(raw.as_bytes()) {
            messages.push(to_source_message(&parsed, &source.email));
        } else {
            tracing::warn!(imap_id = %id, "Skipping unparsable message");
        }
    }

    let tag = format!("A{tag_counter}");
    let _ = send_cmd(&mut tls, &tag, "LOGOUT");

    // Exact window, newest-first order, then the cap.
    messages.retain(|m| {
        query.since.is_none_or(|since| m.sent_at >= since)
            && query.until.is_none_or(|until| m.sent_at <= until)
    });
    messages.sort_by(|a, b| {
        (b.sent_at, b.message_id.as_str()).cmp(&(a.sent_at, a.message_id.as_str()))
    });
    if let Some(limit) = query.limit {
        messages.truncate(limit);
    }

    Ok(messages)
}

fn connect(source: &ImapSource) -> Result<TlsStream, MailboxError> {
    let tcp = TcpStream::connect((&*source.host, source.port)).map_err(|e| {
        MailboxError::Connect {
            host: source.host.clone(),
            port: source.port,
            reason: e.to_string(),
        }
    })?;
    tcp.set_read_timeout(Some(Duration::from_secs(30)))?;

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = std::sync::Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name: rustls::pki_types::ServerName<'_> =
        rustls::pki_types::ServerName::try_from(source.host.clone())
            .map_err(|e| MailboxError::Tls(e.to_string()))?;
    let conn = rustls::ClientConnection::new(tls_config, server_name)
        .map_err(|e| MailboxError::Tls(e.to_string()))?;
    Ok(rustls::StreamOwned::new(conn, tcp))
}

fn read_line(tls: &mut TlsStream) -> Result<String, MailboxError> {
    let mut buf = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        match std::io::Read::read(tls, &mut byte) {
            Ok(0) => return Err(MailboxError::Protocol("connection closed".into())),
            Ok(_) => {
                buf.push(byte[0]);
                if buf.ends_with(b"\r\n") {
                    return Ok(String::from_utf8_lossy(&buf).to_string());
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn send_cmd(tls: &mut TlsStream, tag: &str, cmd: &str) -> Result<Vec<String>, MailboxError> {
    let full = format!("{tag} {cmd}\r\n");
    IoWrite::write_all(tls, full.as_bytes())?;
    IoWrite::flush(tls)?;
    let mut lines = Vec::new();
    loop {
        let line = read_line(tls)?;
        let done = line.starts_with(tag);
        lines.push(line);
        if done {
            return Ok(lines);
        }
    }
}

/// Build the SEARCH command for the query's date bounds. BEFORE is
/// exclusive of the named date, so the until bound uses the next day.
fn search_command(query: &FetchQuery) -> String {
    let mut criteria = Vec::new();
    if let Some(since) = query.since {
        criteria.push(format!("SINCE {}", imap_date(since)));
    }
    if let Some(until) = query.until {
        let next_day = until
            .checked_add_days(Days::new(1))
            .unwrap_or(until);
        criteria.push(format!("BEFORE {}", imap_date(next_day)));
    }
    if criteria.is_empty() {
        criteria.push("ALL".to_string());
    }
    format!("SEARCH {}", criteria.join(" "))
}

fn imap_date(dt: DateTime<Utc>) -> String {
    dt.format("%d-%b-%Y").to_string()
}

/// Map a parsed RFC822 message into a `SourceMessage`. Fallbacks:
/// generated id when Message-ID is absent, account address when From
/// is absent, message id when no thread name exists.
fn to_source_message(parsed: &mail_parser::Message, account: &str) -> SourceMessage {
    let message_id = parsed
        .message_id()
        .map(str::to_string)
        .unwrap_or_else(|| format!("gen-{}", Uuid::new_v4()));

    let thread_id = parsed
        .thread_name()
        .map(str::to_string)
        .unwrap_or_else(|| message_id.clone());

    let subject = parsed
        .subject()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("(no subject)")
        .to_string();

    let body = if let Some(text) = parsed.body_text(0) {
        text.into_owned()
    } else if let Some(html) = parsed.body_html(0) {
        html.into_owned()
    } else {
        String::new()
    };

    let sent_at = parsed
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or_else(Utc::now);

    let sender = parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(str::to_string)
        .unwrap_or_else(|| account.to_string());

    SourceMessage {
        message_id,
        thread_id,
        subject,
        body,
        sent_at,
        sender,
        recipients: extract_addresses(parsed.to()),
    }
}

/// Flatten an optional address header into plain addresses.
fn extract_addresses(addr: Option<&mail_parser::Address>) -> Vec<String> {
    let Some(addr) = addr else {
        return Vec::new();
    };
    match addr {
        mail_parser::Address::List(addrs) => addrs
            .iter()
            .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            .collect(),
        mail_parser::Address::Group(groups) => groups
            .iter()
            .flat_map(|g| {
                g.addresses
                    .iter()
                    .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn search_with_no_bounds_is_all() {
        assert_eq!(search_command(&FetchQuery::default()), "SEARCH ALL");
    }

    #[test]
    fn search_bounds_use_imap_dates() {
        let query = FetchQuery {
            since: Some(at(1, 10)),
            until: Some(at(3, 10)),
            limit: None,
        };
        assert_eq!(
            search_command(&query),
            "SEARCH SINCE 01-Feb-2026 BEFORE 04-Feb-2026"
        );
    }

    #[test]
    fn rfc822_parses_into_source_message() {
        let raw = "Message-ID: <m1@example.com>\r\n\
                   From: Agent <agent@example.com>\r\n\
                   To: User <user@example.com>, Other <other@example.com>\r\n\
                   Subject: Re: Password reset\r\n\
                   Date: Sun, 1 Feb 2026 12:30:00 +0200\r\n\
                   \r\n\
                   Use the reset link in the portal.\r\n";

        let parsed = MessageParser::default().parse(raw.as_bytes()).unwrap();
        let message = to_source_message(&parsed, "fallback@example.com");

        assert_eq!(message.message_id, "m1@example.com");
        assert_eq!(message.subject, "Re: Password reset");
        assert_eq!(message.sender, "agent@example.com");
        assert_eq!(
            message.recipients,
            vec!["user@example.com".to_string(), "other@example.com".to_string()]
        );
        // Offset date lands as UTC.
        assert_eq!(message.sent_at, Utc.with_ymd_and_hms(2026, 2, 1, 10, 30, 0).unwrap());
        assert!(message.body.contains("reset link"));
    }

    #[test]
    fn missing_headers_fall_back() {
        let raw = "Subject: \r\n\r\nBody only.\r\n";
        let parsed = MessageParser::default().parse(raw.as_bytes()).unwrap();
        let message = to_source_message(&parsed, "account@example.com");

        assert!(message.message_id.starts_with("gen-"));
        assert_eq!(message.subject, "(no subject)");
        assert_eq!(message.sender, "account@example.com");
        assert!(message.recipients.is_empty());
    }
}
