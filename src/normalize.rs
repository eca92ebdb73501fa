//! Body normalizer. Turns a raw outbound email body into clean,
//! quote-and-signature-free text and decides whether it carries enough
//! signal to be worth an oracle call.
//!
//! Stages run in a fixed order, each on the previous stage's output:
//! 1. markup stripping (HTML bodies only)
//! 2. disclaimer stripping
//! 3. quoted-thread stripping
//! 4. signature stripping
//! 5. whitespace normalization

use std::sync::LazyLock;

use regex::Regex;

/// Cleaned body text plus the sufficiency verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedBody {
    pub text: String,
    pub has_enough_content: bool,
}

/// Minimum character count for a body to be worth extracting from.
const MIN_CONTENT_CHARS: usize = 50;

/// Minimum whitespace-delimited token count.
const MIN_CONTENT_TOKENS: usize = 10;

/// Legal boilerplate markers. Case-sensitive substring match; the text
/// is truncated at the first marker found, in this order.
const DISCLAIMER_MARKERS: [&str; 3] = [
    "This email and any attachments",
    "Confidentiality Notice",
    "The information contained in this e-mail",
];

static QUOTE_HEADER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)^On .+wrote:$").unwrap(),
        Regex::new(r"(?i)^From:\s").unwrap(),
        Regex::new(r"(?i)^Sent:\s").unwrap(),
        Regex::new(r"(?i)^-----Original Message-----").unwrap(),
    ]
});

static SIGNATURE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)^thanks,?$").unwrap(),
        Regex::new(r"(?i)^best regards,?$").unwrap(),
        Regex::new(r"(?i)^kind regards,?$").unwrap(),
    ]
});

static LINE_ENDINGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\r\n?").unwrap());
static HORIZONTAL_WS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\t ]+").unwrap());
static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Run the full cleanup pipeline over a raw message body.
pub fn normalize(raw_body: &str) -> CleanedBody {
    let text = strip_markup(raw_body);
    let text = strip_disclaimer(&text);
    let text = strip_quoted_thread(&text);
    let text = strip_signature(&text);
    let text = normalize_whitespace(&text);

    let has_enough_content = text.chars().count() >= MIN_CONTENT_CHARS
        && text.split_whitespace().count() >= MIN_CONTENT_TOKENS;

    CleanedBody {
        text,
        has_enough_content,
    }
}

/// Tags treated as block-level boundaries when extracting text.
const BLOCK_TAGS: [&str; 17] = [
    "p", "div", "br", "li", "ul", "ol", "tr", "td", "th", "table", "h1", "h2", "h3", "h4", "h5",
    "h6", "blockquote",
];

/// Convert HTML bodies to visible text with a line break at each
/// block-level boundary. Plain-text bodies pass through unchanged,
/// and a stray `<` or `>` that does not open a tag stays literal, so
/// quoted-reply markers survive this stage.
fn strip_markup(raw_body: &str) -> String {
    if !raw_body.contains('<') && !raw_body.contains('>') {
        return raw_body.to_string();
    }

    let mut out = String::with_capacity(raw_body.len());
    let mut rest = raw_body;
    while let Some(start) = rest.find('<') {
        let (text, tail) = rest.split_at(start);
        out.push_str(text);

        let next = tail[1..].chars().next();
        let opens_tag = matches!(next, Some(c) if c.is_ascii_alphabetic() || c == '/' || c == '!');
        if !opens_tag {
            out.push('<');
            rest = &tail[1..];
            continue;
        }

        let Some(end) = tail.find('>') else {
            // Unterminated tag swallows the remainder.
            rest = "";
            break;
        };
        let name: String = tail[1..end]
            .trim_start_matches('/')
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        if BLOCK_TAGS.contains(&name.as_str()) {
            out.push('\n');
        }
        rest = &tail[end + 1..];

        // Style and script bodies are not visible text.
        if name == "style" || name == "script" {
            let closing = format!("</{name}");
            match rest.to_ascii_lowercase().find(&closing) {
                Some(close) => rest = &rest[close..],
                None => rest = "",
            }
        }
    }
    out.push_str(rest);
    decode_entities(&out)
}

/// Decode the handful of entities common in email HTML.
fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Truncate at the first legal-disclaimer marker, discarding the
/// marker and everything after it.
fn strip_disclaimer(text: &str) -> String {
    for marker in DISCLAIMER_MARKERS {
        if let Some(index) = text.find(marker) {
            return text[..index].to_string();
        }
    }
    text.to_string()
}

/// Cut at the first line that starts a quoted thread: a `>` quote
/// marker or a reply/forward header line.
fn strip_quoted_thread(text: &str) -> String {
    let mut kept = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('>') {
            break;
        }
        if QUOTE_HEADER_PATTERNS.iter().any(|p| p.is_match(trimmed)) {
            break;
        }
        kept.push(line);
    }
    kept.join("\n")
}

/// Cut at the first line that reads as a sign-off phrase.
fn strip_signature(text: &str) -> String {
    let mut kept = Vec::new();
    for line in text.lines() {
        if SIGNATURE_PATTERNS.iter().any(|p| p.is_match(line.trim())) {
            break;
        }
        kept.push(line);
    }
    kept.join("\n")
}

/// Collapse line endings, horizontal whitespace runs, and excess blank
/// lines; trim the ends.
fn normalize_whitespace(text: &str) -> String {
    let text = LINE_ENDINGS.replace_all(text, "\n");
    let text = HORIZONTAL_WS.replace_all(&text, " ");
    let text = BLANK_RUNS.replace_all(&text, "\n\n");
    text.trim().to_string()
}
