//! Prompt text for the extraction oracle.

use crate::mailbox::SourceMessage;

/// Fixed system instruction. The oracle must answer with strict JSON
/// and signal an unextractable message with empty strings and zero
/// confidence instead of guessing.
pub const SYSTEM_PROMPT: &str = "\
You extract one user question and one support answer from an outbound support email.
Return STRICT JSON only. No markdown. No extra keys.
If no clear question/answer can be extracted, return empty strings and confidence 0.
";

/// Build the per-message user prompt around the cleaned body.
pub fn build_user_prompt(message: &SourceMessage, cleaned_text: &str) -> String {
    format!(
        "Extract a single best QA pair from this sent email.\n\
         \n\
         Subject: {subject}\n\
         Sender: {sender}\n\
         Recipients: {recipients}\n\
         SentAt: {sent_at}\n\
         ThreadId: {thread_id}\n\
         MessageId: {message_id}\n\
         \n\
         EmailBody:\n\
         {cleaned_text}\n\
         \n\
         JSON schema:\n\
         {{\n\
         \x20 \"question\": \"string\",\n\
         \x20 \"answer\": \"string\",\n\
         \x20 \"confidence\": 0.0,\n\
         \x20 \"extraction_notes\": \"string\"\n\
         }}",
        subject = message.subject,
        sender = message.sender,
        recipients = message.recipients.join(", "),
        sent_at = message.sent_at.to_rfc3339(),
        thread_id = message.thread_id,
        message_id = message.message_id,
    )
}
