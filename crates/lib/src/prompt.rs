//! System prompt and channel-context formatting for generation calls.

use crate::channels::HistoryRecord;

/// Built-in system prompt for answering questions about a channel's conversation.
pub const CONVERSATION_ANALYSIS: &str = "You are a helpful AI assistant in a Slack workspace.
You answer questions about the conversations in the Slack workspace, using the conversation messages provided with the question.
Assume the user is asking about the conversation you can already see; do not try to work out which other conversation they mean.
Format your response in bullet points for clarity. Use **bold** on its own line for section titles.
If you can't find relevant information in the conversation, politely say so.";

/// Question used by `/summarize` when the user gives no extra text.
pub const DEFAULT_SUMMARY_QUESTION: &str = "Summarize the recent conversation in this channel.";

/// System prompt for one run: today's date, then the configured prompt or the built-in one.
pub fn build_system_prompt(custom: Option<&str>) -> String {
    let mut out = String::new();
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    out.push_str("Today's date: ");
    out.push_str(&today);
    out.push_str("\n\n");
    let body = custom
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(CONVERSATION_ANALYSIS);
    out.push_str(body);
    out
}

/// Flatten history into one `author: text` line per record, in the order received.
pub fn format_context(records: &[HistoryRecord]) -> String {
    records
        .iter()
        .map(|r| format!("{}: {}", r.author, r.text.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Remove leading `<@U123>` mentions so the model sees only the question.
pub fn strip_mentions(text: &str) -> String {
    let mut rest = text.trim_start();
    while let Some(after) = rest.strip_prefix("<@") {
        match after.find('>') {
            Some(end) => rest = after[end + 1..].trim_start(),
            None => break,
        }
    }
    rest.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(author: &str, text: &str, ts: &str) -> HistoryRecord {
        HistoryRecord {
            author: author.to_string(),
            text: text.to_string(),
            ts: ts.to_string(),
        }
    }

    #[test]
    fn context_keeps_received_order() {
        let ctx = format_context(&[record("U2", "newer", "2.0"), record("U1", "older ", "1.0")]);
        assert_eq!(ctx, "U2: newer\nU1: older");
    }

    #[test]
    fn system_prompt_prefers_custom() {
        let p = build_system_prompt(Some("Be brief."));
        assert!(p.starts_with("Today's date: "));
        assert!(p.ends_with("Be brief."));
        assert!(build_system_prompt(Some("  ")).ends_with(CONVERSATION_ANALYSIS));
    }

    #[test]
    fn leading_mentions_stripped() {
        assert_eq!(strip_mentions("<@U0BOT> <@U1> what changed?"), "what changed?");
        assert_eq!(strip_mentions("ping <@U1>"), "ping <@U1>");
    }
}
