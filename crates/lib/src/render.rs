//! Markdown-ish model output to Slack Block Kit + mrkdwn.
//!
//! One left-to-right pass: the input is split on `**`; a bold segment that sits alone on its
//! line becomes a header block, every other run of text is converted to mrkdwn and collected
//! into section blocks. The plain-text fallback gets the same inline conversion without the
//! block split.

use serde_json::{json, Value};

const BOLD: &str = "**";
/// Slack rejects header text longer than this.
const HEADER_MAX_CHARS: usize = 150;
/// Slack rejects section text longer than this.
const SECTION_MAX_CHARS: usize = 3000;

/// One Block Kit node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Header(String),
    Section(String),
}

impl Block {
    pub fn to_json(&self) -> Value {
        match self {
            Block::Header(text) => json!({
                "type": "header",
                "text": { "type": "plain_text", "text": text, "emoji": true }
            }),
            Block::Section(text) => json!({
                "type": "section",
                "text": { "type": "mrkdwn", "text": text }
            }),
        }
    }
}

/// Rendered reply: fallback text for clients without block support, plus the blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

impl RenderedMessage {
    /// Plain text only, no blocks (used for failure notices).
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            fallback_text: text.into(),
            blocks: Vec::new(),
        }
    }

    /// Blocks as the JSON array Slack expects, or None when there are none.
    pub fn blocks_json(&self) -> Option<Value> {
        if self.blocks.is_empty() {
            None
        } else {
            Some(Value::Array(self.blocks.iter().map(Block::to_json).collect()))
        }
    }
}

/// Render model output into Slack blocks and a fallback string.
pub fn render(markup: &str) -> RenderedMessage {
    let segments: Vec<&str> = markup.split(BOLD).collect();
    // An even count means the last `**` was never closed; that tail is plain text.
    let unclosed_tail = segments.len() % 2 == 0;

    let mut blocks = Vec::new();
    let mut section = String::new();
    let mut fallback = String::new();
    let mut fence = false;

    for (i, seg) in segments.iter().enumerate() {
        let emphasized = i % 2 == 1 && !(unclosed_tail && i == segments.len() - 1);
        if !emphasized {
            let raw = if i % 2 == 1 {
                format!("{}{}", BOLD, seg)
            } else {
                seg.to_string()
            };
            let at_line_start = fallback.is_empty() || fallback.ends_with('\n');
            let converted = convert_plain(&raw, at_line_start, &mut fence);
            fallback.push_str(&converted);
            section.push_str(&converted);
            continue;
        }

        let text = seg.trim();
        if text.is_empty() {
            continue;
        }
        fallback.push('*');
        fallback.push_str(text);
        fallback.push('*');
        if is_standalone(&segments, i) {
            flush_section(&mut section, &mut blocks);
            blocks.push(Block::Header(truncate_chars(text, HEADER_MAX_CHARS)));
        } else {
            section.push('*');
            section.push_str(text);
            section.push('*');
        }
    }
    flush_section(&mut section, &mut blocks);

    RenderedMessage {
        fallback_text: fallback.trim().to_string(),
        blocks,
    }
}

/// True when the emphasized segment at `i` has only whitespace around it on its line.
fn is_standalone(segments: &[&str], i: usize) -> bool {
    let before = segments[i - 1];
    let starts_line = if i - 1 == 0 {
        before.rsplit('\n').next().unwrap_or("").trim().is_empty()
    } else {
        before.contains('\n') && before.rsplit('\n').next().unwrap_or("").trim().is_empty()
    };
    let after = segments.get(i + 1).copied().unwrap_or("");
    let is_last_plain = i + 1 >= segments.len() - 1;
    let ends_line = if is_last_plain {
        after.split('\n').next().unwrap_or("").trim().is_empty()
    } else {
        after.contains('\n') && after.split('\n').next().unwrap_or("").trim().is_empty()
    };
    starts_line && ends_line && !segments[i].contains('\n')
}

fn flush_section(section: &mut String, blocks: &mut Vec<Block>) {
    let text = section.trim();
    if !text.is_empty() {
        for chunk in chunk_chars(text, SECTION_MAX_CHARS) {
            blocks.push(Block::Section(chunk));
        }
    }
    section.clear();
}

/// Line-prefix and inline conversions for a run of plain text. `fence` tracks whether we
/// are inside a ``` block, where nothing is rewritten except the opening fence itself.
fn convert_plain(text: &str, at_line_start: bool, fence: &mut bool) -> String {
    let mut out = String::with_capacity(text.len());
    for (n, line) in text.split('\n').enumerate() {
        if n > 0 {
            out.push('\n');
        }
        let line_start = n > 0 || at_line_start;
        let trimmed = line.trim_start();
        if line_start && trimmed.starts_with("```") {
            *fence = !*fence;
            // Slack ignores a language tag on the fence; keep only the backticks.
            out.push_str(&line[..line.len() - trimmed.len()]);
            out.push_str("```");
            continue;
        }
        if *fence {
            out.push_str(line);
            continue;
        }
        if line_start {
            out.push_str(&convert_line_prefix(line));
        } else {
            out.push_str(&convert_inline(line));
        }
    }
    out
}

/// Bullets, headings and quote markers at the start of a line.
fn convert_line_prefix(line: &str) -> String {
    let trimmed = line.trim_start();
    let indent = &line[..line.len() - trimmed.len()];

    if let Some(rest) = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .or_else(|| trimmed.strip_prefix("+ "))
    {
        return format!("{}• {}", indent, convert_inline(rest));
    }
    if trimmed.starts_with('#') {
        let rest = trimmed.trim_start_matches('#');
        if rest.starts_with(' ') && !rest.trim().is_empty() {
            return format!("{}*{}*", indent, convert_inline(rest.trim()));
        }
    }
    if let Some(rest) = trimmed.strip_prefix("&gt;") {
        return format!("> {}", convert_inline(rest.trim_start()));
    }
    if trimmed.starts_with('>') {
        let rest = trimmed.trim_start_matches('>');
        return format!("> {}", convert_inline(rest.trim_start()));
    }
    format!("{}{}", indent, convert_inline(trimmed))
}

/// Links and strikethrough outside inline code spans.
fn convert_inline(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_code = false;
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        if c == '`' {
            in_code = !in_code;
            out.push(c);
            rest = &rest[1..];
            continue;
        }
        if !in_code {
            if c == '[' {
                if let Some((link, consumed)) = parse_link(rest) {
                    out.push_str(&link);
                    rest = &rest[consumed..];
                    continue;
                }
            }
            if let Some(after) = rest.strip_prefix("~~") {
                out.push('~');
                rest = after;
                continue;
            }
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

/// Parse `[text](url)` at the start of `s`; returns the Slack form and bytes consumed.
fn parse_link(s: &str) -> Option<(String, usize)> {
    let close = s.find("](")?;
    let label = &s[1..close];
    if label.contains('\n') || label.contains('[') {
        return None;
    }
    let url_start = close + 2;
    let url_len = s[url_start..].find(')')?;
    let url = &s[url_start..url_start + url_len];
    if url.is_empty() || url.contains(char::is_whitespace) {
        return None;
    }
    let rendered = if label.is_empty() {
        format!("<{}>", url)
    } else {
        format!("<{}|{}>", url, label)
    };
    Some((rendered, url_start + url_len + 1))
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn chunk_chars(s: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    chars.chunks(max).map(|c| c.iter().collect()).collect()
}
