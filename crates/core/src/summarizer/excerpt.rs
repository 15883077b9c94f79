//! Size-bounded ticket excerpts used as summarization input.

use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::config::SummarizerConfig;
use crate::ticket::CategorizedTicket;

/// Appended when the excerpt had to be cut.
pub const TRUNCATION_MARKER: &str = "\n[...truncated...]";

static SCRIPT_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").unwrap());
static LINE_BREAK_TAGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<(br\s*/?|/p|/div|/li|/tr)>").unwrap());
static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\x{a0}]+").unwrap());
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n+").unwrap());

/// Limits applied when building an excerpt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExcerptLimits {
    /// Most recent interactions to include.
    pub interactions: usize,
    /// Per-interaction character cap.
    pub interaction_max_chars: usize,
    /// Whole-excerpt character cap (marker not included).
    pub max_chars: usize,
}

impl Default for ExcerptLimits {
    fn default() -> Self {
        Self::from(&SummarizerConfig::default())
    }
}

impl From<&SummarizerConfig> for ExcerptLimits {
    fn from(config: &SummarizerConfig) -> Self {
        Self {
            interactions: config.interactions,
            interaction_max_chars: config.interaction_max_chars,
            max_chars: config.excerpt_max_chars,
        }
    }
}

/// Build the text the model sees for one ticket.
pub fn build_excerpt(ticket: &CategorizedTicket, limits: &ExcerptLimits) -> String {
    let t = &ticket.ticket;
    let mut parts: Vec<String> = Vec::new();

    if !t.subject.trim().is_empty() {
        parts.push(format!("SUBJECT: {}", t.subject.trim()));
    }
    if let Some(client) = t.client.as_deref().filter(|c| !c.trim().is_empty()) {
        parts.push(format!("CLIENT: {}", client.trim()));
    }

    let categories: Vec<&str> = ticket.categories.iter().map(|c| c.as_str()).collect();
    parts.push(format!("Flagged as: {}", categories.join(", ")));

    let mut metadata: Vec<String> = Vec::new();
    if let Some(category) = &t.helpdesk_category {
        metadata.push(format!("Category: {}", category));
    }
    if let Some(urgency) = t.urgency {
        metadata.push(format!("Urgency: {}", urgency));
    }
    if let Some(status) = &t.status {
        metadata.push(format!("Status: {}", status));
    }
    if let Some(owner) = &t.owner {
        metadata.push(format!("Owner: {}", owner));
    }
    if !metadata.is_empty() {
        parts.push(metadata.join(" | "));
    }

    parts.push(format!("Created: {}", t.created_at.format("%Y-%m-%d %H:%M UTC")));
    if let Some(count) = t.action_count.filter(|c| *c > 0) {
        parts.push(format!("Actions: {}", count));
    }

    let mut history: Vec<String> = Vec::new();
    for (i, interaction) in t.latest_interactions(limits.interactions).iter().enumerate() {
        let text = truncate_chars(&strip_markup(&interaction.body), limits.interaction_max_chars, "...");
        if text.is_empty() {
            continue;
        }
        let author = interaction
            .author
            .as_deref()
            .map(|a| format!(" [{}]", a))
            .unwrap_or_default();
        let when = interaction
            .created_at
            .map(|d| format!(" at {}", d.format("%m-%d %H:%M")))
            .unwrap_or_default();
        history.push(format!("{}.{}{}:\n   {}", i + 1, author, when, text));
    }
    if !history.is_empty() {
        parts.push(String::new());
        parts.push("HISTORY:".to_string());
        parts.extend(history);
    }

    truncate_chars(&parts.join("\n"), limits.max_chars, TRUNCATION_MARKER)
}

/// Reduce HTML to readable plain text.
pub fn strip_markup(html: &str) -> String {
    let text = SCRIPT_STYLE.replace_all(html, "");
    let text = LINE_BREAK_TAGS.replace_all(&text, "\n");
    let text = TAGS.replace_all(&text, "");
    let text = decode_entities(&text);
    let text = SPACES.replace_all(&text, " ");
    let text = BLANK_LINES.replace_all(&text, "\n");
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Cut `text` to `max` characters, appending `suffix` when cut.
fn truncate_chars(text: &str, max: usize, suffix: &str) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], suffix),
        None => text.to_string(),
    }
}
