//! Cleanup of model output before it is shown or published
//!
//! Social platforms render Markdown literally, so emphasis markers, headings,
//! quotes and list bullets are stripped, trailing whitespace is removed and
//! runs of blank lines collapse to a single blank line.

use once_cell::sync::Lazy;
use regex::Regex;

static BOLD_STARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("valid regex"));
static BOLD_UNDERSCORES: Lazy<Regex> = Lazy::new(|| Regex::new(r"__(.+?)__").expect("valid regex"));
static ITALIC_STAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*\n]+?)\*").expect("valid regex"));
static ITALIC_UNDERSCORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_([^_\n]+?)_").expect("valid regex"));
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#{1,6}[ \t]*").expect("valid regex"));
static BLOCKQUOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^>[ \t]?").expect("valid regex"));
static BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[-*+][ \t]+").expect("valid regex"));
static BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
static NOTE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://note\.com/\S+").expect("valid regex"));

/// Bullet that replaces Markdown list markers
pub const BULLET_MARK: &str = "・";

/// Quote pairs a model likes to wrap its whole answer in
const QUOTE_PAIRS: &[(char, char)] = &[('"', '"'), ('\u{201c}', '\u{201d}'), ('\u{300c}', '\u{300d}')];

/// Strip Markdown and normalize whitespace
pub fn sanitize(text: &str) -> String {
    // list bullets first so a leading "* " is not read as emphasis
    let text = BULLET.replace_all(text, BULLET_MARK);
    let text = BOLD_STARS.replace_all(&text, "$1");
    let text = BOLD_UNDERSCORES.replace_all(&text, "$1");
    let text = ITALIC_STAR.replace_all(&text, "$1");
    let text = ITALIC_UNDERSCORE.replace_all(&text, "$1");
    let text = HEADING.replace_all(&text, "");
    let text = BLOCKQUOTE.replace_all(&text, "");

    let text = text
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");

    BLANK_RUN.replace_all(&text, "\n\n").trim().to_string()
}

/// Remove quote characters wrapping the entire text
pub fn strip_wrapping_quotes(text: &str) -> String {
    let mut text = text.trim();
    for (open, close) in QUOTE_PAIRS {
        if text.chars().count() >= 2 && text.starts_with(*open) && text.ends_with(*close) {
            text = &text[open.len_utf8()..text.len() - close.len_utf8()];
        }
    }
    text.trim().to_string()
}

/// Replace any article links the model wrote with the real URL at the end
///
/// Models tend to invent plausible but wrong article URLs, so every note.com
/// link is removed and the known URL appended after a blank line.
pub fn pin_article_url(text: &str, url: &str) -> String {
    let url = url.trim();
    if url.is_empty() {
        return text.trim().to_string();
    }
    let without = NOTE_URL.replace_all(text, "");
    let collapsed = BLANK_RUN.replace_all(&without, "\n\n");
    format!("{}\n\n{}", collapsed.trim(), url)
}
