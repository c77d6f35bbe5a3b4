//! Markup cleanup for model output.
//!
//! Models are told to answer in plain text but still emit Markdown now and
//! then. [`sanitize`] strips the structural tokens and keeps the prose.

use once_cell::sync::Lazy;
use regex::Regex;

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

fn rule(pattern: &str, replacement: &'static str) -> Rule {
    Rule {
        pattern: Regex::new(pattern).expect("valid sanitizer pattern"),
        replacement,
    }
}

// Every rule deletes characters and never inserts any, so a pass that changes
// the text always makes it shorter.
static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        // code fences
        rule(r"(?m)^[ \t]*```[^\n]*$", ""),
        // headings
        rule(r"(?m)^[ \t]*#{1,6}[ \t]*", ""),
        // chapter headings: 第三章 / 第12章 / Chapter 3 / Chapter IV / Chapter One
        rule(
            r"(?mi)^[ \t]*(?:第[0-9零一二三四五六七八九十百千两]+章|chapter[ \t]+(?:[0-9]+|[ivxlcdm]+|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve)\b)[^\n]*$",
            "",
        ),
        // horizontal rules
        rule(r"(?m)^[ \t]*[-=]{3,}[ \t]*$", ""),
        // blockquotes
        rule(r"(?m)^[ \t]*>[ \t]?", ""),
        // list items
        rule(r"(?m)^[ \t]*[-*+][ \t]+", ""),
        rule(r"(?m)^[ \t]*\d+\.[ \t]+", ""),
        // links and images collapse to their text
        rule(r"!?\[([^\]\n]*)\]\([^)\n]*\)", "$1"),
        // emphasis, bold before italic
        rule(r"\*\*(.*?)\*\*", "$1"),
        rule(r"(?m)(^|\W)__([^_\n]+?)__(\W|$)", "$1$2$3"),
        rule(r"\*(.*?)\*", "$1"),
        // underscores only count as emphasis outside a word
        rule(r"(?m)(^|\W)_([^_\n]+?)_(\W|$)", "$1$2$3"),
        // inline code
        rule(r"`([^`\n]*)`", "$1"),
        // two or more blank lines become one
        rule(r"\n[ \t]*\n(?:[ \t]*\n)+", "\n\n"),
    ]
});

static TITLE_PUNCTUATION: &[char] = &[
    '"', '\'', '“', '”', '‘', '’', '《', '》', '「', '」', '『', '』',
];

/// Removes Markdown artifacts from `raw` and trims the result.
///
/// The rule set is applied until the text stops changing, so
/// `sanitize(&sanitize(x)) == sanitize(x)` for every input.
pub fn sanitize(raw: &str) -> String {
    let mut current = raw.to_string();
    loop {
        let next = sanitize_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn sanitize_pass(text: &str) -> String {
    let mut output = text.to_string();
    for rule in RULES.iter() {
        if rule.pattern.is_match(&output) {
            output = rule
                .pattern
                .replace_all(&output, rule.replacement)
                .into_owned();
        }
    }
    output.trim().to_string()
}

/// Normalizes a generated title: markup, wrapping quotes and line breaks are
/// dropped and the result is capped at `max_chars` characters. Returns `None`
/// when nothing usable is left.
pub fn clean_title(raw: &str, max_chars: usize) -> Option<String> {
    let cleaned: String = sanitize(raw)
        .chars()
        .filter(|ch| !TITLE_PUNCTUATION.contains(ch) && *ch != '\n' && *ch != '\r')
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(truncate_chars(trimmed, max_chars).trim_end().to_string())
}

/// Returns the longest prefix of `text` holding at most `max_chars`
/// characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
