//! Per-beat checks.
//!
//! Every check is a small named predicate over one beat's text so it can be
//! tested on its own; [`check_beat`] and [`check_text`] run them in a fixed
//! order and turn hits into issues.

use lazy_static::lazy_static;
use regex::Regex;

use crate::contract::ConstraintTable;
use crate::story::{Beat, Role};

use super::{CheckType, Issue, Locator};

/// How many trailing characters an over-limit message quotes.
const TAIL_CHARS: usize = 30;

/// Window at the end of a beat searched for ellipsis markers.
const ELLIPSIS_WINDOW: usize = 10;

lazy_static! {
    static ref DANGLING_PREPOSITION: Regex =
        Regex::new(r"(?i),?\s+(a|an|the|of|to|with|from|into|onto|than)\s*[.!?]$").unwrap();
    static ref DANGLING_CONJUNCTION: Regex =
        Regex::new(r"(?i),\s*(and|or|but|so|nor)\s*[.!?]$").unwrap();
    /// Comparisons such as `< 5%`, `>$20` or `90% >` are prose, not markup.
    static ref NUMERIC_COMPARISON: Regex =
        Regex::new(r"[<>]=?\s*[$]?\d[\d,.]*%?|[$]?\d[\d,.]*%?\s*[<>]=?").unwrap();
    static ref MARKUP_CHARS: Regex = Regex::new(r"[{}\[\]<>]").unwrap();
    static ref TEMPLATE_PLACEHOLDER: Regex =
        Regex::new(r"\[[^\[\]]*\]|\{\{[^{}]*\}\}|\{[A-Za-z_][A-Za-z0-9_.]*\}").unwrap();
    static ref DOUBLE_SPACE: Regex = Regex::new(r"\s{2,}").unwrap();
    static ref REPEATED_PUNCT: Regex = Regex::new(r"(?:[!?]{2,}|\.{2,})$").unwrap();
}

/// Length in characters, which is what every limit is expressed in.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// The last `n` characters of `text`.
pub fn tail(text: &str, n: usize) -> &str {
    let len = char_len(text);
    if len <= n {
        return text;
    }
    let start = text
        .char_indices()
        .nth(len - n)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &text[start..]
}

pub fn is_too_short(text: &str, min_len: usize) -> bool {
    char_len(text) < min_len
}

pub fn exceeds_limit(text: &str, max_len: usize) -> bool {
    char_len(text) > max_len
}

pub fn has_bad_ending(text: &str, table: &ConstraintTable) -> bool {
    !table.ends_validly(text)
}

pub fn has_ellipsis_ending(text: &str) -> bool {
    let window = tail(text, ELLIPSIS_WINDOW);
    window.contains('\u{2026}') || window.contains("...")
}

pub fn has_space_before_punct(text: &str, table: &ConstraintTable) -> bool {
    let mut rev = text.chars().rev();
    match (rev.next(), rev.next()) {
        (Some(last), Some(prev)) => prev == ' ' && table.is_valid_ending(last),
        _ => false,
    }
}

/// Opening curly quotes and parentheses outnumber their closers.
pub fn has_unbalanced_quotes(text: &str) -> bool {
    let count = |c: char| text.chars().filter(|&x| x == c).count();
    count('\u{201C}') + count('(') > count('\u{201D}') + count(')')
}

pub fn has_unbalanced_parens(text: &str) -> bool {
    text.matches('(').count() != text.matches(')').count()
}

pub fn has_unbalanced_ascii_quotes(text: &str) -> bool {
    text.matches('"').count() % 2 == 1
}

/// Returns the article or preposition the beat dangles on, if any.
pub fn dangling_preposition(text: &str) -> Option<String> {
    DANGLING_PREPOSITION
        .captures(text)
        .map(|c| c[1].to_string())
}

/// Returns the conjunction a `, and.`-style ending dangles on, if any.
pub fn dangling_conjunction(text: &str) -> Option<String> {
    DANGLING_CONJUNCTION
        .captures(text)
        .map(|c| c[1].to_string())
}

pub fn has_markup_artifacts(text: &str) -> bool {
    let stripped = NUMERIC_COMPARISON.replace_all(text, "");
    MARKUP_CHARS.is_match(&stripped)
}

/// Returns the first template placeholder found, if any.
pub fn find_template_placeholder(text: &str) -> Option<&str> {
    TEMPLATE_PLACEHOLDER.find(text).map(|m| m.as_str())
}

pub fn contains_url(text: &str) -> bool {
    text.contains("http://") || text.contains("https://")
}

pub fn has_replacement_char(text: &str) -> bool {
    text.contains('\u{FFFD}')
}

/// Returns the word repeated immediately before terminal punctuation
/// (`"... the end end."`), if any.
pub fn repeated_word(text: &str) -> Option<String> {
    let body = text.trim_end_matches(['.', '!', '?']);
    if body.len() == text.len() {
        return None;
    }
    let mut words = body.split_whitespace().rev();
    let last = words.next()?;
    let prev = words.next()?;
    let is_word = |w: &str| w.chars().all(char::is_alphanumeric);
    if is_word(last) && is_word(prev) && last.to_lowercase() == prev.to_lowercase() {
        Some(last.to_string())
    } else {
        None
    }
}

pub fn starts_lowercase(text: &str) -> bool {
    text.chars()
        .next()
        .map(|c| c.is_ascii_lowercase())
        .unwrap_or(false)
}

/// C0 and C1 control characters. Newlines and tabs are left to
/// [`has_raw_newline`].
pub fn has_control_chars(text: &str) -> bool {
    text.chars().any(|c| {
        let code = c as u32;
        (code < 0x20 && !matches!(c, '\n' | '\r' | '\t')) || (0x7F..=0x9F).contains(&code)
    })
}

/// Checked against the untrimmed text.
pub fn has_raw_newline(raw: &str) -> bool {
    raw.contains(['\n', '\r', '\t'])
}

pub fn has_double_space(text: &str) -> bool {
    DOUBLE_SPACE.is_match(text)
}

pub fn has_repeated_punct(text: &str) -> bool {
    REPEATED_PUNCT.is_match(text)
}

pub fn is_title_as_text(text: &str, title: &str) -> bool {
    let title = title.trim();
    !title.is_empty() && text == title
}

/// Run every per-beat check against one story slot.
///
/// A missing beat or empty text short-circuits the remaining checks for that
/// beat only.
pub fn check_beat(
    role: Role,
    beat: Option<&Beat>,
    title: &str,
    table: &ConstraintTable,
    locator: &Locator,
) -> Vec<Issue> {
    let loc = locator.clone().with_beat(role);

    let beat = match beat {
        Some(b) => b,
        None => {
            return vec![Issue::new(
                CheckType::MissingBeat,
                format!("{} beat is missing or not an object", role),
                loc,
            )]
        }
    };

    if beat.text.trim().is_empty() {
        return vec![Issue::new(
            CheckType::EmptyText,
            format!("{} text is empty", role),
            loc,
        )];
    }

    let mut issues = Vec::new();
    if beat.visual.trim().is_empty() {
        issues.push(Issue::new(
            CheckType::MissingVisual,
            format!("{} has no visual", role),
            loc,
        ));
    }
    issues.extend(check_text(role, &beat.text, title, table, locator));
    issues
}

/// Run the text checks against a single (possibly proposed) beat text.
///
/// Used by the write paths to re-validate a replacement before it is stored.
pub fn check_text(
    role: Role,
    raw: &str,
    title: &str,
    table: &ConstraintTable,
    locator: &Locator,
) -> Vec<Issue> {
    let loc = locator.clone().with_beat(role);
    let text = raw.trim();

    if text.is_empty() {
        return vec![Issue::new(
            CheckType::EmptyText,
            format!("{} text is empty", role),
            loc,
        )];
    }

    let mut issues = Vec::new();
    let mut push = |check: CheckType, message: String| {
        issues.push(Issue::new(check, message, loc.clone()));
    };

    let len = char_len(text);
    let max = table.active_max(role);

    if has_raw_newline(raw) {
        push(
            CheckType::ContainsNewline,
            "text contains a newline or tab".to_string(),
        );
    }
    if is_too_short(text, table.min_length) {
        push(
            CheckType::TooShort,
            format!("{} chars is below the minimum of {}", len, table.min_length),
        );
    }
    if exceeds_limit(text, max) {
        push(
            CheckType::OverLimit,
            format!(
                "{} chars exceeds {} limit of {}; ends with {:?}",
                len,
                role,
                max,
                tail(text, TAIL_CHARS)
            ),
        );
    }
    if has_bad_ending(text, table) {
        push(
            CheckType::BadEnding,
            format!("ends without terminal punctuation: {:?}", tail(text, TAIL_CHARS)),
        );
    }
    if has_ellipsis_ending(text) {
        push(
            CheckType::EllipsisEnding,
            format!("ends with an ellipsis: {:?}", tail(text, ELLIPSIS_WINDOW)),
        );
    }
    if has_space_before_punct(text, table) {
        push(
            CheckType::SpaceBeforePunct,
            "space before terminal punctuation".to_string(),
        );
    }
    if has_unbalanced_quotes(text) {
        push(
            CheckType::UnbalancedQuotes,
            "opening curly quotes or parentheses are never closed".to_string(),
        );
    }
    if has_unbalanced_parens(text) {
        push(
            CheckType::UnbalancedParens,
            format!(
                "{} '(' vs {} ')'",
                text.matches('(').count(),
                text.matches(')').count()
            ),
        );
    }
    if has_unbalanced_ascii_quotes(text) {
        push(
            CheckType::UnbalancedAsciiQuotes,
            format!("odd number of '\"' ({})", text.matches('"').count()),
        );
    }
    if let Some(word) = dangling_preposition(text) {
        push(
            CheckType::DanglingPreposition,
            format!("ends on a dangling {:?}: {:?}", word, tail(text, TAIL_CHARS)),
        );
    }
    if let Some(word) = dangling_conjunction(text) {
        push(
            CheckType::DanglingConjunction,
            format!("ends on a dangling {:?}: {:?}", word, tail(text, TAIL_CHARS)),
        );
    }
    if has_markup_artifacts(text) {
        push(
            CheckType::MarkupArtifacts,
            "contains markup characters ({ } [ ] < >)".to_string(),
        );
    }
    if let Some(placeholder) = find_template_placeholder(text) {
        push(
            CheckType::TemplatePlaceholders,
            format!("contains template placeholder {:?}", placeholder),
        );
    }
    if contains_url(text) {
        push(CheckType::ContainsUrl, "contains a URL".to_string());
    }
    if has_replacement_char(text) {
        push(
            CheckType::ReplacementChar,
            "contains the Unicode replacement character".to_string(),
        );
    }
    if let Some(word) = repeated_word(text) {
        push(
            CheckType::RepeatedWord,
            format!("word {:?} repeated before the ending", word),
        );
    }
    if starts_lowercase(text) {
        push(
            CheckType::LowercaseStart,
            "starts with a lowercase letter".to_string(),
        );
    }
    if has_control_chars(text) {
        push(
            CheckType::ControlChars,
            "contains control characters".to_string(),
        );
    }
    if has_double_space(text) {
        push(
            CheckType::DoubleSpace,
            "contains consecutive whitespace".to_string(),
        );
    }
    if has_repeated_punct(text) {
        push(
            CheckType::RepeatedPunct,
            format!("repeated terminal punctuation: {:?}", tail(text, 5)),
        );
    }
    if is_title_as_text(text, title) {
        push(
            CheckType::TitleAsText,
            "text is just the topic title".to_string(),
        );
    }

    issues
}
