//! Meaning-preserving shortening of over-length beat text.
//!
//! Reductions are tried in a fixed order and the first one that fits wins.
//! The terminal punctuation is split off first and re-attached after every
//! attempt, so no stage can damage it. Nothing here truncates mid-word or
//! adds an ellipsis; when no safe reduction fits, the (ending-normalized)
//! input comes back and the caller sees the overflow by measuring it.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::contract::ConstraintTable;
use crate::detect::{
    char_len, has_unbalanced_ascii_quotes, has_unbalanced_parens, has_unbalanced_quotes,
};

/// A clause cut must leave more than this many characters in front of it.
const MIN_CUT_INDEX: usize = 20;

/// Clause cuts must land within 60-100% of the target length.
const MIN_RATIO_PERCENT: usize = 60;

/// Verbose phrase to concise replacement, applied in order.
static PHRASES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)\bin order to\b", "to"),
        (r"(?i)\bdue to the fact that\b", "because"),
        (r"(?i)\bbecause of the fact that\b", "because"),
        (r"(?i)\bin spite of the fact that\b", "although"),
        (r"(?i)\bat this point in time\b", "now"),
        (r"(?i)\bin the event that\b", "if"),
        (r"(?i)\bfor the purpose of\b", "for"),
        (r"(?i)\bwith regard to\b", "about"),
        (r"(?i)\ba large number of\b", "many"),
        (r"(?i)\bthe majority of\b", "most"),
        (r"(?i)\bhas the ability to\b", "can"),
        (r"(?i)\b(?:is|are) able to\b", "can"),
        (r"(?i)\bas a result\b", "so"),
        (r"(?i)\bnevertheless\b", "still"),
        (r"(?i),\s*however,", ", but"),
        (r"(?i)\bhowever\b", "but"),
        (r"(?i)\btherefore\b", "so"),
        (r"(?i)\bvery\s+", ""),
        (r"(?i)\bjust\s+", ""),
        (r"(?i)\bactually\s+", ""),
        (r"(?i)\breally\s+", ""),
        (r"(?i)\bbasically\s+", ""),
        (r"(?i)\bquite\s+", ""),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).unwrap(), replacement))
    .collect()
});

static PARENTHETICAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\([^()]*\)").unwrap());
static LEADING_CONNECTIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:And|But|So|Yet|Now|Then|Still),?\s+").unwrap());
static SENTENCE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]\s+\S").unwrap());
static RELATIVE_CLAUSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s(?:that|which|who)\s").unwrap());
static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());
static SPACE_BEFORE_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+([,;:])").unwrap());

/// Which reduction produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Already within the limit; only the ending was normalized.
    Fits,
    /// Input already carries an ellipsis and was left alone.
    Refused,
    Phrase,
    Parenthetical,
    Connective,
    CommaClause,
    PunctuationClause,
    FirstSentence,
    RelativeClause,
    /// No safe reduction fit; the normalized input is returned.
    Unchanged,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fits => "fits",
            Stage::Refused => "refused",
            Stage::Phrase => "phrase",
            Stage::Parenthetical => "parenthetical",
            Stage::Connective => "connective",
            Stage::CommaClause => "comma-clause",
            Stage::PunctuationClause => "punctuation-clause",
            Stage::FirstSentence => "first-sentence",
            Stage::RelativeClause => "relative-clause",
            Stage::Unchanged => "unchanged",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The outcome of a shortening attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortened {
    pub text: String,
    pub stage: Stage,
}

impl Shortened {
    fn new(text: impl Into<String>, stage: Stage) -> Self {
        Self {
            text: text.into(),
            stage,
        }
    }

    pub fn fits(&self, max_len: usize) -> bool {
        char_len(&self.text) <= max_len
    }

    /// True when a reduction stage changed the text.
    pub fn was_reduced(&self) -> bool {
        !matches!(self.stage, Stage::Fits | Stage::Refused | Stage::Unchanged)
    }
}

/// Shorten `text` to at most `max_len` characters using the default endings.
pub fn shorten(text: &str, max_len: usize) -> String {
    shorten_with(text, max_len, &ConstraintTable::default()).text
}

/// Shorten `text` to at most `max_len` characters, reporting the stage used.
pub fn shorten_with(text: &str, max_len: usize, table: &ConstraintTable) -> Shortened {
    let trimmed = text.trim();
    let (core, ending) = split_ending(trimmed, table);
    let normalized = join(core, ending);
    if char_len(&normalized) <= max_len {
        return Shortened::new(normalized, Stage::Fits);
    }

    if has_ellipsis(trimmed) {
        return Shortened::new(trimmed, Stage::Refused);
    }

    let fits = |s: &str| char_len(s) <= max_len;
    // A cut must not leave an opener without its closer, unless the input
    // was already unbalanced.
    let was_balanced = is_balanced(&normalized);
    let in_band = |s: &str| {
        let n = char_len(s);
        n <= max_len
            && n * 100 >= max_len * MIN_RATIO_PERCENT
            && (is_balanced(s) || !was_balanced)
    };
    let capitalized = core.chars().next().map(char::is_uppercase).unwrap_or(false);

    let mut work = core.to_string();

    for (re, replacement) in PHRASES.iter() {
        if !re.is_match(&work) {
            continue;
        }
        work = {
            let replaced =
                re.replace_all(&work, |caps: &Captures| match_case(&caps[0], replacement));
            tidy(&replaced, capitalized)
        };
        let candidate = join(&work, ending);
        if fits(&candidate) {
            return Shortened::new(candidate, Stage::Phrase);
        }
    }

    if PARENTHETICAL.is_match(&work) {
        work = tidy(&PARENTHETICAL.replace_all(&work, ""), capitalized);
        let candidate = join(&work, ending);
        if fits(&candidate) {
            return Shortened::new(candidate, Stage::Parenthetical);
        }
    }

    if let Some(m) = LEADING_CONNECTIVE.find(&work) {
        work = capitalize_first(&work[m.end()..]);
        let candidate = join(&work, ending);
        if fits(&candidate) {
            return Shortened::new(candidate, Stage::Connective);
        }
    }

    if let Some(head) = cut_at_last(&work, &[',']) {
        let candidate = join(head, ending);
        if in_band(&candidate) {
            return Shortened::new(candidate, Stage::CommaClause);
        }
    }

    if let Some(head) = cut_at_last(&work, &['\u{2014}', ':', ';']) {
        let candidate = join(head, ending);
        if in_band(&candidate) {
            return Shortened::new(candidate, Stage::PunctuationClause);
        }
    }

    if let Some(first) = first_sentence(&work) {
        if in_band(first) {
            return Shortened::new(first, Stage::FirstSentence);
        }
    }

    if let Some(head) = cut_relative_clause(&work) {
        let candidate = join(head, ending);
        if in_band(&candidate) {
            return Shortened::new(candidate, Stage::RelativeClause);
        }
    }

    tracing::debug!(max_len, len = char_len(&normalized), "no safe reduction fits");
    Shortened::new(normalized, Stage::Unchanged)
}

fn has_ellipsis(text: &str) -> bool {
    text.contains('\u{2026}') || text.contains("...")
}

/// Split the final terminal mark off the text. Text without a legal ending
/// gets a period; whitespace before the ending is dropped.
fn split_ending<'a>(text: &'a str, table: &ConstraintTable) -> (&'a str, &'a str) {
    match text.char_indices().last() {
        Some((idx, c)) if table.is_valid_ending(c) => (text[..idx].trim_end(), &text[idx..]),
        _ => (text, "."),
    }
}

fn is_balanced(text: &str) -> bool {
    !has_unbalanced_quotes(text)
        && !has_unbalanced_parens(text)
        && !has_unbalanced_ascii_quotes(text)
}

fn join(core: &str, ending: &str) -> String {
    format!("{}{}", core.trim_end(), ending)
}

/// Keep the replacement's case in line with the text it replaces.
fn match_case(matched: &str, replacement: &str) -> String {
    let upper = matched.chars().next().map(char::is_uppercase).unwrap_or(false);
    if upper {
        capitalize_first(replacement)
    } else {
        replacement.to_string()
    }
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Collapse whitespace left behind by a removal and restore a leading capital.
fn tidy(s: &str, capitalized: bool) -> String {
    let collapsed = MULTI_SPACE.replace_all(s, " ");
    let collapsed = SPACE_BEFORE_PUNCT.replace_all(&collapsed, "$1");
    let trimmed = collapsed.trim();
    if capitalized {
        capitalize_first(trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Everything before the last of `marks`, if the mark sits far enough in.
fn cut_at_last<'a>(text: &'a str, marks: &[char]) -> Option<&'a str> {
    let idx = text.rfind(|c| marks.contains(&c))?;
    let head = &text[..idx];
    (char_len(head) > MIN_CUT_INDEX).then(|| head.trim_end())
}

/// The first sentence including its own terminal mark, if there is more than one.
fn first_sentence(text: &str) -> Option<&str> {
    let m = SENTENCE_BREAK.find(text)?;
    Some(&text[..m.start() + 1])
}

/// Everything before the last ` that|which|who ` clause, if it sits far enough in.
fn cut_relative_clause(text: &str) -> Option<&str> {
    let m = RELATIVE_CLAUSE
        .find_iter(text)
        .filter(|m| char_len(&text[..m.start()]) > MIN_CUT_INDEX)
        .last()?;
    Some(&text[..m.start()])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ConstraintTable {
        ConstraintTable::default()
    }

    fn ends_validly(s: &str) -> bool {
        table().ends_validly(s)
    }

    #[test]
    fn test_fitting_text_is_returned_normalized() {
        assert_eq!(shorten("Short and sweet.", 40), "Short and sweet.");
        assert_eq!(shorten("  No ending here ", 40), "No ending here.");
        assert_eq!(shorten("Spaced out !", 40), "Spaced out!");
    }

    #[test]
    fn test_idempotent_within_limit() {
        let once = shorten("A tidy line with a proper ending!", 50);
        assert_eq!(shorten(&once, 50), once);
    }

    #[test]
    fn test_refuses_existing_ellipsis() {
        let r = shorten_with("It went on and on and on\u{2026}", 5, &table());
        assert_eq!(r.stage, Stage::Refused);
        assert_eq!(r.text, "It went on and on and on\u{2026}");

        let r = shorten_with("It went on and on... forever.", 5, &table());
        assert_eq!(r.stage, Stage::Refused);
    }

    #[test]
    fn test_short_ellipsis_text_is_normalized_not_refused() {
        let r = shorten_with("Wait for it\u{2026}", 40, &table());
        assert_eq!(r.stage, Stage::Fits);
        assert_eq!(r.text, "Wait for it\u{2026}.");
        assert!(ends_validly(&r.text));
    }

    #[test]
    fn test_trailing_parenthetical_is_removable() {
        let r = shorten_with(
            "The cell divides into two daughter cells (a process called mitosis).",
            50,
            &table(),
        );
        assert_eq!(r.stage, Stage::Parenthetical);
        assert_eq!(r.text, "The cell divides into two daughter cells.");
    }

    #[test]
    fn test_clause_cut_never_leaves_stray_closer() {
        let input = "An extremely long opening clause about the weather, then a quiet aside (mostly rain).";
        let r = shorten_with(input, 60, &table());
        assert!(!has_unbalanced_parens(&r.text), "{:?} is unbalanced", r.text);
        assert!(!has_unbalanced_quotes(&r.text));
        assert!(ends_validly(&r.text));
        assert!(r.fits(60), "{:?} is too long", r.text);
    }

    #[test]
    fn test_clause_cut_rejected_when_it_splits_a_quote() {
        let input = "The teacher wrote \u{201C}read chapter four, then chapter five\u{201D} on the board today.";
        let r = shorten_with(input, 55, &table());
        assert_eq!(r.stage, Stage::Unchanged);
        assert_eq!(r.text, input);
        assert!(!has_unbalanced_quotes(&r.text));
    }

    #[test]
    fn test_however_and_filler_before_clause_cut() {
        let input = "This is, however, a very long sentence that must be shortened.";
        let r = shorten_with(input, 40, &table());
        assert!(r.fits(40), "{:?} is too long", r.text);
        assert!(ends_validly(&r.text));
        assert!(!r.text.contains('\u{2026}') && !r.text.contains("..."));
        assert!(!r.text.contains("however"));
        assert!(!r.text.contains("very"));
        assert_eq!(r.stage, Stage::RelativeClause);
        assert_eq!(r.text, "This is, but a long sentence.");
        // deterministic
        assert_eq!(shorten(input, 40), r.text);
    }

    #[test]
    fn test_phrase_substitution_stops_at_first_fit() {
        let r = shorten_with("We did it in order to win the match today.", 36, &table());
        assert_eq!(r.stage, Stage::Phrase);
        assert_eq!(r.text, "We did it to win the match today.");
    }

    #[test]
    fn test_substitution_keeps_leading_capital() {
        let r = shorten_with("Very few people ever notice the tiny moons of Mars.", 46, &table());
        assert_eq!(r.text, "Few people ever notice the tiny moons of Mars.");
    }

    #[test]
    fn test_parenthetical_removed() {
        let r = shorten_with(
            "The cell divides (a process called mitosis) into two.",
            30,
            &table(),
        );
        assert_eq!(r.stage, Stage::Parenthetical);
        assert_eq!(r.text, "The cell divides into two.");
    }

    #[test]
    fn test_leading_connective_stripped() {
        let r = shorten_with("But the experiment failed in a spectacular way.", 43, &table());
        assert_eq!(r.stage, Stage::Connective);
        assert_eq!(r.text, "The experiment failed in a spectacular way.");
    }

    #[test]
    fn test_comma_clause_cut() {
        let r = shorten_with(
            "The river carved the canyon over millions of years, grain by grain by grain.",
            60,
            &table(),
        );
        assert_eq!(r.stage, Stage::CommaClause);
        assert_eq!(r.text, "The river carved the canyon over millions of years.");
    }

    #[test]
    fn test_dash_clause_cut() {
        let r = shorten_with(
            "Everyone expected a loud explosion at the end \u{2014} but there was only silence.",
            60,
            &table(),
        );
        assert_eq!(r.stage, Stage::PunctuationClause);
        assert_eq!(r.text, "Everyone expected a loud explosion at the end.");
    }

    #[test]
    fn test_first_sentence_kept() {
        let r = shorten_with(
            "Cells divide to grow. Then they specialise into tissues, organs and whole bodies over time.",
            34,
            &table(),
        );
        assert_eq!(r.stage, Stage::FirstSentence);
        assert_eq!(r.text, "Cells divide to grow.");
    }

    #[test]
    fn test_ratio_guard_prevents_over_shortening() {
        let input = "Water boils at one hundred degrees, unless you happen to be standing on top of a tall mountain.";
        let r = shorten_with(input, 80, &table());
        assert_eq!(r.stage, Stage::Unchanged);
        assert_eq!(r.text, input);
        assert!(!r.fits(80));
    }

    #[test]
    fn test_invariants_over_samples() {
        let samples = [
            "This is, however, a very long sentence that must be shortened.",
            "In order to understand stars, we actually need to look at what they are made of (mostly hydrogen).",
            "And then, quite suddenly, the whole population of bacteria doubled; nobody expected it.",
            "Light from the Sun takes about eight minutes to reach us. It is old news by the time we see it!",
            "\u{201C}Eureka,\u{201D} he shouted, running through the streets of Syracuse without any clothes on.",
        ];
        for input in samples {
            for max in [20, 40, 60, 80, 120] {
                let out = shorten(input, max);
                assert!(
                    char_len(&out) <= char_len(input),
                    "{:?} grew to {:?}",
                    input,
                    out
                );
                assert!(!out.contains('\u{2026}') && !out.contains("..."));
                assert!(ends_validly(&out), "{:?} lacks a valid ending", out);
            }
        }
    }
}
