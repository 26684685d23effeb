//! Detection of structural and syntactic defects in story text.

mod beat;
mod cross;
mod runner;
mod types;

pub use beat::{
    char_len, check_beat, check_text, contains_url, dangling_conjunction, dangling_preposition,
    exceeds_limit, find_template_placeholder, has_bad_ending, has_control_chars,
    has_double_space, has_ellipsis_ending, has_markup_artifacts, has_raw_newline,
    has_repeated_punct, has_replacement_char, has_space_before_punct, has_unbalanced_ascii_quotes,
    has_unbalanced_parens, has_unbalanced_quotes, is_title_as_text, is_too_short, repeated_word,
    starts_lowercase, tail,
};
pub use cross::{check_story, duplicate_pairs, near_duplicate_pairs, NEAR_DUPLICATE_PREFIX};
pub use runner::{check_file, collect_files, Runner};
pub use types::{classify, CheckType, DetectionResult, FileResult, Issue, Locator, Severity};

use serde_json::Value;

use crate::contract::ConstraintTable;
use crate::story::{topics_from_value, Topic};

/// Run every check for one topic: beats in role order, then cross-beat checks.
pub fn check_topic(topic: &Topic, table: &ConstraintTable, file: &str) -> Vec<Issue> {
    let locator = Locator::file(file).with_topic(topic.title.clone());

    let story = match &topic.story {
        Some(s) => s,
        None => {
            return vec![Issue::new(
                CheckType::MissingStory,
                "topic has no story object",
                locator,
            )]
        }
    };

    let mut issues: Vec<Issue> = story
        .slots()
        .flat_map(|(role, beat)| check_beat(role, beat, &topic.title, table, &locator))
        .collect();
    issues.extend(check_story(story, &locator));
    issues
}

/// Run every check for a parsed document (single topic or plan).
pub fn check_document(root: &Value, table: &ConstraintTable, file: &str) -> Vec<Issue> {
    topics_from_value(root)
        .iter()
        .flat_map(|topic| check_topic(topic, table, file))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn clean_story() -> Value {
        json!({
            "hook": { "text": "Why does a dropped apple always fall straight down?", "visual": "🍎" },
            "buildup": { "text": "Newton noticed that nothing ever falls upward or sideways.", "visual": "🧐" },
            "discovery": { "text": "He realised one force pulls the apple and holds the Moon.", "visual": "🌙" },
            "twist": { "text": "The Moon is falling too, it just keeps missing the Earth.", "visual": "🌍" },
            "climax": { "text": "That single idea explained tides, orbits and falling fruit.", "visual": "🌊" },
            "punchline": { "text": "The apple and the Moon obey the same rule.", "visual": "✨" }
        })
    }

    #[test]
    fn test_clean_topic_has_no_issues() {
        let doc = json!({ "title": "Gravity", "story": clean_story() });
        let issues = check_document(&doc, &ConstraintTable::default(), "gravity.json");
        assert!(issues.is_empty(), "unexpected: {:?}", issues);
    }

    #[test]
    fn test_missing_story() {
        let doc = json!({ "topics": [ { "title": "No Story" } ] });
        let issues = check_document(&doc, &ConstraintTable::default(), "plan.json");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].check, CheckType::MissingStory);
        assert_eq!(issues[0].severity(), Severity::High);
        assert_eq!(issues[0].locator.topic.as_deref(), Some("No Story"));
    }

    #[test]
    fn test_duplicate_hook_and_twist() {
        let mut story = clean_story();
        story["twist"]["text"] = story["hook"]["text"].clone();
        let doc = json!({ "title": "Gravity", "story": story });
        let issues = check_document(&doc, &ConstraintTable::default(), "gravity.json");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].check, CheckType::DuplicateBeat);
        assert_eq!(issues[0].severity(), Severity::Medium);
        assert_eq!(issues[0].locator.beat, Some(crate::story::Role::Hook));
        assert_eq!(
            issues[0].locator.other_beat,
            Some(crate::story::Role::Twist)
        );
    }

    #[test]
    fn test_cross_beat_issues_come_last() {
        let mut story = clean_story();
        story["twist"]["text"] = story["hook"]["text"].clone();
        story["punchline"]["text"] = json!("no ending here");
        let doc = json!({ "title": "Gravity", "story": story });
        let issues = check_document(&doc, &ConstraintTable::default(), "gravity.json");
        assert_eq!(
            issues.last().map(|i| i.check),
            Some(CheckType::DuplicateBeat)
        );
        assert!(issues.iter().any(|i| i.check == CheckType::BadEnding));
    }
}
