//! Checks that need the whole story: exact and near duplicate beats.

use std::collections::HashMap;

use crate::story::{Role, Story};

use super::{CheckType, Issue, Locator};

/// Prefix length compared by the near-duplicate check.
pub const NEAR_DUPLICATE_PREFIX: usize = 40;

/// First `n` characters of `text`.
fn prefix(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

/// Trimmed, non-empty beat texts in role order.
fn filled_texts(story: &Story) -> Vec<(Role, &str)> {
    story
        .slots()
        .filter_map(|(role, beat)| beat.map(|b| (role, b.text.trim())))
        .filter(|(_, text)| !text.is_empty())
        .collect()
}

/// Pairs of roles with byte-identical text.
///
/// Each repeat is paired with the first role that used the text, so three
/// identical beats give two pairs, not three.
pub fn duplicate_pairs(story: &Story) -> Vec<(Role, Role)> {
    let mut first_seen: HashMap<&str, Role> = HashMap::new();
    let mut pairs = Vec::new();

    for (role, text) in filled_texts(story) {
        match first_seen.get(text) {
            Some(&first) => pairs.push((first, role)),
            None => {
                first_seen.insert(text, role);
            }
        }
    }

    pairs
}

/// Pairs of roles whose first 40 characters match while the full texts differ.
///
/// Every pair is checked independently. Texts shorter than the prefix are
/// compared whole, so they can never be near duplicates of each other.
pub fn near_duplicate_pairs(story: &Story) -> Vec<(Role, Role)> {
    let texts = filled_texts(story);
    let mut pairs = Vec::new();

    for (i, (role_a, a)) in texts.iter().enumerate() {
        for (role_b, b) in &texts[i + 1..] {
            if a != b
                && prefix(a, NEAR_DUPLICATE_PREFIX) == prefix(b, NEAR_DUPLICATE_PREFIX)
            {
                pairs.push((*role_a, *role_b));
            }
        }
    }

    pairs
}

/// Run the cross-beat checks for one story.
pub fn check_story(story: &Story, locator: &Locator) -> Vec<Issue> {
    let duplicates = duplicate_pairs(story).into_iter().map(|(a, b)| {
        Issue::new(
            CheckType::DuplicateBeat,
            format!("{} and {} have identical text", a, b),
            locator.clone().with_pair(a, b),
        )
    });

    let near = near_duplicate_pairs(story).into_iter().map(|(a, b)| {
        Issue::new(
            CheckType::NearDuplicate,
            format!(
                "{} and {} share the same first {} characters",
                a, b, NEAR_DUPLICATE_PREFIX
            ),
            locator.clone().with_pair(a, b),
        )
    });

    duplicates.chain(near).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::Beat;

    fn story(texts: &[(Role, &str)]) -> Story {
        Story::from_beats(texts.iter().map(|&(r, t)| (r, Beat::new(t, "v"))))
    }

    #[test]
    fn test_duplicate_pair_named_once() {
        let s = story(&[
            (Role::Hook, "The sky is blue."),
            (Role::Buildup, "Light scatters."),
            (Role::Twist, "The sky is blue."),
        ]);
        let issues = check_story(&s, &Locator::file("a.json"));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].check, CheckType::DuplicateBeat);
        assert_eq!(issues[0].locator.beat, Some(Role::Hook));
        assert_eq!(issues[0].locator.other_beat, Some(Role::Twist));
        assert!(issues[0].message.contains("hook"));
        assert!(issues[0].message.contains("twist"));
    }

    #[test]
    fn test_triple_duplicate_gives_two_pairs() {
        let s = story(&[
            (Role::Hook, "Same."),
            (Role::Discovery, "Same."),
            (Role::Punchline, "  Same.  "),
        ]);
        assert_eq!(
            duplicate_pairs(&s),
            vec![(Role::Hook, Role::Discovery), (Role::Hook, Role::Punchline)]
        );
    }

    #[test]
    fn test_empty_texts_are_not_duplicates() {
        let s = story(&[(Role::Hook, ""), (Role::Twist, "  ")]);
        assert!(duplicate_pairs(&s).is_empty());
    }

    #[test]
    fn test_near_duplicates_checked_pairwise() {
        let base = "Photosynthesis turns sunlight into sugar for the plant";
        let s = story(&[
            (Role::Hook, &format!("{}.", base)),
            (Role::Buildup, &format!("{} and us.", base)),
            (Role::Climax, &format!("{}, slowly.", base)),
        ]);
        let pairs = near_duplicate_pairs(&s);
        assert_eq!(
            pairs,
            vec![
                (Role::Hook, Role::Buildup),
                (Role::Hook, Role::Climax),
                (Role::Buildup, Role::Climax),
            ]
        );
    }

    #[test]
    fn test_short_texts_compared_whole() {
        let s = story(&[(Role::Hook, "Short one."), (Role::Twist, "Short one, longer.")]);
        assert!(near_duplicate_pairs(&s).is_empty());
    }

    #[test]
    fn test_prefix_is_char_based() {
        assert_eq!(prefix("héllo", 2), "hé");
        assert_eq!(prefix("ab", 5), "ab");
    }
}
