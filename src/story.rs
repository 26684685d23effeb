//! Story data model.
//!
//! A topic carries a six-beat story. Input documents are either a single
//! topic (`{ title, story }`) or a plan (`{ topics: [...] }`); only `title`
//! and `story` are read here, everything else belongs to other tools.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The six narrative roles, in story order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Hook,
    Buildup,
    Discovery,
    Twist,
    Climax,
    Punchline,
}

impl Role {
    /// All roles in narrative order.
    pub const ALL: [Role; 6] = [
        Role::Hook,
        Role::Buildup,
        Role::Discovery,
        Role::Twist,
        Role::Climax,
        Role::Punchline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Hook => "hook",
            Role::Buildup => "buildup",
            Role::Discovery => "discovery",
            Role::Twist => "twist",
            Role::Climax => "climax",
            Role::Punchline => "punchline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Role::ALL.iter().copied().find(|r| r.as_str() == s)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::parse(&s.to_lowercase()).ok_or_else(|| format!("unknown beat role: {}", s))
    }
}

/// One beat of a story.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Beat {
    /// Raw text as stored (not trimmed).
    pub text: String,
    pub visual: String,
}

impl Beat {
    pub fn new(text: impl Into<String>, visual: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            visual: visual.into(),
        }
    }

    /// Read a beat from its JSON value. Returns `None` when the value is not an object.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let text = obj.get("text").and_then(Value::as_str).unwrap_or("");
        let visual = obj.get("visual").and_then(Value::as_str).unwrap_or("");
        Some(Self::new(text, visual))
    }
}

/// A six-beat story. Slots are kept in role order; an empty slot means the
/// beat was absent or not an object.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Story {
    slots: [Option<Beat>; 6],
}

impl Story {
    /// Build a story from `(role, beat)` pairs. Later pairs for the same role win.
    pub fn from_beats<I>(beats: I) -> Self
    where
        I: IntoIterator<Item = (Role, Beat)>,
    {
        let mut story = Story::default();
        for (role, beat) in beats {
            story.slots[role_index(role)] = Some(beat);
        }
        story
    }

    /// Read a story from its JSON value. Returns `None` when the value is not an object.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let mut story = Story::default();
        for role in Role::ALL {
            story.slots[role_index(role)] = obj.get(role.as_str()).and_then(Beat::from_value);
        }
        Some(story)
    }

    pub fn beat(&self, role: Role) -> Option<&Beat> {
        self.slots[role_index(role)].as_ref()
    }

    /// Iterate over every role with its (possibly missing) beat, in role order.
    pub fn slots(&self) -> impl Iterator<Item = (Role, Option<&Beat>)> + '_ {
        Role::ALL.iter().map(move |&r| (r, self.beat(r)))
    }

    /// True when every role has a beat.
    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }
}

fn role_index(role: Role) -> usize {
    match role {
        Role::Hook => 0,
        Role::Buildup => 1,
        Role::Discovery => 2,
        Role::Twist => 3,
        Role::Climax => 4,
        Role::Punchline => 5,
    }
}

/// A lesson topic as seen by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub title: String,
    /// `None` when the story is absent or not an object.
    pub story: Option<Story>,
}

impl Topic {
    pub fn from_value(value: &Value) -> Self {
        let title = value
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let story = value.get("story").and_then(Story::from_value);
        Self { title, story }
    }
}

/// Extract topics from a document root: a plan yields each of its topics,
/// anything else is read as a single topic.
pub fn topics_from_value(root: &Value) -> Vec<Topic> {
    match root.get("topics").and_then(Value::as_array) {
        Some(topics) => topics.iter().map(Topic::from_value).collect(),
        None => vec![Topic::from_value(root)],
    }
}
