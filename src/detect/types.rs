//! Core types for detection results.

use serde::{Deserialize, Serialize};

use crate::story::Role;

/// Severity levels for issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    /// All severities, most severe first.
    pub const ALL: [Severity; 3] = [Severity::High, Severity::Medium, Severity::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            _ => Err(format!("unknown severity: {}", s)),
        }
    }
}

static SEVERITIES: phf::Map<&'static str, Severity> = phf::phf_map! {
    "missing-story" => Severity::High,
    "missing-beat" => Severity::High,
    "empty-text" => Severity::High,
    "bad-ending" => Severity::High,
    "ellipsis-ending" => Severity::High,
    "dangling-preposition" => Severity::High,
    "dangling-conjunction" => Severity::High,
    "unbalanced-quotes" => Severity::High,
    "unbalanced-parens" => Severity::High,
    "unbalanced-ascii-quotes" => Severity::High,
    "over-limit" => Severity::High,
    "bad-json" => Severity::High,

    "missing-visual" => Severity::Medium,
    "markup-artifacts" => Severity::Medium,
    "control-chars" => Severity::Medium,
    "replacement-char" => Severity::Medium,
    "duplicate-beat" => Severity::Medium,
    "near-duplicate" => Severity::Medium,
    "template-placeholders" => Severity::Medium,
    "contains-url" => Severity::Medium,

    "too-short" => Severity::Low,
    "lowercase-start" => Severity::Low,
    "space-before-punct" => Severity::Low,
    "repeated-word" => Severity::Low,
    "double-space" => Severity::Low,
    "contains-newline" => Severity::Low,
    "repeated-punct" => Severity::Low,
    "title-as-text" => Severity::Low,
};

/// Classify a check id. Unknown ids are medium so they are never dropped.
pub fn classify(check: &str) -> Severity {
    SEVERITIES.get(check).copied().unwrap_or(Severity::Medium)
}

/// Identifiers for every check the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckType {
    // Input and structure
    BadJson,
    MissingStory,
    MissingBeat,
    EmptyText,
    // Per-beat content
    MissingVisual,
    TooShort,
    OverLimit,
    BadEnding,
    EllipsisEnding,
    SpaceBeforePunct,
    UnbalancedQuotes,
    UnbalancedParens,
    UnbalancedAsciiQuotes,
    DanglingPreposition,
    DanglingConjunction,
    MarkupArtifacts,
    TemplatePlaceholders,
    ContainsUrl,
    ReplacementChar,
    RepeatedWord,
    LowercaseStart,
    ControlChars,
    ContainsNewline,
    DoubleSpace,
    RepeatedPunct,
    TitleAsText,
    // Cross-beat
    DuplicateBeat,
    NearDuplicate,
}

impl CheckType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckType::BadJson => "bad-json",
            CheckType::MissingStory => "missing-story",
            CheckType::MissingBeat => "missing-beat",
            CheckType::EmptyText => "empty-text",
            CheckType::MissingVisual => "missing-visual",
            CheckType::TooShort => "too-short",
            CheckType::OverLimit => "over-limit",
            CheckType::BadEnding => "bad-ending",
            CheckType::EllipsisEnding => "ellipsis-ending",
            CheckType::SpaceBeforePunct => "space-before-punct",
            CheckType::UnbalancedQuotes => "unbalanced-quotes",
            CheckType::UnbalancedParens => "unbalanced-parens",
            CheckType::UnbalancedAsciiQuotes => "unbalanced-ascii-quotes",
            CheckType::DanglingPreposition => "dangling-preposition",
            CheckType::DanglingConjunction => "dangling-conjunction",
            CheckType::MarkupArtifacts => "markup-artifacts",
            CheckType::TemplatePlaceholders => "template-placeholders",
            CheckType::ContainsUrl => "contains-url",
            CheckType::ReplacementChar => "replacement-char",
            CheckType::RepeatedWord => "repeated-word",
            CheckType::LowercaseStart => "lowercase-start",
            CheckType::ControlChars => "control-chars",
            CheckType::ContainsNewline => "contains-newline",
            CheckType::DoubleSpace => "double-space",
            CheckType::RepeatedPunct => "repeated-punct",
            CheckType::TitleAsText => "title-as-text",
            CheckType::DuplicateBeat => "duplicate-beat",
            CheckType::NearDuplicate => "near-duplicate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == s)
    }

    pub fn severity(&self) -> Severity {
        classify(self.as_str())
    }

    pub const ALL: [CheckType; 28] = [
        CheckType::BadJson,
        CheckType::MissingStory,
        CheckType::MissingBeat,
        CheckType::EmptyText,
        CheckType::MissingVisual,
        CheckType::TooShort,
        CheckType::OverLimit,
        CheckType::BadEnding,
        CheckType::EllipsisEnding,
        CheckType::SpaceBeforePunct,
        CheckType::UnbalancedQuotes,
        CheckType::UnbalancedParens,
        CheckType::UnbalancedAsciiQuotes,
        CheckType::DanglingPreposition,
        CheckType::DanglingConjunction,
        CheckType::MarkupArtifacts,
        CheckType::TemplatePlaceholders,
        CheckType::ContainsUrl,
        CheckType::ReplacementChar,
        CheckType::RepeatedWord,
        CheckType::LowercaseStart,
        CheckType::ControlChars,
        CheckType::ContainsNewline,
        CheckType::DoubleSpace,
        CheckType::RepeatedPunct,
        CheckType::TitleAsText,
        CheckType::DuplicateBeat,
        CheckType::NearDuplicate,
    ];
}

impl std::fmt::Display for CheckType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where an issue was found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beat: Option<Role>,
    /// Second beat of a cross-beat pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_beat: Option<Role>,
}

impl Locator {
    pub fn file(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Default::default()
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_beat(mut self, beat: Role) -> Self {
        self.beat = Some(beat);
        self
    }

    pub fn with_pair(mut self, first: Role, second: Role) -> Self {
        self.beat = Some(first);
        self.other_beat = Some(second);
        self
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.file)?;
        if let Some(topic) = &self.topic {
            write!(f, " > {:?}", topic)?;
        }
        match (self.beat, self.other_beat) {
            (Some(a), Some(b)) => write!(f, " > {}/{}", a, b),
            (Some(a), None) => write!(f, " > {}", a),
            _ => Ok(()),
        }
    }
}

/// A single detected issue. Severity is always derived from the check type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub check: CheckType,
    pub message: String,
    pub locator: Locator,
}

impl Issue {
    pub fn new(check: CheckType, message: impl Into<String>, locator: Locator) -> Self {
        Self {
            check,
            message: message.into(),
            locator,
        }
    }

    pub fn severity(&self) -> Severity {
        self.check.severity()
    }
}

/// Issues found in one input file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileResult {
    pub file: String,
    pub issues: Vec<Issue>,
}

impl FileResult {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            issues: Vec::new(),
        }
    }

    pub fn has_high(&self) -> bool {
        self.issues.iter().any(|i| i.severity() == Severity::High)
    }
}

/// Results of running detection over a corpus.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionResult {
    /// One entry per scanned file, sorted by path.
    pub files: Vec<FileResult>,
}

impl DetectionResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files scanned.
    pub fn scanned(&self) -> usize {
        self.files.len()
    }

    pub fn issues(&self) -> impl Iterator<Item = &Issue> {
        self.files.iter().flat_map(|f| f.issues.iter())
    }

    pub fn total_issues(&self) -> usize {
        self.files.iter().map(|f| f.issues.len()).sum()
    }

    /// Check if there are any high-severity issues.
    pub fn has_high(&self) -> bool {
        self.files.iter().any(FileResult::has_high)
    }
}
