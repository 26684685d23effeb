//! Contract schema definitions for beatcheck.
//!
//! A contract carries the length limits, the legal beat endings and the
//! report settings. Everything has a default, so the contract file is
//! optional; [`ConstraintTable`] is the pure-data part handed to the engine.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::story::Role;

/// Characters that may terminate a beat.
pub const DEFAULT_VALID_ENDINGS: &str = ".!?)'\":;\u{2019}\u{201D}";

/// Beats shorter than this are flagged as too short.
pub const DEFAULT_MIN_LENGTH: usize = 20;

/// Per-role character limits. Every role except the punchline shares `beat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct LimitSet {
    pub beat: usize,
    pub punchline: usize,
}

impl LimitSet {
    /// Strict limits used when producing new text.
    pub const GENERATION: LimitSet = LimitSet {
        beat: 120,
        punchline: 80,
    };

    /// Looser ceiling used when gating existing content.
    pub const TOLERANCE: LimitSet = LimitSet {
        beat: 130,
        punchline: 90,
    };

    pub fn max_for(&self, role: Role) -> usize {
        match role {
            Role::Punchline => self.punchline,
            _ => self.beat,
        }
    }
}

/// Which limit set a caller measures against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitKind {
    Generation,
    #[default]
    Tolerance,
}

impl std::str::FromStr for LimitKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "generation" => Ok(LimitKind::Generation),
            "tolerance" => Ok(LimitKind::Tolerance),
            _ => Err(format!("unknown limit set: {}", s)),
        }
    }
}

/// Length limits and legal endings, passed explicitly to every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintTable {
    pub generation: LimitSet,
    pub tolerance: LimitSet,
    pub valid_endings: Vec<char>,
    pub min_length: usize,
}

impl Default for ConstraintTable {
    fn default() -> Self {
        Self {
            generation: LimitSet::GENERATION,
            tolerance: LimitSet::TOLERANCE,
            valid_endings: DEFAULT_VALID_ENDINGS.chars().collect(),
            min_length: DEFAULT_MIN_LENGTH,
        }
    }
}

impl ConstraintTable {
    pub fn limits(&self, kind: LimitKind) -> &LimitSet {
        match kind {
            LimitKind::Generation => &self.generation,
            LimitKind::Tolerance => &self.tolerance,
        }
    }

    /// The limit the auditor and validator gate against.
    pub fn active_max(&self, role: Role) -> usize {
        self.tolerance.max_for(role)
    }

    pub fn is_valid_ending(&self, c: char) -> bool {
        self.valid_endings.contains(&c)
    }

    /// True when the last character of `text` is a legal ending.
    pub fn ends_validly(&self, text: &str) -> bool {
        text.chars()
            .next_back()
            .map(|c| self.is_valid_ending(c))
            .unwrap_or(false)
    }
}

/// Top-level contract definition.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Contract {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Replaces the default ending set when present.
    #[serde(default)]
    pub valid_endings: Option<String>,
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub reports: ReportsConfig,
    /// Glob patterns for paths to skip (e.g. "**/drafts/**")
    #[serde(default)]
    pub excluded_paths: Vec<String>,
}

impl Contract {
    /// Parse a contract from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let contract: Contract = serde_yaml::from_str(&content)?;
        Ok(contract)
    }

    /// Build the constraint table this contract describes.
    pub fn constraints(&self) -> ConstraintTable {
        let defaults = ConstraintTable::default();
        ConstraintTable {
            generation: self.limits.generation.unwrap_or(defaults.generation),
            tolerance: self.limits.tolerance.unwrap_or(defaults.tolerance),
            valid_endings: self
                .valid_endings
                .as_deref()
                .map(|s| s.chars().collect())
                .unwrap_or(defaults.valid_endings),
            min_length: self.min_length.unwrap_or(defaults.min_length),
        }
    }

    /// Check if a path should be excluded based on excluded_paths patterns.
    pub fn is_path_excluded(&self, path: &Path) -> bool {
        if self.excluded_paths.is_empty() {
            return false;
        }

        let path_str = path.to_string_lossy();

        self.excluded_paths.iter().any(|pattern| {
            globset::Glob::new(pattern)
                .map(|g| g.compile_matcher().is_match(&*path_str))
                .unwrap_or(false)
        })
    }
}

/// Optional overrides for the two limit sets.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LimitsConfig {
    #[serde(default)]
    pub generation: Option<LimitSet>,
    #[serde(default)]
    pub tolerance: Option<LimitSet>,
}

/// Where audit reports land.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportsConfig {
    #[serde(default = "default_reports_dir")]
    pub dir: String,
    #[serde(default = "default_reports_prefix")]
    pub prefix: String,
    /// Highest `-N` suffix tried before giving up (default: 100)
    #[serde(default = "default_max_suffix")]
    pub max_suffix: u32,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            dir: default_reports_dir(),
            prefix: default_reports_prefix(),
            max_suffix: default_max_suffix(),
        }
    }
}

fn default_reports_dir() -> String {
    "reports".to_string()
}

fn default_reports_prefix() -> String {
    "content-audit".to_string()
}

fn default_max_suffix() -> u32 {
    100
}

/// Validate a contract for correctness.
pub fn validate(contract: &Contract) -> anyhow::Result<()> {
    let table = contract.constraints();

    for (name, set) in [("generation", &table.generation), ("tolerance", &table.tolerance)] {
        if set.beat == 0 || set.punchline == 0 {
            anyhow::bail!("{} limits must be positive", name);
        }
    }

    if table.generation.beat > table.tolerance.beat
        || table.generation.punchline > table.tolerance.punchline
    {
        anyhow::bail!("generation limits must not exceed tolerance limits");
    }

    if table.valid_endings.is_empty() {
        anyhow::bail!("valid_endings must not be empty");
    }

    if contract.reports.max_suffix < 2 {
        anyhow::bail!("reports.max_suffix must be at least 2");
    }

    for pattern in &contract.excluded_paths {
        globset::Glob::new(pattern)
            .map_err(|e| anyhow::anyhow!("invalid excluded_paths pattern {:?}: {}", pattern, e))?;
    }

    Ok(())
}
