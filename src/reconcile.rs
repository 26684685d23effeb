//! Reconciliation of curated rewrites against stored story text.
//!
//! Each defect record names a beat and the text the extraction step saw
//! there. A replacement is only applied when it passes every check and the
//! stored text still equals that expected original (an optimistic lock).
//! Documents are loaded once per file and written once at the end.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::contract::ConstraintTable;
use crate::detect::{check_text, CheckType, Issue, Locator};
use crate::store::{Document, StoreError};
use crate::story::Role;

/// A beat flagged upstream, with the text it held when it was flagged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefectRecord {
    pub file: String,
    pub topic_title: String,
    pub beat: Role,
    pub original_text: String,
    /// Check ids detected on the original text.
    #[serde(default)]
    pub issues: Vec<String>,
}

impl DefectRecord {
    pub fn locator(&self) -> Locator {
        Locator::file(self.file.clone())
            .with_topic(self.topic_title.clone())
            .with_beat(self.beat)
    }

    fn has_issue(&self, check: CheckType) -> bool {
        self.issues.iter().any(|i| i == check.as_str())
    }

    pub fn load_all(path: &Path) -> anyhow::Result<Vec<DefectRecord>> {
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading defects {}: {}", path.display(), e))?;
        serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("parsing defects {}: {}", path.display(), e))
    }
}

/// One curated replacement as stored in a rewrite file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rewrite {
    pub file: String,
    pub topic: String,
    pub beat: Role,
    pub text: String,
}

/// Curated manual rewrites keyed by (file, topic title, beat).
#[derive(Debug, Clone, Default)]
pub struct RewriteTable {
    entries: HashMap<(String, String, Role), String>,
}

impl RewriteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        file: impl Into<String>,
        topic: impl Into<String>,
        beat: Role,
        text: impl Into<String>,
    ) {
        self.entries
            .insert((file.into(), topic.into(), beat), text.into());
    }

    pub fn get(&self, file: &str, topic: &str, beat: Role) -> Option<&str> {
        self.entries
            .get(&(file.to_string(), topic.to_string(), beat))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load a JSON array of `{ file, topic, beat, text }` entries.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading rewrites {}: {}", path.display(), e))?;
        let rewrites: Vec<Rewrite> = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("parsing rewrites {}: {}", path.display(), e))?;
        Ok(rewrites.into_iter().collect())
    }
}

impl FromIterator<Rewrite> for RewriteTable {
    fn from_iter<I: IntoIterator<Item = Rewrite>>(iter: I) -> Self {
        let mut table = RewriteTable::new();
        for r in iter {
            table.insert(r.file, r.topic, r.beat, r.text);
        }
        table
    }
}

/// The mechanical fix for `space-before-punct`: drop the whitespace directly
/// in front of the final character.
pub fn remove_space_before_ending(text: &str) -> Option<String> {
    let text = text.trim();
    let last = text.chars().next_back()?;
    let body = &text[..text.len() - last.len_utf8()];
    let stripped = body.trim_end();
    if stripped.len() == body.len() || stripped.is_empty() {
        return None;
    }
    Some(format!("{}{}", stripped, last))
}

/// A replacement ready to be applied: consumed once, and only if the stored
/// text still matches `original_text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationRecord {
    pub locator: Locator,
    pub original_text: String,
    pub proposed_text: String,
}

/// Why an entry could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileFailure {
    #[error("no curated rewrite or automatic rule applies")]
    NoRule,
    #[error("proposed text still fails: {}", .0.join(", "))]
    StillFailing(Vec<String>),
    #[error("{0}")]
    Load(String),
    #[error("{0}")]
    Locate(String),
    #[error("stored text changed since extraction (found {found:?})")]
    Stale { found: String },
    #[error("write failed: {0}")]
    Write(String),
}

/// Result for one defect record.
#[derive(Debug, Clone)]
pub struct EntryOutcome {
    pub locator: Locator,
    pub result: Result<String, ReconcileFailure>,
}

impl EntryOutcome {
    pub fn is_fixed(&self) -> bool {
        self.result.is_ok()
    }
}

/// Result of a reconciliation batch.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    pub entries: Vec<EntryOutcome>,
    /// Documents written back (empty on a dry run).
    pub written: Vec<PathBuf>,
    pub dry_run: bool,
}

impl ReconcileOutcome {
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    pub fn fixed(&self) -> usize {
        self.entries.iter().filter(|e| e.is_fixed()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.fixed()
    }

    /// A batch with any failure is a failed batch, even though its
    /// successful writes are kept.
    pub fn succeeded(&self) -> bool {
        self.failed() == 0
    }
}

/// Applies curated rewrites to stored documents.
pub struct Reconciler<'a> {
    table: &'a ConstraintTable,
    rewrites: &'a RewriteTable,
    root: PathBuf,
    dry_run: bool,
}

impl<'a> Reconciler<'a> {
    /// Record file names are resolved against `root`.
    pub fn new(table: &'a ConstraintTable, rewrites: &'a RewriteTable, root: impl Into<PathBuf>) -> Self {
        Self {
            table,
            rewrites,
            root: root.into(),
            dry_run: false,
        }
    }

    /// Validate everything but skip the final writes.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Pick the replacement for a record: the curated text, else the
    /// automatic space-before-punctuation rule.
    pub fn propose(&self, record: &DefectRecord) -> Option<String> {
        if let Some(text) = self
            .rewrites
            .get(&record.file, &record.topic_title, record.beat)
        {
            return Some(text.to_string());
        }
        if record.has_issue(CheckType::SpaceBeforePunct) {
            return remove_space_before_ending(&record.original_text);
        }
        None
    }

    /// Run the checks a replacement must pass.
    pub fn verify(&self, record: &DefectRecord, proposed: &str) -> Vec<Issue> {
        check_text(
            record.beat,
            proposed,
            &record.topic_title,
            self.table,
            &Locator::file(record.file.clone()).with_topic(record.topic_title.clone()),
        )
    }

    pub fn run(&self, records: &[DefectRecord]) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome {
            dry_run: self.dry_run,
            ..Default::default()
        };
        // BTreeMap so documents are written in a stable order.
        let mut documents: BTreeMap<String, Result<Document, StoreError>> = BTreeMap::new();
        let mut touched: BTreeMap<String, Vec<usize>> = BTreeMap::new();

        for record in records {
            let locator = record.locator();
            let result = self.reconcile_one(record, &mut documents);
            match &result {
                Ok(text) => {
                    tracing::info!(target: "reconcile", %locator, text = %text, "applied");
                    touched
                        .entry(record.file.clone())
                        .or_default()
                        .push(outcome.entries.len());
                }
                Err(e) => tracing::warn!(target: "reconcile", %locator, error = %e, "rejected"),
            }
            outcome.entries.push(EntryOutcome { locator, result });
        }

        if self.dry_run {
            return outcome;
        }

        for (file, indices) in touched {
            let Some(Ok(doc)) = documents.get(&file) else {
                continue;
            };
            match doc.save() {
                Ok(()) => outcome.written.push(doc.path().to_path_buf()),
                Err(e) => {
                    tracing::error!(target: "reconcile", file = %file, error = %e, "write failed");
                    for i in indices {
                        outcome.entries[i].result = Err(ReconcileFailure::Write(e.to_string()));
                    }
                }
            }
        }

        outcome
    }

    fn reconcile_one(
        &self,
        record: &DefectRecord,
        documents: &mut BTreeMap<String, Result<Document, StoreError>>,
    ) -> Result<String, ReconcileFailure> {
        let proposed = self.propose(record).ok_or(ReconcileFailure::NoRule)?;

        let remaining = self.verify(record, &proposed);
        if !remaining.is_empty() {
            return Err(ReconcileFailure::StillFailing(
                remaining
                    .iter()
                    .map(|i| format!("{} ({})", i.check, i.message))
                    .collect(),
            ));
        }

        let doc = documents
            .entry(record.file.clone())
            .or_insert_with(|| Document::load(self.root.join(&record.file)));
        let doc = doc
            .as_mut()
            .map_err(|e| ReconcileFailure::Load(e.to_string()))?;

        let remediation = RemediationRecord {
            locator: record.locator(),
            original_text: record.original_text.clone(),
            proposed_text: proposed,
        };
        apply(doc, &remediation, &record.topic_title, record.beat)?;
        Ok(remediation.proposed_text)
    }
}

/// Apply one remediation to a loaded document, enforcing the optimistic lock.
/// Surrounding whitespace is ignored; everything else must match exactly.
fn apply(
    doc: &mut Document,
    remediation: &RemediationRecord,
    title: &str,
    role: Role,
) -> Result<(), ReconcileFailure> {
    let stored = doc
        .beat_text(title, role)
        .map_err(|e| ReconcileFailure::Locate(e.to_string()))?;
    if stored.trim() != remediation.original_text.trim() {
        return Err(ReconcileFailure::Stale {
            found: stored.to_string(),
        });
    }
    doc.set_beat_text(title, role, &remediation.proposed_text)
        .map_err(|e| ReconcileFailure::Locate(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const LONG_HOOK: &str = "Why does every dropped apple fall straight down to the ground ?";
    const FIXED_HOOK: &str = "Why does every dropped apple fall straight down to the ground?";

    fn write_topic(dir: &Path, name: &str, hook: &str) {
        let doc = json!({
            "title": "Gravity",
            "story": {
                "hook": { "text": hook, "visual": "🍎" },
                "twist": { "text": "The Moon is falling too, it just keeps missing us.", "visual": "🌙" }
            },
            "published": true
        });
        fs::write(dir.join(name), serde_json::to_string_pretty(&doc).unwrap()).unwrap();
    }

    fn record(file: &str, original: &str, issues: &[&str]) -> DefectRecord {
        DefectRecord {
            file: file.to_string(),
            topic_title: "Gravity".to_string(),
            beat: Role::Hook,
            original_text: original.to_string(),
            issues: issues.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_remove_space_before_ending() {
        assert_eq!(
            remove_space_before_ending("It worked !").as_deref(),
            Some("It worked!")
        );
        assert_eq!(remove_space_before_ending("It worked!"), None);
        assert_eq!(remove_space_before_ending(" !"), None);
    }

    #[test]
    fn test_auto_rule_applies_and_writes() {
        let temp = TempDir::new().unwrap();
        write_topic(temp.path(), "gravity.json", LONG_HOOK);
        let table = ConstraintTable::default();
        let rewrites = RewriteTable::new();

        let outcome = Reconciler::new(&table, &rewrites, temp.path())
            .run(&[record("gravity.json", LONG_HOOK, &["space-before-punct"])]);

        assert_eq!(outcome.fixed(), 1);
        assert!(outcome.succeeded());
        assert_eq!(outcome.written.len(), 1);
        let doc = Document::load(temp.path().join("gravity.json")).unwrap();
        assert_eq!(doc.beat_text("Gravity", Role::Hook).unwrap(), FIXED_HOOK);
        assert_eq!(doc.root()["published"], json!(true));
    }

    #[test]
    fn test_lock_ignores_surrounding_whitespace() {
        let temp = TempDir::new().unwrap();
        write_topic(temp.path(), "gravity.json", &format!("{}\n", LONG_HOOK));
        let table = ConstraintTable::default();
        let rewrites = RewriteTable::new();

        let outcome = Reconciler::new(&table, &rewrites, temp.path())
            .run(&[record("gravity.json", LONG_HOOK, &["space-before-punct"])]);

        assert_eq!(outcome.fixed(), 1, "{:?}", outcome.entries[0].result);
        let doc = Document::load(temp.path().join("gravity.json")).unwrap();
        assert_eq!(doc.beat_text("Gravity", Role::Hook).unwrap(), FIXED_HOOK);
    }

    #[test]
    fn test_stale_original_is_rejected() {
        let temp = TempDir::new().unwrap();
        write_topic(temp.path(), "gravity.json", "Someone already edited this hook!");
        let table = ConstraintTable::default();
        let mut rewrites = RewriteTable::new();
        rewrites.insert("gravity.json", "Gravity", Role::Hook, FIXED_HOOK);

        let outcome = Reconciler::new(&table, &rewrites, temp.path())
            .run(&[record("gravity.json", LONG_HOOK, &[])]);

        assert_eq!(outcome.failed(), 1);
        assert!(matches!(
            outcome.entries[0].result,
            Err(ReconcileFailure::Stale { .. })
        ));
        assert!(outcome.written.is_empty());
        let doc = Document::load(temp.path().join("gravity.json")).unwrap();
        assert_eq!(
            doc.beat_text("Gravity", Role::Hook).unwrap(),
            "Someone already edited this hook!"
        );
    }

    #[test]
    fn test_failing_proposal_reports_issues() {
        let temp = TempDir::new().unwrap();
        write_topic(temp.path(), "gravity.json", LONG_HOOK);
        let table = ConstraintTable::default();
        let mut rewrites = RewriteTable::new();
        rewrites.insert("gravity.json", "Gravity", Role::Hook, "Still broken, and.");

        let outcome = Reconciler::new(&table, &rewrites, temp.path())
            .run(&[record("gravity.json", LONG_HOOK, &[])]);

        match &outcome.entries[0].result {
            Err(ReconcileFailure::StillFailing(found)) => {
                assert!(found.iter().any(|f| f.starts_with("dangling-conjunction")));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_no_rule() {
        let temp = TempDir::new().unwrap();
        let table = ConstraintTable::default();
        let rewrites = RewriteTable::new();
        let outcome = Reconciler::new(&table, &rewrites, temp.path())
            .run(&[record("gravity.json", LONG_HOOK, &["bad-ending"])]);
        assert_eq!(outcome.entries[0].result, Err(ReconcileFailure::NoRule));
    }

    #[test]
    fn test_dry_run_skips_writes_and_batch_coalesces() {
        let temp = TempDir::new().unwrap();
        write_topic(temp.path(), "gravity.json", LONG_HOOK);
        let before = fs::read_to_string(temp.path().join("gravity.json")).unwrap();
        let table = ConstraintTable::default();
        let mut rewrites = RewriteTable::new();
        rewrites.insert(
            "gravity.json",
            "Gravity",
            Role::Twist,
            "The Moon is falling too; it just keeps missing us.",
        );
        let records = vec![
            record("gravity.json", LONG_HOOK, &["space-before-punct"]),
            DefectRecord {
                beat: Role::Twist,
                original_text: "The Moon is falling too, it just keeps missing us.".to_string(),
                ..record("gravity.json", "", &[])
            },
        ];

        let outcome = Reconciler::new(&table, &rewrites, temp.path())
            .dry_run(true)
            .run(&records);
        assert_eq!(outcome.fixed(), 2);
        assert!(outcome.written.is_empty());
        assert_eq!(
            fs::read_to_string(temp.path().join("gravity.json")).unwrap(),
            before
        );

        let outcome = Reconciler::new(&table, &rewrites, temp.path()).run(&records);
        assert_eq!(outcome.fixed(), 2);
        // both beats land in a single write
        assert_eq!(outcome.written.len(), 1);
    }

    #[test]
    fn test_missing_document_fails_entry() {
        let temp = TempDir::new().unwrap();
        let table = ConstraintTable::default();
        let rewrites = RewriteTable::new();
        let outcome = Reconciler::new(&table, &rewrites, temp.path())
            .run(&[record("nope.json", LONG_HOOK, &["space-before-punct"])]);
        assert!(matches!(
            outcome.entries[0].result,
            Err(ReconcileFailure::Load(_))
        ));
    }

    #[test]
    fn test_rewrite_table_from_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rewrites.json");
        fs::write(
            &path,
            r#"[{"file": "a.json", "topic": "T", "beat": "climax", "text": "New climax."}]"#,
        )
        .unwrap();
        let table = RewriteTable::load(&path).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("a.json", "T", Role::Climax), Some("New climax."));
        assert_eq!(table.get("a.json", "T", Role::Hook), None);
    }
}
