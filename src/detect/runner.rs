//! Detection runner that scans a corpus of story documents.

use rayon::prelude::*;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::contract::{ConstraintTable, Contract};
use crate::store::Document;

use super::{check_document, CheckType, DetectionResult, FileResult, Issue, Locator};

/// Executes all detection checks against a set of files.
pub struct Runner {
    base_dir: PathBuf,
    table: ConstraintTable,
    parallel: bool,
}

impl Runner {
    /// Create a new detection runner. File names in results are reported
    /// relative to `base_dir`.
    pub fn new<P: AsRef<Path>>(base_dir: P, table: ConstraintTable) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            table,
            parallel: true,
        }
    }

    /// Set whether files are scanned on the rayon pool.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn table(&self) -> &ConstraintTable {
        &self.table
    }

    /// Run all checks. Results are sorted by file name regardless of scan order.
    pub fn run(&self, files: &[PathBuf]) -> DetectionResult {
        let scan = |path: &PathBuf| {
            let name = display_name(path, &self.base_dir);
            tracing::debug!(file = %name, "scanning");
            check_file(path, &self.table, &name)
        };

        let mut files: Vec<FileResult> = if self.parallel {
            files.par_iter().map(scan).collect()
        } else {
            files.iter().map(scan).collect()
        };
        files.sort_by(|a, b| a.file.cmp(&b.file));

        let result = DetectionResult { files };
        tracing::info!(
            files = result.scanned(),
            issues = result.total_issues(),
            "detection finished"
        );
        result
    }
}

/// Check one file. Unreadable or malformed documents become a single
/// `bad-json` issue; they never abort the run.
pub fn check_file(path: &Path, table: &ConstraintTable, name: &str) -> FileResult {
    let mut result = FileResult::new(name);
    match Document::load(path) {
        Ok(doc) => result.issues = check_document(doc.root(), table, name),
        Err(e) => {
            tracing::warn!(file = %name, error = %e, "could not load document");
            result.issues.push(Issue::new(
                CheckType::BadJson,
                e.to_string(),
                Locator::file(name),
            ));
        }
    }
    result
}

/// Name a file relative to the scan root, with forward slashes.
fn display_name(path: &Path, base: &Path) -> String {
    if path == base {
        return path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
    }
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Collect the JSON documents under `root`, sorted lexicographically.
pub fn collect_files(root: &Path, contract: &Contract) -> anyhow::Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| {
            // Skip hidden directories and node_modules
            let name = e.file_name().to_string_lossy();
            !(e.depth() > 0
                && e.file_type().is_dir()
                && (name.starts_with('.') || name == "node_modules"))
        })
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if contract.is_path_excluded(path) {
            tracing::debug!(file = %path.display(), "excluded by contract");
            continue;
        }
        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_runner_sorts_and_reports_bad_json() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("b.json"), r#"{"title": "B"}"#).unwrap();
        std::fs::write(temp.path().join("a.json"), "{ not json").unwrap();

        let files = collect_files(temp.path(), &Contract::default()).unwrap();
        let runner = Runner::new(temp.path(), ConstraintTable::default());
        let result = runner.run(&files);

        assert_eq!(result.scanned(), 2);
        assert_eq!(result.files[0].file, "a.json");
        assert_eq!(result.files[0].issues.len(), 1);
        assert_eq!(result.files[0].issues[0].check, CheckType::BadJson);
        assert_eq!(result.files[1].file, "b.json");
        assert_eq!(result.files[1].issues[0].check, CheckType::MissingStory);
        assert!(result.has_high());
    }

    #[test]
    fn test_collect_files_skips_hidden_and_excluded() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(".cache")).unwrap();
        std::fs::create_dir_all(temp.path().join("drafts")).unwrap();
        std::fs::write(temp.path().join(".cache/x.json"), "{}").unwrap();
        std::fs::write(temp.path().join("drafts/y.json"), "{}").unwrap();
        std::fs::write(temp.path().join("notes.txt"), "").unwrap();
        std::fs::write(temp.path().join("z.json"), "{}").unwrap();

        let contract = Contract {
            excluded_paths: vec!["**/drafts/**".to_string()],
            ..Default::default()
        };
        let files = collect_files(temp.path(), &contract).unwrap();
        assert_eq!(files, vec![temp.path().join("z.json")]);
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        let temp = TempDir::new().unwrap();
        for name in ["c.json", "a.json", "b.json"] {
            std::fs::write(temp.path().join(name), r#"{"topics": [{"title": "T"}]}"#).unwrap();
        }
        let files = collect_files(temp.path(), &Contract::default()).unwrap();
        let table = ConstraintTable::default();
        let par = Runner::new(temp.path(), table.clone()).run(&files);
        let seq = Runner::new(temp.path(), table).parallel(false).run(&files);
        let names = |r: &DetectionResult| r.files.iter().map(|f| f.file.clone()).collect::<Vec<_>>();
        assert_eq!(names(&par), names(&seq));
        assert_eq!(names(&par), vec!["a.json", "b.json", "c.json"]);
    }
}
