//! Output formatting for audit results.
//!
//! Supports three output formats:
//! - Markdown: the audit report document written under the reports directory
//! - JSON: the same report for programmatic consumption
//! - Pretty: colored terminal output used by the validation gate

use chrono::{DateTime, NaiveDate, Utc};
use colored::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::detect::{CheckType, DetectionResult, FileResult, Issue, Severity};
use crate::reconcile::DefectRecord;
use crate::store::Document;
use crate::story::Role;

/// Report document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReportFormat {
    #[default]
    Markdown,
    Json,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Markdown => "md",
            ReportFormat::Json => "json",
        }
    }
}

// =============================================================================
// Report assembly
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCount {
    pub severity: Severity,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckCount {
    pub check: CheckType,
    pub count: usize,
}

/// An assembled audit report. All counts are derived once from the issue
/// list at build time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub files_scanned: usize,
    pub total_issues: usize,
    /// High, medium, low; zero counts included.
    pub by_severity: Vec<SeverityCount>,
    /// Count descending, ties by check name.
    pub by_check_type: Vec<CheckCount>,
    pub files: Vec<FileResult>,
}

impl AuditReport {
    pub fn build(generated_at: DateTime<Utc>, result: DetectionResult) -> Self {
        let mut files = result.files;
        files.sort_by(|a, b| a.file.cmp(&b.file));

        let issues: Vec<&Issue> = files.iter().flat_map(|f| f.issues.iter()).collect();

        let by_severity = Severity::ALL
            .iter()
            .map(|&severity| SeverityCount {
                severity,
                count: issues.iter().filter(|i| i.severity() == severity).count(),
            })
            .collect();

        let mut per_check: HashMap<CheckType, usize> = HashMap::new();
        for issue in &issues {
            *per_check.entry(issue.check).or_insert(0) += 1;
        }
        let mut by_check_type: Vec<CheckCount> = per_check
            .into_iter()
            .map(|(check, count)| CheckCount { check, count })
            .collect();
        by_check_type.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.check.as_str().cmp(b.check.as_str()))
        });

        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at,
            files_scanned: files.len(),
            total_issues: issues.len(),
            by_severity,
            by_check_type,
            files,
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.by_severity
            .iter()
            .find(|c| c.severity == severity)
            .map(|c| c.count)
            .unwrap_or(0)
    }

    pub fn has_high(&self) -> bool {
        self.count(Severity::High) > 0
    }

    pub fn render(&self, format: ReportFormat) -> anyhow::Result<String> {
        match format {
            ReportFormat::Markdown => Ok(self.to_markdown()),
            ReportFormat::Json => Ok(serde_json::to_string_pretty(self)? + "\n"),
        }
    }

    // =========================================================================
    // Markdown Format
    // =========================================================================

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Content Audit");
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Generated: {}",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "- Files scanned: {}", self.files_scanned);
        let _ = writeln!(out, "- Total issues: {}", self.total_issues);
        let _ = writeln!(out);

        let _ = writeln!(out, "## Issues by severity");
        let _ = writeln!(out);
        let _ = writeln!(out, "| Severity | Count |");
        let _ = writeln!(out, "|----------|------:|");
        for c in &self.by_severity {
            let _ = writeln!(out, "| {} | {} |", c.severity, c.count);
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "## Issues by check");
        let _ = writeln!(out);
        if self.by_check_type.is_empty() {
            let _ = writeln!(out, "No issues found.");
        } else {
            let _ = writeln!(out, "| Check | Severity | Count |");
            let _ = writeln!(out, "|-------|----------|------:|");
            for c in &self.by_check_type {
                let _ = writeln!(
                    out,
                    "| `{}` | {} | {} |",
                    c.check,
                    c.check.severity(),
                    c.count
                );
            }
        }

        let flagged: Vec<&FileResult> = self.files.iter().filter(|f| !f.issues.is_empty()).collect();
        if !flagged.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "## Files");
            for file in flagged {
                let _ = writeln!(out);
                let _ = writeln!(out, "### {} ({})", file.file, file.issues.len());
                let _ = writeln!(out);
                for issue in &file.issues {
                    let _ = writeln!(
                        out,
                        "- **{}** `{}` {}: {}",
                        issue.severity(),
                        issue.check,
                        issue_location(issue),
                        escape_markdown(&issue.message)
                    );
                }
            }
        }

        let clean = self.files.iter().filter(|f| f.issues.is_empty()).count();
        if clean > 0 {
            let _ = writeln!(out);
            let _ = writeln!(out, "{} file(s) had no issues.", clean);
        }
        out
    }
}

/// Topic and beat part of a locator, or `(document)` for file-level issues.
fn issue_location(issue: &Issue) -> String {
    let loc = &issue.locator;
    let mut parts = Vec::new();
    if let Some(topic) = &loc.topic {
        parts.push(format!("{:?}", topic));
    }
    match (loc.beat, loc.other_beat) {
        (Some(a), Some(b)) => parts.push(format!("{}/{}", a, b)),
        (Some(a), None) => parts.push(a.to_string()),
        _ => {}
    }
    if parts.is_empty() {
        "(document)".to_string()
    } else {
        parts.join(" > ")
    }
}

fn escape_markdown(s: &str) -> String {
    s.replace('\n', "\\n").replace('|', "\\|")
}

// =============================================================================
// Report paths
// =============================================================================

#[derive(Debug, Error)]
pub enum ReportPathError {
    #[error("no free report name: {first} and suffixes -2..-{bound} all exist")]
    Exhausted { first: PathBuf, bound: u32 },
}

/// Pick where a report goes. An explicit path is used as-is. Otherwise the
/// date-stamped default is tried, then `-2` up to `-bound`.
pub fn choose_report_path(
    explicit: Option<&Path>,
    dir: &Path,
    prefix: &str,
    date: NaiveDate,
    format: ReportFormat,
    bound: u32,
) -> Result<PathBuf, ReportPathError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    let stem = format!("{}-{}", prefix, date.format("%Y-%m-%d"));
    let ext = format.extension();
    let first = dir.join(format!("{}.{}", stem, ext));
    if !first.exists() {
        return Ok(first);
    }
    for n in 2..=bound {
        let candidate = dir.join(format!("{}-{}.{}", stem, n, ext));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(ReportPathError::Exhausted { first, bound })
}

/// Write report contents. Generated paths are created exclusively so a
/// concurrent run can never clobber an existing report.
pub fn write_report(path: &Path, contents: &str, overwrite: bool) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| anyhow::anyhow!("creating {}: {}", parent.display(), e))?;
        }
    }
    if overwrite {
        fs::write(path, contents)
            .map_err(|e| anyhow::anyhow!("writing {}: {}", path.display(), e))?;
        return Ok(());
    }
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| anyhow::anyhow!("creating {}: {}", path.display(), e))?;
    file.write_all(contents.as_bytes())
        .map_err(|e| anyhow::anyhow!("writing {}: {}", path.display(), e))?;
    Ok(())
}

// =============================================================================
// Defect extraction
// =============================================================================

/// Turn beat-level issues back into defect records, reading the current beat
/// text from the documents under `root`. Issues without a beat (bad JSON,
/// missing story) are skipped, as are beats that no longer resolve. For a
/// duplicate pair the later beat is the one recorded.
pub fn defect_records(files: &[FileResult], root: &Path) -> Vec<DefectRecord> {
    let mut records = Vec::new();

    for file in files {
        // (topic, role) -> issue ids, in first-seen order
        let mut grouped: BTreeMap<(usize, Role), (String, Vec<String>)> = BTreeMap::new();
        let mut order: Vec<String> = Vec::new();
        for issue in &file.issues {
            let (Some(topic), Some(beat)) = (&issue.locator.topic, issue.locator.beat) else {
                continue;
            };
            let role = issue.locator.other_beat.unwrap_or(beat);
            let idx = match order.iter().position(|t| t == topic) {
                Some(i) => i,
                None => {
                    order.push(topic.clone());
                    order.len() - 1
                }
            };
            let entry = grouped
                .entry((idx, role))
                .or_insert_with(|| (topic.clone(), Vec::new()));
            let id = issue.check.as_str().to_string();
            if !entry.1.contains(&id) {
                entry.1.push(id);
            }
        }
        if grouped.is_empty() {
            continue;
        }

        let doc = match Document::load(root.join(&file.file)) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(file = %file.file, error = %e, "skipping defects for unreadable document");
                continue;
            }
        };
        for ((_, role), (topic, issues)) in grouped {
            match doc.beat_text(&topic, role) {
                Ok(text) => records.push(DefectRecord {
                    file: file.file.clone(),
                    topic_title: topic,
                    beat: role,
                    original_text: text.to_string(),
                    issues,
                }),
                Err(e) => tracing::debug!(file = %file.file, error = %e, "beat not resolvable"),
            }
        }
    }

    records
}

// =============================================================================
// Pretty Format
// =============================================================================

/// Write validation results in pretty (human-readable) format.
pub fn write_pretty(path: &str, contract_path: &str, report: &AuditReport) {
    print!("{}", render_pretty(path, contract_path, report));
}

pub fn render_pretty(path: &str, contract_path: &str, report: &AuditReport) -> String {
    let mut out = String::new();

    // Header
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "  {} v{}",
        "beatcheck".cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "  {}{}", "Scanning: ".dimmed(), path);
    let _ = writeln!(out, "  {}{}", "Contract: ".dimmed(), contract_path);
    let _ = writeln!(out);

    // Failures are the high-severity issues, listed in report order
    let failures: Vec<&Issue> = report
        .files
        .iter()
        .flat_map(|f| f.issues.iter())
        .filter(|i| i.severity() == Severity::High)
        .collect();

    if !failures.is_empty() {
        let _ = writeln!(out, "  {} ({}):", "Failures".bold(), failures.len());
        let _ = writeln!(out);
        for issue in &failures {
            let _ = writeln!(
                out,
                "    {}   {:<24}{}",
                severity_tag(issue.severity()),
                issue.check.as_str().dimmed(),
                issue.locator.to_string().blue()
            );
            let _ = writeln!(out, "            {}", issue.message);
            let _ = writeln!(out);
        }
    }

    // Breakdown
    if !report.by_check_type.is_empty() {
        let _ = writeln!(out, "  {}", "Breakdown:".bold());
        for c in &report.by_check_type {
            let _ = writeln!(
                out,
                "    {:<24} {:>6} {:>5}",
                c.check.as_str(),
                c.check.severity().as_str(),
                c.count
            );
        }
        let _ = writeln!(out);
    }

    // Final status line
    let _ = write!(
        out,
        "  {}",
        format!(
            "{} files, {} issues ({} high, {} medium, {} low)",
            report.files_scanned,
            report.total_issues,
            report.count(Severity::High),
            report.count(Severity::Medium),
            report.count(Severity::Low)
        )
        .dimmed()
    );
    let status = if report.has_high() {
        "FAILED".red()
    } else {
        "PASSED".green()
    };
    let _ = writeln!(out, "  {}", status);
    let _ = writeln!(out);
    out
}

fn severity_tag(severity: Severity) -> ColoredString {
    match severity {
        Severity::High => "HIGH".red(),
        Severity::Medium => "MED ".yellow(),
        Severity::Low => "LOW ".blue(),
    }
}
