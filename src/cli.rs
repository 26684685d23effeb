//! Command-line interface for beatcheck.

use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::*;
use std::path::{Path, PathBuf};

use crate::contract::{self, Contract, LimitKind};
use crate::detect::{char_len, check_text, collect_files, Locator, Runner, Severity};
use crate::reconcile::{DefectRecord, Reconciler, RewriteTable};
use crate::report::{self, AuditReport, ReportFormat};
use crate::shorten::shorten_with;
use crate::store::Document;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Default contract file names to search for.
const DEFAULT_CONTRACT_NAMES: &[&str] = &["beatcheck.yaml", ".beatcheck.yaml"];

const CONTRACT_TEMPLATE: &str = include_str!("templates/beatcheck.yaml");

/// Content integrity gate for six-beat lesson stories.
///
/// Beatcheck audits story documents for structural and syntactic defects,
/// gates builds on high-severity issues, shortens over-long beats and
/// applies curated rewrites under an optimistic lock.
#[derive(Parser)]
#[command(name = "beatcheck")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to contract YAML file (default: auto-discover, else built-in defaults)
    #[arg(short, long, global = true)]
    pub contract: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan documents and write an audit report
    Audit(AuditArgs),
    /// Fail when any high-severity issue exists
    #[command(visible_alias = "check")]
    Validate(ValidateArgs),
    /// Shorten beats that exceed their length limit
    Shorten(ShortenArgs),
    /// Apply curated rewrites to flagged beats
    Reconcile(ReconcileArgs),
    /// Create a beatcheck contract with the default settings
    Init(InitArgs),
}

/// Arguments for the audit command.
#[derive(Parser)]
pub struct AuditArgs {
    /// Path to scan (file or directory)
    pub path: PathBuf,

    /// Write the report here instead of the dated default
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Markdown)]
    pub format: ReportFormat,

    /// Also write defect records for the reconcile command
    #[arg(long)]
    pub emit_defects: Option<PathBuf>,
}

/// Terminal output formats for the validate command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Json,
}

/// Arguments for the validate command.
#[derive(Parser)]
pub struct ValidateArgs {
    /// Path to check (file or directory)
    pub path: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Pretty)]
    pub format: OutputFormat,
}

/// Arguments for the shorten command.
#[derive(Parser)]
pub struct ShortenArgs {
    /// Path to process (file or directory)
    pub path: PathBuf,

    /// Limit set to shorten to: generation or tolerance
    #[arg(short, long, default_value = "generation")]
    pub target: LimitKind,

    /// Validate and report without writing
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the reconcile command.
#[derive(Parser)]
pub struct ReconcileArgs {
    /// Defect records (JSON) produced by `audit --emit-defects`
    #[arg(long)]
    pub defects: PathBuf,

    /// Curated rewrites (JSON array of {file, topic, beat, text})
    #[arg(long)]
    pub rewrites: Option<PathBuf>,

    /// Directory that record file names are relative to
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Validate every entry but write nothing
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the init command.
#[derive(Parser)]
pub struct InitArgs {
    /// Output file path
    #[arg(short, long, default_value = "beatcheck.yaml")]
    pub output: PathBuf,
}

/// Discover a contract file in the current directory.
fn discover_contract() -> Option<PathBuf> {
    DEFAULT_CONTRACT_NAMES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

/// Load and validate the contract. Returns the contract and a label for
/// output headers.
fn load_contract(explicit: Option<&Path>) -> anyhow::Result<(Contract, String)> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => discover_contract(),
    };

    let Some(path) = path else {
        tracing::debug!("no contract file found, using defaults");
        return Ok((Contract::default(), "(defaults)".to_string()));
    };

    let contract = Contract::parse_file(&path)
        .map_err(|e| anyhow::anyhow!("parsing contract {}: {}", path.display(), e))?;
    contract::validate(&contract)
        .map_err(|e| anyhow::anyhow!("invalid contract {}: {}", path.display(), e))?;
    tracing::info!(contract = %path.display(), "loaded contract");
    Ok((contract, path.to_string_lossy().to_string()))
}

/// Directory that result file names are made relative to.
fn scan_base(path: &Path) -> PathBuf {
    if path.is_file() {
        path.parent().map(Path::to_path_buf).unwrap_or_default()
    } else {
        path.to_path_buf()
    }
}

/// Contract and file list shared by the scanning commands.
fn prepare_scan(
    contract_path: Option<&Path>,
    path: &Path,
) -> Result<(Contract, String, Vec<PathBuf>), i32> {
    let (contract, label) = match load_contract(contract_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Err(EXIT_ERROR);
        }
    };

    if !path.exists() {
        eprintln!("Error: cannot access path {:?}", path);
        return Err(EXIT_ERROR);
    }

    let files = match collect_files(path, &contract) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Err(EXIT_ERROR);
        }
    };

    Ok((contract, label, files))
}

/// Run the audit command.
pub fn run_audit(cli: &Cli, args: &AuditArgs) -> anyhow::Result<i32> {
    let (contract, _, files) = match prepare_scan(cli.contract.as_deref(), &args.path) {
        Ok(v) => v,
        Err(code) => return Ok(code),
    };
    if files.is_empty() {
        eprintln!("Warning: no files to scan");
    }

    let base = scan_base(&args.path);
    let result = Runner::new(&base, contract.constraints()).run(&files);
    let now = Utc::now();
    let report = AuditReport::build(now, result);

    let out_path = match report::choose_report_path(
        args.output.as_deref(),
        Path::new(&contract.reports.dir),
        &contract.reports.prefix,
        now.date_naive(),
        args.format,
        contract.reports.max_suffix,
    ) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let contents = report.render(args.format)?;
    if let Err(e) = report::write_report(&out_path, &contents, args.output.is_some()) {
        eprintln!("Error: {}", e);
        return Ok(EXIT_ERROR);
    }

    println!("Report written to {}", out_path.display());
    println!(
        "{} files, {} issues ({} high, {} medium, {} low)",
        report.files_scanned,
        report.total_issues,
        report.count(Severity::High),
        report.count(Severity::Medium),
        report.count(Severity::Low)
    );

    if let Some(defects_path) = &args.emit_defects {
        let records = report::defect_records(&report.files, &base);
        let json = serde_json::to_string_pretty(&records)?;
        if let Err(e) = report::write_report(defects_path, &(json + "\n"), true) {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
        println!(
            "{} defect records written to {}",
            records.len(),
            defects_path.display()
        );
    }

    Ok(EXIT_SUCCESS)
}

/// Run the validate command.
pub fn run_validate(cli: &Cli, args: &ValidateArgs) -> anyhow::Result<i32> {
    let (contract, label, files) = match prepare_scan(cli.contract.as_deref(), &args.path) {
        Ok(v) => v,
        Err(code) => return Ok(code),
    };
    if files.is_empty() {
        eprintln!("Warning: no files to scan");
        return Ok(EXIT_SUCCESS);
    }

    let result = Runner::new(scan_base(&args.path), contract.constraints()).run(&files);
    let report = AuditReport::build(Utc::now(), result);

    match args.format {
        OutputFormat::Json => print!("{}", report.render(ReportFormat::Json)?),
        OutputFormat::Pretty => {
            report::write_pretty(&args.path.to_string_lossy(), &label, &report)
        }
    }

    if report.has_high() {
        Ok(EXIT_FAILED)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

/// Tally for the shorten command.
#[derive(Debug, Default)]
struct ShortenTally {
    shortened: usize,
    failed: usize,
}

/// Run the shorten command.
pub fn run_shorten(cli: &Cli, args: &ShortenArgs) -> anyhow::Result<i32> {
    let (contract, _, files) = match prepare_scan(cli.contract.as_deref(), &args.path) {
        Ok(v) => v,
        Err(code) => return Ok(code),
    };
    let table = contract.constraints();
    let limits = *table.limits(args.target);
    let base = scan_base(&args.path);
    let mut tally = ShortenTally::default();

    for path in &files {
        let name = path
            .strip_prefix(&base)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        let mut doc = match Document::load(path) {
            Ok(d) => d,
            Err(e) => {
                println!("  {} {}", "✗".red(), e);
                tally.failed += 1;
                continue;
            }
        };

        let mut changed = 0;
        for (index, topic) in doc.topics().into_iter().enumerate() {
            let Some(story) = &topic.story else {
                continue;
            };
            for (role, beat) in story.slots() {
                let Some(beat) = beat else {
                    continue;
                };
                let max = limits.max_for(role);
                let locator = Locator::file(name.as_str())
                    .with_topic(topic.title.clone())
                    .with_beat(role);
                if char_len(beat.text.trim()) <= max {
                    continue;
                }

                let shortened = shorten_with(&beat.text, max, &table);
                if !shortened.fits(max) {
                    println!(
                        "  {} {}: still {} chars after {} (max {})",
                        "✗".red(),
                        locator,
                        char_len(&shortened.text),
                        shortened.stage,
                        max
                    );
                    tally.failed += 1;
                    continue;
                }

                let remaining = check_text(
                    role,
                    &shortened.text,
                    &topic.title,
                    &table,
                    &Locator::file(name.as_str()).with_topic(topic.title.clone()),
                );
                if !remaining.is_empty() {
                    let ids: Vec<&str> = remaining.iter().map(|i| i.check.as_str()).collect();
                    println!(
                        "  {} {}: result fails {}",
                        "✗".red(),
                        locator,
                        ids.join(", ")
                    );
                    tally.failed += 1;
                    continue;
                }

                doc.set_beat_text_at(index, role, &shortened.text)?;
                tracing::info!(%locator, stage = %shortened.stage, "shortened");
                println!(
                    "  {} {} ({}): {}",
                    "✓".green(),
                    locator,
                    shortened.stage,
                    shortened.text
                );
                changed += 1;
            }
        }

        if changed == 0 {
            continue;
        }
        if args.dry_run {
            tally.shortened += changed;
            continue;
        }
        match doc.save() {
            Ok(()) => tally.shortened += changed,
            Err(e) => {
                println!("  {} {}", "✗".red(), e);
                tally.failed += changed;
            }
        }
    }

    println!();
    println!(
        "Shortened: {}  Failed: {}{}",
        tally.shortened,
        tally.failed,
        if args.dry_run { "  (dry run, nothing written)" } else { "" }
    );

    if tally.failed > 0 {
        Ok(EXIT_FAILED)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

/// Run the reconcile command.
pub fn run_reconcile(cli: &Cli, args: &ReconcileArgs) -> anyhow::Result<i32> {
    let (contract, _) = match load_contract(cli.contract.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let records = match DefectRecord::load_all(&args.defects) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };
    let rewrites = match &args.rewrites {
        Some(path) => match RewriteTable::load(path) {
            Ok(t) => t,
            Err(e) => {
                eprintln!("Error: {}", e);
                return Ok(EXIT_ERROR);
            }
        },
        None => RewriteTable::new(),
    };

    let table = contract.constraints();
    let outcome = Reconciler::new(&table, &rewrites, &args.root)
        .dry_run(args.dry_run)
        .run(&records);

    for entry in &outcome.entries {
        match &entry.result {
            Ok(text) => println!("  {} {} -> {:?}", "✓".green(), entry.locator, text),
            Err(e) => println!("  {} {}: {}", "✗".red(), entry.locator, e),
        }
    }

    println!();
    println!(
        "Fixed: {}  Failed: {}  Total: {}{}",
        outcome.fixed(),
        outcome.failed(),
        outcome.total(),
        if outcome.dry_run { "  (dry run, nothing written)" } else { "" }
    );

    if outcome.succeeded() {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_FAILED)
    }
}

/// Run the init command.
pub fn run_init(args: &InitArgs) -> anyhow::Result<i32> {
    // Check if output already exists
    if args.output.exists() {
        eprintln!("Error: file already exists: {}", args.output.display());
        eprintln!("Remove it or use --output to specify a different path");
        return Ok(EXIT_ERROR);
    }

    // Create output directory if needed
    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() && parent != Path::new(".") {
            if let Err(e) = std::fs::create_dir_all(parent) {
                eprintln!("Error: failed to create directory: {}", e);
                return Ok(EXIT_ERROR);
            }
        }
    }

    if let Err(e) = std::fs::write(&args.output, CONTRACT_TEMPLATE) {
        eprintln!("Error: failed to write contract: {}", e);
        return Ok(EXIT_ERROR);
    }

    println!("Created {}", args.output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit {} to adjust limits and report settings", args.output.display());
    println!("  2. Run: beatcheck validate content/ --contract {}", args.output.display());

    Ok(EXIT_SUCCESS)
}
