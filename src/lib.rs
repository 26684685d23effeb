//! Beatcheck - content integrity engine for six-beat lesson stories.
//!
//! Every lesson topic carries a story of six beats (hook, buildup,
//! discovery, twist, climax, punchline). Beatcheck finds structural and
//! syntactic defects in that text, shortens beats that run over their
//! length limit, and applies curated rewrites back into the stored
//! documents without clobbering concurrent edits.
//!
//! # Architecture
//!
//! - `story`: the topic/story/beat data model
//! - `store`: whole-document load and atomic save
//! - `contract`: YAML contract and the constraint table handed to checks
//! - `detect`: per-beat and cross-beat checks, severity, the scan runner
//! - `shorten`: staged, deterministic length reduction
//! - `reconcile`: optimistic-lock application of rewrites
//! - `report`: audit report assembly and output formats
//!
//! # Adding a Check
//!
//! Add a `CheckType` variant, classify it in the severity map, and call a
//! named predicate from `detect::beat::check_text` (or `detect::cross`).

pub mod cli;
pub mod contract;
pub mod detect;
pub mod reconcile;
pub mod report;
pub mod shorten;
pub mod store;
pub mod story;

pub use contract::{ConstraintTable, Contract, LimitKind, LimitSet};
pub use detect::{CheckType, DetectionResult, Issue, Locator, Runner, Severity};
pub use reconcile::{DefectRecord, ReconcileOutcome, Reconciler, RewriteTable};
pub use report::AuditReport;
pub use shorten::{shorten, shorten_with, Shortened, Stage};
pub use store::Document;
pub use story::{Beat, Role, Story, Topic};
