//! Transfer report
//!
//! The report is what a caller renders after a run: pair and file counts,
//! a per-pair outcome, and a one-line human summary.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;

use crate::document::Bom;
use crate::merge::ValueChange;

/// What happened to one file pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairStatus {
    /// Target rewritten with new values
    Updated,
    /// Target already held every value; left untouched
    Unchanged,
    /// Dry run: target would have been rewritten
    WouldUpdate,
    /// Reading, parsing or writing failed
    Failed,
}

/// Outcome for one source/target pair
#[derive(Debug, Clone, Serialize)]
pub struct PairOutcome {
    pub source: PathBuf,
    pub target: PathBuf,
    pub status: PairStatus,

    /// BOM state of the target file (absent if it could not be read)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bom: Option<Bom>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<ValueChange>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Report for a whole transfer run
#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub dry_run: bool,

    /// Files in the source directory that passed the filter
    pub source_files: usize,

    /// Files in the target directory that passed the filter
    pub target_files: usize,

    pub pairs_found: usize,
    pub pairs_updated: usize,
    pub pairs_unchanged: usize,
    pub pairs_failed: usize,

    pub outcomes: Vec<PairOutcome>,
    pub human_summary: String,
}

impl TransferReport {
    /// Aggregate per-pair outcomes into a report
    #[allow(clippy::too_many_arguments)]
    pub fn from_outcomes(
        started_at: DateTime<Utc>,
        duration_ms: u64,
        source_dir: PathBuf,
        target_dir: PathBuf,
        dry_run: bool,
        source_files: usize,
        target_files: usize,
        outcomes: Vec<PairOutcome>,
    ) -> Self {
        let count = |status: PairStatus| outcomes.iter().filter(|o| o.status == status).count();
        let pairs_updated = count(PairStatus::Updated) + count(PairStatus::WouldUpdate);
        let pairs_unchanged = count(PairStatus::Unchanged);
        let pairs_failed = count(PairStatus::Failed);
        let pairs_found = outcomes.len();

        let human_summary =
            Self::generate_human_summary(dry_run, pairs_found, pairs_updated, pairs_failed);

        Self {
            started_at,
            duration_ms,
            source_dir,
            target_dir,
            dry_run,
            source_files,
            target_files,
            pairs_found,
            pairs_updated,
            pairs_unchanged,
            pairs_failed,
            outcomes,
            human_summary,
        }
    }

    fn generate_human_summary(
        dry_run: bool,
        pairs_found: usize,
        pairs_updated: usize,
        pairs_failed: usize,
    ) -> String {
        let verb = if dry_run { "would update" } else { "updated" };
        if pairs_failed == 0 {
            format!("Transfer complete: {} of {} pair(s) {}", pairs_updated, pairs_found, verb)
        } else {
            format!(
                "Transfer finished with errors: {} of {} pair(s) {}, {} failed",
                pairs_updated, pairs_found, verb, pairs_failed
            )
        }
    }

    pub fn has_failures(&self) -> bool {
        self.pairs_failed > 0
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Multi-line text for terminal output
    pub fn to_human(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.human_summary);
        let _ = writeln!(out);
        let _ = writeln!(out, "Pairs:");
        let _ = writeln!(out, "  found:     {}", self.pairs_found);
        let _ = writeln!(out, "  updated:   {}", self.pairs_updated);
        let _ = writeln!(out, "  unchanged: {}", self.pairs_unchanged);
        let _ = writeln!(out, "  failed:    {}", self.pairs_failed);
        let _ = writeln!(out);
        let _ = writeln!(out, "Files:");
        let _ = writeln!(out, "  source: {}", self.source_files);
        let _ = writeln!(out, "  target: {}", self.target_files);

        for outcome in self.outcomes.iter().filter(|o| o.status == PairStatus::Failed) {
            let _ = writeln!(out);
            let _ = write!(
                out,
                "Error: {}",
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }
        out
    }
}
