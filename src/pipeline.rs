//! Transfer pipeline
//!
//! Runs one synchronous pass over the resolved file pairs:
//! - Resolve pairs by base name
//! - Load source and target documents
//! - Extract source values and merge them into the target
//! - Rewrite the target only when a value changed
//!
//! Each pair is finished before the next one starts, so an interrupted
//! run leaves every target either untouched or fully rewritten.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::document::{ConfigDocument, DocumentError};
use crate::merge::{merge, OverrideTable, SourceValues};
use crate::resolve::{resolve_pairs, DirectoryRole, FileFilter, FilePair, PairPlan, ResolveError};
use crate::summary::{PairOutcome, PairStatus, TransferReport};

/// What to do when a single pair fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Record the failure and carry on with the next pair
    #[default]
    Continue,
    /// Stop the run at the first failing pair
    Abort,
}

/// Transfer errors
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("{role} directory does not exist: {}", path.display())]
    MissingDirectory { role: DirectoryRole, path: PathBuf },

    #[error(
        "no matching file pairs between {} and {}",
        source_dir.display(),
        target_dir.display()
    )]
    NoPairsFound {
        source_dir: PathBuf,
        target_dir: PathBuf,
    },

    #[error("error processing {file}: {source}")]
    Pair { file: String, source: DocumentError },

    #[error(transparent)]
    Resolve(ResolveError),
}

impl From<ResolveError> for TransferError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::MissingDirectory { role, path } => {
                TransferError::MissingDirectory { role, path }
            }
            other => TransferError::Resolve(other),
        }
    }
}

impl TransferError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            TransferError::Resolve(_) => 1,
            TransferError::MissingDirectory { .. } => 2,
            TransferError::NoPairsFound { .. } => 3,
            TransferError::Pair { .. } => 4,
        }
    }
}

/// Result type for transfer operations
pub type TransferResult<T> = Result<T, TransferError>;

/// Inputs for a transfer run
#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub on_error: ErrorPolicy,

    /// Merge in memory but never write
    pub dry_run: bool,

    pub filter: FileFilter,
    pub overrides: OverrideTable,
}

impl TransferOptions {
    /// Options with the default filter, built-in overrides and `continue` policy
    pub fn new(source_dir: impl Into<PathBuf>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            target_dir: target_dir.into(),
            on_error: ErrorPolicy::default(),
            dry_run: false,
            filter: FileFilter::default(),
            overrides: OverrideTable::builtin(),
        }
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.on_error = policy;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// A configured transfer between two directories
pub struct Transfer {
    options: TransferOptions,
}

impl Transfer {
    pub fn new(options: TransferOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    /// Resolve file pairs without touching any file contents
    pub fn plan(&self) -> TransferResult<PairPlan> {
        Ok(resolve_pairs(
            &self.options.source_dir,
            &self.options.target_dir,
            &self.options.filter,
        )?)
    }

    /// Process every pair and report the outcome
    pub fn run(&self) -> TransferResult<TransferReport> {
        let started_at = Utc::now();
        let clock = Instant::now();

        info!(
            source_dir = %self.options.source_dir.display(),
            target_dir = %self.options.target_dir.display(),
            dry_run = self.options.dry_run,
            "starting transfer"
        );

        let plan = self.plan()?;
        info!(
            source_files = plan.source_files.len(),
            target_files = plan.target_files.len(),
            pairs = plan.pairs.len(),
            "resolved file pairs"
        );

        if plan.pairs.is_empty() {
            return Err(TransferError::NoPairsFound {
                source_dir: self.options.source_dir.clone(),
                target_dir: self.options.target_dir.clone(),
            });
        }

        let mut outcomes = Vec::with_capacity(plan.pairs.len());
        for pair in &plan.pairs {
            info!(source = %pair.source_name(), file = %pair.target_name(), "processing pair");

            match self.process_pair(pair) {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => match self.options.on_error {
                    ErrorPolicy::Abort => {
                        error!(file = %pair.target_name(), %err, "aborting transfer");
                        return Err(TransferError::Pair {
                            file: pair.target_name(),
                            source: err,
                        });
                    }
                    ErrorPolicy::Continue => {
                        warn!(file = %pair.target_name(), %err, "pair failed");
                        outcomes.push(failed_outcome(pair, &err));
                    }
                },
            }
        }

        let report = TransferReport::from_outcomes(
            started_at,
            clock.elapsed().as_millis() as u64,
            self.options.source_dir.clone(),
            self.options.target_dir.clone(),
            self.options.dry_run,
            plan.source_files.len(),
            plan.target_files.len(),
            outcomes,
        );
        info!("{}", report.human_summary);
        Ok(report)
    }

    fn process_pair(&self, pair: &FilePair) -> Result<PairOutcome, DocumentError> {
        let source = ConfigDocument::load(&pair.source)?;
        let mut target = ConfigDocument::load(&pair.target)?;

        let values = SourceValues::extract(&source);
        let merged = merge(&mut target, &values, &self.options.overrides);

        let status = if !merged.modified() {
            info!(file = %pair.target_name(), "no changes");
            PairStatus::Unchanged
        } else if self.options.dry_run {
            info!(
                file = %pair.target_name(),
                changes = merged.changes.len(),
                "would update"
            );
            PairStatus::WouldUpdate
        } else {
            target.save(&pair.target)?;
            info!(
                file = %pair.target_name(),
                changes = merged.changes.len(),
                bom = target.bom().is_present(),
                "updated"
            );
            PairStatus::Updated
        };

        Ok(PairOutcome {
            source: pair.source.clone(),
            target: pair.target.clone(),
            status,
            bom: Some(target.bom()),
            changes: merged.changes,
            error_kind: None,
            error: None,
        })
    }
}

fn failed_outcome(pair: &FilePair, err: &DocumentError) -> PairOutcome {
    PairOutcome {
        source: pair.source.clone(),
        target: pair.target.clone(),
        status: PairStatus::Failed,
        bom: None,
        changes: Vec::new(),
        error_kind: Some(err.kind().to_string()),
        error: Some(err.to_string()),
    }
}

/// Transfer settings between two directories with default options
pub fn transfer_settings(
    source_dir: &Path,
    target_dir: &Path,
    on_error: ErrorPolicy,
) -> TransferResult<TransferReport> {
    Transfer::new(TransferOptions::new(source_dir, target_dir).with_error_policy(on_error)).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct Dirs {
        _root: TempDir,
        source: PathBuf,
        target: PathBuf,
    }

    fn dirs() -> Dirs {
        let root = TempDir::new().unwrap();
        let source = root.path().join("MVS");
        let target = root.path().join("MVScopy");
        fs::create_dir(&source).unwrap();
        fs::create_dir(&target).unwrap();
        Dirs {
            _root: root,
            source,
            target,
        }
    }

    #[test]
    fn test_missing_source_directory() {
        let d = dirs();
        fs::remove_dir(&d.source).unwrap();
        let err = transfer_settings(&d.source, &d.target, ErrorPolicy::Continue).unwrap_err();
        assert!(matches!(
            err,
            TransferError::MissingDirectory {
                role: DirectoryRole::Source,
                ..
            }
        ));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_no_pairs_found() {
        let d = dirs();
        fs::write(d.source.join("a.xml"), "<R/>").unwrap();
        fs::write(d.target.join("b.xml"), "<R/>").unwrap();
        let err = transfer_settings(&d.source, &d.target, ErrorPolicy::Continue).unwrap_err();
        assert!(matches!(err, TransferError::NoPairsFound { .. }));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_dry_run_never_writes() {
        let d = dirs();
        fs::write(d.source.join("a.xml"), "<R><S><K Value=\"new\"/></S></R>").unwrap();
        let original = "<R><S><K Value=\"old\"/></S></R>";
        fs::write(d.target.join("a.xml"), original).unwrap();

        let options = TransferOptions::new(&d.source, &d.target).with_dry_run(true);
        let report = Transfer::new(options).run().unwrap();

        assert_eq!(report.outcomes[0].status, PairStatus::WouldUpdate);
        assert_eq!(report.outcomes[0].changes.len(), 1);
        assert_eq!(fs::read_to_string(d.target.join("a.xml")).unwrap(), original);
    }

    #[test]
    fn test_continue_policy_records_failure() {
        let d = dirs();
        fs::write(d.source.join("a.xml"), "<R><S><K Value=\"1\"/></S></R>").unwrap();
        fs::write(d.target.join("a.xml"), "<R><S><K Value=\"0\"/></S>").unwrap();
        fs::write(d.source.join("b.xml"), "<R><S><K Value=\"1\"/></S></R>").unwrap();
        fs::write(d.target.join("b.xml"), "<R><S><K Value=\"0\"/></S></R>").unwrap();

        let report = transfer_settings(&d.source, &d.target, ErrorPolicy::Continue).unwrap();
        assert_eq!(report.pairs_found, 2);
        assert_eq!(report.pairs_failed, 1);
        assert_eq!(report.pairs_updated, 1);
        assert_eq!(report.outcomes[0].error_kind.as_deref(), Some("parse"));
        assert!(report.outcomes[0].error.as_deref().unwrap().contains("a.xml"));
    }

    #[test]
    fn test_abort_policy_stops_at_first_failure() {
        let d = dirs();
        fs::write(d.source.join("a.xml"), "<R><S><K Value=\"1\"/></S></R>").unwrap();
        fs::write(d.target.join("a.xml"), b"<R><S><K Value=\"\xFF\"/></S></R>").unwrap();
        fs::write(d.source.join("b.xml"), "<R><S><K Value=\"1\"/></S></R>").unwrap();
        let untouched = "<R><S><K Value=\"0\"/></S></R>";
        fs::write(d.target.join("b.xml"), untouched).unwrap();

        let err = transfer_settings(&d.source, &d.target, ErrorPolicy::Abort).unwrap_err();
        match &err {
            TransferError::Pair { file, source } => {
                assert_eq!(file, "a.xml");
                assert_eq!(source.kind(), "decode");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.exit_code(), 4);
        assert_eq!(fs::read_to_string(d.target.join("b.xml")).unwrap(), untouched);
    }
}
