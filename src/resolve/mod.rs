//! Source/target file pairing
//!
//! Configuration files in the two directories are matched by base name
//! (file name without its final extension). Only files whose names match
//! the filter patterns take part.

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::Serialize;
use thiserror::Error;
use walkdir::WalkDir;

/// Default file name patterns, matched case-insensitively
pub const DEFAULT_PATTERNS: &[&str] = &["*.tmp", "*.xml"];

/// Which side of the transfer a directory belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryRole {
    Source,
    Target,
}

impl fmt::Display for DirectoryRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectoryRole::Source => write!(f, "source"),
            DirectoryRole::Target => write!(f, "target"),
        }
    }
}

/// Pairing errors
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{role} directory does not exist: {}", path.display())]
    MissingDirectory { role: DirectoryRole, path: PathBuf },

    #[error("failed to list {}: {source}", path.display())]
    Listing {
        path: PathBuf,
        source: walkdir::Error,
    },

    #[error("invalid file pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: globset::Error,
    },
}

/// File name filter
#[derive(Debug, Clone)]
pub struct FileFilter {
    patterns: Vec<String>,
    set: GlobSet,
}

impl FileFilter {
    /// Compile case-insensitive glob patterns matched against file names
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ResolveError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = GlobBuilder::new(pattern)
                .case_insensitive(true)
                .literal_separator(true)
                .build()
                .map_err(|source| ResolveError::Pattern {
                    pattern: pattern.to_string(),
                    source,
                })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|source| ResolveError::Pattern {
            pattern: patterns
                .iter()
                .map(|p| p.as_ref())
                .collect::<Vec<_>>()
                .join(","),
            source,
        })?;

        Ok(Self {
            patterns: patterns.iter().map(|p| p.as_ref().to_string()).collect(),
            set,
        })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn matches(&self, file_name: &OsStr) -> bool {
        self.set.is_match(Path::new(file_name))
    }
}

impl Default for FileFilter {
    fn default() -> Self {
        // The built-in patterns are valid globs
        Self::new(DEFAULT_PATTERNS).unwrap_or_else(|_| Self {
            patterns: Vec::new(),
            set: GlobSet::empty(),
        })
    }
}

/// A source file and the target file sharing its base name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilePair {
    pub source: PathBuf,
    pub target: PathBuf,
}

impl FilePair {
    /// Target file name, used to label the pair in reports
    pub fn target_name(&self) -> String {
        file_name_lossy(&self.target)
    }

    pub fn source_name(&self) -> String {
        file_name_lossy(&self.source)
    }
}

/// Everything the resolver found
#[derive(Debug, Clone, Default, Serialize)]
pub struct PairPlan {
    /// Matching files in the source directory, in listing order
    pub source_files: Vec<PathBuf>,
    /// Matching files in the target directory, in listing order
    pub target_files: Vec<PathBuf>,
    /// Pairs in target listing order
    pub pairs: Vec<FilePair>,
}

/// Base name used for pairing: the file name minus its final extension
pub fn base_name(path: &Path) -> Option<&OsStr> {
    path.file_stem()
}

/// List the filtered files of both directories and pair them by base name
pub fn resolve_pairs(
    source_dir: &Path,
    target_dir: &Path,
    filter: &FileFilter,
) -> Result<PairPlan, ResolveError> {
    ensure_directory(source_dir, DirectoryRole::Source)?;
    ensure_directory(target_dir, DirectoryRole::Target)?;

    let source_files = list_files(source_dir, filter)?;
    let target_files = list_files(target_dir, filter)?;

    let mut by_base: HashMap<OsString, &PathBuf> = HashMap::new();
    for source in &source_files {
        if let Some(base) = base_name(source) {
            by_base.entry(base.to_os_string()).or_insert(source);
        }
    }

    let pairs = target_files
        .iter()
        .filter_map(|target| {
            let source = by_base.get(base_name(target)?)?;
            Some(FilePair {
                source: (*source).clone(),
                target: target.clone(),
            })
        })
        .collect();

    Ok(PairPlan {
        source_files,
        target_files,
        pairs,
    })
}

fn ensure_directory(path: &Path, role: DirectoryRole) -> Result<(), ResolveError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(ResolveError::MissingDirectory {
            role,
            path: path.to_path_buf(),
        })
    }
}

fn list_files(dir: &Path, filter: &FileFilter) -> Result<Vec<PathBuf>, ResolveError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
    {
        let entry = entry.map_err(|source| ResolveError::Listing {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() && filter.matches(entry.file_name()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn file_name_lossy(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
