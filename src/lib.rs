//! MVS settings transfer
//!
//! Copies setting values from a source set of XML/TMP configuration files
//! into a matching target set. Files are paired by base name, a few
//! settings are pinned to fixed values, and each changed target is
//! rewritten with its own BOM state and CRLF line endings.

pub mod config;
pub mod document;
pub mod merge;
pub mod pipeline;
pub mod resolve;
pub mod summary;

pub use config::{ConfigError, EffectiveConfig, TransferConfig};
pub use document::{Bom, ConfigDocument, DocumentError, Setting, SettingKey};
pub use merge::{merge, MergeOutcome, OverrideRule, OverrideTable, SourceValues, ValueChange};
pub use pipeline::{transfer_settings, ErrorPolicy, Transfer, TransferError, TransferOptions};
pub use resolve::{resolve_pairs, FileFilter, FilePair, PairPlan};
pub use summary::{PairOutcome, PairStatus, TransferReport};
