//! Built-in defaults (lowest configuration layer)

use serde::Serialize;
use serde_json::Value;

use crate::resolve::DEFAULT_PATTERNS;

/// Conventional source directory, relative to the working directory
pub const DEFAULT_SOURCE_DIR: &str = "MVS";

/// Conventional target directory, relative to the working directory
pub const DEFAULT_TARGET_DIR: &str = "MVScopy";

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize)]
pub struct BuiltinDefaults {
    pub source_dir: String,
    pub target_dir: String,
    /// Per-pair error policy (default: "continue")
    pub on_error: String,
    pub dry_run: bool,
    pub patterns: Vec<String>,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            source_dir: DEFAULT_SOURCE_DIR.to_string(),
            target_dir: DEFAULT_TARGET_DIR.to_string(),
            on_error: "continue".to_string(),
            dry_run: false,
            patterns: DEFAULT_PATTERNS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to a JSON value for layering
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "source_dir": self.source_dir,
            "target_dir": self.target_dir,
            "on_error": self.on_error,
            "dry_run": self.dry_run,
            "patterns": self.patterns,
            "overrides": [],
        })
    }
}
