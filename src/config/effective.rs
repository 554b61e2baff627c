//! Effective configuration with provenance
//!
//! Layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. Config file (`mvscopy.toml` in the working directory, or `--config`)
//! 3. CLI flags

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;
use crate::document::SettingKey;
use crate::merge::{OverrideRule, OverrideTable};
use crate::pipeline::{ErrorPolicy, TransferOptions};
use crate::resolve::{FileFilter, ResolveError};

/// Config file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "mvscopy.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Pattern(#[from] ResolveError),
}

/// Origin of a configuration layer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Cli,
}

/// A contributing layer
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// An extra pinned value from the config file.
///
/// Exactly one of `tag` (any section) or `key` (`Section/Setting`) is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OverrideEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    pub value: String,
}

impl OverrideEntry {
    fn to_rule(&self) -> Result<OverrideRule, ConfigError> {
        match (&self.tag, &self.key) {
            (Some(tag), None) if !tag.is_empty() => {
                Ok(OverrideRule::for_tag(tag.as_str(), self.value.as_str()))
            }
            (None, Some(key)) => match key.split_once('/') {
                Some((section, setting)) if !section.is_empty() && !setting.is_empty() => Ok(
                    OverrideRule::for_key(SettingKey::new(section, setting), self.value.as_str()),
                ),
                _ => Err(ConfigError::Invalid(format!(
                    "override key '{}' must look like Section/Setting",
                    key
                ))),
            },
            _ => Err(ConfigError::Invalid(
                "each override needs exactly one of 'tag' or 'key'".to_string(),
            )),
        }
    }
}

/// Merged settings for a transfer run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TransferConfig {
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub on_error: ErrorPolicy,
    pub dry_run: bool,
    pub patterns: Vec<String>,
    #[serde(default)]
    pub overrides: Vec<OverrideEntry>,
}

/// Transfer configuration plus the layers it came from
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub config: TransferConfig,
    pub sources: Vec<ConfigSource>,
}

impl EffectiveConfig {
    /// Build the effective config from the optional file and CLI layers.
    ///
    /// An explicit `config_path` must exist; without one, `mvscopy.toml`
    /// in `workdir` is used when present.
    pub fn build(
        workdir: &Path,
        config_path: Option<&Path>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
        }];

        let file = match config_path {
            Some(path) if !path.exists() => return Err(ConfigError::NotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => Some(workdir.join(CONFIG_FILE_NAME)).filter(|p| p.is_file()),
        };
        if let Some(path) = file {
            layers.push(Self::load_toml_file(&path)?);
            sources.push(ConfigSource {
                origin: ConfigOrigin::File,
                path: Some(path),
            });
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
            });
        }

        let config: TransferConfig = serde_json::from_value(merge_layers(layers))
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        Ok(Self { config, sources })
    }

    fn load_toml_file(path: &Path) -> Result<Value, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Turn the config into transfer options, resolving relative
    /// directories against `workdir`
    pub fn to_options(&self, workdir: &Path) -> Result<TransferOptions, ConfigError> {
        let filter = FileFilter::new(self.config.patterns.as_slice())?;
        let extra = self
            .config
            .overrides
            .iter()
            .map(OverrideEntry::to_rule)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TransferOptions {
            source_dir: absolutize(workdir, &self.config.source_dir),
            target_dir: absolutize(workdir, &self.config.target_dir),
            on_error: self.config.on_error,
            dry_run: self.config.dry_run,
            filter,
            overrides: OverrideTable::builtin().with_rules(extra),
        })
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn absolutize(workdir: &Path, dir: &Path) -> PathBuf {
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        workdir.join(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_only() {
        let dir = TempDir::new().unwrap();
        let effective = EffectiveConfig::build(dir.path(), None, None).unwrap();

        assert_eq!(effective.config.source_dir, PathBuf::from("MVS"));
        assert_eq!(effective.config.target_dir, PathBuf::from("MVScopy"));
        assert_eq!(effective.config.on_error, ErrorPolicy::Continue);
        assert_eq!(effective.sources.len(), 1);

        let options = effective.to_options(dir.path()).unwrap();
        assert_eq!(options.source_dir, dir.path().join("MVS"));
        assert_eq!(options.target_dir, dir.path().join("MVScopy"));
        assert_eq!(options.overrides, OverrideTable::builtin());
    }

    #[test]
    fn test_workdir_file_then_cli() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"
source_dir = "Primary"
target_dir = "Secondary"
on_error = "abort"

[[overrides]]
tag = "Opacity"
value = "100"

[[overrides]]
key = "Display/Scale"
value = "2"
"#,
        )
        .unwrap();

        let effective = EffectiveConfig::build(
            dir.path(),
            None,
            Some(json!({"target_dir": "/abs/target", "dry_run": true})),
        )
        .unwrap();

        assert_eq!(effective.config.source_dir, PathBuf::from("Primary"));
        assert_eq!(effective.config.target_dir, PathBuf::from("/abs/target"));
        assert_eq!(effective.config.on_error, ErrorPolicy::Abort);
        assert!(effective.config.dry_run);
        assert_eq!(
            effective
                .sources
                .iter()
                .map(|s| s.origin)
                .collect::<Vec<_>>(),
            vec![ConfigOrigin::Builtin, ConfigOrigin::File, ConfigOrigin::Cli]
        );

        let options = effective.to_options(dir.path()).unwrap();
        assert_eq!(options.source_dir, dir.path().join("Primary"));
        assert_eq!(options.target_dir, PathBuf::from("/abs/target"));
        let rules = options.overrides.rules();
        assert_eq!(rules.len(), 5);
        assert_eq!(rules[3], OverrideRule::for_tag("Opacity", "100"));
        assert_eq!(
            rules[4],
            OverrideRule::for_key(SettingKey::new("Display", "Scale"), "2")
        );
    }

    #[test]
    fn test_explicit_file_must_exist() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("custom.toml");
        let err = EffectiveConfig::build(dir.path(), Some(&missing), None).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "sorce_dir = \"typo\"\n").unwrap();
        let err = EffectiveConfig::build(dir.path(), Some(&path), None).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_bad_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "source_dir = ").unwrap();
        let err = EffectiveConfig::build(dir.path(), Some(&path), None).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_invalid_override_entries() {
        let dir = TempDir::new().unwrap();
        for overrides in [
            json!([{"value": "1"}]),
            json!([{"tag": "A", "key": "S/A", "value": "1"}]),
            json!([{"key": "NoSlash", "value": "1"}]),
        ] {
            let effective =
                EffectiveConfig::build(dir.path(), None, Some(json!({ "overrides": overrides })))
                    .unwrap();
            let err = effective.to_options(dir.path()).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)));
        }
    }

    #[test]
    fn test_invalid_pattern() {
        let dir = TempDir::new().unwrap();
        let effective =
            EffectiveConfig::build(dir.path(), None, Some(json!({"patterns": ["[bad"]}))).unwrap();
        assert!(matches!(
            effective.to_options(dir.path()).unwrap_err(),
            ConfigError::Pattern(_)
        ));
    }
}
