//! Layered configuration
//!
//! Built-in defaults, then an optional TOML file, then CLI flags.

mod defaults;
mod effective;
mod merge;

pub use defaults::{BuiltinDefaults, DEFAULT_SOURCE_DIR, DEFAULT_TARGET_DIR};
pub use effective::{
    ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig, OverrideEntry, TransferConfig,
    CONFIG_FILE_NAME,
};
pub use merge::{merge_into, merge_layers};
