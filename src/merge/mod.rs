//! Setting value transfer
//!
//! Values are read from a source document into a flat map keyed by
//! `section/setting`, then written onto the matching settings of a
//! target document. Pinned values from the override table take priority
//! over anything in the source.

mod overrides;

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::document::{ConfigDocument, SettingKey};

pub use overrides::{OverrideRule, OverrideTable, SettingMatcher, BUILTIN_OVERRIDES};

/// `Value` attributes of a source document, keyed by setting identity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceValues {
    values: HashMap<SettingKey, String>,
}

impl SourceValues {
    /// Collect every setting `Value`; a repeated key keeps its last value
    pub fn extract(doc: &ConfigDocument) -> Self {
        let mut values = HashMap::new();
        for setting in doc.settings() {
            if let Some(value) = setting.value() {
                values.insert(setting.key(), value.to_string());
            }
        }
        Self { values }
    }

    pub fn get(&self, key: &SettingKey) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Where a new value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOrigin {
    Override,
    Source,
}

/// One setting whose value was replaced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueChange {
    pub key: SettingKey,
    pub previous: String,
    pub value: String,
    pub origin: ChangeOrigin,
}

/// Result of merging into one target document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub changes: Vec<ValueChange>,
}

impl MergeOutcome {
    /// Whether any value differs from what the target held before
    pub fn modified(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// Write source and pinned values onto the target's existing settings.
///
/// Settings without a `Value` attribute are skipped. No element is added
/// or removed; identical values do not count as changes.
pub fn merge(
    target: &mut ConfigDocument,
    source: &SourceValues,
    overrides: &OverrideTable,
) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();

    for index in 0..target.settings().len() {
        let setting = &target.settings()[index];
        if setting.value().is_none() {
            continue;
        }
        let key = setting.key();

        let (value, origin) = match overrides.lookup(setting) {
            Some(pinned) => (pinned.to_string(), ChangeOrigin::Override),
            None => match source.get(&key) {
                Some(value) => (value.to_string(), ChangeOrigin::Source),
                None => continue,
            },
        };

        if let Some(previous) = target.set_value(index, &value) {
            debug!(%key, %previous, %value, ?origin, "value changed");
            outcome.changes.push(ValueChange {
                key,
                previous,
                value,
                origin,
            });
        }
    }

    outcome
}
