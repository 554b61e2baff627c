//! Pinned setting values
//!
//! Some settings are forced to fixed values no matter what the source
//! configuration says. Rules are checked in order before the source
//! lookup; the first matching rule wins.

use crate::document::{Setting, SettingKey};

/// Settings that are always pinned, in priority order
pub const BUILTIN_OVERRIDES: &[(&str, &str)] = &[
    ("ClusterStyleColor", "Color_AmountDelta"),
    ("RulerDataType", "3"),
    ("ShowProfitType", "4"),
];

/// Which settings a rule applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingMatcher {
    /// Any setting with this tag, in any section
    Tag(String),
    /// Only the setting at `section/setting`
    Key(SettingKey),
}

impl SettingMatcher {
    pub fn matches(&self, setting: &Setting) -> bool {
        match self {
            SettingMatcher::Tag(tag) => setting.tag() == tag,
            SettingMatcher::Key(key) => {
                setting.section() == key.section && setting.tag() == key.setting
            }
        }
    }
}

/// A single pinned value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideRule {
    pub matcher: SettingMatcher,
    pub value: String,
}

impl OverrideRule {
    pub fn for_tag(tag: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            matcher: SettingMatcher::Tag(tag.into()),
            value: value.into(),
        }
    }

    pub fn for_key(key: SettingKey, value: impl Into<String>) -> Self {
        Self {
            matcher: SettingMatcher::Key(key),
            value: value.into(),
        }
    }
}

/// Ordered override rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideTable {
    rules: Vec<OverrideRule>,
}

impl Default for OverrideTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl OverrideTable {
    /// Table holding only the built-in pins
    pub fn builtin() -> Self {
        Self {
            rules: BUILTIN_OVERRIDES
                .iter()
                .map(|(tag, value)| OverrideRule::for_tag(*tag, *value))
                .collect(),
        }
    }

    /// Table with no rules at all
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append rules after the existing ones
    pub fn with_rules(mut self, rules: impl IntoIterator<Item = OverrideRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn rules(&self) -> &[OverrideRule] {
        &self.rules
    }

    /// Value forced by the first matching rule
    pub fn lookup(&self, setting: &Setting) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(setting))
            .map(|rule| rule.value.as_str())
    }
}
