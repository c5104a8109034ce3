//! User-configurable recognition rules for the documentation tree.
//!
//! A [`PatternConfig`] is an ordered list of named rules. Rules are evaluated
//! strictly in config order with first-match-wins semantics — a name matches
//! at most one rule. Projects may add, remove, or reorder rules in
//! `waypoint.json`; built-in presets cover the common layouts.
//!
//! The effective config is built once at configuration-load time and threaded
//! explicitly through every scan. No component substitutes built-in defaults
//! on its own: a caller that owns a real config must pass it, otherwise
//! discovery silently degrades to zero matches.

mod matcher;
mod presets;

pub use matcher::{MatchOutcome, Matcher};
pub use presets::{list_presets, preset, PresetInfo};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which kind of entity a rule recognizes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityScope {
    Epic,
    Feature,
    Task,
}

impl EntityScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Epic => "epic",
            Self::Feature => "feature",
            Self::Task => "task",
        }
    }
}

/// Whether a rule applies to directory names or file names.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleTarget {
    Folder,
    File,
}

/// One named recognition rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRule {
    /// Stable rule name, reported in match outcomes and diagnostics.
    pub name: String,
    pub scope: EntityScope,
    pub target: RuleTarget,
    /// Regex with named capture groups (`number`, `slug`, `epic_num`, ...).
    pub pattern: String,
    /// Generation format for producing new names under this rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// Ordered rule set driving discovery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternConfig {
    pub rules: Vec<PatternRule>,
}

/// On-disk shape of `waypoint.json`.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    rules: Vec<PatternRule>,
    /// Preset names merged in after the project's own rules.
    #[serde(default)]
    presets: Vec<String>,
}

impl PatternConfig {
    /// The shipped default rule set.
    pub fn standard() -> Self {
        presets::preset("standard").expect("standard preset must exist")
    }

    /// Loads the project configuration from a JSON file.
    ///
    /// Project rules come first (highest priority), then any requested
    /// presets are merged in. Every pattern is compiled here so malformed
    /// rules fail at load time, not per file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let file: ConfigFile = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("invalid config {}: {e}", path.display()))
        })?;

        let mut config = PatternConfig { rules: file.rules };
        for name in &file.presets {
            config.merge(presets::preset(name)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads `waypoint.json` from the given root if present, otherwise the
    /// standard preset. This is the single place a default may be chosen;
    /// the resulting config is passed explicitly from here on.
    pub fn load_or_standard(root: &Path) -> Result<Self> {
        let path = root.join("waypoint.json");
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::standard())
        }
    }

    /// Appends rules from another config, skipping rules whose pattern is
    /// already present for the same scope and target. Base order is preserved.
    pub fn merge(&mut self, other: PatternConfig) {
        for rule in other.rules {
            let duplicate = self.rules.iter().any(|r| {
                r.scope == rule.scope && r.target == rule.target && r.pattern == rule.pattern
            });
            if !duplicate {
                self.rules.push(rule);
            }
        }
    }

    /// Compiles every rule, surfacing the first malformed one as a fatal
    /// configuration error.
    pub fn validate(&self) -> Result<()> {
        Matcher::new(self).map(|_| ())
    }
}
