//! Archive configuration: sources, outputs, rules and the default window.
//!
//! The core only validates and interprets this data; locating and reading
//! the file is the caller's job.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, ArchiveResult};
use crate::identity::IDENTITY_SEPARATOR;
use crate::rules::AutoHideRule;
use crate::window::{DEFAULT_FUTURE_DAYS, DEFAULT_PAST_DAYS, TimeWindow};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Source id → source
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
    #[serde(default)]
    pub outputs: Vec<OutputConfig>,
    #[serde(default)]
    pub rules: Vec<AutoHideRule>,
    #[serde(default)]
    pub window: WindowConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Feed location, as understood by the fetching layer
    pub path: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_interval_minutes: Option<u64>,
}

/// A named, filtered view over the accumulated store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub name: String,
    /// Published as X-WR-CALDESC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Empty means every source
    #[serde(default)]
    pub include_sources: BTreeSet<String>,
    /// Allow-list; empty means no restriction
    #[serde(default)]
    pub filter_by_category: Vec<String>,
    #[serde(default)]
    pub exclude_category: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_summary_regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_summary_regex: Option<String>,
    #[serde(default)]
    pub rule_ids: Vec<String>,
}

impl OutputConfig {
    pub fn new(name: impl Into<String>) -> Self {
        OutputConfig {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// How far around "now" outputs are expanded, e.g. `past = "90days"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(with = "humantime_duration", default = "default_past")]
    pub past: StdDuration,
    #[serde(with = "humantime_duration", default = "default_future")]
    pub future: StdDuration,
}

fn default_past() -> StdDuration {
    StdDuration::from_secs(DEFAULT_PAST_DAYS as u64 * 86_400)
}

fn default_future() -> StdDuration {
    StdDuration::from_secs(DEFAULT_FUTURE_DAYS as u64 * 86_400)
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            past: default_past(),
            future: default_future(),
        }
    }
}

impl WindowConfig {
    pub fn window_at(&self, now: DateTime<Utc>) -> ArchiveResult<TimeWindow> {
        let to_chrono = |d: StdDuration| {
            chrono::Duration::from_std(d)
                .map_err(|e| ArchiveError::Config(format!("Window duration out of range: {e}")))
        };
        TimeWindow::around(now, to_chrono(self.past)?, to_chrono(self.future)?)
    }
}

mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

impl ArchiveConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> ArchiveResult<Self> {
        let config: ArchiveConfig =
            toml::from_str(content).map_err(|e| ArchiveError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-references: unique output names and rule ids, source ids
    /// without the identity separator, and every output rule id defined.
    pub fn validate(&self) -> ArchiveResult<()> {
        for source_id in self.sources.keys() {
            if source_id.is_empty() || source_id.contains(IDENTITY_SEPARATOR) {
                return Err(ArchiveError::Config(format!(
                    "Invalid source id '{}': must be non-empty and not contain '{}'",
                    source_id, IDENTITY_SEPARATOR
                )));
            }
        }

        let mut rule_ids = BTreeSet::new();
        for rule in &self.rules {
            if !rule_ids.insert(rule.rule_id.as_str()) {
                return Err(ArchiveError::Config(format!(
                    "Duplicate rule id '{}'",
                    rule.rule_id
                )));
            }
        }

        let mut names = BTreeSet::new();
        for output in &self.outputs {
            if output.name.is_empty() {
                return Err(ArchiveError::Config("Output with empty name".into()));
            }
            if !names.insert(output.name.as_str()) {
                return Err(ArchiveError::Config(format!(
                    "Duplicate output name '{}'",
                    output.name
                )));
            }
            if let Some(missing) = output.rule_ids.iter().find(|id| !rule_ids.contains(id.as_str())) {
                return Err(ArchiveError::UnknownRule(missing.clone()));
            }
        }

        Ok(())
    }

    pub fn output(&self, name: &str) -> ArchiveResult<&OutputConfig> {
        self.outputs
            .iter()
            .find(|o| o.name == name)
            .ok_or_else(|| ArchiveError::UnknownOutput(name.to_string()))
    }

    /// The rules an output references, in the output's order.
    pub fn rules_for(&self, output: &OutputConfig) -> ArchiveResult<Vec<AutoHideRule>> {
        resolve_rules(&self.rules, &output.rule_ids)
    }

    pub fn enabled_sources(&self) -> impl Iterator<Item = (&str, &SourceConfig)> {
        self.sources
            .iter()
            .filter(|(_, s)| s.enabled)
            .map(|(id, s)| (id.as_str(), s))
    }
}

/// Look up `rule_ids` in `rules`, failing on the first unknown id.
pub fn resolve_rules(rules: &[AutoHideRule], rule_ids: &[String]) -> ArchiveResult<Vec<AutoHideRule>> {
    rule_ids
        .iter()
        .map(|id| {
            rules
                .iter()
                .find(|r| &r.rule_id == id)
                .cloned()
                .ok_or_else(|| ArchiveError::UnknownRule(id.clone()))
        })
        .collect()
}
