//! Auto-hide rules and the per-instance visibility decision.
//!
//! Evaluation order per instance:
//! 1. a manual hide mark (absolute)
//! 2. category and pattern rules, in rule order
//! 3. overlap rules, which need the full instance set

mod matcher;
mod overlap;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ArchiveError;
use crate::event::EventInstance;
use crate::hidden::HiddenMarks;
use crate::identity::Identity;

pub use matcher::{Matcher, compile_pattern};
pub(crate) use matcher::{TextPattern, trimmed_categories};
use matcher::CompiledMatcher;
use overlap::OverlapSweep;

fn default_enabled() -> bool {
    true
}

fn is_true(b: &bool) -> bool {
    *b
}

/// A declarative hide rule, referenced from outputs by `rule_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoHideRule {
    pub rule_id: String,
    #[serde(default = "default_enabled", skip_serializing_if = "is_true")]
    pub enabled: bool,
    #[serde(flatten)]
    pub kind: RuleKind,
}

impl AutoHideRule {
    pub fn new(rule_id: impl Into<String>, kind: RuleKind) -> Self {
        AutoHideRule {
            rule_id: rule_id.into(),
            enabled: true,
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleKind {
    /// Hide instances carrying any of these categories
    CategoryExclude { categories: Vec<String> },
    /// Hide instances whose summary matches
    SummaryPattern { pattern: String },
    /// Hide instances whose description matches
    DescriptionPattern { pattern: String },
    /// Hide `target` instances that overlap a `trigger` instance
    Overlap { trigger: Matcher, target: Matcher },
}

impl RuleKind {
    pub fn name(&self) -> &'static str {
        match self {
            RuleKind::CategoryExclude { .. } => "category_exclude",
            RuleKind::SummaryPattern { .. } => "summary_pattern",
            RuleKind::DescriptionPattern { .. } => "description_pattern",
            RuleKind::Overlap { .. } => "overlap",
        }
    }
}

/// A rule ready for evaluation. Patterns that failed to compile match nothing.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    rule_id: String,
    kind: CompiledKind,
}

#[derive(Debug, Clone)]
enum CompiledKind {
    Categories(Vec<String>),
    Summary(TextPattern),
    Description(TextPattern),
    Overlap {
        trigger: CompiledMatcher,
        target: CompiledMatcher,
    },
}

impl CompiledRule {
    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    /// Per-instance rules only; overlap rules are handled by the sweep.
    fn hides(&self, instance: &EventInstance) -> bool {
        match &self.kind {
            CompiledKind::Categories(categories) => instance.has_category_in(categories),
            CompiledKind::Summary(pattern) => pattern.is_match(&instance.summary),
            CompiledKind::Description(pattern) => {
                pattern.is_match(instance.description.as_deref().unwrap_or(""))
            }
            CompiledKind::Overlap { .. } => false,
        }
    }
}

/// Compile the enabled rules. Invalid patterns come back as diagnostics;
/// the rule stays in the list and matches nothing.
pub fn compile_rules<'a>(
    rules: impl IntoIterator<Item = &'a AutoHideRule>,
) -> (Vec<CompiledRule>, Vec<ArchiveError>) {
    let mut diagnostics = Vec::new();
    let compiled = rules
        .into_iter()
        .filter(|rule| rule.enabled)
        .map(|rule| {
            let owner = rule.rule_id.as_str();
            let kind = match &rule.kind {
                RuleKind::CategoryExclude { categories } => {
                    CompiledKind::Categories(trimmed_categories(categories))
                }
                RuleKind::SummaryPattern { pattern } => {
                    CompiledKind::Summary(TextPattern::compile(owner, pattern, &mut diagnostics))
                }
                RuleKind::DescriptionPattern { pattern } => CompiledKind::Description(
                    TextPattern::compile(owner, pattern, &mut diagnostics),
                ),
                RuleKind::Overlap { trigger, target } => CompiledKind::Overlap {
                    trigger: trigger.compile(owner, &mut diagnostics),
                    target: target.compile(owner, &mut diagnostics),
                },
            };
            CompiledRule {
                rule_id: rule.rule_id.clone(),
                kind,
            }
        })
        .collect();
    (compiled, diagnostics)
}

/// Why an instance is or is not published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum Decision {
    Visible,
    HiddenManually,
    HiddenByRule { rule_id: String },
    HiddenByOverlap { rule_id: String, trigger: Identity },
    /// Removed by the output's source, category or summary filters
    FilteredOut,
}

impl Decision {
    pub fn is_visible(&self) -> bool {
        matches!(self, Decision::Visible)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Visible => write!(f, "visible"),
            Decision::HiddenManually => write!(f, "hidden manually"),
            Decision::HiddenByRule { rule_id } => write!(f, "hidden by rule {}", rule_id),
            Decision::HiddenByOverlap { rule_id, trigger } => {
                write!(f, "hidden by rule {} (overlaps {})", rule_id, trigger)
            }
            Decision::FilteredOut => write!(f, "filtered out"),
        }
    }
}

/// Decide visibility for every instance; the result is index-aligned with
/// `instances`.
///
/// Every instance handed in can trigger an overlap rule, whatever its own
/// decision, except cancelled ones.
pub fn evaluate(
    instances: &[EventInstance],
    marks: &HiddenMarks,
    rules: &[CompiledRule],
) -> Vec<Decision> {
    let mut decisions: Vec<Decision> = instances
        .iter()
        .map(|instance| {
            if marks.is_hidden(&instance.identity) {
                return Decision::HiddenManually;
            }
            rules
                .iter()
                .find(|rule| rule.hides(instance))
                .map(|rule| Decision::HiddenByRule {
                    rule_id: rule.rule_id.clone(),
                })
                .unwrap_or(Decision::Visible)
        })
        .collect();

    for rule in rules {
        let CompiledKind::Overlap { trigger, target } = &rule.kind else {
            continue;
        };

        let trigger_indices: Vec<usize> = instances
            .iter()
            .enumerate()
            .filter(|(_, i)| !i.is_cancelled && trigger.matches(i))
            .map(|(idx, _)| idx)
            .collect();
        if trigger_indices.is_empty() {
            continue;
        }
        let sweep = OverlapSweep::new(instances, trigger_indices);

        for (instance, decision) in instances.iter().zip(decisions.iter_mut()) {
            if !decision.is_visible() || !target.matches(instance) {
                continue;
            }
            if let Some(trigger_identity) = sweep.trigger_for(instance) {
                tracing::debug!(
                    rule = %rule.rule_id,
                    target = %instance.identity,
                    trigger = %trigger_identity,
                    "hidden by overlap"
                );
                *decision = Decision::HiddenByOverlap {
                    rule_id: rule.rule_id.clone(),
                    trigger: trigger_identity.clone(),
                };
            }
        }
    }

    decisions
}
