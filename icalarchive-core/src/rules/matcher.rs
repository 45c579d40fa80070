//! Compiled instance predicates shared by rules and output filters.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, ArchiveResult};
use crate::event::EventInstance;

/// Compile a case-insensitive, unanchored pattern. `owner` names the rule or
/// output the pattern belongs to, for diagnostics.
pub fn compile_pattern(owner: &str, pattern: &str) -> ArchiveResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| ArchiveError::InvalidPattern {
            owner: owner.to_string(),
            message: e.to_string(),
        })
}

/// A pattern that failed to compile matches nothing.
#[derive(Debug, Clone)]
pub(crate) struct TextPattern(Option<Regex>);

impl TextPattern {
    pub(crate) fn compile(owner: &str, pattern: &str, diagnostics: &mut Vec<ArchiveError>) -> Self {
        match compile_pattern(owner, pattern) {
            Ok(regex) => TextPattern(Some(regex)),
            Err(e) => {
                tracing::warn!(error = %e, "pattern disabled");
                diagnostics.push(e);
                TextPattern(None)
            }
        }
    }

    pub(crate) fn is_match(&self, text: &str) -> bool {
        self.0.as_ref().is_some_and(|re| re.is_match(text))
    }
}

/// Criteria selecting instances for one side of an overlap rule.
///
/// Every criterion that is set must hold. A matcher with no criteria
/// matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matcher {
    /// Any of these categories
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_pattern: Option<String>,
}

impl Matcher {
    pub fn categories<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Matcher {
            categories: categories.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn summary(pattern: impl Into<String>) -> Self {
        Matcher {
            summary_pattern: Some(pattern.into()),
            ..Default::default()
        }
    }

    pub(crate) fn compile(&self, owner: &str, diagnostics: &mut Vec<ArchiveError>) -> CompiledMatcher {
        let categories = trimmed_categories(&self.categories);
        CompiledMatcher {
            categories: (!categories.is_empty()).then_some(categories),
            summary: self
                .summary_pattern
                .as_deref()
                .map(|p| TextPattern::compile(owner, p, diagnostics)),
            description: self
                .description_pattern
                .as_deref()
                .map(|p| TextPattern::compile(owner, p, diagnostics)),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledMatcher {
    categories: Option<Vec<String>>,
    summary: Option<TextPattern>,
    description: Option<TextPattern>,
}

impl CompiledMatcher {
    pub(crate) fn matches(&self, instance: &EventInstance) -> bool {
        if self.categories.is_none() && self.summary.is_none() && self.description.is_none() {
            return false;
        }
        self.categories
            .as_ref()
            .is_none_or(|c| instance.has_category_in(c))
            && self
                .summary
                .as_ref()
                .is_none_or(|p| p.is_match(&instance.summary))
            && self
                .description
                .as_ref()
                .is_none_or(|p| p.is_match(instance.description.as_deref().unwrap_or("")))
    }
}

pub(crate) fn trimmed_categories(categories: &[String]) -> Vec<String> {
    categories
        .iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventTime;
    use crate::identity::Identity;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeSet;

    fn instance(summary: &str, categories: &[&str]) -> EventInstance {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        EventInstance {
            identity: Identity::new("s", summary),
            recurrence_id: None,
            instance_start: EventTime::DateTimeUtc(start),
            instance_end: EventTime::DateTimeUtc(start + chrono::Duration::hours(1)),
            summary: summary.to_string(),
            description: None,
            location: None,
            categories: categories.iter().map(|c| c.to_string()).collect::<BTreeSet<_>>(),
            is_cancelled: false,
            last_modified_at: None,
        }
    }

    #[test]
    fn test_empty_matcher_matches_nothing() {
        let mut diags = Vec::new();
        let m = Matcher::default().compile("r", &mut diags);
        assert!(!m.matches(&instance("anything", &["Work"])));
        assert!(diags.is_empty());
    }

    #[test]
    fn test_criteria_are_and_ed_and_patterns_case_insensitive() {
        let mut diags = Vec::new();
        let m = Matcher {
            categories: vec![" Work ".to_string(), "OnCall".to_string()],
            summary_pattern: Some("standup".to_string()),
            description_pattern: None,
        }
        .compile("r", &mut diags);

        assert!(m.matches(&instance("Daily STANDUP", &["Work"])));
        assert!(!m.matches(&instance("Daily standup", &["Personal"])));
        assert!(!m.matches(&instance("Lunch", &["OnCall"])));
    }

    #[test]
    fn test_invalid_pattern_matches_nothing_and_is_reported() {
        let mut diags = Vec::new();
        let m = Matcher::summary("(unclosed").compile("broken-rule", &mut diags);
        assert!(!m.matches(&instance("(unclosed", &[])));
        assert!(matches!(
            &diags[..],
            [ArchiveError::InvalidPattern { owner, .. }] if owner == "broken-rule"
        ));
    }
}
