use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome of merging one fetch into the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub source_id: String,
    /// Identities seen for the first time
    pub added: usize,
    /// Known identities whose fields changed
    pub updated: usize,
    /// Known identities fetched with identical fields
    pub unchanged: usize,
    /// Stored identities the fetch did not mention
    pub retained: usize,
}

impl MergeReport {
    pub fn new(source_id: &str) -> Self {
        MergeReport {
            source_id: source_id.to_string(),
            ..Default::default()
        }
    }

    pub fn has_changes(&self) -> bool {
        self.added > 0 || self.updated > 0
    }
}

impl fmt::Display for MergeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} added, {} updated, {} unchanged, {} retained",
            self.source_id, self.added, self.updated, self.unchanged, self.retained
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    pub source_id: String,
    pub event_count: usize,
    pub recurring_count: usize,
    pub last_fetch: Option<DateTime<Utc>>,
}
