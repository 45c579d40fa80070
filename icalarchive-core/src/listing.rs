//! Paginated listing of accumulated definitions.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::event::EventTime;
use crate::hidden::HiddenMarks;
use crate::identity::Identity;
use crate::store::StoreSnapshot;

pub const DEFAULT_PER_PAGE: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    pub source: Option<String>,
    pub category: Option<String>,
    /// Case-insensitive substring of the summary
    pub search: Option<String>,
    /// 1-based
    pub page: usize,
    pub per_page: usize,
}

impl Default for EventQuery {
    fn default() -> Self {
        EventQuery {
            source: None,
            category: None,
            search: None,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

/// One stored definition as shown to an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRecord {
    pub identity: Identity,
    pub summary: String,
    pub start: EventTime,
    pub end: EventTime,
    pub categories: BTreeSet<String>,
    pub recurring: bool,
    pub cancelled: bool,
    pub hidden: bool,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventPage {
    pub events: Vec<EventRecord>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub pages: usize,
}

/// List definitions matching `query`, sorted by start then identity.
pub fn list_events(snapshot: &StoreSnapshot, marks: &HiddenMarks, query: &EventQuery) -> EventPage {
    let search = query.search.as_deref().map(str::to_lowercase);
    let category = query.category.as_deref().map(str::trim);

    let mut matching: Vec<EventRecord> = snapshot
        .definitions()
        .filter(|(source_id, _)| query.source.as_deref().is_none_or(|s| s == *source_id))
        .filter(|(_, def)| category.is_none_or(|c| def.categories.contains(c)))
        .filter(|(_, def)| {
            search
                .as_deref()
                .is_none_or(|s| def.summary.to_lowercase().contains(s))
        })
        .map(|(source_id, def)| {
            let identity = def.identity(source_id);
            let history = snapshot.history(&identity);
            EventRecord {
                hidden: marks.is_hidden(&identity),
                first_seen: history.map(|h| h.first_seen),
                last_updated: history.map(|h| h.last_updated),
                identity,
                summary: def.summary.clone(),
                start: def.start.clone(),
                end: def.end.clone(),
                categories: def.categories.clone(),
                recurring: def.is_recurring(),
                cancelled: def.status == crate::event::EventStatus::Cancelled,
            }
        })
        .collect();

    matching.sort_by(|a, b| {
        (a.start.to_utc(), &a.identity).cmp(&(b.start.to_utc(), &b.identity))
    });

    let per_page = if query.per_page == 0 {
        DEFAULT_PER_PAGE
    } else {
        query.per_page
    };
    let page = query.page.max(1);
    let total = matching.len();

    let events = matching
        .into_iter()
        .skip((page - 1).saturating_mul(per_page))
        .take(per_page)
        .collect();

    EventPage {
        events,
        total,
        page,
        per_page,
        pages: total.div_ceil(per_page),
    }
}
