use chrono::{DateTime, Utc};

use crate::compose::{self, Composition, ExplainedInstance};
use crate::config::ArchiveConfig;
use crate::error::ArchiveResult;
use crate::hidden::HiddenMarks;
use crate::ics::parse_feed;
use crate::listing::{EventPage, EventQuery, list_events};
use crate::store::{EventStore, MergeReport, SourceRecord, SourceStats, StoreSnapshot};
use crate::window::TimeWindow;

/// The accumulated store plus the operations callers need around it.
#[derive(Default)]
pub struct Archive {
    store: EventStore,
}

impl Archive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = SourceRecord>) -> Self {
        Archive {
            store: EventStore::from_records(records),
        }
    }

    /// Parse a feed fetched at `fetched_at` and merge it. A feed that fails to
    /// parse leaves the store untouched, including the source's `last_fetch`.
    pub fn ingest(
        &self,
        source_id: &str,
        content: &str,
        fetched_at: DateTime<Utc>,
    ) -> ArchiveResult<MergeReport> {
        let definitions = parse_feed(content).inspect_err(|e| {
            tracing::warn!(source = source_id, error = %e, "rejected feed");
        })?;
        Ok(self.store.merge(source_id, definitions, fetched_at))
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.snapshot()
    }

    pub fn stats(&self) -> Vec<SourceStats> {
        self.store.stats()
    }

    /// Compose the output called `name` from the current snapshot.
    pub fn compose(
        &self,
        config: &ArchiveConfig,
        name: &str,
        marks: &HiddenMarks,
        window: &TimeWindow,
    ) -> ArchiveResult<Composition> {
        let output = config.output(name)?;
        compose::compose(&self.snapshot(), output, marks, &config.rules, window)
    }

    pub fn explain(
        &self,
        config: &ArchiveConfig,
        name: &str,
        marks: &HiddenMarks,
        window: &TimeWindow,
    ) -> ArchiveResult<Vec<ExplainedInstance>> {
        let output = config.output(name)?;
        compose::explain(&self.snapshot(), output, marks, &config.rules, window)
    }

    pub fn list_events(&self, marks: &HiddenMarks, query: &EventQuery) -> EventPage {
        list_events(&self.snapshot(), marks, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ArchiveError;

    #[test]
    fn test_rejected_feed_leaves_store_untouched() {
        let archive = Archive::new();
        archive
            .ingest(
                "work",
                "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:1\r\nDTSTART:20240101T100000Z\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n",
                chrono::Utc::now(),
            )
            .unwrap();

        let err = archive
            .ingest(
                "work",
                "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nSUMMARY:No uid\r\nDTSTART:20240101T100000Z\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n",
                chrono::Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Parse(_)));
        assert_eq!(archive.snapshot().len(), 1);
    }

    #[test]
    fn test_rejected_feed_does_not_count_as_fetch() {
        let first = chrono::TimeZone::with_ymd_and_hms(&Utc, 2024, 6, 1, 8, 0, 0).unwrap();
        let archive = Archive::new();
        archive
            .ingest(
                "work",
                "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:1\r\nDTSTART:20240101T100000Z\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n",
                first,
            )
            .unwrap();
        assert!(archive.ingest("work", "not a calendar", Utc::now()).is_err());

        assert_eq!(archive.stats()[0].last_fetch, Some(first));
    }

    #[test]
    fn test_compose_unknown_output() {
        let archive = Archive::new();
        let window = TimeWindow::default_at(chrono::Utc::now());
        let err = archive
            .compose(&ArchiveConfig::default(), "missing", &HiddenMarks::new(), &window)
            .unwrap_err();
        assert_eq!(err, ArchiveError::UnknownOutput("missing".to_string()));
    }
}
