//! The permanent per-source record of event definitions.
//!
//! Definitions are keyed by UID inside a source partition, so the full key is
//! the `(source, uid)` identity. Merging only inserts and replaces; there is
//! no operation that removes an identity.
//!
//! The store has no clock of its own: every merge is stamped with the
//! caller's `fetched_at`.

mod report;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::event::RawEventDefinition;
use crate::identity::Identity;

pub use report::{MergeReport, SourceStats};

/// Everything stored for one source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source_id: String,
    #[serde(default)]
    pub definitions: BTreeMap<String, RawEventDefinition>,
    /// Keyed by UID like `definitions`
    #[serde(default)]
    pub history: BTreeMap<String, DefinitionHistory>,
    /// Latest successful merge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fetch: Option<DateTime<Utc>>,
}

impl SourceRecord {
    pub fn new(source_id: impl Into<String>) -> Self {
        SourceRecord {
            source_id: source_id.into(),
            ..Default::default()
        }
    }
}

/// When a definition entered the store and when its fields last changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionHistory {
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

struct SourceSlot {
    /// Serializes merges of this source
    merge_lock: Mutex<()>,
    /// Readers clone the Arc; merges swap in a new one
    record: RwLock<Arc<SourceRecord>>,
}

impl SourceSlot {
    fn new(record: SourceRecord) -> Self {
        SourceSlot {
            merge_lock: Mutex::new(()),
            record: RwLock::new(Arc::new(record)),
        }
    }
}

/// Accumulating store of definitions, partitioned by source.
///
/// Merges of different sources run in parallel. Merges of the same source are
/// serialized by that source's lock. Readers take a [`StoreSnapshot`] and
/// never observe a half-applied merge.
#[derive(Default)]
pub struct EventStore {
    sources: RwLock<BTreeMap<String, Arc<SourceSlot>>>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from previously persisted records.
    pub fn from_records(records: impl IntoIterator<Item = SourceRecord>) -> Self {
        let sources = records
            .into_iter()
            .map(|record| (record.source_id.clone(), Arc::new(SourceSlot::new(record))))
            .collect();
        EventStore {
            sources: RwLock::new(sources),
        }
    }

    fn slot(&self, source_id: &str) -> Arc<SourceSlot> {
        if let Some(slot) = self.sources.read().get(source_id) {
            return slot.clone();
        }
        self.sources
            .write()
            .entry(source_id.to_string())
            .or_insert_with(|| Arc::new(SourceSlot::new(SourceRecord::new(source_id))))
            .clone()
    }

    /// Merge one fetch of `source_id` into the store.
    ///
    /// New identities are inserted, known identities get every field replaced
    /// by the fetched value, and identities missing from the fetch are kept as
    /// they are. When a fetch repeats a UID the later definition wins.
    ///
    /// `fetched_at` becomes `first_seen` of new identities and `last_updated`
    /// of changed ones; unchanged identities keep their history. The source's
    /// `last_fetch` never moves backwards.
    pub fn merge(
        &self,
        source_id: &str,
        definitions: impl IntoIterator<Item = RawEventDefinition>,
        fetched_at: DateTime<Utc>,
    ) -> MergeReport {
        let mut fetched: BTreeMap<String, RawEventDefinition> = BTreeMap::new();
        for def in definitions {
            fetched.insert(def.uid.clone(), def);
        }

        let slot = self.slot(source_id);
        let _guard = slot.merge_lock.lock();

        let current = slot.record.read().clone();
        let mut report = MergeReport::new(source_id);
        report.retained = current
            .definitions
            .keys()
            .filter(|uid| !fetched.contains_key(*uid))
            .count();

        let mut next: Option<SourceRecord> = None;
        for (uid, def) in fetched {
            match current.definitions.get(&uid) {
                Some(existing) if *existing == def => report.unchanged += 1,
                existing => {
                    if existing.is_some() {
                        report.updated += 1;
                    } else {
                        report.added += 1;
                    }
                    let next = next.get_or_insert_with(|| (*current).clone());
                    next.history
                        .entry(uid.clone())
                        .and_modify(|h| h.last_updated = fetched_at)
                        .or_insert(DefinitionHistory {
                            first_seen: fetched_at,
                            last_updated: fetched_at,
                        });
                    next.definitions.insert(uid, def);
                }
            }
        }

        let last_fetch = current.last_fetch.max(Some(fetched_at));
        if last_fetch != current.last_fetch {
            next.get_or_insert_with(|| (*current).clone()).last_fetch = last_fetch;
        }

        // Unchanged fetches keep the existing Arc so snapshots stay shared
        if let Some(next) = next {
            *slot.record.write() = Arc::new(next);
        }

        tracing::info!(
            source = source_id,
            added = report.added,
            updated = report.updated,
            unchanged = report.unchanged,
            retained = report.retained,
            "merged fetch"
        );

        report
    }

    /// Point-in-time view of every source.
    pub fn snapshot(&self) -> StoreSnapshot {
        let sources = self
            .sources
            .read()
            .iter()
            .map(|(id, slot)| (id.clone(), slot.record.read().clone()))
            .collect();
        StoreSnapshot { sources }
    }

    pub fn stats(&self) -> Vec<SourceStats> {
        self.snapshot().stats()
    }
}

/// Immutable view of the store taken at one instant.
///
/// Each source's record is shared with the store until that source is merged
/// again, so taking a snapshot does not copy definitions.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    sources: BTreeMap<String, Arc<SourceRecord>>,
}

impl StoreSnapshot {
    pub fn source_ids(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn source(&self, source_id: &str) -> Option<&SourceRecord> {
        self.sources.get(source_id).map(Arc::as_ref)
    }

    pub fn records(&self) -> impl Iterator<Item = &SourceRecord> {
        self.sources.values().map(Arc::as_ref)
    }

    /// All definitions as `(source_id, definition)`, ordered by identity.
    pub fn definitions(&self) -> impl Iterator<Item = (&str, &RawEventDefinition)> {
        self.sources.iter().flat_map(|(source_id, record)| {
            record
                .definitions
                .values()
                .map(move |def| (source_id.as_str(), def))
        })
    }

    pub fn get(&self, identity: &Identity) -> Option<&RawEventDefinition> {
        self.sources
            .get(identity.source_id())
            .and_then(|record| record.definitions.get(identity.uid()))
    }

    pub fn history(&self, identity: &Identity) -> Option<&DefinitionHistory> {
        self.sources
            .get(identity.source_id())
            .and_then(|record| record.history.get(identity.uid()))
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.get(identity).is_some()
    }

    pub fn identities(&self) -> impl Iterator<Item = Identity> + '_ {
        self.definitions()
            .map(|(source_id, def)| def.identity(source_id))
    }

    pub fn len(&self) -> usize {
        self.sources.values().map(|r| r.definitions.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> Vec<SourceStats> {
        self.sources
            .iter()
            .map(|(source_id, record)| SourceStats {
                source_id: source_id.clone(),
                event_count: record.definitions.len(),
                recurring_count: record
                    .definitions
                    .values()
                    .filter(|d| d.is_recurring())
                    .count(),
                last_fetch: record.last_fetch,
            })
            .collect()
    }
}
