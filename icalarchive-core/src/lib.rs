//! Event accumulation and filtering engine for icalarchive.
//!
//! Feeds are parsed into definitions and merged into a store that never
//! forgets an event. Named outputs expand the store over a time window,
//! apply their filters and hide rules, and serialize the result back to
//! iCalendar text. Nothing in this crate touches the filesystem or network.

pub mod archive;
pub mod compose;
pub mod config;
pub mod error;
pub mod event;
pub mod hidden;
pub mod ics;
pub mod identity;
pub mod listing;
pub mod recurrence;
pub mod rules;
pub mod store;
pub mod window;

pub use archive::Archive;
pub use compose::{Composition, ExplainedInstance, compose, explain};
pub use config::{ArchiveConfig, OutputConfig, SourceConfig, WindowConfig};
pub use error::{ArchiveError, ArchiveResult};
pub use event::{EventInstance, EventStatus, EventTime, RawEventDefinition, RecurrenceException};
pub use hidden::HiddenMarks;
pub use identity::Identity;
pub use listing::{EventPage, EventQuery, EventRecord, list_events};
pub use rules::{AutoHideRule, Decision, Matcher, RuleKind};
pub use store::{DefinitionHistory, EventStore, MergeReport, SourceRecord, SourceStats, StoreSnapshot};
pub use window::TimeWindow;
