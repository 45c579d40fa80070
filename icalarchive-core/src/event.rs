//! Event definitions as declared by a source, and the concrete instances expanded from them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::Identity;

/// A calendar entry as declared by a source, before recurrence expansion.
///
/// The source id is not part of the definition: the store partitions by
/// source, and the identity is rebuilt as `(source, uid)` on expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEventDefinition {
    pub uid: String,
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub categories: BTreeSet<String>,
    pub start: EventTime,
    /// Resolved from DTEND, or DTSTART + DURATION
    pub end: EventTime,
    pub status: EventStatus,

    // Recurrence fields
    /// RRULE value, e.g. `FREQ=WEEKLY;COUNT=4`
    pub recurrence_rule: Option<String>,
    /// Keyed by the original start (UTC) of the occurrence being replaced
    #[serde(default)]
    pub recurrence_exceptions: BTreeMap<DateTime<Utc>, RecurrenceException>,

    /// LAST-MODIFIED
    pub last_modified_at: Option<DateTime<Utc>>,
}

impl RawEventDefinition {
    pub fn identity(&self, source_id: &str) -> Identity {
        Identity::new(source_id, &self.uid)
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence_rule.is_some()
    }

    /// Length of the master event, used for every generated occurrence.
    pub fn duration(&self) -> Duration {
        self.end.to_utc() - self.start.to_utc()
    }
}

/// What happens to one occurrence of a recurring definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RecurrenceException {
    /// The occurrence is replaced by a RECURRENCE-ID component
    Override(InstanceOverride),
    /// The occurrence was removed (EXDATE, or a cancelled RECURRENCE-ID component)
    Deleted,
}

/// Field values of a RECURRENCE-ID component. Categories always come from the master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceOverride {
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    pub status: EventStatus,
    pub last_modified_at: Option<DateTime<Utc>>,
}

/// One concrete occurrence of a definition. Derived on every read, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct EventInstance {
    pub identity: Identity,
    /// Original start of the occurrence, for instances of recurring definitions
    pub recurrence_id: Option<EventTime>,
    pub instance_start: EventTime,
    pub instance_end: EventTime,
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub categories: BTreeSet<String>,
    pub is_cancelled: bool,
    pub last_modified_at: Option<DateTime<Utc>>,
}

impl EventInstance {
    pub fn start_utc(&self) -> DateTime<Utc> {
        self.instance_start.to_utc()
    }

    pub fn end_utc(&self) -> DateTime<Utc> {
        self.instance_end.to_utc()
    }

    /// Half-open interval intersection: `a.start < b.end && b.start < a.end`.
    pub fn overlaps(&self, other: &EventInstance) -> bool {
        self.start_utc() < other.end_utc() && other.start_utc() < self.end_utc()
    }

    /// UID published in output feeds.
    ///
    /// Non-recurring instances keep `source::uid`; recurring instances append
    /// their original start so every published instance is distinct and stable.
    pub fn output_uid(&self) -> String {
        match &self.recurrence_id {
            Some(rid) => format!(
                "{}::{}",
                self.identity,
                rid.to_utc().format("%Y%m%dT%H%M%SZ")
            ),
            None => self.identity.to_string(),
        }
    }

    pub fn has_category_in(&self, categories: &[String]) -> bool {
        categories.iter().any(|c| self.categories.contains(c.trim()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTime {
    Date(NaiveDate),
    DateTimeUtc(DateTime<Utc>),
    DateTimeFloating(NaiveDateTime),
    DateTimeZoned { datetime: NaiveDateTime, tzid: String },
}

impl EventTime {
    /// Absolute instant used for ordering, windows and overlap.
    ///
    /// All-day dates start at midnight UTC and floating times are read as UTC.
    /// Zoned times with a TZID chrono-tz does not know are also read as UTC.
    pub fn to_utc(&self) -> DateTime<Utc> {
        match self {
            EventTime::Date(d) => d.and_time(chrono::NaiveTime::MIN).and_utc(),
            EventTime::DateTimeUtc(dt) => *dt,
            EventTime::DateTimeFloating(dt) => dt.and_utc(),
            EventTime::DateTimeZoned { datetime, tzid } => match tzid.parse::<chrono_tz::Tz>() {
                Ok(tz) => tz
                    .from_local_datetime(datetime)
                    .earliest()
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|| datetime.and_utc()),
                Err(_) => datetime.and_utc(),
            },
        }
    }

    pub fn is_all_day(&self) -> bool {
        matches!(self, EventTime::Date(_))
    }

    /// Shift by `delta`, keeping the variant (and TZID) of `self`.
    /// All-day dates move by whole days. `None` when the result leaves chrono's range.
    pub fn shifted(&self, delta: Duration) -> Option<EventTime> {
        Some(match self {
            EventTime::Date(d) => {
                EventTime::Date(d.checked_add_signed(Duration::try_days(delta.num_days())?)?)
            }
            EventTime::DateTimeUtc(dt) => EventTime::DateTimeUtc(dt.checked_add_signed(delta)?),
            EventTime::DateTimeFloating(dt) => {
                EventTime::DateTimeFloating(dt.checked_add_signed(delta)?)
            }
            EventTime::DateTimeZoned { datetime, tzid } => EventTime::DateTimeZoned {
                datetime: datetime.checked_add_signed(delta)?,
                tzid: tzid.clone(),
            },
        })
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTime::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            EventTime::DateTimeUtc(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M UTC")),
            EventTime::DateTimeFloating(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M")),
            EventTime::DateTimeZoned { datetime, tzid } => {
                write!(f, "{} ({})", datetime.format("%Y-%m-%d %H:%M"), tzid)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Confirmed,
    Tentative,
    Cancelled,
}

impl EventStatus {
    pub fn from_ics_str(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "TENTATIVE" => EventStatus::Tentative,
            "CANCELLED" => EventStatus::Cancelled,
            _ => EventStatus::Confirmed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zoned_time_converts_through_tz_database() {
        let time = EventTime::DateTimeZoned {
            datetime: NaiveDate::from_ymd_opt(2024, 7, 1)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            tzid: "Europe/Berlin".to_string(),
        };
        assert_eq!(
            time.to_utc(),
            Utc.with_ymd_and_hms(2024, 7, 1, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_unknown_tzid_is_read_as_utc() {
        let naive = NaiveDate::from_ymd_opt(2024, 7, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let time = EventTime::DateTimeZoned {
            datetime: naive,
            tzid: "Not/AZone".to_string(),
        };
        assert_eq!(time.to_utc(), naive.and_utc());
    }

    #[test]
    fn test_all_day_shift_moves_whole_days() {
        let start = EventTime::Date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        assert_eq!(
            start.shifted(Duration::days(1)),
            Some(EventTime::Date(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()))
        );
    }

    #[test]
    fn test_shift_past_representable_range_is_none() {
        let start = EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
        assert_eq!(start.shifted(Duration::weeks(99_999_999)), None);

        let all_day = EventTime::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(all_day.shifted(Duration::weeks(99_999_999)), None);
    }
}
