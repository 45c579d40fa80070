//! RRULE expansion for event definitions.
//!
//! Expands a definition into concrete instances within a window, applying its
//! recurrence exceptions (overrides and deletions). Exceptions are only
//! honoured when their key is an occurrence of the current rule; anything else
//! is stale and ignored.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use rrule::RRuleSet;

use crate::error::{ArchiveError, ArchiveResult};
use crate::event::{
    EventInstance, EventStatus, EventTime, InstanceOverride, RawEventDefinition,
    RecurrenceException,
};
use crate::identity::Identity;
use crate::window::TimeWindow;

/// Upper bound on occurrences generated for one definition in one window.
pub const MAX_OCCURRENCES: u16 = 5000;

/// Instances of one definition, in non-decreasing start order.
///
/// Computed for a single window; expanding another window means calling
/// [`expand`] again.
#[derive(Debug)]
pub struct Expansion {
    inner: std::vec::IntoIter<EventInstance>,
}

impl Expansion {
    fn sorted(mut instances: Vec<EventInstance>) -> Self {
        instances.sort_by(|a, b| {
            (a.start_utc(), a.end_utc())
                .cmp(&(b.start_utc(), b.end_utc()))
                .then_with(|| recurrence_key(a).cmp(&recurrence_key(b)))
        });
        Expansion {
            inner: instances.into_iter(),
        }
    }
}

impl Iterator for Expansion {
    type Item = EventInstance;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

fn recurrence_key(instance: &EventInstance) -> Option<DateTime<Utc>> {
    instance.recurrence_id.as_ref().map(EventTime::to_utc)
}

/// Expand one definition of `source_id` over `window`.
///
/// A non-recurring definition yields at most one instance. A malformed
/// recurrence rule is reported as `ArchiveError::Recurrence`.
pub fn expand(
    source_id: &str,
    definition: &RawEventDefinition,
    window: &TimeWindow,
) -> ArchiveResult<Expansion> {
    let identity = definition.identity(source_id);

    let Some(rrule) = definition.recurrence_rule.as_deref() else {
        let instance = generated_instance(
            &identity,
            definition,
            None,
            definition.start.clone(),
            definition.end.clone(),
        );
        let in_window = window.intersects(instance.start_utc(), instance.end_utc());
        return Ok(Expansion::sorted(
            in_window.then_some(instance).into_iter().collect(),
        ));
    };

    let rrule_set = build_rrule_set(&definition.start, rrule).map_err(|message| {
        ArchiveError::Recurrence {
            identity: identity.to_string(),
            message,
        }
    })?;

    let duration = definition.duration();

    // Pad the lower bound by the event length so occurrences that start before
    // the window but run into it are generated too.
    let tz: rrule::Tz = Utc.into();
    let after = window
        .from
        .checked_sub_signed(duration + Duration::seconds(1))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
        .with_timezone(&tz);
    let before = window
        .to
        .checked_add_signed(Duration::seconds(1))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
        .with_timezone(&tz);

    let result = rrule_set.clone().after(after).before(before).all(MAX_OCCURRENCES);
    if result.limited {
        tracing::warn!(
            identity = %identity,
            limit = MAX_OCCURRENCES,
            "recurrence expansion truncated"
        );
    }

    let mut instances = Vec::new();
    let mut generated_keys = BTreeSet::new();

    for occ_dt in &result.dates {
        let occ_start = occurrence_to_event_time(occ_dt, &definition.start);
        let key = occ_start.to_utc();
        generated_keys.insert(key);

        let instance = match definition.recurrence_exceptions.get(&key) {
            Some(RecurrenceException::Deleted) => continue,
            Some(RecurrenceException::Override(o)) => {
                override_instance(&identity, definition, occ_start, o)
            }
            None => {
                let occ_end = occ_start.shifted(duration).ok_or_else(|| ArchiveError::Recurrence {
                    identity: identity.to_string(),
                    message: format!("occurrence at {} ends out of range", key.to_rfc3339()),
                })?;
                generated_instance(&identity, definition, Some(occ_start.clone()), occ_start, occ_end)
            }
        };

        if window.intersects(instance.start_utc(), instance.end_utc()) {
            instances.push(instance);
        }
    }

    // Overrides may move an occurrence from outside the padded range into the window
    let padded_from = after.with_timezone(&Utc);
    let padded_to = before.with_timezone(&Utc);
    for (key, exception) in &definition.recurrence_exceptions {
        let RecurrenceException::Override(o) = exception else {
            continue;
        };
        if generated_keys.contains(key) || !window.intersects(o.start.to_utc(), o.end.to_utc()) {
            continue;
        }
        let inside_padded_range = *key >= padded_from && *key <= padded_to;
        if inside_padded_range || !is_occurrence(&rrule_set, *key) {
            tracing::debug!(
                identity = %identity,
                recurrence_id = %key,
                "ignoring exception that matches no occurrence"
            );
            continue;
        }
        let recurrence_id = occurrence_to_event_time(&key.with_timezone(&tz), &definition.start);
        instances.push(override_instance(&identity, definition, recurrence_id, o));
    }

    Ok(Expansion::sorted(instances))
}

/// Expand many definitions of one source, isolating failures.
///
/// A definition whose rule fails to expand contributes no instances; its
/// error is returned alongside the instances of everything else.
pub fn expand_all<'a>(
    source_id: &str,
    definitions: impl IntoIterator<Item = &'a RawEventDefinition>,
    window: &TimeWindow,
) -> (Vec<EventInstance>, Vec<ArchiveError>) {
    let mut instances = Vec::new();
    let mut errors = Vec::new();

    for definition in definitions {
        match expand(source_id, definition, window) {
            Ok(expansion) => instances.extend(expansion),
            Err(e) => {
                tracing::warn!(source = source_id, uid = %definition.uid, error = %e, "skipping definition");
                errors.push(e);
            }
        }
    }

    (instances, errors)
}

/// Build an iCalendar-format rule set for the rrule crate parser.
fn build_rrule_set(start: &EventTime, rrule: &str) -> Result<RRuleSet, String> {
    // The rrule crate needs a datetime, so all-day and floating starts are read as UTC
    let dtstart = match start {
        EventTime::Date(d) => format!("DTSTART:{}T000000Z", d.format("%Y%m%d")),
        EventTime::DateTimeUtc(dt) => format!("DTSTART:{}", dt.format("%Y%m%dT%H%M%SZ")),
        EventTime::DateTimeFloating(dt) => format!("DTSTART:{}Z", dt.format("%Y%m%dT%H%M%S")),
        EventTime::DateTimeZoned { datetime, tzid } if tzid.parse::<chrono_tz::Tz>().is_ok() => {
            format!("DTSTART;TZID={}:{}", tzid, datetime.format("%Y%m%dT%H%M%S"))
        }
        EventTime::DateTimeZoned { .. } => {
            format!("DTSTART:{}", start.to_utc().format("%Y%m%dT%H%M%SZ"))
        }
    };
    let rrule = normalize_until(rrule.trim());

    format!("{}\nRRULE:{}", dtstart, rrule)
        .parse::<RRuleSet>()
        .map_err(|e| e.to_string())
}

/// The rrule crate wants UNTIL as a UTC datetime; feeds also send bare dates
/// and floating times.
fn normalize_until(rrule: &str) -> String {
    rrule
        .split(';')
        .map(|part| match part.split_once('=') {
            Some((key, value)) if key.eq_ignore_ascii_case("UNTIL") && !value.ends_with('Z') => {
                if value.len() == 8 {
                    format!("UNTIL={}T235959Z", value)
                } else {
                    format!("UNTIL={}Z", value)
                }
            }
            _ => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Whether `key` is an occurrence of the rule, regardless of any window.
fn is_occurrence(rrule_set: &RRuleSet, key: DateTime<Utc>) -> bool {
    let tz: rrule::Tz = Utc.into();
    let after = (key - Duration::seconds(1)).with_timezone(&tz);
    let before = (key + Duration::seconds(1)).with_timezone(&tz);
    rrule_set
        .clone()
        .after(after)
        .before(before)
        .all(2)
        .dates
        .iter()
        .any(|d| d.with_timezone(&Utc) == key)
}

/// Convert an rrule occurrence datetime back to an EventTime matching the master's variant.
fn occurrence_to_event_time(dt: &DateTime<rrule::Tz>, master_start: &EventTime) -> EventTime {
    match master_start {
        EventTime::Date(_) => EventTime::Date(dt.date_naive()),
        EventTime::DateTimeUtc(_) => EventTime::DateTimeUtc(dt.with_timezone(&Utc)),
        EventTime::DateTimeFloating(_) => EventTime::DateTimeFloating(dt.naive_utc()),
        EventTime::DateTimeZoned { tzid, .. } => EventTime::DateTimeZoned {
            datetime: dt.naive_local(),
            tzid: tzid.clone(),
        },
    }
}

fn generated_instance(
    identity: &Identity,
    definition: &RawEventDefinition,
    recurrence_id: Option<EventTime>,
    start: EventTime,
    end: EventTime,
) -> EventInstance {
    EventInstance {
        identity: identity.clone(),
        recurrence_id,
        instance_start: start,
        instance_end: end,
        summary: definition.summary.clone(),
        description: definition.description.clone(),
        location: definition.location.clone(),
        categories: definition.categories.clone(),
        is_cancelled: definition.status == EventStatus::Cancelled,
        last_modified_at: definition.last_modified_at,
    }
}

fn override_instance(
    identity: &Identity,
    definition: &RawEventDefinition,
    recurrence_id: EventTime,
    o: &InstanceOverride,
) -> EventInstance {
    EventInstance {
        identity: identity.clone(),
        recurrence_id: Some(recurrence_id),
        instance_start: o.start.clone(),
        instance_end: o.end.clone(),
        summary: o.summary.clone(),
        description: o.description.clone(),
        location: o.location.clone(),
        categories: definition.categories.clone(),
        is_cancelled: definition.status == EventStatus::Cancelled
            || o.status == EventStatus::Cancelled,
        last_modified_at: o.last_modified_at.or(definition.last_modified_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn weekly(count: u32) -> RawEventDefinition {
        RawEventDefinition {
            uid: "weekly".to_string(),
            summary: "Team sync".to_string(),
            description: None,
            location: None,
            categories: BTreeSet::from(["Work".to_string()]),
            start: EventTime::DateTimeUtc(utc(2024, 1, 1, 10)),
            end: EventTime::DateTimeUtc(utc(2024, 1, 1, 11)),
            status: EventStatus::Confirmed,
            recurrence_rule: Some(format!("FREQ=WEEKLY;COUNT={}", count)),
            recurrence_exceptions: BTreeMap::new(),
            last_modified_at: None,
        }
    }

    fn january() -> TimeWindow {
        TimeWindow::new(utc(2024, 1, 1, 0), utc(2024, 1, 29, 0)).unwrap()
    }

    #[test]
    fn test_weekly_rule_yields_one_instance_per_week() {
        let instances: Vec<_> = expand("work", &weekly(10), &january()).unwrap().collect();
        assert_eq!(instances.len(), 4);
        assert_eq!(instances[0].start_utc(), utc(2024, 1, 1, 10));
        assert_eq!(instances[3].start_utc(), utc(2024, 1, 22, 10));
        assert!(instances.iter().all(|i| i.recurrence_id.is_some()));
    }

    #[test]
    fn test_deleted_occurrence_is_dropped() {
        let mut def = weekly(4);
        def.recurrence_exceptions
            .insert(utc(2024, 1, 15, 10), RecurrenceException::Deleted);

        let instances: Vec<_> = expand("work", &def, &january()).unwrap().collect();
        assert_eq!(instances.len(), 3);
        assert!(instances.iter().all(|i| i.start_utc() != utc(2024, 1, 15, 10)));
    }

    #[test]
    fn test_override_replaces_occurrence_and_keeps_order() {
        let mut def = weekly(4);
        def.recurrence_exceptions.insert(
            utc(2024, 1, 8, 10),
            RecurrenceException::Override(InstanceOverride {
                summary: "Moved sync".to_string(),
                description: None,
                location: None,
                start: EventTime::DateTimeUtc(utc(2024, 1, 16, 9)),
                end: EventTime::DateTimeUtc(utc(2024, 1, 16, 10)),
                status: EventStatus::Confirmed,
                last_modified_at: None,
            }),
        );

        let instances: Vec<_> = expand("work", &def, &january()).unwrap().collect();
        assert_eq!(instances.len(), 4);
        let starts: Vec<_> = instances.iter().map(|i| i.start_utc()).collect();
        let mut sorted = starts.clone();
        sorted.sort();
        assert_eq!(starts, sorted, "instances must come out in start order");

        let moved = instances.iter().find(|i| i.summary == "Moved sync").unwrap();
        assert_eq!(
            moved.recurrence_id.as_ref().map(EventTime::to_utc),
            Some(utc(2024, 1, 8, 10))
        );
        assert_eq!(moved.categories, def.categories);
    }

    #[test]
    fn test_override_moved_into_window_from_outside() {
        let mut def = weekly(10);
        // Occurrence on Feb 5 moved into January
        def.recurrence_exceptions.insert(
            utc(2024, 2, 5, 10),
            RecurrenceException::Override(InstanceOverride {
                summary: "Pulled forward".to_string(),
                description: None,
                location: None,
                start: EventTime::DateTimeUtc(utc(2024, 1, 20, 10)),
                end: EventTime::DateTimeUtc(utc(2024, 1, 20, 11)),
                status: EventStatus::Confirmed,
                last_modified_at: None,
            }),
        );

        let instances: Vec<_> = expand("work", &def, &january()).unwrap().collect();
        assert_eq!(instances.len(), 5);
        assert!(instances.iter().any(|i| i.summary == "Pulled forward"));
    }

    #[test]
    fn test_stale_exception_is_ignored() {
        let mut def = weekly(4);
        // Not a Monday-10:00 occurrence of the current rule
        def.recurrence_exceptions.insert(
            utc(2024, 1, 10, 10),
            RecurrenceException::Override(InstanceOverride {
                summary: "Stale".to_string(),
                description: None,
                location: None,
                start: EventTime::DateTimeUtc(utc(2024, 1, 10, 10)),
                end: EventTime::DateTimeUtc(utc(2024, 1, 10, 11)),
                status: EventStatus::Confirmed,
                last_modified_at: None,
            }),
        );

        let instances: Vec<_> = expand("work", &def, &january()).unwrap().collect();
        assert_eq!(instances.len(), 4);
        assert!(instances.iter().all(|i| i.summary != "Stale"));
    }

    #[test]
    fn test_non_recurring_outside_window_yields_nothing() {
        let mut def = weekly(1);
        def.recurrence_rule = None;
        def.start = EventTime::DateTimeUtc(utc(2023, 6, 1, 10));
        def.end = EventTime::DateTimeUtc(utc(2023, 6, 1, 11));

        assert_eq!(expand("work", &def, &january()).unwrap().count(), 0);
    }

    #[test]
    fn test_occurrence_running_into_window_is_included() {
        let mut def = weekly(3);
        // Two-day events starting Dec 31
        def.start = EventTime::DateTimeUtc(utc(2023, 12, 31, 12));
        def.end = EventTime::DateTimeUtc(utc(2024, 1, 2, 12));
        let instances: Vec<_> = expand("work", &def, &january()).unwrap().collect();
        assert_eq!(instances.len(), 3);
        assert_eq!(instances[0].start_utc(), utc(2023, 12, 31, 12));
    }

    #[test]
    fn test_malformed_rule_is_isolated() {
        let mut broken = weekly(4);
        broken.uid = "broken".to_string();
        broken.recurrence_rule = Some("FREQ=SOMETIMES".to_string());
        let good = weekly(4);

        let (instances, errors) = expand_all("work", [&broken, &good], &january());
        assert_eq!(instances.len(), 4);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ArchiveError::Recurrence { .. }));
    }

    #[test]
    fn test_all_day_until_date_is_accepted() {
        let mut def = weekly(1);
        def.start = EventTime::Date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        def.end = EventTime::Date(chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        def.recurrence_rule = Some("FREQ=DAILY;UNTIL=20240105".to_string());

        let instances: Vec<_> = expand("work", &def, &january()).unwrap().collect();
        assert_eq!(instances.len(), 5);
        assert!(instances.iter().all(|i| i.instance_start.is_all_day()));
    }

    #[test]
    fn test_zoned_weekly_keeps_wall_clock_across_dst() {
        let mut def = weekly(6);
        let local = chrono::NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        def.start = EventTime::DateTimeZoned {
            datetime: local,
            tzid: "America/New_York".to_string(),
        };
        def.end = EventTime::DateTimeZoned {
            datetime: local + Duration::hours(1),
            tzid: "America/New_York".to_string(),
        };
        let window = TimeWindow::new(utc(2024, 3, 1, 0), utc(2024, 4, 15, 0)).unwrap();

        let instances: Vec<_> = expand("work", &def, &window).unwrap().collect();
        assert_eq!(instances.len(), 6);
        // EST before March 10, EDT after
        assert_eq!(instances[0].start_utc(), utc(2024, 3, 4, 14));
        assert_eq!(instances[1].start_utc(), utc(2024, 3, 11, 13));
    }
}
