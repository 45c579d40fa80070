//! Output feed generation.

use icalendar::{Calendar, Component, EventLike, Property, ValueType};

use crate::event::{EventInstance, EventTime};

/// PRODID written into every output feed.
pub const PRODID: &str = "-//icalarchive//EN";

/// Serialize instances into one VCALENDAR, in the order given.
///
/// Nothing time-dependent is written: DTSTAMP comes from the instance's
/// LAST-MODIFIED, or its start when the source gave none, so equal inputs
/// always produce equal bytes.
pub fn generate_feed(name: &str, description: Option<&str>, instances: &[EventInstance]) -> String {
    let mut cal = Calendar::new();
    cal.append_property(Property::new("X-WR-CALNAME", name));
    if let Some(desc) = description {
        cal.append_property(Property::new("X-WR-CALDESC", desc));
    }

    for instance in instances {
        cal.push(instance_to_vevent(instance));
    }

    strip_ics_bloat(&cal.done().to_string())
}

fn instance_to_vevent(instance: &EventInstance) -> icalendar::Event {
    let mut ics_event = icalendar::Event::new();
    ics_event.uid(&instance.output_uid());
    ics_event.summary(&instance.summary);

    // DTSTAMP is required by RFC 5545 and must never fall back to "now"
    let dtstamp = instance
        .last_modified_at
        .unwrap_or_else(|| instance.start_utc())
        .format("%Y%m%dT%H%M%SZ")
        .to_string();
    ics_event.add_property("DTSTAMP", &dtstamp);

    if let Some(updated) = instance.last_modified_at {
        let last_modified = updated.format("%Y%m%dT%H%M%SZ").to_string();
        ics_event.add_property("LAST-MODIFIED", &last_modified);
    }

    add_datetime_property(&mut ics_event, "DTSTART", &instance.instance_start);
    add_datetime_property(&mut ics_event, "DTEND", &instance.instance_end);

    if let Some(ref desc) = instance.description {
        ics_event.description(desc);
    }

    if let Some(ref loc) = instance.location {
        ics_event.location(loc);
    }

    // One property per category; the writer escapes commas inside a value
    for category in &instance.categories {
        ics_event.append_multi_property(Property::new("CATEGORIES", category));
    }

    if instance.is_cancelled {
        ics_event.add_property("STATUS", "CANCELLED");
    }

    ics_event.add_property("X-ICALARCHIVE-SOURCE", instance.identity.source_id());

    ics_event.done()
}

/// Clean up ICS output from the icalendar crate
/// - Replace PRODID with ours
/// - Remove CALSCALE:GREGORIAN (it's the default)
fn strip_ics_bloat(ics: &str) -> String {
    let mut result = String::with_capacity(ics.len());

    for line in ics.lines() {
        if line.starts_with("PRODID:") {
            result.push_str("PRODID:");
            result.push_str(PRODID);
            result.push_str("\r\n");
            continue;
        }

        if line == "CALSCALE:GREGORIAN" {
            continue;
        }

        result.push_str(line);
        result.push_str("\r\n");
    }

    result
}

/// Add a datetime property with proper formatting based on EventTime variant
fn add_datetime_property(ics_event: &mut icalendar::Event, name: &str, time: &EventTime) {
    match time {
        EventTime::Date(d) => {
            let mut prop = Property::new(name, d.format("%Y%m%d").to_string());
            prop.append_parameter(ValueType::Date);
            ics_event.append_property(prop);
        }
        EventTime::DateTimeUtc(dt) => {
            ics_event.add_property(name, dt.format("%Y%m%dT%H%M%SZ").to_string());
        }
        EventTime::DateTimeFloating(dt) => {
            ics_event.add_property(name, dt.format("%Y%m%dT%H%M%S").to_string());
        }
        EventTime::DateTimeZoned { datetime, tzid } => {
            let mut prop = Property::new(name, datetime.format("%Y%m%dT%H%M%S").to_string());
            prop.add_parameter("TZID", tzid);
            ics_event.append_property(prop);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ics::parse_feed;
    use crate::identity::Identity;
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::collections::BTreeSet;

    fn make_instance() -> EventInstance {
        EventInstance {
            identity: Identity::new("work", "1"),
            recurrence_id: None,
            instance_start: EventTime::DateTimeUtc(
                Utc.with_ymd_and_hms(2025, 3, 20, 15, 0, 0).unwrap(),
            ),
            instance_end: EventTime::DateTimeUtc(
                Utc.with_ymd_and_hms(2025, 3, 20, 16, 0, 0).unwrap(),
            ),
            summary: "Planning".to_string(),
            description: None,
            location: None,
            categories: BTreeSet::from(["Work".to_string()]),
            is_cancelled: false,
            last_modified_at: None,
        }
    }

    #[test]
    fn test_generate_feed_is_byte_stable() {
        let instances = vec![make_instance()];
        let first = generate_feed("all", None, &instances);
        let second = generate_feed("all", None, &instances);
        assert_eq!(first, second);
        assert!(first.contains("DTSTAMP:20250320T150000Z"), "ICS:\n{}", first);
    }

    #[test]
    fn test_generate_feed_has_calendar_name_and_prodid() {
        let ics = generate_feed("personal", Some("Only personal things"), &[]);
        assert!(ics.contains("X-WR-CALNAME:personal"), "ICS:\n{}", ics);
        assert!(ics.contains("X-WR-CALDESC:Only personal things"));
        assert!(ics.contains("PRODID:-//icalarchive//EN"));
        assert!(!ics.contains("CALSCALE"));
    }

    #[test]
    fn test_recurring_instance_uid_includes_original_start() {
        let mut instance = make_instance();
        instance.recurrence_id = Some(instance.instance_start.clone());
        let ics = generate_feed("all", None, &[instance]);
        assert!(ics.contains("UID:work::1::20250320T150000Z"), "ICS:\n{}", ics);
    }

    #[test]
    fn test_all_day_instance_has_value_date() {
        let mut instance = make_instance();
        instance.instance_start = EventTime::Date(NaiveDate::from_ymd_opt(2025, 3, 20).unwrap());
        instance.instance_end = EventTime::Date(NaiveDate::from_ymd_opt(2025, 3, 21).unwrap());

        let ics = generate_feed("all", None, &[instance]);
        assert!(ics.contains("DTSTART;VALUE=DATE:20250320"), "ICS:\n{}", ics);
        assert!(ics.contains("DTEND;VALUE=DATE:20250321"), "ICS:\n{}", ics);
    }

    #[test]
    fn test_categories_survive_generate_then_parse() {
        let mut instance = make_instance();
        instance.categories = BTreeSet::from([
            "Meetings".to_string(),
            "Work".to_string(),
            "Food,Drink".to_string(),
        ]);

        let ics = generate_feed("all", None, &[instance.clone()]);
        assert!(ics.contains("CATEGORIES:Meetings\r\n"), "ICS:\n{}", ics);
        assert!(ics.contains("CATEGORIES:Work\r\n"), "ICS:\n{}", ics);
        assert!(!ics.contains("Meetings\\,Work"), "ICS:\n{}", ics);

        let defs = parse_feed(&ics).expect("Should parse");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].categories, instance.categories);
    }

    #[test]
    fn test_cancelled_instance_is_marked() {
        let mut instance = make_instance();
        instance.is_cancelled = true;
        let ics = generate_feed("all", None, &[instance]);
        assert!(ics.contains("STATUS:CANCELLED"));
    }
}
