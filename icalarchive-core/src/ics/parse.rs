//! Feed parsing using the icalendar crate's parser.
//!
//! A feed is parsed all-or-nothing: one malformed VEVENT rejects the whole
//! text so the caller never merges a partial fetch.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use icalendar::{
    DatePerhapsTime,
    parser::{Component, Property, read_calendar, unfold},
};

use crate::error::{ArchiveError, ArchiveResult};
use crate::event::{EventStatus, EventTime, InstanceOverride, RawEventDefinition, RecurrenceException};

/// A VEVENT before overrides are attached to their master.
struct ParsedComponent {
    uid: String,
    summary: String,
    description: Option<String>,
    location: Option<String>,
    categories: BTreeSet<String>,
    start: EventTime,
    end: EventTime,
    status: EventStatus,
    rrule: Option<String>,
    exdates: Vec<EventTime>,
    recurrence_id: Option<EventTime>,
    last_modified_at: Option<DateTime<Utc>>,
}

/// Parse a whole feed into event definitions.
///
/// RECURRENCE-ID components are folded into the master with the same UID as
/// recurrence exceptions, wherever they appear in the text. Overrides without
/// a master in the same feed are returned as standalone definitions.
pub fn parse_feed(content: &str) -> ArchiveResult<Vec<RawEventDefinition>> {
    if !content
        .lines()
        .any(|l| l.trim().eq_ignore_ascii_case("BEGIN:VCALENDAR"))
    {
        return Err(ArchiveError::Parse("missing BEGIN:VCALENDAR".to_string()));
    }

    let unfolded = split_category_lines(&unfold(content));
    let calendar = read_calendar(&unfolded).map_err(|e| ArchiveError::Parse(e.to_string()))?;

    let mut vevents = Vec::new();
    collect_vevents(&calendar.components, &mut vevents);

    let parsed = vevents
        .iter()
        .enumerate()
        .map(|(i, vevent)| parse_component(i, vevent))
        .collect::<ArchiveResult<Vec<_>>>()?;

    let (masters, overrides): (Vec<_>, Vec<_>) =
        parsed.into_iter().partition(|c| c.recurrence_id.is_none());

    let mut definitions: Vec<RawEventDefinition> =
        masters.into_iter().map(into_definition).collect();

    let mut masters_by_uid: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, def) in definitions.iter().enumerate() {
        masters_by_uid.entry(def.uid.clone()).or_default().push(i);
    }

    let mut orphans = Vec::new();
    for component in overrides {
        let Some(indices) = masters_by_uid.get(&component.uid) else {
            orphans.push(component);
            continue;
        };
        let Some(recurrence_id) = component.recurrence_id.as_ref() else {
            continue;
        };
        let key = recurrence_id.to_utc();
        let exception = into_exception(&component);
        for &i in indices {
            // A deletion (EXDATE or cancelled override) is never replaced by an override
            let exceptions = &mut definitions[i].recurrence_exceptions;
            if exceptions.get(&key) != Some(&RecurrenceException::Deleted) {
                exceptions.insert(key, exception.clone());
            }
        }
    }

    tracing::debug!(
        definitions = definitions.len(),
        orphans = orphans.len(),
        "parsed feed"
    );

    definitions.extend(orphans.into_iter().map(into_definition));
    Ok(definitions)
}

/// VEVENTs either sit at the top level or inside a VCALENDAR component,
/// depending on how the parser unwrapped the text.
fn collect_vevents<'c, 'a>(components: &'c [Component<'a>], out: &mut Vec<&'c Component<'a>>) {
    for component in components {
        if component.name == "VEVENT" {
            out.push(component);
        } else if component.name == "VCALENDAR" {
            collect_vevents(&component.components, out);
        }
    }
}

fn parse_component(index: usize, vevent: &Component<'_>) -> ArchiveResult<ParsedComponent> {
    let uid = vevent
        .find_prop("UID")
        .map(|p| p.val.to_string())
        .filter(|uid| !uid.trim().is_empty())
        .ok_or_else(|| ArchiveError::Parse(format!("VEVENT #{} has no UID", index + 1)))?;

    let start = vevent
        .find_prop("DTSTART")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(to_event_time)
        .ok_or_else(|| {
            ArchiveError::Parse(format!("VEVENT '{}' has a missing or invalid DTSTART", uid))
        })?;

    let end = match vevent.find_prop("DTEND") {
        Some(prop) => DatePerhapsTime::try_from(prop)
            .map(to_event_time)
            .map_err(|_| ArchiveError::Parse(format!("VEVENT '{}' has an invalid DTEND", uid)))?,
        None => match vevent.find_prop("DURATION") {
            Some(prop) => {
                let duration = parse_duration(prop.val.as_ref()).ok_or_else(|| {
                    ArchiveError::Parse(format!(
                        "VEVENT '{}' has an invalid DURATION '{}'",
                        uid,
                        prop.val.as_ref()
                    ))
                })?;
                start.shifted(duration).ok_or_else(|| {
                    ArchiveError::Parse(format!("VEVENT '{}' has a DURATION out of range", uid))
                })?
            }
            None if start.is_all_day() => start.shifted(Duration::days(1)).ok_or_else(|| {
                ArchiveError::Parse(format!("VEVENT '{}' has a DTSTART out of range", uid))
            })?,
            None => start.clone(),
        },
    };
    // Reversed ranges collapse to a zero-length instance
    let end = if end.to_utc() < start.to_utc() {
        start.clone()
    } else {
        end
    };

    // TEXT values arrive already unescaped by the parser
    let summary = vevent
        .find_prop("SUMMARY")
        .map(|p| p.val.to_string())
        .unwrap_or_else(|| "(No title)".to_string());
    let description = vevent.find_prop("DESCRIPTION").map(|p| p.val.to_string());
    let location = vevent.find_prop("LOCATION").map(|p| p.val.to_string());

    // One category per property, see split_category_lines
    let categories: BTreeSet<String> = vevent
        .properties
        .iter()
        .filter(|p| p.name == "CATEGORIES")
        .map(|p| p.val.as_ref().trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();

    let status = vevent
        .find_prop("STATUS")
        .map(|p| EventStatus::from_ics_str(p.val.as_ref()))
        .unwrap_or(EventStatus::Confirmed);

    let rrule = vevent
        .find_prop("RRULE")
        .map(|p| p.val.to_string())
        .filter(|r| !r.trim().is_empty());
    let exdates: Vec<EventTime> = vevent
        .properties
        .iter()
        .filter(|p| p.name == "EXDATE")
        .flat_map(parse_exdate_property)
        .collect();

    let recurrence_id = match vevent.find_prop("RECURRENCE-ID") {
        Some(prop) => Some(DatePerhapsTime::try_from(prop).map(to_event_time).map_err(|_| {
            ArchiveError::Parse(format!("VEVENT '{}' has an invalid RECURRENCE-ID", uid))
        })?),
        None => None,
    };

    let last_modified_at = vevent
        .find_prop("LAST-MODIFIED")
        .and_then(|p| parse_utc_stamp(p.val.as_ref()));

    Ok(ParsedComponent {
        uid,
        summary,
        description,
        location,
        categories,
        start,
        end,
        status,
        rrule,
        exdates,
        recurrence_id,
        last_modified_at,
    })
}

fn into_definition(component: ParsedComponent) -> RawEventDefinition {
    let recurrence_exceptions: BTreeMap<DateTime<Utc>, RecurrenceException> = component
        .exdates
        .iter()
        .map(|t| (t.to_utc(), RecurrenceException::Deleted))
        .collect();

    RawEventDefinition {
        uid: component.uid,
        summary: component.summary,
        description: component.description,
        location: component.location,
        categories: component.categories,
        start: component.start,
        end: component.end,
        status: component.status,
        recurrence_rule: component.rrule,
        recurrence_exceptions,
        last_modified_at: component.last_modified_at,
    }
}

/// A cancelled RECURRENCE-ID component deletes its occurrence.
fn into_exception(component: &ParsedComponent) -> RecurrenceException {
    if component.status == EventStatus::Cancelled {
        return RecurrenceException::Deleted;
    }
    RecurrenceException::Override(InstanceOverride {
        summary: component.summary.clone(),
        description: component.description.clone(),
        location: component.location.clone(),
        start: component.start.clone(),
        end: component.end.clone(),
        status: component.status,
        last_modified_at: component.last_modified_at,
    })
}

/// Convert icalendar's DatePerhapsTime to our EventTime, preserving timezone info
fn to_event_time(dpt: DatePerhapsTime) -> EventTime {
    match dpt {
        DatePerhapsTime::Date(d) => EventTime::Date(d),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            icalendar::CalendarDateTime::Utc(dt) => EventTime::DateTimeUtc(dt),
            icalendar::CalendarDateTime::Floating(naive) => EventTime::DateTimeFloating(naive),
            icalendar::CalendarDateTime::WithTimezone { date_time, tzid } => {
                EventTime::DateTimeZoned {
                    datetime: date_time,
                    tzid,
                }
            }
        },
    }
}

/// Parse an EXDATE property into a list of EventTime values.
///
/// Handles `TZID=`, `VALUE=DATE`, UTC (`Z`), floating and comma-separated values.
/// Values that do not parse are skipped.
fn parse_exdate_property(prop: &Property) -> Vec<EventTime> {
    let tzid = prop
        .params
        .iter()
        .find(|p| p.key == "TZID")
        .and_then(|p| p.val.as_ref().map(|v| v.to_string()));

    let is_date = prop
        .params
        .iter()
        .any(|p| p.key == "VALUE" && p.val.as_ref().map(|v| v.as_ref()) == Some("DATE"));

    prop.val
        .as_ref()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            if is_date || s.len() == 8 {
                return chrono::NaiveDate::parse_from_str(s, "%Y%m%d")
                    .ok()
                    .map(EventTime::Date);
            }
            let naive = NaiveDateTime::parse_from_str(s.trim_end_matches('Z'), "%Y%m%dT%H%M%S").ok()?;
            Some(match (&tzid, s.ends_with('Z')) {
                (_, true) => EventTime::DateTimeUtc(naive.and_utc()),
                (Some(tz), false) => EventTime::DateTimeZoned {
                    datetime: naive,
                    tzid: tz.clone(),
                },
                (None, false) => EventTime::DateTimeFloating(naive),
            })
        })
        .collect()
}

/// Parse an ISO 8601 DURATION value (`PT1H30M`, `P1D`, `+P2W`).
/// Negative durations are not meaningful for DTSTART + DURATION and are rejected.
fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim().trim_start_matches('+');
    if value.starts_with('-') {
        return None;
    }
    let duration = iso8601::duration(value).ok()?;
    let std_duration: std::time::Duration = duration.into();
    Duration::from_std(std_duration).ok()
}

/// LAST-MODIFIED / DTSTAMP style UTC stamps (`20240101T100000Z`).
fn parse_utc_stamp(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim().trim_end_matches('Z'), "%Y%m%dT%H%M%S")
        .ok()
        .map(|dt| dt.and_utc())
}

/// Rewrite each `CATEGORIES:a,b\,c` line as one CATEGORIES line per item.
///
/// The parser unescapes TEXT values, after which a list separator and an
/// escaped comma inside a category look the same. Splitting the raw line
/// first keeps `b\,c` as a single category.
fn split_category_lines(unfolded: &str) -> String {
    let mut out = String::with_capacity(unfolded.len());
    for line in unfolded.split_inclusive('\n') {
        let body = line.trim_end_matches(['\r', '\n']);
        let Some((head, value)) = category_property(body) else {
            out.push_str(line);
            continue;
        };
        let ending = match &line[body.len()..] {
            "" => "\r\n",
            ending => ending,
        };
        for item in split_unescaped_commas(value) {
            out.push_str(head);
            out.push(':');
            out.push_str(item);
            out.push_str(ending);
        }
    }
    out
}

/// Name-and-parameters and value of a CATEGORIES content line.
fn category_property(line: &str) -> Option<(&str, &str)> {
    let name_end = line.find([';', ':'])?;
    if !line[..name_end].trim().eq_ignore_ascii_case("CATEGORIES") {
        return None;
    }
    // Parameter values may quote a ':'
    let mut quoted = false;
    for (i, c) in line[name_end..].char_indices() {
        let i = name_end + i;
        match c {
            '"' => quoted = !quoted,
            ':' if !quoted => return Some((&line[..i], &line[i + 1..])),
            _ => {}
        }
    }
    None
}

fn split_unescaped_commas(value: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut item_start = 0;
    let mut escaped = false;
    for (i, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            ',' => {
                items.push(&value[item_start..i]);
                item_start = i + 1;
            }
            _ => {}
        }
    }
    items.push(&value[item_start..]);

    items
        .into_iter()
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect()
}
