//! Property-based invariants:
//! - merging a fetch twice equals merging it once
//! - the identity set only grows across merges
//! - the overlap sweep agrees with the pairwise definition
//! - composition is byte-stable and independent of merge order

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, TimeZone, Utc};
use icalarchive_core::rules::{compile_rules, evaluate};
use icalarchive_core::{
    AutoHideRule, EventInstance, EventStatus, EventStore, EventTime, HiddenMarks, Identity,
    Matcher, OutputConfig, RawEventDefinition, RuleKind, SourceRecord, TimeWindow, compose,
};
use proptest::prelude::*;

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn definition(uid: u8, summary: u8, start_h: i64, len_h: i64, weekly: bool) -> RawEventDefinition {
    let start = base() + Duration::hours(start_h);
    RawEventDefinition {
        uid: format!("u{uid}"),
        summary: format!("s{summary}"),
        description: None,
        location: None,
        categories: BTreeSet::from([format!("c{}", summary % 2)]),
        start: EventTime::DateTimeUtc(start),
        end: EventTime::DateTimeUtc(start + Duration::hours(len_h)),
        status: EventStatus::Confirmed,
        recurrence_rule: weekly.then(|| "FREQ=WEEKLY;COUNT=3".to_string()),
        recurrence_exceptions: BTreeMap::new(),
        last_modified_at: None,
    }
}

fn definition_strategy() -> impl Strategy<Value = RawEventDefinition> {
    (0u8..8, 0u8..4, 0i64..200, 0i64..5, any::<bool>())
        .prop_map(|(uid, summary, start, len, weekly)| definition(uid, summary, start, len, weekly))
}

fn fetch_strategy() -> impl Strategy<Value = Vec<RawEventDefinition>> {
    prop::collection::vec(definition_strategy(), 0..10)
}

fn records(store: &EventStore) -> Vec<SourceRecord> {
    store.snapshot().records().cloned().collect()
}

fn instance(uid: u8, categories: &[&str], start_h: i64, len_h: i64, cancelled: bool) -> EventInstance {
    let start = base() + Duration::hours(start_h);
    EventInstance {
        identity: Identity::new("p", format!("u{uid}")),
        recurrence_id: None,
        instance_start: EventTime::DateTimeUtc(start),
        instance_end: EventTime::DateTimeUtc(start + Duration::hours(len_h)),
        summary: format!("u{uid}"),
        description: None,
        location: None,
        categories: categories.iter().map(|c| c.to_string()).collect(),
        is_cancelled: cancelled,
        last_modified_at: None,
    }
}

fn instance_strategy() -> impl Strategy<Value = EventInstance> {
    (0u8..6, 0usize..4, 0i64..48, 0i64..6, prop::bool::weighted(0.1)).prop_map(
        |(uid, cats, start, len, cancelled)| {
            let categories: &[&str] = match cats {
                0 => &[],
                1 => &["Trigger"],
                2 => &["Target"],
                _ => &["Trigger", "Target"],
            };
            instance(uid, categories, start, len, cancelled)
        },
    )
}

/// Hidden by the overlap rule according to the pairwise definition.
fn brute_force_hidden(instances: &[EventInstance]) -> Vec<bool> {
    let is_trigger = |i: &EventInstance| !i.is_cancelled && i.categories.contains("Trigger");
    let is_target = |i: &EventInstance| i.categories.contains("Target");
    instances
        .iter()
        .map(|target| {
            is_target(target)
                && instances.iter().any(|trigger| {
                    is_trigger(trigger)
                        && trigger.identity != target.identity
                        && trigger.start_utc() < target.end_utc()
                        && target.start_utc() < trigger.end_utc()
                })
        })
        .collect()
}

proptest! {
    #[test]
    fn merge_is_idempotent(existing in fetch_strategy(), fetch in fetch_strategy()) {
        let once = EventStore::new();
        once.merge("src", existing.clone(), base());
        once.merge("src", fetch.clone(), base());

        let twice = EventStore::new();
        twice.merge("src", existing, base());
        twice.merge("src", fetch.clone(), base());
        let report = twice.merge("src", fetch, base());

        prop_assert_eq!(records(&once), records(&twice));
        prop_assert!(!report.has_changes());
    }

    #[test]
    fn identities_only_grow(fetches in prop::collection::vec(fetch_strategy(), 1..6)) {
        let store = EventStore::new();
        let mut previous: BTreeSet<Identity> = BTreeSet::new();
        for fetch in fetches {
            let fetched: BTreeSet<Identity> = fetch.iter().map(|d| d.identity("src")).collect();
            store.merge("src", fetch, base());
            let current: BTreeSet<Identity> = store.snapshot().identities().collect();
            prop_assert!(current.is_superset(&previous));
            prop_assert!(current.is_superset(&fetched));
            previous = current;
        }
    }

    #[test]
    fn overlap_sweep_matches_pairwise(instances in prop::collection::vec(instance_strategy(), 0..40)) {
        let rule = AutoHideRule::new(
            "r",
            RuleKind::Overlap {
                trigger: Matcher::categories(["Trigger"]),
                target: Matcher::categories(["Target"]),
            },
        );
        let (rules, _) = compile_rules([&rule]);
        let decisions = evaluate(&instances, &HiddenMarks::new(), &rules);
        let expected = brute_force_hidden(&instances);

        for (decision, hidden) in decisions.iter().zip(expected) {
            prop_assert_eq!(!decision.is_visible(), hidden);
        }
    }

    #[test]
    fn composition_is_deterministic(a in fetch_strategy(), b in fetch_strategy()) {
        let window = TimeWindow::new(base(), base() + Duration::days(60)).unwrap();
        let output = OutputConfig::new("all");
        let marks = HiddenMarks::new();

        let forward = EventStore::new();
        forward.merge("a", a.clone(), base());
        forward.merge("b", b.clone(), base());

        let backward = EventStore::new();
        backward.merge("b", b, base());
        backward.merge("a", a, base());

        let first = compose(&forward.snapshot(), &output, &marks, &[], &window).unwrap();
        let again = compose(&forward.snapshot(), &output, &marks, &[], &window).unwrap();
        let other = compose(&backward.snapshot(), &output, &marks, &[], &window).unwrap();

        prop_assert_eq!(&first.ics, &again.ics);
        prop_assert_eq!(&first.ics, &other.ics);
    }
}
