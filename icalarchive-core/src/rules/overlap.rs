//! Interval sweep for overlap rules.
//!
//! A target is hidden when some trigger with a different identity satisfies
//! `trigger.start < target.end && target.start < trigger.end`. Triggers are
//! sorted by start and a prefix table keeps, for each prefix, the trigger
//! with the latest end plus the latest-ending trigger of any other identity.
//! One binary search per target then decides it in O(log n).

use chrono::{DateTime, Utc};

use crate::event::EventInstance;
use crate::identity::Identity;

#[derive(Debug, Clone, Copy)]
struct Reach {
    end: DateTime<Utc>,
    /// Index into the instance slice
    index: usize,
}

#[derive(Debug, Clone, Copy)]
struct PrefixReach {
    best: Reach,
    /// Latest end among triggers whose identity differs from `best`'s
    other: Option<Reach>,
}

pub(crate) struct OverlapSweep<'a> {
    instances: &'a [EventInstance],
    starts: Vec<DateTime<Utc>>,
    prefix: Vec<PrefixReach>,
}

impl<'a> OverlapSweep<'a> {
    /// Build the sweep over the instances at `trigger_indices`.
    pub(crate) fn new(instances: &'a [EventInstance], mut trigger_indices: Vec<usize>) -> Self {
        trigger_indices.sort_by_key(|&i| (instances[i].start_utc(), i));

        let mut starts = Vec::with_capacity(trigger_indices.len());
        let mut prefix: Vec<PrefixReach> = Vec::with_capacity(trigger_indices.len());

        for index in trigger_indices {
            let instance = &instances[index];
            let reach = Reach {
                end: instance.end_utc(),
                index,
            };
            starts.push(instance.start_utc());

            let next = match prefix.last().copied() {
                None => PrefixReach {
                    best: reach,
                    other: None,
                },
                Some(prev) => {
                    let prev_best = &instances[prev.best.index].identity;
                    if *prev_best == instance.identity {
                        PrefixReach {
                            best: if reach.end > prev.best.end { reach } else { prev.best },
                            other: prev.other,
                        }
                    } else if reach.end > prev.best.end {
                        PrefixReach {
                            best: reach,
                            other: Some(prev.best),
                        }
                    } else {
                        PrefixReach {
                            best: prev.best,
                            other: match prev.other {
                                Some(o) if o.end >= reach.end => Some(o),
                                _ => Some(reach),
                            },
                        }
                    }
                }
            };
            prefix.push(next);
        }

        OverlapSweep {
            instances,
            starts,
            prefix,
        }
    }

    /// The identity of a trigger overlapping `target`, if any.
    pub(crate) fn trigger_for(&self, target: &EventInstance) -> Option<&'a Identity> {
        let target_start = target.start_utc();
        let target_end = target.end_utc();

        let count = self.starts.partition_point(|start| *start < target_end);
        let reach = self.prefix.get(count.checked_sub(1)?)?;

        let candidate = if self.instances[reach.best.index].identity != target.identity {
            reach.best
        } else {
            reach.other?
        };

        (candidate.end > target_start).then(|| &self.instances[candidate.index].identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventTime;
    use chrono::TimeZone;

    fn at(uid: &str, start_h: u32, end_h: u32) -> EventInstance {
        let day = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        EventInstance {
            identity: Identity::new("s", uid),
            recurrence_id: None,
            instance_start: EventTime::DateTimeUtc(day + chrono::Duration::hours(start_h as i64)),
            instance_end: EventTime::DateTimeUtc(day + chrono::Duration::hours(end_h as i64)),
            summary: uid.to_string(),
            description: None,
            location: None,
            categories: Default::default(),
            is_cancelled: false,
            last_modified_at: None,
        }
    }

    #[test]
    fn test_self_pair_falls_back_to_other_identity() {
        // Trigger "a" reaches furthest but the target is "a" itself
        let instances = vec![at("a", 8, 20), at("b", 9, 11), at("a", 12, 13)];
        let sweep = OverlapSweep::new(&instances, vec![0, 1]);

        assert_eq!(sweep.trigger_for(&instances[2]), None);
        assert_eq!(
            sweep.trigger_for(&at("a", 10, 11)).map(Identity::uid),
            Some("b")
        );
    }

    #[test]
    fn test_touching_intervals_do_not_overlap() {
        let instances = vec![at("t", 10, 12)];
        let sweep = OverlapSweep::new(&instances, vec![0]);

        assert!(sweep.trigger_for(&at("x", 12, 13)).is_none());
        assert!(sweep.trigger_for(&at("x", 8, 10)).is_none());
        assert!(sweep.trigger_for(&at("x", 11, 13)).is_some());
    }

    #[test]
    fn test_no_triggers_hides_nothing() {
        let instances = vec![at("x", 1, 2)];
        let sweep = OverlapSweep::new(&instances, Vec::new());
        assert!(sweep.trigger_for(&instances[0]).is_none());
    }
}
