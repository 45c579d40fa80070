//! Output composition: select, expand, filter, evaluate and serialize.

use std::cmp::Ordering;

use crate::config::{OutputConfig, resolve_rules};
use crate::error::{ArchiveError, ArchiveResult};
use crate::event::{EventInstance, EventTime};
use crate::hidden::HiddenMarks;
use crate::ics::generate_feed;
use crate::recurrence::expand_all;
use crate::rules::{AutoHideRule, Decision, TextPattern, compile_rules, evaluate, trimmed_categories};
use crate::store::StoreSnapshot;
use crate::window::TimeWindow;

/// A composed output feed plus the non-fatal problems met on the way.
#[derive(Debug, Clone)]
pub struct Composition {
    pub ics: String,
    /// Number of instances published
    pub published: usize,
    /// Recurrence failures and invalid patterns
    pub diagnostics: Vec<ArchiveError>,
}

/// One instance and the reason it is or is not in the output.
#[derive(Debug, Clone)]
pub struct ExplainedInstance {
    pub instance: EventInstance,
    pub decision: Decision,
}

/// Build the feed for `output` from `snapshot`.
///
/// `rules` is the full rule list; only the output's `rule_ids` are applied,
/// and an id missing from `rules` fails the whole composition. Equal inputs
/// give byte-identical feeds.
pub fn compose(
    snapshot: &StoreSnapshot,
    output: &OutputConfig,
    marks: &HiddenMarks,
    rules: &[AutoHideRule],
    window: &TimeWindow,
) -> ArchiveResult<Composition> {
    let (explained, diagnostics) = explain_with_diagnostics(snapshot, output, marks, rules, window)?;

    let visible: Vec<EventInstance> = explained
        .into_iter()
        .filter(|e| e.decision.is_visible())
        .map(|e| e.instance)
        .collect();

    tracing::debug!(output = %output.name, published = visible.len(), "composed output");

    Ok(Composition {
        ics: generate_feed(&output.name, output.description.as_deref(), &visible),
        published: visible.len(),
        diagnostics,
    })
}

/// Like [`compose`] but returns every instance in the window with its decision,
/// including those the output's filters removed.
pub fn explain(
    snapshot: &StoreSnapshot,
    output: &OutputConfig,
    marks: &HiddenMarks,
    rules: &[AutoHideRule],
    window: &TimeWindow,
) -> ArchiveResult<Vec<ExplainedInstance>> {
    explain_with_diagnostics(snapshot, output, marks, rules, window).map(|(explained, _)| explained)
}

fn explain_with_diagnostics(
    snapshot: &StoreSnapshot,
    output: &OutputConfig,
    marks: &HiddenMarks,
    rules: &[AutoHideRule],
    window: &TimeWindow,
) -> ArchiveResult<(Vec<ExplainedInstance>, Vec<ArchiveError>)> {
    // Resolve before doing any work so an unknown rule yields no partial output
    let rules = resolve_rules(rules, &output.rule_ids)?;

    let mut diagnostics = Vec::new();
    let filter = OutputFilter::new(output, &mut diagnostics);

    let mut instances = Vec::new();
    for source_id in snapshot.source_ids() {
        if !output.include_sources.is_empty() && !output.include_sources.contains(source_id) {
            continue;
        }
        let Some(record) = snapshot.source(source_id) else {
            continue;
        };
        let (expanded, errors) = expand_all(source_id, record.definitions.values(), window);
        instances.extend(expanded);
        diagnostics.extend(errors);
    }
    instances.sort_by(instance_order);

    let (admitted, filtered): (Vec<_>, Vec<_>) =
        instances.into_iter().partition(|i| filter.admits(i));

    let (compiled, rule_diagnostics) = compile_rules(&rules);
    diagnostics.extend(rule_diagnostics);
    let decisions = evaluate(&admitted, marks, &compiled);

    let mut explained: Vec<ExplainedInstance> = admitted
        .into_iter()
        .zip(decisions)
        .map(|(instance, decision)| ExplainedInstance { instance, decision })
        .chain(filtered.into_iter().map(|instance| ExplainedInstance {
            instance,
            decision: Decision::FilteredOut,
        }))
        .collect();
    explained.sort_by(|a, b| instance_order(&a.instance, &b.instance));

    Ok((explained, diagnostics))
}

/// Total order over instances: start, end, identity, then original start.
fn instance_order(a: &EventInstance, b: &EventInstance) -> Ordering {
    (a.start_utc(), a.end_utc(), &a.identity)
        .cmp(&(b.start_utc(), b.end_utc(), &b.identity))
        .then_with(|| {
            let key = |i: &EventInstance| i.recurrence_id.as_ref().map(EventTime::to_utc);
            key(a).cmp(&key(b))
        })
}

/// Category and summary filters of one output.
struct OutputFilter {
    allow: Vec<String>,
    exclude: Vec<String>,
    include_summary: Option<TextPattern>,
    exclude_summary: Option<TextPattern>,
}

impl OutputFilter {
    fn new(output: &OutputConfig, diagnostics: &mut Vec<ArchiveError>) -> Self {
        let owner = format!("output {}", output.name);
        OutputFilter {
            allow: trimmed_categories(&output.filter_by_category),
            exclude: trimmed_categories(&output.exclude_category),
            include_summary: output
                .include_summary_regex
                .as_deref()
                .map(|p| TextPattern::compile(&owner, p, diagnostics)),
            exclude_summary: output
                .exclude_summary_regex
                .as_deref()
                .map(|p| TextPattern::compile(&owner, p, diagnostics)),
        }
    }

    fn admits(&self, instance: &EventInstance) -> bool {
        if !self.allow.is_empty() && !instance.has_category_in(&self.allow) {
            return false;
        }
        if instance.has_category_in(&self.exclude) {
            return false;
        }
        // An invalid include pattern admits nothing, an invalid exclude removes nothing
        let included = self
            .include_summary
            .as_ref()
            .is_none_or(|p| p.is_match(&instance.summary));
        let excluded = self
            .exclude_summary
            .as_ref()
            .is_some_and(|p| p.is_match(&instance.summary));
        included && !excluded
    }
}
