//! Bounded garbage collection for AI observations and key findings.

use chrono::{DateTime, Duration, Utc};
use lckb_core::text::normalize;
use lckb_core::{ClinicalDocument, LckbConfig, ObservationStatus, ProblemMatrix};
use tracing::debug;

use crate::rules::CompiledRules;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub invalidated: usize,
    pub superseded: usize,
    pub removed: usize,
}

impl PruneReport {
    pub fn is_noop(&self) -> bool {
        self.invalidated == 0 && self.superseded == 0 && self.removed == 0
    }
}

/// Runs every observation pruning pass. Calling it again without new input
/// changes nothing.
pub fn prune_observations(
    doc: &mut ClinicalDocument,
    rules: &CompiledRules,
    config: &LckbConfig,
    now: DateTime<Utc>,
) -> PruneReport {
    let mut report = PruneReport {
        invalidated: invalidate_satisfied_absences(doc, rules),
        ..PruneReport::default()
    };
    report.superseded += supersede_stale_topics(doc, rules, config, now);
    report.superseded += enforce_active_cap(doc, config.max_active_observations);
    report.removed = drop_old_inactive(doc, config.inactive_retention);

    if !report.is_noop() {
        debug!(
            invalidated = report.invalidated,
            superseded = report.superseded,
            removed = report.removed,
            "observations pruned"
        );
    }
    report
}

/// Whether the data an absence statement says is missing now exists.
fn absence_satisfied(doc: &ClinicalDocument, text: &str, rules: &CompiledRules) -> bool {
    let analytes = rules.named_analytes(text);
    if !analytes.is_empty() {
        return analytes
            .iter()
            .any(|analyte| doc.longitudinal.has_lab_values(analyte));
    }
    let vitals = rules.mentions_vitals(text);
    let labs = rules.mentions_labs(text);
    match (vitals, labs) {
        (true, false) => !doc.longitudinal.vitals.is_empty(),
        (false, true) => doc.longitudinal.has_labs(),
        _ => doc.has_clinical_data(),
    }
}

fn invalidate_satisfied_absences(doc: &mut ClinicalDocument, rules: &CompiledRules) -> usize {
    let stale: Vec<String> = doc
        .session
        .active_observations()
        .filter(|o| rules.asserts_absence(&o.text) && absence_satisfied(doc, &o.text, rules))
        .map(|o| o.id.clone())
        .collect();

    for id in &stale {
        if let Some(observation) = doc.session.observation_mut(id) {
            observation.status = ObservationStatus::Invalidated;
        }
    }
    stale.len()
}

fn supersede_stale_topics(
    doc: &mut ClinicalDocument,
    rules: &CompiledRules,
    config: &LckbConfig,
    now: DateTime<Utc>,
) -> usize {
    let cutoff = now - Duration::hours(config.supersede_after_hours);
    let active: Vec<(String, String, DateTime<Utc>)> = doc
        .session
        .active_observations()
        .map(|o| (o.id.clone(), o.text.clone(), o.timestamp))
        .collect();

    let mut replacements = Vec::new();
    for (id, text, timestamp) in &active {
        if *timestamp >= cutoff {
            continue;
        }
        let newest = active
            .iter()
            .filter(|(other_id, other_text, other_ts)| {
                other_id != id && other_ts > timestamp && rules.share_topic(text, other_text)
            })
            .max_by_key(|(_, _, other_ts)| *other_ts);
        if let Some((newer_id, _, _)) = newest {
            replacements.push((id.clone(), newer_id.clone()));
        }
    }

    for (id, newer_id) in &replacements {
        if let Some(observation) = doc.session.observation_mut(id) {
            observation.status = ObservationStatus::Superseded;
            observation.superseded_by = Some(newer_id.clone());
        }
    }
    replacements.len()
}

fn enforce_active_cap(doc: &mut ClinicalDocument, cap: usize) -> usize {
    let mut active: Vec<(DateTime<Utc>, usize)> = doc
        .session
        .ai_observations
        .iter()
        .enumerate()
        .filter(|(_, o)| o.is_active())
        .map(|(index, o)| (o.timestamp, index))
        .collect();
    if active.len() <= cap {
        return 0;
    }
    active.sort();
    let excess = active.len() - cap;
    for (_, index) in active.into_iter().take(excess) {
        doc.session.ai_observations[index].status = ObservationStatus::Superseded;
    }
    excess
}

fn drop_old_inactive(doc: &mut ClinicalDocument, retention: usize) -> usize {
    let mut inactive: Vec<(DateTime<Utc>, String)> = doc
        .session
        .ai_observations
        .iter()
        .filter(|o| !o.is_active())
        .map(|o| (o.timestamp, o.id.clone()))
        .collect();
    if inactive.len() <= retention {
        return 0;
    }
    inactive.sort_by(|a, b| b.0.cmp(&a.0));
    let doomed: Vec<String> = inactive
        .into_iter()
        .skip(retention)
        .map(|(_, id)| id)
        .collect();
    doc.session
        .ai_observations
        .retain(|o| o.is_active() || !doomed.contains(&o.id));
    doomed.len()
}

/// Relevance of the finding at `index`.
pub fn finding_score(
    finding: &str,
    index: usize,
    problems: &ProblemMatrix,
    rules: &CompiledRules,
) -> f64 {
    let mut score = 0.5 * index as f64 + rules.keyword_weight(finding);
    if rules.asserts_absence(finding) {
        score += rules.rules().no_data_finding_penalty;
    }
    let key = normalize(finding);
    if problems.problems.values().any(|p| normalize(&p.name) == key) {
        score += rules.rules().problem_duplicate_penalty;
    }
    score
}

/// Keeps the `max` highest scoring findings; survivors keep insertion order.
pub fn prune_key_findings(
    findings: &mut Vec<String>,
    problems: &ProblemMatrix,
    rules: &CompiledRules,
    max: usize,
) -> usize {
    if findings.len() <= max {
        return 0;
    }
    let mut ranked: Vec<(usize, f64)> = findings
        .iter()
        .enumerate()
        .map(|(index, finding)| (index, finding_score(finding, index, problems, rules)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(b.0.cmp(&a.0)));
    let mut keep: Vec<usize> = ranked.into_iter().take(max).map(|(index, _)| index).collect();
    keep.sort_unstable();

    let before = findings.len();
    let mut index = 0;
    findings.retain(|_| {
        let kept = keep.binary_search(&index).is_ok();
        index += 1;
        kept
    });
    before - findings.len()
}
