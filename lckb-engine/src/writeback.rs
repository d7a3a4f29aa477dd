//! Write-back of reasoning-service output into the document.
//!
//! Payloads are camelCase JSON as produced by the reasoning service.

use std::collections::BTreeMap;

use lckb_core::text::truncate_chars;
use lckb_core::{
    ClinicalDocument, ConditionTrend, ConflictRecord, ConflictRule, InteractionEntry, Severity,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::prune::prune_key_findings;
use crate::updater::{DocumentUpdater, Supersede};

const INTERACTION_SUMMARY_CHARS: usize = 200;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WriteBackResult {
    pub trajectory_assessment: Option<String>,
    pub key_findings: Vec<String>,
    /// Replaces the open questions wholesale when present.
    pub open_questions: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionUpdate {
    pub text: String,
    #[serde(default)]
    pub trend: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResolution {
    pub id: String,
    pub resolution: String,
}

/// Routes items into the three active-state tiers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MemoryClassification {
    pub pending_decisions: Vec<String>,
    pub resolved_decisions: Vec<DecisionResolution>,
    pub active_conditions: Vec<ConditionUpdate>,
    pub background_facts: Vec<String>,
    /// Ids of observations the service considers outdated.
    pub superseded_observations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedConflict {
    pub item_a: String,
    pub item_b: String,
    #[serde(default = "default_conflict_severity")]
    pub severity: Severity,
}

fn default_conflict_severity() -> Severity {
    Severity::Warning
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MemoryUpdate {
    pub patient_summary: Option<String>,
    /// Problem id to insight text.
    pub problem_insights: BTreeMap<String, String>,
    pub interaction_digest: Option<String>,
    pub memory_classification: Option<MemoryClassification>,
    pub detected_conflicts: Vec<DetectedConflict>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryWriteReport {
    pub summary_replaced: bool,
    pub insights: usize,
    pub tier_changes: usize,
    pub superseded: usize,
    pub conflicts: usize,
}

impl DocumentUpdater {
    pub fn write_back(&self, doc: &mut ClinicalDocument, result: &WriteBackResult) {
        if let Some(trajectory) = result
            .trajectory_assessment
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            doc.narrative.trajectory_assessment = Some(trajectory.to_string());
        }

        let added = result
            .key_findings
            .iter()
            .filter(|finding| doc.narrative.add_key_finding(finding).is_inserted())
            .count();
        prune_key_findings(
            &mut doc.narrative.key_findings,
            &doc.problem_matrix,
            self.rules(),
            self.config().key_findings_max,
        );

        if let Some(questions) = &result.open_questions {
            doc.narrative.open_questions = questions
                .iter()
                .map(|q| q.trim())
                .filter(|q| !q.is_empty())
                .map(str::to_string)
                .collect();
        }
        debug!(findings_added = added, "write-back applied");
        doc.touch(self.now());
    }

    pub fn write_back_memory_updates(
        &self,
        doc: &mut ClinicalDocument,
        update: &MemoryUpdate,
        interaction_type: &str,
        input_summary: &str,
    ) -> MemoryWriteReport {
        let now = self.now();
        let mut report = MemoryWriteReport::default();

        if let Some(summary) = update.patient_summary.as_deref() {
            report.summary_replaced = doc.ai_memory.replace_summary(summary);
        }

        for (problem_id, insight) in &update.problem_insights {
            if insight.trim().is_empty() {
                continue;
            }
            doc.ai_memory.set_insight(problem_id, insight, now);
            report.insights += 1;
        }

        let digest = update
            .interaction_digest
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(input_summary);
        doc.ai_memory.log_interaction(
            InteractionEntry {
                kind: interaction_type.to_string(),
                summary: truncate_chars(digest, INTERACTION_SUMMARY_CHARS),
                timestamp: now,
            },
            self.config().interaction_log_cap,
        );

        if let Some(classification) = &update.memory_classification {
            report.tier_changes = self.apply_classification(doc, classification);
            report.superseded = classification
                .superseded_observations
                .iter()
                .filter(|id| {
                    matches!(
                        self.supersede_observation(doc, id, None, None),
                        Supersede::Superseded { .. }
                    )
                })
                .count();
        }

        for detected in &update.detected_conflicts {
            if doc
                .session
                .has_open_conflict(&detected.item_a, &detected.item_b)
            {
                continue;
            }
            let id = doc.mint_id("cfl");
            let logged = doc.session.log_conflict(ConflictRecord {
                id,
                item_a: detected.item_a.clone(),
                item_b: detected.item_b.clone(),
                severity: detected.severity,
                rule: ConflictRule::External,
                detected_at: now,
                resolved_at: None,
                resolution: None,
            });
            if logged.is_inserted() {
                report.conflicts += 1;
            }
        }

        debug!(
            kind = interaction_type,
            summary_replaced = report.summary_replaced,
            tier_changes = report.tier_changes,
            conflicts = report.conflicts,
            "memory updates written back"
        );
        doc.touch(now);
        report
    }

    fn apply_classification(
        &self,
        doc: &mut ClinicalDocument,
        classification: &MemoryClassification,
    ) -> usize {
        let mut changes = 0;
        for text in &classification.pending_decisions {
            if self.add_pending_decision(doc, text, Some("ai")).is_inserted() {
                changes += 1;
            }
        }
        for resolved in &classification.resolved_decisions {
            if self.resolve_pending_decision(doc, &resolved.id, &resolved.resolution) {
                changes += 1;
            }
        }
        for condition in &classification.active_conditions {
            let trend = condition
                .trend
                .as_deref()
                .and_then(ConditionTrend::parse)
                .unwrap_or(ConditionTrend::Stable);
            if self.add_active_condition(doc, &condition.text, trend).is_some() {
                changes += 1;
            }
        }
        for fact in &classification.background_facts {
            if self.add_background_fact(doc, fact).is_inserted() {
                changes += 1;
            }
        }
        changes
    }
}
