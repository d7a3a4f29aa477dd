//! Incremental ingestion into a `ClinicalDocument`.
//!
//! Every operation is synchronous, performs no I/O and bumps
//! `metadata.last_updated`. Duplicate input is reported as
//! [`Insertion::DuplicateIgnored`] rather than as an error.

use std::ops::AddAssign;

use chrono::{DateTime, Utc};
use lckb_core::text::{same_text, truncate_chars};
use lckb_core::{
    ClinicalDocument, ConditionTrend, ConversationMessage, DictationEntry, Insertion, LabPanel,
    LckbConfig, MedicationChange, MessageRole, NursingNote, Observation, ObservationStatus,
    PendingDecision, SafetyFlag, Severity, TimelineNote, Upsert, VitalsReading,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::alerts::{lab_flags, vital_flags};
use crate::conflict::{self, ItemSource, NewItem};
use crate::events::ClinicalEvent;
use crate::extract::{patient_statements, sentences};
use crate::prune::{prune_key_findings, prune_observations};
use crate::rules::CompiledRules;

/// Counts of what one ingestion call changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub records: usize,
    pub flags: usize,
    pub conflicts: usize,
}

impl AddAssign for IngestReport {
    fn add_assign(&mut self, other: Self) {
        self.records += other.records;
        self.flags += other.flags;
        self.conflicts += other.conflicts;
    }
}

/// Outcome of superseding an observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Supersede {
    /// No active observation has that id.
    Missing,
    Superseded { replacement: Option<String> },
}

#[derive(Debug, Clone)]
pub struct DocumentUpdater {
    config: LckbConfig,
    rules: CompiledRules,
    pinned_now: Option<DateTime<Utc>>,
}

impl Default for DocumentUpdater {
    fn default() -> Self {
        Self::new(LckbConfig::default(), CompiledRules::builtin())
    }
}

impl DocumentUpdater {
    pub fn new(config: LckbConfig, rules: CompiledRules) -> Self {
        Self {
            config,
            rules,
            pinned_now: None,
        }
    }

    /// Fixes "now" for replay and tests.
    pub fn with_clock(mut self, now: DateTime<Utc>) -> Self {
        self.pinned_now = Some(now);
        self
    }

    pub fn set_clock(&mut self, now: Option<DateTime<Utc>>) {
        self.pinned_now = now;
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.pinned_now.unwrap_or_else(Utc::now)
    }

    pub fn config(&self) -> &LckbConfig {
        &self.config
    }

    pub fn rules(&self) -> &CompiledRules {
        &self.rules
    }

    fn period(&self, at: DateTime<Utc>) -> String {
        self.config.period_granularity.label(at)
    }

    fn raise_flags(doc: &mut ClinicalDocument, flags: Vec<SafetyFlag>) -> usize {
        let mut raised = 0;
        for flag in flags {
            let text = flag.text.clone();
            if doc.session.add_safety_flag(flag).is_inserted() {
                debug!(flag = %text, "safety flag raised");
                raised += 1;
            }
        }
        raised
    }

    fn run_conflicts(&self, doc: &mut ClinicalDocument, text: &str, source: ItemSource) -> usize {
        let detection = conflict::detect(doc, NewItem::new(text, source), &self.rules);
        if detection.is_empty() {
            return 0;
        }
        conflict::apply(doc, detection, self.now()).len()
    }

    fn record_key_finding(&self, doc: &mut ClinicalDocument, finding: &str) -> bool {
        if !doc.narrative.add_key_finding(finding).is_inserted() {
            return false;
        }
        let dropped = prune_key_findings(
            &mut doc.narrative.key_findings,
            &doc.problem_matrix,
            &self.rules,
            self.config.key_findings_max,
        );
        if dropped > 0 {
            debug!(dropped, "key findings pruned");
        }
        true
    }

    pub fn add_vitals(&self, doc: &mut ClinicalDocument, reading: VitalsReading) -> IngestReport {
        let mut report = IngestReport::default();
        if reading.is_empty() {
            warn!("ignoring vitals reading without measurements");
            return report;
        }
        if doc.longitudinal.insert_vitals(reading.clone()).is_inserted() {
            report.records = 1;
            let period = self.period(reading.timestamp);
            doc.problem_matrix.thread_vitals(&period, &reading);
        }
        report.flags = Self::raise_flags(doc, vital_flags(&reading, &self.rules));
        doc.touch(self.now());
        report
    }

    /// Each result is upserted, threaded, checked against critical thresholds
    /// and fed to conflict detection. Results already on file are skipped.
    pub fn add_lab_results(&self, doc: &mut ClinicalDocument, panel: LabPanel) -> IngestReport {
        let mut report = IngestReport::default();
        for result in &panel.results {
            let inserted = doc.longitudinal.upsert_lab(result).is_inserted();
            report.flags += Self::raise_flags(doc, lab_flags(result, &self.rules));
            if !inserted {
                continue;
            }
            report.records += 1;
            let period = self.period(result.timestamp);
            doc.problem_matrix.thread_lab(&period, result);
            report.conflicts += self.run_conflicts(doc, &result.describe(), ItemSource::LabResult);
        }
        if report.records > 0 {
            debug!(
                panel = panel.name.as_deref().unwrap_or("labs"),
                results = report.records,
                "lab panel ingested"
            );
        }
        doc.touch(self.now());
        report
    }

    pub fn add_nursing_note(&self, doc: &mut ClinicalDocument, note: NursingNote) -> IngestReport {
        let mut report = IngestReport::default();
        if !doc.longitudinal.insert_note(note.clone()).is_inserted() {
            doc.touch(self.now());
            return report;
        }
        report.records = 1;

        let period = self.period(note.timestamp);
        doc.problem_matrix.thread_note(
            &period,
            &TimelineNote {
                timestamp: note.timestamp,
                source: "nursing_note".to_string(),
                text: note.text.clone(),
            },
        );

        let is_latest = doc
            .longitudinal
            .nursing_notes
            .last()
            .is_some_and(|latest| latest.timestamp <= note.timestamp);
        if is_latest {
            doc.narrative.nursing_assessment = Some(note.text.trim().to_string());
        }

        for statement in patient_statements(&note.text) {
            let _ = doc
                .narrative
                .add_patient_voice(&statement, self.config.patient_voice_cap);
        }
        for sentence in sentences(&note.text) {
            if self.rules.is_concern(&sentence) {
                self.record_key_finding(doc, &sentence);
            }
        }

        report.conflicts = self.run_conflicts(doc, &note.text, ItemSource::NursingNote);
        doc.touch(self.now());
        report
    }

    pub fn add_doctor_dictation(
        &self,
        doc: &mut ClinicalDocument,
        entry: DictationEntry,
    ) -> IngestReport {
        let text = entry.text.trim().to_string();
        if text.is_empty() {
            return IngestReport::default();
        }
        let conflicts = self.run_conflicts(doc, &text, ItemSource::Dictation);
        doc.session.add_dictation(
            DictationEntry {
                timestamp: entry.timestamp,
                text: text.clone(),
            },
            self.config.dictation_cap,
        );
        if self.rules.is_assessment(&text) {
            let finding = truncate_chars(&text, self.config.dictation_finding_chars);
            self.record_key_finding(doc, &finding);
        }
        doc.touch(self.now());
        IngestReport {
            records: 1,
            flags: 0,
            conflicts,
        }
    }

    pub fn add_medication_change(
        &self,
        doc: &mut ClinicalDocument,
        change: MedicationChange,
    ) -> Insertion {
        let outcome = doc.longitudinal.insert_medication_change(change);
        doc.touch(self.now());
        outcome
    }

    pub fn add_safety_flag(
        &self,
        doc: &mut ClinicalDocument,
        text: &str,
        severity: Severity,
    ) -> Insertion {
        let text = text.trim();
        if text.is_empty() {
            return Insertion::DuplicateIgnored;
        }
        let outcome = doc.session.add_safety_flag(SafetyFlag {
            text: text.to_string(),
            severity,
            timestamp: self.now(),
        });
        doc.touch(self.now());
        outcome
    }

    pub fn remove_safety_flag(&self, doc: &mut ClinicalDocument, text: &str) -> bool {
        let removed = doc.session.remove_safety_flag(text);
        doc.touch(self.now());
        removed
    }

    pub fn mark_reviewed(&self, doc: &mut ClinicalDocument, item: &str) -> Insertion {
        let outcome = doc.session.mark_reviewed(item);
        doc.touch(self.now());
        outcome
    }

    pub fn add_pending_item(&self, doc: &mut ClinicalDocument, item: &str) -> Insertion {
        let outcome = doc.session.add_pending_item(item);
        doc.touch(self.now());
        outcome
    }

    pub fn remove_pending_item(&self, doc: &mut ClinicalDocument, item: &str) -> bool {
        let removed = doc.session.remove_pending_item(item);
        doc.touch(self.now());
        removed
    }

    /// Nurse turns run conflict detection before joining the window.
    pub fn add_nurse_message(
        &self,
        doc: &mut ClinicalDocument,
        text: &str,
        at: Option<DateTime<Utc>>,
    ) -> IngestReport {
        let text = text.trim();
        if text.is_empty() {
            return IngestReport::default();
        }
        let conflicts = self.run_conflicts(doc, text, ItemSource::NurseMessage);
        doc.session.nurse_conversation.push(
            ConversationMessage {
                role: MessageRole::Nurse,
                text: text.to_string(),
                timestamp: at.unwrap_or_else(|| self.now()),
            },
            self.config.conversation_window,
        );
        doc.touch(self.now());
        IngestReport {
            records: 1,
            flags: 0,
            conflicts,
        }
    }

    pub fn add_patient_message(
        &self,
        doc: &mut ClinicalDocument,
        text: &str,
        at: Option<DateTime<Utc>>,
    ) -> IngestReport {
        let text = text.trim();
        if text.is_empty() {
            return IngestReport::default();
        }
        doc.session.patient_conversation.push(
            ConversationMessage {
                role: MessageRole::Patient,
                text: text.to_string(),
                timestamp: at.unwrap_or_else(|| self.now()),
            },
            self.config.conversation_window,
        );
        doc.touch(self.now());
        IngestReport {
            records: 1,
            ..IngestReport::default()
        }
    }

    /// Records an AI observation unless an active one already says the same
    /// thing. Returns the new observation id.
    pub fn add_ai_observation(
        &self,
        doc: &mut ClinicalDocument,
        text: &str,
        category: Option<&str>,
    ) -> Insertion<String> {
        let text = text.trim();
        if text.is_empty() || doc.session.find_active_observation(text).is_some() {
            return Insertion::DuplicateIgnored;
        }

        let now = self.now();
        let item = NewItem::new(text, ItemSource::Observation);
        let detection = conflict::detect(doc, item, &self.rules);
        let contradicted = detection.new_item_contradicted;
        conflict::apply(doc, detection, now);

        let id = doc.mint_id("obs");
        doc.session.ai_observations.push(Observation {
            id: id.clone(),
            text: text.to_string(),
            timestamp: now,
            status: if contradicted {
                ObservationStatus::Invalidated
            } else {
                ObservationStatus::Active
            },
            superseded_by: None,
            category: category.map(str::to_string),
            version: 1,
        });
        debug!(observation = %id, contradicted, "observation recorded");

        prune_observations(doc, &self.rules, &self.config, now);
        doc.touch(now);
        Insertion::Inserted(id)
    }

    /// Marks `old_id` superseded, optionally linking a replacement whose
    /// version is one past the old entry's. A replacement that repeats another
    /// active observation links to that entry instead of adding a copy.
    pub fn supersede_observation(
        &self,
        doc: &mut ClinicalDocument,
        old_id: &str,
        new_text: Option<&str>,
        category: Option<&str>,
    ) -> Supersede {
        let now = self.now();
        let Some((version, old_category)) = doc
            .session
            .observation(old_id)
            .filter(|o| o.is_active())
            .map(|o| (o.version, o.category.clone()))
        else {
            return Supersede::Missing;
        };

        let replacement = new_text
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(|text| {
                let existing = doc
                    .session
                    .find_active_observation(text)
                    .filter(|o| o.id != old_id)
                    .map(|o| o.id.clone());
                if let Some(id) = existing {
                    debug!(observation = %id, "replacement already active");
                    return id;
                }
                let id = doc.mint_id("obs");
                doc.session.ai_observations.push(Observation {
                    id: id.clone(),
                    text: text.to_string(),
                    timestamp: now,
                    status: ObservationStatus::Active,
                    superseded_by: None,
                    category: category.map(str::to_string).or(old_category),
                    version: version + 1,
                });
                id
            });

        if let Some(old) = doc.session.observation_mut(old_id) {
            old.status = ObservationStatus::Superseded;
            old.superseded_by = replacement.clone();
        }
        if replacement.is_some() {
            prune_observations(doc, &self.rules, &self.config, now);
        }
        doc.touch(now);
        Supersede::Superseded { replacement }
    }

    pub fn add_pending_decision(
        &self,
        doc: &mut ClinicalDocument,
        text: &str,
        raised_by: Option<&str>,
    ) -> Insertion<String> {
        let text = text.trim();
        let open = doc
            .session
            .active_state
            .unresolved_decisions()
            .any(|d| same_text(&d.text, text));
        if text.is_empty() || open {
            return Insertion::DuplicateIgnored;
        }
        let id = doc.mint_id("dec");
        let outcome = doc.session.active_state.add_pending_decision(PendingDecision {
            id,
            text: text.to_string(),
            raised_by: raised_by.map(str::to_string),
            raised_at: self.now(),
            resolved_at: None,
            resolution: None,
        });
        doc.touch(self.now());
        outcome
    }

    pub fn resolve_pending_decision(
        &self,
        doc: &mut ClinicalDocument,
        id: &str,
        resolution: &str,
    ) -> bool {
        let now = self.now();
        let resolved = doc
            .session
            .active_state
            .resolve_pending_decision(id, resolution, now);
        doc.touch(now);
        resolved
    }

    pub fn add_active_condition(
        &self,
        doc: &mut ClinicalDocument,
        text: &str,
        trend: ConditionTrend,
    ) -> Option<Upsert> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let now = self.now();
        let outcome = doc
            .session
            .active_state
            .upsert_active_condition(text, trend, now);
        doc.touch(now);
        Some(outcome)
    }

    pub fn add_background_fact(&self, doc: &mut ClinicalDocument, text: &str) -> Insertion {
        let text = text.trim();
        if text.is_empty() {
            return Insertion::DuplicateIgnored;
        }
        let now = self.now();
        let outcome = doc.session.active_state.add_background_fact(text, now);
        doc.touch(now);
        outcome
    }

    pub fn resolve_conflict(&self, doc: &mut ClinicalDocument, id: &str, resolution: &str) -> bool {
        let now = self.now();
        let resolved = doc.session.resolve_conflict(id, resolution, now);
        doc.touch(now);
        resolved
    }

    pub fn apply_event(&self, doc: &mut ClinicalDocument, event: ClinicalEvent) -> IngestReport {
        debug!(kind = event.kind(), "applying event");
        match event {
            ClinicalEvent::Vitals(reading) => self.add_vitals(doc, reading),
            ClinicalEvent::LabPanel(panel) => self.add_lab_results(doc, panel),
            ClinicalEvent::NursingNote(note) => self.add_nursing_note(doc, note),
            ClinicalEvent::Dictation(entry) => self.add_doctor_dictation(doc, entry),
            ClinicalEvent::MedicationChange(change) => IngestReport {
                records: usize::from(self.add_medication_change(doc, change).is_inserted()),
                ..IngestReport::default()
            },
            ClinicalEvent::SafetyFlag(flag) => {
                let flags = Self::raise_flags(doc, vec![flag]);
                doc.touch(self.now());
                IngestReport {
                    flags,
                    ..IngestReport::default()
                }
            }
            ClinicalEvent::NurseMessage(message) => {
                self.add_nurse_message(doc, &message.text, Some(message.timestamp))
            }
            ClinicalEvent::PatientMessage(message) => {
                self.add_patient_message(doc, &message.text, Some(message.timestamp))
            }
        }
    }

    /// Operator "clear memory": problems and longitudinal data survive.
    pub fn reset(&self, doc: &mut ClinicalDocument) {
        doc.reset_memory(self.now());
        info!(patient = doc.patient_id(), "session memory cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use lckb_core::{LabResult, Problem, Tier, VitalField};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap()
    }

    fn updater() -> DocumentUpdater {
        DocumentUpdater::default().with_clock(t0())
    }

    fn lab(name: &str, value: f64, unit: &str) -> LabResult {
        LabResult {
            name: name.to_string(),
            value,
            unit: Some(unit.to_string()),
            timestamp: t0(),
            flag: None,
            reference_range: None,
        }
    }

    fn unitless(name: &str, value: f64) -> LabResult {
        LabResult {
            unit: None,
            ..lab(name, value, "")
        }
    }

    #[test]
    fn any_lab_result_invalidates_lab_absence() {
        let up = updater();
        for result in [
            lab("BNP", 450.0, "pg/mL"),
            unitless("WBC", 12.0),
            lab("CRP", 80.0, "mg/L"),
        ] {
            let mut doc = ClinicalDocument::create("pt-1", t0());
            let id = up
                .add_ai_observation(&mut doc, "No labs available yet", None)
                .inserted()
                .unwrap();
            let name = result.name.clone();
            let report = up.add_lab_results(
                &mut doc,
                LabPanel {
                    name: None,
                    timestamp: t0(),
                    results: vec![result],
                },
            );
            assert_eq!(report.records, 1, "{name}");
            assert_eq!(
                doc.session.observation(&id).map(|o| o.status),
                Some(ObservationStatus::Invalidated),
                "{name}"
            );
        }
    }

    #[test]
    fn lookalike_lab_names_are_not_critical() {
        let up = updater();
        let mut doc = ClinicalDocument::create("pt-1", t0());
        let report = up.add_lab_results(
            &mut doc,
            LabPanel {
                name: None,
                timestamp: t0(),
                results: vec![
                    lab("Creatine kinase", 12000.0, "U/L"),
                    lab("CK", 9000.0, "U/L"),
                    lab("Vitamin K", 0.1, "ng/mL"),
                ],
            },
        );
        assert_eq!(report.records, 3);
        assert_eq!(report.flags, 0);
        assert!(doc.session.safety_flags.is_empty());
    }

    #[test]
    fn critical_potassium_raises_one_flag() {
        let up = updater();
        let mut doc = ClinicalDocument::create("pt-1", t0());
        let panel = LabPanel {
            name: Some("BMP".to_string()),
            timestamp: t0(),
            results: vec![lab("Potassium", 7.0, "mEq/L"), lab("Sodium", 138.0, "mEq/L")],
        };
        let report = up.add_lab_results(&mut doc, panel.clone());
        assert_eq!(report.records, 2);
        assert_eq!(report.flags, 1);
        assert!(doc.session.safety_flags[0]
            .text
            .contains("CRITICAL HIGH Potassium: 7 mEq/L"));

        let again = up.add_lab_results(&mut doc, panel);
        assert_eq!(again, IngestReport::default());
        assert_eq!(doc.session.safety_flags.len(), 1);
    }

    #[test]
    fn vitals_thread_into_related_problems() {
        let up = updater();
        let mut doc = ClinicalDocument::create("pt-1", t0());
        let mut sepsis = Problem::new("p-sepsis", "Sepsis");
        sepsis.related_vital_fields = vec![VitalField::HeartRate, VitalField::Temperature];
        let _ = doc.problem_matrix.upsert_problem(sepsis);

        let reading = VitalsReading {
            timestamp: t0(),
            heart_rate: Some(128.0),
            systolic: Some(110.0),
            ..VitalsReading::default()
        };
        let report = up.add_vitals(&mut doc, reading);
        assert_eq!(report.records, 1);
        assert_eq!(report.flags, 1);

        let bucket = &doc.problem_matrix.timelines["p-sepsis"].periods["2024-03-05"];
        assert_eq!(bucket.vitals.len(), 1);
        assert_eq!(bucket.vitals[0].values.len(), 1);
        assert_eq!(doc.longitudinal.vital_trends["heart_rate"].len(), 1);
    }

    #[test]
    fn nursing_note_feeds_narrative() {
        let up = updater();
        let mut doc = ClinicalDocument::create("pt-1", t0());
        let _ = doc.problem_matrix.upsert_problem(Problem::new("p-1", "Pneumonia"));
        let note = NursingNote {
            timestamp: t0(),
            author: Some("RN Le".to_string()),
            text: "Pneumonia care ongoing. New onset confusion overnight. Patient states \"I feel dizzy\".".to_string(),
        };
        let report = up.add_nursing_note(&mut doc, note.clone());
        assert_eq!(report.records, 1);
        assert_eq!(doc.narrative.nursing_assessment.as_deref(), Some(note.text.as_str()));
        assert_eq!(doc.narrative.key_findings, vec!["New onset confusion overnight".to_string()]);
        assert_eq!(doc.narrative.patient_voice[0], "I feel dizzy");
        assert_eq!(doc.problem_matrix.timelines["p-1"].entry_count(), 1);

        assert_eq!(up.add_nursing_note(&mut doc, note), IngestReport::default());
    }

    #[test]
    fn dictation_mirrors_assessment_into_findings() {
        let up = updater();
        let mut doc = ClinicalDocument::create("pt-1", t0());
        let long = format!("Assessment: {}", "volume overload ".repeat(20));
        up.add_doctor_dictation(
            &mut doc,
            DictationEntry {
                timestamp: t0(),
                text: long,
            },
        );
        up.add_doctor_dictation(
            &mut doc,
            DictationEntry {
                timestamp: t0(),
                text: "Family at bedside".to_string(),
            },
        );
        assert_eq!(doc.session.doctor_dictation.len(), 2);
        assert_eq!(doc.narrative.key_findings.len(), 1);
        assert!(doc.narrative.key_findings[0].ends_with("..."));
        assert_eq!(doc.narrative.key_findings[0].chars().count(), 203);
    }

    #[test]
    fn absence_observation_is_invalidated_by_labs() {
        let up = updater();
        let mut doc = ClinicalDocument::create("pt-1", t0());
        let id = up
            .add_ai_observation(&mut doc, "No labs available yet", Some("data"))
            .inserted()
            .unwrap();
        assert!(!up
            .add_ai_observation(&mut doc, "  no labs AVAILABLE yet ", None)
            .is_inserted());

        up.add_lab_results(
            &mut doc,
            LabPanel {
                name: None,
                timestamp: t0(),
                results: vec![lab("Lactate", 1.8, "mmol/L")],
            },
        );
        assert_eq!(
            doc.session.observation(&id).unwrap().status,
            ObservationStatus::Invalidated
        );
        assert_eq!(doc.session.active_observations().count(), 0);
    }

    #[test]
    fn anticoagulation_conflict_raises_flag() {
        let up = updater();
        let mut doc = ClinicalDocument::create("pt-1", t0());
        let _ = up.add_ai_observation(&mut doc, "GI bleed, anticoagulation contraindicated", None);
        let report = up.add_doctor_dictation(
            &mut doc,
            DictationEntry {
                timestamp: t0(),
                text: "Plan: start anticoagulation for new AF".to_string(),
            },
        );
        assert_eq!(report.conflicts, 1);
        assert_eq!(doc.session.conflicts[0].severity, Severity::Critical);
        assert!(doc
            .session
            .safety_flags
            .iter()
            .any(|f| f.text.starts_with("CONTRAINDICATION:")));

        let conflict_id = doc.session.conflicts[0].id.clone();
        assert!(up.resolve_conflict(&mut doc, &conflict_id, "GI consulted, hold"));
        assert!(doc.session.unresolved_conflicts().next().is_none());
    }

    #[test]
    fn supersede_links_replacement() {
        let up = updater();
        let mut doc = ClinicalDocument::create("pt-1", t0());
        let old = up
            .add_ai_observation(&mut doc, "Volume status unclear", Some("fluids"))
            .inserted()
            .unwrap();
        let Supersede::Superseded { replacement: Some(new_id) } =
            up.supersede_observation(&mut doc, &old, Some("Hypervolemic on exam"), None)
        else {
            panic!("expected replacement");
        };
        let old_entry = doc.session.observation(&old).unwrap();
        assert_eq!(old_entry.superseded_by.as_deref(), Some(new_id.as_str()));
        let new_entry = doc.session.observation(&new_id).unwrap();
        assert_eq!(new_entry.version, 2);
        assert_eq!(new_entry.category.as_deref(), Some("fluids"));
        assert_eq!(
            up.supersede_observation(&mut doc, &old, None, None),
            Supersede::Missing
        );
    }

    #[test]
    fn supersede_reuses_identical_active_observation() {
        let up = updater();
        let mut doc = ClinicalDocument::create("pt-1", t0());
        let old = up
            .add_ai_observation(&mut doc, "Volume status unclear", None)
            .inserted()
            .unwrap();
        let kept = up
            .add_ai_observation(&mut doc, "Hypervolemic on exam", None)
            .inserted()
            .unwrap();
        let sequence = doc.metadata.id_sequence;

        let outcome =
            up.supersede_observation(&mut doc, &old, Some("hypervolemic on exam"), None);
        assert_eq!(
            outcome,
            Supersede::Superseded {
                replacement: Some(kept.clone())
            }
        );
        assert_eq!(doc.metadata.id_sequence, sequence);
        let active: Vec<&str> = doc
            .session
            .active_observations()
            .map(|o| o.id.as_str())
            .collect();
        assert_eq!(active, vec![kept.as_str()]);
    }

    #[test]
    fn tiers_stay_mutually_exclusive() {
        let up = updater();
        let mut doc = ClinicalDocument::create("pt-1", t0());
        let id = up
            .add_pending_decision(&mut doc, "Start diuresis?", Some("ai"))
            .inserted()
            .unwrap();
        assert!(!up.add_pending_decision(&mut doc, "start diuresis?", None).is_inserted());
        assert_eq!(
            up.add_active_condition(&mut doc, "Start diuresis?", ConditionTrend::New),
            Some(Upsert::Created)
        );
        assert_eq!(
            doc.session.active_state.tier_of("start diuresis?"),
            Some(Tier::ActiveCondition)
        );
        assert!(!up.resolve_pending_decision(&mut doc, &id, "yes"));
    }

    #[test]
    fn reset_keeps_chart_data() {
        let later = t0() + Duration::hours(1);
        let up = DocumentUpdater::default().with_clock(later);
        let mut doc = ClinicalDocument::create("pt-1", t0());
        up.add_lab_results(
            &mut doc,
            LabPanel {
                name: None,
                timestamp: t0(),
                results: vec![lab("Sodium", 140.0, "mEq/L")],
            },
        );
        let _ = up.add_safety_flag(&mut doc, "Fall risk", Severity::Warning);
        let _ = up.mark_reviewed(&mut doc, "labs");
        up.reset(&mut doc);
        assert!(doc.session.safety_flags.is_empty());
        assert!(doc.session.reviewed_items.is_empty());
        assert!(doc.longitudinal.has_labs());
        assert_eq!(doc.metadata.last_updated, later);
    }
}
