//! Full builds and incremental refreshes from a chart source.

use chrono::{DateTime, Utc};
use lckb_core::{ClinicalDocument, LckbResult};
use serde::Serialize;
use tracing::{info, warn};

use crate::source::{ChartData, ChartSource};
use crate::updater::DocumentUpdater;

/// What one build or refresh applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdateSummary {
    pub problems: usize,
    pub encounters: usize,
    pub vitals: usize,
    pub lab_results: usize,
    pub nursing_notes: usize,
    pub medication_changes: usize,
    pub flags: usize,
    pub conflicts: usize,
}

impl UpdateSummary {
    pub fn records(&self) -> usize {
        self.problems
            + self.encounters
            + self.vitals
            + self.lab_results
            + self.nursing_notes
            + self.medication_changes
    }

    pub fn is_empty(&self) -> bool {
        self.records() == 0 && self.flags == 0 && self.conflicts == 0
    }
}

pub struct DocumentBuilder<'a> {
    source: &'a dyn ChartSource,
    updater: &'a DocumentUpdater,
}

impl<'a> DocumentBuilder<'a> {
    pub fn new(source: &'a dyn ChartSource, updater: &'a DocumentUpdater) -> Self {
        Self { source, updater }
    }

    /// Reads the chart once and replays every record through the updater.
    pub fn build_full(&self, patient_id: &str) -> LckbResult<ClinicalDocument> {
        let chart = self.source.fetch_chart(patient_id)?;
        let now = self.updater.now();
        let mut doc = ClinicalDocument::create(patient_id, now);
        let summary = apply_chart(self.updater, &mut doc, chart);
        doc.ai_memory.last_full_ingestion = Some(now);
        info!(
            patient = patient_id,
            records = summary.records(),
            flags = summary.flags,
            conflicts = summary.conflicts,
            "document built"
        );
        Ok(doc)
    }

    /// Like [`build_full`](Self::build_full) but degrades to an empty document
    /// when the source fails.
    pub fn build_or_empty(&self, patient_id: &str) -> ClinicalDocument {
        match self.build_full(patient_id) {
            Ok(doc) => doc,
            Err(err) => {
                warn!(patient = patient_id, error = %err, "chart unavailable, starting empty");
                ClinicalDocument::create(patient_id, self.updater.now())
            }
        }
    }

    /// Applies records strictly newer than `since`. The batch is staged on a
    /// copy; `doc` is replaced only once the whole batch is applied, and left
    /// untouched when the fetch fails.
    pub fn update_since(
        &self,
        doc: &mut ClinicalDocument,
        since: DateTime<Utc>,
    ) -> LckbResult<UpdateSummary> {
        let chart = self.source.fetch_chart(doc.patient_id())?;
        let delta = chart.since(since);
        let mut staged = doc.clone();
        let summary = apply_chart(self.updater, &mut staged, delta);
        *doc = staged;
        info!(
            patient = doc.patient_id(),
            since = %since,
            records = summary.records(),
            "document refreshed"
        );
        Ok(summary)
    }

    /// Refreshes from the document's own load watermark, or from scratch when
    /// nothing has been loaded yet.
    pub fn refresh(&self, doc: &mut ClinicalDocument) -> LckbResult<UpdateSummary> {
        let since = doc
            .metadata
            .last_loaded_timestamp
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.update_since(doc, since)
    }
}

/// Routes every chart record through the updater's ingestion paths.
pub fn apply_chart(
    updater: &DocumentUpdater,
    doc: &mut ClinicalDocument,
    chart: ChartData,
) -> UpdateSummary {
    let mut summary = UpdateSummary::default();
    let watermark = chart.latest_timestamp();
    let ChartData {
        problems,
        mut vitals,
        mut lab_panels,
        encounters,
        mut nursing_notes,
        mut medication_changes,
    } = chart;

    for problem in problems {
        if doc.problem_matrix.upsert_problem(problem).is_inserted() {
            summary.problems += 1;
        }
    }
    for encounter in encounters {
        if doc.longitudinal.upsert_encounter(encounter).is_inserted() {
            summary.encounters += 1;
        }
    }

    vitals.sort_by_key(|v| v.timestamp);
    for reading in vitals {
        let report = updater.add_vitals(doc, reading);
        summary.vitals += report.records;
        summary.flags += report.flags;
    }

    lab_panels.sort_by_key(|p| p.timestamp);
    for panel in lab_panels {
        let report = updater.add_lab_results(doc, panel);
        summary.lab_results += report.records;
        summary.flags += report.flags;
        summary.conflicts += report.conflicts;
    }

    nursing_notes.sort_by_key(|n| n.timestamp);
    for note in nursing_notes {
        let report = updater.add_nursing_note(doc, note);
        summary.nursing_notes += report.records;
        summary.conflicts += report.conflicts;
    }

    medication_changes.sort_by_key(|m| m.timestamp);
    for change in medication_changes {
        if updater.add_medication_change(doc, change).is_inserted() {
            summary.medication_changes += 1;
        }
    }

    if let Some(at) = watermark {
        doc.advance_loaded_watermark(at);
    }
    doc.touch(updater.now());
    summary
}
