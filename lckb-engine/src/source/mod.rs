//! Chart data sources: where a full build reads the patient's record from.

mod fhir;
mod json;
mod memory;

pub use fhir::{chart_from_bundle, chart_from_bundle_str, FhirBundleSource};
pub use json::{chart_from_value, JsonDirectorySource};
pub use memory::MemorySource;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use lckb_core::{
    Encounter, LabPanel, LckbError, MedicationChange, NursingNote, Problem, VitalsReading,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("no chart for patient {0}")]
    NotFound(String),
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed chart: {0}")]
    Malformed(String),
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

impl From<SourceError> for LckbError {
    fn from(err: SourceError) -> Self {
        LckbError::SourceUnavailable(err.to_string())
    }
}

/// Everything a source knows about one patient.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartData {
    pub problems: Vec<Problem>,
    pub vitals: Vec<VitalsReading>,
    pub lab_panels: Vec<LabPanel>,
    pub encounters: Vec<Encounter>,
    pub nursing_notes: Vec<NursingNote>,
    pub medication_changes: Vec<MedicationChange>,
}

impl ChartData {
    /// Latest timestamp carried by any timed record.
    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        let vitals = self.vitals.iter().map(|v| v.timestamp);
        let labs = self.lab_panels.iter().flat_map(|p| {
            std::iter::once(p.timestamp).chain(p.results.iter().map(|r| r.timestamp))
        });
        let notes = self.nursing_notes.iter().map(|n| n.timestamp);
        let meds = self.medication_changes.iter().map(|m| m.timestamp);
        vitals.chain(labs).chain(notes).chain(meds).max()
    }

    /// Timed records strictly newer than `cutoff`. Problems and encounters are
    /// kept whole since they merge by id.
    pub fn since(&self, cutoff: DateTime<Utc>) -> ChartData {
        ChartData {
            problems: self.problems.clone(),
            encounters: self.encounters.clone(),
            vitals: self
                .vitals
                .iter()
                .filter(|v| v.timestamp > cutoff)
                .cloned()
                .collect(),
            lab_panels: self
                .lab_panels
                .iter()
                .filter_map(|panel| {
                    let results: Vec<_> = panel
                        .results
                        .iter()
                        .filter(|r| r.timestamp > cutoff)
                        .cloned()
                        .collect();
                    (!results.is_empty()).then(|| LabPanel {
                        name: panel.name.clone(),
                        timestamp: panel.timestamp,
                        results,
                    })
                })
                .collect(),
            nursing_notes: self
                .nursing_notes
                .iter()
                .filter(|n| n.timestamp > cutoff)
                .cloned()
                .collect(),
            medication_changes: self
                .medication_changes
                .iter()
                .filter(|m| m.timestamp > cutoff)
                .cloned()
                .collect(),
        }
    }

    pub fn record_count(&self) -> usize {
        self.problems.len()
            + self.vitals.len()
            + self.lab_panels.iter().map(|p| p.results.len()).sum::<usize>()
            + self.encounters.len()
            + self.nursing_notes.len()
            + self.medication_changes.len()
    }
}

/// Read access to a patient's chart.
pub trait ChartSource: Send + Sync {
    fn fetch_chart(&self, patient_id: &str) -> Result<ChartData, SourceError>;
}
