use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use super::{ChartData, ChartSource, SourceError};

/// Charts held in memory, keyed by patient id. Can be switched offline to
/// exercise the degraded build path.
#[derive(Debug, Default)]
pub struct MemorySource {
    charts: RwLock<BTreeMap<String, ChartData>>,
    offline: AtomicBool,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chart(self, patient_id: &str, chart: ChartData) -> Self {
        self.insert(patient_id, chart);
        self
    }

    pub fn insert(&self, patient_id: &str, chart: ChartData) {
        let mut charts = match self.charts.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        charts.insert(patient_id.to_string(), chart);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

impl ChartSource for MemorySource {
    fn fetch_chart(&self, patient_id: &str) -> Result<ChartData, SourceError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("memory source offline".to_string()));
        }
        let charts = self
            .charts
            .read()
            .map_err(|_| SourceError::Unavailable("chart lock poisoned".to_string()))?;
        charts
            .get(patient_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(patient_id.to_string()))
    }
}
