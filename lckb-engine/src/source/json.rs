use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::warn;

use super::{ChartData, ChartSource, SourceError};
use crate::events::{
    parse_encounter, parse_lab_panel, parse_medication_change, parse_nursing_note, parse_problem,
    parse_vitals,
};

/// One `<patient_id>.json` chart file per patient under `root`.
#[derive(Debug, Clone)]
pub struct JsonDirectorySource {
    root: PathBuf,
}

impl JsonDirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn chart_path(&self, patient_id: &str) -> Option<PathBuf> {
        let valid = !patient_id.is_empty()
            && patient_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            && !patient_id.starts_with('.');
        valid.then(|| self.root.join(format!("{patient_id}.json")))
    }
}

impl ChartSource for JsonDirectorySource {
    fn fetch_chart(&self, patient_id: &str) -> Result<ChartData, SourceError> {
        let path = self
            .chart_path(patient_id)
            .ok_or_else(|| SourceError::NotFound(patient_id.to_string()))?;
        if !path.exists() {
            return Err(SourceError::NotFound(patient_id.to_string()));
        }
        let text = fs::read_to_string(&path).map_err(|source| SourceError::Io {
            path: path.clone(),
            source,
        })?;
        let value: Value = serde_json::from_str(&text)
            .map_err(|err| SourceError::Malformed(format!("{}: {err}", path.display())))?;
        chart_from_value(&value)
    }
}

fn section<'a>(value: &'a Value, keys: &[&str]) -> &'a [Value] {
    keys.iter()
        .find_map(|key| value.get(*key).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Collects the records of one section, skipping those that fail to parse.
fn collect<T>(
    value: &Value,
    keys: &[&str],
    parse: impl Fn(&Value) -> lckb_core::LckbResult<T>,
) -> Vec<T> {
    section(value, keys)
        .iter()
        .filter_map(|record| match parse(record) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                warn!(section = keys[0], error = %err, "skipping chart record");
                None
            }
        })
        .collect()
}

/// Reads a loosely shaped chart document.
pub fn chart_from_value(value: &Value) -> Result<ChartData, SourceError> {
    if !value.is_object() {
        return Err(SourceError::Malformed(
            "chart must be a JSON object".to_string(),
        ));
    }
    Ok(ChartData {
        problems: collect(value, &["problems"], parse_problem),
        vitals: collect(value, &["vitals"], parse_vitals),
        lab_panels: collect(value, &["lab_panels", "labs"], parse_lab_panel),
        encounters: collect(value, &["encounters"], parse_encounter),
        nursing_notes: collect(value, &["nursing_notes", "notes"], parse_nursing_note),
        medication_changes: collect(
            value,
            &["medication_changes", "medications"],
            parse_medication_change,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn malformed_records_are_skipped() {
        let chart = chart_from_value(&json!({
            "problems": [{"id": "p-1", "name": "Sepsis"}, {"name": "no id"}],
            "vitals": [{"timestamp": "2024-03-05T08:00:00Z", "hr": 101}, {"hr": 80}],
            "labs": [{"timestamp": "2024-03-05T06:00:00Z", "results": [{"name": "Lactate", "value": 3.1}]}]
        }))
        .unwrap();
        assert_eq!(chart.problems.len(), 1);
        assert_eq!(chart.vitals.len(), 1);
        assert_eq!(chart.lab_panels[0].results.len(), 1);
        assert!(chart.nursing_notes.is_empty());
    }

    #[test]
    fn directory_source_reads_patient_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("pt-7.json"),
            r#"{"problems": [{"id": "p-1", "name": "CHF"}]}"#,
        )
        .unwrap();
        let source = JsonDirectorySource::new(dir.path());
        assert_eq!(source.fetch_chart("pt-7").unwrap().problems[0].name, "CHF");
        assert!(matches!(source.fetch_chart("pt-8"), Err(SourceError::NotFound(_))));
        assert!(matches!(source.fetch_chart("../pt-7"), Err(SourceError::NotFound(_))));
    }
}
