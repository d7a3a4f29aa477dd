//! FHIR R4 bundle to `ChartData` adapter.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use lckb_core::text::{format_numeric, tokenize};
use lckb_core::{
    Encounter, LabPanel, LabResult, MedicationAction, MedicationChange, NursingNote, Priority,
    Problem, ProblemStatus, VitalField, VitalsReading,
};
use serde_json::Value;
use tracing::debug;

use super::{ChartData, ChartSource, SourceError};
use crate::fields::parse_datetime;

/// One `<patient_id>.json` FHIR bundle per patient under `root`.
#[derive(Debug, Clone)]
pub struct FhirBundleSource {
    root: PathBuf,
}

impl FhirBundleSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ChartSource for FhirBundleSource {
    fn fetch_chart(&self, patient_id: &str) -> Result<ChartData, SourceError> {
        if patient_id.is_empty()
            || patient_id.contains(['/', '\\'])
            || patient_id.starts_with('.')
        {
            return Err(SourceError::NotFound(patient_id.to_string()));
        }
        let path = self.root.join(format!("{patient_id}.json"));
        if !path.exists() {
            return Err(SourceError::NotFound(patient_id.to_string()));
        }
        let text = fs::read_to_string(&path).map_err(|source| SourceError::Io {
            path: path.clone(),
            source,
        })?;
        chart_from_bundle_str(&text)
    }
}

pub fn chart_from_bundle_str(bundle_json: &str) -> Result<ChartData, SourceError> {
    let value: Value = serde_json::from_str(bundle_json)
        .map_err(|err| SourceError::Malformed(err.to_string()))?;
    chart_from_bundle(&value)
}

/// Maps Condition, Observation, Encounter, DocumentReference and
/// medication resources into chart records. Vital-sign observations sharing a
/// timestamp merge into one reading; lab observations group into panels by
/// timestamp.
pub fn chart_from_bundle(bundle: &Value) -> Result<ChartData, SourceError> {
    let bundle_type = bundle
        .get("resourceType")
        .and_then(Value::as_str)
        .ok_or_else(|| SourceError::Malformed("missing resourceType".to_string()))?;
    if bundle_type != "Bundle" {
        return Err(SourceError::Malformed(format!(
            "expected resourceType Bundle, received {bundle_type}"
        )));
    }
    let entries = bundle
        .get("entry")
        .and_then(Value::as_array)
        .ok_or_else(|| SourceError::Malformed("bundle has no entries".to_string()))?;

    let mut chart = ChartAccumulator::default();
    for entry in entries {
        let Some(resource) = entry.get("resource") else {
            continue;
        };
        match resource
            .get("resourceType")
            .and_then(Value::as_str)
            .unwrap_or_default()
        {
            "Condition" => chart.handle_condition(resource),
            "Observation" => chart.handle_observation(resource),
            "Encounter" => chart.handle_encounter(resource),
            "DocumentReference" | "Composition" => chart.handle_document(resource),
            "MedicationStatement" | "MedicationRequest" => chart.handle_medication(resource),
            _ => {}
        }
    }
    Ok(chart.finish())
}

#[derive(Default)]
struct ChartAccumulator {
    problems: Vec<Problem>,
    vitals: BTreeMap<DateTime<Utc>, VitalsReading>,
    labs: BTreeMap<DateTime<Utc>, Vec<LabResult>>,
    encounters: Vec<Encounter>,
    notes: Vec<NursingNote>,
    medications: Vec<MedicationChange>,
}

impl ChartAccumulator {
    fn handle_condition(&mut self, resource: &Value) {
        let Some(name) = resource.get("code").and_then(extract_codeable_text) else {
            return;
        };
        let mut problem = Problem::new(resource_id(resource, "condition"), name);
        if let Some(status) = extract_status_code(resource.get("clinicalStatus")) {
            problem.status = match status.to_lowercase().as_str() {
                "resolved" | "inactive" | "remission" => ProblemStatus::Resolved,
                _ => ProblemStatus::Active,
            };
        }
        if let Some(severity) = extract_status_code(resource.get("severity")) {
            problem.priority = match severity.to_lowercase().as_str() {
                "severe" => Priority::High,
                "mild" => Priority::Low,
                _ => Priority::Medium,
            };
        }
        problem.onset = resource
            .get("onsetDateTime")
            .or_else(|| resource.get("recordedDate"))
            .and_then(Value::as_str)
            .map(str::to_string);
        self.problems.push(problem);
    }

    fn handle_observation(&mut self, resource: &Value) {
        let name = resource
            .get("code")
            .and_then(extract_codeable_text)
            .unwrap_or_else(|| "Observation".to_string());
        let Some(timestamp) = extract_observation_timestamp(resource) else {
            debug!(observation = %name, "skipping observation without timestamp");
            return;
        };

        if let Some(components) = resource.get("component").and_then(Value::as_array) {
            let reading = self.vitals.entry(timestamp).or_insert_with(|| VitalsReading {
                timestamp,
                ..VitalsReading::default()
            });
            for component in components {
                let Some(field) = component_vital_field(component) else {
                    continue;
                };
                if let Some(value) = component.get("valueQuantity").and_then(quantity_value) {
                    reading.set(field, value);
                }
            }
            return;
        }

        let Some(quantity) = resource.get("valueQuantity") else {
            return;
        };
        let Some(mut value) = quantity_value(quantity) else {
            return;
        };
        let unit = quantity
            .get("unit")
            .or_else(|| quantity.get("code"))
            .and_then(Value::as_str)
            .map(str::to_string);

        if let Some(field) = infer_vital_field(&name, resource) {
            if field == VitalField::Temperature && unit.as_deref().is_some_and(is_celsius) {
                value = value * 9.0 / 5.0 + 32.0;
            }
            self.vitals
                .entry(timestamp)
                .or_insert_with(|| VitalsReading {
                    timestamp,
                    ..VitalsReading::default()
                })
                .set(field, value);
            return;
        }

        if is_lab_observation(&name, resource) {
            self.labs.entry(timestamp).or_default().push(LabResult {
                name,
                value,
                unit,
                timestamp,
                flag: interpretation_flag(resource),
                reference_range: reference_range(resource),
            });
        }
    }

    fn handle_encounter(&mut self, resource: &Value) {
        let kind = resource
            .get("class")
            .and_then(extract_codeable_text)
            .or_else(|| {
                resource
                    .get("type")
                    .and_then(Value::as_array)
                    .and_then(|arr| arr.first())
                    .and_then(extract_codeable_text)
            })
            .unwrap_or_else(|| "encounter".to_string());
        let period = resource.get("period");
        self.encounters.push(Encounter {
            id: resource_id(resource, "encounter"),
            kind,
            started_at: period
                .and_then(|p| p.get("start"))
                .and_then(Value::as_str)
                .and_then(parse_datetime),
            ended_at: period
                .and_then(|p| p.get("end"))
                .and_then(Value::as_str)
                .and_then(parse_datetime),
            reason: resource
                .get("reasonCode")
                .and_then(Value::as_array)
                .and_then(|arr| arr.first())
                .and_then(extract_codeable_text),
        });
    }

    /// Nursing documentation only; other document types are not chart notes.
    fn handle_document(&mut self, resource: &Value) {
        let title = resource
            .get("type")
            .and_then(extract_codeable_text)
            .unwrap_or_default();
        if !title.to_lowercase().contains("nurs") {
            return;
        }
        let Some(timestamp) = extract_datetime(resource, &["date", "created"]) else {
            return;
        };
        let text = resource
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| {
                resource
                    .get("content")
                    .and_then(Value::as_array)
                    .and_then(|arr| arr.first())
                    .and_then(|content| content.get("attachment"))
                    .and_then(|attachment| attachment.get("title"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            });
        let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
            return;
        };
        let author = resource
            .get("author")
            .and_then(Value::as_array)
            .and_then(|arr| arr.first())
            .and_then(|author| author.get("display"))
            .and_then(Value::as_str)
            .map(str::to_string);
        self.notes.push(NursingNote {
            timestamp,
            author,
            text,
        });
    }

    fn handle_medication(&mut self, resource: &Value) {
        let Some(medication) = resource
            .get("medicationCodeableConcept")
            .and_then(extract_codeable_text)
            .or_else(|| {
                resource
                    .get("medicationReference")
                    .and_then(|value| value.get("display"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
        else {
            return;
        };
        let Some(timestamp) = extract_datetime(
            resource,
            &["effectiveDateTime", "effectivePeriod", "dateAsserted", "authoredOn"],
        ) else {
            return;
        };
        let action = resource
            .get("status")
            .and_then(Value::as_str)
            .map(MedicationAction::parse)
            .unwrap_or(MedicationAction::Other);
        let dose = resource
            .get("dosage")
            .or_else(|| resource.get("dosageInstruction"))
            .and_then(Value::as_array)
            .and_then(|arr| arr.first())
            .and_then(|dosage| dosage.get("text"))
            .and_then(Value::as_str)
            .map(|text| text.trim().trim_end_matches('.').to_string())
            .filter(|text| !text.is_empty());
        let reason = resource
            .get("reasonCode")
            .and_then(Value::as_array)
            .and_then(|arr| arr.first())
            .and_then(extract_codeable_text);
        self.medications.push(MedicationChange {
            timestamp,
            medication,
            action,
            dose,
            reason,
        });
    }

    fn finish(self) -> ChartData {
        ChartData {
            problems: self.problems,
            vitals: self
                .vitals
                .into_values()
                .filter(|reading| !reading.is_empty())
                .collect(),
            lab_panels: self
                .labs
                .into_iter()
                .map(|(timestamp, results)| LabPanel {
                    name: None,
                    timestamp,
                    results,
                })
                .collect(),
            encounters: self.encounters,
            nursing_notes: self.notes,
            medication_changes: self.medications,
        }
    }
}

fn extract_codeable_text(value: &Value) -> Option<String> {
    if let Some(text) = value.get("text").and_then(Value::as_str) {
        if !text.trim().is_empty() {
            return Some(text.trim().to_string());
        }
    }
    let codings = value.get("coding").and_then(Value::as_array)?;
    codings.iter().find_map(|coding| {
        ["display", "code"].iter().find_map(|key| {
            coding
                .get(*key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
    })
}

fn coding_codes(value: &Value) -> impl Iterator<Item = &str> {
    value
        .get("coding")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|coding| coding.get("code").and_then(Value::as_str))
}

fn extract_status_code(value: Option<&Value>) -> Option<String> {
    let value = value?;
    extract_codeable_text(value).or_else(|| value.as_str().map(str::to_string))
}

fn resource_id(resource: &Value, fallback: &str) -> String {
    resource
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{fallback}-unknown"))
}

fn extract_datetime(resource: &Value, fields: &[&str]) -> Option<DateTime<Utc>> {
    fields.iter().find_map(|field| {
        let value = resource.get(*field)?;
        if let Some(text) = value.as_str() {
            return parse_datetime(text);
        }
        let period = value.as_object()?;
        ["end", "start"]
            .iter()
            .filter_map(|key| period.get(*key).and_then(Value::as_str))
            .find_map(parse_datetime)
    })
}

fn extract_observation_timestamp(resource: &Value) -> Option<DateTime<Utc>> {
    extract_datetime(
        resource,
        &["effectiveDateTime", "effectiveInstant", "effectivePeriod", "issued"],
    )
}

fn quantity_value(quantity: &Value) -> Option<f64> {
    quantity.get("value").and_then(Value::as_f64)
}

fn is_celsius(unit: &str) -> bool {
    matches!(unit.trim(), "Cel" | "°C" | "C" | "degC")
}

fn vital_field_from_loinc(code: &str) -> Option<VitalField> {
    match code {
        "8480-6" => Some(VitalField::Systolic),
        "8462-4" => Some(VitalField::Diastolic),
        "8867-4" => Some(VitalField::HeartRate),
        "9279-1" => Some(VitalField::RespiratoryRate),
        "8310-5" | "8331-1" => Some(VitalField::Temperature),
        "2708-6" | "59408-5" => Some(VitalField::Spo2),
        _ => None,
    }
}

fn vital_field_from_name(name: &str) -> Option<VitalField> {
    let lower = name.to_lowercase();
    if lower.contains("systolic") {
        Some(VitalField::Systolic)
    } else if lower.contains("diastolic") {
        Some(VitalField::Diastolic)
    } else if lower.contains("heart rate") || lower.contains("pulse") {
        Some(VitalField::HeartRate)
    } else if lower.contains("respiratory rate") {
        Some(VitalField::RespiratoryRate)
    } else if lower.contains("temperature") {
        Some(VitalField::Temperature)
    } else if lower.contains("spo2") || lower.contains("oxygen saturation") {
        Some(VitalField::Spo2)
    } else {
        None
    }
}

fn infer_vital_field(name: &str, resource: &Value) -> Option<VitalField> {
    resource
        .get("code")
        .and_then(|code| coding_codes(code).find_map(vital_field_from_loinc))
        .or_else(|| vital_field_from_name(name))
}

fn component_vital_field(component: &Value) -> Option<VitalField> {
    let code = component.get("code")?;
    coding_codes(code)
        .find_map(vital_field_from_loinc)
        .or_else(|| extract_codeable_text(code).and_then(|text| vital_field_from_name(&text)))
}

const LAB_KEYWORDS: [&str; 16] = [
    "lactate",
    "troponin",
    "glucose",
    "creatinine",
    "cbc",
    "platelet",
    "wbc",
    "culture",
    "bilirubin",
    "sodium",
    "potassium",
    "magnesium",
    "hemoglobin",
    "bnp",
    "inr",
    "bun",
];

fn observation_category_matches(resource: &Value, keyword: &str) -> bool {
    let Some(categories) = resource.get("category").and_then(Value::as_array) else {
        return false;
    };
    categories.iter().any(|entry| {
        let text_hit = entry
            .get("text")
            .and_then(Value::as_str)
            .is_some_and(|text| text.to_lowercase().contains(keyword));
        text_hit
            || entry
                .get("coding")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .flat_map(|coding| ["display", "code"].map(|key| coding.get(key)))
                .flatten()
                .filter_map(Value::as_str)
                .any(|code| code.to_lowercase().contains(keyword))
    })
}

fn is_lab_observation(name: &str, resource: &Value) -> bool {
    if observation_category_matches(resource, "vital")
        || observation_category_matches(resource, "imaging")
    {
        return false;
    }
    observation_category_matches(resource, "laboratory")
        || tokenize(name)
            .iter()
            .any(|token| LAB_KEYWORDS.iter().any(|kw| token.contains(kw)))
}

fn interpretation_flag(resource: &Value) -> Option<String> {
    let interpretation = resource.get("interpretation")?.as_array()?;
    interpretation.iter().find_map(|entry| {
        coding_codes(entry)
            .next()
            .map(str::to_string)
            .or_else(|| extract_codeable_text(entry))
    })
}

fn reference_range(resource: &Value) -> Option<String> {
    let range = resource.get("referenceRange")?.as_array()?.first()?;
    if let Some(text) = range.get("text").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    let bound = |key: &str| {
        range
            .get(key)
            .and_then(quantity_value)
            .map(format_numeric)
    };
    match (bound("low"), bound("high")) {
        (Some(low), Some(high)) => Some(format!("{low}-{high}")),
        (Some(low), None) => Some(format!(">{low}")),
        (None, Some(high)) => Some(format!("<{high}")),
        (None, None) => None,
    }
}
