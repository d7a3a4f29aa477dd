//! Tagged ingestion events, validated at the boundary.
//!
//! Incoming JSON is loosely shaped. A missing required field rejects the record
//! with [`LckbError::InvalidEvent`]; a malformed optional field is skipped and
//! the rest of the record is kept.

use chrono::{DateTime, Utc};
use lckb_core::{
    ConversationMessage, DictationEntry, Encounter, LabPanel, LabResult, LckbError, LckbResult,
    MedicationAction, MedicationChange, MessageRole, NursingNote, Priority, Problem,
    ProblemStatus, SafetyFlag, Severity, VitalField, VitalsReading,
};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::fields::{datetime_field, number, parse_severity, str_field, string_field};

const TIMESTAMP_KEYS: [&str; 5] = ["timestamp", "recorded_at", "recordedAt", "time", "date"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClinicalEvent {
    Vitals(VitalsReading),
    LabPanel(LabPanel),
    NursingNote(NursingNote),
    Dictation(DictationEntry),
    MedicationChange(MedicationChange),
    SafetyFlag(SafetyFlag),
    NurseMessage(ConversationMessage),
    PatientMessage(ConversationMessage),
}

impl ClinicalEvent {
    pub fn from_json(text: &str, received_at: DateTime<Utc>) -> LckbResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|err| LckbError::InvalidEvent(format!("JSON: {err}")))?;
        Self::from_value(&value, received_at)
    }

    /// Parses one event. `received_at` stands in for the timestamp of
    /// free-text events (dictation, flags, messages) that omit one.
    pub fn from_value(value: &Value, received_at: DateTime<Utc>) -> LckbResult<Self> {
        let kind = str_field(value, &["type", "kind", "event"])
            .ok_or_else(|| LckbError::InvalidEvent("missing event type".to_string()))?;

        match kind.to_lowercase().replace('-', "_").as_str() {
            "vitals" | "vital_signs" => parse_vitals(value).map(ClinicalEvent::Vitals),
            "lab_panel" | "labs" | "lab_results" => {
                parse_lab_panel(value).map(ClinicalEvent::LabPanel)
            }
            "nursing_note" | "note" => parse_nursing_note(value).map(ClinicalEvent::NursingNote),
            "dictation" | "doctor_dictation" => {
                let text = required_text(value, "dictation")?;
                Ok(ClinicalEvent::Dictation(DictationEntry {
                    timestamp: datetime_field(value, &TIMESTAMP_KEYS).unwrap_or(received_at),
                    text,
                }))
            }
            "medication_change" | "medication" => {
                parse_medication_change(value).map(ClinicalEvent::MedicationChange)
            }
            "safety_flag" | "flag" => {
                let text = required_text(value, "safety_flag")?;
                let severity = str_field(value, &["severity", "level"])
                    .and_then(parse_severity)
                    .unwrap_or(Severity::Warning);
                Ok(ClinicalEvent::SafetyFlag(SafetyFlag {
                    text,
                    severity,
                    timestamp: datetime_field(value, &TIMESTAMP_KEYS).unwrap_or(received_at),
                }))
            }
            "nurse_message" => Ok(ClinicalEvent::NurseMessage(parse_message(
                value,
                MessageRole::Nurse,
                received_at,
            )?)),
            "patient_message" => Ok(ClinicalEvent::PatientMessage(parse_message(
                value,
                MessageRole::Patient,
                received_at,
            )?)),
            other => Err(LckbError::InvalidEvent(format!("unknown event type {other}"))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClinicalEvent::Vitals(_) => "vitals",
            ClinicalEvent::LabPanel(_) => "lab_panel",
            ClinicalEvent::NursingNote(_) => "nursing_note",
            ClinicalEvent::Dictation(_) => "dictation",
            ClinicalEvent::MedicationChange(_) => "medication_change",
            ClinicalEvent::SafetyFlag(_) => "safety_flag",
            ClinicalEvent::NurseMessage(_) => "nurse_message",
            ClinicalEvent::PatientMessage(_) => "patient_message",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ClinicalEvent::Vitals(reading) => reading.timestamp,
            ClinicalEvent::LabPanel(panel) => panel.timestamp,
            ClinicalEvent::NursingNote(note) => note.timestamp,
            ClinicalEvent::Dictation(entry) => entry.timestamp,
            ClinicalEvent::MedicationChange(change) => change.timestamp,
            ClinicalEvent::SafetyFlag(flag) => flag.timestamp,
            ClinicalEvent::NurseMessage(message) | ClinicalEvent::PatientMessage(message) => {
                message.timestamp
            }
        }
    }
}

fn required_text(value: &Value, what: &str) -> LckbResult<String> {
    string_field(value, &["text", "content", "message"])
        .ok_or_else(|| LckbError::InvalidEvent(format!("{what}: missing text")))
}

fn required_timestamp(value: &Value, what: &str) -> LckbResult<DateTime<Utc>> {
    datetime_field(value, &TIMESTAMP_KEYS)
        .ok_or_else(|| LckbError::InvalidEvent(format!("{what}: missing or unreadable timestamp")))
}

fn parse_message(
    value: &Value,
    role: MessageRole,
    received_at: DateTime<Utc>,
) -> LckbResult<ConversationMessage> {
    Ok(ConversationMessage {
        role,
        text: required_text(value, "message")?,
        timestamp: datetime_field(value, &TIMESTAMP_KEYS).unwrap_or(received_at),
    })
}

/// Reads every recognised vital field; "bp": "120/80" fills both pressures.
pub(crate) fn parse_vitals(value: &Value) -> LckbResult<VitalsReading> {
    let timestamp = required_timestamp(value, "vitals")?;
    let mut reading = VitalsReading {
        timestamp,
        ..VitalsReading::default()
    };

    let fields = value.get("values").unwrap_or(value);
    let Some(object) = fields.as_object() else {
        return Err(LckbError::InvalidEvent("vitals: expected an object".to_string()));
    };

    for (key, raw) in object {
        if let Some(field) = VitalField::parse(key) {
            match number(raw) {
                Some(v) => reading.set(field, v),
                None if raw.is_null() => {}
                None => warn!(field = %key, "skipping unreadable vital value"),
            }
            continue;
        }
        let normalized = key.to_lowercase().replace(['_', ' '], "");
        if normalized == "bp" || normalized == "bloodpressure" {
            if let Some((systolic, diastolic)) = raw.as_str().and_then(split_blood_pressure) {
                reading.systolic = Some(systolic);
                reading.diastolic = Some(diastolic);
            }
        }
    }

    if reading.is_empty() {
        return Err(LckbError::InvalidEvent(
            "vitals: no measurement present".to_string(),
        ));
    }
    Ok(reading)
}

fn split_blood_pressure(text: &str) -> Option<(f64, f64)> {
    let (systolic, diastolic) = text.split_once('/')?;
    let diastolic = diastolic.split_whitespace().next()?;
    Some((systolic.trim().parse().ok()?, diastolic.trim().parse().ok()?))
}

pub(crate) fn parse_lab_result(value: &Value, fallback: DateTime<Utc>) -> Option<LabResult> {
    let Some(name) = string_field(value, &["name", "test", "analyte"]) else {
        warn!("skipping lab result without a name");
        return None;
    };
    let Some(result_value) = value
        .get("value")
        .or_else(|| value.get("result"))
        .and_then(number)
    else {
        warn!(lab = %name, "skipping lab result with non-numeric value");
        return None;
    };
    Some(LabResult {
        name,
        value: result_value,
        unit: string_field(value, &["unit", "units"]),
        timestamp: datetime_field(value, &TIMESTAMP_KEYS).unwrap_or(fallback),
        flag: string_field(value, &["flag", "interpretation", "abnormal_flag"]),
        reference_range: string_field(value, &["reference_range", "referenceRange", "range"]),
    })
}

pub(crate) fn parse_lab_panel(value: &Value) -> LckbResult<LabPanel> {
    let timestamp = required_timestamp(value, "lab_panel")?;
    let results = value
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| LckbError::InvalidEvent("lab_panel: missing results".to_string()))?;

    Ok(LabPanel {
        name: string_field(value, &["name", "panel"]),
        timestamp,
        results: results
            .iter()
            .filter_map(|result| parse_lab_result(result, timestamp))
            .collect(),
    })
}

pub(crate) fn parse_nursing_note(value: &Value) -> LckbResult<NursingNote> {
    Ok(NursingNote {
        timestamp: required_timestamp(value, "nursing_note")?,
        author: string_field(value, &["author", "nurse"]),
        text: required_text(value, "nursing_note")?,
    })
}

pub(crate) fn parse_medication_change(value: &Value) -> LckbResult<MedicationChange> {
    let medication = string_field(value, &["medication", "name", "drug"]).ok_or_else(|| {
        LckbError::InvalidEvent("medication_change: missing medication".to_string())
    })?;
    Ok(MedicationChange {
        timestamp: required_timestamp(value, "medication_change")?,
        medication,
        action: str_field(value, &["action", "status", "change"])
            .map(MedicationAction::parse)
            .unwrap_or(MedicationAction::Other),
        dose: string_field(value, &["dose", "dosage"]),
        reason: string_field(value, &["reason", "indication"]),
    })
}

pub(crate) fn parse_problem(value: &Value) -> LckbResult<Problem> {
    let id = string_field(value, &["id", "problem_id"])
        .ok_or_else(|| LckbError::InvalidEvent("problem: missing id".to_string()))?;
    let name = string_field(value, &["name", "title"])
        .ok_or_else(|| LckbError::InvalidEvent(format!("problem {id}: missing name")))?;

    let mut problem = Problem::new(id, name);
    if let Some(status) = str_field(value, &["status"]) {
        problem.status = match status.to_lowercase().as_str() {
            "resolved" | "inactive" | "remission" => ProblemStatus::Resolved,
            _ => ProblemStatus::Active,
        };
    }
    if let Some(priority) = str_field(value, &["priority"]) {
        problem.priority = match priority.to_lowercase().as_str() {
            "high" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Medium,
        };
    }
    problem.related_vital_fields = string_list(value, &["related_vital_fields", "related_vitals"])
        .iter()
        .filter_map(|name| VitalField::parse(name))
        .collect();
    problem.related_lab_names = string_list(value, &["related_lab_names", "related_labs"]);
    problem.onset = string_field(value, &["onset"]);
    Ok(problem)
}

pub(crate) fn parse_encounter(value: &Value) -> LckbResult<Encounter> {
    let id = string_field(value, &["id", "encounter_id"])
        .ok_or_else(|| LckbError::InvalidEvent("encounter: missing id".to_string()))?;
    Ok(Encounter {
        id,
        kind: string_field(value, &["kind", "type", "class"])
            .unwrap_or_else(|| "encounter".to_string()),
        started_at: datetime_field(value, &["started_at", "start"]),
        ended_at: datetime_field(value, &["ended_at", "end"]),
        reason: string_field(value, &["reason"]),
    })
}

fn string_list(value: &Value, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .find_map(|key| value.get(*key).and_then(Value::as_array))
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
