//! Bản ghi lâm sàng thô: chỉ số sống, xét nghiệm, ghi chú, thuốc, lượt khám.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trường chỉ số sống có thể gắn với một vấn đề.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum VitalField {
    Systolic,
    Diastolic,
    HeartRate,
    RespiratoryRate,
    Temperature,
    Spo2,
}

impl VitalField {
    pub const ALL: [VitalField; 6] = [
        VitalField::Systolic,
        VitalField::Diastolic,
        VitalField::HeartRate,
        VitalField::RespiratoryRate,
        VitalField::Temperature,
        VitalField::Spo2,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VitalField::Systolic => "systolic",
            VitalField::Diastolic => "diastolic",
            VitalField::HeartRate => "heart_rate",
            VitalField::RespiratoryRate => "respiratory_rate",
            VitalField::Temperature => "temperature",
            VitalField::Spo2 => "spo2",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            VitalField::Systolic | VitalField::Diastolic => "mmHg",
            VitalField::HeartRate => "bpm",
            VitalField::RespiratoryRate => "/min",
            VitalField::Temperature => "°F",
            VitalField::Spo2 => "%",
        }
    }

    /// Nhận diện tên trường từ dữ liệu nguồn (chấp nhận vài bí danh thường gặp).
    pub fn parse(name: &str) -> Option<VitalField> {
        let key: String = name
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();
        match key.as_str() {
            "systolic" | "sbp" | "bpsystolic" => Some(VitalField::Systolic),
            "diastolic" | "dbp" | "bpdiastolic" => Some(VitalField::Diastolic),
            "heartrate" | "hr" | "pulse" => Some(VitalField::HeartRate),
            "respiratoryrate" | "rr" | "resprate" => Some(VitalField::RespiratoryRate),
            "temperature" | "temp" => Some(VitalField::Temperature),
            "spo2" | "o2sat" | "oxygensaturation" => Some(VitalField::Spo2),
            _ => None,
        }
    }
}

/// Một lần đo chỉ số sống. Trường nào không đo được thì để `None`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct VitalsReading {
    pub timestamp: DateTime<Utc>,
    pub systolic: Option<f64>,
    pub diastolic: Option<f64>,
    pub heart_rate: Option<f64>,
    pub respiratory_rate: Option<f64>,
    /// Nhiệt độ theo độ F.
    pub temperature: Option<f64>,
    pub spo2: Option<f64>,
}

impl VitalsReading {
    pub fn value(&self, field: VitalField) -> Option<f64> {
        match field {
            VitalField::Systolic => self.systolic,
            VitalField::Diastolic => self.diastolic,
            VitalField::HeartRate => self.heart_rate,
            VitalField::RespiratoryRate => self.respiratory_rate,
            VitalField::Temperature => self.temperature,
            VitalField::Spo2 => self.spo2,
        }
    }

    pub fn set(&mut self, field: VitalField, value: f64) {
        let slot = match field {
            VitalField::Systolic => &mut self.systolic,
            VitalField::Diastolic => &mut self.diastolic,
            VitalField::HeartRate => &mut self.heart_rate,
            VitalField::RespiratoryRate => &mut self.respiratory_rate,
            VitalField::Temperature => &mut self.temperature,
            VitalField::Spo2 => &mut self.spo2,
        };
        *slot = Some(value);
    }

    /// Các cặp (trường, giá trị) đã đo.
    pub fn measured(&self) -> impl Iterator<Item = (VitalField, f64)> + '_ {
        VitalField::ALL
            .into_iter()
            .filter_map(|field| self.value(field).map(|value| (field, value)))
    }

    pub fn is_empty(&self) -> bool {
        self.measured().next().is_none()
    }
}

/// Một kết quả xét nghiệm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabResult {
    pub name: String,
    pub value: f64,
    pub unit: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub flag: Option<String>,
    pub reference_range: Option<String>,
}

impl LabResult {
    /// Diễn đạt ngắn gọn, ví dụ "Potassium 7 mEq/L".
    pub fn describe(&self) -> String {
        let value = crate::text::format_numeric(self.value);
        match &self.unit {
            Some(unit) if !unit.is_empty() => format!("{} {value} {unit}", self.name),
            _ => format!("{} {value}", self.name),
        }
    }
}

/// Một bảng xét nghiệm (panel) gồm nhiều kết quả.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabPanel {
    pub name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub results: Vec<LabResult>,
}

/// Ghi chú điều dưỡng.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NursingNote {
    pub timestamp: DateTime<Utc>,
    pub author: Option<String>,
    pub text: String,
}

/// Loại thay đổi thuốc.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MedicationAction {
    Started,
    Stopped,
    DoseChanged,
    Held,
    Resumed,
    #[serde(other)]
    Other,
}

impl MedicationAction {
    pub fn parse(text: &str) -> MedicationAction {
        match text.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "started" | "start" | "new" | "active" => MedicationAction::Started,
            "stopped" | "stop" | "discontinued" | "completed" => MedicationAction::Stopped,
            "dose_changed" | "changed" | "titrated" => MedicationAction::DoseChanged,
            "held" | "hold" | "on_hold" => MedicationAction::Held,
            "resumed" | "resume" => MedicationAction::Resumed,
            _ => MedicationAction::Other,
        }
    }
}

/// Một thay đổi trong y lệnh thuốc.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MedicationChange {
    pub timestamp: DateTime<Utc>,
    pub medication: String,
    pub action: MedicationAction,
    pub dose: Option<String>,
    pub reason: Option<String>,
}

/// Lượt khám / nhập viện.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Encounter {
    pub id: String,
    pub kind: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vital_field_aliases() {
        assert_eq!(VitalField::parse("HR"), Some(VitalField::HeartRate));
        assert_eq!(VitalField::parse("heart_rate"), Some(VitalField::HeartRate));
        assert_eq!(VitalField::parse("SpO2"), Some(VitalField::Spo2));
        assert_eq!(VitalField::parse("bp"), None);
    }

    #[test]
    fn lab_description_uses_compact_number() {
        let lab = LabResult {
            name: "Potassium".to_string(),
            value: 7.0,
            unit: Some("mEq/L".to_string()),
            timestamp: Utc::now(),
            flag: None,
            reference_range: None,
        };
        assert_eq!(lab.describe(), "Potassium 7 mEq/L");
    }

    #[test]
    fn medication_action_parse_is_lenient() {
        assert_eq!(MedicationAction::parse("Dose changed"), MedicationAction::DoseChanged);
        assert_eq!(MedicationAction::parse("on-hold"), MedicationAction::Held);
        assert_eq!(MedicationAction::parse("whatever"), MedicationAction::Other);
    }
}
