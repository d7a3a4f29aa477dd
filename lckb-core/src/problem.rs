//! Danh sách vấn đề và timeline theo giai đoạn cho từng vấn đề.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clinical::{LabResult, VitalField, VitalsReading};
use crate::error::Insertion;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProblemStatus {
    #[default]
    Active,
    Resolved,
}

/// Mức ưu tiên của vấn đề.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

/// Một vấn đề lâm sàng với id ổn định.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Problem {
    pub id: String,
    pub name: String,
    pub status: ProblemStatus,
    pub priority: Priority,
    #[serde(default)]
    pub related_vital_fields: Vec<VitalField>,
    #[serde(default)]
    pub related_lab_names: Vec<String>,
    pub onset: Option<String>,
}

impl Problem {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: ProblemStatus::Active,
            priority: Priority::Medium,
            related_vital_fields: Vec::new(),
            related_lab_names: Vec::new(),
            onset: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ProblemStatus::Active
    }

    /// Xét nghiệm có liên quan tới vấn đề này không (so khớp không phân biệt hoa thường).
    pub fn tracks_lab(&self, lab_name: &str) -> bool {
        let lab = lab_name.trim().to_lowercase();
        self.related_lab_names.iter().any(|name| {
            let name = name.trim().to_lowercase();
            !name.is_empty() && (lab == name || lab.contains(&name))
        })
    }

    /// Văn bản có nhắc tới tên vấn đề không.
    pub fn mentioned_in(&self, text: &str) -> bool {
        let name = self.name.trim().to_lowercase();
        !name.is_empty() && text.to_lowercase().contains(&name)
    }

    /// Tập con các trường chỉ số sống mà vấn đề theo dõi, lấy từ một lần đo.
    pub fn related_vitals(&self, reading: &VitalsReading) -> Option<TimelineVitals> {
        let values: BTreeMap<VitalField, f64> = self
            .related_vital_fields
            .iter()
            .filter_map(|field| reading.value(*field).map(|value| (*field, value)))
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(TimelineVitals {
                timestamp: reading.timestamp,
                values,
            })
        }
    }
}

/// Các chỉ số sống liên quan được chép vào timeline của vấn đề.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineVitals {
    pub timestamp: DateTime<Utc>,
    pub values: BTreeMap<VitalField, f64>,
}

/// Ghi chú được gắn vào timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineNote {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub text: String,
}

/// Dữ liệu của một giai đoạn trong timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PeriodBucket {
    pub vitals: Vec<TimelineVitals>,
    pub labs: Vec<LabResult>,
    pub notes: Vec<TimelineNote>,
}

impl PeriodBucket {
    pub fn is_empty(&self) -> bool {
        self.vitals.is_empty() && self.labs.is_empty() && self.notes.is_empty()
    }
}

/// Timeline của một vấn đề: nhãn giai đoạn -> dữ liệu giai đoạn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProblemTimeline {
    pub problem_id: String,
    pub periods: BTreeMap<String, PeriodBucket>,
}

impl ProblemTimeline {
    pub fn new(problem_id: impl Into<String>) -> Self {
        Self {
            problem_id: problem_id.into(),
            periods: BTreeMap::new(),
        }
    }

    pub fn add_vitals(&mut self, period: &str, vitals: TimelineVitals) -> Insertion {
        let bucket = self.periods.entry(period.to_string()).or_default();
        if bucket.vitals.contains(&vitals) {
            return Insertion::DuplicateIgnored;
        }
        bucket.vitals.push(vitals);
        bucket.vitals.sort_by_key(|v| v.timestamp);
        Insertion::Inserted(())
    }

    pub fn add_lab(&mut self, period: &str, lab: LabResult) -> Insertion {
        let bucket = self.periods.entry(period.to_string()).or_default();
        let duplicate = bucket.labs.iter().any(|existing| {
            existing.name == lab.name
                && existing.timestamp == lab.timestamp
                && existing.value == lab.value
        });
        if duplicate {
            return Insertion::DuplicateIgnored;
        }
        bucket.labs.push(lab);
        bucket.labs.sort_by_key(|l| l.timestamp);
        Insertion::Inserted(())
    }

    pub fn add_note(&mut self, period: &str, note: TimelineNote) -> Insertion {
        let bucket = self.periods.entry(period.to_string()).or_default();
        let duplicate = bucket
            .notes
            .iter()
            .any(|existing| existing.timestamp == note.timestamp && existing.text == note.text);
        if duplicate {
            return Insertion::DuplicateIgnored;
        }
        bucket.notes.push(note);
        bucket.notes.sort_by_key(|n| n.timestamp);
        Insertion::Inserted(())
    }

    /// Tổng số mục trên mọi giai đoạn.
    pub fn entry_count(&self) -> usize {
        self.periods
            .values()
            .map(|bucket| bucket.vitals.len() + bucket.labs.len() + bucket.notes.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sepsis() -> Problem {
        let mut problem = Problem::new("p-sepsis", "Sepsis");
        problem.related_vital_fields = vec![VitalField::HeartRate, VitalField::Temperature];
        problem.related_lab_names = vec!["Lactate".to_string(), "WBC".to_string()];
        problem
    }

    #[test]
    fn related_vitals_keep_only_tracked_fields() {
        let reading = VitalsReading {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap(),
            heart_rate: Some(118.0),
            systolic: Some(95.0),
            temperature: Some(101.8),
            ..VitalsReading::default()
        };
        let subset = sepsis().related_vitals(&reading).unwrap();
        assert_eq!(subset.values.len(), 2);
        assert_eq!(subset.values.get(&VitalField::HeartRate), Some(&118.0));
        assert!(!subset.values.contains_key(&VitalField::Systolic));
    }

    #[test]
    fn lab_matching_is_case_insensitive() {
        let problem = sepsis();
        assert!(problem.tracks_lab("lactate"));
        assert!(problem.tracks_lab("Lactate, arterial"));
        assert!(!problem.tracks_lab("Potassium"));
    }

    #[test]
    fn timeline_ignores_repeated_entries() {
        let mut timeline = ProblemTimeline::new("p-sepsis");
        let note = TimelineNote {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap(),
            source: "nursing".to_string(),
            text: "Febrile overnight".to_string(),
        };
        assert!(timeline.add_note("2024-03-05", note.clone()).is_inserted());
        assert_eq!(timeline.add_note("2024-03-05", note), Insertion::DuplicateIgnored);
        assert_eq!(timeline.entry_count(), 1);
    }
}
