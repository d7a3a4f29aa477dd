//! Tài liệu gốc (aggregate root) của LCKB cho một bệnh nhân.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clinical::{Encounter, LabResult, MedicationChange, NursingNote, VitalsReading};
use crate::error::Insertion;
use crate::memory::AiMemory;
use crate::narrative::ClinicalNarrative;
use crate::problem::{Problem, ProblemTimeline, TimelineNote};
use crate::session::SessionContext;
use crate::trend::{TrendEntry, TrendSeries};

/// Phiên bản lược đồ của tài liệu được lưu.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    pub patient_id: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// Mốc thời gian của bản ghi hồ sơ mới nhất đã nạp; dùng cho `update_since`.
    pub last_loaded_timestamp: Option<DateTime<Utc>>,
    /// Lần khôi phục gần nhất từ bản lưu; không ảnh hưởng mốc nạp hồ sơ.
    #[serde(default)]
    pub last_rehydrated_at: Option<DateTime<Utc>>,
    pub schema_version: u32,
    /// Bộ đếm cấp id cho observation, quyết định, mâu thuẫn.
    pub id_sequence: u64,
}

/// Danh sách vấn đề và timeline tương ứng (mỗi vấn đề đúng một timeline).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProblemMatrix {
    pub problems: BTreeMap<String, Problem>,
    pub timelines: BTreeMap<String, ProblemTimeline>,
}

impl ProblemMatrix {
    /// Thêm hoặc cập nhật vấn đề; timeline hiện có được giữ nguyên.
    pub fn upsert_problem(&mut self, problem: Problem) -> Insertion {
        let id = problem.id.clone();
        self.timelines
            .entry(id.clone())
            .or_insert_with(|| ProblemTimeline::new(id.clone()));
        match self.problems.insert(id, problem.clone()) {
            Some(previous) if previous == problem => Insertion::DuplicateIgnored,
            _ => Insertion::Inserted(()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn active_problems(&self) -> impl Iterator<Item = &Problem> {
        self.problems.values().filter(|p| p.is_active())
    }

    /// Chép tập con chỉ số sống liên quan vào timeline của mọi vấn đề theo dõi chúng.
    /// Trả về số timeline nhận thêm mục mới.
    pub fn thread_vitals(&mut self, period: &str, reading: &VitalsReading) -> usize {
        let mut threaded = 0;
        for problem in self.problems.values() {
            let Some(subset) = problem.related_vitals(reading) else {
                continue;
            };
            let timeline = self
                .timelines
                .entry(problem.id.clone())
                .or_insert_with(|| ProblemTimeline::new(problem.id.clone()));
            if timeline.add_vitals(period, subset).is_inserted() {
                threaded += 1;
            }
        }
        threaded
    }

    pub fn thread_lab(&mut self, period: &str, result: &LabResult) -> usize {
        let mut threaded = 0;
        for problem in self.problems.values() {
            if !problem.tracks_lab(&result.name) {
                continue;
            }
            let timeline = self
                .timelines
                .entry(problem.id.clone())
                .or_insert_with(|| ProblemTimeline::new(problem.id.clone()));
            if timeline.add_lab(period, result.clone()).is_inserted() {
                threaded += 1;
            }
        }
        threaded
    }

    /// Gắn ghi chú vào timeline của các vấn đề được nhắc tên trong ghi chú.
    pub fn thread_note(&mut self, period: &str, note: &TimelineNote) -> usize {
        let mut threaded = 0;
        for problem in self.problems.values() {
            if !problem.mentioned_in(&note.text) {
                continue;
            }
            let timeline = self
                .timelines
                .entry(problem.id.clone())
                .or_insert_with(|| ProblemTimeline::new(problem.id.clone()));
            if timeline.add_note(period, note.clone()).is_inserted() {
                threaded += 1;
            }
        }
        threaded
    }
}

/// Dữ liệu dọc theo thời gian.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LongitudinalData {
    /// Các lần đo chỉ số sống, mới nhất trước.
    pub vitals: Vec<VitalsReading>,
    /// Chuỗi xu hướng theo từng trường chỉ số sống.
    pub vital_trends: BTreeMap<String, TrendSeries>,
    /// Chuỗi xu hướng theo tên xét nghiệm.
    pub labs: BTreeMap<String, TrendSeries>,
    /// Nhật ký thay đổi thuốc, mới nhất trước.
    pub medication_changes: Vec<MedicationChange>,
    pub encounters: Vec<Encounter>,
    pub nursing_notes: Vec<NursingNote>,
}

impl LongitudinalData {
    pub fn insert_vitals(&mut self, reading: VitalsReading) -> Insertion {
        if self.vitals.contains(&reading) {
            return Insertion::DuplicateIgnored;
        }
        for (field, value) in reading.measured() {
            let series = self
                .vital_trends
                .entry(field.as_str().to_string())
                .or_insert_with(|| TrendSeries::new(field.as_str()));
            let _ = series.insert(TrendEntry {
                timestamp: reading.timestamp,
                value,
                unit: Some(field.unit().to_string()),
                flag: None,
            });
        }
        let position = self
            .vitals
            .partition_point(|existing| existing.timestamp >= reading.timestamp);
        self.vitals.insert(position, reading);
        Insertion::Inserted(())
    }

    pub fn latest_vitals(&self) -> Option<&VitalsReading> {
        self.vitals.first()
    }

    pub fn upsert_lab(&mut self, result: &LabResult) -> Insertion {
        let key = result.name.trim().to_string();
        let series = self
            .labs
            .entry(key.clone())
            .or_insert_with(|| TrendSeries::new(key));
        series.insert(TrendEntry {
            timestamp: result.timestamp,
            value: result.value,
            unit: result.unit.clone(),
            flag: result.flag.clone(),
        })
    }

    /// Có giá trị xét nghiệm nào mà tên chứa từ khóa này không.
    pub fn has_lab_values(&self, keyword: &str) -> bool {
        let keyword = keyword.to_lowercase();
        self.labs
            .iter()
            .any(|(name, series)| name.to_lowercase().contains(&keyword) && !series.is_empty())
    }

    pub fn has_labs(&self) -> bool {
        self.labs.values().any(|series| !series.is_empty())
    }

    pub fn insert_medication_change(&mut self, change: MedicationChange) -> Insertion {
        if self.medication_changes.contains(&change) {
            return Insertion::DuplicateIgnored;
        }
        let position = self
            .medication_changes
            .partition_point(|existing| existing.timestamp >= change.timestamp);
        self.medication_changes.insert(position, change);
        Insertion::Inserted(())
    }

    /// Gộp lượt khám theo id; bản mới thay bản cũ.
    pub fn upsert_encounter(&mut self, encounter: Encounter) -> Insertion {
        match self.encounters.iter_mut().find(|e| e.id == encounter.id) {
            Some(existing) if *existing == encounter => Insertion::DuplicateIgnored,
            Some(existing) => {
                *existing = encounter;
                Insertion::Inserted(())
            }
            None => {
                self.encounters.push(encounter);
                Insertion::Inserted(())
            }
        }
    }

    pub fn insert_note(&mut self, note: NursingNote) -> Insertion {
        let duplicate = self
            .nursing_notes
            .iter()
            .any(|n| n.timestamp == note.timestamp && n.text == note.text);
        if duplicate {
            return Insertion::DuplicateIgnored;
        }
        let position = self
            .nursing_notes
            .partition_point(|existing| existing.timestamp <= note.timestamp);
        self.nursing_notes.insert(position, note);
        Insertion::Inserted(())
    }
}

/// Tài liệu LCKB: sở hữu toàn bộ hiểu biết về một bệnh nhân trong phiên.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClinicalDocument {
    pub metadata: Metadata,
    pub problem_matrix: ProblemMatrix,
    pub longitudinal: LongitudinalData,
    pub narrative: ClinicalNarrative,
    pub session: SessionContext,
    pub ai_memory: AiMemory,
}

impl ClinicalDocument {
    /// Tạo tài liệu rỗng nhưng hợp lệ.
    pub fn create(patient_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            metadata: Metadata {
                patient_id: patient_id.into(),
                created_at: now,
                last_updated: now,
                last_loaded_timestamp: None,
                last_rehydrated_at: None,
                schema_version: SCHEMA_VERSION,
                id_sequence: 0,
            },
            problem_matrix: ProblemMatrix::default(),
            longitudinal: LongitudinalData::default(),
            narrative: ClinicalNarrative::default(),
            session: SessionContext::default(),
            ai_memory: AiMemory::default(),
        }
    }

    pub fn patient_id(&self) -> &str {
        &self.metadata.patient_id
    }

    /// Cấp id mới, ví dụ `obs-7`.
    pub fn mint_id(&mut self, prefix: &str) -> String {
        self.metadata.id_sequence += 1;
        format!("{prefix}-{}", self.metadata.id_sequence)
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.metadata.last_updated {
            self.metadata.last_updated = now;
        }
    }

    /// Nâng mốc bản ghi hồ sơ đã nạp.
    pub fn advance_loaded_watermark(&mut self, at: DateTime<Utc>) {
        match self.metadata.last_loaded_timestamp {
            Some(current) if current >= at => {}
            _ => self.metadata.last_loaded_timestamp = Some(at),
        }
    }

    /// Xóa bộ nhớ theo yêu cầu người vận hành: ngữ cảnh phiên, bộ nhớ AI và phần
    /// tường thuật. Dữ liệu hồ sơ (vấn đề, dữ liệu dọc) được giữ nguyên.
    pub fn reset_memory(&mut self, now: DateTime<Utc>) {
        self.session = SessionContext::default();
        self.ai_memory = AiMemory::default();
        self.narrative = ClinicalNarrative::default();
        self.touch(now);
    }

    /// Đã có dữ liệu lâm sàng nào chưa (chỉ số sống, xét nghiệm, vấn đề).
    pub fn has_clinical_data(&self) -> bool {
        !self.longitudinal.vitals.is_empty()
            || self.longitudinal.has_labs()
            || !self.problem_matrix.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clinical::VitalField;
    use crate::session::{SafetyFlag, Severity};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap()
    }

    #[test]
    fn vitals_are_most_recent_first() {
        let mut data = LongitudinalData::default();
        for minutes in [10, 30, 20] {
            let reading = VitalsReading {
                timestamp: t0() + Duration::minutes(minutes),
                heart_rate: Some(80.0 + minutes as f64),
                ..VitalsReading::default()
            };
            assert!(data.insert_vitals(reading).is_inserted());
        }
        let hrs: Vec<_> = data.vitals.iter().filter_map(|v| v.heart_rate).collect();
        assert_eq!(hrs, vec![110.0, 100.0, 90.0]);
        assert_eq!(
            data.vital_trends["heart_rate"].latest_value(),
            Some(110.0)
        );
    }

    #[test]
    fn problems_always_own_a_timeline() {
        let mut matrix = ProblemMatrix::default();
        let mut problem = Problem::new("p1", "Hypertension");
        problem.related_vital_fields = vec![VitalField::Systolic];
        assert!(matrix.upsert_problem(problem.clone()).is_inserted());
        assert_eq!(matrix.upsert_problem(problem), Insertion::DuplicateIgnored);
        assert!(matrix.timelines.contains_key("p1"));
    }

    #[test]
    fn reset_keeps_chart_data() {
        let mut doc = ClinicalDocument::create("pt-1", t0());
        let _ = doc.longitudinal.insert_vitals(VitalsReading {
            timestamp: t0(),
            spo2: Some(95.0),
            ..VitalsReading::default()
        });
        let _ = doc.session.add_safety_flag(SafetyFlag {
            text: "x".to_string(),
            severity: Severity::Info,
            timestamp: t0(),
        });
        doc.narrative.trajectory_assessment = Some("improving".to_string());
        doc.ai_memory.replace_summary("summary");

        doc.reset_memory(t0() + Duration::hours(1));

        assert!(doc.session.safety_flags.is_empty());
        assert!(doc.narrative.trajectory_assessment.is_none());
        assert!(doc.ai_memory.patient_summary.is_none());
        assert_eq!(doc.longitudinal.vitals.len(), 1);
        assert_eq!(doc.metadata.last_updated, t0() + Duration::hours(1));
    }

    #[test]
    fn ids_are_unique_and_prefixed() {
        let mut doc = ClinicalDocument::create("pt-1", t0());
        assert_eq!(doc.mint_id("obs"), "obs-1");
        assert_eq!(doc.mint_id("cfl"), "cfl-2");
    }
}
