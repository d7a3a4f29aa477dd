//! Phần tường thuật lâm sàng.

use serde::{Deserialize, Serialize};

use crate::error::Insertion;
use crate::text::same_text;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ClinicalNarrative {
    /// Đánh giá diễn tiến, người ghi sau cùng thắng.
    pub trajectory_assessment: Option<String>,
    /// Danh sách phát hiện chính, có giới hạn và không trùng lặp.
    pub key_findings: Vec<String>,
    /// Bị thay thế toàn bộ ở mỗi lần làm mới từ dịch vụ suy luận.
    pub open_questions: Vec<String>,
    pub nursing_assessment: Option<String>,
    /// Lời kể của bệnh nhân trích từ ghi chú điều dưỡng.
    pub patient_voice: Vec<String>,
}

impl ClinicalNarrative {
    /// Thêm phát hiện nếu chưa có (so sánh sau chuẩn hóa).
    pub fn add_key_finding(&mut self, finding: &str) -> Insertion {
        let finding = finding.trim();
        if finding.is_empty() || self.key_findings.iter().any(|f| same_text(f, finding)) {
            return Insertion::DuplicateIgnored;
        }
        self.key_findings.push(finding.to_string());
        Insertion::Inserted(())
    }

    pub fn add_patient_voice(&mut self, statement: &str, cap: usize) -> Insertion {
        let statement = statement.trim();
        if statement.is_empty() || self.patient_voice.iter().any(|s| same_text(s, statement)) {
            return Insertion::DuplicateIgnored;
        }
        self.patient_voice.push(statement.to_string());
        if self.patient_voice.len() > cap {
            let excess = self.patient_voice.len() - cap;
            self.patient_voice.drain(..excess);
        }
        Insertion::Inserted(())
    }
}
