//! Cấu hình giới hạn kích thước và chính sách dọn dẹp của tài liệu.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// Độ thô của nhãn giai đoạn dùng cho problem timeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PeriodGranularity {
    #[default]
    Day,
    Week,
    Month,
}

impl PeriodGranularity {
    /// Nhãn giai đoạn của một thời điểm. Nhãn sắp xếp theo thứ tự thời gian.
    pub fn label(self, at: DateTime<Utc>) -> String {
        match self {
            PeriodGranularity::Day => at.format("%Y-%m-%d").to_string(),
            PeriodGranularity::Week => {
                let week = at.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            PeriodGranularity::Month => at.format("%Y-%m").to_string(),
        }
    }
}

/// Cấu hình các giới hạn của LCKB.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LckbConfig {
    /// Số bản ghi đọc chính tả (dictation) tối đa được giữ lại.
    pub dictation_cap: usize,
    /// Số tin nhắn gần nhất giữ lại cho mỗi cửa sổ hội thoại.
    pub conversation_window: usize,
    /// Số mục tối đa trong nhật ký tương tác AI.
    pub interaction_log_cap: usize,
    /// Số key finding tối đa sau khi cắt tỉa.
    pub key_findings_max: usize,
    /// Số câu nói của bệnh nhân tối đa.
    pub patient_voice_cap: usize,
    /// Số observation ở trạng thái active tối đa.
    pub max_active_observations: usize,
    /// Số observation không còn active được giữ lại làm dấu vết kiểm toán.
    pub inactive_retention: usize,
    /// Observation cũ hơn ngưỡng này (giờ) bị thay thế nếu có observation mới hơn cùng chủ đề.
    pub supersede_after_hours: i64,
    /// Độ dài tối đa của bản sao dictation đưa vào key findings.
    pub dictation_finding_chars: usize,
    pub period_granularity: PeriodGranularity,
}

impl Default for LckbConfig {
    fn default() -> Self {
        Self {
            dictation_cap: 50,
            conversation_window: 20,
            interaction_log_cap: 50,
            key_findings_max: 20,
            patient_voice_cap: 20,
            max_active_observations: 30,
            inactive_retention: 20,
            supersede_after_hours: 4,
            dictation_finding_chars: 200,
            period_granularity: PeriodGranularity::Day,
        }
    }
}
