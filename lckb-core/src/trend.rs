//! Chuỗi xu hướng theo từng chỉ số (xét nghiệm hoặc chỉ số sống).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Insertion;

/// Một điểm dữ liệu trong chuỗi xu hướng.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendEntry {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub unit: Option<String>,
    /// Cờ bất thường từ phòng xét nghiệm (H, L, HH, LL, critical...).
    pub flag: Option<String>,
}

impl TrendEntry {
    fn same_reading(&self, other: &TrendEntry) -> bool {
        self.timestamp == other.timestamp && self.value == other.value
    }
}

/// Lịch sử có thứ tự của một chỉ số, không giảm theo thời gian.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TrendSeries {
    pub name: String,
    pub unit: Option<String>,
    entries: Vec<TrendEntry>,
}

impl TrendSeries {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: None,
            entries: Vec::new(),
        }
    }

    /// Chèn theo thứ tự thời gian; bỏ qua nếu đã có điểm trùng timestamp + giá trị.
    pub fn insert(&mut self, entry: TrendEntry) -> Insertion {
        if self.entries.iter().any(|existing| existing.same_reading(&entry)) {
            return Insertion::DuplicateIgnored;
        }
        if self.unit.is_none() && entry.unit.is_some() {
            // Giữ đơn vị đầu tiên để biểu đồ nhất quán.
            self.unit = entry.unit.clone();
        }
        let position = self
            .entries
            .partition_point(|existing| existing.timestamp <= entry.timestamp);
        self.entries.insert(position, entry);
        Insertion::Inserted(())
    }

    /// Điểm có timestamp lớn nhất.
    pub fn latest(&self) -> Option<&TrendEntry> {
        self.entries.last()
    }

    pub fn latest_value(&self) -> Option<f64> {
        self.latest().map(|entry| entry.value)
    }

    pub fn entries(&self) -> &[TrendEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Chỉ giữ lại `keep` điểm mới nhất.
    pub fn retain_latest(&mut self, keep: usize) {
        if self.entries.len() > keep {
            let excess = self.entries.len() - keep;
            self.entries.drain(..excess);
        }
    }
}
