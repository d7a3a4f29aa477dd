//! Bộ nhớ AI bền vững qua các phiên.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProblemInsight {
    pub text: String,
    pub updated_at: DateTime<Utc>,
}

/// Một mục trong nhật ký tương tác.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractionEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AiMemory {
    pub patient_summary: Option<String>,
    /// Tăng mỗi lần tóm tắt được thay.
    pub summary_version: u32,
    pub problem_insights: BTreeMap<String, ProblemInsight>,
    pub interaction_log: Vec<InteractionEntry>,
    pub last_full_ingestion: Option<DateTime<Utc>>,
}

impl AiMemory {
    /// Thay tóm tắt nếu khác bản hiện tại. Trả về `true` khi phiên bản tăng.
    pub fn replace_summary(&mut self, summary: &str) -> bool {
        let summary = summary.trim();
        if summary.is_empty() || self.patient_summary.as_deref() == Some(summary) {
            return false;
        }
        self.patient_summary = Some(summary.to_string());
        self.summary_version += 1;
        true
    }

    pub fn set_insight(&mut self, problem_id: &str, text: &str, at: DateTime<Utc>) {
        self.problem_insights.insert(
            problem_id.to_string(),
            ProblemInsight {
                text: text.trim().to_string(),
                updated_at: at,
            },
        );
    }

    pub fn log_interaction(&mut self, entry: InteractionEntry, cap: usize) {
        self.interaction_log.push(entry);
        if self.interaction_log.len() > cap {
            let excess = self.interaction_log.len() - cap;
            self.interaction_log.drain(..excess);
        }
    }
}
