//! Ngữ cảnh phiên: dictation, cờ an toàn, observation của AI, các tầng trạng thái
//! lâm sàng, nhật ký mâu thuẫn và cửa sổ hội thoại.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Insertion;
use crate::text::{normalize, same_text};

/// Mức độ nghiêm trọng của cờ an toàn và mâu thuẫn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

/// Cờ an toàn, khử trùng lặp theo nguyên văn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SafetyFlag {
    pub text: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DictationEntry {
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

/// Vòng đời của một observation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ObservationStatus {
    Active,
    Superseded,
    Invalidated,
}

/// Nhận định do AI đưa ra, có trạng thái vòng đời.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub status: ObservationStatus,
    pub superseded_by: Option<String>,
    pub category: Option<String>,
    pub version: u32,
}

impl Observation {
    pub fn is_active(&self) -> bool {
        self.status == ObservationStatus::Active
    }
}

/// Câu hỏi chưa có quyết định.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingDecision {
    pub id: String,
    pub text: String,
    pub raised_by: Option<String>,
    pub raised_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<String>,
}

impl PendingDecision {
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionTrend {
    Improving,
    Worsening,
    Stable,
    New,
}

impl ConditionTrend {
    pub fn parse(text: &str) -> Option<ConditionTrend> {
        match text.trim().to_lowercase().as_str() {
            "improving" => Some(ConditionTrend::Improving),
            "worsening" => Some(ConditionTrend::Worsening),
            "stable" => Some(ConditionTrend::Stable),
            "new" => Some(ConditionTrend::New),
            _ => None,
        }
    }
}

/// Tình trạng đang diễn biến.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveCondition {
    pub text: String,
    pub trend: ConditionTrend,
    pub first_noted: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Dữ kiện nền ổn định, không sửa sau khi ghi.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackgroundFact {
    pub text: String,
    pub recorded_at: DateTime<Utc>,
}

/// Tầng chứa một dữ kiện.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    PendingDecision,
    ActiveCondition,
    BackgroundFact,
}

/// Kết quả upsert tình trạng active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
}

/// Ba tầng độc lập. Một văn bản chuẩn hóa chỉ nằm ở đúng một tầng.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ActiveClinicalState {
    pub pending_decisions: Vec<PendingDecision>,
    pub active_conditions: Vec<ActiveCondition>,
    pub background_facts: Vec<BackgroundFact>,
}

impl ActiveClinicalState {
    /// Thêm quyết định chờ; chỉ so trùng với các quyết định chưa giải quyết.
    pub fn add_pending_decision(&mut self, decision: PendingDecision) -> Insertion<String> {
        let duplicate = self
            .pending_decisions
            .iter()
            .any(|d| !d.is_resolved() && same_text(&d.text, &decision.text));
        if duplicate {
            return Insertion::DuplicateIgnored;
        }
        self.evict_from_other_tiers(&normalize(&decision.text), Tier::PendingDecision);
        let id = decision.id.clone();
        self.pending_decisions.push(decision);
        Insertion::Inserted(id)
    }

    /// Ghi nhận quyết định. Trả về `false` nếu không tìm thấy hoặc đã giải quyết.
    pub fn resolve_pending_decision(
        &mut self,
        id: &str,
        resolution: &str,
        at: DateTime<Utc>,
    ) -> bool {
        match self
            .pending_decisions
            .iter_mut()
            .find(|d| d.id == id && !d.is_resolved())
        {
            Some(decision) => {
                decision.resolved_at = Some(at);
                decision.resolution = Some(resolution.trim().to_string());
                true
            }
            None => false,
        }
    }

    pub fn upsert_active_condition(
        &mut self,
        text: &str,
        trend: ConditionTrend,
        at: DateTime<Utc>,
    ) -> Upsert {
        let key = normalize(text);
        if let Some(existing) = self
            .active_conditions
            .iter_mut()
            .find(|c| normalize(&c.text) == key)
        {
            existing.trend = trend;
            existing.last_updated = at;
            return Upsert::Updated;
        }
        self.evict_from_other_tiers(&key, Tier::ActiveCondition);
        self.active_conditions.push(ActiveCondition {
            text: text.trim().to_string(),
            trend,
            first_noted: at,
            last_updated: at,
        });
        Upsert::Created
    }

    pub fn add_background_fact(&mut self, text: &str, at: DateTime<Utc>) -> Insertion {
        let key = normalize(text);
        if self
            .background_facts
            .iter()
            .any(|fact| normalize(&fact.text) == key)
        {
            return Insertion::DuplicateIgnored;
        }
        self.evict_from_other_tiers(&key, Tier::BackgroundFact);
        self.background_facts.push(BackgroundFact {
            text: text.trim().to_string(),
            recorded_at: at,
        });
        Insertion::Inserted(())
    }

    /// Tầng hiện chứa văn bản này (nếu có).
    pub fn tier_of(&self, text: &str) -> Option<Tier> {
        let key = normalize(text);
        if self
            .pending_decisions
            .iter()
            .any(|d| normalize(&d.text) == key)
        {
            Some(Tier::PendingDecision)
        } else if self
            .active_conditions
            .iter()
            .any(|c| normalize(&c.text) == key)
        {
            Some(Tier::ActiveCondition)
        } else if self
            .background_facts
            .iter()
            .any(|f| normalize(&f.text) == key)
        {
            Some(Tier::BackgroundFact)
        } else {
            None
        }
    }

    pub fn unresolved_decisions(&self) -> impl Iterator<Item = &PendingDecision> {
        self.pending_decisions.iter().filter(|d| !d.is_resolved())
    }

    fn evict_from_other_tiers(&mut self, key: &str, keep: Tier) {
        if keep != Tier::PendingDecision {
            self.pending_decisions.retain(|d| normalize(&d.text) != key);
        }
        if keep != Tier::ActiveCondition {
            self.active_conditions.retain(|c| normalize(&c.text) != key);
        }
        if keep != Tier::BackgroundFact {
            self.background_facts.retain(|f| normalize(&f.text) != key);
        }
    }
}

/// Họ luật đã phát hiện ra mâu thuẫn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictRule {
    NoDataContradiction,
    MedicationContraindication,
    AssessmentContradiction,
    /// Mâu thuẫn do dịch vụ suy luận bên ngoài báo về.
    External,
}

/// Bản ghi mâu thuẫn giữa hai dữ kiện.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConflictRecord {
    pub id: String,
    pub item_a: String,
    pub item_b: String,
    pub severity: Severity,
    pub rule: ConflictRule,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<String>,
}

impl ConflictRecord {
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }

    /// Cùng cặp dữ kiện, không phân biệt thứ tự.
    pub fn same_pair(&self, a: &str, b: &str) -> bool {
        (self.item_a == a && self.item_b == b) || (self.item_a == b && self.item_b == a)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    Doctor,
    Patient,
    Nurse,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Cửa sổ N tin nhắn gần nhất.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ConversationWindow {
    pub messages: Vec<ConversationMessage>,
}

impl ConversationWindow {
    pub fn push(&mut self, message: ConversationMessage, capacity: usize) {
        self.messages.push(message);
        if self.messages.len() > capacity {
            let excess = self.messages.len() - capacity;
            self.messages.drain(..excess);
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Ngữ cảnh phiên của một bệnh nhân, chỉ bị xóa khi người vận hành xóa bộ nhớ.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SessionContext {
    pub doctor_dictation: Vec<DictationEntry>,
    pub safety_flags: Vec<SafetyFlag>,
    pub reviewed_items: BTreeSet<String>,
    pub pending_items: BTreeSet<String>,
    pub ai_observations: Vec<Observation>,
    pub active_state: ActiveClinicalState,
    pub conflicts: Vec<ConflictRecord>,
    pub patient_conversation: ConversationWindow,
    pub nurse_conversation: ConversationWindow,
}

impl SessionContext {
    pub fn add_dictation(&mut self, entry: DictationEntry, cap: usize) {
        self.doctor_dictation.push(entry);
        if self.doctor_dictation.len() > cap {
            let excess = self.doctor_dictation.len() - cap;
            self.doctor_dictation.drain(..excess);
        }
    }

    pub fn add_safety_flag(&mut self, flag: SafetyFlag) -> Insertion {
        if self.safety_flags.iter().any(|f| f.text == flag.text) {
            return Insertion::DuplicateIgnored;
        }
        self.safety_flags.push(flag);
        Insertion::Inserted(())
    }

    pub fn remove_safety_flag(&mut self, text: &str) -> bool {
        let before = self.safety_flags.len();
        self.safety_flags.retain(|f| f.text != text);
        self.safety_flags.len() != before
    }

    /// Chuyển mục sang đã xem; đồng thời gỡ khỏi danh sách chờ.
    pub fn mark_reviewed(&mut self, item: &str) -> Insertion {
        self.pending_items.remove(item);
        Insertion::from_flag(self.reviewed_items.insert(item.to_string()))
    }

    /// Thêm mục chờ xem; một mục đã xem được mở lại.
    pub fn add_pending_item(&mut self, item: &str) -> Insertion {
        self.reviewed_items.remove(item);
        Insertion::from_flag(self.pending_items.insert(item.to_string()))
    }

    pub fn remove_pending_item(&mut self, item: &str) -> bool {
        self.pending_items.remove(item)
    }

    pub fn active_observations(&self) -> impl Iterator<Item = &Observation> {
        self.ai_observations.iter().filter(|o| o.is_active())
    }

    pub fn observation(&self, id: &str) -> Option<&Observation> {
        self.ai_observations.iter().find(|o| o.id == id)
    }

    pub fn observation_mut(&mut self, id: &str) -> Option<&mut Observation> {
        self.ai_observations.iter_mut().find(|o| o.id == id)
    }

    /// Observation active có cùng văn bản (bỏ khoảng trắng, không phân biệt hoa thường).
    pub fn find_active_observation(&self, text: &str) -> Option<&Observation> {
        let key = normalize(text);
        self.active_observations()
            .find(|o| normalize(&o.text) == key)
    }

    /// Có mâu thuẫn chưa giải quyết nào cho cặp này không (không phân biệt thứ tự).
    pub fn has_open_conflict(&self, item_a: &str, item_b: &str) -> bool {
        self.conflicts
            .iter()
            .any(|c| !c.is_resolved() && c.same_pair(item_a, item_b))
    }

    /// Ghi mâu thuẫn, bỏ qua nếu cặp này đang có mâu thuẫn chưa giải quyết.
    pub fn log_conflict(&mut self, record: ConflictRecord) -> Insertion<String> {
        if self.has_open_conflict(&record.item_a, &record.item_b) {
            return Insertion::DuplicateIgnored;
        }
        let id = record.id.clone();
        self.conflicts.push(record);
        Insertion::Inserted(id)
    }

    pub fn resolve_conflict(&mut self, id: &str, resolution: &str, at: DateTime<Utc>) -> bool {
        match self
            .conflicts
            .iter_mut()
            .find(|c| c.id == id && !c.is_resolved())
        {
            Some(conflict) => {
                conflict.resolved_at = Some(at);
                conflict.resolution = Some(resolution.trim().to_string());
                true
            }
            None => false,
        }
    }

    pub fn unresolved_conflicts(&self) -> impl Iterator<Item = &ConflictRecord> {
        self.conflicts.iter().filter(|c| !c.is_resolved())
    }
}
