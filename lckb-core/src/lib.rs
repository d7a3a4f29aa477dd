//! Mô hình dữ liệu lõi của Longitudinal Clinical Knowledge Base (LCKB).
//!
//! Crate này chỉ chứa kiểu dữ liệu và các bất biến cục bộ (khử trùng lặp, loại trừ
//! lẫn nhau giữa các tầng, giới hạn kích thước). Việc nạp sự kiện, phát hiện mâu
//! thuẫn, cắt tỉa và lưu trữ nằm ở `lckb-engine`.

pub mod clinical;
pub mod config;
pub mod document;
pub mod error;
pub mod memory;
pub mod narrative;
pub mod problem;
pub mod session;
pub mod text;
pub mod trend;

pub use clinical::{
    Encounter, LabPanel, LabResult, MedicationAction, MedicationChange, NursingNote, VitalField,
    VitalsReading,
};
pub use config::{LckbConfig, PeriodGranularity};
pub use document::{ClinicalDocument, LongitudinalData, Metadata, ProblemMatrix, SCHEMA_VERSION};
pub use error::{Insertion, LckbError, LckbResult};
pub use memory::{AiMemory, InteractionEntry, ProblemInsight};
pub use narrative::ClinicalNarrative;
pub use problem::{
    PeriodBucket, Priority, Problem, ProblemStatus, ProblemTimeline, TimelineNote, TimelineVitals,
};
pub use session::{
    ActiveClinicalState, ActiveCondition, BackgroundFact, ConditionTrend, ConflictRecord,
    ConflictRule, ConversationMessage, ConversationWindow, DictationEntry, MessageRole,
    Observation, ObservationStatus, PendingDecision, SafetyFlag, SessionContext, Severity, Tier,
    Upsert,
};
pub use trend::{TrendEntry, TrendSeries};
