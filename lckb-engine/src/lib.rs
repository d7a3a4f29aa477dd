//! Ingestion, conflict detection, pruning and persistence for LCKB documents.
//!
//! [`DocumentUpdater`] is the single entry point for mutating a
//! [`ClinicalDocument`](lckb_core::ClinicalDocument). [`DocumentBuilder`] replays a
//! whole chart from a [`ChartSource`]; [`store`] and [`codec`] persist the result.

pub mod alerts;
pub mod builder;
pub mod codec;
pub mod conflict;
pub mod events;
pub mod extract;
mod fields;
pub mod prune;
pub mod rules;
pub mod source;
pub mod store;
pub mod updater;
pub mod writeback;

pub use builder::{apply_chart, DocumentBuilder, UpdateSummary};
pub use codec::{decode_envelope, encode, rehydrate, Envelope};
pub use conflict::{ConflictCandidate, Detection, ItemSource, NewItem};
pub use events::ClinicalEvent;
pub use prune::{prune_key_findings, prune_observations, PruneReport};
pub use rules::{CompiledRules, RuleSet};
pub use source::{
    chart_from_bundle, chart_from_bundle_str, chart_from_value, ChartData, ChartSource,
    FhirBundleSource, JsonDirectorySource, MemorySource, SourceError,
};
pub use store::{
    delete_document, load_document, save_document, DocumentStore, FileStore, MemoryStore,
    StoreError,
};
pub use updater::{DocumentUpdater, IngestReport, Supersede};
pub use writeback::{
    ConditionUpdate, DecisionResolution, DetectedConflict, MemoryClassification, MemoryUpdate,
    MemoryWriteReport, WriteBackResult,
};
