//! Persisted form of a document: a versioned JSON envelope.

use chrono::{DateTime, Utc};
use lckb_core::{ClinicalDocument, LckbError, LckbResult, SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const FORMAT: &str = "lckb";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub format: String,
    pub schema_version: u32,
    pub saved_at: DateTime<Utc>,
    pub document: ClinicalDocument,
}

pub fn encode(doc: &ClinicalDocument, saved_at: DateTime<Utc>) -> LckbResult<String> {
    let envelope = EnvelopeRef {
        format: FORMAT,
        schema_version: SCHEMA_VERSION,
        saved_at,
        document: doc,
    };
    serde_json::to_string(&envelope).map_err(|err| LckbError::Store(err.to_string()))
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    format: &'a str,
    schema_version: u32,
    saved_at: DateTime<Utc>,
    document: &'a ClinicalDocument,
}

pub fn decode_envelope(text: &str) -> LckbResult<Envelope> {
    let envelope: Envelope =
        serde_json::from_str(text).map_err(|err| LckbError::Deserialization(err.to_string()))?;
    if envelope.format != FORMAT {
        return Err(LckbError::Deserialization(format!(
            "unexpected format {}",
            envelope.format
        )));
    }
    if envelope.schema_version > SCHEMA_VERSION {
        return Err(LckbError::Deserialization(format!(
            "schema version {} is newer than supported {SCHEMA_VERSION}",
            envelope.schema_version
        )));
    }
    Ok(envelope)
}

/// Decodes a persisted document and records the load time in
/// `metadata.last_rehydrated_at`. The chart watermark is left as saved so a
/// later `refresh` still picks up records charted while the document was
/// stored.
pub fn rehydrate(text: &str, loaded_at: DateTime<Utc>) -> LckbResult<ClinicalDocument> {
    let mut doc = decode_envelope(text)?.document;
    doc.metadata.last_rehydrated_at = Some(loaded_at);
    Ok(doc)
}

/// `saved_at` of an envelope without decoding the document body.
pub fn saved_at(text: &str) -> Option<DateTime<Utc>> {
    let value: Value = serde_json::from_str(text).ok()?;
    value
        .get("saved_at")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::updater::DocumentUpdater;
    use chrono::TimeZone;
    use lckb_core::{ConditionTrend, DictationEntry, Severity};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, hour, 0, 0).unwrap()
    }

    #[test]
    fn every_tier_round_trips() {
        let up = DocumentUpdater::default().with_clock(at(9));
        let mut doc = ClinicalDocument::create("pt-1", at(8));
        let _ = up.add_ai_observation(&mut doc, "Renal function improving", Some("renal"));
        let _ = up.add_pending_decision(&mut doc, "Restart lisinopril?", None);
        let _ = up.add_active_condition(&mut doc, "AKI", ConditionTrend::Improving);
        let _ = up.add_background_fact(&mut doc, "CKD stage 3 baseline");
        let _ = up.add_safety_flag(&mut doc, "Fall risk", Severity::Warning);
        up.add_doctor_dictation(
            &mut doc,
            DictationEntry {
                timestamp: at(9),
                text: "Impression: prerenal AKI".to_string(),
            },
        );

        let text = encode(&doc, at(10)).unwrap();
        assert_eq!(saved_at(&text), Some(at(10)));
        let envelope = decode_envelope(&text).unwrap();
        assert_eq!(envelope.format, "lckb");
        assert_eq!(envelope.document, doc);
    }

    #[test]
    fn rehydrate_keeps_chart_watermark() {
        let mut doc = ClinicalDocument::create("pt-1", at(8));
        doc.advance_loaded_watermark(at(7));
        let text = encode(&doc, at(9)).unwrap();
        let loaded = rehydrate(&text, at(11)).unwrap();
        assert_eq!(loaded.metadata.last_loaded_timestamp, Some(at(7)));
        assert_eq!(loaded.metadata.last_rehydrated_at, Some(at(11)));
    }

    #[test]
    fn corrupt_or_foreign_payloads_fail() {
        assert!(matches!(
            rehydrate("{not json", at(1)),
            Err(LckbError::Deserialization(_))
        ));
        let doc = ClinicalDocument::create("pt-1", at(8));
        let foreign = encode(&doc, at(9)).unwrap().replace("\"lckb\"", "\"other\"");
        assert!(matches!(
            decode_envelope(&foreign),
            Err(LckbError::Deserialization(_))
        ));
    }
}
