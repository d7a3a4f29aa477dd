use std::fs;

use chrono::{DateTime, TimeZone, Utc};
use lckb_core::{
    ClinicalDocument, LabPanel, LabResult, LckbError, ObservationStatus, Severity, VitalsReading,
};
use lckb_engine::{codec, ClinicalEvent, DocumentUpdater, IngestReport};
use proptest::prelude::*;

fn fixture_path(name: &str) -> String {
    format!("{}/tests/data/{name}", env!("CARGO_MANIFEST_DIR"))
}

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 5, hour, minute, 0).unwrap()
}

fn replay(updater: &DocumentUpdater, doc: &mut ClinicalDocument) -> (IngestReport, usize) {
    let lines = fs::read_to_string(fixture_path("events/pt-100.jsonl")).unwrap();
    let mut total = IngestReport::default();
    let mut rejected = 0;
    for line in lines.lines().filter(|l| !l.trim().is_empty()) {
        match ClinicalEvent::from_json(line, at(8, 30)) {
            Ok(event) => total += updater.apply_event(doc, event),
            Err(LckbError::InvalidEvent(_)) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    (total, rejected)
}

#[test]
fn event_stream_populates_document() {
    let updater = DocumentUpdater::default().with_clock(at(9, 0));
    let mut doc = ClinicalDocument::create("pt-100", at(7, 0));
    let (report, rejected) = replay(&updater, &mut doc);

    assert_eq!(rejected, 1);
    assert!(report.records >= 4);
    let flags: Vec<&str> = doc
        .session
        .safety_flags
        .iter()
        .map(|f| f.text.as_str())
        .collect();
    assert!(flags.contains(&"CRITICAL Tachycardia: HR 155 bpm"), "{flags:?}");
    assert!(flags.iter().any(|f| f.contains("CRITICAL HIGH Potassium: 7 mEq/L")));
    assert!(flags.contains(&"Fall risk"));

    assert_eq!(doc.session.doctor_dictation.len(), 1);
    assert_eq!(doc.session.nurse_conversation.len(), 1);
    assert_eq!(doc.session.patient_conversation.len(), 1);
    assert_eq!(doc.longitudinal.medication_changes.len(), 1);
    assert_eq!(doc.metadata.last_updated, at(9, 0));
}

#[test]
fn replaying_events_does_not_duplicate_records() {
    let updater = DocumentUpdater::default().with_clock(at(9, 0));
    let mut doc = ClinicalDocument::create("pt-100", at(7, 0));
    replay(&updater, &mut doc);
    let flags = doc.session.safety_flags.len();
    let vitals = doc.longitudinal.vitals.len();

    let (again, _) = replay(&updater, &mut doc);
    assert_eq!(again.flags, 0);
    assert_eq!(again.conflicts, 0);
    assert_eq!(doc.session.safety_flags.len(), flags);
    assert_eq!(doc.longitudinal.vitals.len(), vitals);
    assert_eq!(doc.longitudinal.medication_changes.len(), 1);
}

#[test]
fn no_labs_statement_is_invalidated_once_labs_arrive() {
    let updater = DocumentUpdater::default().with_clock(at(9, 0));
    let mut doc = ClinicalDocument::create("pt-100", at(7, 0));
    let id = updater
        .add_ai_observation(&mut doc, "No labs available yet", Some("data"))
        .inserted()
        .expect("first observation is recorded");

    let panel = ClinicalEvent::from_json(
        r#"{"type": "labs", "timestamp": "2024-03-05T08:45:00Z",
            "results": [{"name": "CBC WBC", "value": 11.2, "unit": "K/uL"}]}"#,
        at(9, 0),
    )
    .unwrap();
    updater.apply_event(&mut doc, panel);

    assert_eq!(
        doc.session.observation(&id).map(|o| o.status),
        Some(ObservationStatus::Invalidated)
    );
    assert_eq!(doc.session.active_observations().count(), 0);

    let _ = updater.add_ai_observation(&mut doc, "No labs available yet", None);
    assert_eq!(doc.session.active_observations().count(), 0);
}

#[test]
fn labs_without_standard_units_still_count_as_labs() {
    let updater = DocumentUpdater::default().with_clock(at(9, 0));
    let mut doc = ClinicalDocument::create("pt-100", at(7, 0));
    let id = updater
        .add_ai_observation(&mut doc, "No labs available yet", None)
        .inserted()
        .expect("first observation is recorded");

    let panel = ClinicalEvent::from_json(
        r#"{"type": "labs", "timestamp": "2024-03-05T08:45:00Z",
            "results": [{"name": "BNP", "value": 450, "unit": "pg/mL"}, {"name": "WBC", "value": 12}]}"#,
        at(9, 0),
    )
    .unwrap();
    let report = updater.apply_event(&mut doc, panel);

    assert_eq!(report.records, 2);
    assert_eq!(
        doc.session.observation(&id).map(|o| o.status),
        Some(ObservationStatus::Invalidated)
    );
    assert_eq!(doc.session.active_observations().count(), 0);
}

#[test]
fn anticoagulation_plan_conflicts_with_bleed() {
    let updater = DocumentUpdater::default().with_clock(at(9, 0));
    let mut doc = ClinicalDocument::create("pt-100", at(7, 0));
    let _ = updater.add_ai_observation(&mut doc, "GI bleed, anticoagulation contraindicated", None);

    let dictation = r#"{"type": "dictation", "text": "Plan: start anticoagulation for new AF"}"#;
    let plan = || ClinicalEvent::from_json(dictation, at(9, 0)).unwrap();
    let first = updater.apply_event(&mut doc, plan());
    let second = updater.apply_event(&mut doc, plan());

    assert_eq!(first.conflicts, 1);
    assert_eq!(second.conflicts, 0);
    assert_eq!(doc.session.conflicts.len(), 1);
    assert_eq!(doc.session.conflicts[0].severity, Severity::Critical);
    assert_eq!(
        doc.session
            .safety_flags
            .iter()
            .filter(|f| f.severity == Severity::Critical)
            .count(),
        1
    );
}

#[test]
fn reviewed_and_pending_never_overlap() {
    let updater = DocumentUpdater::default().with_clock(at(9, 0));
    let mut doc = ClinicalDocument::create("pt-100", at(7, 0));

    let _ = updater.add_pending_item(&mut doc, "potassium recheck");
    let _ = updater.mark_reviewed(&mut doc, "potassium recheck");
    assert!(doc.session.pending_items.is_empty());
    assert!(doc.session.reviewed_items.contains("potassium recheck"));

    let _ = updater.add_pending_item(&mut doc, "potassium recheck");
    assert!(doc.session.reviewed_items.is_empty());
    assert!(doc.session.pending_items.contains("potassium recheck"));
}

#[test]
fn reset_then_round_trip() {
    let updater = DocumentUpdater::default().with_clock(at(9, 0));
    let mut doc = ClinicalDocument::create("pt-100", at(7, 0));
    replay(&updater, &mut doc);
    updater.reset(&mut doc);
    assert!(doc.session.safety_flags.is_empty());
    assert!(doc.session.doctor_dictation.is_empty());
    assert!(!doc.longitudinal.vitals.is_empty());

    let text = codec::encode(&doc, at(9, 5)).unwrap();
    assert_eq!(codec::decode_envelope(&text).unwrap().document, doc);
}

proptest! {
    #[test]
    fn active_observations_stay_bounded(words in prop::collection::vec("[a-z]{4,10}", 1..90)) {
        let updater = DocumentUpdater::default().with_clock(at(9, 0));
        let mut doc = ClinicalDocument::create("pt-100", at(7, 0));
        for (i, word) in words.iter().enumerate() {
            let _ = updater.add_ai_observation(&mut doc, &format!("Finding {i} {word}"), None);
        }
        let config = updater.config();
        prop_assert!(doc.session.active_observations().count() <= config.max_active_observations);
        prop_assert!(
            doc.session.ai_observations.len()
                <= config.max_active_observations + config.inactive_retention
        );
    }

    #[test]
    fn arbitrary_readings_survive_encoding(
        temperature in prop::num::f64::NORMAL,
        heart_rate in prop::num::f64::NORMAL,
        lactate in prop::num::f64::NORMAL,
    ) {
        let updater = DocumentUpdater::default().with_clock(at(9, 0));
        let mut doc = ClinicalDocument::create("pt-100", at(7, 0));
        updater.add_vitals(
            &mut doc,
            VitalsReading {
                timestamp: at(8, 0),
                temperature: Some(temperature),
                heart_rate: Some(heart_rate),
                ..VitalsReading::default()
            },
        );
        updater.add_lab_results(
            &mut doc,
            LabPanel {
                name: None,
                timestamp: at(8, 15),
                results: vec![LabResult {
                    name: "Lactate".to_string(),
                    value: lactate,
                    unit: Some("mmol/L".to_string()),
                    timestamp: at(8, 15),
                    flag: None,
                    reference_range: None,
                }],
            },
        );

        let text = codec::encode(&doc, at(9, 5)).unwrap();
        prop_assert_eq!(codec::decode_envelope(&text).unwrap().document, doc);
    }

    #[test]
    fn heart_rate_bands(rate in 20.0f64..220.0) {
        let updater = DocumentUpdater::default().with_clock(at(9, 0));
        let mut doc = ClinicalDocument::create("pt-100", at(7, 0));
        let event = ClinicalEvent::from_json(
            &format!(r#"{{"type": "vitals", "timestamp": "2024-03-05T08:00:00Z", "hr": {rate}}}"#),
            at(9, 0),
        )
        .unwrap();
        updater.apply_event(&mut doc, event);
        let worst = doc.session.safety_flags.iter().map(|f| f.severity).min();
        if !(40.0..=150.0).contains(&rate) {
            prop_assert_eq!(worst, Some(Severity::Critical));
        } else if (50.0..=120.0).contains(&rate) {
            prop_assert_eq!(worst, None);
        }
    }
}
