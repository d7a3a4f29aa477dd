use chrono::{DateTime, TimeZone, Utc};
use lckb_core::{ClinicalDocument, Priority, ProblemStatus, VitalsReading};
use lckb_engine::{
    codec, load_document, save_document, ChartData, ChartSource, DocumentBuilder, DocumentStore,
    DocumentUpdater, FhirBundleSource, FileStore, JsonDirectorySource, MemorySource,
};

fn fixture_dir(name: &str) -> String {
    format!("{}/tests/data/{name}", env!("CARGO_MANIFEST_DIR"))
}

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 5, hour, minute, 0).unwrap()
}

fn build(source: &dyn ChartSource, patient: &str) -> (DocumentUpdater, ClinicalDocument) {
    let updater = DocumentUpdater::default().with_clock(at(12, 0));
    let doc = DocumentBuilder::new(source, &updater)
        .build_full(patient)
        .expect("chart fixture should build");
    (updater, doc)
}

#[test]
fn chart_directory_builds_every_section() {
    let source = JsonDirectorySource::new(fixture_dir("charts"));
    let (_, doc) = build(&source, "pt-100");

    assert_eq!(doc.problem_matrix.problems.len(), 2);
    assert_eq!(doc.problem_matrix.problems["p-hyperk"].priority, Priority::High);
    assert_eq!(doc.longitudinal.encounters.len(), 1);
    assert_eq!(doc.longitudinal.vitals.len(), 2);
    assert!(doc.longitudinal.labs.contains_key("Potassium"));
    assert!(doc.longitudinal.labs.contains_key("Sodium"));
    assert!(!doc.longitudinal.labs.contains_key("Creatinine"));
    assert_eq!(doc.longitudinal.medication_changes.len(), 1);
    assert_eq!(doc.longitudinal.nursing_notes.len(), 1);
    assert!(doc
        .narrative
        .patient_voice
        .iter()
        .any(|quote| quote == "my legs feel heavy"));

    assert!(doc
        .session
        .safety_flags
        .iter()
        .any(|flag| flag.text.contains("CRITICAL HIGH Potassium: 7 mEq/L")));
    assert!(doc
        .session
        .safety_flags
        .iter()
        .all(|flag| !flag.text.contains("Tachycardia")));

    assert_eq!(doc.metadata.last_loaded_timestamp, Some(at(7, 0)));
    assert_eq!(doc.ai_memory.last_full_ingestion, Some(at(12, 0)));
}

#[test]
fn repeated_refresh_is_a_no_op() {
    let source = JsonDirectorySource::new(fixture_dir("charts"));
    let (updater, mut doc) = build(&source, "pt-100");
    let builder = DocumentBuilder::new(&source, &updater);
    let before = doc.clone();

    let summary = builder
        .update_since(&mut doc, DateTime::<Utc>::MIN_UTC)
        .unwrap();
    assert!(summary.is_empty(), "unexpected changes: {summary:?}");
    assert_eq!(doc, before);

    let summary = builder.refresh(&mut doc).unwrap();
    assert!(summary.is_empty());
    assert_eq!(doc, before);
}

#[test]
fn missing_chart_degrades_to_empty_document() {
    let source = JsonDirectorySource::new(fixture_dir("charts"));
    let updater = DocumentUpdater::default().with_clock(at(12, 0));
    let builder = DocumentBuilder::new(&source, &updater);

    assert!(builder.build_full("pt-missing").is_err());
    assert!(builder.build_full("../charts/pt-100").is_err());
    let doc = builder.build_or_empty("pt-missing");
    assert_eq!(doc.patient_id(), "pt-missing");
    assert!(!doc.has_clinical_data());
}

#[test]
fn fhir_bundle_maps_resources_into_chart() {
    let source = FhirBundleSource::new(fixture_dir("fhir"));
    let (_, doc) = build(&source, "pt-200");

    let sepsis = &doc.problem_matrix.problems["cond-sepsis"];
    assert_eq!(sepsis.name, "Sepsis");
    assert_eq!(sepsis.status, ProblemStatus::Active);
    assert_eq!(sepsis.priority, Priority::High);

    assert_eq!(doc.longitudinal.vitals.len(), 1);
    let reading = &doc.longitudinal.vitals[0];
    assert_eq!(reading.systolic, Some(84.0));
    assert_eq!(reading.diastolic, Some(50.0));
    assert_eq!(reading.heart_rate, Some(38.0));
    let temperature = reading.temperature.expect("temperature converted");
    assert!((temperature - 102.2).abs() < 1e-9);

    let lactate = &doc.longitudinal.labs["Lactate"];
    assert_eq!(lactate.len(), 1);

    assert_eq!(doc.longitudinal.encounters.len(), 1);
    assert_eq!(doc.longitudinal.nursing_notes.len(), 1);
    assert_eq!(
        doc.longitudinal.nursing_notes[0].author.as_deref(),
        Some("RN Pham")
    );
    assert_eq!(doc.longitudinal.medication_changes.len(), 1);
    assert_eq!(
        doc.longitudinal.medication_changes[0].dose.as_deref(),
        Some("1.25 g IV q12h")
    );

    let flags: Vec<&str> = doc
        .session
        .safety_flags
        .iter()
        .map(|flag| flag.text.as_str())
        .collect();
    assert!(flags.iter().any(|f| f.starts_with("CRITICAL Bradycardia")), "{flags:?}");
    assert!(flags.iter().any(|f| f.starts_with("CRITICAL Hypotension")), "{flags:?}");
    assert!(flags.iter().any(|f| f.starts_with("Fever")), "{flags:?}");
}

#[test]
fn built_document_survives_file_store() {
    let source = JsonDirectorySource::new(fixture_dir("charts"));
    let (_, doc) = build(&source, "pt-100");
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();

    save_document(&store, &doc, at(12, 5)).unwrap();
    let loaded = load_document(&store, "pt-100", at(13, 0))
        .unwrap()
        .expect("document was saved");
    assert_eq!(loaded.metadata.last_loaded_timestamp, Some(at(7, 0)));
    assert_eq!(loaded.metadata.last_rehydrated_at, Some(at(13, 0)));

    let stored = store.get("lckb:pt-100").unwrap().expect("payload on disk");
    assert_eq!(codec::decode_envelope(&stored).unwrap().document, doc);
}

#[test]
fn refresh_after_reload_picks_up_records_charted_meanwhile() {
    let reading = |hour, heart_rate| VitalsReading {
        timestamp: at(hour, 0),
        heart_rate: Some(heart_rate),
        ..VitalsReading::default()
    };
    let source = MemorySource::new().with_chart(
        "pt-300",
        ChartData {
            vitals: vec![reading(6, 82.0)],
            ..ChartData::default()
        },
    );
    let updater = DocumentUpdater::default().with_clock(at(7, 0));
    let doc = DocumentBuilder::new(&source, &updater)
        .build_full("pt-300")
        .unwrap();
    let text = codec::encode(&doc, at(7, 0)).unwrap();

    source.insert(
        "pt-300",
        ChartData {
            vitals: vec![reading(6, 82.0), reading(8, 160.0)],
            ..ChartData::default()
        },
    );
    let mut loaded = codec::rehydrate(&text, at(10, 0)).unwrap();
    let later = DocumentUpdater::default().with_clock(at(10, 0));
    let summary = DocumentBuilder::new(&source, &later)
        .refresh(&mut loaded)
        .unwrap();

    assert_eq!(summary.vitals, 1);
    assert_eq!(summary.flags, 1);
    assert_eq!(loaded.longitudinal.vitals.len(), 2);
    assert_eq!(loaded.metadata.last_loaded_timestamp, Some(at(8, 0)));
    assert!(loaded
        .session
        .safety_flags
        .iter()
        .any(|flag| flag.text.starts_with("CRITICAL Tachycardia")));
}
