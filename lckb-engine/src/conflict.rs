//! Conflict detection between newly arriving information and what the document
//! already holds.
//!
//! Three independent rule families run on every new item and every match is
//! logged; there is no precedence between families.

use chrono::{DateTime, Utc};
use lckb_core::{
    ClinicalDocument, ConflictRecord, ConflictRule, ObservationStatus, SafetyFlag, Severity,
};
use tracing::debug;

use crate::rules::CompiledRules;

/// Where a new piece of text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemSource {
    LabResult,
    NursingNote,
    Dictation,
    Observation,
    NurseMessage,
}

#[derive(Debug, Clone, Copy)]
pub struct NewItem<'a> {
    pub text: &'a str,
    pub source: ItemSource,
}

impl<'a> NewItem<'a> {
    pub fn new(text: &'a str, source: ItemSource) -> Self {
        Self { text, source }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConflictCandidate {
    pub item_a: String,
    pub item_b: String,
    pub severity: Severity,
    pub rule: ConflictRule,
    /// Safety flag raised alongside a newly logged conflict.
    pub safety_flag: Option<String>,
}

/// Everything the detector found for one new item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detection {
    pub candidates: Vec<ConflictCandidate>,
    /// Active "no data" observations contradicted by the new item.
    pub invalidate: Vec<String>,
    /// The new item is itself an absence claim contradicted by existing data.
    pub new_item_contradicted: bool,
}

impl Detection {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty() && self.invalidate.is_empty() && !self.new_item_contradicted
    }
}

/// Runs every rule family against `item`.
pub fn detect(doc: &ClinicalDocument, item: NewItem<'_>, rules: &CompiledRules) -> Detection {
    let mut detection = Detection::default();
    no_data_contradictions(doc, item, rules, &mut detection);
    medication_contraindications(doc, item, rules, &mut detection);
    assessment_contradictions(doc, item, rules, &mut detection);
    detection
}

/// Logs candidates (deduplicated against unresolved conflicts), raises safety
/// flags for newly logged critical conflicts and invalidates contradicted
/// absence observations. Returns the ids of newly logged conflicts.
pub fn apply(doc: &mut ClinicalDocument, detection: Detection, now: DateTime<Utc>) -> Vec<String> {
    let mut logged = Vec::new();
    for candidate in detection.candidates {
        if doc
            .session
            .has_open_conflict(&candidate.item_a, &candidate.item_b)
        {
            continue;
        }
        let id = doc.mint_id("cfl");
        let record = ConflictRecord {
            id,
            item_a: candidate.item_a,
            item_b: candidate.item_b,
            severity: candidate.severity,
            rule: candidate.rule,
            detected_at: now,
            resolved_at: None,
            resolution: None,
        };
        if let Some(id) = doc.session.log_conflict(record).inserted() {
            debug!(conflict = %id, rule = ?candidate.rule, "conflict logged");
            if let Some(text) = candidate.safety_flag {
                let _ = doc.session.add_safety_flag(SafetyFlag {
                    text,
                    severity: candidate.severity,
                    timestamp: now,
                });
            }
            logged.push(id);
        }
    }

    for id in detection.invalidate {
        if let Some(observation) = doc.session.observation_mut(&id) {
            if observation.is_active() {
                observation.status = ObservationStatus::Invalidated;
                debug!(observation = %id, "absence observation invalidated by new data");
            }
        }
    }
    logged
}

/// Whether `data_text` speaks to what `absence_text` claims is missing.
fn covers_absence(
    absence_text: &str,
    data_text: &str,
    data_source: Option<ItemSource>,
    rules: &CompiledRules,
) -> bool {
    let analytes = rules.named_analytes(absence_text);
    if !analytes.is_empty() {
        let present = rules.named_analytes(data_text);
        return analytes.iter().any(|a| present.contains(a));
    }
    if rules.mentions_vitals(absence_text)
        && !rules.mentions_labs(absence_text)
        && data_source == Some(ItemSource::LabResult)
    {
        return false;
    }
    if !rules.topics_of(absence_text).is_empty() {
        return rules.share_topic(absence_text, data_text);
    }
    true
}

fn no_data_contradictions(
    doc: &ClinicalDocument,
    item: NewItem<'_>,
    rules: &CompiledRules,
    detection: &mut Detection,
) {
    // A stored lab result is data whatever its unit looks like.
    let new_presence =
        item.source == ItemSource::LabResult || rules.asserts_presence(item.text);
    let new_absence = item.source != ItemSource::LabResult && rules.asserts_absence(item.text);
    if !new_presence && !new_absence {
        return;
    }

    for observation in doc.session.active_observations() {
        if observation.text == item.text {
            continue;
        }
        if new_presence
            && rules.asserts_absence(&observation.text)
            && covers_absence(&observation.text, item.text, Some(item.source), rules)
        {
            detection.candidates.push(ConflictCandidate {
                item_a: observation.text.clone(),
                item_b: item.text.to_string(),
                severity: Severity::Warning,
                rule: ConflictRule::NoDataContradiction,
                safety_flag: None,
            });
            detection.invalidate.push(observation.id.clone());
        } else if new_absence
            && rules.asserts_presence(&observation.text)
            && covers_absence(item.text, &observation.text, None, rules)
        {
            detection.candidates.push(ConflictCandidate {
                item_a: observation.text.clone(),
                item_b: item.text.to_string(),
                severity: Severity::Warning,
                rule: ConflictRule::NoDataContradiction,
                safety_flag: None,
            });
            if item.source == ItemSource::Observation {
                detection.new_item_contradicted = true;
            }
        }
    }
}

/// Clinical sources checked for contraindication phrases.
fn clinical_sources(doc: &ClinicalDocument) -> Vec<&str> {
    let session = &doc.session;
    session
        .active_observations()
        .map(|o| o.text.as_str())
        .chain(session.doctor_dictation.iter().map(|d| d.text.as_str()))
        .chain(doc.problem_matrix.active_problems().map(|p| p.name.as_str()))
        .chain(
            session
                .nurse_conversation
                .messages
                .iter()
                .map(|m| m.text.as_str()),
        )
        .collect()
}

fn medication_contraindications(
    doc: &ClinicalDocument,
    item: NewItem<'_>,
    rules: &CompiledRules,
    detection: &mut Detection,
) {
    let mentioned: Vec<_> = rules
        .medication_rules()
        .iter()
        .filter_map(|rule| rule.medication_in(item.text).map(|med| (rule, med)))
        .collect();
    if mentioned.is_empty() {
        return;
    }

    let sources = clinical_sources(doc);
    for (rule, medication) in mentioned {
        for source in &sources {
            if *source == item.text {
                continue;
            }
            let Some(contraindication) = rule.contraindication_in(source) else {
                continue;
            };
            let safety_flag = (rule.rule.severity == Severity::Critical).then(|| {
                format!(
                    "CONTRAINDICATION: {} ({medication}) ordered/mentioned with documented {contraindication}",
                    rule.rule.name
                )
            });
            detection.candidates.push(ConflictCandidate {
                item_a: source.to_string(),
                item_b: item.text.to_string(),
                severity: rule.rule.severity,
                rule: ConflictRule::MedicationContraindication,
                safety_flag,
            });
        }
    }
}

fn assessment_contradictions(
    doc: &ClinicalDocument,
    item: NewItem<'_>,
    rules: &CompiledRules,
    detection: &mut Detection,
) {
    for observation in doc.session.active_observations() {
        if observation.text == item.text {
            continue;
        }
        if rules.opposite_terms(item.text, &observation.text).is_none() {
            continue;
        }
        if !rules.share_topic(item.text, &observation.text) {
            continue;
        }
        detection.candidates.push(ConflictCandidate {
            item_a: observation.text.clone(),
            item_b: item.text.to_string(),
            severity: Severity::Warning,
            rule: ConflictRule::AssessmentContradiction,
            safety_flag: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use lckb_core::{DictationEntry, Observation, Problem};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap()
    }

    fn doc_with_observations(texts: &[&str]) -> ClinicalDocument {
        let mut doc = ClinicalDocument::create("pt-1", now());
        for text in texts {
            let id = doc.mint_id("obs");
            doc.session.ai_observations.push(Observation {
                id,
                text: text.to_string(),
                timestamp: now(),
                status: ObservationStatus::Active,
                superseded_by: None,
                category: None,
                version: 1,
            });
        }
        doc
    }

    #[test]
    fn data_contradicts_absence_observation() {
        let doc = doc_with_observations(&["No labs available yet"]);
        let detection = detect(
            &doc,
            NewItem::new("Potassium 7 mEq/L", ItemSource::LabResult),
            &CompiledRules::builtin(),
        );
        assert_eq!(detection.candidates.len(), 1);
        assert_eq!(detection.candidates[0].rule, ConflictRule::NoDataContradiction);
        assert_eq!(detection.invalidate, vec!["obs-1".to_string()]);
    }

    #[test]
    fn specific_absence_needs_matching_analyte() {
        let doc = doc_with_observations(&["No troponin results available"]);
        let rules = CompiledRules::builtin();
        let sodium = NewItem::new("Sodium 138 mEq/L", ItemSource::LabResult);
        assert!(detect(&doc, sodium, &rules).is_empty());
        let troponin = NewItem::new("Troponin 0.02 ng/mL", ItemSource::LabResult);
        let related = detect(&doc, troponin, &rules);
        assert_eq!(related.invalidate.len(), 1);
    }

    #[test]
    fn anticoagulation_against_gi_bleed_is_critical() {
        let mut doc = doc_with_observations(&["GI bleed, anticoagulation contraindicated"]);
        let detection = detect(
            &doc,
            NewItem::new("Plan: start anticoagulation for new AF", ItemSource::Dictation),
            &CompiledRules::builtin(),
        );
        let candidate = detection
            .candidates
            .iter()
            .find(|c| c.rule == ConflictRule::MedicationContraindication)
            .expect("contraindication candidate");
        assert_eq!(candidate.severity, Severity::Critical);
        assert!(candidate.safety_flag.is_some());

        let logged = apply(&mut doc, detection, now());
        assert_eq!(logged.len(), 1);
        assert_eq!(doc.session.safety_flags.len(), 1);
        assert!(doc.session.safety_flags[0].text.starts_with("CONTRAINDICATION: Anticoagulant"));
    }

    #[test]
    fn metformin_rule_is_warning_and_reads_problem_list() {
        let mut doc = ClinicalDocument::create("pt-1", now());
        let _ = doc
            .problem_matrix
            .upsert_problem(Problem::new("p-aki", "Acute kidney injury"));
        doc.session.doctor_dictation.push(DictationEntry {
            timestamp: now(),
            text: "Renal function reviewed".to_string(),
        });
        let detection = detect(
            &doc,
            NewItem::new("Resume metformin 500 mg BID", ItemSource::NurseMessage),
            &CompiledRules::builtin(),
        );
        assert_eq!(detection.candidates.len(), 1);
        assert_eq!(detection.candidates[0].severity, Severity::Warning);
        assert_eq!(detection.candidates[0].item_a, "Acute kidney injury");
        assert!(detection.candidates[0].safety_flag.is_none());
    }

    #[test]
    fn opposite_terms_need_shared_topic() {
        let doc = doc_with_observations(&["Renal function improving, creatinine down"]);
        let rules = CompiledRules::builtin();
        let pain = NewItem::new("Pain worsening overnight", ItemSource::NursingNote);
        let unrelated = detect(&doc, pain, &rules);
        assert!(unrelated.candidates.is_empty());
        let related = detect(&doc, NewItem::new("AKI worsening", ItemSource::NursingNote), &rules);
        assert_eq!(related.candidates.len(), 1);
        assert_eq!(related.candidates[0].rule, ConflictRule::AssessmentContradiction);
    }

    #[test]
    fn repeated_detection_logs_once() {
        let mut doc = doc_with_observations(&["Sepsis improving on antibiotics"]);
        let rules = CompiledRules::builtin();
        let item = NewItem::new("Sepsis worsening, lactate up", ItemSource::NursingNote);
        let first = detect(&doc, item, &rules);
        assert_eq!(apply(&mut doc, first, now()).len(), 1);
        let second = detect(&doc, item, &rules);
        assert!(apply(&mut doc, second, now()).is_empty());
        assert_eq!(doc.session.conflicts.len(), 1);
    }
}
