//! Configurable rule tables: vital/lab thresholds, text classifiers, medication
//! contraindications, opposite-term pairs and the clinical topic taxonomy.
//!
//! `RuleSet` is plain data (loadable from JSON); `CompiledRules` holds the
//! compiled regexes and is what the updater consults.

use lckb_core::text::tokenize;
use lckb_core::{LckbError, LckbResult, Severity, VitalField};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Low,
    High,
}

/// Tiered threshold for one vital field in one direction. Comparisons are strict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VitalThreshold {
    pub field: VitalField,
    pub direction: Direction,
    pub label: String,
    pub warning: Option<f64>,
    pub critical: Option<f64>,
}

impl VitalThreshold {
    fn breaches(&self, value: f64, limit: f64) -> bool {
        match self.direction {
            Direction::Low => value < limit,
            Direction::High => value > limit,
        }
    }

    /// Most severe tier breached by `value`, if any.
    pub fn evaluate(&self, value: f64) -> Option<Severity> {
        if self.critical.is_some_and(|limit| self.breaches(value, limit)) {
            Some(Severity::Critical)
        } else if self.warning.is_some_and(|limit| self.breaches(value, limit)) {
            Some(Severity::Warning)
        } else {
            None
        }
    }
}

/// Named critical lab threshold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CriticalLabRule {
    pub analyte: String,
    pub keywords: Vec<String>,
    pub low: Option<f64>,
    pub high: Option<f64>,
    pub unit: String,
}

/// Aliases this short (`k`, `na`, `cr`) only match as the first word of a name.
const SHORT_ALIAS_LEN: usize = 3;

impl CriticalLabRule {
    /// Keywords match whole words of the lab name, never word fragments.
    pub fn matches(&self, lab_name: &str) -> bool {
        let tokens = tokenize(lab_name);
        self.keywords.iter().any(|keyword| {
            let wanted = tokenize(keyword);
            match wanted.as_slice() {
                [] => false,
                [alias] if alias.len() <= SHORT_ALIAS_LEN => tokens.first() == Some(alias),
                _ => tokens
                    .windows(wanted.len())
                    .any(|window| window == wanted.as_slice()),
            }
        })
    }
}

/// Medication class and the phrases that contraindicate it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MedicationRule {
    pub name: String,
    pub medications: Vec<String>,
    pub contraindications: Vec<String>,
    pub severity: Severity,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OppositePair {
    pub first: String,
    pub second: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicCategory {
    pub name: String,
    pub keywords: Vec<String>,
}

/// Keyword group contributing `weight` to a key finding's relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FindingWeight {
    pub weight: f64,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuleSet {
    pub vital_thresholds: Vec<VitalThreshold>,
    pub critical_labs: Vec<CriticalLabRule>,
    /// Lab flags that mark a result critical regardless of thresholds.
    pub critical_lab_flags: Vec<String>,
    pub no_data_patterns: Vec<String>,
    pub has_data_patterns: Vec<String>,
    pub medication_rules: Vec<MedicationRule>,
    pub opposite_terms: Vec<OppositePair>,
    pub topics: Vec<TopicCategory>,
    /// Analyte names that make a "no data" statement specific to one lab.
    pub lab_keywords: Vec<String>,
    pub vital_terms: Vec<String>,
    pub lab_terms: Vec<String>,
    pub concern_keywords: Vec<String>,
    pub assessment_keywords: Vec<String>,
    pub finding_weights: Vec<FindingWeight>,
    pub no_data_finding_penalty: f64,
    pub problem_duplicate_penalty: f64,
}

fn words(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn vital(
    field: VitalField,
    direction: Direction,
    label: &str,
    warning: Option<f64>,
    critical: Option<f64>,
) -> VitalThreshold {
    VitalThreshold {
        field,
        direction,
        label: label.to_string(),
        warning,
        critical,
    }
}

fn lab(
    analyte: &str,
    keywords: &[&str],
    low: Option<f64>,
    high: Option<f64>,
    unit: &str,
) -> CriticalLabRule {
    CriticalLabRule {
        analyte: analyte.to_string(),
        keywords: words(keywords),
        low,
        high,
        unit: unit.to_string(),
    }
}

fn topic(name: &str, keywords: &[&str]) -> TopicCategory {
    TopicCategory {
        name: name.to_string(),
        keywords: words(keywords),
    }
}

fn pair(first: &str, second: &str) -> OppositePair {
    OppositePair {
        first: first.to_string(),
        second: second.to_string(),
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        use Direction::{High, Low};
        use VitalField::*;

        Self {
            vital_thresholds: vec![
                vital(Systolic, Low, "Hypotension", None, Some(90.0)),
                vital(Systolic, High, "Hypertensive urgency", Some(180.0), None),
                vital(HeartRate, Low, "Bradycardia", Some(50.0), Some(40.0)),
                vital(HeartRate, High, "Tachycardia", Some(120.0), Some(150.0)),
                vital(Spo2, Low, "Hypoxia", Some(92.0), Some(88.0)),
                vital(RespiratoryRate, Low, "Bradypnea", Some(10.0), None),
                vital(RespiratoryRate, High, "Tachypnea", Some(24.0), None),
                vital(Temperature, Low, "Hypothermia", Some(96.0), None),
                vital(Temperature, High, "Fever", Some(101.3), None),
            ],
            critical_labs: vec![
                lab("Potassium", &["potassium", "k"], Some(2.5), Some(6.5), "mEq/L"),
                lab("Sodium", &["sodium", "na"], Some(120.0), Some(160.0), "mEq/L"),
                lab("Glucose", &["glucose", "glu"], Some(50.0), Some(400.0), "mg/dL"),
                lab("Hemoglobin", &["hemoglobin", "hgb", "hb"], Some(7.0), None, "g/dL"),
                lab("Troponin", &["troponin", "trop"], None, Some(0.04), "ng/mL"),
                lab("Creatinine", &["creatinine", "cr", "creat"], None, Some(10.0), "mg/dL"),
            ],
            critical_lab_flags: words(&["critical", "hh", "ll", "panic", "c"]),
            no_data_patterns: words(&[
                r"\bno\s+(?:data|results?|values?|labs?|vitals?|records?)\b",
                r"\bnot\s+(?:yet\s+)?(?:available|found|populated|resulted|on\s+file)\b",
                r"\b(?:data|results?|labs?|values?)\s+(?:are\s+|is\s+)?(?:unavailable|missing|pending)\b",
                r"\bnone\s+(?:available|recorded|on\s+file)\b",
            ]),
            has_data_patterns: words(&[
                r"\d+(?:\.\d+)?\s*(?:meq/l|mmol/l|mg/dl|g/dl|ng/ml|ng/l|u/l|iu/l|mmhg|bpm|%|°f|k/ul|x10\^?\d+/l)",
                r"\btrending\b",
                r"\blevels?\b",
                r"\b(?:increased|decreased|elevated|rose|fell)\s+(?:to|from)\s+\d",
            ]),
            medication_rules: vec![
                MedicationRule {
                    name: "Anticoagulant".to_string(),
                    medications: words(&[
                        "heparin",
                        "enoxaparin",
                        "lovenox",
                        "warfarin",
                        "coumadin",
                        "apixaban",
                        "eliquis",
                        "rivaroxaban",
                        "xarelto",
                        "dabigatran",
                        "edoxaban",
                        "anticoagulation",
                        "anticoagulant",
                        "anticoagulate",
                    ]),
                    contraindications: words(&[
                        "gi bleed",
                        "gastrointestinal bleed",
                        "active bleeding",
                        "hemorrhage",
                        "intracranial bleed",
                        "anticoagulation contraindicated",
                        "hit positive",
                    ]),
                    severity: Severity::Critical,
                },
                MedicationRule {
                    name: "NSAID".to_string(),
                    medications: words(&[
                        "nsaid",
                        "ibuprofen",
                        "naproxen",
                        "ketorolac",
                        "toradol",
                        "diclofenac",
                        "celecoxib",
                        "meloxicam",
                    ]),
                    contraindications: words(&[
                        "gi bleed",
                        "peptic ulcer",
                        "active bleeding",
                        "acute kidney injury",
                        "aki",
                        "renal failure",
                        "nsaid allergy",
                    ]),
                    severity: Severity::Critical,
                },
                MedicationRule {
                    name: "Metformin".to_string(),
                    medications: words(&["metformin", "glucophage"]),
                    contraindications: words(&[
                        "renal failure",
                        "acute kidney injury",
                        "aki",
                        "ckd stage 4",
                        "ckd stage 5",
                        "egfr <30",
                        "lactic acidosis",
                        "iv contrast",
                    ]),
                    severity: Severity::Warning,
                },
            ],
            opposite_terms: vec![
                pair("improving", "worsening"),
                pair("stable", "deteriorating"),
                pair("resolved", "active"),
                pair("no evidence", "confirmed"),
                pair("controlled", "uncontrolled"),
            ],
            topics: vec![
                topic(
                    "cardiac",
                    &[
                        "troponin",
                        "chest pain",
                        "heart failure",
                        "chf",
                        "bnp",
                        "arrhythmia",
                        "afib",
                        "atrial fibrillation",
                        "mi",
                        "stemi",
                        "nstemi",
                        "ejection fraction",
                    ],
                ),
                topic(
                    "renal",
                    &[
                        "creatinine",
                        "kidney",
                        "renal",
                        "aki",
                        "ckd",
                        "bun",
                        "egfr",
                        "urine output",
                        "dialysis",
                    ],
                ),
                topic(
                    "electrolytes",
                    &[
                        "potassium",
                        "sodium",
                        "magnesium",
                        "calcium",
                        "phosphorus",
                        "hyperkalemia",
                        "hypokalemia",
                        "hyponatremia",
                        "hypernatremia",
                    ],
                ),
                topic(
                    "respiratory",
                    &[
                        "spo2",
                        "oxygen",
                        "hypoxia",
                        "respiratory",
                        "pneumonia",
                        "dyspnea",
                        "breathing",
                        "ventilator",
                        "copd",
                        "lung",
                    ],
                ),
                topic(
                    "hemodynamic",
                    &[
                        "blood pressure",
                        "hypotension",
                        "hypertension",
                        "map",
                        "pressor",
                        "shock",
                        "perfusion",
                    ],
                ),
                topic(
                    "hematology",
                    &[
                        "hemoglobin",
                        "hgb",
                        "platelet",
                        "bleed",
                        "bleeding",
                        "anemia",
                        "transfusion",
                        "inr",
                        "coagul",
                    ],
                ),
                topic(
                    "infection",
                    &[
                        "sepsis",
                        "infection",
                        "fever",
                        "wbc",
                        "lactate",
                        "culture",
                        "antibiotic",
                        "bacteremia",
                        "uti",
                        "cellulitis",
                    ],
                ),
                topic(
                    "glycemic",
                    &[
                        "glucose",
                        "insulin",
                        "diabetes",
                        "dka",
                        "a1c",
                        "hypoglycemia",
                        "hyperglycemia",
                    ],
                ),
                topic(
                    "neuro",
                    &[
                        "mental status",
                        "confusion",
                        "delirium",
                        "stroke",
                        "seizure",
                        "gcs",
                        "neuro",
                    ],
                ),
                topic(
                    "gastrointestinal",
                    &[
                        "gi",
                        "abdominal",
                        "nausea",
                        "vomiting",
                        "liver",
                        "bilirubin",
                        "pancreatitis",
                    ],
                ),
                topic("pain", &["pain", "analgesia", "opioid"]),
            ],
            lab_keywords: words(&[
                "lactate",
                "troponin",
                "glucose",
                "creatinine",
                "cbc",
                "platelet",
                "wbc",
                "culture",
                "bilirubin",
                "sodium",
                "potassium",
                "magnesium",
                "hemoglobin",
                "bnp",
                "inr",
            ]),
            vital_terms: words(&[
                "vital",
                "vitals",
                "blood pressure",
                "heart rate",
                "spo2",
                "temperature",
                "respiratory rate",
            ]),
            lab_terms: words(&["lab", "labs", "result", "results", "panel", "bloodwork"]),
            concern_keywords: words(&[
                "new onset",
                "worsening",
                "acute",
                "critical",
                "unstable",
                "deteriorating",
            ]),
            assessment_keywords: words(&["assessment", "diagnosis", "impression", "plan"]),
            finding_weights: vec![
                FindingWeight {
                    weight: 10.0,
                    keywords: words(&["critical", "urgent", "acute", "unstable", "deteriorating"]),
                },
                FindingWeight {
                    weight: 10.0,
                    keywords: words(&["safety", "contraindicat", "allerg", "interaction"]),
                },
                FindingWeight {
                    weight: 5.0,
                    keywords: words(&["worsening", "declining", "concerning", "abnormal"]),
                },
                FindingWeight {
                    weight: 1.0,
                    keywords: words(&["baseline", "historical", "chronic", "stable"]),
                },
            ],
            no_data_finding_penalty: -5.0,
            problem_duplicate_penalty: -2.0,
        }
    }
}

/// Medication rule with its keyword sets compiled.
#[derive(Debug, Clone)]
pub struct CompiledMedicationRule {
    pub rule: MedicationRule,
    medications: Regex,
    contraindications: Regex,
}

impl CompiledMedicationRule {
    /// First medication keyword mentioned in `text`.
    pub fn medication_in(&self, text: &str) -> Option<String> {
        self.medications
            .find(text)
            .map(|m| m.as_str().to_lowercase())
    }

    /// First contraindication phrase found in `text`.
    pub fn contraindication_in(&self, text: &str) -> Option<String> {
        self.contraindications
            .find(text)
            .map(|m| m.as_str().to_lowercase())
    }
}

/// Rule tables compiled into regexes.
#[derive(Debug, Clone)]
pub struct CompiledRules {
    rules: RuleSet,
    no_data: Vec<Regex>,
    has_data: Vec<Regex>,
    medications: Vec<CompiledMedicationRule>,
    opposites: Vec<(String, Regex, String, Regex)>,
    topics: Vec<(String, Regex)>,
    lab_keywords: Vec<(String, Regex)>,
    vital_terms: Option<Regex>,
    lab_terms: Option<Regex>,
    concern: Option<Regex>,
    assessment: Option<Regex>,
    finding_weights: Vec<(f64, Regex)>,
}

static BUILTIN: Lazy<CompiledRules> = Lazy::new(|| {
    CompiledRules::new(RuleSet::default()).expect("built-in rule tables compile")
});

fn compile(pattern: &str) -> LckbResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|err| LckbError::InvalidRule(format!("{pattern}: {err}")))
}

/// Alternation of literal keywords. Short keywords are bounded on both sides,
/// longer ones only at the start so that "bleed" also matches "bleeding".
fn keyword_regex(keywords: &[String]) -> LckbResult<Option<Regex>> {
    let alternatives: Vec<String> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(|k| {
            let escaped = regex::escape(k);
            if k.chars().count() <= 4 {
                format!(r"\b{escaped}\b")
            } else {
                format!(r"\b{escaped}")
            }
        })
        .collect();
    if alternatives.is_empty() {
        return Ok(None);
    }
    compile(&format!("(?:{})", alternatives.join("|"))).map(Some)
}

fn required_keyword_regex(what: &str, keywords: &[String]) -> LckbResult<Regex> {
    keyword_regex(keywords)?
        .ok_or_else(|| LckbError::InvalidRule(format!("{what} has no keywords")))
}

fn term_regex(term: &str) -> LckbResult<Regex> {
    compile(&format!(r"\b{}\b", regex::escape(term.trim())))
}

impl CompiledRules {
    pub fn new(rules: RuleSet) -> LckbResult<Self> {
        let no_data = rules
            .no_data_patterns
            .iter()
            .map(|p| compile(p))
            .collect::<LckbResult<Vec<_>>>()?;
        let has_data = rules
            .has_data_patterns
            .iter()
            .map(|p| compile(p))
            .collect::<LckbResult<Vec<_>>>()?;

        let mut medications = Vec::with_capacity(rules.medication_rules.len());
        for rule in &rules.medication_rules {
            medications.push(CompiledMedicationRule {
                medications: required_keyword_regex(&rule.name, &rule.medications)?,
                contraindications: required_keyword_regex(&rule.name, &rule.contraindications)?,
                rule: rule.clone(),
            });
        }

        let mut opposites = Vec::with_capacity(rules.opposite_terms.len());
        for pair in &rules.opposite_terms {
            opposites.push((
                pair.first.clone(),
                term_regex(&pair.first)?,
                pair.second.clone(),
                term_regex(&pair.second)?,
            ));
        }

        let mut topics = Vec::with_capacity(rules.topics.len());
        for category in &rules.topics {
            topics.push((
                category.name.clone(),
                required_keyword_regex(&category.name, &category.keywords)?,
            ));
        }

        let mut lab_keywords = Vec::with_capacity(rules.lab_keywords.len());
        for keyword in &rules.lab_keywords {
            lab_keywords.push((keyword.to_lowercase(), term_regex(keyword)?));
        }

        let mut finding_weights = Vec::with_capacity(rules.finding_weights.len());
        for group in &rules.finding_weights {
            if let Some(regex) = keyword_regex(&group.keywords)? {
                finding_weights.push((group.weight, regex));
            }
        }

        Ok(Self {
            no_data,
            has_data,
            medications,
            opposites,
            topics,
            lab_keywords,
            vital_terms: keyword_regex(&rules.vital_terms)?,
            lab_terms: keyword_regex(&rules.lab_terms)?,
            concern: keyword_regex(&rules.concern_keywords)?,
            assessment: keyword_regex(&rules.assessment_keywords)?,
            finding_weights,
            rules,
        })
    }

    /// Compiled default tables.
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Text claims that data is absent ("no labs available", "not found"...).
    pub fn asserts_absence(&self, text: &str) -> bool {
        self.no_data.iter().any(|re| re.is_match(text))
    }

    /// Text carries quantitative data and does not also claim absence.
    pub fn asserts_presence(&self, text: &str) -> bool {
        !self.asserts_absence(text) && self.has_data.iter().any(|re| re.is_match(text))
    }

    /// Topic categories mentioned by `text`.
    pub fn topics_of(&self, text: &str) -> Vec<&str> {
        self.topics
            .iter()
            .filter(|(_, re)| re.is_match(text))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn share_topic(&self, a: &str, b: &str) -> bool {
        let topics_a = self.topics_of(a);
        if topics_a.is_empty() {
            return false;
        }
        self.topics_of(b).iter().any(|t| topics_a.contains(t))
    }

    pub fn medication_rules(&self) -> &[CompiledMedicationRule] {
        &self.medications
    }

    /// Opposite-term hit: `a` holds one side of a pair and `b` the other.
    /// Returns the matched terms as (term in a, term in b).
    pub fn opposite_terms(&self, a: &str, b: &str) -> Option<(String, String)> {
        self.opposites
            .iter()
            .find_map(|(first, first_re, second, second_re)| {
                if first_re.is_match(a) && second_re.is_match(b) {
                    Some((first.clone(), second.clone()))
                } else if second_re.is_match(a) && first_re.is_match(b) {
                    Some((second.clone(), first.clone()))
                } else {
                    None
                }
            })
    }

    /// Specific analytes named in `text`.
    pub fn named_analytes(&self, text: &str) -> Vec<&str> {
        self.lab_keywords
            .iter()
            .filter(|(_, re)| re.is_match(text))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn mentions_vitals(&self, text: &str) -> bool {
        self.vital_terms.as_ref().is_some_and(|re| re.is_match(text))
    }

    pub fn mentions_labs(&self, text: &str) -> bool {
        self.lab_terms.as_ref().is_some_and(|re| re.is_match(text))
    }

    pub fn is_concern(&self, text: &str) -> bool {
        self.concern.as_ref().is_some_and(|re| re.is_match(text))
    }

    pub fn is_assessment(&self, text: &str) -> bool {
        self.assessment.as_ref().is_some_and(|re| re.is_match(text))
    }

    /// Keyword contribution to a key finding's score (without recency or penalties
    /// that need document context).
    pub fn keyword_weight(&self, text: &str) -> f64 {
        self.finding_weights
            .iter()
            .filter(|(_, re)| re.is_match(text))
            .map(|(weight, _)| *weight)
            .sum()
    }
}

impl Default for CompiledRules {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vital_tiers_escalate() {
        let rules = RuleSet::default();
        let tachy = rules
            .vital_thresholds
            .iter()
            .find(|t| t.label == "Tachycardia")
            .unwrap();
        assert_eq!(tachy.evaluate(120.0), None);
        assert_eq!(tachy.evaluate(121.0), Some(Severity::Warning));
        assert_eq!(tachy.evaluate(150.0), Some(Severity::Warning));
        assert_eq!(tachy.evaluate(151.0), Some(Severity::Critical));
    }

    #[test]
    fn critical_lab_keywords_match_tokens() {
        let rules = RuleSet::default();
        let potassium = &rules.critical_labs[0];
        assert!(potassium.matches("Potassium"));
        assert!(potassium.matches("K+"));
        assert!(potassium.matches("Potassium, serum"));
        assert!(!potassium.matches("Creatine kinase"));
        assert!(!potassium.matches("Vitamin K"));

        let creatinine = rules
            .critical_labs
            .iter()
            .find(|rule| rule.analyte == "Creatinine")
            .unwrap();
        assert!(creatinine.matches("Creatinine, serum"));
        assert!(creatinine.matches("Cr"));
        assert!(!creatinine.matches("Creatine kinase"));
        assert!(!creatinine.matches("CK"));
    }

    #[test]
    fn absence_and_presence_classes() {
        let rules = CompiledRules::builtin();
        assert!(rules.asserts_absence("No labs available yet"));
        assert!(rules.asserts_absence("Troponin results not found"));
        assert!(!rules.asserts_presence("Potassium level not available"));
        assert!(rules.asserts_presence("Potassium 7 mEq/L"));
        assert!(rules.asserts_presence("Creatinine trending up"));
        assert!(!rules.asserts_presence("Patient resting comfortably"));
    }

    #[test]
    fn opposite_terms_respect_word_boundaries() {
        let rules = CompiledRules::builtin();
        assert_eq!(
            rules.opposite_terms("BP controlled on lisinopril", "BP uncontrolled overnight"),
            Some(("controlled".to_string(), "uncontrolled".to_string()))
        );
        assert_eq!(
            rules.opposite_terms("BP uncontrolled", "glucose uncontrolled"),
            None
        );
    }

    #[test]
    fn topics_group_related_terms() {
        let rules = CompiledRules::builtin();
        assert!(rules.share_topic("Creatinine improving", "AKI worsening"));
        assert!(!rules.share_topic("Creatinine improving", "Pain worsening"));
        assert!(!rules.share_topic("Feeling better", "Feeling worse"));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let mut rules = RuleSet::default();
        rules.no_data_patterns.push("(unclosed".to_string());
        assert!(matches!(
            CompiledRules::new(rules),
            Err(LckbError::InvalidRule(_))
        ));
    }

    #[test]
    fn rule_set_loads_partially_from_json() {
        let rules: RuleSet =
            serde_json::from_str(r#"{"concern_keywords": ["septic"]}"#).unwrap();
        assert_eq!(rules.concern_keywords, vec!["septic".to_string()]);
        assert_eq!(rules.vital_thresholds.len(), 9);
    }
}
