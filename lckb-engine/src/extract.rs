//! Free-text extractors for nursing notes and dictation.

use once_cell::sync::Lazy;
use regex::Regex;

static QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["“]([^"”]{3,})["”]"#).expect("quoted speech pattern"));

static PATIENT_CLAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:patient|pt)\s+(?:reports|states|denies)\b[^.!?;\n]*")
        .expect("patient clause pattern")
});

static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+(?:\s+|$)|\n+").expect("sentence boundary pattern"));

/// Statements attributed to the patient: quoted speech and
/// "patient reports/states/denies ..." clauses.
pub fn patient_statements(text: &str) -> Vec<String> {
    let mut out: Vec<String> = QUOTED
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    for clause in PATIENT_CLAUSE.find_iter(text) {
        let clause = clause.as_str().trim();
        if !clause.is_empty() && !out.iter().any(|existing| existing == clause) {
            out.push(clause.to_string());
        }
    }
    out
}

/// Splits text into trimmed, non-empty sentences.
pub fn sentences(text: &str) -> Vec<String> {
    SENTENCE_END
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
