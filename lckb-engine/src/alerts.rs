//! Safety flags derived from vitals and lab results.

use lckb_core::text::format_numeric;
use lckb_core::{LabResult, SafetyFlag, Severity, VitalField, VitalsReading};

use crate::rules::{CompiledRules, Direction};

fn field_abbreviation(field: VitalField) -> &'static str {
    match field {
        VitalField::Systolic => "SBP",
        VitalField::Diastolic => "DBP",
        VitalField::HeartRate => "HR",
        VitalField::RespiratoryRate => "RR",
        VitalField::Temperature => "Temp",
        VitalField::Spo2 => "SpO2",
    }
}

fn format_measure(field: VitalField, value: f64) -> String {
    let unit = field.unit();
    match field {
        VitalField::Spo2 | VitalField::Temperature => format!("{}{unit}", format_numeric(value)),
        _ => format!("{} {unit}", format_numeric(value)),
    }
}

/// One flag per breached field/direction, at the most severe tier.
pub fn vital_flags(reading: &VitalsReading, rules: &CompiledRules) -> Vec<SafetyFlag> {
    let mut flags = Vec::new();
    for threshold in &rules.rules().vital_thresholds {
        let Some(value) = reading.value(threshold.field) else {
            continue;
        };
        let Some(severity) = threshold.evaluate(value) else {
            continue;
        };
        let measure = format!(
            "{} {}",
            field_abbreviation(threshold.field),
            format_measure(threshold.field, value)
        );
        let text = match severity {
            Severity::Critical => format!("CRITICAL {}: {measure}", threshold.label),
            _ => format!("{}: {measure}", threshold.label),
        };
        flags.push(SafetyFlag {
            text,
            severity,
            timestamp: reading.timestamp,
        });
    }
    flags
}

/// Named critical thresholds first; a pre-flagged critical result only raises
/// its own flag when no threshold fired for it.
pub fn lab_flags(result: &LabResult, rules: &CompiledRules) -> Vec<SafetyFlag> {
    let mut flags = Vec::new();
    let value = format_numeric(result.value);

    for rule in rules
        .rules()
        .critical_labs
        .iter()
        .filter(|rule| rule.matches(&result.name))
    {
        let direction = if rule.low.is_some_and(|low| result.value < low) {
            Some(Direction::Low)
        } else if rule.high.is_some_and(|high| result.value > high) {
            Some(Direction::High)
        } else {
            None
        };
        let Some(direction) = direction else {
            continue;
        };
        let unit = result
            .unit
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(&rule.unit);
        let word = match direction {
            Direction::Low => "LOW",
            Direction::High => "HIGH",
        };
        flags.push(SafetyFlag {
            text: format!("CRITICAL {word} {}: {value} {unit}", rule.analyte),
            severity: Severity::Critical,
            timestamp: result.timestamp,
        });
    }

    if flags.is_empty() {
        if let Some(flag) = result.flag.as_deref() {
            let normalized = flag.trim().to_lowercase();
            if rules
                .rules()
                .critical_lab_flags
                .iter()
                .any(|f| f.eq_ignore_ascii_case(&normalized))
            {
                flags.push(SafetyFlag {
                    text: format!(
                        "CRITICAL LAB: {} (flag {})",
                        result.describe(),
                        flag.trim().to_uppercase()
                    ),
                    severity: Severity::Critical,
                    timestamp: result.timestamp,
                });
            }
        }
    }

    flags
}
