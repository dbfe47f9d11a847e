//! Ordered fallback chains for extracting one logical field from several wire locations.
//!
//! A chain is a slice of extractor functions. Extractors are tried in slice order and the first
//! one that yields a present, non-blank value wins. The order encodes real-world precedence
//! (human-authored free text beats coded display text beats raw code), so chains must not be
//! reordered.
//!
//! Chains never fail. When every extractor comes up empty the caller substitutes a sentinel:
//! [`UNKNOWN`] for names and labels, an empty string for dosage and frequency.

use crate::datatypes::{CodeableConcept, Dosage, Quantity, Reference, Timing};

/// Sentinel for names and labels whose entire fallback chain is exhausted.
pub const UNKNOWN: &str = "Unknown";

/// One candidate location for a logical field.
pub type Extractor<W> = fn(&W) -> Option<String>;

/// Runs `chain` against `source` and returns the first present value.
pub fn first_present<W>(source: &W, chain: &[Extractor<W>]) -> Option<String> {
    chain.iter().find_map(|extract| extract(source))
}

/// Returns the trimmed value if it has content.
pub(crate) fn present(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Returns the value unless it is the given sentinel.
pub(crate) fn unless_sentinel(value: &str, sentinel: &str) -> Option<String> {
    present(Some(value)).filter(|v| v != sentinel)
}

// ============================================================================
// Generic concept / reference chains
// ============================================================================

fn concept_text(concept: &CodeableConcept) -> Option<String> {
    present(concept.text.as_deref())
}

fn concept_first_display(concept: &CodeableConcept) -> Option<String> {
    present(concept.coding.first().and_then(|c| c.display.as_deref()))
}

fn concept_first_code(concept: &CodeableConcept) -> Option<String> {
    present(concept.coding.first().and_then(|c| c.code.as_deref()))
}

const CONCEPT_LABEL_CHAIN: &[Extractor<CodeableConcept>] = &[concept_text, concept_first_display];

/// Label for a concept: `text` then `coding[0].display`.
pub fn concept_label(concept: &CodeableConcept) -> Option<String> {
    first_present(concept, CONCEPT_LABEL_CHAIN)
}

/// Label for an optional concept.
pub(crate) fn optional_concept_label(concept: Option<&CodeableConcept>) -> Option<String> {
    concept.and_then(concept_label)
}

fn reference_display(reference: &Reference) -> Option<String> {
    present(reference.display.as_deref())
}

fn reference_target(reference: &Reference) -> Option<String> {
    present(reference.reference.as_deref())
}

const PARTY_CHAIN: &[Extractor<Reference>] = &[reference_display, reference_target];
const TARGET_CHAIN: &[Extractor<Reference>] = &[reference_target, reference_display];

/// Label for a person or organisation: `display` then `reference`.
pub(crate) fn party_label(reference: Option<&Reference>) -> Option<String> {
    reference.and_then(|r| first_present(r, PARTY_CHAIN))
}

/// Label for a record pointer (subject, focus): `reference` then `display`.
pub(crate) fn target_label(reference: Option<&Reference>) -> Option<String> {
    reference.and_then(|r| first_present(r, TARGET_CHAIN))
}

// ============================================================================
// Dosage chain
// ============================================================================

fn format_quantity(quantity: &Quantity) -> Option<String> {
    let value = quantity.value?;
    let unit = present(quantity.unit.as_deref()).or_else(|| present(quantity.code.as_deref()));
    Some(match unit {
        Some(unit) => format!("{value} {unit}"),
        None => value.to_string(),
    })
}

fn structured_dose(dosage: &Dosage) -> Option<String> {
    dosage
        .dose_and_rate
        .iter()
        .find_map(|dr| dr.dose_quantity.as_ref().and_then(format_quantity))
}

fn dose_range(dosage: &Dosage) -> Option<String> {
    dosage.dose_and_rate.iter().find_map(|dr| {
        let range = dr.dose_range.as_ref()?;
        let low = range.low.as_ref()?;
        let high = range.high.as_ref()?;
        let (low_value, high_value) = (low.value?, high.value?);
        let unit = present(high.unit.as_deref()).or_else(|| present(low.unit.as_deref()));
        Some(match unit {
            Some(unit) => format!("{low_value}-{high_value} {unit}"),
            None => format!("{low_value}-{high_value}"),
        })
    })
}

fn dosage_text(dosage: &Dosage) -> Option<String> {
    present(dosage.text.as_deref())
}

/// Structured dose, then dose range as `"low-high unit"`, then free-text instruction.
pub const DOSAGE_CHAIN: &[Extractor<Dosage>] = &[structured_dose, dose_range, dosage_text];

/// Dosage display string, or an empty string when nothing is present.
pub fn dosage_display(dosage: Option<&Dosage>) -> String {
    dosage
        .and_then(|d| first_present(d, DOSAGE_CHAIN))
        .unwrap_or_default()
}

// ============================================================================
// Frequency chain
// ============================================================================

fn unit_word(code: &str) -> &str {
    match code {
        "s" => "second",
        "min" => "minute",
        "h" => "hour",
        "d" => "day",
        "wk" => "week",
        "mo" => "month",
        "a" => "year",
        other => other,
    }
}

fn per_period(period: f64, unit: &str) -> String {
    let word = unit_word(unit);
    if period == 1.0 {
        format!("per {word}")
    } else {
        format!("per {period} {word}s")
    }
}

fn times(frequency: u32) -> String {
    if frequency == 1 {
        "once".to_string()
    } else {
        format!("{frequency} times")
    }
}

fn repeat_frequency(timing: &Timing) -> Option<String> {
    let repeat = timing.repeat.as_ref()?;
    let frequency = repeat.frequency?;
    let period = repeat.period?;
    let unit = present(repeat.period_unit.as_deref())?;
    Some(format!("{} {}", times(frequency), per_period(period, &unit)))
}

fn implied_once(timing: &Timing) -> Option<String> {
    let repeat = timing.repeat.as_ref()?;
    if repeat.frequency.is_some() {
        return None;
    }
    let period = repeat.period?;
    let unit = present(repeat.period_unit.as_deref())?;
    Some(format!("once {}", per_period(period, &unit)))
}

fn timing_code_text(timing: &Timing) -> Option<String> {
    timing.code.as_ref().and_then(concept_text)
}

fn timing_code_display(timing: &Timing) -> Option<String> {
    timing.code.as_ref().and_then(concept_first_display)
}

fn timing_code_code(timing: &Timing) -> Option<String> {
    timing.code.as_ref().and_then(concept_first_code)
}

/// Repeat triple, then implied "once per unit", then the textual timing code.
pub const FREQUENCY_CHAIN: &[Extractor<Timing>] = &[
    repeat_frequency,
    implied_once,
    timing_code_text,
    timing_code_display,
    timing_code_code,
];

/// Frequency display string, or an empty string when nothing is present.
pub fn frequency_display(timing: Option<&Timing>) -> String {
    timing
        .and_then(|t| first_present(t, FREQUENCY_CHAIN))
        .unwrap_or_default()
}
