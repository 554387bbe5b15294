use std::collections::{BTreeMap, HashMap};

use crate::labels::DiseaseLabelSet;
use crate::source::SourceTag;
use crate::types::PatientId;

/// Fraction of `total` per key; empty when `total` is zero.
pub fn shares(counts: &BTreeMap<String, usize>, total: usize) -> BTreeMap<String, f64> {
    if total == 0 {
        return BTreeMap::new();
    }
    counts
        .iter()
        .map(|(key, count)| (key.clone(), *count as f64 / total as f64))
        .collect()
}

/// Fraction of `patients` carrying each disease tag.
///
/// Tags are multi-label, so the fractions may sum to more than one.
pub fn tag_prevalence(
    patients: &[PatientId],
    labels: &HashMap<PatientId, DiseaseLabelSet>,
) -> BTreeMap<String, f64> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for patient_id in patients {
        if let Some(tags) = labels.get(patient_id) {
            for tag in tags {
                *counts.entry(tag.as_str().to_string()).or_insert(0) += 1;
            }
        }
    }
    shares(&counts, patients.len())
}

/// Fraction of `patients` drawn from each source.
pub fn source_prevalence(
    patients: &[PatientId],
    sources: &HashMap<PatientId, SourceTag>,
) -> BTreeMap<String, f64> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for patient_id in patients {
        if let Some(source) = sources.get(patient_id) {
            *counts.entry(source.as_str().to_string()).or_insert(0) += 1;
        }
    }
    shares(&counts, patients.len())
}
