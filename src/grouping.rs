use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::errors::SplitError;
use crate::inventory::{ImageRecord, Inventory};
use crate::source::SourceTag;
use crate::types::PatientId;

/// One patient and the images attributed to them, in inventory order.
#[derive(Clone, Debug, PartialEq)]
pub struct PatientGroup {
    /// Source-prefixed patient id.
    pub patient_id: PatientId,
    /// Source every image of this patient came from.
    pub source: SourceTag,
    /// Images in inventory order.
    pub images: Vec<ImageRecord>,
}

/// Grouping statistics reported with each run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupingDiagnostics {
    /// Patients contributing more than one image.
    pub multi_image_patients: usize,
    /// Largest number of images attributed to one patient.
    pub max_images_per_patient: usize,
    /// Images whose patient id came from the filename-hash fallback.
    pub fallback_ids: usize,
}

/// Patient groups keyed by patient id, in first-appearance order.
#[derive(Clone, Debug, Default)]
pub struct PatientGroups {
    groups: IndexMap<PatientId, PatientGroup>,
    record_patients: Vec<PatientId>,
    fallback_ids: usize,
}

impl PatientGroups {
    /// Number of patients.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// True when the inventory held no rows.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Group of one patient.
    pub fn get(&self, patient_id: &str) -> Option<&PatientGroup> {
        self.groups.get(patient_id)
    }

    /// Groups in first-appearance order.
    pub fn iter(&self) -> impl Iterator<Item = &PatientGroup> {
        self.groups.values()
    }

    /// Patient ids in first-appearance order.
    pub fn patient_ids(&self) -> impl Iterator<Item = &PatientId> {
        self.groups.keys()
    }

    /// Patient id of every inventory row, aligned with `Inventory::records`.
    pub fn record_patient_ids(&self) -> &[PatientId] {
        &self.record_patients
    }

    /// Patient id → source for every patient.
    pub fn patient_sources(&self) -> HashMap<PatientId, SourceTag> {
        self.groups
            .values()
            .map(|group| (group.patient_id.clone(), group.source))
            .collect()
    }

    /// Total images across all groups.
    pub fn image_count(&self) -> usize {
        self.groups.values().map(|group| group.images.len()).sum()
    }

    /// Sources present, in `SourceTag` order.
    pub fn sources(&self) -> Vec<SourceTag> {
        let mut sources: Vec<SourceTag> = self.groups.values().map(|group| group.source).collect();
        sources.sort();
        sources.dedup();
        sources
    }

    /// Multi-image, max-size and fallback counts.
    pub fn diagnostics(&self) -> GroupingDiagnostics {
        let sizes = self.groups.values().map(|group| group.images.len());
        GroupingDiagnostics {
            multi_image_patients: sizes.clone().filter(|size| *size > 1).count(),
            max_images_per_patient: sizes.max().unwrap_or(0),
            fallback_ids: self.fallback_ids,
        }
    }
}

/// Partition `inventory` into patient groups.
///
/// Fails with [`SplitError::UnknownSource`] on the first row whose source tag
/// is not recognised.
pub fn group_by_patient(inventory: &Inventory) -> Result<PatientGroups, SplitError> {
    let mut grouped = PatientGroups::default();
    for record in inventory.records() {
        let source: SourceTag =
            record
                .source
                .parse()
                .map_err(|_| SplitError::UnknownSource {
                    source_tag: record.source.clone(),
                    filename: record.filename.clone(),
                })?;
        let (patient_id, fallback) = source.patient_id(&record.filename);
        if fallback {
            debug!(
                "no patient pattern in '{}'; using {}",
                record.filename, patient_id
            );
            grouped.fallback_ids += 1;
        }
        grouped.record_patients.push(patient_id.clone());
        grouped
            .groups
            .entry(patient_id.clone())
            .or_insert_with(|| PatientGroup {
                patient_id,
                source,
                images: Vec::new(),
            })
            .images
            .push(record.clone());
    }
    let diagnostics = grouped.diagnostics();
    info!(
        "grouped {} images into {} patients ({} with multiple images, max {} per patient)",
        inventory.len(),
        grouped.len(),
        diagnostics.multi_image_patients,
        diagnostics.max_images_per_patient
    );
    Ok(grouped)
}
