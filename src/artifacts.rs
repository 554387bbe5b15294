//! Split artifacts on disk.
//!
//! Every artifact is encoded in memory first, then written into a staging
//! directory inside the output directory and renamed into place, so a failed
//! encode leaves the output directory untouched. Artifacts from an earlier run
//! are removed before the renames, and a failed rename removes the artifacts
//! already moved, so the directory never mixes two runs.

use indexmap::IndexSet;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::SplitConfig;
use crate::constants::inventory::COL_PATIENT_ID;
use crate::constants::splits::{
    ALL_SPLITS, METADATA_FILENAME, PATIENT_MAPPING_FILENAME, STAGING_DIR_PREFIX,
};
use crate::errors::SplitError;
use crate::grouping::group_by_patient;
use crate::inventory::Inventory;
use crate::metadata::SplitMetadata;
use crate::splits::{SplitAssignment, SplitLabel};
use crate::types::PatientId;
use crate::validation::{SplitValidator, ValidationReport};

/// Encoded contents of every artifact of one run.
#[derive(Clone, Debug, PartialEq)]
pub struct SplitArtifacts {
    tables: Vec<(SplitLabel, Vec<u8>)>,
    metadata: Vec<u8>,
    patient_mapping: Vec<u8>,
}

impl SplitArtifacts {
    /// Encode the metadata report and patient mapping next to the split tables.
    pub fn new(
        tables: Vec<(SplitLabel, Vec<u8>)>,
        metadata: &SplitMetadata,
        assignment: &SplitAssignment,
    ) -> Result<Self, SplitError> {
        Ok(Self {
            tables,
            metadata: metadata.to_json_bytes()?,
            patient_mapping: encode_patient_mapping(assignment)?,
        })
    }

    /// Artifact filenames paired with their bytes, in write order.
    pub fn files(&self) -> Vec<(String, &[u8])> {
        let mut files: Vec<(String, &[u8])> = self
            .tables
            .iter()
            .map(|(label, bytes)| (label.table_filename(), bytes.as_slice()))
            .collect();
        files.push((METADATA_FILENAME.to_string(), self.metadata.as_slice()));
        files.push((
            PATIENT_MAPPING_FILENAME.to_string(),
            self.patient_mapping.as_slice(),
        ));
        files
    }

    /// Stage every artifact inside `output_dir`, then move them into place.
    ///
    /// Returns the final artifact paths. On error the output directory holds
    /// none of the artifacts.
    pub fn write_to(&self, output_dir: &Path) -> Result<Vec<PathBuf>, SplitError> {
        fs::create_dir_all(output_dir)?;
        let staging = tempfile::Builder::new()
            .prefix(STAGING_DIR_PREFIX)
            .tempdir_in(output_dir)?;
        let files = self.files();
        for (name, bytes) in &files {
            fs::write(staging.path().join(name), bytes)?;
        }
        for (name, _) in &files {
            let target = output_dir.join(name);
            if target.is_file() {
                fs::remove_file(&target)?;
            }
        }
        let mut written: Vec<PathBuf> = Vec::with_capacity(files.len());
        for (name, _) in &files {
            let target = output_dir.join(name);
            if let Err(err) = fs::rename(staging.path().join(name), &target) {
                for path in &written {
                    if let Err(cleanup) = fs::remove_file(path) {
                        warn!("could not remove {}: {cleanup}", path.display());
                    }
                }
                return Err(err.into());
            }
            debug!("wrote {}", target.display());
            written.push(target);
        }
        info!(
            "wrote {} artifacts to {}",
            written.len(),
            output_dir.display()
        );
        Ok(written)
    }
}

/// `patient_mapping.json`: patient id → split name, sorted by patient id.
pub fn encode_patient_mapping(assignment: &SplitAssignment) -> Result<Vec<u8>, SplitError> {
    let mapping: BTreeMap<PatientId, SplitLabel> = assignment.mapping();
    let mut bytes = serde_json::to_vec_pretty(&mapping)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Read the patients of each persisted split table, in first-appearance order.
pub fn read_split_patients(output_dir: &Path) -> Result<SplitAssignment, SplitError> {
    let mut assignment = SplitAssignment::default();
    for label in ALL_SPLITS {
        let path = output_dir.join(label.table_filename());
        let mut reader = csv::Reader::from_path(&path)?;
        let column = reader
            .headers()?
            .iter()
            .position(|header| header.trim() == COL_PATIENT_ID)
            .ok_or_else(|| SplitError::Schema {
                path: path.clone(),
                missing: vec![COL_PATIENT_ID.to_string()],
            })?;
        let mut patients: IndexSet<PatientId> = IndexSet::new();
        for row in reader.records() {
            let row = row?;
            if let Some(patient_id) = row.get(column) {
                patients.insert(patient_id.to_string());
            }
        }
        *assignment.patients_mut(label) = patients.into_iter().collect();
    }
    Ok(assignment)
}

/// Re-run the validator over persisted artifacts.
///
/// Ratios and tolerance come from `split_metadata.json`; when that file is
/// absent the values in `config` are used instead.
pub fn validate_artifacts(
    output_dir: &Path,
    master_index: &Path,
    config: &SplitConfig,
) -> Result<ValidationReport, SplitError> {
    let (ratios, tolerance) = match SplitMetadata::load(output_dir.join(METADATA_FILENAME)) {
        Ok(metadata) => (metadata.split_ratios, metadata.ratio_tolerance),
        Err(SplitError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
            (config.ratios, config.ratio_tolerance)
        }
        Err(err) => return Err(err),
    };
    let validator = SplitValidator::new(ratios, tolerance)?;
    let inventory = Inventory::load(master_index)?;
    let groups = group_by_patient(&inventory)?;
    let assignment = read_split_patients(output_dir)?;
    Ok(validator.validate(&assignment, &groups.patient_sources()))
}
