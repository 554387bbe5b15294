use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::allocator::StratifiedAllocator;
use crate::artifacts::SplitArtifacts;
use crate::config::SplitConfig;
use crate::constants::inventory::{COL_PATIENT_ID, COL_SPLIT};
use crate::constants::splits::ALL_SPLITS;
use crate::errors::SplitError;
use crate::grouping::{PatientGroups, group_by_patient};
use crate::inventory::{ImageRecord, Inventory, encode_table};
use crate::labels::{DiseaseLabelSet, DiseaseTag, DiseaseTaxonomy, label_patients};
use crate::metadata::{RunDiagnostics, SplitMetadata, SplitSummary};
use crate::metrics::{source_prevalence, tag_prevalence};
use crate::source::SourceTag;
use crate::splits::{SplitAssignment, SplitLabel};
use crate::strata::stratification_key;
use crate::types::{Cell, PatientId};
use crate::validation::{SplitValidator, ValidationReport};

/// An inventory row with its derived patient and split.
///
/// The original record is borrowed untouched; the derived fields live alongside it.
#[derive(Clone, Copy, Debug)]
pub struct AssignedImage<'a> {
    /// Inventory row, untouched.
    pub record: &'a ImageRecord,
    /// Patient the row belongs to.
    pub patient_id: &'a PatientId,
    /// Split of that patient.
    pub split: SplitLabel,
}

/// In-memory result of splitting one inventory.
#[derive(Debug)]
pub struct SplitOutcome<'a> {
    inventory: &'a Inventory,
    groups: PatientGroups,
    labels: HashMap<PatientId, DiseaseLabelSet>,
    assignment: SplitAssignment,
    diagnostics: RunDiagnostics,
    validation: ValidationReport,
}

impl<'a> SplitOutcome<'a> {
    /// Patients of each split.
    pub fn assignment(&self) -> &SplitAssignment {
        &self.assignment
    }

    /// Patient groups in first-appearance order.
    pub fn groups(&self) -> &PatientGroups {
        &self.groups
    }

    /// Disease tags of one patient.
    pub fn labels(&self, patient_id: &str) -> Option<&DiseaseLabelSet> {
        self.labels.get(patient_id)
    }

    /// Grouping and caption diagnostics.
    pub fn diagnostics(&self) -> &RunDiagnostics {
        &self.diagnostics
    }

    /// Validator report for the assignment.
    pub fn validation(&self) -> &ValidationReport {
        &self.validation
    }

    /// Rows of one split in inventory order.
    pub fn images(&self, label: SplitLabel) -> Vec<AssignedImage<'_>> {
        let mapping = self.assignment.mapping();
        self.inventory
            .records()
            .iter()
            .zip(self.groups.record_patient_ids())
            .filter(|(_, patient_id)| mapping.get(*patient_id) == Some(&label))
            .map(|(record, patient_id)| AssignedImage {
                record,
                patient_id,
                split: label,
            })
            .collect()
    }

    /// Split table: input columns plus `patient_id` and `split`.
    ///
    /// If the input already carries either column, its cells are overwritten.
    pub fn table_bytes(&self, label: SplitLabel) -> Result<Vec<u8>, SplitError> {
        let mut headers: Vec<String> = self.inventory.headers().to_vec();
        let patient_col = column_or_append(&mut headers, COL_PATIENT_ID);
        let split_col = column_or_append(&mut headers, COL_SPLIT);
        let input_headers = self.inventory.headers();
        let rows = self.images(label).into_iter().map(|image| {
            let mut row: Vec<Cell> = image.record.row(input_headers);
            row.resize(headers.len(), String::new());
            row[patient_col] = image.patient_id.clone();
            row[split_col] = image.split.as_str().to_string();
            row
        });
        encode_table(&headers, rows)
    }

    fn summary(&self, label: SplitLabel) -> SplitSummary {
        let patients = self.assignment.patients(label);
        SplitSummary {
            n_patients: patients.len(),
            n_images: patients
                .iter()
                .filter_map(|id| self.groups.get(id))
                .map(|group| group.images.len())
                .sum(),
            disease_distribution: tag_prevalence(patients, &self.labels),
            source_distribution: source_prevalence(patients, &self.groups.patient_sources()),
        }
    }

    /// Report for `split_metadata.json`.
    pub fn metadata(&self, config: &SplitConfig) -> SplitMetadata {
        SplitMetadata {
            generated_at: config.generated_at.unwrap_or_else(Utc::now),
            random_seed: config.seed,
            split_ratios: config.ratios,
            ratio_tolerance: config.ratio_tolerance,
            train: self.summary(SplitLabel::Train),
            val: self.summary(SplitLabel::Validation),
            test: self.summary(SplitLabel::Test),
            diagnostics: self.diagnostics.clone(),
            validation: self.validation.clone(),
        }
    }

    /// Encode every artifact without touching the filesystem.
    pub fn artifacts(&self, metadata: &SplitMetadata) -> Result<SplitArtifacts, SplitError> {
        let mut tables = Vec::with_capacity(ALL_SPLITS.len());
        for label in ALL_SPLITS {
            tables.push((label, self.table_bytes(label)?));
        }
        SplitArtifacts::new(tables, metadata, &self.assignment)
    }
}

fn column_or_append(headers: &mut Vec<String>, name: &str) -> usize {
    match headers.iter().position(|header| header == name) {
        Some(idx) => idx,
        None => {
            headers.push(name.to_string());
            headers.len() - 1
        }
    }
}

/// Outcome of a persisted run.
#[derive(Clone, Debug)]
pub struct SplitRun {
    /// Directory holding the artifacts.
    pub output_dir: PathBuf,
    /// Written artifact paths, in write order.
    pub artifacts: Vec<PathBuf>,
    /// Report written as `split_metadata.json`.
    pub metadata: SplitMetadata,
}

impl SplitRun {
    /// Aggregate validator verdict.
    pub fn is_valid(&self) -> bool {
        self.metadata.validation.overall_valid
    }
}

/// Patient-level stratified splitter.
///
/// Ratios are validated when the splitter is built, before any input is read.
#[derive(Clone, Debug)]
pub struct PatientSplitter {
    config: SplitConfig,
    allocator: StratifiedAllocator,
    validator: SplitValidator,
    taxonomy: DiseaseTaxonomy,
}

impl PatientSplitter {
    /// Fails with [`SplitError::InvalidRatio`] before any input is read.
    pub fn new(config: SplitConfig) -> Result<Self, SplitError> {
        let allocator = StratifiedAllocator::new(config.ratios)?;
        let validator = SplitValidator::new(config.ratios, config.ratio_tolerance)?;
        Ok(Self {
            config,
            allocator,
            validator,
            taxonomy: DiseaseTaxonomy::builtin(),
        })
    }

    /// Configuration the splitter was built with.
    pub fn config(&self) -> &SplitConfig {
        &self.config
    }

    /// Group, label, allocate per source and validate, all in memory.
    pub fn split<'a>(&self, inventory: &'a Inventory) -> Result<SplitOutcome<'a>, SplitError> {
        let groups = group_by_patient(inventory)?;
        let labeled = label_patients(&groups, &self.taxonomy, &self.config);

        let keyed: Vec<(PatientId, SourceTag, DiseaseTag)> = labeled
            .labels
            .iter()
            .filter_map(|(patient_id, tags)| {
                groups
                    .get(patient_id)
                    .map(|group| (patient_id.clone(), group.source, stratification_key(tags)))
            })
            .collect();

        let mut assignment = SplitAssignment::default();
        for source in groups.sources() {
            let patients: Vec<(PatientId, DiseaseTag)> = keyed
                .iter()
                .filter(|(_, patient_source, _)| *patient_source == source)
                .map(|(patient_id, _, key)| (patient_id.clone(), *key))
                .collect();
            let allocated = self.allocator.allocate(&patients, self.config.seed);
            info!(
                "{}: {} patients -> train={} val={} test={}",
                source,
                patients.len(),
                allocated.train.len(),
                allocated.validation.len(),
                allocated.test.len()
            );
            assignment.extend(allocated);
        }

        let validation = self
            .validator
            .validate(&assignment, &groups.patient_sources());
        let diagnostics = RunDiagnostics {
            total_images: inventory.len(),
            total_patients: groups.len(),
            grouping: groups.diagnostics(),
            captions: labeled.diagnostics,
        };
        Ok(SplitOutcome {
            inventory,
            labels: labeled.labels.into_iter().collect(),
            groups,
            assignment,
            diagnostics,
            validation,
        })
    }

    /// Load `master_index`, split it and persist every artifact to `output_dir`.
    ///
    /// Nothing is written unless every fatal check passed and all artifacts
    /// encoded successfully.
    pub fn run(&self, master_index: &Path, output_dir: &Path) -> Result<SplitRun, SplitError> {
        let inventory = Inventory::load(master_index)?;
        let outcome = self.split(&inventory)?;
        let metadata = outcome.metadata(&self.config);
        let artifacts = outcome.artifacts(&metadata)?;
        let written = artifacts.write_to(output_dir)?;
        if metadata.validation.overall_valid {
            info!("split is valid");
        } else {
            warn!("split written but failed validation");
        }
        Ok(SplitRun {
            output_dir: output_dir.to_path_buf(),
            artifacts: written,
            metadata,
        })
    }
}
