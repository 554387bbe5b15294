#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Stratified per-stratum allocation and its deterministic RNG.
pub mod allocator;
/// Command-line runners shared by the bundled binaries.
pub mod apps;
/// Artifact encoding, staged writes and re-validation.
pub mod artifacts;
/// Splitting configuration.
pub mod config;
/// Centralized constants for inventories, hashing and split artifacts.
pub mod constants;
/// Patient grouping over master index rows.
pub mod grouping;
mod hash;
/// Master index model, loading and scanning.
pub mod inventory;
/// Disease taxonomy and caption labeling.
pub mod labels;
/// Contents of `split_metadata.json`.
pub mod metadata;
/// Prevalence helpers for split summaries.
pub mod metrics;
/// End-to-end split orchestration.
pub mod pipeline;
/// Data sources and their patient-id rules.
pub mod source;
/// Split labels, ratios and assignments.
pub mod splits;
/// Stratification key resolution.
pub mod strata;
/// Shared type aliases.
pub mod types;
/// Master index cell parsing helpers.
pub mod utils;
/// Post-hoc split checks.
pub mod validation;

mod errors;

pub use allocator::{DeterministicRng, StratifiedAllocator};
pub use artifacts::{read_split_patients, validate_artifacts};
pub use config::SplitConfig;
pub use errors::SplitError;
pub use grouping::{PatientGroup, PatientGroups, group_by_patient};
pub use inventory::{ImageRecord, Inventory};
pub use labels::{DiseaseLabelSet, DiseaseTag, DiseaseTaxonomy};
pub use metadata::{SplitMetadata, SplitSummary};
pub use pipeline::{AssignedImage, PatientSplitter, SplitOutcome, SplitRun};
pub use source::SourceTag;
pub use splits::{SplitAssignment, SplitLabel, SplitRatios};
pub use strata::stratification_key;
pub use types::{Cell, Filename, PathString, PatientId, SourceName};
pub use validation::{CheckResult, SplitValidator, ValidationCheck, ValidationReport};
