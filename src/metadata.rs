use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::errors::SplitError;
use crate::grouping::GroupingDiagnostics;
use crate::labels::CaptionDiagnostics;
use crate::splits::{SplitLabel, SplitRatios};
use crate::validation::ValidationReport;

/// Counts and distributions for one split.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitSummary {
    /// Patients in the split.
    pub n_patients: usize,
    /// Images of those patients.
    pub n_images: usize,
    /// Fraction of the split's patients carrying each disease tag.
    pub disease_distribution: BTreeMap<String, f64>,
    /// Fraction of the split's patients drawn from each source.
    pub source_distribution: BTreeMap<String, f64>,
}

/// Grouping and caption diagnostics recorded for a run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDiagnostics {
    /// Rows in the master index.
    pub total_images: usize,
    /// Distinct patients.
    pub total_patients: usize,
    /// Patient grouping counts.
    #[serde(flatten)]
    pub grouping: GroupingDiagnostics,
    /// Missing and unreadable caption counts.
    #[serde(flatten)]
    pub captions: CaptionDiagnostics,
}

/// Contents of `split_metadata.json`.
///
/// Everything except `generated_at` is a pure function of the inventory, the
/// caption files and the configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitMetadata {
    /// Report timestamp.
    pub generated_at: DateTime<Utc>,
    /// Run seed.
    pub random_seed: u64,
    /// Target ratios.
    pub split_ratios: SplitRatios,
    /// Tolerance used by `ratio_fidelity`.
    pub ratio_tolerance: f64,
    /// Training split.
    pub train: SplitSummary,
    /// Validation split.
    pub val: SplitSummary,
    /// Test split.
    pub test: SplitSummary,
    /// Grouping and caption diagnostics.
    pub diagnostics: RunDiagnostics,
    /// Validator verdicts.
    pub validation: ValidationReport,
}

impl SplitMetadata {
    /// Summary of one split.
    pub fn summary(&self, label: SplitLabel) -> &SplitSummary {
        match label {
            SplitLabel::Train => &self.train,
            SplitLabel::Validation => &self.val,
            SplitLabel::Test => &self.test,
        }
    }

    /// Pretty-printed JSON bytes with a trailing newline.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, SplitError> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Read a persisted report.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SplitError> {
        let bytes = std::fs::read(path.as_ref())?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
