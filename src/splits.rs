use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::constants::splits::{ALL_SPLITS, RATIO_SUM_EPSILON};
use crate::errors::SplitError;
use crate::types::PatientId;

/// Logical dataset partitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SplitLabel {
    /// Training split.
    #[serde(rename = "train")]
    Train,
    /// Validation split.
    #[serde(rename = "val")]
    Validation,
    /// Test split.
    #[serde(rename = "test")]
    Test,
}

impl SplitLabel {
    /// Name used in artifacts and the `split` column.
    pub const fn as_str(self) -> &'static str {
        match self {
            SplitLabel::Train => "train",
            SplitLabel::Validation => "val",
            SplitLabel::Test => "test",
        }
    }

    /// Filename of the per-split image table.
    pub fn table_filename(self) -> String {
        format!("{}_index.csv", self.as_str())
    }
}

impl fmt::Display for SplitLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SplitLabel {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "train" => Ok(SplitLabel::Train),
            "val" | "validation" => Ok(SplitLabel::Validation),
            "test" => Ok(SplitLabel::Test),
            other => Err(format!("unknown split '{other}'")),
        }
    }
}

/// Ratio configuration for train/validation/test assignment.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitRatios {
    /// Fraction assigned to train.
    pub train: f64,
    /// Fraction assigned to validation.
    #[serde(rename = "val")]
    pub validation: f64,
    /// Fraction assigned to test.
    pub test: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.8,
            validation: 0.1,
            test: 0.1,
        }
    }
}

impl SplitRatios {
    /// Validate that ratios are finite, non-negative and sum to `1.0` (within epsilon).
    pub fn validated(self) -> Result<Self, SplitError> {
        let sum = self.train + self.validation + self.test;
        let parts_ok = [self.train, self.validation, self.test]
            .iter()
            .all(|ratio| ratio.is_finite() && *ratio >= 0.0);
        if !parts_ok || (sum - 1.0).abs() > RATIO_SUM_EPSILON {
            return Err(SplitError::InvalidRatio {
                train: self.train,
                validation: self.validation,
                test: self.test,
                sum,
            });
        }
        Ok(self)
    }

    /// Target fraction for one split.
    pub fn for_label(&self, label: SplitLabel) -> f64 {
        match label {
            SplitLabel::Train => self.train,
            SplitLabel::Validation => self.validation,
            SplitLabel::Test => self.test,
        }
    }
}

/// Per-split counts for a group of `total` items.
///
/// Train and validation take `floor(total * ratio)`; test takes the remainder so
/// every item is assigned even when the ratios do not divide `total` evenly.
pub fn split_counts_for_total(total: usize, split: SplitRatios) -> [(SplitLabel, usize); 3] {
    let train = ((total as f64) * split.train).floor() as usize;
    let validation = ((total as f64) * split.validation).floor() as usize;
    let train = train.min(total);
    let validation = validation.min(total - train);
    let test = total - train - validation;
    [
        (SplitLabel::Train, train),
        (SplitLabel::Validation, validation),
        (SplitLabel::Test, test),
    ]
}

/// Patient ids assigned to each split, in allocation order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SplitAssignment {
    /// Training patients.
    pub train: Vec<PatientId>,
    /// Validation patients.
    pub validation: Vec<PatientId>,
    /// Test patients.
    pub test: Vec<PatientId>,
}

impl SplitAssignment {
    /// Patients assigned to `label`.
    pub fn patients(&self, label: SplitLabel) -> &[PatientId] {
        match label {
            SplitLabel::Train => &self.train,
            SplitLabel::Validation => &self.validation,
            SplitLabel::Test => &self.test,
        }
    }

    /// Mutable access to the patients assigned to `label`.
    pub fn patients_mut(&mut self, label: SplitLabel) -> &mut Vec<PatientId> {
        match label {
            SplitLabel::Train => &mut self.train,
            SplitLabel::Validation => &mut self.validation,
            SplitLabel::Test => &mut self.test,
        }
    }

    /// Append another assignment split-by-split.
    pub fn extend(&mut self, other: SplitAssignment) {
        self.train.extend(other.train);
        self.validation.extend(other.validation);
        self.test.extend(other.test);
    }

    /// Total number of assigned entries across all splits (duplicates counted).
    pub fn len(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }

    /// True when no patient is assigned.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Patient set of one split.
    pub fn patient_set(&self, label: SplitLabel) -> HashSet<&str> {
        self.patients(label).iter().map(String::as_str).collect()
    }

    /// Split containing `patient_id`, if any (first match in canonical order).
    pub fn label_for(&self, patient_id: &str) -> Option<SplitLabel> {
        ALL_SPLITS
            .into_iter()
            .find(|label| self.patients(*label).iter().any(|id| id == patient_id))
    }

    /// Flat patient → split mapping, sorted by patient id.
    pub fn mapping(&self) -> BTreeMap<PatientId, SplitLabel> {
        let mut mapping = BTreeMap::new();
        for label in ALL_SPLITS {
            for patient_id in self.patients(label) {
                mapping.insert(patient_id.clone(), label);
            }
        }
        mapping
    }
}
