//! Post-hoc checks over a finished split.
//!
//! Checks only read their inputs, so running them twice over the same split
//! yields the same report.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use tracing::{info, warn};

use crate::constants::splits::ALL_SPLITS;
use crate::errors::SplitError;
use crate::source::SourceTag;
use crate::splits::{SplitAssignment, SplitRatios};
use crate::types::PatientId;

/// The fixed battery of split checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCheck {
    /// No patient appears in two splits.
    NoOverlap,
    /// Each split's patient fraction is within tolerance of its target.
    RatioFidelity,
    /// Every split has at least one patient from every source.
    SourceCoverage,
    /// Every patient is assigned exactly once.
    Completeness,
}

impl ValidationCheck {
    /// Every check in report order.
    pub const ALL: [ValidationCheck; 4] = [
        ValidationCheck::NoOverlap,
        ValidationCheck::RatioFidelity,
        ValidationCheck::SourceCoverage,
        ValidationCheck::Completeness,
    ];

    /// Name used in reports.
    pub const fn as_str(self) -> &'static str {
        match self {
            ValidationCheck::NoOverlap => "no_overlap",
            ValidationCheck::RatioFidelity => "ratio_fidelity",
            ValidationCheck::SourceCoverage => "source_coverage",
            ValidationCheck::Completeness => "completeness",
        }
    }
}

impl fmt::Display for ValidationCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one check.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Which check ran.
    pub check: ValidationCheck,
    /// Check verdict.
    pub passed: bool,
    /// Human-readable explanation.
    pub details: String,
}

/// Per-check verdicts plus their conjunction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Results in [`ValidationCheck::ALL`] order.
    pub checks: Vec<CheckResult>,
    /// True when every check passed.
    pub overall_valid: bool,
}

impl ValidationReport {
    fn from_checks(checks: Vec<CheckResult>) -> Self {
        let overall_valid = checks.iter().all(|check| check.passed);
        Self {
            checks,
            overall_valid,
        }
    }

    /// Verdict of one check; `false` if it was not run.
    pub fn passed(&self, check: ValidationCheck) -> bool {
        self.checks
            .iter()
            .any(|result| result.check == check && result.passed)
    }

    /// Full result of one check.
    pub fn result(&self, check: ValidationCheck) -> Option<&CheckResult> {
        self.checks.iter().find(|result| result.check == check)
    }
}

/// Runs every [`ValidationCheck`] against a split assignment.
#[derive(Clone, Copy, Debug)]
pub struct SplitValidator {
    ratios: SplitRatios,
    tolerance: f64,
}

impl SplitValidator {
    /// Fails with [`SplitError::InvalidRatio`] on bad ratios.
    pub fn new(ratios: SplitRatios, tolerance: f64) -> Result<Self, SplitError> {
        Ok(Self {
            ratios: ratios.validated()?,
            tolerance,
        })
    }

    /// Validate `assignment` against the full inventory patient set, given as
    /// patient id → source.
    pub fn validate(
        &self,
        assignment: &SplitAssignment,
        inventory_patients: &HashMap<PatientId, SourceTag>,
    ) -> ValidationReport {
        let report = ValidationReport::from_checks(vec![
            self.check_no_overlap(assignment),
            self.check_ratio_fidelity(assignment),
            self.check_source_coverage(assignment, inventory_patients),
            self.check_completeness(assignment, inventory_patients),
        ]);
        for result in &report.checks {
            if result.passed {
                info!("{}: passed ({})", result.check, result.details);
            } else {
                warn!("{}: FAILED ({})", result.check, result.details);
            }
        }
        report
    }

    fn check_no_overlap(&self, assignment: &SplitAssignment) -> CheckResult {
        let mut overlaps = Vec::new();
        for (idx, left) in ALL_SPLITS.iter().enumerate() {
            for right in &ALL_SPLITS[idx + 1..] {
                let shared = assignment
                    .patient_set(*left)
                    .intersection(&assignment.patient_set(*right))
                    .count();
                if shared > 0 {
                    overlaps.push(format!("{left}/{right}: {shared} shared patients"));
                }
            }
        }
        CheckResult {
            check: ValidationCheck::NoOverlap,
            passed: overlaps.is_empty(),
            details: if overlaps.is_empty() {
                "splits are pairwise disjoint".to_string()
            } else {
                overlaps.join("; ")
            },
        }
    }

    fn check_ratio_fidelity(&self, assignment: &SplitAssignment) -> CheckResult {
        let total = assignment.len();
        if total == 0 {
            return CheckResult {
                check: ValidationCheck::RatioFidelity,
                passed: false,
                details: "no patients".to_string(),
            };
        }
        let mut passed = true;
        let mut parts = Vec::with_capacity(ALL_SPLITS.len());
        for label in ALL_SPLITS {
            let actual = assignment.patients(label).len() as f64 / total as f64;
            let target = self.ratios.for_label(label);
            let within = (actual - target).abs() <= self.tolerance + f64::EPSILON;
            passed &= within;
            parts.push(format!(
                "{label} {actual:.3} (target {target:.3}){}",
                if within { "" } else { " out of tolerance" }
            ));
        }
        CheckResult {
            check: ValidationCheck::RatioFidelity,
            passed,
            details: format!("{}; tolerance {:.3}", parts.join(", "), self.tolerance),
        }
    }

    fn check_source_coverage(
        &self,
        assignment: &SplitAssignment,
        inventory_patients: &HashMap<PatientId, SourceTag>,
    ) -> CheckResult {
        let sources: BTreeSet<SourceTag> = inventory_patients.values().copied().collect();
        let mut gaps = Vec::new();
        for label in ALL_SPLITS {
            let present: BTreeSet<SourceTag> = assignment
                .patients(label)
                .iter()
                .filter_map(|id| inventory_patients.get(id).copied())
                .collect();
            let missing: Vec<&str> = sources
                .difference(&present)
                .map(|source| source.as_str())
                .collect();
            if !missing.is_empty() {
                gaps.push(format!("{label} lacks {}", missing.join(", ")));
            }
        }
        CheckResult {
            check: ValidationCheck::SourceCoverage,
            passed: gaps.is_empty(),
            details: if gaps.is_empty() {
                format!("every split covers {} sources", sources.len())
            } else {
                gaps.join("; ")
            },
        }
    }

    fn check_completeness(
        &self,
        assignment: &SplitAssignment,
        inventory_patients: &HashMap<PatientId, SourceTag>,
    ) -> CheckResult {
        let mut assigned: HashSet<&str> = HashSet::with_capacity(assignment.len());
        let mut duplicates = 0usize;
        for label in ALL_SPLITS {
            for patient_id in assignment.patients(label) {
                if !assigned.insert(patient_id.as_str()) {
                    duplicates += 1;
                }
            }
        }
        let dropped = inventory_patients
            .keys()
            .filter(|id| !assigned.contains(id.as_str()))
            .count();
        let unexpected = assigned
            .iter()
            .filter(|id| !inventory_patients.contains_key(**id))
            .count();
        let passed = dropped == 0 && unexpected == 0 && duplicates == 0;
        CheckResult {
            check: ValidationCheck::Completeness,
            passed,
            details: format!(
                "{} of {} patients assigned; {dropped} dropped, {unexpected} unexpected, {duplicates} duplicated",
                assigned.len(),
                inventory_patients.len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<PatientId> {
        list.iter().map(|id| id.to_string()).collect()
    }

    fn inventory(entries: &[(&str, SourceTag)]) -> HashMap<PatientId, SourceTag> {
        entries
            .iter()
            .map(|(id, source)| (id.to_string(), *source))
            .collect()
    }

    fn validator() -> SplitValidator {
        SplitValidator::new(
            SplitRatios {
                train: 0.5,
                validation: 0.25,
                test: 0.25,
            },
            0.05,
        )
        .unwrap()
    }

    #[test]
    fn clean_split_passes_every_check() {
        let patients = inventory(&[
            ("c1", SourceTag::CheXpert),
            ("c2", SourceTag::CheXpert),
            ("c3", SourceTag::CheXpert),
            ("c4", SourceTag::CheXpert),
        ]);
        let assignment = SplitAssignment {
            train: ids(&["c1", "c2"]),
            validation: ids(&["c3"]),
            test: ids(&["c4"]),
        };
        let report = validator().validate(&assignment, &patients);
        assert!(report.overall_valid);
        for check in ValidationCheck::ALL {
            assert!(report.passed(check), "{check} failed");
        }
    }

    #[test]
    fn overlap_and_duplicates_are_reported() {
        let patients = inventory(&[("a", SourceTag::Nih), ("b", SourceTag::Nih)]);
        let assignment = SplitAssignment {
            train: ids(&["a"]),
            validation: ids(&["a"]),
            test: ids(&["b"]),
        };
        let report = validator().validate(&assignment, &patients);
        assert!(!report.passed(ValidationCheck::NoOverlap));
        assert!(!report.passed(ValidationCheck::Completeness));
        assert!(!report.overall_valid);
        let details = &report.result(ValidationCheck::NoOverlap).unwrap().details;
        assert!(details.contains("train/val: 1"));
    }

    #[test]
    fn dropped_and_unexpected_patients_fail_completeness() {
        let patients = inventory(&[("a", SourceTag::Nih), ("b", SourceTag::Nih)]);
        let assignment = SplitAssignment {
            train: ids(&["a", "z"]),
            validation: vec![],
            test: vec![],
        };
        let report = validator().validate(&assignment, &patients);
        let result = report.result(ValidationCheck::Completeness).unwrap();
        assert!(!result.passed);
        assert!(result.details.contains("1 dropped, 1 unexpected"));
    }

    #[test]
    fn missing_source_fails_coverage_only() {
        let patients = inventory(&[
            ("c1", SourceTag::CheXpert),
            ("c2", SourceTag::CheXpert),
            ("c3", SourceTag::CheXpert),
            ("r1", SourceTag::Radiopaedia),
        ]);
        let assignment = SplitAssignment {
            train: ids(&["c1", "r1"]),
            validation: ids(&["c2"]),
            test: ids(&["c3"]),
        };
        let report = validator().validate(&assignment, &patients);
        assert!(report.passed(ValidationCheck::NoOverlap));
        assert!(report.passed(ValidationCheck::Completeness));
        assert!(report.passed(ValidationCheck::RatioFidelity));
        let coverage = report.result(ValidationCheck::SourceCoverage).unwrap();
        assert!(!coverage.passed);
        assert_eq!(coverage.details, "val lacks Radiopaedia; test lacks Radiopaedia");
        assert!(!report.overall_valid);
    }

    #[test]
    fn skewed_fractions_fail_ratio_fidelity() {
        let patients = inventory(&[("a", SourceTag::Nih), ("b", SourceTag::Nih)]);
        let assignment = SplitAssignment {
            train: vec![],
            validation: vec![],
            test: ids(&["a", "b"]),
        };
        let report = validator().validate(&assignment, &patients);
        assert!(!report.passed(ValidationCheck::RatioFidelity));
    }

    #[test]
    fn empty_split_fails_ratio_fidelity_with_reason() {
        let report = validator().validate(&SplitAssignment::default(), &HashMap::new());
        let result = report.result(ValidationCheck::RatioFidelity).unwrap();
        assert!(!result.passed);
        assert_eq!(result.details, "no patients");
        assert!(report.passed(ValidationCheck::Completeness));
    }

    #[test]
    fn validation_is_idempotent() {
        let patients = inventory(&[("a", SourceTag::Nih), ("b", SourceTag::MimicCxr)]);
        let assignment = SplitAssignment {
            train: ids(&["a"]),
            validation: vec![],
            test: ids(&["b"]),
        };
        let validator = validator();
        assert_eq!(
            validator.validate(&assignment, &patients),
            validator.validate(&assignment, &patients)
        );
    }

    #[test]
    fn report_serializes_check_names() {
        let report = validator().validate(&SplitAssignment::default(), &HashMap::new());
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"check\":\"ratio_fidelity\""));
        assert!(json.contains("\"overall_valid\":false"));
    }
}
