//! Recognised data sources and their patient-identifier rules.
//!
//! Each source maps to one [`PatientIdRule`]; adding a source means adding a
//! variant and its rule without touching the others.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::constants::hash::FALLBACK_ID_INFIX;
use crate::hash::stable_hex_digest;
use crate::types::PatientId;

static CHEXPERT_PATIENT: LazyLock<Regex> = LazyLock::new(|| rule_regex(r"patient(\d+)"));
static RADIOPAEDIA_CASE: LazyLock<Regex> = LazyLock::new(|| rule_regex(r"radiopaedia_(\d+)"));
static NIH_PATIENT: LazyLock<Regex> = LazyLock::new(|| rule_regex(r"nih_(\d+)"));
static MIMIC_SUBJECT: LazyLock<Regex> = LazyLock::new(|| rule_regex(r"mimic_p?(\d+)"));

fn rule_regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("invalid built-in patient id pattern")
}

/// Data sources the splitter knows how to group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceTag {
    /// Stanford CheXpert chest radiographs.
    #[serde(rename = "CheXpert")]
    CheXpert,
    /// Radiopaedia teaching cases.
    #[serde(rename = "Radiopaedia")]
    Radiopaedia,
    /// NIH ChestX-ray14.
    #[serde(rename = "NIH")]
    Nih,
    /// MIMIC-CXR.
    #[serde(rename = "MIMIC-CXR")]
    MimicCxr,
    /// Images whose origin could not be determined upstream.
    #[serde(rename = "Unknown")]
    Unknown,
}

impl SourceTag {
    /// Every recognised source, in reporting order.
    pub const ALL: [SourceTag; 5] = [
        SourceTag::CheXpert,
        SourceTag::Radiopaedia,
        SourceTag::Nih,
        SourceTag::MimicCxr,
        SourceTag::Unknown,
    ];

    /// Canonical name written to artifacts.
    pub const fn as_str(self) -> &'static str {
        match self {
            SourceTag::CheXpert => "CheXpert",
            SourceTag::Radiopaedia => "Radiopaedia",
            SourceTag::Nih => "NIH",
            SourceTag::MimicCxr => "MIMIC-CXR",
            SourceTag::Unknown => "Unknown",
        }
    }

    /// Lower-case prefix carried by every patient id of this source.
    pub const fn id_prefix(self) -> &'static str {
        match self {
            SourceTag::CheXpert => "chexpert",
            SourceTag::Radiopaedia => "radiopaedia",
            SourceTag::Nih => "nih",
            SourceTag::MimicCxr => "mimic",
            SourceTag::Unknown => "unknown",
        }
    }

    /// Detect a source from a filename prefix (used when building a master index).
    pub fn from_filename(filename: &str) -> Self {
        if filename.starts_with("radiopaedia_") {
            SourceTag::Radiopaedia
        } else if filename.starts_with("chexpert_") {
            SourceTag::CheXpert
        } else if filename.starts_with("nih_") {
            SourceTag::Nih
        } else if filename.starts_with("mimic_") {
            SourceTag::MimicCxr
        } else {
            SourceTag::Unknown
        }
    }

    /// Identifier-extraction rule for this source.
    pub fn patient_id_rule(self) -> PatientIdRule {
        match self {
            SourceTag::CheXpert => PatientIdRule::Numbered {
                pattern: &CHEXPERT_PATIENT,
                template: PatientIdTemplate::PrefixedPatient,
            },
            SourceTag::Radiopaedia => PatientIdRule::Numbered {
                pattern: &RADIOPAEDIA_CASE,
                template: PatientIdTemplate::PrefixedNumber,
            },
            SourceTag::Nih => PatientIdRule::Numbered {
                pattern: &NIH_PATIENT,
                template: PatientIdTemplate::PrefixedPatient,
            },
            SourceTag::MimicCxr => PatientIdRule::Numbered {
                pattern: &MIMIC_SUBJECT,
                template: PatientIdTemplate::PrefixedPatient,
            },
            SourceTag::Unknown => PatientIdRule::HashOnly,
        }
    }

    /// Derive the patient id for `filename`, falling back to a stable filename hash.
    ///
    /// Returns the id and whether the fallback was used.
    pub fn patient_id(self, filename: &str) -> (PatientId, bool) {
        match self.patient_id_rule().extract(self.id_prefix(), filename) {
            Some(id) => (id, false),
            None => (fallback_patient_id(self, filename), true),
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceTag {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "CheXpert" | "Stanford-CXR" => Ok(SourceTag::CheXpert),
            "Radiopaedia" => Ok(SourceTag::Radiopaedia),
            "NIH" => Ok(SourceTag::Nih),
            "MIMIC-CXR" => Ok(SourceTag::MimicCxr),
            "Unknown" => Ok(SourceTag::Unknown),
            other => Err(format!("unrecognised source tag '{other}'")),
        }
    }
}

/// How a matched digit run becomes a patient id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatientIdTemplate {
    /// `<prefix>_patient<digits>`
    PrefixedPatient,
    /// `<prefix>_<digits>`
    PrefixedNumber,
}

/// Source-specific patient-id extraction.
#[derive(Clone, Copy, Debug)]
pub enum PatientIdRule {
    /// First capture group of `pattern` holds the patient number.
    Numbered {
        /// Filename pattern.
        pattern: &'static LazyLock<Regex>,
        /// Shape of the resulting id.
        template: PatientIdTemplate,
    },
    /// No patient semantics in the filename; always use the hash fallback.
    HashOnly,
}

impl PatientIdRule {
    /// Apply the rule; `None` when the filename does not match.
    pub fn extract(&self, prefix: &str, filename: &str) -> Option<PatientId> {
        match self {
            PatientIdRule::Numbered { pattern, template } => {
                let digits = pattern.captures(filename)?.get(1)?.as_str();
                Some(match template {
                    PatientIdTemplate::PrefixedPatient => format!("{prefix}_patient{digits}"),
                    PatientIdTemplate::PrefixedNumber => format!("{prefix}_{digits}"),
                })
            }
            PatientIdRule::HashOnly => None,
        }
    }
}

/// `<prefix>_unknown_<first 16 hex digits of SHA-256(filename)>`.
pub fn fallback_patient_id(source: SourceTag, filename: &str) -> PatientId {
    format!(
        "{}_{}_{}",
        source.id_prefix(),
        FALLBACK_ID_INFIX,
        stable_hex_digest(filename)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chexpert_ids_use_first_digit_run_after_patient() {
        let (id, fallback) =
            SourceTag::CheXpert.patient_id("chexpert_patient64541_study1_view1_frontal.jpg");
        assert_eq!(id, "chexpert_patient64541");
        assert!(!fallback);
    }

    #[test]
    fn radiopaedia_ids_use_case_number() {
        let (id, _) = SourceTag::Radiopaedia.patient_id("radiopaedia_1234_2.jpg");
        assert_eq!(id, "radiopaedia_1234");
    }

    #[test]
    fn nih_and_mimic_rules_extract_subject_numbers() {
        assert_eq!(
            SourceTag::Nih.patient_id("nih_00000013_005.png").0,
            "nih_patient00000013"
        );
        assert_eq!(
            SourceTag::MimicCxr.patient_id("mimic_p10000032_s50414267.jpg").0,
            "mimic_patient10000032"
        );
        assert_eq!(
            SourceTag::MimicCxr.patient_id("mimic_10000032_a.jpg").0,
            "mimic_patient10000032"
        );
    }

    #[test]
    fn unmatched_filenames_fall_back_to_stable_hash() {
        let (first, fallback) = SourceTag::CheXpert.patient_id("scan.jpg");
        let (second, _) = SourceTag::CheXpert.patient_id("scan.jpg");
        assert!(fallback);
        assert_eq!(first, second);
        assert!(first.starts_with("chexpert_unknown_"));
        assert_eq!(first.len(), "chexpert_unknown_".len() + 16);

        let (unknown, fallback) = SourceTag::Unknown.patient_id("patient12.jpg");
        assert!(fallback);
        assert!(unknown.starts_with("unknown_unknown_"));
    }

    #[test]
    fn source_tags_parse_aliases_and_reject_others() {
        assert_eq!("Stanford-CXR".parse::<SourceTag>(), Ok(SourceTag::CheXpert));
        assert_eq!("CheXpert".parse::<SourceTag>(), Ok(SourceTag::CheXpert));
        assert_eq!("MIMIC-CXR".parse::<SourceTag>(), Ok(SourceTag::MimicCxr));
        assert!("PadChest".parse::<SourceTag>().is_err());
        for tag in SourceTag::ALL {
            assert_eq!(tag.as_str().parse::<SourceTag>(), Ok(tag));
        }
    }

    #[test]
    fn filename_prefixes_detect_sources() {
        assert_eq!(SourceTag::from_filename("radiopaedia_1_1.jpg"), SourceTag::Radiopaedia);
        assert_eq!(SourceTag::from_filename("chexpert_patient1.jpg"), SourceTag::CheXpert);
        assert_eq!(SourceTag::from_filename("nih_1.png"), SourceTag::Nih);
        assert_eq!(SourceTag::from_filename("mimic_p1.jpg"), SourceTag::MimicCxr);
        assert_eq!(SourceTag::from_filename("other.jpg"), SourceTag::Unknown);
    }
}
