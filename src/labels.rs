//! Disease tags derived from free-text captions.
//!
//! Matching is plain substring search over the lower-cased caption text, so
//! `"effusion"` also matches `"pleural effusion"` and `"mass"` also matches
//! `"massive"`. Whitespace is matched as written: `"no\nacute"` does
//! not contain `"no acute"`. The taxonomy is fixed at build time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::SplitConfig;
use crate::errors::SplitError;
use crate::grouping::{PatientGroup, PatientGroups};
use crate::types::PatientId;

/// Disease tags.
///
/// Declaration order is the stratification priority: the derived `Ord` ranks
/// clinically significant findings first, `Normal` next-to-last and the
/// `Unspecified` sentinel last.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DiseaseTag {
    /// Pneumonia, consolidation or infiltrate.
    Pneumonia,
    /// Pneumothorax.
    Pneumothorax,
    /// Pleural effusion.
    PleuralEffusion,
    /// Enlarged cardiac silhouette.
    Cardiomegaly,
    /// Pulmonary edema.
    Edema,
    /// Atelectasis or collapse.
    Atelectasis,
    /// Nodule, mass or lesion.
    Nodule,
    /// Fracture.
    Fracture,
    /// No acute finding.
    Normal,
    /// No keyword matched, or no readable caption.
    Unspecified,
}

impl DiseaseTag {
    /// Every tag in priority order.
    pub const ALL: [DiseaseTag; 10] = [
        DiseaseTag::Pneumonia,
        DiseaseTag::Pneumothorax,
        DiseaseTag::PleuralEffusion,
        DiseaseTag::Cardiomegaly,
        DiseaseTag::Edema,
        DiseaseTag::Atelectasis,
        DiseaseTag::Nodule,
        DiseaseTag::Fracture,
        DiseaseTag::Normal,
        DiseaseTag::Unspecified,
    ];

    /// Snake-case name used in reports.
    pub const fn as_str(self) -> &'static str {
        match self {
            DiseaseTag::Pneumonia => "pneumonia",
            DiseaseTag::Pneumothorax => "pneumothorax",
            DiseaseTag::PleuralEffusion => "pleural_effusion",
            DiseaseTag::Cardiomegaly => "cardiomegaly",
            DiseaseTag::Edema => "edema",
            DiseaseTag::Atelectasis => "atelectasis",
            DiseaseTag::Nodule => "nodule",
            DiseaseTag::Fracture => "fracture",
            DiseaseTag::Normal => "normal",
            DiseaseTag::Unspecified => "unspecified",
        }
    }
}

impl fmt::Display for DiseaseTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of disease tags attached to one caption or one patient.
pub type DiseaseLabelSet = BTreeSet<DiseaseTag>;

const BUILTIN_TAXONOMY: &[(DiseaseTag, &[&str])] = &[
    (
        DiseaseTag::Pneumonia,
        &["pneumonia", "consolidation", "infiltrate"],
    ),
    (DiseaseTag::PleuralEffusion, &["pleural effusion", "effusion"]),
    (
        DiseaseTag::Cardiomegaly,
        &["cardiomegaly", "enlarged heart", "cardiac enlargement"],
    ),
    (DiseaseTag::Edema, &["edema", "pulmonary edema"]),
    (DiseaseTag::Atelectasis, &["atelectasis", "collapse"]),
    (DiseaseTag::Pneumothorax, &["pneumothorax"]),
    (DiseaseTag::Nodule, &["nodule", "mass", "lesion"]),
    (DiseaseTag::Fracture, &["fracture", "rib fracture"]),
    (
        DiseaseTag::Normal,
        &["no acute", "normal", "clear lungs", "unremarkable"],
    ),
];

/// Tag → keyword table used for extraction.
#[derive(Clone, Copy, Debug)]
pub struct DiseaseTaxonomy {
    entries: &'static [(DiseaseTag, &'static [&'static str])],
}

impl Default for DiseaseTaxonomy {
    fn default() -> Self {
        Self::builtin()
    }
}

impl DiseaseTaxonomy {
    /// The chest radiograph taxonomy.
    pub const fn builtin() -> Self {
        Self {
            entries: BUILTIN_TAXONOMY,
        }
    }

    /// Keywords registered for `tag` (empty for the sentinel).
    pub fn keywords(&self, tag: DiseaseTag) -> &'static [&'static str] {
        self.entries
            .iter()
            .find(|(candidate, _)| *candidate == tag)
            .map(|(_, keywords)| *keywords)
            .unwrap_or(&[])
    }

    /// Tags with at least one keyword in `text`; `{Unspecified}` when none match.
    pub fn extract(&self, text: &str) -> DiseaseLabelSet {
        let lowered = text.to_lowercase();
        let mut tags: DiseaseLabelSet = self
            .entries
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|kw| lowered.contains(kw)))
            .map(|(tag, _)| *tag)
            .collect();
        if tags.is_empty() {
            tags.insert(DiseaseTag::Unspecified);
        }
        tags
    }
}

/// Read a caption file as UTF-8 text.
pub fn read_caption(path: &Path) -> Result<String, SplitError> {
    std::fs::read_to_string(path).map_err(|err| SplitError::CaptionRead {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

/// Caption outcomes collected while labeling patients.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionDiagnostics {
    /// Images listed without a caption.
    pub images_without_captions: usize,
    /// Captions listed but unreadable (missing file or invalid UTF-8).
    pub caption_read_failures: usize,
}

impl CaptionDiagnostics {
    fn merge(mut self, other: CaptionDiagnostics) -> Self {
        self.images_without_captions += other.images_without_captions;
        self.caption_read_failures += other.caption_read_failures;
        self
    }
}

/// Disease labels for every patient, in patient-group order.
#[derive(Clone, Debug, Default)]
pub struct PatientLabels {
    /// Tag set of each patient.
    pub labels: Vec<(PatientId, DiseaseLabelSet)>,
    /// Missing and unreadable caption counts.
    pub diagnostics: CaptionDiagnostics,
}

/// Union the caption tags of each patient's images.
///
/// A patient with any real tag drops the `Unspecified` sentinel contributed by
/// captionless or unmatched images. Unreadable captions are logged and counted,
/// never fatal. A listed `caption_path` is read even when `has_caption` says
/// otherwise; the mismatch is logged.
pub fn label_patients(
    groups: &PatientGroups,
    taxonomy: &DiseaseTaxonomy,
    config: &SplitConfig,
) -> PatientLabels {
    let ordered: Vec<&PatientGroup> = groups.iter().collect();
    #[cfg(feature = "parallel")]
    let results: Vec<(PatientId, DiseaseLabelSet, CaptionDiagnostics)> = ordered
        .par_iter()
        .map(|group| label_group(group, taxonomy, config))
        .collect();
    #[cfg(not(feature = "parallel"))]
    let results: Vec<(PatientId, DiseaseLabelSet, CaptionDiagnostics)> = ordered
        .iter()
        .map(|group| label_group(group, taxonomy, config))
        .collect();

    let mut labels = Vec::with_capacity(results.len());
    let mut diagnostics = CaptionDiagnostics::default();
    for (patient_id, tags, group_diagnostics) in results {
        labels.push((patient_id, tags));
        diagnostics = diagnostics.merge(group_diagnostics);
    }
    if diagnostics.caption_read_failures > 0 {
        warn!(
            "{} captions could not be read; their images were labeled unspecified",
            diagnostics.caption_read_failures
        );
    }
    PatientLabels {
        labels,
        diagnostics,
    }
}

fn label_group(
    group: &PatientGroup,
    taxonomy: &DiseaseTaxonomy,
    config: &SplitConfig,
) -> (PatientId, DiseaseLabelSet, CaptionDiagnostics) {
    let mut tags = DiseaseLabelSet::new();
    let mut diagnostics = CaptionDiagnostics::default();
    for record in &group.images {
        let caption = match record.caption_path.as_deref() {
            Some(raw) => {
                if !record.has_caption {
                    warn!(
                        "{} is flagged without a caption but lists {}; reading it",
                        record.filename, raw
                    );
                }
                raw
            }
            None => {
                debug!("{} has no caption", record.filename);
                diagnostics.images_without_captions += 1;
                tags.insert(DiseaseTag::Unspecified);
                continue;
            }
        };
        match read_caption(&config.resolve_path(caption)) {
            Ok(text) => tags.extend(taxonomy.extract(&text)),
            Err(err) => {
                warn!("{err}");
                diagnostics.caption_read_failures += 1;
                tags.insert(DiseaseTag::Unspecified);
            }
        }
    }
    if tags.len() > 1 {
        tags.remove(&DiseaseTag::Unspecified);
    }
    if tags.is_empty() {
        tags.insert(DiseaseTag::Unspecified);
    }
    (group.patient_id.clone(), tags, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouping::group_by_patient;
    use crate::inventory::{ImageRecord, Inventory};
    use tempfile::tempdir;

    fn tags(list: &[DiseaseTag]) -> DiseaseLabelSet {
        list.iter().copied().collect()
    }

    #[test]
    fn extraction_matches_substrings_case_insensitively() {
        let taxonomy = DiseaseTaxonomy::builtin();
        assert_eq!(
            taxonomy.extract("Right lower lobe CONSOLIDATION with small pleural EFFUSION."),
            tags(&[DiseaseTag::Pneumonia, DiseaseTag::PleuralEffusion])
        );
        assert_eq!(
            taxonomy.extract("No acute cardiopulmonary process."),
            tags(&[DiseaseTag::Normal])
        );
        assert_eq!(
            taxonomy.extract("Massive cardiomegaly."),
            tags(&[DiseaseTag::Cardiomegaly, DiseaseTag::Nodule])
        );
    }

    #[test]
    fn multi_word_keywords_match_whitespace_as_written() {
        let taxonomy = DiseaseTaxonomy::builtin();
        assert_eq!(
            taxonomy.extract("no\nacute process"),
            tags(&[DiseaseTag::Unspecified])
        );
        assert_eq!(
            taxonomy.extract("Clear\tlungs."),
            tags(&[DiseaseTag::Unspecified])
        );
        assert_eq!(
            taxonomy.extract("enlarged   heart"),
            tags(&[DiseaseTag::Unspecified])
        );
        assert_eq!(
            taxonomy.extract("ENLARGED HEART"),
            tags(&[DiseaseTag::Cardiomegaly])
        );
    }

    #[test]
    fn no_match_yields_sentinel() {
        let taxonomy = DiseaseTaxonomy::builtin();
        assert_eq!(taxonomy.extract(""), tags(&[DiseaseTag::Unspecified]));
        assert_eq!(
            taxonomy.extract("Portable AP view."),
            tags(&[DiseaseTag::Unspecified])
        );
    }

    #[test]
    fn extraction_is_idempotent() {
        let taxonomy = DiseaseTaxonomy::builtin();
        let text = "Pulmonary edema and rib fracture.";
        assert_eq!(taxonomy.extract(text), taxonomy.extract(text));
        assert_eq!(
            taxonomy.extract(text),
            tags(&[DiseaseTag::Edema, DiseaseTag::Fracture])
        );
    }

    #[test]
    fn priority_order_matches_declaration() {
        let mut sorted = DiseaseTag::ALL.to_vec();
        sorted.sort();
        assert_eq!(sorted, DiseaseTag::ALL.to_vec());
        assert_eq!(DiseaseTag::PleuralEffusion.as_str(), "pleural_effusion");
        assert_eq!(
            serde_json::to_string(&DiseaseTag::PleuralEffusion).unwrap(),
            "\"pleural_effusion\""
        );
        assert!(DiseaseTaxonomy::builtin().keywords(DiseaseTag::Unspecified).is_empty());
    }

    #[test]
    fn patient_labels_union_captions_and_drop_sentinel() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "Left lower lobe pneumonia.").unwrap();
        std::fs::write(dir.path().join("b.txt"), "Stable cardiomegaly.").unwrap();

        let inventory = Inventory::from_records(vec![
            ImageRecord::new("chexpert_patient1_a.jpg", "CheXpert", "a.jpg", Some("a.txt".into())),
            ImageRecord::new("chexpert_patient1_b.jpg", "CheXpert", "b.jpg", Some("b.txt".into())),
            ImageRecord::new("chexpert_patient1_c.jpg", "CheXpert", "c.jpg", None),
            ImageRecord::new("chexpert_patient2_a.jpg", "CheXpert", "d.jpg", Some("missing.txt".into())),
        ]);
        let groups = group_by_patient(&inventory).unwrap();
        let config = SplitConfig {
            data_root: Some(dir.path().to_path_buf()),
            ..SplitConfig::default()
        };
        let labeled = label_patients(&groups, &DiseaseTaxonomy::builtin(), &config);

        assert_eq!(labeled.labels.len(), 2);
        assert_eq!(labeled.labels[0].0, "chexpert_patient1");
        assert_eq!(
            labeled.labels[0].1,
            tags(&[DiseaseTag::Pneumonia, DiseaseTag::Cardiomegaly])
        );
        assert_eq!(labeled.labels[1].1, tags(&[DiseaseTag::Unspecified]));
        assert_eq!(labeled.diagnostics.images_without_captions, 1);
        assert_eq!(labeled.diagnostics.caption_read_failures, 1);
    }

    #[test]
    fn unreadable_caption_is_a_caption_read_error() {
        let dir = tempdir().unwrap();
        let err = read_caption(&dir.path().join("absent.txt")).unwrap_err();
        assert!(matches!(err, SplitError::CaptionRead { .. }));
    }

    #[test]
    fn caption_with_invalid_utf8_counts_as_a_read_failure() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("bad.txt"), b"\xff\xfe pneumonia").unwrap();
        let err = read_caption(&dir.path().join("bad.txt")).unwrap_err();
        assert!(matches!(err, SplitError::CaptionRead { .. }));

        let inventory = Inventory::from_records(vec![ImageRecord::new(
            "radiopaedia_3_1.jpg",
            "Radiopaedia",
            "a.jpg",
            Some("bad.txt".into()),
        )]);
        let groups = group_by_patient(&inventory).unwrap();
        let config = SplitConfig {
            data_root: Some(dir.path().to_path_buf()),
            ..SplitConfig::default()
        };
        let labeled = label_patients(&groups, &DiseaseTaxonomy::builtin(), &config);
        assert_eq!(labeled.labels[0].1, tags(&[DiseaseTag::Unspecified]));
        assert_eq!(labeled.diagnostics.caption_read_failures, 1);
        assert_eq!(labeled.diagnostics.images_without_captions, 0);
    }

    #[test]
    fn listed_caption_is_read_even_when_flagged_absent() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "Lobar pneumonia.").unwrap();
        let mut record = ImageRecord::new(
            "chexpert_patient4_a.jpg",
            "CheXpert",
            "a.jpg",
            Some("a.txt".into()),
        );
        record.has_caption = false;
        let groups = group_by_patient(&Inventory::from_records(vec![record])).unwrap();
        let config = SplitConfig {
            data_root: Some(dir.path().to_path_buf()),
            ..SplitConfig::default()
        };
        let labeled = label_patients(&groups, &DiseaseTaxonomy::builtin(), &config);
        assert_eq!(labeled.labels[0].1, tags(&[DiseaseTag::Pneumonia]));
        assert_eq!(labeled.diagnostics.images_without_captions, 0);
        assert_eq!(labeled.diagnostics.caption_read_failures, 0);
    }
}
