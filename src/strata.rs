use crate::labels::{DiseaseLabelSet, DiseaseTag};

/// Reduce a patient's tags to the single highest-priority tag.
///
/// Priority follows [`DiseaseTag`] ordering, so this is the set minimum. An
/// empty set resolves to [`DiseaseTag::Unspecified`].
pub fn stratification_key(tags: &DiseaseLabelSet) -> DiseaseTag {
    tags.first().copied().unwrap_or(DiseaseTag::Unspecified)
}
