use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use tracing::debug;

use crate::errors::SplitError;
use crate::hash::stable_hash_str;
use crate::labels::DiseaseTag;
use crate::splits::{SplitAssignment, SplitRatios, split_counts_for_total};
use crate::types::PatientId;

#[derive(Debug, Clone)]
/// Small deterministic RNG (splitmix64) so shuffles are reproducible across platforms.
pub struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    /// Generator seeded directly with `seed`.
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generator for one stratum, derived from the run seed and the stratum name.
    pub fn for_stratum(seed: u64, stratum: DiseaseTag) -> Self {
        Self::new(stable_hash_str(seed, stratum.as_str()))
    }

    fn next_u64_internal(&mut self) -> u64 {
        let mut z = self.state.wrapping_add(0x9E3779B97F4A7C15);
        self.state = z;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }
}

impl rand::RngCore for DeterministicRng {
    fn next_u32(&mut self) -> u32 {
        self.next_u64_internal() as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.next_u64_internal()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64_internal().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}

/// Proportional per-stratum train/val/test allocation.
///
/// Each stratum is shuffled with its own generator and cut at
/// `floor(n * train)` and `floor(n * train) + floor(n * val)`; the remainder
/// goes to test. Strata are visited in [`DiseaseTag`] order and the stratum
/// results are concatenated split-by-split.
#[derive(Clone, Copy, Debug)]
pub struct StratifiedAllocator {
    ratios: SplitRatios,
}

impl StratifiedAllocator {
    /// Fails with [`SplitError::InvalidRatio`] before any allocation happens.
    pub fn new(ratios: SplitRatios) -> Result<Self, SplitError> {
        Ok(Self {
            ratios: ratios.validated()?,
        })
    }

    /// Validated target ratios.
    pub fn ratios(&self) -> SplitRatios {
        self.ratios
    }

    /// Allocate `patients` (id, stratification key) into three disjoint splits.
    ///
    /// Output depends only on the input order, the keys and `seed`.
    pub fn allocate(&self, patients: &[(PatientId, DiseaseTag)], seed: u64) -> SplitAssignment {
        let mut strata: BTreeMap<DiseaseTag, Vec<PatientId>> = BTreeMap::new();
        for (patient_id, key) in patients {
            strata.entry(*key).or_default().push(patient_id.clone());
        }

        let mut assignment = SplitAssignment::default();
        for (stratum, mut ids) in strata {
            let mut rng = DeterministicRng::for_stratum(seed, stratum);
            ids.shuffle(&mut rng);
            let counts = split_counts_for_total(ids.len(), self.ratios);
            debug!(
                "stratum {}: {} patients -> train={} val={} test={}",
                stratum,
                ids.len(),
                counts[0].1,
                counts[1].1,
                counts[2].1
            );
            let mut remaining = ids.into_iter();
            for (label, count) in counts {
                assignment
                    .patients_mut(label)
                    .extend(remaining.by_ref().take(count));
            }
        }
        assignment
    }
}
