use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::constants::splits::{DEFAULT_RATIO_TOLERANCE, DEFAULT_SEED};
use crate::splits::SplitRatios;

/// Top-level splitting configuration.
#[derive(Clone, Debug)]
pub struct SplitConfig {
    /// Seed shared by every per-source allocation of the run.
    pub seed: u64,
    /// Target train/val/test patient fractions.
    pub ratios: SplitRatios,
    /// Allowed deviation of each split's patient fraction from its target.
    pub ratio_tolerance: f64,
    /// Root that relative caption paths are resolved against.
    ///
    /// `None` leaves relative paths as written (resolved against the working directory).
    pub data_root: Option<PathBuf>,
    /// Timestamp written to `split_metadata.json`; `None` uses the wall clock.
    ///
    /// Pinning it makes the metadata report byte-identical across reruns.
    pub generated_at: Option<DateTime<Utc>>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            ratios: SplitRatios::default(),
            ratio_tolerance: DEFAULT_RATIO_TOLERANCE,
            data_root: None,
            generated_at: None,
        }
    }
}

impl SplitConfig {
    /// Resolve a master index path string against `data_root`.
    pub fn resolve_path(&self, raw: &str) -> PathBuf {
        let path = Path::new(raw);
        match &self.data_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}
