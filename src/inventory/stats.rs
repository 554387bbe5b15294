use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::errors::SplitError;
use crate::inventory::Inventory;
use crate::types::SourceName;

/// Aggregate counts for a master index, written as `dataset_statistics.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetStatistics {
    /// When the statistics were computed.
    pub generated_at: DateTime<Utc>,
    /// Totals across every source.
    pub overall: OverallStatistics,
    /// Totals per source tag.
    pub by_source: BTreeMap<SourceName, SourceStatistics>,
}

/// Totals across the whole master index.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallStatistics {
    /// Indexed images.
    pub total_images: usize,
    /// Images with a caption.
    pub total_captions: usize,
    /// Image bytes in megabytes, two decimals.
    pub total_size_mb: f64,
    /// Image bytes in gigabytes, three decimals.
    pub total_size_gb: f64,
    /// Mean image size in megabytes.
    pub avg_image_size_mb: f64,
}

/// Totals for one source.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceStatistics {
    /// Images from this source.
    pub images: usize,
    /// Images from this source with a caption.
    pub captions: usize,
    /// Image bytes in megabytes, two decimals.
    pub size_mb: f64,
}

impl DatasetStatistics {
    /// Summarize `inventory`; rows without a recorded size count as zero megabytes.
    pub fn from_inventory(inventory: &Inventory, generated_at: DateTime<Utc>) -> Self {
        let mut overall = OverallStatistics::default();
        let mut by_source: BTreeMap<SourceName, SourceStatistics> = BTreeMap::new();
        for record in inventory.records() {
            let size_mb = record.file_size_mb.unwrap_or(0.0);
            overall.total_images += 1;
            overall.total_size_mb += size_mb;
            let entry = by_source.entry(record.source.clone()).or_default();
            entry.images += 1;
            entry.size_mb += size_mb;
            if record.has_caption {
                overall.total_captions += 1;
                entry.captions += 1;
            }
        }
        overall.total_size_mb = round_to(overall.total_size_mb, 2);
        overall.total_size_gb = round_to(overall.total_size_mb / 1024.0, 3);
        overall.avg_image_size_mb = if overall.total_images == 0 {
            0.0
        } else {
            round_to(overall.total_size_mb / overall.total_images as f64, 3)
        };
        for entry in by_source.values_mut() {
            entry.size_mb = round_to(entry.size_mb, 2);
        }
        Self {
            generated_at,
            overall,
            by_source,
        }
    }

    /// Write the statistics as pretty JSON, creating parent directories.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), SplitError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

/// Image/caption pairing problems found by
/// [`MasterIndexScanner::check_integrity`](crate::inventory::scan::MasterIndexScanner::check_integrity).
///
/// Both lists hold file stems in sorted order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// Image stems with no `<stem>.txt`.
    pub images_without_captions: Vec<String>,
    /// Caption stems with no image.
    pub orphaned_captions: Vec<String>,
}

impl IntegrityReport {
    /// True when every image has a caption and every caption has an image.
    pub fn is_clean(&self) -> bool {
        self.images_without_captions.is_empty() && self.orphaned_captions.is_empty()
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::ImageRecord;
    use chrono::TimeZone;

    #[test]
    fn statistics_total_and_break_down_by_source() {
        let inventory = Inventory::from_records(vec![
            ImageRecord::new("chexpert_patient1_a.jpg", "CheXpert", "a", Some("a.txt".into()))
                .with_file_size_mb(1.5),
            ImageRecord::new("chexpert_patient2_a.jpg", "CheXpert", "b", None)
                .with_file_size_mb(0.5),
            ImageRecord::new("radiopaedia_3_1.jpg", "Radiopaedia", "c", Some("c.txt".into())),
        ]);
        let when = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let stats = DatasetStatistics::from_inventory(&inventory, when);

        assert_eq!(stats.overall.total_images, 3);
        assert_eq!(stats.overall.total_captions, 2);
        assert!((stats.overall.total_size_mb - 2.0).abs() < 1e-9);
        assert!((stats.overall.avg_image_size_mb - 0.667).abs() < 1e-9);
        assert_eq!(stats.by_source["CheXpert"].images, 2);
        assert_eq!(stats.by_source["CheXpert"].captions, 1);
        assert_eq!(stats.by_source["Radiopaedia"].size_mb, 0.0);
    }

    #[test]
    fn empty_inventory_has_zero_average() {
        let when = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let stats = DatasetStatistics::from_inventory(&Inventory::from_records(Vec::new()), when);
        assert_eq!(stats.overall.total_images, 0);
        assert_eq!(stats.overall.avg_image_size_mb, 0.0);
        assert!(stats.by_source.is_empty());
    }

    #[test]
    fn clean_integrity_report() {
        assert!(IntegrityReport::default().is_clean());
    }
}
