use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::constants::inventory::{CAPTION_EXTENSION, DATE_ADDED_FORMAT, IMAGE_EXTENSIONS};
use crate::errors::SplitError;
use crate::inventory::stats::IntegrityReport;
use crate::inventory::{ImageRecord, Inventory};
use crate::source::SourceTag;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Builds a master index from an images directory and a captions directory.
///
/// Captions are matched by stem (`<image stem>.txt`). Paths written to the
/// index are relative to `base_dir` when they live under it.
pub struct MasterIndexScanner {
    images_dir: PathBuf,
    captions_dir: PathBuf,
    base_dir: Option<PathBuf>,
    follow_links: bool,
    timestamp: Option<DateTime<Utc>>,
}

impl MasterIndexScanner {
    /// Create a scanner over `images_dir` and `captions_dir`.
    pub fn new(images_dir: impl Into<PathBuf>, captions_dir: impl Into<PathBuf>) -> Self {
        Self {
            images_dir: images_dir.into(),
            captions_dir: captions_dir.into(),
            base_dir: None,
            follow_links: false,
            timestamp: None,
        }
    }

    /// Write paths relative to `base_dir`.
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    /// Configure symlink traversal.
    pub fn with_follow_links(mut self, follow_links: bool) -> Self {
        self.follow_links = follow_links;
        self
    }

    /// Pin the `date_added` value instead of using the wall clock.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Walk the images directory and build one record per image, sorted by filename.
    pub fn scan(&self) -> Result<Inventory, SplitError> {
        info!("scanning images under {}", self.images_dir.display());
        let date_added = self
            .timestamp
            .unwrap_or_else(Utc::now)
            .format(DATE_ADDED_FORMAT)
            .to_string();

        let mut images = self.files_with_extension(&self.images_dir, &IMAGE_EXTENSIONS)?;
        images.sort_by(|a, b| file_name(a).cmp(&file_name(b)));

        let mut records = Vec::with_capacity(images.len());
        for image in &images {
            let filename = file_name(image);
            let caption = self.captions_dir.join(format!(
                "{}.{}",
                file_stem(image),
                CAPTION_EXTENSION
            ));
            let has_caption = caption.is_file();
            if !has_caption {
                debug!("no caption for {}", filename);
            }
            let size_bytes = fs::metadata(image)?.len();
            let size_mb = (size_bytes as f64 / BYTES_PER_MB * 1000.0).round() / 1000.0;
            let record = ImageRecord::new(
                filename.clone(),
                SourceTag::from_filename(&filename).as_str(),
                self.relative(image),
                has_caption.then(|| self.relative(&caption)),
            )
            .with_file_size_mb(size_mb)
            .with_date_added(date_added.clone());
            records.push(record);
        }
        info!("indexed {} images", records.len());
        Ok(Inventory::from_records(records))
    }

    /// Compare image stems against caption stems.
    pub fn check_integrity(&self) -> Result<IntegrityReport, SplitError> {
        let images: BTreeSet<String> = self
            .files_with_extension(&self.images_dir, &IMAGE_EXTENSIONS)?
            .iter()
            .map(|path| file_stem(path))
            .collect();
        let captions: BTreeSet<String> = self
            .files_with_extension(&self.captions_dir, &[CAPTION_EXTENSION])?
            .iter()
            .map(|path| file_stem(path))
            .collect();
        Ok(IntegrityReport {
            images_without_captions: images.difference(&captions).cloned().collect(),
            orphaned_captions: captions.difference(&images).cloned().collect(),
        })
    }

    fn files_with_extension(&self, root: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, SplitError> {
        if !root.is_dir() {
            return Err(SplitError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("directory '{}' does not exist", root.display()),
            )));
        }
        let mut walker = WalkDir::new(root);
        if self.follow_links {
            walker = walker.follow_links(true);
        }
        Ok(walker
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| has_extension(path, extensions))
            .collect())
    }

    fn relative(&self, path: &Path) -> String {
        let relative = self
            .base_dir
            .as_deref()
            .and_then(|base| path.strip_prefix(base).ok())
            .unwrap_or(path);
        relative.to_string_lossy().into_owned()
    }
}

/// True if the path extension matches one of `extensions` (case-insensitive).
pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|allowed| ext.eq_ignore_ascii_case(allowed)))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}
