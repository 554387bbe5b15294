use crate::splits::SplitLabel;

/// Constants used by stable hashing and fallback patient identifiers.
pub mod hash {
    /// Number of hex digits of `SHA-256(filename)` kept in fallback patient ids.
    pub const FALLBACK_ID_HEX_LEN: usize = 16;
    /// Infix between the source prefix and the hash in fallback patient ids.
    pub const FALLBACK_ID_INFIX: &str = "unknown";
}

/// Constants describing the master index layout.
pub mod inventory {
    /// Column holding the image filename.
    pub const COL_FILENAME: &str = "filename";
    /// Column holding the source tag.
    pub const COL_SOURCE: &str = "source";
    /// Column holding the image path.
    pub const COL_IMAGE_PATH: &str = "image_path";
    /// Column holding the caption path (empty when absent).
    pub const COL_CAPTION_PATH: &str = "caption_path";
    /// Column holding the caption-presence flag.
    pub const COL_HAS_CAPTION: &str = "has_caption";
    /// Conventional column holding the image size in megabytes.
    pub const COL_FILE_SIZE_MB: &str = "file_size_mb";
    /// Conventional column holding the ingestion timestamp.
    pub const COL_DATE_ADDED: &str = "date_added";
    /// Column appended to split tables with the derived patient id.
    pub const COL_PATIENT_ID: &str = "patient_id";
    /// Column appended to split tables with the assigned split name.
    pub const COL_SPLIT: &str = "split";

    /// Columns every master index must carry.
    pub const REQUIRED_COLUMNS: [&str; 5] = [
        COL_FILENAME,
        COL_SOURCE,
        COL_IMAGE_PATH,
        COL_CAPTION_PATH,
        COL_HAS_CAPTION,
    ];
    /// Column layout used for inventories built in memory or by the scanner.
    pub const CANONICAL_COLUMNS: [&str; 7] = [
        COL_FILENAME,
        COL_SOURCE,
        COL_IMAGE_PATH,
        COL_CAPTION_PATH,
        COL_HAS_CAPTION,
        COL_FILE_SIZE_MB,
        COL_DATE_ADDED,
    ];

    /// Image extensions picked up by the master index scanner.
    pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];
    /// Caption file extension.
    pub const CAPTION_EXTENSION: &str = "txt";
    /// Timestamp format written to `date_added`.
    pub const DATE_ADDED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
    /// Default master index filename.
    pub const DEFAULT_MASTER_INDEX_FILENAME: &str = "master_index.csv";
    /// Default dataset statistics filename.
    pub const DEFAULT_STATS_FILENAME: &str = "dataset_statistics.json";
}

/// Constants used by split allocation, validation and artifact layout.
pub mod splits {
    use super::SplitLabel;

    /// Default run seed.
    pub const DEFAULT_SEED: u64 = 42;
    /// Allowed deviation of the ratio sum from `1.0`.
    pub const RATIO_SUM_EPSILON: f64 = 1e-6;
    /// Default allowed deviation of a split's patient fraction from its target.
    pub const DEFAULT_RATIO_TOLERANCE: f64 = 0.05;
    /// Canonical split iteration order.
    pub const ALL_SPLITS: [SplitLabel; 3] =
        [SplitLabel::Train, SplitLabel::Validation, SplitLabel::Test];

    /// Report artifact filename.
    pub const METADATA_FILENAME: &str = "split_metadata.json";
    /// Patient → split audit mapping filename.
    pub const PATIENT_MAPPING_FILENAME: &str = "patient_mapping.json";
    /// Prefix of the staging directory used while artifacts are written.
    pub const STAGING_DIR_PREFIX: &str = ".split_staging";
}
