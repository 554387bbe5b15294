//! Master index ("inventory") model and CSV loading.
//!
//! Every raw cell of an input row is carried through untouched so split tables
//! reproduce the input columns exactly; the typed fields are the subset the
//! splitter interprets.

use csv::StringRecord;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::constants::inventory::{
    CANONICAL_COLUMNS, COL_CAPTION_PATH, COL_DATE_ADDED, COL_FILE_SIZE_MB, COL_FILENAME,
    COL_HAS_CAPTION, COL_IMAGE_PATH, COL_SOURCE, REQUIRED_COLUMNS,
};
use crate::errors::SplitError;
use crate::types::{Cell, Filename, PathString, SourceName};
use crate::utils::{non_empty_cell, parse_flag};

/// Directory scanner that builds a master index from image and caption folders.
pub mod scan;
/// Dataset statistics and integrity reports.
pub mod stats;

/// One master index row.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageRecord {
    /// Image filename.
    pub filename: Filename,
    /// Raw source tag (validated when grouping).
    pub source: SourceName,
    /// Path to the image.
    pub image_path: PathString,
    /// Path to the caption text, when the image has one.
    pub caption_path: Option<PathString>,
    /// Caption-presence flag as recorded upstream.
    pub has_caption: bool,
    /// Image size in megabytes, when recorded.
    pub file_size_mb: Option<f64>,
    /// Ingestion timestamp, when recorded.
    pub date_added: Option<String>,
    cells: Option<Vec<Cell>>,
}

impl ImageRecord {
    /// Build a record in memory; `has_caption` follows `caption_path`.
    pub fn new(
        filename: impl Into<Filename>,
        source: impl Into<SourceName>,
        image_path: impl Into<PathString>,
        caption_path: Option<PathString>,
    ) -> Self {
        Self {
            filename: filename.into(),
            source: source.into(),
            image_path: image_path.into(),
            has_caption: caption_path.is_some(),
            caption_path,
            file_size_mb: None,
            date_added: None,
            cells: None,
        }
    }

    /// Record the image size in megabytes.
    pub fn with_file_size_mb(mut self, file_size_mb: f64) -> Self {
        self.file_size_mb = Some(file_size_mb);
        self
    }

    /// Record the ingestion timestamp.
    pub fn with_date_added(mut self, date_added: impl Into<String>) -> Self {
        self.date_added = Some(date_added.into());
        self
    }

    /// Cells of this record laid out for `headers`.
    ///
    /// Rows loaded from disk return their original cells; in-memory records are
    /// rendered from their typed fields (unknown columns stay empty).
    pub fn row(&self, headers: &[String]) -> Vec<Cell> {
        if let Some(cells) = &self.cells
            && cells.len() == headers.len()
        {
            return cells.clone();
        }
        headers
            .iter()
            .map(|header| self.typed_cell(header))
            .collect()
    }

    fn typed_cell(&self, header: &str) -> Cell {
        match header {
            COL_FILENAME => self.filename.clone(),
            COL_SOURCE => self.source.clone(),
            COL_IMAGE_PATH => self.image_path.clone(),
            COL_CAPTION_PATH => self.caption_path.clone().unwrap_or_default(),
            COL_HAS_CAPTION => {
                let flag = if self.has_caption { "True" } else { "False" };
                flag.to_string()
            }
            COL_FILE_SIZE_MB => self
                .file_size_mb
                .map(|size| size.to_string())
                .unwrap_or_default(),
            COL_DATE_ADDED => self.date_added.clone().unwrap_or_default(),
            _ => String::new(),
        }
    }
}

/// A loaded (or scanned) master index.
#[derive(Clone, Debug, PartialEq)]
pub struct Inventory {
    headers: Vec<String>,
    records: Vec<ImageRecord>,
}

impl Inventory {
    /// Wrap in-memory records using the canonical column layout.
    pub fn from_records(records: Vec<ImageRecord>) -> Self {
        Self {
            headers: CANONICAL_COLUMNS.iter().map(|col| col.to_string()).collect(),
            records,
        }
    }

    /// Load a master index CSV, failing with [`SplitError::Schema`] when required
    /// columns are missing.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SplitError> {
        let path = path.as_ref();
        info!("loading master index from {}", path.display());
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .from_path(path)
            .map_err(|err| master_index_err(path, err))?;
        let headers: Vec<String> = reader
            .headers()
            .map_err(|err| master_index_err(path, err))?
            .iter()
            .map(str::to_string)
            .collect();
        let columns = ColumnIndex::resolve(path, &headers)?;

        let mut records = Vec::new();
        for (idx, row) in reader.records().enumerate() {
            let row = row.map_err(|err| master_index_err(path, err))?;
            // line 1 is the header
            records.push(columns.record(path, idx + 2, &row)?);
        }
        info!("loaded {} images", records.len());
        Ok(Self { headers, records })
    }

    /// Column names in file order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// All records in file order.
    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the inventory has no rows.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Serialize the inventory as CSV.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, SplitError> {
        encode_table(
            &self.headers,
            self.records.iter().map(|record| record.row(&self.headers)),
        )
    }

    /// Write the inventory as a CSV file, creating parent directories.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<(), SplitError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_csv_bytes()?)?;
        debug!("wrote {} rows to {}", self.records.len(), path.display());
        Ok(())
    }
}

/// Encode a header row plus data rows as CSV bytes.
pub fn encode_table<I>(headers: &[String], rows: I) -> Result<Vec<u8>, SplitError>
where
    I: IntoIterator<Item = Vec<Cell>>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(&row)?;
    }
    writer
        .into_inner()
        .map_err(|err| SplitError::Io(err.into_error()))
}

struct ColumnIndex {
    filename: usize,
    source: usize,
    image_path: usize,
    caption_path: usize,
    has_caption: usize,
    file_size_mb: Option<usize>,
    date_added: Option<usize>,
}

impl ColumnIndex {
    fn resolve(path: &Path, headers: &[String]) -> Result<Self, SplitError> {
        let position = |name: &str| headers.iter().position(|header| header == name);
        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|col| position(col).is_none())
            .map(|col| col.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(SplitError::Schema {
                path: path.to_path_buf(),
                missing,
            });
        }
        let required = |name: &str| {
            position(name).ok_or_else(|| SplitError::Schema {
                path: path.to_path_buf(),
                missing: vec![name.to_string()],
            })
        };
        Ok(Self {
            filename: required(COL_FILENAME)?,
            source: required(COL_SOURCE)?,
            image_path: required(COL_IMAGE_PATH)?,
            caption_path: required(COL_CAPTION_PATH)?,
            has_caption: required(COL_HAS_CAPTION)?,
            file_size_mb: position(COL_FILE_SIZE_MB),
            date_added: position(COL_DATE_ADDED),
        })
    }

    fn record(&self, path: &Path, line: usize, row: &StringRecord) -> Result<ImageRecord, SplitError> {
        let cell = |idx: usize| row.get(idx).unwrap_or("");
        let malformed = |details: String| SplitError::MasterIndex {
            path: path.to_path_buf(),
            details: format!("line {line}: {details}"),
        };

        let filename = cell(self.filename).trim();
        if filename.is_empty() {
            return Err(malformed("empty filename".to_string()));
        }
        let has_caption = parse_flag(cell(self.has_caption)).ok_or_else(|| {
            malformed(format!(
                "invalid has_caption value '{}'",
                cell(self.has_caption)
            ))
        })?;
        let file_size_mb = match self.file_size_mb.and_then(|idx| non_empty_cell(cell(idx))) {
            Some(raw) => Some(
                raw.parse::<f64>()
                    .map_err(|_| malformed(format!("invalid file_size_mb value '{raw}'")))?,
            ),
            None => None,
        };

        Ok(ImageRecord {
            filename: filename.to_string(),
            source: cell(self.source).trim().to_string(),
            image_path: cell(self.image_path).to_string(),
            caption_path: non_empty_cell(cell(self.caption_path)).map(str::to_string),
            has_caption,
            file_size_mb,
            date_added: self
                .date_added
                .and_then(|idx| non_empty_cell(cell(idx)))
                .map(str::to_string),
            cells: Some(row.iter().map(str::to_string).collect()),
        })
    }
}

fn master_index_err(path: &Path, err: csv::Error) -> SplitError {
    SplitError::MasterIndex {
        path: PathBuf::from(path),
        details: err.to_string(),
    }
}
