//! CSV input for the pipeline.
//!
//! Files are read with the `csv` crate in headerless, flexible mode: header
//! detection is done by [`crate::schema::header`] and ragged rows are
//! normalized by the callers. Every field is trimmed.

pub mod delimiter;

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::error::{Result, StatsError};

pub use delimiter::{sniff_delimiter, DelimiterDetection};

/// Bytes read from the head of a file for delimiter sniffing.
const SNIFF_BYTES: u64 = 64 * 1024;

/// Options for reading a CSV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvOptions {
    pub delimiter: u8,
    pub quote: u8,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
        }
    }
}

/// A delimiter-separated file on local disk.
///
/// The source never keeps a reader open; [`CsvSource::reader`] reopens the
/// file from the start, so sampling and loading are independent passes.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
    options: CsvOptions,
}

impl CsvSource {
    /// Creates a source with default options.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_options(path, CsvOptions::default())
    }

    /// Creates a source with custom options.
    pub fn with_options(path: impl AsRef<Path>, options: CsvOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(StatsError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("CSV file not found: {}", path.display()),
            )));
        }
        Ok(Self { path, options })
    }

    /// Creates a source whose delimiter is sniffed from the head of the file.
    #[instrument]
    pub fn detect(path: impl AsRef<Path> + std::fmt::Debug) -> Result<(Self, DelimiterDetection)> {
        let mut source = Self::new(path)?;
        let detection = sniff_delimiter(&source.head()?);
        debug!(
            delimiter = %(detection.delimiter as char).escape_default(),
            detected = detection.detected,
            "Sniffed delimiter"
        );
        source.options.delimiter = detection.delimiter;
        Ok((source, detection))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> CsvOptions {
        self.options
    }

    /// Opens a fresh reader positioned at the first row.
    pub fn reader(&self) -> Result<csv::Reader<File>> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .delimiter(self.options.delimiter)
            .quote(self.options.quote)
            .from_path(&self.path)?;
        Ok(reader)
    }

    /// Reads at most `limit` rows from the start of the file.
    pub fn sample(&self, limit: usize) -> Result<Vec<Vec<String>>> {
        let mut reader = self.reader()?;
        let mut rows = Vec::new();
        for record in reader.records().take(limit) {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(rows)
    }

    /// Lossy text of the first bytes of the file.
    fn head(&self) -> Result<String> {
        let mut buf = Vec::new();
        File::open(&self.path)?
            .take(SNIFF_BYTES)
            .read_to_end(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Pads or truncates a row to `width` fields.
///
/// Returns the number of fields dropped from an overlong row.
pub fn normalize_row(row: &mut Vec<String>, width: usize) -> usize {
    let dropped = row.len().saturating_sub(width);
    row.resize(width, String::new());
    dropped
}
