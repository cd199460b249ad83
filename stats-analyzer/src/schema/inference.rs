//! Schema inference over a bounded sample of rows.
//!
//! Every sampled field is parsed with [`parse_value`] and the column's type is
//! widened to the join of everything seen. Because the join is a maximum over
//! a total order, the result does not depend on row order.
//!
//! # Example
//!
//! ```rust
//! use stats_analyzer::schema::{SchemaInferenceEngine, TypeTag};
//!
//! let rows = vec![
//!     vec!["id".to_string(), "price".to_string()],
//!     vec!["1".to_string(), "1.99".to_string()],
//!     vec!["2".to_string(), "".to_string()],
//! ];
//!
//! let manifest = SchemaInferenceEngine::new().infer(&rows).unwrap();
//! assert_eq!(manifest.columns[1].type_tag, TypeTag::Float);
//! assert!(manifest.columns[1].nullable);
//! ```

use tracing::{debug, info, instrument, warn};

use super::header::analyze_header;
use super::{parse_value, ColumnInfo, RelationManifest, TypeTag};
use crate::error::{Result, StatsError};
use crate::sources::CsvSource;

/// Running state of one column during inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnTypeState {
    pub type_tag: TypeTag,
    pub nullable: bool,
}

impl Default for ColumnTypeState {
    fn default() -> Self {
        Self {
            type_tag: TypeTag::Empty,
            nullable: false,
        }
    }
}

impl ColumnTypeState {
    /// Folds one raw field into the state.
    pub fn observe(&mut self, raw: &str) {
        let observed = parse_value(raw).type_tag();
        if observed == TypeTag::Empty {
            self.nullable = true;
        } else if observed.rank() > self.type_tag.rank() {
            self.type_tag = observed;
        }
    }

    /// Final column type; a column with no non-empty value is a nullable string.
    pub fn resolve(self) -> (TypeTag, bool) {
        match self.type_tag {
            TypeTag::Empty => (TypeTag::String, true),
            tag => (tag, self.nullable),
        }
    }
}

/// Builder for [`SchemaInferenceEngine`].
pub struct SchemaInferenceEngineBuilder {
    sample_size: usize,
}

impl SchemaInferenceEngineBuilder {
    /// Set the maximum number of data rows inspected
    pub fn sample_size(mut self, size: usize) -> Self {
        self.sample_size = size;
        self
    }

    /// Build the SchemaInferenceEngine
    pub fn build(self) -> SchemaInferenceEngine {
        SchemaInferenceEngine {
            sample_size: self.sample_size.max(1),
        }
    }
}

/// Infers a [`RelationManifest`] from the head of a file.
#[derive(Debug, Clone)]
pub struct SchemaInferenceEngine {
    sample_size: usize,
}

impl Default for SchemaInferenceEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaInferenceEngine {
    /// Default cap on sampled data rows.
    pub const DEFAULT_SAMPLE_SIZE: usize = 50_000;

    pub fn builder() -> SchemaInferenceEngineBuilder {
        SchemaInferenceEngineBuilder {
            sample_size: Self::DEFAULT_SAMPLE_SIZE,
        }
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Samples `source` and infers its manifest.
    ///
    /// One extra row is read so a header row does not count against the
    /// sample size.
    #[instrument(skip(self, source), fields(path = %source.path().display()))]
    pub fn infer_source(&self, source: &CsvSource) -> Result<RelationManifest> {
        let rows = source.sample(self.sample_size.saturating_add(1))?;
        self.infer(&rows)
    }

    /// Infers a manifest from rows taken from the start of a file.
    ///
    /// `rows[0]` is the candidate header. When it does not look like a header,
    /// synthetic names are used and it is sampled as data.
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    pub fn infer(&self, rows: &[Vec<String>]) -> Result<RelationManifest> {
        let Some(first_row) = rows.first() else {
            return Err(StatsError::empty_input("file contains no rows"));
        };
        let header = analyze_header(first_row);
        if header.names.is_empty() {
            return Err(StatsError::empty_input("first row has no fields"));
        }

        let data = if header.first_row_is_data {
            rows
        } else {
            &rows[1..]
        };
        let data = &data[..data.len().min(self.sample_size)];
        if data.is_empty() {
            return Err(StatsError::empty_input("no data rows to sample"));
        }

        let states = self.infer_types(header.names.len(), data);
        let columns = header
            .names
            .into_iter()
            .zip(states)
            .map(|(name, state)| {
                let (type_tag, nullable) = state.resolve();
                debug!(column = %name, %type_tag, nullable, "Inferred column type");
                ColumnInfo::new(name, type_tag, nullable)
            })
            .collect();

        let manifest = RelationManifest::new(columns, header.first_row_is_data);
        info!(
            columns = manifest.len(),
            sampled_rows = data.len(),
            first_row_is_data = manifest.first_row_is_data,
            has_explicit_key = manifest.has_explicit_key,
            "Completed schema inference"
        );
        Ok(manifest)
    }

    /// Folds `rows` into one type state per column.
    ///
    /// Missing trailing fields count as empty; fields past `width` are ignored.
    pub fn infer_types(&self, width: usize, rows: &[Vec<String>]) -> Vec<ColumnTypeState> {
        let mut states = vec![ColumnTypeState::default(); width];
        let mut ragged = 0usize;
        for row in rows {
            if row.len() != width {
                ragged += 1;
            }
            for (idx, state) in states.iter_mut().enumerate() {
                state.observe(row.get(idx).map(String::as_str).unwrap_or(""));
            }
        }
        if ragged > 0 {
            warn!(ragged_rows = ragged, width, "Sample contains rows of unexpected width");
        }
        states
    }
}
