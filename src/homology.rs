//! Streaming reader for the external homology-cluster feed.
//!
//! The feed is a headerless delimited file (HomoloGene's `homologene.data`
//! by default). Only the cluster id, taxon id and gene reference columns are
//! read; their positions come from the configured [`ColumnMapping`].

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter, Trim};

use crate::config::{ColumnMapping, HomologyFeedConfig};
use crate::error::{EngineError, EngineResult};

/// One row of the homology feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomologyRow {
    pub cluster_id: i64,
    pub tax_id: i64,
    pub gene_ref: String,
}

/// A configured, not yet opened, homology feed.
#[derive(Debug, Clone)]
pub struct HomologyFeed {
    path: PathBuf,
    delimiter: u8,
    columns: ColumnMapping,
}

impl HomologyFeed {
    /// Validates the column mapping and delimiter.
    pub fn new(
        path: impl Into<PathBuf>,
        delimiter: u8,
        columns: ColumnMapping,
    ) -> EngineResult<Self> {
        columns.validate()?;
        Ok(Self {
            path: path.into(),
            delimiter,
            columns,
        })
    }

    /// Builds the feed from configuration; `None` when no feed path is set.
    pub fn from_config(config: &HomologyFeedConfig) -> EngineResult<Option<Self>> {
        match &config.path {
            Some(path) => Self::new(path, config.delimiter_byte()?, config.columns).map(Some),
            None => Ok(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the feed file for streaming.
    pub fn open(&self) -> EngineResult<HomologyReader<File>> {
        let file = File::open(&self.path)?;
        Ok(HomologyReader::new(file, self.delimiter, self.columns))
    }
}

/// Row-by-row iterator over a homology feed.
///
/// Yields `Err(EngineError::Data)` for a single malformed row and keeps
/// going; yields `Err(EngineError::Config)` when the very first row is too
/// narrow for the column mapping, which means the mapping itself is wrong.
pub struct HomologyReader<R: Read> {
    records: StringRecordsIntoIter<R>,
    columns: ColumnMapping,
    line: u64,
}

impl<R: Read> HomologyReader<R> {
    pub fn new(reader: R, delimiter: u8, columns: ColumnMapping) -> Self {
        let records = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .trim(Trim::All)
            .from_reader(reader)
            .into_records();
        Self {
            records,
            columns,
            line: 0,
        }
    }

    fn parse(&self, record: &StringRecord) -> EngineResult<HomologyRow> {
        if record.len() < self.columns.min_width() {
            let message = format!(
                "line {} has {} columns, mapping needs {}",
                self.line,
                record.len(),
                self.columns.min_width()
            );
            return Err(if self.line == 1 {
                EngineError::Config(message)
            } else {
                EngineError::Data(message)
            });
        }

        let field = |index: usize| record.get(index).unwrap_or_default();
        let integer = |index: usize, name: &str| {
            field(index).parse::<i64>().map_err(|_| {
                EngineError::Data(format!(
                    "line {}: {name} '{}' is not an integer",
                    self.line,
                    field(index)
                ))
            })
        };

        let cluster_id = integer(self.columns.hid, "HID")?;
        let tax_id = integer(self.columns.tax_id, "taxID")?;
        let gene_ref = field(self.columns.gene_id).to_string();
        if gene_ref.is_empty() {
            return Err(EngineError::Data(format!("line {}: empty geneID", self.line)));
        }

        Ok(HomologyRow {
            cluster_id,
            tax_id,
            gene_ref,
        })
    }
}

impl<R: Read> Iterator for HomologyReader<R> {
    type Item = EngineResult<HomologyRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        self.line += 1;
        Some(match record {
            Ok(record) => self.parse(&record),
            Err(err) if err.is_io_error() => Err(EngineError::Csv(err)),
            Err(err) => Err(EngineError::Data(format!("line {}: {err}", self.line))),
        })
    }
}
