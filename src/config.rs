//! Run configuration, read from TOML with per-field defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

pub const ENV_DATABASE: &str = "SYNTENIC_DB";
pub const ENV_HOMOLOGY: &str = "SYNTENIC_HOMOLOGY";
pub const ENV_ALIGNMENT_DIR: &str = "SYNTENIC_ALIGNMENT_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub links: LinkConfig,
    #[serde(default)]
    pub synteny: SyntenyConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    /// Warehouse file; defaults to `{data_dir}/syntenic/warehouse.db`
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Source whose annotations carry `GeneID:<ref>` reference ids
    #[serde(default = "default_reference_source")]
    pub reference_source: String,
    /// Source recorded on homology link rows
    #[serde(default = "default_homology_source")]
    pub homology_source: String,
    #[serde(default)]
    pub homology: HomologyFeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomologyFeedConfig {
    /// Feed file; phase 2 is skipped when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default)]
    pub columns: ColumnMapping,
}

/// Zero-based column positions in the homology feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    #[serde(rename = "HID", alias = "hid")]
    pub hid: usize,
    #[serde(rename = "taxID", alias = "tax_id")]
    pub tax_id: usize,
    #[serde(rename = "geneID", alias = "gene_id")]
    pub gene_id: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntenyConfig {
    /// Directory holding one alignment database per target assembly
    #[serde(default)]
    pub feed_dir: Option<PathBuf>,
    /// Minimum target-side block length, in native units
    #[serde(default = "default_threshold_length")]
    pub threshold_length: i64,
    #[serde(default = "default_allowed_levels")]
    pub allowed_levels: Vec<i64>,
    /// Prefix the alignment feed puts on chromosome names (e.g. "chr")
    #[serde(default)]
    pub chromosome_prefix: String,
    #[serde(default = "default_assembly_type")]
    pub assembly_type: String,
    /// Species in pair order; every ordered pair of distinct entries is built
    #[serde(default)]
    pub species: Vec<SpeciesConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesConfig {
    pub name: String,
    /// Assembly name the alignment feed uses (e.g. "hg38")
    pub alignment_db: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpstreamConfig {
    /// Directory of normalized TSV rows to load before linking
    #[serde(default)]
    pub tsv_dir: Option<PathBuf>,
}

fn default_reference_source() -> String {
    "NCBI Gene".to_string()
}

fn default_homology_source() -> String {
    "HomoloGene".to_string()
}

fn default_delimiter() -> String {
    "\t".to_string()
}

fn default_threshold_length() -> i64 {
    100_000
}

fn default_allowed_levels() -> Vec<i64> {
    vec![1, 2]
}

fn default_assembly_type() -> String {
    "Genomic".to_string()
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            reference_source: default_reference_source(),
            homology_source: default_homology_source(),
            homology: HomologyFeedConfig::default(),
        }
    }
}

impl Default for HomologyFeedConfig {
    fn default() -> Self {
        Self {
            path: None,
            delimiter: default_delimiter(),
            columns: ColumnMapping::default(),
        }
    }
}

impl Default for ColumnMapping {
    /// Column layout of `homologene.data`.
    fn default() -> Self {
        Self {
            hid: 0,
            tax_id: 1,
            gene_id: 2,
        }
    }
}

impl Default for SyntenyConfig {
    fn default() -> Self {
        Self {
            feed_dir: None,
            threshold_length: default_threshold_length(),
            allowed_levels: default_allowed_levels(),
            chromosome_prefix: String::new(),
            assembly_type: default_assembly_type(),
            species: Vec::new(),
        }
    }
}

impl ColumnMapping {
    /// Rejects mappings that point two fields at the same column.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.hid == self.tax_id || self.hid == self.gene_id || self.tax_id == self.gene_id {
            return Err(EngineError::Config(format!(
                "homology columns must be distinct (HID={}, taxID={}, geneID={})",
                self.hid, self.tax_id, self.gene_id
            )));
        }
        Ok(())
    }

    /// Number of columns a row needs to carry every mapped field.
    pub fn min_width(&self) -> usize {
        self.hid.max(self.tax_id).max(self.gene_id) + 1
    }
}

impl HomologyFeedConfig {
    /// The delimiter as a single byte, as the csv reader needs it.
    pub fn delimiter_byte(&self) -> Result<u8, EngineError> {
        match self.delimiter.as_bytes() {
            [b] => Ok(*b),
            _ => Err(EngineError::Config(format!(
                "homology delimiter must be a single byte, got {:?}",
                self.delimiter
            ))),
        }
    }
}

impl SyntenyConfig {
    /// Every ordered (target, query) pair of distinct configured species.
    pub fn pairs(&self) -> Vec<(&SpeciesConfig, &SpeciesConfig)> {
        let mut pairs = Vec::new();
        for target in &self.species {
            for query in &self.species {
                if target.name != query.name {
                    pairs.push((target, query));
                }
            }
        }
        pairs
    }
}

impl Config {
    /// Reads a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        Ok(config)
    }

    /// Applies `SYNTENIC_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary lookup (the environment in production).
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(ENV_DATABASE).filter(|v| !v.is_empty()) {
            self.database.path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup(ENV_HOMOLOGY).filter(|v| !v.is_empty()) {
            self.links.homology.path = Some(PathBuf::from(path));
        }
        if let Some(dir) = lookup(ENV_ALIGNMENT_DIR).filter(|v| !v.is_empty()) {
            self.synteny.feed_dir = Some(PathBuf::from(dir));
        }
    }

    /// Resolves the warehouse path, falling back to the platform data directory.
    ///
    /// - Linux: `~/.local/share/syntenic/warehouse.db`
    /// - macOS: `~/Library/Application Support/syntenic/warehouse.db`
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.database.path {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Failed to determine data directory"))?;
        Ok(data_dir.join("syntenic").join("warehouse.db"))
    }
}
