//! Upstream loaders that populate assemblies and annotation sets.
//!
//! Per-format parsers live outside this crate; they hand the engine
//! normalized tab-separated files which `TsvLoader` reads. Every file has a
//! header row. The `type` column is optional wherever it appears and defaults
//! to `Genomic`.
//!
//! | file                  | columns                                                              |
//! |-----------------------|----------------------------------------------------------------------|
//! | `maps.tsv`            | species type version scale tax_id                                    |
//! | `chromosomes.tsv`     | species type version name length                                     |
//! | `annotation_sets.tsv` | species type version set_version set_type default                   |
//! | `annotations.tsv`     | species type version set_version chromosome name start stop source source_ref |
//! | `attributes.tsv`      | species type version set_version annotation attribute value (optional file) |

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::{AnnotationSetId, ChromosomeId, MapId, NewAnnotation, SourceId};
use crate::warehouse::Warehouse;

pub const MAPS_FILE: &str = "maps.tsv";
pub const CHROMOSOMES_FILE: &str = "chromosomes.tsv";
pub const ANNOTATION_SETS_FILE: &str = "annotation_sets.tsv";
pub const ANNOTATIONS_FILE: &str = "annotations.tsv";
pub const ATTRIBUTES_FILE: &str = "attributes.tsv";

/// Counts from one loader call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub maps_loaded: usize,
    pub maps_skipped: usize,
    pub chromosomes: usize,
    pub annotation_sets_loaded: usize,
    pub annotation_sets_skipped: usize,
    pub annotations: usize,
    pub attributes: usize,
    /// Rows that could not be parsed or referenced something unknown
    pub rows_skipped: usize,
}

/// A source of assemblies and annotation sets for the warehouse.
///
/// Implementations must be idempotent: loading the same input twice leaves
/// the warehouse unchanged the second time.
pub trait UpstreamLoader {
    /// Name used in log messages.
    fn name(&self) -> &str;

    /// Loads maps and their chromosomes.
    fn load_assemblies(&self, warehouse: &Warehouse) -> Result<LoadReport>;

    /// Loads annotation sets, their annotations and attributes.
    fn load_annotation_sets(&self, warehouse: &Warehouse) -> Result<LoadReport>;
}

fn default_map_type() -> String {
    "Genomic".to_string()
}

#[derive(Debug, Deserialize)]
struct MapRow {
    species: String,
    #[serde(rename = "type", default = "default_map_type")]
    map_type: String,
    version: i64,
    scale: i64,
    tax_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ChromosomeRow {
    species: String,
    #[serde(rename = "type", default = "default_map_type")]
    map_type: String,
    version: i64,
    name: String,
    length: i64,
}

#[derive(Debug, Deserialize)]
struct AnnotationSetRow {
    species: String,
    #[serde(rename = "type", default = "default_map_type")]
    map_type: String,
    version: i64,
    set_version: i64,
    set_type: String,
    #[serde(default)]
    default: bool,
}

#[derive(Debug, Deserialize)]
struct AnnotationRow {
    species: String,
    #[serde(rename = "type", default = "default_map_type")]
    map_type: String,
    version: i64,
    set_version: i64,
    chromosome: String,
    name: String,
    start: i64,
    stop: i64,
    source: Option<String>,
    source_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AttributeRow {
    species: String,
    #[serde(rename = "type", default = "default_map_type")]
    map_type: String,
    version: i64,
    set_version: i64,
    annotation: String,
    attribute: String,
    value: String,
}

type MapKey = (String, String, i64);
type SetKey = (String, String, i64, i64);

/// Reads normalized TSV files from one directory.
#[derive(Debug, Clone)]
pub struct TsvLoader {
    dir: PathBuf,
    name: String,
}

impl TsvLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let name = format!("tsv:{}", dir.display());
        Self { dir, name }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Streams the rows of one file into `handle`.
    ///
    /// Malformed rows are logged and counted, an I/O failure aborts. A
    /// missing optional file yields no rows.
    fn read_rows<T: DeserializeOwned>(
        &self,
        file: &str,
        required: bool,
        report: &mut LoadReport,
        mut handle: impl FnMut(T, &mut LoadReport) -> Result<()>,
    ) -> Result<()> {
        let path = self.dir.join(file);
        if !path.exists() {
            if required {
                anyhow::bail!("Upstream file not found: {}", path.display());
            }
            debug!(file = %path.display(), "optional upstream file absent");
            return Ok(());
        }

        let reader = File::open(&path)
            .with_context(|| format!("Failed to open upstream file: {}", path.display()))?;
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(reader);

        for row in reader.deserialize::<T>() {
            match row {
                Ok(row) => handle(row, report)?,
                Err(err) if err.is_io_error() => {
                    return Err(err)
                        .with_context(|| format!("Failed to read {}", path.display()));
                }
                Err(err) => {
                    warn!(file, error = %err, "skipping malformed upstream row");
                    report.rows_skipped += 1;
                }
            }
        }
        Ok(())
    }

    /// Maps that exist in the warehouse but were not created by this call
    /// are left alone, including their chromosomes.
    fn resolve_new_maps(
        &self,
        warehouse: &Warehouse,
        report: &mut LoadReport,
    ) -> Result<HashMap<MapKey, MapId>> {
        let mut loaded: HashMap<MapKey, MapId> = HashMap::new();
        self.read_rows(MAPS_FILE, true, report, |row: MapRow, report| {
            let key = (row.species, row.map_type, row.version);
            if loaded.contains_key(&key) || warehouse.find_map(&key.0, &key.1, key.2)?.is_some() {
                debug!(species = %key.0, version = key.2, "map already loaded");
                report.maps_skipped += 1;
                return Ok(());
            }
            let id = warehouse.insert_map(&key.0, &key.1, key.2, row.scale, row.tax_id)?;
            info!(species = %key.0, map_type = %key.1, version = key.2, "loaded map");
            report.maps_loaded += 1;
            loaded.insert(key, id);
            Ok(())
        })?;
        Ok(loaded)
    }
}

impl UpstreamLoader for TsvLoader {
    fn name(&self) -> &str {
        &self.name
    }

    fn load_assemblies(&self, warehouse: &Warehouse) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        let loaded = self.resolve_new_maps(warehouse, &mut report)?;

        self.read_rows(CHROMOSOMES_FILE, true, &mut report, |row: ChromosomeRow, report| {
            let key = (row.species, row.map_type, row.version);
            let Some(map) = loaded.get(&key) else {
                return Ok(());
            };
            warehouse.insert_chromosome(*map, &row.name, row.length)?;
            report.chromosomes += 1;
            Ok(())
        })?;

        info!(
            loader = %self.name,
            maps = report.maps_loaded,
            skipped = report.maps_skipped,
            chromosomes = report.chromosomes,
            "assemblies loaded"
        );
        Ok(report)
    }

    fn load_annotation_sets(&self, warehouse: &Warehouse) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        let mut sets: HashMap<SetKey, (MapId, AnnotationSetId)> = HashMap::new();
        let mut existing: HashSet<SetKey> = HashSet::new();

        self.read_rows(ANNOTATION_SETS_FILE, true, &mut report, |row: AnnotationSetRow, report| {
            let key = (row.species, row.map_type, row.version, row.set_version);
            if sets.contains_key(&key) || existing.contains(&key) {
                report.annotation_sets_skipped += 1;
                return Ok(());
            }
            let Some(map) = warehouse.find_map(&key.0, &key.1, key.2)? else {
                warn!(
                    species = %key.0,
                    version = key.2,
                    "annotation set names an unknown map; skipping"
                );
                report.rows_skipped += 1;
                return Ok(());
            };
            if warehouse
                .find_annotation_set(map, key.3, &row.set_type)?
                .is_some()
            {
                debug!(species = %key.0, set_version = key.3, "annotation set already loaded");
                report.annotation_sets_skipped += 1;
                existing.insert(key);
                return Ok(());
            }

            let set = warehouse.insert_annotation_set(map, key.3, &row.set_type)?;
            if row.default {
                warehouse.set_default_annotation(map, set)?;
            }
            info!(
                species = %key.0,
                set_version = key.3,
                set_type = %row.set_type,
                "loaded annotation set"
            );
            report.annotation_sets_loaded += 1;
            sets.insert(key, (map, set));
            Ok(())
        })?;

        let mut chromosomes: HashMap<(MapId, String), Option<ChromosomeId>> = HashMap::new();
        let mut sources: HashMap<String, SourceId> = HashMap::new();

        self.read_rows(ANNOTATIONS_FILE, true, &mut report, |row: AnnotationRow, report| {
            let key = (row.species, row.map_type, row.version, row.set_version);
            let Some(&(map, set)) = sets.get(&key) else {
                return Ok(());
            };

            let chromosome = match chromosomes.get(&(map, row.chromosome.clone())) {
                Some(id) => *id,
                None => {
                    let id = warehouse.chromosome_id(map, &row.chromosome)?;
                    chromosomes.insert((map, row.chromosome.clone()), id);
                    id
                }
            };
            let Some(chromosome) = chromosome else {
                warn!(
                    species = %key.0,
                    chromosome = %row.chromosome,
                    "annotation on unknown chromosome; skipping"
                );
                report.rows_skipped += 1;
                return Ok(());
            };

            let source = match row.source.as_deref() {
                Some(name) => match sources.get(name) {
                    Some(id) => Some(*id),
                    None => {
                        let id = warehouse.ensure_source(name)?;
                        sources.insert(name.to_string(), id);
                        Some(id)
                    }
                },
                None => None,
            };

            warehouse.insert_annotation(&NewAnnotation {
                name: &row.name,
                chromosome_id: chromosome,
                annotation_set_id: set,
                start: row.start,
                stop: row.stop,
                source_id: source,
                source_ref_id: source.and(row.source_ref.as_deref()),
            })?;
            report.annotations += 1;
            Ok(())
        })?;

        let attributes = warehouse.attributes();
        self.read_rows(ATTRIBUTES_FILE, false, &mut report, |row: AttributeRow, report| {
            let key = (row.species, row.map_type, row.version, row.set_version);
            let Some(&(_, set)) = sets.get(&key) else {
                return Ok(());
            };
            let Some(annotation) = warehouse.annotation_by_name(set, &row.annotation)? else {
                warn!(
                    annotation = %row.annotation,
                    "attribute names an unknown annotation; skipping"
                );
                report.rows_skipped += 1;
                return Ok(());
            };
            if attributes.attach(annotation, &row.attribute, &row.value)? {
                report.attributes += 1;
            }
            Ok(())
        })?;

        info!(
            loader = %self.name,
            sets = report.annotation_sets_loaded,
            skipped = report.annotation_sets_skipped,
            annotations = report.annotations,
            attributes = report.attributes,
            "annotation sets loaded"
        );
        Ok(report)
    }
}
