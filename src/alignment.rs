//! External pairwise alignment feed.
//!
//! The feed holds one alignment table per (target, query) direction. The
//! production source reads UCSC-style `net<Query>` tables out of one SQLite
//! database per target assembly; tests substitute their own source.

use std::path::{Path, PathBuf};

use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};

use crate::config::SpeciesConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::Strand;

/// One aligned block, target coordinates first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentRecord {
    pub t_start: i64,
    pub t_end: i64,
    pub q_start: i64,
    pub q_end: i64,
    /// Query chromosome name with any feed prefix removed
    pub q_name: String,
    pub strand: Strand,
    pub level: i64,
}

impl AlignmentRecord {
    pub fn target_length(&self) -> i64 {
        self.t_end - self.t_start
    }
}

/// Length threshold and confidence-level allow-list applied to every record.
#[derive(Debug, Clone, Copy)]
pub struct AlignmentFilter<'a> {
    pub threshold_length: i64,
    pub allowed_levels: &'a [i64],
}

impl AlignmentFilter<'_> {
    pub fn accepts(&self, record: &AlignmentRecord) -> bool {
        record.target_length() >= self.threshold_length
            && self.allowed_levels.contains(&record.level)
    }
}

/// Receives each record (or the data error for one unreadable row).
pub type RecordVisitor<'v> = dyn FnMut(EngineResult<AlignmentRecord>) -> Result<()> + 'v;

/// Alignment data for one (target, query) direction.
pub trait AlignmentTable {
    /// Name used in log messages.
    fn name(&self) -> &str;

    /// Streams the records on one target chromosome that pass `filter`,
    /// ordered by target start.
    fn for_each_record(
        &self,
        target_chromosome: &str,
        filter: &AlignmentFilter<'_>,
        visit: &mut RecordVisitor<'_>,
    ) -> Result<()>;
}

/// Opens alignment tables per direction.
pub trait AlignmentSource {
    /// Returns `Ok(None)` when the feed has no table for this direction and
    /// `Err(EngineError::Connectivity)` when the source cannot be reached.
    fn open(
        &self,
        target: &SpeciesConfig,
        query: &SpeciesConfig,
    ) -> EngineResult<Option<Box<dyn AlignmentTable>>>;
}

/// Reads `<dir>/<target db>.sqlite`, table `net<QueryDb>`.
#[derive(Debug, Clone)]
pub struct SqliteAlignmentSource {
    dir: PathBuf,
    chromosome_prefix: String,
}

impl SqliteAlignmentSource {
    pub fn new(dir: impl Into<PathBuf>, chromosome_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            chromosome_prefix: chromosome_prefix.into(),
        }
    }

    pub fn database_path(&self, target: &SpeciesConfig) -> PathBuf {
        self.dir.join(format!("{}.sqlite", target.alignment_db))
    }
}

/// UCSC net table name for a query assembly: `mm10` -> `netMm10`.
pub fn net_table_name(query_db: &str) -> EngineResult<String> {
    if query_db.is_empty() || !query_db.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(EngineError::Config(format!(
            "alignment_db '{query_db}' is not a valid table suffix"
        )));
    }
    let mut chars = query_db.chars();
    let capitalized: String = match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    };
    Ok(format!("net{capitalized}"))
}

impl AlignmentSource for SqliteAlignmentSource {
    fn open(
        &self,
        target: &SpeciesConfig,
        query: &SpeciesConfig,
    ) -> EngineResult<Option<Box<dyn AlignmentTable>>> {
        let table = net_table_name(&query.alignment_db)?;
        let path = self.database_path(target);
        let source_name = format!("{}.{table}", target.alignment_db);

        if !path.exists() {
            return Err(EngineError::Connectivity {
                source_name,
                message: format!("{} does not exist", path.display()),
            });
        }
        let conn = open_read_only(&path).map_err(|err| EngineError::Connectivity {
            source_name: source_name.clone(),
            message: err.to_string(),
        })?;

        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [&table],
            |row| row.get(0),
        )?;
        if !exists {
            return Ok(None);
        }

        Ok(Some(Box::new(SqliteAlignmentTable {
            conn,
            table,
            source_name,
            chromosome_prefix: self.chromosome_prefix.clone(),
        })))
    }
}

fn open_read_only(path: &Path) -> rusqlite::Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
}

struct SqliteAlignmentTable {
    conn: Connection,
    table: String,
    source_name: String,
    chromosome_prefix: String,
}

impl SqliteAlignmentTable {
    fn strip_prefix<'n>(&self, name: &'n str) -> &'n str {
        name.strip_prefix(self.chromosome_prefix.as_str())
            .unwrap_or(name)
    }
}

impl AlignmentTable for SqliteAlignmentTable {
    fn name(&self) -> &str {
        &self.source_name
    }

    fn for_each_record(
        &self,
        target_chromosome: &str,
        filter: &AlignmentFilter<'_>,
        visit: &mut RecordVisitor<'_>,
    ) -> Result<()> {
        if filter.allowed_levels.is_empty() {
            return Ok(());
        }

        // Build query with placeholders for the level allow-list
        let placeholders: Vec<String> = (0..filter.allowed_levels.len())
            .map(|i| format!("?{}", i + 3))
            .collect();
        let query = format!(
            "SELECT tStart, tEnd, qStart, qEnd, qName, strand, level FROM \"{}\"
             WHERE tName = ?1 AND (tEnd - tStart) >= ?2 AND level IN ({})
             ORDER BY tStart, tEnd",
            self.table,
            placeholders.join(", ")
        );

        let mut values = vec![
            Value::Text(format!("{}{target_chromosome}", self.chromosome_prefix)),
            Value::Integer(filter.threshold_length),
        ];
        values.extend(filter.allowed_levels.iter().map(|l| Value::Integer(*l)));

        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(values.iter()), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, i64>(6)?,
            ))
        })?;

        for row in rows {
            let record = match row {
                Ok((t_start, t_end, q_start, q_end, q_name, strand, level)) => strand
                    .parse::<Strand>()
                    .map(|strand| AlignmentRecord {
                        t_start,
                        t_end,
                        q_start,
                        q_end,
                        q_name: self.strip_prefix(&q_name).to_string(),
                        strand,
                        level,
                    })
                    .map_err(EngineError::Data),
                Err(
                    err @ (rusqlite::Error::InvalidColumnType(..)
                    | rusqlite::Error::FromSqlConversionFailure(..)),
                ) => Err(EngineError::Data(err.to_string())),
                Err(err) => return Err(err.into()),
            };
            visit(record)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn species(name: &str, db: &str) -> SpeciesConfig {
        SpeciesConfig {
            name: name.to_string(),
            alignment_db: db.to_string(),
        }
    }

    fn write_net(
        dir: &Path,
        target_db: &str,
        table: &str,
        rows: &[(&str, i64, i64, &str, i64, i64, &str, i64)],
    ) {
        let conn = Connection::open(dir.join(format!("{target_db}.sqlite"))).unwrap();
        conn.execute_batch(&format!(
            "CREATE TABLE {table} (level INTEGER, tName TEXT, tStart INTEGER, tEnd INTEGER,
                                   strand TEXT, qName TEXT, qStart INTEGER, qEnd INTEGER)"
        ))
        .unwrap();
        for (t_name, t_start, t_end, q_name, q_start, q_end, strand, level) in rows {
            conn.execute(
                &format!(
                    "INSERT INTO {table} (level, tName, tStart, tEnd, strand, qName, qStart, qEnd)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                ),
                rusqlite::params![level, t_name, t_start, t_end, strand, q_name, q_start, q_end],
            )
            .unwrap();
        }
    }

    fn collect(
        table: &dyn AlignmentTable,
        chromosome: &str,
        filter: &AlignmentFilter<'_>,
    ) -> Vec<EngineResult<AlignmentRecord>> {
        let mut records = Vec::new();
        table
            .for_each_record(chromosome, filter, &mut |record| {
                records.push(record);
                Ok(())
            })
            .unwrap();
        records
    }

    #[test]
    fn net_table_names_are_capitalized() {
        assert_eq!(net_table_name("mm10").unwrap(), "netMm10");
        assert_eq!(net_table_name("hg38").unwrap(), "netHg38");
        assert!(net_table_name("mm10; DROP").is_err());
    }

    #[test]
    fn missing_database_is_a_connectivity_error() {
        let dir = tempdir().unwrap();
        let source = SqliteAlignmentSource::new(dir.path(), "");

        let err = source
            .open(&species("human", "hg38"), &species("mouse", "mm10"))
            .err()
            .expect("open should fail");
        assert!(matches!(err, EngineError::Connectivity { .. }));
    }

    #[test]
    fn missing_table_is_none() {
        let dir = tempdir().unwrap();
        write_net(dir.path(), "hg38", "netRn6", &[]);
        let source = SqliteAlignmentSource::new(dir.path(), "");

        let table = source
            .open(&species("human", "hg38"), &species("mouse", "mm10"))
            .unwrap();
        assert!(table.is_none());
    }

    #[test]
    fn filters_by_chromosome_length_and_level() {
        let dir = tempdir().unwrap();
        write_net(
            dir.path(),
            "hg38",
            "netMm10",
            &[
                ("chr1", 5000, 9000, "chr4", 100, 500, "+", 1),
                ("chr1", 100, 4000, "chr4", 600, 900, "-", 2),
                ("chr1", 100, 150, "chr4", 600, 650, "+", 1),
                ("chr1", 100, 9000, "chr4", 600, 900, "+", 3),
                ("chr2", 100, 9000, "chr5", 600, 900, "+", 1),
            ],
        );
        let source = SqliteAlignmentSource::new(dir.path(), "chr");
        let table = source
            .open(&species("human", "hg38"), &species("mouse", "mm10"))
            .unwrap()
            .expect("table exists");
        assert_eq!(table.name(), "hg38.netMm10");

        let filter = AlignmentFilter {
            threshold_length: 1000,
            allowed_levels: &[1, 2],
        };
        let records: Vec<AlignmentRecord> = collect(table.as_ref(), "1", &filter)
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].t_start, 100);
        assert_eq!(records[0].strand, Strand::Reverse);
        assert_eq!(records[0].q_name, "4");
        assert_eq!(records[1].t_start, 5000);
    }

    #[test]
    fn bad_strand_is_a_data_error() {
        let dir = tempdir().unwrap();
        write_net(
            dir.path(),
            "hg38",
            "netMm10",
            &[("1", 0, 5000, "4", 0, 5000, "?", 1)],
        );
        let source = SqliteAlignmentSource::new(dir.path(), "");
        let table = source
            .open(&species("human", "hg38"), &species("mouse", "mm10"))
            .unwrap()
            .unwrap();

        let filter = AlignmentFilter {
            threshold_length: 0,
            allowed_levels: &[1],
        };
        let records = collect(table.as_ref(), "1", &filter);
        assert_eq!(records.len(), 1);
        assert!(matches!(records[0], Err(EngineError::Data(_))));
    }

    #[test]
    fn filter_accepts_threshold_boundary() {
        let record = AlignmentRecord {
            t_start: 0,
            t_end: 100,
            q_start: 0,
            q_end: 100,
            q_name: "1".into(),
            strand: Strand::Forward,
            level: 1,
        };
        let filter = AlignmentFilter {
            threshold_length: 100,
            allowed_levels: &[1],
        };
        assert!(filter.accepts(&record));
        let stricter = AlignmentFilter {
            threshold_length: 101,
            ..filter
        };
        assert!(!stricter.accepts(&record));
    }
}
