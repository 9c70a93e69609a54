//! Warehouse summary for the `status` command.

use anyhow::Result;
use serde::Serialize;

use crate::db::applied_versions;
use crate::warehouse::Warehouse;

// ANSI color codes for terminal output
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

/// Row counts across the warehouse tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarehouseStatus {
    pub migrations: Vec<u32>,
    pub maps: i64,
    pub chromosomes: i64,
    pub annotation_sets: i64,
    pub annotations: i64,
    pub link_rows: i64,
    pub link_groups: i64,
    pub synteny_blocks: i64,
    pub attributes: i64,
    pub values: i64,
    pub avps: i64,
}

fn count(warehouse: &Warehouse, sql: &str) -> Result<i64> {
    let n = warehouse
        .database()
        .connection()
        .query_row(sql, [], |row| row.get(0))?;
    Ok(n)
}

/// Collects row counts from every warehouse table.
pub fn status(warehouse: &Warehouse) -> Result<WarehouseStatus> {
    Ok(WarehouseStatus {
        migrations: applied_versions(warehouse.database().connection())?,
        maps: count(warehouse, "SELECT COUNT(*) FROM maps")?,
        chromosomes: count(warehouse, "SELECT COUNT(*) FROM chromosomes")?,
        annotation_sets: count(warehouse, "SELECT COUNT(*) FROM annotation_sets")?,
        annotations: count(warehouse, "SELECT COUNT(*) FROM annotation")?,
        link_rows: warehouse.link_count()?,
        link_groups: count(warehouse, "SELECT COUNT(DISTINCT id) FROM links")?,
        synteny_blocks: count(warehouse, "SELECT COUNT(*) FROM synteny")?,
        attributes: count(warehouse, "SELECT COUNT(*) FROM attributes")?,
        values: count(warehouse, "SELECT COUNT(*) FROM vals")?,
        avps: count(warehouse, "SELECT COUNT(*) FROM annotation_avps")?,
    })
}

/// Prints the summary in the terminal layout.
pub fn print_status(database_path: &str, status: &WarehouseStatus) {
    println!("{}syntenic status{}", BOLD, RESET);
    println!();

    println!("{}Database{}", BOLD, RESET);
    println!("    {}Path: {}{}", DIM, database_path, RESET);
    match status.migrations.last() {
        Some(version) => println!("  {}✓{} schema version {}", GREEN, RESET, version),
        None => println!("  {}No migrations applied{}", YELLOW, RESET),
    }
    println!();

    println!("{}Assemblies{}", BOLD, RESET);
    println!("  Maps:            {:>8}", status.maps);
    println!("  Chromosomes:     {:>8}", status.chromosomes);
    println!("  Annotation sets: {:>8}", status.annotation_sets);
    println!("  Annotations:     {:>8}", status.annotations);
    println!();

    println!("{}Links{}", BOLD, RESET);
    println!("  Groups:          {:>8}", status.link_groups);
    println!("  Members:         {:>8}", status.link_rows);
    println!("  Attributes:      {:>8}", status.attributes);
    println!("  Values:          {:>8}", status.values);
    println!("  AVPs:            {:>8}", status.avps);
    println!();

    println!("{}Synteny{}", BOLD, RESET);
    if status.synteny_blocks == 0 {
        println!("  {}No synteny blocks built{}", YELLOW, RESET);
    } else {
        println!("  Blocks:          {:>8}", status.synteny_blocks);
    }
}
