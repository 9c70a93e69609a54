use std::fs;
use std::path::Path;

use anyhow::Result;
use rusqlite::{Connection, params};
use syntenic::alignment::SqliteAlignmentSource;
use syntenic::loader::{TsvLoader, UpstreamLoader};
use syntenic::models::AnnotationId;
use syntenic::pipeline::LinkOutcome;
use syntenic::synteny::PairOutcome;
use syntenic::{Config, Database, Pipeline, Warehouse, status};
use tempfile::TempDir;

const CONFIG: &str = r#"
[links.homology]
columns = { HID = 0, taxID = 1, geneID = 2 }

[synteny]
threshold_length = 100
allowed_levels = [1, 2]

[[synteny.species]]
name = "speciesA"
alignment_db = "aaa1"

[[synteny.species]]
name = "speciesB"
alignment_db = "bbb1"
"#;

fn write_lines(dir: &Path, file: &str, lines: &[&str]) -> Result<()> {
    fs::write(dir.join(file), lines.join("\n") + "\n")?;
    Ok(())
}

/// Upstream TSV files for two species with two genes each.
fn write_upstream(dir: &Path) -> Result<()> {
    write_lines(
        dir,
        "maps.tsv",
        &[
            "species\ttype\tversion\tscale\ttax_id",
            "speciesA\tGenomic\t1\t1\t1001",
            "speciesB\tGenomic\t1\t1\t1002",
        ],
    )?;
    write_lines(
        dir,
        "chromosomes.tsv",
        &[
            "species\tversion\tname\tlength",
            "speciesA\t1\tA1\t100000",
            "speciesB\t1\tB3\t100000",
        ],
    )?;
    write_lines(
        dir,
        "annotation_sets.tsv",
        &[
            "species\tversion\tset_version\tset_type\tdefault",
            "speciesA\t1\t1\tGene\ttrue",
            "speciesB\t1\t1\tGene\ttrue",
        ],
    )?;
    write_lines(
        dir,
        "annotations.tsv",
        &[
            "species\tversion\tset_version\tchromosome\tname\tstart\tstop\tsource\tsource_ref",
            "speciesA\t1\t1\tA1\tgeneA5\t100\t110\tNCBI Gene\tGeneID:11",
            "speciesA\t1\t1\tA1\tgeneA6\t900\t905\tNCBI Gene\tGeneID:12",
            "speciesB\t1\t1\tB3\tgeneB55\t50\t60\tNCBI Gene\tGeneID:21",
            "speciesB\t1\t1\tB3\tgeneB56\t800\t805\tNCBI Gene\tGeneID:22",
        ],
    )?;
    Ok(())
}

fn write_net(
    dir: &Path,
    target_db: &str,
    table: &str,
    rows: &[(&str, i64, i64, &str, i64, i64, &str)],
) -> Result<()> {
    let conn = Connection::open(dir.join(format!("{target_db}.sqlite")))?;
    conn.execute_batch(&format!(
        "CREATE TABLE {table} (level INTEGER, tName TEXT, tStart INTEGER, tEnd INTEGER,
                               strand TEXT, qName TEXT, qStart INTEGER, qEnd INTEGER)"
    ))?;
    for (t_name, t_start, t_end, q_name, q_start, q_end, strand) in rows {
        conn.execute(
            &format!(
                "INSERT INTO {table} (level, tName, tStart, tEnd, strand, qName, qStart, qEnd)
                 VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ),
            params![t_name, t_start, t_end, strand, q_name, q_start, q_end],
        )?;
    }
    Ok(())
}

struct Workspace {
    dir: TempDir,
    config: Config,
}

impl Workspace {
    fn new(strand: &str) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let upstream = dir.path().join("upstream");
        let nets = dir.path().join("nets");
        fs::create_dir_all(&upstream)?;
        fs::create_dir_all(&nets)?;

        write_upstream(&upstream)?;
        write_lines(
            dir.path(),
            "homologene.data",
            &[
                "1\t1001\t11\tGENEA5",
                "1\t1002\t21\tgeneb55",
                "2\t1001\t12\tGENEA6",
                "2\t1002\t22\tgeneb56",
                "3\t9606\t675\tBRCA2",
            ],
        )?;
        write_net(&nets, "aaa1", "netBbb1", &[("A1", 90, 910, "B3", 40, 810, strand)])?;

        let mut config = Config::from_toml(CONFIG)?;
        config.database.path = Some(dir.path().join("warehouse.db"));
        config.links.homology.path = Some(dir.path().join("homologene.data"));
        config.synteny.feed_dir = Some(nets);
        config.upstream.tsv_dir = Some(upstream);

        Ok(Self { dir, config })
    }

    fn open(&self) -> Result<Warehouse> {
        Ok(Warehouse::new(Database::open(self.config.database_path()?)?))
    }

    fn run(&self, warehouse: &Warehouse) -> Result<syntenic::RunReport> {
        let loader = TsvLoader::new(self.dir.path().join("upstream"));
        let loaders: [&dyn UpstreamLoader; 1] = [&loader];
        let source = SqliteAlignmentSource::new(
            self.config.synteny.feed_dir.clone().unwrap_or_default(),
            "",
        );
        Pipeline::new(warehouse, &self.config).run(&loaders, &source)
    }
}

fn gene(warehouse: &Warehouse, species: &str, name: &str) -> Result<AnnotationId> {
    let assembly = warehouse
        .default_assembly(species, "Genomic")?
        .ok_or_else(|| anyhow::anyhow!("{species} not loaded"))?;
    warehouse
        .annotation_by_name(assembly.annotation_set, name)?
        .ok_or_else(|| anyhow::anyhow!("{name} not loaded"))
}

#[test]
fn test_full_run_links_homologs_and_builds_block() -> Result<()> {
    // Arrange
    let workspace = Workspace::new("+")?;
    let warehouse = workspace.open()?;

    // Act
    let report = workspace.run(&warehouse)?;

    // Assert: homology clusters became link groups
    let LinkOutcome::Completed(links) = &report.links else {
        panic!("link phase failed: {:?}", report.links);
    };
    assert_eq!(links.direct_groups, 0);
    assert_eq!(links.homology_groups, 2);
    assert_eq!(links.rows_foreign_taxon, 1);

    let a5 = gene(&warehouse, "speciesA", "geneA5")?;
    let b55 = gene(&warehouse, "speciesB", "geneB55")?;
    assert_eq!(warehouse.link_group_of(a5)?, warehouse.link_group_of(b55)?);
    assert_eq!(warehouse.attributes().values_of(a5, "homologene_id")?, vec!["1"]);

    // Assert: one block in A -> B, B -> A has no alignment database
    let a = warehouse.default_assembly("speciesA", "Genomic")?.unwrap();
    let b = warehouse.default_assembly("speciesB", "Genomic")?.unwrap();
    let blocks = warehouse.synteny_blocks(a.map.id, b.map.id)?;
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].left, a.chromosome_id("A1").unwrap());
    assert_eq!(blocks[0].right, b.chromosome_id("B3").unwrap());
    assert_eq!(
        (blocks[0].left_start, blocks[0].left_stop),
        (a5, gene(&warehouse, "speciesA", "geneA6")?)
    );
    assert_eq!(
        (blocks[0].right_start, blocks[0].right_stop),
        (b55, gene(&warehouse, "speciesB", "geneB56")?)
    );

    let reverse = report
        .synteny
        .iter()
        .find(|pair| pair.target == "speciesB")
        .unwrap();
    assert!(matches!(reverse.outcome, PairOutcome::Skipped { .. }));

    Ok(())
}

#[test]
fn test_reverse_strand_swaps_query_anchors() -> Result<()> {
    // Arrange
    let workspace = Workspace::new("-")?;
    let warehouse = workspace.open()?;

    // Act
    workspace.run(&warehouse)?;

    // Assert
    let a = warehouse.default_assembly("speciesA", "Genomic")?.unwrap();
    let b = warehouse.default_assembly("speciesB", "Genomic")?.unwrap();
    let blocks = warehouse.synteny_blocks(a.map.id, b.map.id)?;
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].right_start, gene(&warehouse, "speciesB", "geneB56")?);
    assert_eq!(blocks[0].right_stop, gene(&warehouse, "speciesB", "geneB55")?);

    Ok(())
}

#[test]
fn test_second_run_is_idempotent() -> Result<()> {
    // Arrange
    let workspace = Workspace::new("+")?;
    let warehouse = workspace.open()?;
    workspace.run(&warehouse)?;
    let before = status::status(&warehouse)?;

    // Act: rerun against a reopened warehouse file
    drop(warehouse);
    let warehouse = workspace.open()?;
    let report = workspace.run(&warehouse)?;

    // Assert
    let after = status::status(&warehouse)?;
    assert_eq!(after, before);
    assert_eq!(after.synteny_blocks, 1);
    assert_eq!(after.link_groups, 2);
    assert_eq!(report.loads[0].assemblies.maps_loaded, 0);
    let forward = report
        .synteny
        .iter()
        .find(|pair| pair.target == "speciesA")
        .unwrap();
    assert_eq!(
        forward.outcome,
        PairOutcome::Skipped {
            reason: "synteny already built".to_string(),
        }
    );

    Ok(())
}

#[test]
fn test_missing_homology_feed_keeps_direct_links() -> Result<()> {
    // Arrange: both species share one reference id, feed file removed
    let mut workspace = Workspace::new("+")?;
    let upstream = workspace.dir.path().join("upstream");
    write_lines(
        &upstream,
        "annotations.tsv",
        &[
            "species\tversion\tset_version\tchromosome\tname\tstart\tstop\tsource\tsource_ref",
            "speciesA\t1\t1\tA1\tgeneA5\t100\t110\tNCBI Gene\tGeneID:11",
            "speciesB\t1\t1\tB3\tgeneB55\t50\t60\tNCBI Gene\tGeneID:11",
        ],
    )?;
    workspace.config.links.homology.path = Some(workspace.dir.path().join("absent.data"));
    let warehouse = workspace.open()?;

    // Act
    let report = workspace.run(&warehouse)?;

    // Assert
    let LinkOutcome::Completed(links) = &report.links else {
        panic!("link phase failed: {:?}", report.links);
    };
    assert_eq!(links.direct_groups, 1);
    assert!(links.homology_skipped.is_some());
    let a5 = gene(&warehouse, "speciesA", "geneA5")?;
    let b55 = gene(&warehouse, "speciesB", "geneB55")?;
    assert!(warehouse.link_group_of(a5)?.is_some());
    assert_eq!(warehouse.link_group_of(a5)?, warehouse.link_group_of(b55)?);

    Ok(())
}

#[test]
fn test_run_report_serializes() -> Result<()> {
    // Arrange
    let workspace = Workspace::new("+")?;
    let warehouse = workspace.open()?;

    // Act
    let report = workspace.run(&warehouse)?;
    let json = serde_json::to_value(&report)?;

    // Assert
    assert_eq!(json["links"]["status"], "completed");
    assert_eq!(json["synteny"][0]["outcome"]["status"], "processed");
    assert_eq!(json["synteny"][0]["outcome"]["chromosomes"][0]["correct"], 1);
    assert_eq!(json["synteny"][1]["outcome"]["status"], "skipped");

    Ok(())
}
