use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use syntenic::alignment::SqliteAlignmentSource;
use syntenic::linker::LinkReport;
use syntenic::loader::{TsvLoader, UpstreamLoader};
use syntenic::pipeline::{LinkOutcome, LoaderReport};
use syntenic::synteny::{PairOutcome, PairReport};
use syntenic::{Config, Database, EngineError, ErrorClass, Pipeline, Warehouse, status};
use tracing_subscriber::EnvFilter;

/// syntenic - cross-species link resolution and synteny-block inference
#[derive(Parser)]
#[command(name = "syntenic")]
#[command(about = "Links equivalent annotations across species and infers synteny blocks")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true, env = "SYNTENIC_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of a summary
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Load upstream files, rebuild links, then build synteny blocks
    Run,
    /// Rebuild the link table only
    Links,
    /// Build synteny blocks only
    Synteny,
    /// Load normalized upstream TSV files
    Load {
        /// Directory of TSV files; defaults to upstream.tsv_dir
        #[arg(value_name = "DIR")]
        dir: Option<PathBuf>,
    },
    /// Show warehouse row counts
    Status,
}

fn main() {
    dotenvy::dotenv().ok();

    // SYNTENIC_LOG, then RUST_LOG, then info; logs go to stderr so --json stays clean
    let filter = EnvFilter::try_from_env("SYNTENIC_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        let exit_code = if is_user_error(&e) { 1 } else { 2 };
        eprintln!("Error: {e:#}");
        process::exit(exit_code);
    }
}

/// Configuration problems are user errors; everything else is internal.
fn is_user_error(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause
            .downcast_ref::<EngineError>()
            .is_some_and(|e| e.class() == ErrorClass::Config)
    })
}

fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let db_path = config.database_path()?;
    ensure_database_directory(&db_path)?;
    let db = Database::open(&db_path).context("Failed to open database")?;
    let warehouse = Warehouse::new(db);
    let pipeline = Pipeline::new(&warehouse, &config);

    match &cli.command {
        Commands::Run => {
            let tsv = config.upstream.tsv_dir.as_ref().map(TsvLoader::new);
            let loaders: Vec<&dyn UpstreamLoader> = tsv
                .iter()
                .map(|loader| loader as &dyn UpstreamLoader)
                .collect();
            let source = alignment_source(&config)?;
            let report = pipeline.run(&loaders, &source)?;
            emit(cli.json, &report, || {
                print_load_reports(&report.loads);
                match &report.links {
                    LinkOutcome::Completed(links) => print_link_report(links),
                    LinkOutcome::Failed { error } => println!("Links: FAILED ({error})"),
                }
                print_pair_reports(&report.synteny);
            })
        }
        Commands::Links => {
            let report = pipeline.link()?;
            emit(cli.json, &report, || print_link_report(&report))
        }
        Commands::Synteny => {
            let source = alignment_source(&config)?;
            let reports = pipeline.synteny(&source);
            emit(cli.json, &reports, || print_pair_reports(&reports))
        }
        Commands::Load { dir } => {
            let dir = dir
                .clone()
                .or_else(|| config.upstream.tsv_dir.clone())
                .ok_or_else(|| {
                    EngineError::Config(
                        "no upstream directory given and upstream.tsv_dir is not set".to_string(),
                    )
                })?;
            let loader = TsvLoader::new(dir);
            let reports = pipeline.load(&[&loader])?;
            emit(cli.json, &reports, || print_load_reports(&reports))
        }
        Commands::Status => {
            let summary = status::status(&warehouse)?;
            emit(cli.json, &summary, || {
                status::print_status(&db_path.display().to_string(), &summary)
            })
        }
    }
}

/// Reads the config file (or defaults) and applies environment overrides.
fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            Config::from_file(path).map_err(|e| EngineError::Config(format!("{e:#}")))?
        }
        None => Config::default(),
    };
    config.apply_env_overrides();
    Ok(config)
}

fn alignment_source(config: &Config) -> Result<SqliteAlignmentSource> {
    let synteny = &config.synteny;
    match &synteny.feed_dir {
        Some(dir) => Ok(SqliteAlignmentSource::new(dir, synteny.chromosome_prefix.as_str())),
        None if synteny.species.len() < 2 => Ok(SqliteAlignmentSource::new(
            PathBuf::new(),
            synteny.chromosome_prefix.as_str(),
        )),
        None => Err(EngineError::Config(
            "synteny.feed_dir is not set (or set SYNTENIC_ALIGNMENT_DIR)".to_string(),
        )
        .into()),
    }
}

/// Ensures the parent directory of the database file exists.
fn ensure_database_directory(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }
    Ok(())
}

fn emit<T: Serialize>(json: bool, value: &T, summary: impl FnOnce()) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        summary();
    }
    Ok(())
}

fn print_load_reports(reports: &[LoaderReport]) {
    for report in reports {
        println!(
            "Loaded {}: {} maps ({} already present), {} chromosomes, {} annotation sets, {} annotations, {} attributes",
            report.loader,
            report.assemblies.maps_loaded,
            report.assemblies.maps_skipped,
            report.assemblies.chromosomes,
            report.annotation_sets.annotation_sets_loaded,
            report.annotation_sets.annotations,
            report.annotation_sets.attributes,
        );
        let skipped = report.assemblies.rows_skipped + report.annotation_sets.rows_skipped;
        if skipped > 0 {
            println!("  {skipped} rows skipped");
        }
    }
}

fn print_link_report(report: &LinkReport) {
    println!(
        "Links: {} direct groups ({} members), {} homology groups ({} members, {} merged)",
        report.direct_groups,
        report.direct_members,
        report.homology_groups,
        report.homology_members,
        report.homology_merged,
    );
    match &report.homology_skipped {
        Some(reason) => println!("  homology skipped: {reason}"),
        None => println!(
            "  feed rows: {} read, {} skipped, {} foreign taxon",
            report.rows_read, report.rows_skipped, report.rows_foreign_taxon
        ),
    }
}

fn print_pair_reports(reports: &[PairReport]) {
    for report in reports {
        match &report.outcome {
            PairOutcome::Processed { .. } => {
                let (correct, partial, complete) = report.totals();
                println!(
                    "Synteny {} -> {}: {} blocks, {} partial, {} complete mismatches",
                    report.target, report.query, correct, partial, complete
                );
            }
            PairOutcome::Skipped { reason } => {
                println!("Synteny {} -> {}: skipped ({reason})", report.target, report.query);
            }
            PairOutcome::Failed { error } => {
                println!("Synteny {} -> {}: FAILED ({error})", report.target, report.query);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syntenic::config::SpeciesConfig;

    #[test]
    fn config_errors_are_user_errors() {
        let err = anyhow::Error::from(EngineError::Config("bad".into())).context("loading");
        assert!(is_user_error(&err));

        let err = anyhow::anyhow!("disk full");
        assert!(!is_user_error(&err));
    }

    #[test]
    fn missing_config_file_is_a_user_error() {
        let err = load_config(Some(Path::new("/nonexistent/syntenic.toml"))).unwrap_err();
        assert!(is_user_error(&err));
    }

    #[test]
    fn synteny_needs_feed_dir_for_pairs() {
        let mut config = Config::default();
        assert!(alignment_source(&config).is_ok());

        config.synteny.species = vec![
            SpeciesConfig {
                name: "human".into(),
                alignment_db: "hg38".into(),
            },
            SpeciesConfig {
                name: "mouse".into(),
                alignment_db: "mm10".into(),
            },
        ];
        let err = alignment_source(&config).unwrap_err();
        assert!(is_user_error(&err));
    }

    #[test]
    fn database_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("warehouse.db");

        ensure_database_directory(&path).unwrap();

        assert!(path.parent().unwrap().is_dir());
    }
}
