//! Sequential orchestration of one warehouse refresh.
//!
//! Order is fixed: upstream assemblies, upstream annotation sets, link
//! resolution, synteny blocks. A link failure does not stop the run; the
//! synteny builder then works from unlinked fallback anchors.

use anyhow::Result;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::alignment::AlignmentSource;
use crate::config::Config;
use crate::homology::HomologyFeed;
use crate::linker::{LinkReport, resolve_links};
use crate::loader::{LoadReport, UpstreamLoader};
use crate::synteny::{PairReport, build_synteny_blocks};
use crate::warehouse::Warehouse;

/// What one upstream loader contributed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoaderReport {
    pub loader: String,
    pub assemblies: LoadReport,
    pub annotation_sets: LoadReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LinkOutcome {
    Completed(LinkReport),
    Failed { error: String },
}

/// Summary of a full run, serialized for `--json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
    pub loads: Vec<LoaderReport>,
    pub links: LinkOutcome,
    pub synteny: Vec<PairReport>,
}

/// Runs the engine phases against one warehouse.
pub struct Pipeline<'a> {
    warehouse: &'a Warehouse,
    config: &'a Config,
}

impl<'a> Pipeline<'a> {
    pub fn new(warehouse: &'a Warehouse, config: &'a Config) -> Self {
        Self { warehouse, config }
    }

    /// Runs every loader's assembly step, then every loader's annotation step.
    pub fn load(&self, loaders: &[&dyn UpstreamLoader]) -> Result<Vec<LoaderReport>> {
        let mut assemblies = Vec::with_capacity(loaders.len());
        for loader in loaders {
            assemblies.push(loader.load_assemblies(self.warehouse)?);
        }

        let mut reports = Vec::with_capacity(loaders.len());
        for (loader, assemblies) in loaders.iter().zip(assemblies) {
            reports.push(LoaderReport {
                loader: loader.name().to_string(),
                assemblies,
                annotation_sets: loader.load_annotation_sets(self.warehouse)?,
            });
        }
        Ok(reports)
    }

    /// Rebuilds the link table from the configured homology feed.
    ///
    /// A feed that cannot be configured (bad columns or delimiter) only skips
    /// the homology phase.
    pub fn link(&self) -> Result<LinkReport> {
        let links = &self.config.links;
        let (feed, feed_error) = match HomologyFeed::from_config(&links.homology) {
            Ok(feed) => (feed, None),
            Err(err) => {
                warn!(error = %err, "homology feed misconfigured; skipping homology links");
                (None, Some(err.to_string()))
            }
        };

        let mut report = resolve_links(self.warehouse, links, feed.as_ref())?;
        if feed_error.is_some() {
            report.homology_skipped = feed_error;
        }
        Ok(report)
    }

    pub fn synteny(&self, source: &dyn AlignmentSource) -> Vec<PairReport> {
        build_synteny_blocks(self.warehouse, source, &self.config.synteny)
    }

    /// Runs all phases in order.
    pub fn run(
        &self,
        loaders: &[&dyn UpstreamLoader],
        source: &dyn AlignmentSource,
    ) -> Result<RunReport> {
        let started_at = OffsetDateTime::now_utc();
        info!(loaders = loaders.len(), "pipeline started");

        let loads = self.load(loaders)?;

        let links = match self.link() {
            Ok(report) => LinkOutcome::Completed(report),
            Err(err) => {
                error!(error = %err, "link phase failed; continuing with synteny");
                LinkOutcome::Failed {
                    error: format!("{err:#}"),
                }
            }
        };

        let synteny = self.synteny(source);

        let finished_at = OffsetDateTime::now_utc();
        info!(
            pairs = synteny.len(),
            elapsed_ms = (finished_at - started_at).whole_milliseconds() as i64,
            "pipeline finished"
        );

        Ok(RunReport {
            started_at,
            finished_at,
            loads,
            links,
            synteny,
        })
    }
}
