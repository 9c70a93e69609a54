//! Link resolution: rebuilds the `links` table of equivalence groups.
//!
//! Phase 1 groups annotations that carry the same (source, reference id).
//! Phase 2 streams the homology feed and groups annotations matched through a
//! cluster's gene references, either by reference id or by an `EntrezGeneId`
//! attribute. The table is truncated at the start of every run.

use std::collections::{BTreeSet, HashMap, HashSet};

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::avp::{ENTREZ_GENE_ID, HOMOLOGENE_ID};
use crate::config::LinkConfig;
use crate::error::ErrorClass;
use crate::homology::{HomologyFeed, HomologyRow};
use crate::models::{AnnotationId, LinkGroupId, SourceId};
use crate::warehouse::Warehouse;

/// Prefix the reference-gene source puts on its reference ids.
pub const GENE_ID_PREFIX: &str = "GeneID:";

/// Counters for one link rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkReport {
    pub direct_groups: usize,
    pub direct_members: usize,
    pub homology_groups: usize,
    pub homology_members: usize,
    /// Annotations that joined or were moved into a group created by phase 1
    /// or an earlier cluster
    pub homology_merged: usize,
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub rows_foreign_taxon: usize,
    pub homology_attributes: usize,
    /// Why phase 2 did not run (or stopped early), if it did not complete
    pub homology_skipped: Option<String>,
}

/// Rebuilds the link table from scratch.
///
/// A missing or malformed homology feed only skips phase 2. Any store
/// failure aborts the rebuild and leaves the link table empty.
pub fn resolve_links(
    warehouse: &Warehouse,
    config: &LinkConfig,
    feed: Option<&HomologyFeed>,
) -> Result<LinkReport> {
    let removed = warehouse.clear_links()?;
    info!(removed, "cleared link table");

    let resolver = LinkResolver { warehouse, config };
    match resolver.run(feed) {
        Ok(report) => {
            info!(
                direct_groups = report.direct_groups,
                homology_groups = report.homology_groups,
                rows_skipped = report.rows_skipped,
                "link resolution finished"
            );
            Ok(report)
        }
        Err(err) => {
            error!(error = %err, "link resolution aborted; link table left empty for this run");
            if let Err(clear_err) = warehouse.clear_links() {
                error!(error = %clear_err, "failed to clear partially written links");
            }
            Err(err)
        }
    }
}

struct LinkResolver<'a> {
    warehouse: &'a Warehouse,
    config: &'a LinkConfig,
}

/// Matched members of the cluster currently being read.
struct PendingCluster {
    cluster_id: i64,
    members: BTreeSet<AnnotationId>,
}

/// Cluster bookkeeping kept across the whole feed.
#[derive(Default)]
struct ClusterLedger {
    seen: HashSet<i64>,
    /// Clusters flushed with a single unlinked member
    lone: HashMap<i64, AnnotationId>,
}

impl LinkResolver<'_> {
    fn run(&self, feed: Option<&HomologyFeed>) -> Result<LinkReport> {
        let mut report = LinkReport::default();
        let next_group = self.link_direct(&mut report)?;

        match feed {
            Some(feed) => self.link_homology(feed, next_group, &mut report)?,
            None => {
                info!("no homology feed configured; skipping homology links");
                report.homology_skipped = Some("no homology feed configured".to_string());
            }
        }
        Ok(report)
    }

    /// Phase 1. Returns the next unused group id.
    fn link_direct(&self, report: &mut LinkReport) -> Result<LinkGroupId> {
        let mut group = LinkGroupId::new(1);

        for duplicate in self.warehouse.duplicate_references()? {
            for member in &duplicate.members {
                self.warehouse
                    .insert_link(group, *member, duplicate.source_id)?;
            }
            debug!(
                group = %group,
                source = %duplicate.source_id,
                reference = %duplicate.source_ref_id,
                members = duplicate.members.len(),
                "direct link group"
            );
            report.direct_groups += 1;
            report.direct_members += duplicate.members.len();
            group = group.next();
        }

        info!(
            groups = report.direct_groups,
            members = report.direct_members,
            "direct identity links written"
        );
        Ok(group)
    }

    /// Phase 2.
    fn link_homology(
        &self,
        feed: &HomologyFeed,
        mut next_group: LinkGroupId,
        report: &mut LinkReport,
    ) -> Result<()> {
        let reader = match feed.open() {
            Ok(reader) => reader,
            Err(err) => {
                warn!(
                    feed = %feed.path().display(),
                    error = %err,
                    "homology feed unavailable; skipping homology links"
                );
                report.homology_skipped = Some(err.to_string());
                return Ok(());
            }
        };

        let taxa = self.warehouse.loaded_tax_ids()?;
        let reference_source = self.warehouse.source_id(&self.config.reference_source)?;
        let homology_source = self.warehouse.ensure_source(&self.config.homology_source)?;

        let mut ledger = ClusterLedger::default();
        let mut current: Option<PendingCluster> = None;

        for row in reader {
            let row = match row {
                Ok(row) => row,
                Err(err) => match err.class() {
                    ErrorClass::Data => {
                        warn!(error = %err, "skipping malformed homology row");
                        report.rows_skipped += 1;
                        continue;
                    }
                    ErrorClass::Config => {
                        warn!(
                            feed = %feed.path().display(),
                            error = %err,
                            "homology column mapping does not fit the feed; skipping homology links"
                        );
                        report.homology_skipped = Some(err.to_string());
                        return Ok(());
                    }
                    ErrorClass::Connectivity => {
                        warn!(
                            error = %err,
                            "homology feed became unreadable; keeping clusters read so far"
                        );
                        report.homology_skipped = Some(err.to_string());
                        break;
                    }
                    ErrorClass::Store => return Err(err.into()),
                },
            };
            report.rows_read += 1;

            if !taxa.contains(&row.tax_id) {
                report.rows_foreign_taxon += 1;
                continue;
            }

            if current.as_ref().map(|c| c.cluster_id) != Some(row.cluster_id) {
                if let Some(done) = current.take() {
                    self.flush(done, homology_source, &mut next_group, &mut ledger, report)?;
                }
                current = Some(PendingCluster {
                    cluster_id: row.cluster_id,
                    members: BTreeSet::new(),
                });
            }

            let matches = self.match_row(&row, reference_source)?;
            if let Some(pending) = current.as_mut() {
                pending.members.extend(matches);
            }
        }

        if let Some(done) = current.take() {
            self.flush(done, homology_source, &mut next_group, &mut ledger, report)?;
        }

        info!(
            groups = report.homology_groups,
            members = report.homology_members,
            merged = report.homology_merged,
            rows = report.rows_read,
            foreign = report.rows_foreign_taxon,
            skipped = report.rows_skipped,
            "homology links written"
        );
        Ok(())
    }

    /// Local annotations matched by one feed row: by reference id, then by
    /// `EntrezGeneId` attribute.
    fn match_row(
        &self,
        row: &HomologyRow,
        reference_source: Option<SourceId>,
    ) -> Result<BTreeSet<AnnotationId>> {
        let mut matched = BTreeSet::new();

        if let Some(source) = reference_source {
            let reference = format!("{GENE_ID_PREFIX}{}", row.gene_ref);
            matched.extend(self.warehouse.annotations_by_reference(source, &reference)?);
        }
        matched.extend(
            self.warehouse
                .attributes()
                .annotations_with(ENTREZ_GENE_ID, &row.gene_ref)?,
        );
        Ok(matched)
    }

    /// Writes the group for a finished cluster.
    ///
    /// A cluster whose members are already linked joins their group, folding
    /// every group it touches into the lowest id; otherwise a new group is
    /// allocated once the cluster has two members.
    fn flush(
        &self,
        cluster: PendingCluster,
        source: SourceId,
        next_group: &mut LinkGroupId,
        ledger: &mut ClusterLedger,
        report: &mut LinkReport,
    ) -> Result<()> {
        let PendingCluster {
            cluster_id,
            mut members,
        } = cluster;

        if !ledger.seen.insert(cluster_id) {
            warn!(
                cluster = cluster_id,
                "homology cluster reappeared out of order; merging with its earlier rows"
            );
        }
        if let Some(lone) = ledger.lone.remove(&cluster_id) {
            members.insert(lone);
        }
        if members.is_empty() {
            return Ok(());
        }

        let attributes = self.warehouse.attributes();
        let cluster_literal = cluster_id.to_string();
        for member in &members {
            if attributes.attach(*member, HOMOLOGENE_ID, &cluster_literal)? {
                report.homology_attributes += 1;
            }
        }

        let mut existing = BTreeSet::new();
        for member in &members {
            if let Some(group) = self.warehouse.link_group_of(*member)? {
                existing.insert(group);
            }
        }

        let group = match existing.first().copied() {
            Some(group) => {
                // Cluster bridges several groups; fold them into the lowest id
                for other in existing.iter().skip(1) {
                    let moved = self.warehouse.merge_link_groups(group, *other)?;
                    debug!(
                        cluster = cluster_id,
                        from = %other,
                        into = %group,
                        moved,
                        "merged link groups"
                    );
                    report.homology_merged += moved;
                }
                group
            }
            None if members.len() >= 2 => {
                let group = *next_group;
                *next_group = group.next();
                report.homology_groups += 1;
                group
            }
            None => {
                if let Some(first) = members.first() {
                    ledger.lone.insert(cluster_id, *first);
                }
                return Ok(());
            }
        };

        for member in &members {
            if self.warehouse.insert_link(group, *member, source)? {
                report.homology_members += 1;
                if !existing.is_empty() {
                    report.homology_merged += 1;
                }
            }
        }
        debug!(
            cluster = cluster_id,
            group = %group,
            members = members.len(),
            "homology link group"
        );
        Ok(())
    }
}
