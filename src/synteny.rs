//! Synteny block inference.
//!
//! For every ordered (target, query) species pair, alignment records are
//! anchored at annotation boundaries on both sides and persisted as synteny
//! rows. Anchors are taken from linked annotations first; any anchor still
//! missing falls back to the nearest annotation in the same window, linked or
//! not. Blocks are all-or-nothing: a record with fewer than four distinct
//! anchors is only counted.

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::alignment::{AlignmentFilter, AlignmentRecord, AlignmentSource, AlignmentTable};
use crate::config::{SpeciesConfig, SyntenyConfig};
use crate::error::ErrorClass;
use crate::models::{
    AnchorSet, AnnotationSetId, BlockOutcome, ChromosomeId, ResolvedAssembly, Strand,
};
use crate::warehouse::{Warehouse, Window, WindowBounds};

/// Outcome counts for one target chromosome against one query species.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChromosomeTally {
    pub chromosome: String,
    pub correct: usize,
    pub partial: usize,
    pub complete: usize,
    /// Records dropped as data errors (unknown query chromosome, bad row)
    pub skipped_records: usize,
}

impl ChromosomeTally {
    fn new(chromosome: &str) -> Self {
        Self {
            chromosome: chromosome.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PairOutcome {
    Processed {
        chromosomes: Vec<ChromosomeTally>,
    },
    Skipped { reason: String },
    Failed { error: String },
}

/// Result of building one (target, query) direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairReport {
    pub target: String,
    pub query: String,
    pub outcome: PairOutcome,
}

impl PairReport {
    /// Tally for one target chromosome, if the pair was processed.
    pub fn tally(&self, chromosome: &str) -> Option<&ChromosomeTally> {
        match &self.outcome {
            PairOutcome::Processed { chromosomes } => {
                chromosomes.iter().find(|t| t.chromosome == chromosome)
            }
            _ => None,
        }
    }

    /// Summed (correct, partial, complete) over all chromosomes.
    pub fn totals(&self) -> (usize, usize, usize) {
        match &self.outcome {
            PairOutcome::Processed { chromosomes } => chromosomes.iter().fold(
                (0, 0, 0),
                |(correct, partial, complete), t| {
                    (correct + t.correct, partial + t.partial, complete + t.complete)
                },
            ),
            _ => (0, 0, 0),
        }
    }
}

/// Builds synteny blocks for every configured species pair.
///
/// Pairs are processed sequentially; a failure in one pair is logged and
/// recorded in its report and the remaining pairs still run.
pub fn build_synteny_blocks(
    warehouse: &Warehouse,
    source: &dyn AlignmentSource,
    config: &SyntenyConfig,
) -> Vec<PairReport> {
    let builder = SyntenyBuilder { warehouse, config };
    let mut reports = Vec::new();

    for (target, query) in config.pairs() {
        let outcome = match builder.build_pair(source, target, query) {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(
                    target = %target.name,
                    query = %query.name,
                    error = %err,
                    "synteny pair failed; continuing with remaining pairs"
                );
                PairOutcome::Failed {
                    error: format!("{err:#}"),
                }
            }
        };
        reports.push(PairReport {
            target: target.name.clone(),
            query: query.name.clone(),
            outcome,
        });
    }
    reports
}

struct SyntenyBuilder<'a> {
    warehouse: &'a Warehouse,
    config: &'a SyntenyConfig,
}

fn skipped(reason: impl Into<String>) -> PairOutcome {
    PairOutcome::Skipped {
        reason: reason.into(),
    }
}

impl SyntenyBuilder<'_> {
    fn build_pair(
        &self,
        source: &dyn AlignmentSource,
        target: &SpeciesConfig,
        query: &SpeciesConfig,
    ) -> Result<PairOutcome> {
        let assembly_type = &self.config.assembly_type;

        let Some(target_assembly) = self.warehouse.default_assembly(&target.name, assembly_type)?
        else {
            warn!(
                target = %target.name,
                query = %query.name,
                "target assembly not loaded; skipping pair"
            );
            return Ok(skipped(format!("assembly for {} not loaded", target.name)));
        };
        let Some(query_assembly) = self.warehouse.default_assembly(&query.name, assembly_type)?
        else {
            warn!(
                target = %target.name,
                query = %query.name,
                "query assembly not loaded; skipping pair"
            );
            return Ok(skipped(format!("assembly for {} not loaded", query.name)));
        };

        if self
            .warehouse
            .pair_has_synteny(target_assembly.map.id, query_assembly.map.id)?
        {
            info!(
                target = %target.name,
                query = %query.name,
                "synteny already built; skipping pair"
            );
            return Ok(skipped("synteny already built"));
        }

        let table = match source.open(target, query) {
            Ok(Some(table)) => table,
            Ok(None) => {
                warn!(
                    target = %target.name,
                    query = %query.name,
                    "no alignment table for this direction; skipping pair"
                );
                return Ok(skipped("no alignment table for this direction"));
            }
            Err(err) if matches!(err.class(), ErrorClass::Connectivity | ErrorClass::Config) => {
                error!(
                    target = %target.name,
                    query = %query.name,
                    error = %err,
                    "cannot open alignment source; skipping pair"
                );
                return Ok(skipped(err.to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        let filter = AlignmentFilter {
            threshold_length: self.config.threshold_length,
            allowed_levels: &self.config.allowed_levels,
        };

        let mut tallies = Vec::with_capacity(target_assembly.chromosomes.len());
        for chromosome in &target_assembly.chromosomes {
            let tally = self.build_chromosome(
                table.as_ref(),
                &filter,
                &target_assembly,
                &query_assembly,
                chromosome.id,
                &chromosome.name,
            )?;
            info!(
                target = %target.name,
                query = %query.name,
                chromosome = %tally.chromosome,
                correct = tally.correct,
                partial = tally.partial,
                complete = tally.complete,
                skipped = tally.skipped_records,
                "synteny chromosome finished"
            );
            tallies.push(tally);
        }

        Ok(PairOutcome::Processed {
            chromosomes: tallies,
        })
    }

    fn build_chromosome(
        &self,
        table: &dyn AlignmentTable,
        filter: &AlignmentFilter<'_>,
        target: &ResolvedAssembly,
        query: &ResolvedAssembly,
        chromosome: ChromosomeId,
        chromosome_name: &str,
    ) -> Result<ChromosomeTally> {
        let mut tally = ChromosomeTally::new(chromosome_name);

        table.for_each_record(chromosome_name, filter, &mut |record| {
            let record = match record {
                Ok(record) => record,
                Err(err) => {
                    warn!(
                        table = table.name(),
                        chromosome = chromosome_name,
                        error = %err,
                        "skipping malformed alignment record"
                    );
                    tally.skipped_records += 1;
                    return Ok(());
                }
            };
            if !filter.accepts(&record) {
                return Ok(());
            }

            let Some(query_chromosome) = query.chromosome_id(&record.q_name) else {
                warn!(
                    table = table.name(),
                    chromosome = chromosome_name,
                    query_chromosome = %record.q_name,
                    "alignment names an unknown query chromosome; skipping record"
                );
                tally.skipped_records += 1;
                return Ok(());
            };

            let anchors =
                self.resolve_anchors(target, query, chromosome, query_chromosome, &record)?;
            match anchors.classify(chromosome, query_chromosome) {
                BlockOutcome::Correct(block) => {
                    self.warehouse.insert_synteny(&block)?;
                    tally.correct += 1;
                }
                BlockOutcome::PartialMismatch => {
                    debug!(
                        chromosome = chromosome_name,
                        t_start = record.t_start,
                        t_end = record.t_end,
                        resolved = anchors.resolved_count(),
                        "partial anchor mismatch"
                    );
                    tally.partial += 1;
                }
                BlockOutcome::CompleteMismatch => {
                    debug!(
                        chromosome = chromosome_name,
                        t_start = record.t_start,
                        t_end = record.t_end,
                        "complete anchor mismatch"
                    );
                    tally.complete += 1;
                }
            }
            Ok(())
        })?;

        Ok(tally)
    }

    /// Resolves the four anchors of one record; right anchors are swapped
    /// for reverse-strand records.
    fn resolve_anchors(
        &self,
        target: &ResolvedAssembly,
        query: &ResolvedAssembly,
        left: ChromosomeId,
        right: ChromosomeId,
        record: &AlignmentRecord,
    ) -> Result<AnchorSet> {
        let left_window = Window::new(target.annotation_set, left, record.t_start, record.t_end);
        let right_window = Window::new(query.annotation_set, right, record.q_start, record.q_end);

        let left_bounds = self.side_anchors(&left_window, query.annotation_set)?;
        let right_bounds = self.side_anchors(&right_window, target.annotation_set)?;

        let mut anchors = AnchorSet {
            left_start: left_bounds.first,
            left_stop: left_bounds.last,
            right_start: right_bounds.first,
            right_stop: right_bounds.last,
        };
        if record.strand == Strand::Reverse {
            anchors.swap_right();
        }
        Ok(anchors)
    }

    /// Linked anchors first, then any annotation in the window for whichever
    /// bound is still missing.
    fn side_anchors(&self, window: &Window, peer_set: AnnotationSetId) -> Result<WindowBounds> {
        let linked = self.warehouse.linked_bounds(window, peer_set)?;
        if linked.first.is_some() && linked.last.is_some() {
            return Ok(linked);
        }

        let any = self.warehouse.any_bounds(window)?;
        Ok(WindowBounds {
            first: linked.first.or(any.first),
            last: linked.last.or(any.last),
        })
    }
}
