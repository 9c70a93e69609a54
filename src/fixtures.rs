//! Warehouse seeding helpers shared by the unit test suites.

use std::collections::HashMap;

use rusqlite::params;

use crate::models::{AnnotationId, AnnotationSetId, ChromosomeId, MapId, SourceId};
use crate::{Database, Warehouse};

pub const GENOMIC: &str = "Genomic";

/// One species' default assembly as seeded for a test.
pub struct SpeciesFixture {
    pub map: MapId,
    pub set: AnnotationSetId,
    pub chromosomes: HashMap<String, ChromosomeId>,
}

impl SpeciesFixture {
    pub fn chromosome(&self, name: &str) -> ChromosomeId {
        self.chromosomes[name]
    }
}

pub fn warehouse() -> Warehouse {
    Warehouse::new(Database::in_memory().expect("failed to create in-memory database"))
}

/// Seeds a genomic map, its chromosomes and a default annotation set.
pub fn add_species(
    warehouse: &Warehouse,
    species: &str,
    tax_id: i64,
    chromosomes: &[&str],
) -> SpeciesFixture {
    let map = warehouse
        .insert_map(species, GENOMIC, 1, 1, Some(tax_id))
        .expect("insert map");
    let set = warehouse
        .insert_annotation_set(map, 1, "Gene")
        .expect("insert annotation set");
    warehouse
        .set_default_annotation(map, set)
        .expect("set default annotation");

    let chromosomes = chromosomes
        .iter()
        .map(|name| {
            let id = warehouse
                .insert_chromosome(map, name, 1_000_000)
                .expect("insert chromosome");
            (name.to_string(), id)
        })
        .collect();

    SpeciesFixture {
        map,
        set,
        chromosomes,
    }
}

/// Inserts an annotation with an explicit id.
pub fn add_annotation(
    warehouse: &Warehouse,
    id: i64,
    species: &SpeciesFixture,
    chromosome: &str,
    start: i64,
    stop: i64,
    reference: Option<(SourceId, &str)>,
) -> AnnotationId {
    let (source_id, source_ref_id) = match reference {
        Some((source, reference)) => (Some(source), Some(reference)),
        None => (None, None),
    };
    warehouse
        .database()
        .connection()
        .execute(
            "INSERT INTO annotation (id, name, chromosome_id, annotation_set_id, start, stop, source_id, source_ref_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                format!("feature{id}"),
                species.chromosome(chromosome),
                species.set,
                start,
                stop,
                source_id,
                source_ref_id,
            ],
        )
        .expect("insert annotation");
    AnnotationId::new(id)
}

/// Puts the given annotations into one link group.
pub fn link(warehouse: &Warehouse, group: i64, members: &[AnnotationId]) {
    let source = warehouse.ensure_source("fixture").expect("ensure source");
    for member in members {
        warehouse
            .insert_link(crate::models::LinkGroupId::new(group), *member, source)
            .expect("insert link");
    }
}
