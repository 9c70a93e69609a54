use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{AnnotationSetId, ChromosomeId, MapId};

/// An assembly row from the `maps` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Map {
    pub id: MapId,
    pub species: String,
    pub map_type: String,
    pub version: i64,
    /// Coordinate scale the annotation loader applied to this assembly.
    pub scale: i64,
    pub tax_id: Option<i64>,
    pub default_annotation: Option<AnnotationSetId>,
}

/// A chromosome row from the `chromosomes` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chromosome {
    pub id: ChromosomeId,
    pub map_id: MapId,
    pub name: String,
    pub length: i64,
}

/// The default assembly of one species, resolved for a synteny run.
///
/// Holds the small per-species lookup structures the builder keeps in memory
/// while it streams one pair.
#[derive(Debug, Clone)]
pub struct ResolvedAssembly {
    pub species: String,
    pub map: Map,
    pub annotation_set: AnnotationSetId,
    /// Chromosomes ordered by name.
    pub chromosomes: Vec<Chromosome>,
    by_name: HashMap<String, ChromosomeId>,
}

impl ResolvedAssembly {
    pub fn new(map: Map, annotation_set: AnnotationSetId, chromosomes: Vec<Chromosome>) -> Self {
        let by_name = chromosomes
            .iter()
            .map(|c| (c.name.clone(), c.id))
            .collect();
        Self {
            species: map.species.clone(),
            map,
            annotation_set,
            chromosomes,
            by_name,
        }
    }

    /// Looks up a chromosome id by its exact (case-sensitive) name.
    pub fn chromosome_id(&self, name: &str) -> Option<ChromosomeId> {
        self.by_name.get(name).copied()
    }

    pub fn chromosome_ids(&self) -> Vec<ChromosomeId> {
        self.chromosomes.iter().map(|c| c.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> Map {
        Map {
            id: MapId::new(1),
            species: "human".to_string(),
            map_type: "Genomic".to_string(),
            version: 38,
            scale: 1,
            tax_id: Some(9606),
            default_annotation: Some(AnnotationSetId::new(3)),
        }
    }

    #[test]
    fn chromosome_lookup_is_case_sensitive() {
        let assembly = ResolvedAssembly::new(
            map(),
            AnnotationSetId::new(3),
            vec![Chromosome {
                id: ChromosomeId::new(10),
                map_id: MapId::new(1),
                name: "X".to_string(),
                length: 1000,
            }],
        );

        assert_eq!(assembly.chromosome_id("X"), Some(ChromosomeId::new(10)));
        assert_eq!(assembly.chromosome_id("x"), None);
        assert_eq!(assembly.species, "human");
    }
}
