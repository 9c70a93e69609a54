use std::collections::HashSet;

use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, params};

use crate::avp::AttributeStore;
use crate::models::{
    AnnotationId, AnnotationSetId, Chromosome, ChromosomeId, LinkGroupId, Map, MapId,
    NewAnnotation, ResolvedAssembly, SourceId, SyntenyBlock,
};
use crate::Database;

/// One (source, source-reference id) shared by more than one annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateReference {
    pub source_id: SourceId,
    pub source_ref_id: String,
    pub members: Vec<AnnotationId>,
}

/// A coordinate window on one chromosome of one annotation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub annotation_set: AnnotationSetId,
    pub chromosome: ChromosomeId,
    pub start: i64,
    pub end: i64,
}

impl Window {
    /// Builds a window, ordering the bounds if they arrive reversed.
    pub fn new(annotation_set: AnnotationSetId, chromosome: ChromosomeId, a: i64, b: i64) -> Self {
        Self {
            annotation_set,
            chromosome,
            start: a.min(b),
            end: a.max(b),
        }
    }
}

/// First and last annotation of a window, in position order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowBounds {
    pub first: Option<AnnotationId>,
    pub last: Option<AnnotationId>,
}

const WINDOW_FILTER: &str = "a.annotation_set_id = ?1 AND a.chromosome_id = ?2 AND a.start >= ?3 AND a.stop <= ?4";

// Annotation whose link group also holds a member of annotation set ?5
const LINKED_FILTER: &str = "EXISTS (
    SELECT 1 FROM links l
    JOIN links peer ON peer.id = l.id
    JOIN annotation b ON b.id = peer.annotation_id
    WHERE l.annotation_id = a.id AND b.annotation_set_id = ?5)";

/// Typed, parameterized access to the warehouse tables.
///
/// Warehouse owns the Database and is the only place the engine issues SQL
/// against assemblies, annotations, links and synteny blocks. Each statement
/// commits on its own; there is no run-wide transaction.
pub struct Warehouse {
    db: Database,
}

impl Warehouse {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns a reference to the underlying database.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Attribute/value store sharing this warehouse's connection.
    pub fn attributes(&self) -> AttributeStore<'_> {
        AttributeStore::new(self.db.connection())
    }

    // --- Sources -----------------------------------------------------------

    /// Looks up a source by exact name, creating it if missing.
    pub fn ensure_source(&self, name: &str) -> Result<SourceId> {
        let conn = self.db.connection();
        conn.execute("INSERT OR IGNORE INTO sources (name) VALUES (?1)", [name])?;
        let id = conn
            .query_row("SELECT id FROM sources WHERE name = ?1", [name], |row| {
                row.get(0)
            })
            .with_context(|| format!("Failed to resolve source '{name}'"))?;
        Ok(id)
    }

    pub fn source_id(&self, name: &str) -> Result<Option<SourceId>> {
        let id = self
            .db
            .connection()
            .query_row("SELECT id FROM sources WHERE name = ?1", [name], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(id)
    }

    // --- Assemblies ----------------------------------------------------------

    pub fn insert_map(
        &self,
        species: &str,
        map_type: &str,
        version: i64,
        scale: i64,
        tax_id: Option<i64>,
    ) -> Result<MapId> {
        let conn = self.db.connection();
        conn.execute(
            "INSERT INTO maps (version_id, type, species, scale, taxID) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![version, map_type, species, scale, tax_id],
        )
        .with_context(|| format!("Failed to insert map {species} {map_type} v{version}"))?;
        Ok(MapId::new(conn.last_insert_rowid()))
    }

    pub fn find_map(&self, species: &str, map_type: &str, version: i64) -> Result<Option<MapId>> {
        let id = self
            .db
            .connection()
            .query_row(
                "SELECT id FROM maps WHERE species = ?1 AND type = ?2 AND version_id = ?3",
                params![species, map_type, version],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn set_default_annotation(&self, map: MapId, set: AnnotationSetId) -> Result<()> {
        self.db.connection().execute(
            "UPDATE maps SET default_annotation = ?1 WHERE id = ?2",
            params![set, map],
        )?;
        Ok(())
    }

    pub fn insert_chromosome(&self, map: MapId, name: &str, length: i64) -> Result<ChromosomeId> {
        let conn = self.db.connection();
        conn.execute(
            "INSERT INTO chromosomes (map_id, name, length) VALUES (?1, ?2, ?3)",
            params![map, name, length],
        )
        .with_context(|| format!("Failed to insert chromosome {name} of map {map}"))?;
        Ok(ChromosomeId::new(conn.last_insert_rowid()))
    }

    pub fn chromosome_id(&self, map: MapId, name: &str) -> Result<Option<ChromosomeId>> {
        let id = self
            .db
            .connection()
            .query_row(
                "SELECT id FROM chromosomes WHERE map_id = ?1 AND name = ?2",
                params![map, name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Chromosomes of one map, ordered by name.
    pub fn chromosomes(&self, map: MapId) -> Result<Vec<Chromosome>> {
        let mut stmt = self.db.connection().prepare(
            "SELECT id, map_id, name, length FROM chromosomes WHERE map_id = ?1 ORDER BY name, id",
        )?;
        let rows = stmt.query_map([map], |row| {
            Ok(Chromosome {
                id: row.get(0)?,
                map_id: row.get(1)?,
                name: row.get(2)?,
                length: row.get(3)?,
            })
        })?;

        let mut chromosomes = Vec::new();
        for row in rows {
            chromosomes.push(row?);
        }
        Ok(chromosomes)
    }

    pub fn insert_annotation_set(
        &self,
        map: MapId,
        version: i64,
        set_type: &str,
    ) -> Result<AnnotationSetId> {
        let conn = self.db.connection();
        conn.execute(
            "INSERT INTO annotation_sets (map_id, version_id, type) VALUES (?1, ?2, ?3)",
            params![map, version, set_type],
        )?;
        Ok(AnnotationSetId::new(conn.last_insert_rowid()))
    }

    pub fn find_annotation_set(
        &self,
        map: MapId,
        version: i64,
        set_type: &str,
    ) -> Result<Option<AnnotationSetId>> {
        let id = self
            .db
            .connection()
            .query_row(
                "SELECT id FROM annotation_sets WHERE map_id = ?1 AND version_id = ?2 AND type = ?3",
                params![map, version, set_type],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Taxon ids of every loaded map.
    pub fn loaded_tax_ids(&self) -> Result<HashSet<i64>> {
        let mut stmt = self
            .db
            .connection()
            .prepare("SELECT DISTINCT taxID FROM maps WHERE taxID IS NOT NULL")?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;

        let mut taxa = HashSet::new();
        for row in rows {
            taxa.insert(row?);
        }
        Ok(taxa)
    }

    /// Resolves the default assembly of a species.
    ///
    /// Picks the highest-version map of the given type. Returns `None` when
    /// no such map is loaded or it has no default annotation set.
    pub fn default_assembly(
        &self,
        species: &str,
        map_type: &str,
    ) -> Result<Option<ResolvedAssembly>> {
        let map = self
            .db
            .connection()
            .query_row(
                "SELECT id, species, type, version_id, scale, taxID, default_annotation
                 FROM maps WHERE species = ?1 AND type = ?2
                 ORDER BY version_id DESC, id DESC LIMIT 1",
                params![species, map_type],
                |row| {
                    Ok(Map {
                        id: row.get(0)?,
                        species: row.get(1)?,
                        map_type: row.get(2)?,
                        version: row.get(3)?,
                        scale: row.get(4)?,
                        tax_id: row.get(5)?,
                        default_annotation: row.get(6)?,
                    })
                },
            )
            .optional()?;

        let Some(map) = map else {
            return Ok(None);
        };
        let Some(set) = map.default_annotation else {
            return Ok(None);
        };
        let chromosomes = self.chromosomes(map.id)?;
        Ok(Some(ResolvedAssembly::new(map, set, chromosomes)))
    }

    // --- Annotations ---------------------------------------------------------

    pub fn insert_annotation(&self, annotation: &NewAnnotation<'_>) -> Result<AnnotationId> {
        let conn = self.db.connection();
        conn.execute(
            "INSERT INTO annotation (name, chromosome_id, annotation_set_id, start, stop, source_id, source_ref_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                annotation.name,
                annotation.chromosome_id,
                annotation.annotation_set_id,
                annotation.start,
                annotation.stop,
                annotation.source_id,
                annotation.source_ref_id,
            ],
        )
        .with_context(|| format!("Failed to insert annotation '{}'", annotation.name))?;
        Ok(AnnotationId::new(conn.last_insert_rowid()))
    }

    /// Annotations of a set looked up by exact name.
    pub fn annotation_by_name(
        &self,
        set: AnnotationSetId,
        name: &str,
    ) -> Result<Option<AnnotationId>> {
        let id = self
            .db
            .connection()
            .query_row(
                "SELECT id FROM annotation WHERE annotation_set_id = ?1 AND name = ?2 ORDER BY id LIMIT 1",
                params![set, name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Annotations whose (source, reference id) match exactly.
    pub fn annotations_by_reference(
        &self,
        source: SourceId,
        source_ref_id: &str,
    ) -> Result<Vec<AnnotationId>> {
        let mut stmt = self.db.connection().prepare_cached(
            "SELECT id FROM annotation WHERE source_id = ?1 AND source_ref_id = ?2 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![source, source_ref_id], |row| row.get(0))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    /// Every (source, reference id) carried by more than one annotation,
    /// ordered by source then reference id, members by annotation id.
    pub fn duplicate_references(&self) -> Result<Vec<DuplicateReference>> {
        let mut stmt = self.db.connection().prepare(
            "SELECT a.source_id, a.source_ref_id, a.id
             FROM annotation a
             JOIN (SELECT source_id, source_ref_id
                   FROM annotation
                   WHERE source_id IS NOT NULL AND source_ref_id IS NOT NULL
                   GROUP BY source_id, source_ref_id
                   HAVING COUNT(*) > 1) d
               ON a.source_id = d.source_id AND a.source_ref_id = d.source_ref_id
             ORDER BY a.source_id, a.source_ref_id, a.id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, SourceId>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, AnnotationId>(2)?,
            ))
        })?;

        let mut groups: Vec<DuplicateReference> = Vec::new();
        for row in rows {
            let (source_id, source_ref_id, id) = row?;
            match groups.last_mut() {
                Some(group)
                    if group.source_id == source_id && group.source_ref_id == source_ref_id =>
                {
                    group.members.push(id);
                }
                _ => groups.push(DuplicateReference {
                    source_id,
                    source_ref_id,
                    members: vec![id],
                }),
            }
        }
        Ok(groups)
    }

    // --- Links ---------------------------------------------------------------

    /// Deletes every link row. Returns the number of rows removed.
    pub fn clear_links(&self) -> Result<usize> {
        let removed = self.db.connection().execute("DELETE FROM links", [])?;
        Ok(removed)
    }

    /// Adds an annotation to a link group.
    ///
    /// Returns `false` when the annotation already belongs to a group; the
    /// earlier membership is kept.
    pub fn insert_link(
        &self,
        group: LinkGroupId,
        annotation: AnnotationId,
        source: SourceId,
    ) -> Result<bool> {
        let inserted = self.db.connection().execute(
            "INSERT OR IGNORE INTO links (id, annotation_id, source_id) VALUES (?1, ?2, ?3)",
            params![group, annotation, source],
        )?;
        Ok(inserted == 1)
    }

    /// Moves every member of `from` into `into`. Returns the rows moved.
    pub fn merge_link_groups(&self, into: LinkGroupId, from: LinkGroupId) -> Result<usize> {
        let moved = self
            .db
            .connection()
            .execute(
                "UPDATE links SET id = ?1 WHERE id = ?2",
                params![into, from],
            )
            .with_context(|| format!("Failed to merge link group {from} into {into}"))?;
        Ok(moved)
    }

    pub fn link_group_of(&self, annotation: AnnotationId) -> Result<Option<LinkGroupId>> {
        let id = self
            .db
            .connection()
            .query_row(
                "SELECT id FROM links WHERE annotation_id = ?1",
                [annotation],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Members of a link group, ordered by annotation id.
    pub fn link_members(&self, group: LinkGroupId) -> Result<Vec<AnnotationId>> {
        let mut stmt = self
            .db
            .connection()
            .prepare("SELECT annotation_id FROM links WHERE id = ?1 ORDER BY annotation_id")?;
        let rows = stmt.query_map([group], |row| row.get(0))?;

        let mut members = Vec::new();
        for row in rows {
            members.push(row?);
        }
        Ok(members)
    }

    pub fn link_count(&self) -> Result<i64> {
        let count = self
            .db
            .connection()
            .query_row("SELECT COUNT(*) FROM links", [], |row| row.get(0))?;
        Ok(count)
    }

    // --- Synteny -------------------------------------------------------------

    /// True if any block connects a chromosome of `target` to one of `query`.
    pub fn pair_has_synteny(&self, target: MapId, query: MapId) -> Result<bool> {
        let exists = self.db.connection().query_row(
            "SELECT EXISTS(
                 SELECT 1 FROM synteny s
                 JOIN chromosomes l ON l.id = s.left_id
                 JOIN chromosomes r ON r.id = s.right_id
                 WHERE l.map_id = ?1 AND r.map_id = ?2)",
            params![target, query],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn insert_synteny(&self, block: &SyntenyBlock) -> Result<()> {
        self.db
            .connection()
            .execute(
                "INSERT INTO synteny (left_id, right_id, left_start_id, left_stop_id, right_start_id, right_stop_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    block.left,
                    block.right,
                    block.left_start,
                    block.left_stop,
                    block.right_start,
                    block.right_stop,
                ],
            )
            .with_context(|| {
                format!(
                    "Failed to insert synteny block {} -> {}",
                    block.left, block.right
                )
            })?;
        Ok(())
    }

    /// Blocks whose left chromosome belongs to `target` and right to `query`.
    pub fn synteny_blocks(&self, target: MapId, query: MapId) -> Result<Vec<SyntenyBlock>> {
        let mut stmt = self.db.connection().prepare(
            "SELECT s.left_id, s.right_id, s.left_start_id, s.left_stop_id, s.right_start_id, s.right_stop_id
             FROM synteny s
             JOIN chromosomes l ON l.id = s.left_id
             JOIN chromosomes r ON r.id = s.right_id
             WHERE l.map_id = ?1 AND r.map_id = ?2
             ORDER BY s.rowid",
        )?;
        let rows = stmt.query_map(params![target, query], |row| {
            Ok(SyntenyBlock {
                left: row.get(0)?,
                right: row.get(1)?,
                left_start: row.get(2)?,
                left_stop: row.get(3)?,
                right_start: row.get(4)?,
                right_stop: row.get(5)?,
            })
        })?;

        let mut blocks = Vec::new();
        for row in rows {
            blocks.push(row?);
        }
        Ok(blocks)
    }

    // --- Anchors -------------------------------------------------------------

    /// First and last annotation inside `window` whose link group reaches
    /// `linked_to`.
    pub fn linked_bounds(
        &self,
        window: &Window,
        linked_to: AnnotationSetId,
    ) -> Result<WindowBounds> {
        Ok(WindowBounds {
            first: self.window_edge(window, Some(linked_to), "ASC")?,
            last: self.window_edge(window, Some(linked_to), "DESC")?,
        })
    }

    /// First and last annotation inside `window`, ignoring linkage.
    pub fn any_bounds(&self, window: &Window) -> Result<WindowBounds> {
        Ok(WindowBounds {
            first: self.window_edge(window, None, "ASC")?,
            last: self.window_edge(window, None, "DESC")?,
        })
    }

    fn window_edge(
        &self,
        window: &Window,
        linked_to: Option<AnnotationSetId>,
        direction: &'static str,
    ) -> Result<Option<AnnotationId>> {
        let order = format!(
            "ORDER BY a.start {direction}, a.stop {direction}, a.id {direction} LIMIT 1"
        );
        let conn = self.db.connection();

        let id = match linked_to {
            Some(peer_set) => {
                let sql = format!(
                    "SELECT a.id FROM annotation a WHERE {WINDOW_FILTER} AND {LINKED_FILTER} {order}"
                );
                conn.prepare_cached(&sql)?
                    .query_row(
                        params![
                            window.annotation_set,
                            window.chromosome,
                            window.start,
                            window.end,
                            peer_set,
                        ],
                        |row| row.get(0),
                    )
                    .optional()?
            }
            None => {
                let sql = format!("SELECT a.id FROM annotation a WHERE {WINDOW_FILTER} {order}");
                conn.prepare_cached(&sql)?
                    .query_row(
                        params![
                            window.annotation_set,
                            window.chromosome,
                            window.start,
                            window.end,
                        ],
                        |row| row.get(0),
                    )
                    .optional()?
            }
        };
        Ok(id)
    }
}
