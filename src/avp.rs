//! Content-addressed attribute/value attachment for annotations.
//!
//! Attributes are named keys, values are literals stored once per distinct
//! text and found again through the SHA-256 hash of that text. Neither is
//! ever mutated or deleted.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};

use crate::models::{AnnotationId, AttributeId, ValueId};

/// Attribute carrying the NCBI gene id for providers without a first-class reference.
pub const ENTREZ_GENE_ID: &str = "EntrezGeneId";
/// Attribute recording the homology cluster an annotation was linked through.
pub const HOMOLOGENE_ID: &str = "homologene_id";

/// Content address of a value literal: the lowercase hex SHA-256 digest.
///
/// A pure function of the literal, independent of what is stored.
pub fn value_hash(literal: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(literal.as_bytes());
    hex::encode(hasher.finalize())
}

/// Attribute/value operations over a borrowed warehouse connection.
pub struct AttributeStore<'a> {
    conn: &'a Connection,
}

impl<'a> AttributeStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Looks up or creates the attribute named `attribute_type`.
    pub fn ensure_attribute(&self, attribute_type: &str) -> Result<AttributeId> {
        if let Some(id) = self.attribute_id(attribute_type)? {
            return Ok(id);
        }
        self.conn.execute(
            "INSERT INTO attributes (type) VALUES (?1)",
            [attribute_type],
        )?;
        Ok(AttributeId::new(self.conn.last_insert_rowid()))
    }

    /// Looks up or creates the value row for `literal`.
    ///
    /// Identical literals always resolve to the same id.
    pub fn ensure_value(&self, literal: &str) -> Result<ValueId> {
        let hash = value_hash(literal);
        if let Some(id) = self.value_id_by_hash(&hash)? {
            return Ok(id);
        }
        self.conn.execute(
            "INSERT INTO vals (value, hash) VALUES (?1, ?2)",
            params![literal, hash],
        )?;
        Ok(ValueId::new(self.conn.last_insert_rowid()))
    }

    /// Attaches `{attribute_type = literal}` to an annotation.
    ///
    /// Returns `false` without writing anything if the exact triple is already
    /// attached, so repeated calls are safe to retry.
    pub fn attach(
        &self,
        annotation: AnnotationId,
        attribute_type: &str,
        literal: &str,
    ) -> Result<bool> {
        if self.has(annotation, attribute_type, literal)? {
            return Ok(false);
        }

        let attribute = self.ensure_attribute(attribute_type)?;
        let value = self.ensure_value(literal)?;
        self.conn
            .execute(
                "INSERT INTO annotation_avps (annotation_id, attribute_id, value_id) VALUES (?1, ?2, ?3)",
                params![annotation, attribute, value],
            )
            .with_context(|| {
                format!("Failed to attach {attribute_type}={literal} to annotation {annotation}")
            })?;
        Ok(true)
    }

    /// True if the exact (annotation, attribute, value) triple exists.
    pub fn has(
        &self,
        annotation: AnnotationId,
        attribute_type: &str,
        literal: &str,
    ) -> Result<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(
                 SELECT 1 FROM annotation_avps av
                 JOIN attributes attr ON attr.id = av.attribute_id
                 JOIN vals v ON v.id = av.value_id
                 WHERE av.annotation_id = ?1 AND attr.type = ?2 AND v.hash = ?3)",
            params![annotation, attribute_type, value_hash(literal)],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Annotations carrying `{attribute_type = literal}`, ordered by id.
    pub fn annotations_with(
        &self,
        attribute_type: &str,
        literal: &str,
    ) -> Result<Vec<AnnotationId>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT av.annotation_id FROM annotation_avps av
             JOIN attributes attr ON attr.id = av.attribute_id
             JOIN vals v ON v.id = av.value_id
             WHERE attr.type = ?1 AND v.hash = ?2
             ORDER BY av.annotation_id",
        )?;
        let rows = stmt.query_map(params![attribute_type, value_hash(literal)], |row| {
            row.get(0)
        })?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    /// Literal values of `attribute_type` attached to an annotation.
    pub fn values_of(&self, annotation: AnnotationId, attribute_type: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT v.value FROM annotation_avps av
             JOIN attributes attr ON attr.id = av.attribute_id
             JOIN vals v ON v.id = av.value_id
             WHERE av.annotation_id = ?1 AND attr.type = ?2
             ORDER BY v.id",
        )?;
        let rows = stmt.query_map(params![annotation, attribute_type], |row| row.get(0))?;

        let mut values = Vec::new();
        for row in rows {
            values.push(row?);
        }
        Ok(values)
    }

    fn attribute_id(&self, attribute_type: &str) -> Result<Option<AttributeId>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM attributes WHERE type = ?1",
                [attribute_type],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn value_id_by_hash(&self, hash: &str) -> Result<Option<ValueId>> {
        let id = self
            .conn
            .query_row("SELECT id FROM vals WHERE hash = ?1", [hash], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(id)
    }
}
