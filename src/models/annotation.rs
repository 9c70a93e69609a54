use serde::{Deserialize, Serialize};

use super::{AnnotationId, AnnotationSetId, ChromosomeId, SourceId};

/// A genomic feature record from the `annotation` table.
///
/// Start and stop are already in the assembly's native integer units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    pub name: String,
    pub chromosome_id: ChromosomeId,
    pub annotation_set_id: AnnotationSetId,
    pub start: i64,
    pub stop: i64,
    pub source_id: Option<SourceId>,
    pub source_ref_id: Option<String>,
}

/// Fields for inserting a new annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAnnotation<'a> {
    pub name: &'a str,
    pub chromosome_id: ChromosomeId,
    pub annotation_set_id: AnnotationSetId,
    pub start: i64,
    pub stop: i64,
    pub source_id: Option<SourceId>,
    pub source_ref_id: Option<&'a str>,
}
