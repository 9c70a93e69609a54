mod annotation;
mod assembly;
mod ids;
mod synteny;

pub use annotation::{Annotation, NewAnnotation};
pub use assembly::{Chromosome, Map, ResolvedAssembly};
pub use ids::{
    AnnotationId, AnnotationSetId, AttributeId, ChromosomeId, LinkGroupId, MapId, SourceId,
    ValueId,
};
pub use synteny::{AnchorSet, BlockOutcome, Strand, SyntenyBlock};
