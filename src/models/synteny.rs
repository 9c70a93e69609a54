use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{AnnotationId, ChromosomeId};

/// Orientation of the query side of an alignment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strand {
    #[serde(rename = "+")]
    Forward,
    #[serde(rename = "-")]
    Reverse,
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward => write!(f, "+"),
            Self::Reverse => write!(f, "-"),
        }
    }
}

impl FromStr for Strand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "+" => Ok(Self::Forward),
            "-" => Ok(Self::Reverse),
            other => Err(format!("unknown strand '{other}'")),
        }
    }
}

/// A persisted synteny block row.
///
/// Left is the target chromosome, right the query chromosome. On a reverse
/// strand alignment the right anchors are already swapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntenyBlock {
    pub left: ChromosomeId,
    pub right: ChromosomeId,
    pub left_start: AnnotationId,
    pub left_stop: AnnotationId,
    pub right_start: AnnotationId,
    pub right_stop: AnnotationId,
}

impl SyntenyBlock {
    /// True if either side collapses to a single anchor.
    pub fn is_degenerate(&self) -> bool {
        self.left_start == self.left_stop || self.right_start == self.right_stop
    }
}

/// Anchors resolved for one alignment record, before classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnchorSet {
    pub left_start: Option<AnnotationId>,
    pub left_stop: Option<AnnotationId>,
    pub right_start: Option<AnnotationId>,
    pub right_stop: Option<AnnotationId>,
}

/// How one alignment record was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    Correct(SyntenyBlock),
    PartialMismatch,
    CompleteMismatch,
}

impl AnchorSet {
    pub fn resolved_count(&self) -> usize {
        [
            self.left_start,
            self.left_stop,
            self.right_start,
            self.right_stop,
        ]
        .iter()
        .filter(|a| a.is_some())
        .count()
    }

    /// Swaps the right-side anchors (reverse strand alignments).
    pub fn swap_right(&mut self) {
        std::mem::swap(&mut self.right_start, &mut self.right_stop);
    }

    /// Classifies the anchors into a block or a mismatch.
    ///
    /// A block is only produced when all four anchors resolved and neither
    /// side collapsed to a single point.
    pub fn classify(&self, left: ChromosomeId, right: ChromosomeId) -> BlockOutcome {
        match (
            self.left_start,
            self.left_stop,
            self.right_start,
            self.right_stop,
        ) {
            (Some(left_start), Some(left_stop), Some(right_start), Some(right_stop)) => {
                let block = SyntenyBlock {
                    left,
                    right,
                    left_start,
                    left_stop,
                    right_start,
                    right_stop,
                };
                if block.is_degenerate() {
                    BlockOutcome::PartialMismatch
                } else {
                    BlockOutcome::Correct(block)
                }
            }
            _ if self.resolved_count() == 0 => BlockOutcome::CompleteMismatch,
            _ => BlockOutcome::PartialMismatch,
        }
    }
}
