use serde::{Deserialize, Serialize};
use std::fmt;

/// Declares a transparent integer id wrapper for one warehouse table.
///
/// Each id wraps a database rowid so that ids of different tables cannot be
/// mixed up at call sites.
macro_rules! table_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw database id.
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the underlying id value.
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl rusqlite::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                self.0.to_sql()
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                i64::column_result(value).map(Self)
            }
        }
    };
}

table_id!(
    /// Row id in the `annotation` table.
    AnnotationId
);
table_id!(
    /// Row id in the `chromosomes` table.
    ChromosomeId
);
table_id!(
    /// Row id in the `maps` table (one assembly).
    MapId
);
table_id!(
    /// Row id in the `annotation_sets` table.
    AnnotationSetId
);
table_id!(
    /// Row id in the `sources` table.
    SourceId
);
table_id!(AttributeId);
table_id!(ValueId);
table_id!(
    /// Group id shared by every member of one link group.
    LinkGroupId
);

impl LinkGroupId {
    /// Returns the id allocated after this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}
