pub mod alignment;
pub mod avp;
pub mod config;
pub mod db;
pub mod error;
pub mod homology;
pub mod linker;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod status;
pub mod synteny;
pub mod warehouse;

#[cfg(test)]
mod fixtures;

pub use config::Config;
pub use db::Database;
pub use error::{EngineError, EngineResult, ErrorClass};
pub use pipeline::{Pipeline, RunReport};
pub use warehouse::Warehouse;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_accessible_from_crate_root() {
        let db = Database::in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn warehouse_wraps_database() {
        let warehouse = Warehouse::new(Database::in_memory().unwrap());
        assert_eq!(warehouse.link_count().unwrap(), 0);
    }
}
