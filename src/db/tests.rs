use super::*;
use tempfile::tempdir;

fn table_names(db: &Database) -> Vec<String> {
    db.connection()
        .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .filter_map(|r| r.ok())
        .collect()
}

#[test]
fn in_memory_opens_successfully() {
    let result = Database::in_memory();
    assert!(result.is_ok());
}

#[test]
fn schema_tables_exist() {
    let db = Database::in_memory().unwrap();
    let tables = table_names(&db);

    for expected in [
        "annotation",
        "annotation_avps",
        "annotation_sets",
        "attributes",
        "chromosomes",
        "links",
        "maps",
        "sources",
        "synteny",
        "vals",
    ] {
        assert!(
            tables.contains(&expected.to_string()),
            "missing table {expected}"
        );
    }
}

#[test]
fn schema_indexes_exist() {
    let db = Database::in_memory().unwrap();

    let indexes: Vec<String> = db
        .connection()
        .prepare(
            "SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%' ORDER BY name",
        )
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .filter_map(|r| r.ok())
        .collect();

    assert!(indexes.contains(&"idx_annotation_window".to_string()));
    assert!(indexes.contains(&"idx_links_group".to_string()));
    assert!(indexes.contains(&"idx_synteny_pair".to_string()));
}

#[test]
fn foreign_keys_enabled() {
    let db = Database::in_memory().unwrap();

    let fk_enabled: i32 = db
        .connection()
        .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
        .unwrap();

    assert_eq!(fk_enabled, 1);
}

#[test]
fn all_migrations_recorded() {
    let db = Database::in_memory().unwrap();

    let versions = applied_versions(db.connection()).unwrap();
    let expected: Vec<u32> = MIGRATIONS.iter().map(|m| m.version).collect();
    assert_eq!(versions, expected);
}

#[test]
fn open_creates_database_file() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("warehouse.db");

    let result = Database::open(&db_path);
    assert!(result.is_ok());
    assert!(db_path.exists());
}

#[test]
fn reopen_is_idempotent() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("warehouse.db");

    {
        let db = Database::open(&db_path).unwrap();
        db.connection()
            .execute("INSERT INTO sources (name) VALUES ('NCBI Gene')", [])
            .unwrap();
    }

    // Migrations must not be re-applied on reopen
    let db2 = Database::open(&db_path).unwrap();
    let count: i32 = db2
        .connection()
        .query_row("SELECT COUNT(*) FROM sources", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(
        applied_versions(db2.connection()).unwrap().len(),
        MIGRATIONS.len()
    );
}

#[test]
fn links_reject_second_row_for_same_annotation() {
    let db = Database::in_memory().unwrap();
    let conn = db.connection();
    conn.execute_batch(
        "INSERT INTO sources (id, name) VALUES (1, 'src');
         INSERT INTO maps (id, version_id, type, species) VALUES (1, 1, 'Genomic', 'human');
         INSERT INTO chromosomes (id, map_id, name) VALUES (1, 1, '1');
         INSERT INTO annotation_sets (id, map_id, version_id, type) VALUES (1, 1, 1, 'Gene');
         INSERT INTO annotation (id, name, chromosome_id, annotation_set_id, start, stop)
             VALUES (1, 'g', 1, 1, 10, 20);
         INSERT INTO links (id, annotation_id, source_id) VALUES (1, 1, 1);",
    )
    .unwrap();

    let second = conn.execute(
        "INSERT INTO links (id, annotation_id, source_id) VALUES (2, 1, 1)",
        [],
    );
    assert!(second.is_err());
}

#[test]
fn synteny_rejects_degenerate_anchors() {
    let db = Database::in_memory().unwrap();
    let conn = db.connection();
    conn.execute_batch(
        "INSERT INTO maps (id, version_id, type, species) VALUES (1, 1, 'Genomic', 'human');
         INSERT INTO chromosomes (id, map_id, name) VALUES (1, 1, '1');",
    )
    .unwrap();

    let degenerate = conn.execute(
        "INSERT INTO synteny (left_id, right_id, left_start_id, left_stop_id, right_start_id, right_stop_id)
         VALUES (1, 1, 7, 7, 8, 9)",
        [],
    );
    assert!(degenerate.is_err());
}
