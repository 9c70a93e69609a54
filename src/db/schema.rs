/// Warehouse tables read and written by the linking and synteny engine.
///
/// Assembly, chromosome, annotation-set and annotation rows are produced by
/// upstream loaders; this crate only attaches attributes, link groups and
/// synteny blocks to them.
pub const WAREHOUSE_SCHEMA: &str = r#"
-- Data providers (e.g. NCBI Gene, HomoloGene)
CREATE TABLE IF NOT EXISTS sources (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

-- Assemblies, one row per species/type/version
CREATE TABLE IF NOT EXISTS maps (
    id INTEGER PRIMARY KEY,
    version_id INTEGER NOT NULL,
    type TEXT NOT NULL,
    species TEXT NOT NULL,
    scale INTEGER NOT NULL DEFAULT 1,
    taxID INTEGER,
    default_annotation INTEGER,
    UNIQUE (species, type, version_id)
);

CREATE TABLE IF NOT EXISTS chromosomes (
    id INTEGER PRIMARY KEY,
    map_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    length INTEGER NOT NULL DEFAULT 0,
    UNIQUE (map_id, name),
    FOREIGN KEY (map_id) REFERENCES maps(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS annotation_sets (
    id INTEGER PRIMARY KEY,
    map_id INTEGER NOT NULL,
    version_id INTEGER NOT NULL,
    type TEXT NOT NULL,
    UNIQUE (map_id, version_id, type),
    FOREIGN KEY (map_id) REFERENCES maps(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS annotation (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    chromosome_id INTEGER NOT NULL,
    annotation_set_id INTEGER NOT NULL,
    start INTEGER NOT NULL,
    stop INTEGER NOT NULL,
    source_id INTEGER,
    source_ref_id TEXT,
    FOREIGN KEY (chromosome_id) REFERENCES chromosomes(id) ON DELETE CASCADE,
    FOREIGN KEY (annotation_set_id) REFERENCES annotation_sets(id) ON DELETE CASCADE,
    FOREIGN KEY (source_id) REFERENCES sources(id)
);

-- Attribute keys (e.g. EntrezGeneId, homologene_id)
CREATE TABLE IF NOT EXISTS attributes (
    id INTEGER PRIMARY KEY,
    type TEXT NOT NULL UNIQUE
);

-- Attribute values, content-addressed by hash of the literal
CREATE TABLE IF NOT EXISTS vals (
    id INTEGER PRIMARY KEY,
    value TEXT NOT NULL,
    hash TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS annotation_avps (
    annotation_id INTEGER NOT NULL,
    attribute_id INTEGER NOT NULL,
    value_id INTEGER NOT NULL,
    PRIMARY KEY (annotation_id, attribute_id, value_id),
    FOREIGN KEY (annotation_id) REFERENCES annotation(id) ON DELETE CASCADE,
    FOREIGN KEY (attribute_id) REFERENCES attributes(id),
    FOREIGN KEY (value_id) REFERENCES vals(id)
);

-- Link groups: `id` is the group id shared by every member
CREATE TABLE IF NOT EXISTS links (
    id INTEGER NOT NULL,
    annotation_id INTEGER NOT NULL UNIQUE,
    source_id INTEGER NOT NULL,
    FOREIGN KEY (annotation_id) REFERENCES annotation(id) ON DELETE CASCADE,
    FOREIGN KEY (source_id) REFERENCES sources(id)
);

CREATE TABLE IF NOT EXISTS synteny (
    left_id INTEGER NOT NULL,
    right_id INTEGER NOT NULL,
    left_start_id INTEGER NOT NULL,
    left_stop_id INTEGER NOT NULL,
    right_start_id INTEGER NOT NULL,
    right_stop_id INTEGER NOT NULL,
    CHECK (left_start_id <> left_stop_id),
    CHECK (right_start_id <> right_stop_id),
    FOREIGN KEY (left_id) REFERENCES chromosomes(id),
    FOREIGN KEY (right_id) REFERENCES chromosomes(id)
);
"#;

/// Indexes backing the per-window anchor lookups and link joins.
pub const ANCHOR_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_annotation_window
    ON annotation(annotation_set_id, chromosome_id, start, stop);
CREATE INDEX IF NOT EXISTS idx_annotation_source_ref
    ON annotation(source_id, source_ref_id);
CREATE INDEX IF NOT EXISTS idx_links_group ON links(id);
CREATE INDEX IF NOT EXISTS idx_avps_attribute_value ON annotation_avps(attribute_id, value_id);
CREATE INDEX IF NOT EXISTS idx_synteny_pair ON synteny(left_id, right_id);
"#;
