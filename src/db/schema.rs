//! SQL DDL for all mnema tables.
//!
//! Defines `memories`, `vectors`, `waypoints`, `waypoint_edges`,
//! `temporal_facts`, `temporal_edges`, `coactivation_jobs`, and
//! `schema_meta`. All DDL uses `IF NOT EXISTS` for idempotent
//! initialization. Timestamps are INTEGER milliseconds since the epoch.

use rusqlite::Connection;

/// All schema DDL statements for mnema's core tables.
const SCHEMA_SQL: &str = r#"
-- Memory rows (HSG unit)
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL DEFAULT 'anonymous',
    content TEXT NOT NULL,
    primary_sector TEXT NOT NULL CHECK(primary_sector IN ('episodic','semantic','procedural','emotional','reflective')),
    sectors TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    metadata TEXT,
    salience REAL NOT NULL DEFAULT 0.5 CHECK(salience >= 0.0 AND salience <= 1.0),
    created_at INTEGER NOT NULL,
    last_seen_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memories_user ON memories(user_id);
CREATE INDEX IF NOT EXISTS idx_memories_primary ON memories(primary_sector);
CREATE INDEX IF NOT EXISTS idx_memories_salience ON memories(salience);

-- Vector rows: one per (memory, sector). Vectors are f32 little-endian blobs.
-- partition = hash(user_id) mod P, maintained for the approximate backend.
CREATE TABLE IF NOT EXISTS vectors (
    id TEXT NOT NULL,
    sector TEXT NOT NULL,
    user_id TEXT NOT NULL,
    partition INTEGER NOT NULL DEFAULT 0,
    dim INTEGER NOT NULL,
    v BLOB NOT NULL,
    PRIMARY KEY (id, sector)
);

CREATE INDEX IF NOT EXISTS idx_vectors_sector_user ON vectors(sector, user_id);
CREATE INDEX IF NOT EXISTS idx_vectors_sector_partition ON vectors(sector, partition);

-- Waypoints: centroid-summarized clusters, one sector each.
CREATE TABLE IF NOT EXISTS waypoints (
    id TEXT PRIMARY KEY,
    sector TEXT NOT NULL,
    mean_v BLOB NOT NULL,
    member_ids TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_waypoints_sector ON waypoints(sector);

-- Undirected waypoint edges, normalized a < b. Weight only accumulates.
CREATE TABLE IF NOT EXISTS waypoint_edges (
    a TEXT NOT NULL,
    b TEXT NOT NULL,
    weight REAL NOT NULL DEFAULT 0.0 CHECK(weight >= 0.0),
    last_activated_at INTEGER NOT NULL,
    PRIMARY KEY (a, b),
    CHECK (a < b)
);

-- Validity-bounded subject-predicate-object facts.
CREATE TABLE IF NOT EXISTS temporal_facts (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL DEFAULT 'anonymous',
    subject TEXT NOT NULL,
    predicate TEXT NOT NULL,
    object TEXT NOT NULL,
    valid_from INTEGER NOT NULL,
    valid_to INTEGER,
    confidence REAL NOT NULL DEFAULT 1.0 CHECK(confidence >= 0.0 AND confidence <= 1.0),
    last_updated INTEGER NOT NULL,
    metadata TEXT,
    CHECK (valid_to IS NULL OR valid_from <= valid_to)
);

CREATE INDEX IF NOT EXISTS idx_facts_subject ON temporal_facts(subject);
CREATE INDEX IF NOT EXISTS idx_facts_object ON temporal_facts(object);
CREATE INDEX IF NOT EXISTS idx_facts_predicate_from ON temporal_facts(predicate, valid_from);
CREATE INDEX IF NOT EXISTS idx_facts_user ON temporal_facts(user_id);
CREATE INDEX IF NOT EXISTS idx_facts_confidence ON temporal_facts(confidence);

-- Typed edges between facts, validity-bounded like the facts themselves.
CREATE TABLE IF NOT EXISTS temporal_edges (
    source_id TEXT NOT NULL REFERENCES temporal_facts(id) ON DELETE CASCADE,
    target_id TEXT NOT NULL REFERENCES temporal_facts(id) ON DELETE CASCADE,
    relation_type TEXT NOT NULL,
    weight REAL NOT NULL DEFAULT 1.0,
    valid_from INTEGER NOT NULL,
    valid_to INTEGER,
    user_id TEXT NOT NULL DEFAULT 'anonymous',
    PRIMARY KEY (source_id, target_id, relation_type)
);

CREATE INDEX IF NOT EXISTS idx_temporal_edges_source ON temporal_edges(source_id);

-- Durable coactivation queue. run_after implements retry backoff.
CREATE TABLE IF NOT EXISTS coactivation_jobs (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending','running','done','failed')),
    payload TEXT NOT NULL,
    retries INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    run_after INTEGER NOT NULL DEFAULT 0,
    enqueued_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_status_run_after ON coactivation_jobs(status, run_after);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
