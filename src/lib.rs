//! Cognitive memory for AI agents — hierarchical semantic recall and
//! temporal facts behind one engine.
//!
//! mnema persists two kinds of agent knowledge and answers queries over
//! both:
//!
//! - **Memories**: free-form text classified into five cognitive sectors
//!   (episodic, semantic, procedural, emotional, reflective), embedded,
//!   and clustered under **waypoints** — centroid hubs whose coactivation
//!   edges enable associative recall beyond raw nearest-neighbor.
//! - **Temporal facts**: subject-predicate-object triples with validity
//!   intervals and confidence, supporting as-of, range, and conflict
//!   queries.
//!
//! # Architecture
//!
//! - **Storage**: SQLite; vectors as blobs searched either exactly
//!   (linear scan) or approximately (in-memory HNSW, hash-partitioned by
//!   user)
//! - **Embeddings**: pluggable providers; a deterministic synthetic
//!   embedder ships in-tree
//! - **Isolation**: every operation takes an optional user scope that is
//!   conjoined into storage queries and cache keys
//! - **Coactivation**: query-time co-occurrence is enqueued as durable
//!   jobs and reconciled into waypoint edge weights by a worker
//! - **Transport**: MCP over stdio or streamable HTTP
//!
//! # Modules
//!
//! - [`config`] — TOML configuration with environment overrides
//! - [`db`] — SQLite initialization, schema, migrations, health
//! - [`embedding`] — text-to-vector providers and tier blending
//! - [`index`] — exact and approximate vector search backends
//! - [`sector`] — rule-based sector classification
//! - [`hsg`] — memory rows, waypoints, salience, insert/query pipelines
//! - [`temporal`] — validity-bounded facts and edges
//! - [`coactivation`] — durable job queue and reconciliation worker
//! - [`api`] — the async programmatic facade ([`api::Mnema`])
//! - [`tools`] — MCP tool surface

pub mod api;
pub mod cache;
pub mod coactivation;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod hsg;
pub mod index;
pub mod router;
pub mod sector;
pub mod server;
pub mod temporal;
pub mod tools;

pub use api::Mnema;
pub use error::{Deadline, MemoryError, Result};
