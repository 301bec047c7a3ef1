//! Memory deletion and store-wide wipe.
//!
//! Deleting a memory cascades: the memory row, every sector vector row, and
//! its entries in waypoint member sets (the waypoint survives unless it
//! becomes empty). Wipe clears the store, or just one user's slice of it
//! when a scope is given.

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::index::VectorIndex;

use super::waypoint;

/// Delete one memory with full cascade. Ownership is verified when a user
/// scope is given; a mismatch reads as NotFound.
pub fn delete_memory(
    conn: &mut Connection,
    index: &dyn VectorIndex,
    id: &str,
    user: Option<&str>,
) -> Result<()> {
    // Existence + ownership gate.
    super::get_memory(conn, id, user)?;

    let tx = conn.transaction()?;
    index.delete(&tx, id, None)?;
    waypoint::remove_member(&tx, id)?;
    tx.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
    tx.commit()?;

    tracing::info!(id = %id, "memory deleted");
    Ok(())
}

/// Counts removed by a wipe.
#[derive(Debug, serde::Serialize)]
pub struct WipeResult {
    pub memories: usize,
    pub vectors: usize,
    pub facts: usize,
}

/// Remove all memories, vectors, waypoints, edges, and facts — or only the
/// given user's rows. The global wipe also clears the coactivation queue;
/// a scoped wipe leaves other tenants' jobs untouched.
pub fn wipe(conn: &mut Connection, index: &dyn VectorIndex, user: Option<&str>) -> Result<WipeResult> {
    match user {
        None => {
            let tx = conn.transaction()?;
            let memories = tx.execute("DELETE FROM memories", [])?;
            let vectors = tx.execute("DELETE FROM vectors", [])?;
            tx.execute("DELETE FROM waypoints", [])?;
            tx.execute("DELETE FROM waypoint_edges", [])?;
            let facts = tx.execute("DELETE FROM temporal_facts", [])?;
            tx.execute("DELETE FROM temporal_edges", [])?;
            tx.execute("DELETE FROM coactivation_jobs", [])?;
            tx.commit()?;
            tracing::warn!(memories, vectors, facts, "store wiped");
            Ok(WipeResult { memories, vectors, facts })
        }
        Some(u) => {
            // Per-user wipe goes through the cascade so waypoint member
            // sets and the in-memory index stay consistent.
            let ids: Vec<String> = {
                let mut stmt = conn.prepare("SELECT id FROM memories WHERE user_id = ?1")?;
                let rows = stmt
                    .query_map(params![u], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            };
            let memories = ids.len();
            let vectors: usize = conn
                .query_row(
                    "SELECT COUNT(*) FROM vectors WHERE user_id = ?1",
                    params![u],
                    |r| r.get::<_, i64>(0),
                )? as usize;
            for id in &ids {
                delete_memory(conn, index, id, Some(u))?;
            }
            let facts = conn.execute("DELETE FROM temporal_facts WHERE user_id = ?1", params![u])?;
            conn.execute("DELETE FROM temporal_edges WHERE user_id = ?1", params![u])?;
            tracing::warn!(user = %u, memories, facts, "user slice wiped");
            Ok(WipeResult {
                memories,
                vectors,
                facts,
            })
        }
    }
}
