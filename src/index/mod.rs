//! Pluggable vector index over the `vectors` table.
//!
//! Two backends implement [`VectorIndex`]: [`linear::LinearIndex`] pre-filters
//! by (sector, user) in SQL and computes exact cosine in process;
//! [`approx::ApproxIndex`] keeps an in-memory HNSW per (sector, partition),
//! over-fetches, and post-filters. Both persist rows identically, so the
//! backend can be switched without rewriting data.

pub mod approx;
pub mod linear;

use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;

use crate::error::{MemoryError, Result};
use crate::hsg::types::{Sector, ANONYMOUS_USER};

/// One stored vector row.
#[derive(Debug, Clone)]
pub struct VectorRow {
    pub id: String,
    pub sector: Sector,
    pub user_id: String,
    pub partition: u32,
    pub vector: Vec<f32>,
}

/// A single nearest-neighbor hit.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    /// Cosine similarity in [-1, 1].
    pub score: f32,
}

/// Search outcome. `degraded` is set when the approximate backend could not
/// fill `k` results after over-fetching — callers must tolerate short lists.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub hits: Vec<SearchHit>,
    pub degraded: bool,
}

/// Contract for vector storage and similarity search. All operations are
/// scoped by sector; `upsert` is idempotent on (id, sector) with last write
/// winning.
pub trait VectorIndex: Send + Sync {
    fn upsert(
        &self,
        conn: &Connection,
        id: &str,
        sector: Sector,
        user: Option<&str>,
        vector: &[f32],
    ) -> Result<()>;

    /// Remove one sector row, or all sector rows of `id` when `sector` is
    /// `None`.
    fn delete(&self, conn: &Connection, id: &str, sector: Option<Sector>) -> Result<()>;

    fn search(
        &self,
        conn: &Connection,
        sector: Sector,
        query: &[f32],
        k: usize,
        user: Option<&str>,
    ) -> Result<SearchOutcome>;

    fn get(&self, conn: &Connection, id: &str, sector: Sector) -> Result<Option<Vec<f32>>>;

    /// All rows of a sector, for offline iteration.
    fn by_sector(&self, conn: &Connection, sector: Sector) -> Result<Vec<VectorRow>>;
}

/// Build the configured backend.
pub fn create_index(config: &crate::config::IndexConfig, dim: usize) -> Arc<dyn VectorIndex> {
    if config.use_approx {
        Arc::new(approx::ApproxIndex::new(
            dim,
            config.overfetch_factor,
            config.partitions,
        ))
    } else {
        Arc::new(linear::LinearIndex::new(dim, config.partitions))
    }
}

// ── Shared row storage ────────────────────────────────────────────────────────

/// Serialize an f32 vector as little-endian bytes for the BLOB column.
pub fn vector_to_bytes(v: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(v.len() * 4);
    for x in v {
        bytes.extend_from_slice(&x.to_le_bytes());
    }
    bytes
}

/// Deserialize a BLOB column back into an f32 vector.
pub fn bytes_to_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

/// Cosine similarity. Mismatched lengths and zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// FNV-1a hash of the user id, reduced mod the partition count.
pub fn partition_of(user_id: &str, partitions: u32) -> u32 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in user_id.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    // partitions is a power of two, so mod is a mask.
    (hash & u64::from(partitions - 1)) as u32
}

/// Validate query/insert vector dimension against the system-wide dim.
pub fn check_dim(expected: usize, v: &[f32]) -> Result<()> {
    if v.len() != expected {
        return Err(MemoryError::InvalidInput(format!(
            "vector dimension mismatch: expected {expected}, got {}",
            v.len()
        )));
    }
    if v.iter().any(|x| !x.is_finite()) {
        return Err(MemoryError::InvalidInput(
            "vector contains NaN or infinite components".into(),
        ));
    }
    Ok(())
}

pub(crate) fn upsert_row(
    conn: &Connection,
    id: &str,
    sector: Sector,
    user: Option<&str>,
    partition: u32,
    vector: &[f32],
) -> Result<()> {
    let user_id = user.unwrap_or(ANONYMOUS_USER);
    conn.execute(
        "INSERT INTO vectors (id, sector, user_id, partition, dim, v) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
         ON CONFLICT(id, sector) DO UPDATE SET \
         user_id = excluded.user_id, partition = excluded.partition, \
         dim = excluded.dim, v = excluded.v",
        params![
            id,
            sector.as_str(),
            user_id,
            partition,
            vector.len() as i64,
            vector_to_bytes(vector),
        ],
    )?;
    Ok(())
}

pub(crate) fn delete_rows(
    conn: &Connection,
    id: &str,
    sector: Option<Sector>,
) -> Result<Vec<(Sector, u32)>> {
    // Collect affected (sector, partition) pairs first so the approximate
    // backend can invalidate the right in-memory indexes.
    let affected: Vec<(Sector, u32)> = {
        let (sql, has_sector) = match sector {
            Some(_) => ("SELECT sector, partition FROM vectors WHERE id = ?1 AND sector = ?2", true),
            None => ("SELECT sector, partition FROM vectors WHERE id = ?1", false),
        };
        let mut stmt = conn.prepare(sql)?;
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(String, u32)> {
            Ok((row.get(0)?, row.get(1)?))
        };
        let rows: Vec<(String, u32)> = if has_sector {
            stmt.query_map(params![id, sector.unwrap().as_str()], map_row)?
                .collect::<std::result::Result<_, _>>()?
        } else {
            stmt.query_map(params![id], map_row)?
                .collect::<std::result::Result<_, _>>()?
        };
        rows.into_iter()
            .filter_map(|(s, p)| s.parse::<Sector>().ok().map(|s| (s, p)))
            .collect()
    };

    match sector {
        Some(s) => {
            conn.execute(
                "DELETE FROM vectors WHERE id = ?1 AND sector = ?2",
                params![id, s.as_str()],
            )?;
        }
        None => {
            conn.execute("DELETE FROM vectors WHERE id = ?1", params![id])?;
        }
    }
    Ok(affected)
}

pub(crate) fn get_row(conn: &Connection, id: &str, sector: Sector) -> Result<Option<Vec<f32>>> {
    let bytes: Option<Vec<u8>> = conn
        .query_row(
            "SELECT v FROM vectors WHERE id = ?1 AND sector = ?2",
            params![id, sector.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(bytes.map(|b| bytes_to_vector(&b)))
}

pub(crate) fn rows_where(
    conn: &Connection,
    sql: &str,
    args: &[&dyn rusqlite::types::ToSql],
) -> Result<Vec<VectorRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(args, |row| {
            let sector_str: String = row.get(1)?;
            let bytes: Vec<u8> = row.get(4)?;
            Ok((
                row.get::<_, String>(0)?,
                sector_str,
                row.get::<_, String>(2)?,
                row.get::<_, u32>(3)?,
                bytes,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows
        .into_iter()
        .filter_map(|(id, sector_str, user_id, partition, bytes)| {
            sector_str.parse::<Sector>().ok().map(|sector| VectorRow {
                id,
                sector,
                user_id,
                partition,
                vector: bytes_to_vector(&bytes),
            })
        })
        .collect())
}

/// Rewrite the partition column for a new partition count. Run once after
/// raising `VECTOR_PARTITIONS` (e.g. 8 → 16), before serving queries with
/// the approximate backend. Returns the number of rows moved.
pub fn repartition(conn: &Connection, partitions: u32) -> Result<usize> {
    let rows: Vec<(String, String, String, u32)> = {
        let mut stmt = conn.prepare("SELECT id, sector, user_id, partition FROM vectors")?;
        let result = stmt.query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?
        .collect::<std::result::Result<_, _>>()?;
        result
    };

    let mut moved = 0;
    let mut update =
        conn.prepare("UPDATE vectors SET partition = ?1 WHERE id = ?2 AND sector = ?3")?;
    for (id, sector, user_id, old) in rows {
        let new = partition_of(&user_id, partitions);
        if new != old {
            update.execute(params![new, id, sector])?;
            moved += 1;
        }
    }
    Ok(moved)
}

pub(crate) fn rows_by_sector(conn: &Connection, sector: Sector) -> Result<Vec<VectorRow>> {
    rows_where(
        conn,
        "SELECT id, sector, user_id, partition, v FROM vectors WHERE sector = ?1",
        &[&sector.as_str()],
    )
}
