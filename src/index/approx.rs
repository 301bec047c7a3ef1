//! Approximate-graph backend (HNSW).
//!
//! Rows persist in the same `vectors` table as the exact backend; search
//! goes through an in-memory HNSW built per (sector, partition). The HNSW
//! cannot pre-filter by user, so queries over-fetch `k · F` neighbors and
//! post-filter inside the partition. Users are hash-partitioned so a scoped
//! query touches one partition's index only.
//!
//! Indexes are rebuilt lazily: writes mark the touched (sector, partition)
//! dirty and the next search rebuilds it from the table.

use dashmap::DashMap;
use instant_distance::{Builder, HnswMap, Point, Search};
use parking_lot::RwLock;
use rusqlite::Connection;
use std::collections::HashMap;

use super::{
    check_dim, cosine_similarity, delete_rows, get_row, partition_of, rows_by_sector, rows_where,
    upsert_row, SearchHit, SearchOutcome, VectorIndex, VectorRow,
};
use crate::error::Result;
use crate::hsg::types::{Sector, ANONYMOUS_USER};

#[derive(Clone)]
struct IndexPoint(Vec<f32>);

impl Point for IndexPoint {
    fn distance(&self, other: &Self) -> f32 {
        // HNSW minimizes; cosine distance = 1 - similarity.
        1.0 - cosine_similarity(&self.0, &other.0)
    }
}

#[derive(Clone)]
struct RowMeta {
    id: String,
    user_id: String,
}

pub struct ApproxIndex {
    dim: usize,
    overfetch: usize,
    partitions: u32,
    built: RwLock<HashMap<(Sector, u32), Option<HnswMap<IndexPoint, RowMeta>>>>,
    dirty: DashMap<(Sector, u32), ()>,
}

impl ApproxIndex {
    pub fn new(dim: usize, overfetch: usize, partitions: u32) -> Self {
        Self {
            dim,
            overfetch: overfetch.max(1),
            partitions: partitions.max(1),
            built: RwLock::new(HashMap::new()),
            dirty: DashMap::new(),
        }
    }

    fn mark_dirty(&self, sector: Sector, partition: u32) {
        self.dirty.insert((sector, partition), ());
    }

    /// Rebuild the (sector, partition) index from the table if it is dirty
    /// or has never been built.
    fn ensure_built(&self, conn: &Connection, sector: Sector, partition: u32) -> Result<()> {
        let key = (sector, partition);
        let needs_build =
            self.dirty.contains_key(&key) || !self.built.read().contains_key(&key);
        if !needs_build {
            return Ok(());
        }

        let rows = rows_where(
            conn,
            "SELECT id, sector, user_id, partition, v FROM vectors \
             WHERE sector = ?1 AND partition = ?2",
            &[&sector.as_str(), &partition],
        )?;

        let map = if rows.is_empty() {
            None
        } else {
            let (points, values): (Vec<IndexPoint>, Vec<RowMeta>) = rows
                .into_iter()
                .map(|row| {
                    (
                        IndexPoint(row.vector),
                        RowMeta {
                            id: row.id,
                            user_id: row.user_id,
                        },
                    )
                })
                .unzip();
            Some(Builder::default().ef_construction(100).build(points, values))
        };

        self.built.write().insert(key, map);
        self.dirty.remove(&key);
        Ok(())
    }

    fn search_partition(
        &self,
        query: &[f32],
        sector: Sector,
        partition: u32,
        fetch: usize,
        user: Option<&str>,
    ) -> Vec<SearchHit> {
        let built = self.built.read();
        let map = match built.get(&(sector, partition)) {
            Some(Some(map)) => map,
            _ => return Vec::new(),
        };

        let query_point = IndexPoint(query.to_vec());
        let mut search = Search::default();
        map.search(&query_point, &mut search)
            .take(fetch)
            .filter(|item| match user {
                Some(u) => item.value.user_id == u,
                None => true,
            })
            .map(|item| SearchHit {
                id: item.value.id.clone(),
                score: cosine_similarity(query, &item.point.0),
            })
            .collect()
    }

    /// The partition a prior row of (id, sector) lives in, if any. A user
    /// change on upsert moves the row between partitions; both need a
    /// rebuild.
    fn existing_partition(conn: &Connection, id: &str, sector: Sector) -> Option<u32> {
        conn.query_row(
            "SELECT partition FROM vectors WHERE id = ?1 AND sector = ?2",
            rusqlite::params![id, sector.as_str()],
            |row| row.get(0),
        )
        .ok()
    }
}

impl VectorIndex for ApproxIndex {
    fn upsert(
        &self,
        conn: &Connection,
        id: &str,
        sector: Sector,
        user: Option<&str>,
        vector: &[f32],
    ) -> Result<()> {
        check_dim(self.dim, vector)?;
        let partition = partition_of(user.unwrap_or(ANONYMOUS_USER), self.partitions);

        if let Some(old) = Self::existing_partition(conn, id, sector) {
            if old != partition {
                self.mark_dirty(sector, old);
            }
        }

        upsert_row(conn, id, sector, user, partition, vector)?;
        self.mark_dirty(sector, partition);
        Ok(())
    }

    fn delete(&self, conn: &Connection, id: &str, sector: Option<Sector>) -> Result<()> {
        for (s, p) in delete_rows(conn, id, sector)? {
            self.mark_dirty(s, p);
        }
        Ok(())
    }

    fn search(
        &self,
        conn: &Connection,
        sector: Sector,
        query: &[f32],
        k: usize,
        user: Option<&str>,
    ) -> Result<SearchOutcome> {
        check_dim(self.dim, query)?;
        let fetch = k.saturating_mul(self.overfetch).max(k);

        let mut hits = match user {
            Some(u) => {
                let partition = partition_of(u, self.partitions);
                self.ensure_built(conn, sector, partition)?;
                self.search_partition(query, sector, partition, fetch, user)
            }
            None => {
                // Unscoped query: merge every partition.
                let mut all = Vec::new();
                for partition in 0..self.partitions {
                    self.ensure_built(conn, sector, partition)?;
                    all.extend(self.search_partition(query, sector, partition, fetch, None));
                }
                all
            }
        };

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);

        let degraded = hits.len() < k;
        Ok(SearchOutcome { hits, degraded })
    }

    fn get(&self, conn: &Connection, id: &str, sector: Sector) -> Result<Option<Vec<f32>>> {
        get_row(conn, id, sector)
    }

    fn by_sector(&self, conn: &Connection, sector: Sector) -> Result<Vec<VectorRow>> {
        rows_by_sector(conn, sector)
    }
}
