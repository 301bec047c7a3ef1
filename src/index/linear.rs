//! Exact-linear backend.
//!
//! Vectors live only in the `vectors` table. Search pre-filters by
//! (sector, user) in SQL, loads every candidate, computes cosine in
//! process, and returns the exact top-k. Latency grows linearly with the
//! candidate count; preferred for small datasets.

use rusqlite::Connection;

use super::{
    check_dim, cosine_similarity, delete_rows, get_row, partition_of, rows_by_sector, rows_where,
    upsert_row, SearchHit, SearchOutcome, VectorIndex, VectorRow,
};
use crate::error::Result;
use crate::hsg::types::{Sector, ANONYMOUS_USER};

pub struct LinearIndex {
    dim: usize,
    partitions: u32,
}

impl LinearIndex {
    pub fn new(dim: usize, partitions: u32) -> Self {
        Self {
            dim,
            partitions: partitions.max(1),
        }
    }
}

impl VectorIndex for LinearIndex {
    fn upsert(
        &self,
        conn: &Connection,
        id: &str,
        sector: Sector,
        user: Option<&str>,
        vector: &[f32],
    ) -> Result<()> {
        check_dim(self.dim, vector)?;
        // The partition column is maintained even here so a later switch to
        // the approximate backend reuses the data unchanged.
        let partition = partition_of(user.unwrap_or(ANONYMOUS_USER), self.partitions);
        upsert_row(conn, id, sector, user, partition, vector)
    }

    fn delete(&self, conn: &Connection, id: &str, sector: Option<Sector>) -> Result<()> {
        delete_rows(conn, id, sector)?;
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

        let candidates = match user {
            Some(u) => rows_where(
                conn,
                "SELECT id, sector, user_id, partition, v FROM vectors \
                 WHERE sector = ?1 AND user_id = ?2",
                &[&sector.as_str(), &u],
            )?,
            None => rows_by_sector(conn, sector)?,
        };

        let mut hits: Vec<SearchHit> = candidates
            .iter()
            .map(|row| SearchHit {
                id: row.id.clone(),
                score: cosine_similarity(query, &row.vector),
            })
            .collect();

        // Score descending; ties broken by id ascending for stable order.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);

        Ok(SearchOutcome {
            hits,
            degraded: false,
        })
    }

    fn get(&self, conn: &Connection, id: &str, sector: Sector) -> Result<Option<Vec<f32>>> {
        get_row(conn, id, sector)
    }

    fn by_sector(&self, conn: &Connection, sector: Sector) -> Result<Vec<VectorRow>> {
        rows_by_sector(conn, sector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn test_db() -> Connection {
        db::open_memory_database().unwrap()
    }

    /// Unit vector with a spike at `seed`.
    fn spike(seed: usize, dim: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; dim];
        v[seed % dim] = 1.0;
        v
    }

    #[test]
    fn upsert_then_search_finds_nearest() {
        let conn = test_db();
        let index = LinearIndex::new(8, 8);

        index.upsert(&conn, "a", Sector::Semantic, Some("alice"), &spike(0, 8)).unwrap();
        index.upsert(&conn, "b", Sector::Semantic, Some("alice"), &spike(3, 8)).unwrap();

        let out = index
            .search(&conn, Sector::Semantic, &spike(0, 8), 10, Some("alice"))
            .unwrap();
        assert!(!out.degraded);
        assert_eq!(out.hits.len(), 2);
        assert_eq!(out.hits[0].id, "a");
        assert!((out.hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn upsert_is_idempotent_last_write_wins() {
        let conn = test_db();
        let index = LinearIndex::new(8, 8);

        index.upsert(&conn, "a", Sector::Semantic, Some("alice"), &spike(0, 8)).unwrap();
        index.upsert(&conn, "a", Sector::Semantic, Some("alice"), &spike(5, 8)).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM vectors WHERE id = 'a'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);

        let v = index.get(&conn, "a", Sector::Semantic).unwrap().unwrap();
        assert_eq!(v, spike(5, 8));
    }

    #[test]
    fn same_id_may_have_multiple_sector_rows() {
        let conn = test_db();
        let index = LinearIndex::new(8, 8);

        index.upsert(&conn, "a", Sector::Semantic, None, &spike(0, 8)).unwrap();
        index.upsert(&conn, "a", Sector::Episodic, None, &spike(0, 8)).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM vectors WHERE id = 'a'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn search_prefilters_by_user() {
        let conn = test_db();
        let index = LinearIndex::new(8, 8);

        index.upsert(&conn, "alice-1", Sector::Semantic, Some("alice"), &spike(0, 8)).unwrap();
        index.upsert(&conn, "bob-1", Sector::Semantic, Some("bob"), &spike(0, 8)).unwrap();

        let out = index
            .search(&conn, Sector::Semantic, &spike(0, 8), 10, Some("alice"))
            .unwrap();
        assert_eq!(out.hits.len(), 1);
        assert_eq!(out.hits[0].id, "alice-1");
    }

    #[test]
    fn delete_one_sector_or_all() {
        let conn = test_db();
        let index = LinearIndex::new(8, 8);

        index.upsert(&conn, "a", Sector::Semantic, None, &spike(0, 8)).unwrap();
        index.upsert(&conn, "a", Sector::Episodic, None, &spike(0, 8)).unwrap();

        index.delete(&conn, "a", Some(Sector::Semantic)).unwrap();
        assert!(index.get(&conn, "a", Sector::Semantic).unwrap().is_none());
        assert!(index.get(&conn, "a", Sector::Episodic).unwrap().is_some());

        index.delete(&conn, "a", None).unwrap();
        assert!(index.get(&conn, "a", Sector::Episodic).unwrap().is_none());
    }

    #[test]
    fn ties_break_by_id_ascending() {
        let conn = test_db();
        let index = LinearIndex::new(8, 8);

        // Identical vectors, identical scores
        index.upsert(&conn, "zed", Sector::Semantic, None, &spike(0, 8)).unwrap();
        index.upsert(&conn, "abe", Sector::Semantic, None, &spike(0, 8)).unwrap();

        let out = index.search(&conn, Sector::Semantic, &spike(0, 8), 10, None).unwrap();
        assert_eq!(out.hits[0].id, "abe");
        assert_eq!(out.hits[1].id, "zed");
    }

    #[test]
    fn dim_mismatch_is_invalid_input() {
        let conn = test_db();
        let index = LinearIndex::new(8, 8);
        let err = index
            .upsert(&conn, "a", Sector::Semantic, None, &[1.0, 2.0])
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }
}
