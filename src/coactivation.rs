//! Coactivation engine — durable job queue and reconciliation worker.
//!
//! When a query returns, the memories that appeared together are recorded
//! as one `coactivation_jobs` row (a single insert on the query path). A
//! worker later maps each memory to its owning waypoints and accumulates
//! edge weight between every pair, stamping `last_activated_at`. Failed
//! jobs are re-enqueued with exponential backoff and marked `failed` after
//! the retry budget.
//!
//! An in-memory buffer flushed on an interval loses data on crash and
//! grows unbounded; the durable queue is the default (`cron` mode), with
//! `interval` kept for compatibility and `disabled` as an off switch.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::config::CoactivationConfig;
use crate::db::now_ms;
use crate::error::Result;
use crate::hsg::waypoint;

/// Weight added to each co-activated waypoint pair per job.
const EDGE_INCREMENT: f64 = 1.0;

/// Payload of one coactivation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoactivationPayload {
    /// (memory id, sector) pairs that appeared together in one result set.
    pub activations: Vec<(String, String)>,
    /// Query completion time, epoch ms.
    pub queried_at: i64,
}

/// A claimed job row.
#[derive(Debug)]
pub struct Job {
    pub id: String,
    pub payload: CoactivationPayload,
    pub retries: u32,
}

/// Operating mode, parsed from `COACTIVATION_MODE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Durable queue drained by a worker. Recommended.
    Cron,
    /// Legacy in-memory buffer flushed periodically.
    Interval,
    Disabled,
}

impl Mode {
    pub fn parse(s: &str) -> Self {
        match s {
            "interval" => Self::Interval,
            "disabled" => Self::Disabled,
            _ => Self::Cron,
        }
    }
}

/// Enqueue a durable job. One insert; the query path pays nothing else.
pub fn enqueue(conn: &Connection, payload: &CoactivationPayload) -> Result<String> {
    let id = uuid::Uuid::now_v7().to_string();
    let now = now_ms();
    conn.execute(
        "INSERT INTO coactivation_jobs (id, status, payload, retries, run_after, enqueued_at, updated_at) \
         VALUES (?1, 'pending', ?2, 0, 0, ?3, ?3)",
        params![id, serde_json::to_string(payload)?, now],
    )?;
    Ok(id)
}

/// Claim up to `limit` due pending jobs, marking them running.
pub fn claim_batch(conn: &mut Connection, limit: usize) -> Result<Vec<Job>> {
    let now = now_ms();
    let tx = conn.transaction()?;

    let rows: Vec<(String, String, u32)> = {
        let mut stmt = tx.prepare(
            "SELECT id, payload, retries FROM coactivation_jobs \
             WHERE status = 'pending' AND run_after <= ?1 \
             ORDER BY enqueued_at LIMIT ?2",
        )?;
        let result = stmt.query_map(params![now, limit as i64], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
        result
    };

    let mut jobs = Vec::with_capacity(rows.len());
    for (id, payload_json, retries) in rows {
        tx.execute(
            "UPDATE coactivation_jobs SET status = 'running', updated_at = ?1 WHERE id = ?2",
            params![now, id],
        )?;
        match serde_json::from_str(&payload_json) {
            Ok(payload) => jobs.push(Job { id, payload, retries }),
            Err(e) => {
                // A payload that cannot parse will never succeed; fail it now.
                tx.execute(
                    "UPDATE coactivation_jobs SET status = 'failed', last_error = ?1, updated_at = ?2 \
                     WHERE id = ?3",
                    params![format!("unparsable payload: {e}"), now, id],
                )?;
            }
        }
    }
    tx.commit()?;
    Ok(jobs)
}

/// Reconcile one job: bump the edge between every unordered pair of
/// waypoints owning the co-activated memories.
pub fn process_job(conn: &Connection, job: &Job) -> Result<usize> {
    let memory_ids: Vec<&str> = job
        .payload
        .activations
        .iter()
        .map(|(id, _)| id.as_str())
        .collect();
    let owners = waypoint::owners(conn, &memory_ids)?;

    // Distinct owning waypoints, sorted for deterministic pair order.
    let mut waypoint_ids: Vec<&str> = owners.values().map(|w| w.id.as_str()).collect();
    waypoint_ids.sort_unstable();
    waypoint_ids.dedup();

    let mut bumped = 0;
    for i in 0..waypoint_ids.len() {
        for j in (i + 1)..waypoint_ids.len() {
            waypoint::bump_edge(
                conn,
                waypoint_ids[i],
                waypoint_ids[j],
                EDGE_INCREMENT,
                job.payload.queried_at,
            )?;
            bumped += 1;
        }
    }
    Ok(bumped)
}

pub fn mark_done(conn: &Connection, job_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE coactivation_jobs SET status = 'done', updated_at = ?1 WHERE id = ?2",
        params![now_ms(), job_id],
    )?;
    Ok(())
}

/// Record a failure: re-enqueue with exponential backoff, or mark failed
/// once the retry budget is spent.
pub fn mark_failed(
    conn: &Connection,
    job: &Job,
    error: &str,
    config: &CoactivationConfig,
) -> Result<()> {
    let now = now_ms();
    let retries = job.retries + 1;
    if retries > config.max_retries {
        tracing::error!(job = %job.id, retries, error, "coactivation job exhausted retries");
        conn.execute(
            "UPDATE coactivation_jobs SET status = 'failed', retries = ?1, last_error = ?2, updated_at = ?3 \
             WHERE id = ?4",
            params![retries, error, now, job.id],
        )?;
    } else {
        let backoff_ms = (config.backoff_base_secs * 1000).saturating_mul(1 << retries.min(16));
        conn.execute(
            "UPDATE coactivation_jobs SET status = 'pending', retries = ?1, last_error = ?2, \
             run_after = ?3, updated_at = ?4 WHERE id = ?5",
            params![retries, error, now + backoff_ms as i64, now, job.id],
        )?;
    }
    Ok(())
}

/// Drain due jobs once. Returns the number of jobs completed.
pub fn drain_once(conn: &mut Connection, config: &CoactivationConfig) -> Result<usize> {
    let jobs = claim_batch(conn, config.batch_size)?;
    let mut done = 0;
    for job in &jobs {
        match process_job(conn, job) {
            Ok(edges) => {
                mark_done(conn, &job.id)?;
                tracing::debug!(job = %job.id, edges, "coactivation job done");
                done += 1;
            }
            Err(e) => {
                mark_failed(conn, job, &e.to_string(), config)?;
            }
        }
    }
    Ok(done)
}

/// Long-running worker loop for `cron` mode. Polls the queue on an
/// interval; exits when the connection handle is dropped by shutdown.
pub async fn run_worker(db: Arc<Mutex<Connection>>, config: CoactivationConfig) {
    let poll = std::time::Duration::from_secs(config.poll_interval_secs.max(1));
    tracing::info!(interval = ?poll, "coactivation worker started");
    loop {
        let db = Arc::clone(&db);
        let cfg = config.clone();
        let drained = tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|_| crate::error::MemoryError::Internal("db lock poisoned".into()))?;
            drain_once(&mut conn, &cfg)
        })
        .await;

        match drained {
            Ok(Ok(n)) if n > 0 => tracing::debug!(jobs = n, "coactivation batch reconciled"),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "coactivation drain failed"),
            Err(e) => {
                tracing::error!(error = %e, "coactivation worker task panicked");
                break;
            }
        }
        tokio::time::sleep(poll).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::hsg::insert::{insert_memory, MemoryDraft};
    use crate::hsg::types::{Classification, Sector};
    use crate::index::linear::LinearIndex;

    fn test_db() -> Connection {
        db::open_memory_database().unwrap()
    }

    fn spike(seed: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; 16];
        v[seed % 16] = 1.0;
        v
    }

    fn store(conn: &mut Connection, seed: usize) -> String {
        let index = LinearIndex::new(16, 8);
        insert_memory(
            conn,
            &index,
            &MemoryDraft {
                content: format!("memory {seed}"),
                user: None,
                tags: vec![],
                metadata: None,
            },
            &spike(seed),
            &Classification {
                primary: Sector::Semantic,
                sectors: vec![Sector::Semantic],
            },
            &crate::config::HsgConfig::default(),
        )
        .unwrap()
        .id
    }

    fn payload(ids: &[&str]) -> CoactivationPayload {
        CoactivationPayload {
            activations: ids.iter().map(|id| (id.to_string(), "semantic".to_string())).collect(),
            queried_at: 12345,
        }
    }

    #[test]
    fn enqueue_claim_process_done() {
        let mut conn = test_db();
        // Two memories in different waypoints (orthogonal vectors).
        let a = store(&mut conn, 0);
        let b = store(&mut conn, 8);

        enqueue(&conn, &payload(&[&a, &b])).unwrap();

        let config = CoactivationConfig::default();
        let done = drain_once(&mut conn, &config).unwrap();
        assert_eq!(done, 1);

        let (weight, at): (f64, i64) = conn
            .query_row(
                "SELECT weight, last_activated_at FROM waypoint_edges",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert!((weight - EDGE_INCREMENT).abs() < 1e-9);
        assert_eq!(at, 12345);

        let status: String = conn
            .query_row("SELECT status FROM coactivation_jobs", [], |r| r.get(0))
            .unwrap();
        assert_eq!(status, "done");
    }

    #[test]
    fn repeated_jobs_accumulate_weight() {
        let mut conn = test_db();
        let a = store(&mut conn, 0);
        let b = store(&mut conn, 8);

        enqueue(&conn, &payload(&[&a, &b])).unwrap();
        enqueue(&conn, &payload(&[&a, &b])).unwrap();
        drain_once(&mut conn, &CoactivationConfig::default()).unwrap();

        let weight: f64 = conn
            .query_row("SELECT weight FROM waypoint_edges", [], |r| r.get(0))
            .unwrap();
        assert!((weight - 2.0 * EDGE_INCREMENT).abs() < 1e-9);
    }

    #[test]
    fn single_waypoint_job_creates_no_edges() {
        let mut conn = test_db();
        let a = store(&mut conn, 0);

        enqueue(&conn, &payload(&[&a])).unwrap();
        drain_once(&mut conn, &CoactivationConfig::default()).unwrap();

        let edges: i64 = conn
            .query_row("SELECT COUNT(*) FROM waypoint_edges", [], |r| r.get(0))
            .unwrap();
        assert_eq!(edges, 0);
    }

    #[test]
    fn unparsable_payload_fails_immediately() {
        let mut conn = test_db();
        conn.execute(
            "INSERT INTO coactivation_jobs (id, status, payload, enqueued_at, updated_at) \
             VALUES ('bad', 'pending', 'not json', 0, 0)",
            [],
        )
        .unwrap();

        let jobs = claim_batch(&mut conn, 10).unwrap();
        assert!(jobs.is_empty());

        let status: String = conn
            .query_row("SELECT status FROM coactivation_jobs WHERE id = 'bad'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(status, "failed");
    }

    #[test]
    fn failure_backs_off_then_exhausts() {
        let conn = test_db();
        let config = CoactivationConfig {
            max_retries: 2,
            ..Default::default()
        };
        let job = Job {
            id: "j1".into(),
            payload: payload(&[]),
            retries: 0,
        };
        conn.execute(
            "INSERT INTO coactivation_jobs (id, status, payload, enqueued_at, updated_at) \
             VALUES ('j1', 'running', '{}', 0, 0)",
            [],
        )
        .unwrap();

        mark_failed(&conn, &job, "boom", &config).unwrap();
        let (status, retries, run_after): (String, u32, i64) = conn
            .query_row(
                "SELECT status, retries, run_after FROM coactivation_jobs WHERE id = 'j1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(status, "pending");
        assert_eq!(retries, 1);
        assert!(run_after > now_ms());

        // Exhaust the budget.
        let job = Job {
            id: "j1".into(),
            payload: payload(&[]),
            retries: 2,
        };
        mark_failed(&conn, &job, "boom again", &config).unwrap();
        let (status, last_error): (String, String) = conn
            .query_row(
                "SELECT status, last_error FROM coactivation_jobs WHERE id = 'j1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(status, "failed");
        assert_eq!(last_error, "boom again");
    }

    #[test]
    fn backed_off_jobs_are_not_claimed_early() {
        let conn = test_db();
        conn.execute(
            "INSERT INTO coactivation_jobs (id, status, payload, run_after, enqueued_at, updated_at) \
             VALUES ('later', 'pending', '{\"activations\":[],\"queried_at\":0}', ?1, 0, 0)",
            params![now_ms() + 60_000],
        )
        .unwrap();

        let mut conn = conn;
        let jobs = claim_batch(&mut conn, 10).unwrap();
        assert!(jobs.is_empty());
    }

    #[test]
    fn mode_parses_with_cron_default() {
        assert_eq!(Mode::parse("cron"), Mode::Cron);
        assert_eq!(Mode::parse("interval"), Mode::Interval);
        assert_eq!(Mode::parse("disabled"), Mode::Disabled);
        assert_eq!(Mode::parse("anything-else"), Mode::Cron);
    }
}
