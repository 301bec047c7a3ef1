//! Waypoint layer: centroid normalization, bounded expansion, and the
//! coactivation pipeline from query to edge weight.

mod helpers;

use helpers::*;
use mnema::coactivation;
use mnema::index::bytes_to_vector;

#[tokio::test]
async fn waypoint_centroids_stay_unit_length() {
    let engine = test_engine();

    // Enough related and unrelated memories to force joins and new
    // waypoints in several sectors.
    for content in [
        "rust borrow checker rules",
        "rust lifetime annotations guide",
        "rust trait objects explained",
        "gardening in spring",
        "yesterday we met about the launch",
        "how to configure the build pipeline step by step",
    ] {
        add_for(&engine, "alice", content).await;
    }

    let db = engine.db_handle();
    let conn = db.lock().unwrap();
    let mut stmt = conn.prepare("SELECT id, mean_v FROM waypoints").unwrap();
    let rows: Vec<(String, Vec<u8>)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert!(!rows.is_empty());

    for (id, bytes) in rows {
        let mean = bytes_to_vector(&bytes);
        let norm: f32 = mean.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3, "waypoint {id} norm {norm}");
    }
}

#[tokio::test]
async fn dense_graph_expansion_stays_under_the_cap() {
    let mut config = test_config();
    config.retrieval.max_expansion = 5;
    let engine = mnema::Mnema::open_in_memory(config).unwrap();

    // Three distinct memories as seeds.
    let a = add_for(&engine, "alice", "alpha topic memo").await;
    let b = add_for(&engine, "alice", "completely different beta subject").await;
    let c = add_for(&engine, "alice", "unrelated gamma theme").await;

    // Densely connect every waypoint to ten synthetic neighbors.
    {
        let db = engine.db_handle();
        let conn = db.lock().unwrap();
        let waypoint_ids: Vec<String> = {
            let mut stmt = conn.prepare("SELECT id FROM waypoints").unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .collect::<Result<_, _>>()
                .unwrap()
        };
        for wid in &waypoint_ids {
            for i in 0..10 {
                let neighbor = format!("zz-{wid}-{i}");
                let (a, b) = if wid.as_str() < neighbor.as_str() {
                    (wid.clone(), neighbor)
                } else {
                    (neighbor, wid.clone())
                };
                conn.execute(
                    "INSERT OR IGNORE INTO waypoint_edges (a, b, weight, last_activated_at) \
                     VALUES (?1, ?2, 1.0, 0)",
                    rusqlite::params![a, b],
                )
                .unwrap();
            }
        }
    }

    // The query must succeed and not blow past the visit budget: with
    // max_expansion = 5, at most 5 expanded waypoints can contribute, so
    // the result set stays bounded by real memories.
    let out = search_for(&engine, "alice", "alpha topic memo").await;
    let ids: Vec<&str> = out.results.iter().map(|r| r.memory.id.as_str()).collect();
    for id in [&a, &b, &c] {
        // Only real memories can appear; synthetic neighbor waypoints have
        // no members.
        assert!(ids.iter().all(|i| !i.starts_with("zz-")), "{id} check");
    }
}

#[tokio::test]
async fn coactivation_jobs_turn_query_results_into_edge_weight() {
    let engine = test_engine();

    // Two memories dissimilar enough to land in different waypoints but
    // sharing a query term.
    add_for(&engine, "alice", "postgres index tuning checklist").await;
    add_for(&engine, "alice", "postgres is a database system").await;

    let out = search_for(&engine, "alice", "postgres").await;
    assert!(out.results.len() >= 2);

    // Drain the durable queue.
    let db = engine.db_handle();
    {
        let mut conn = db.lock().unwrap();
        let drained =
            coactivation::drain_once(&mut conn, &engine.config().coactivation).unwrap();
        assert!(drained >= 1);
    }

    let conn = db.lock().unwrap();
    let (pending, done): (i64, i64) = conn
        .query_row(
            "SELECT \
             SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), \
             SUM(CASE WHEN status = 'done' THEN 1 ELSE 0 END) \
             FROM coactivation_jobs",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(pending, 0);
    assert!(done >= 1);

    // If the two memories clustered into distinct waypoints, an edge now
    // carries their coactivation.
    let waypoints: i64 = conn
        .query_row("SELECT COUNT(*) FROM waypoints WHERE sector = 'semantic'", [], |r| r.get(0))
        .unwrap();
    if waypoints >= 2 {
        let edges: i64 = conn
            .query_row("SELECT COUNT(*) FROM waypoint_edges", [], |r| r.get(0))
            .unwrap();
        assert!(edges >= 1);
    }
}

#[tokio::test]
async fn reinforce_raises_salience_and_decay_lowers_it() {
    let engine = test_engine();
    let id = add_for(&engine, "alice", "memory to reinforce").await;

    engine.reinforce(&id, Some("alice")).await.unwrap();

    let db = engine.db_handle();
    let salience: f64 = {
        let conn = db.lock().unwrap();
        conn.query_row(
            "SELECT salience FROM memories WHERE id = ?1",
            rusqlite::params![id],
            |r| r.get(0),
        )
        .unwrap()
    };
    assert!(salience > 0.5);

    // Backdate the memory and sweep: salience must drop but never below
    // the floor.
    {
        let conn = db.lock().unwrap();
        conn.execute(
            "UPDATE memories SET last_seen_at = last_seen_at - 100 * 86400000 WHERE id = ?1",
            rusqlite::params![id],
        )
        .unwrap();
    }
    engine.run_decay().await.unwrap();

    let decayed: f64 = {
        let conn = db.lock().unwrap();
        conn.query_row(
            "SELECT salience FROM memories WHERE id = ?1",
            rusqlite::params![id],
            |r| r.get(0),
        )
        .unwrap()
    };
    assert!(decayed < salience);
    assert!(decayed >= engine.config().hsg.salience_floor);
}

#[tokio::test]
async fn deleting_a_memory_shrinks_its_waypoint() {
    let engine = test_engine();

    let a = add_for(&engine, "alice", "rust borrow checker rules").await;
    let _b = add_for(&engine, "alice", "rust borrow checker details").await;

    engine.delete(&a, Some("alice")).await.unwrap();

    let db = engine.db_handle();
    let conn = db.lock().unwrap();
    let members_json: Vec<String> = {
        let mut stmt = conn.prepare("SELECT member_ids FROM waypoints").unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    };
    for members in members_json {
        assert!(!members.contains(&a), "deleted memory still a member: {members}");
    }
}
