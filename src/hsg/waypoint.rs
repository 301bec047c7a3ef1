//! Waypoint clustering and the associative edge graph.
//!
//! A waypoint summarizes a cluster of memories in one sector by their
//! L2-normalized centroid. Incoming memories join the nearest waypoint when
//! similarity clears the threshold, otherwise they seed a new one. Edges
//! between waypoints carry coactivation weight and only ever accumulate.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

use crate::config::HsgConfig;
use crate::db::now_ms;
use crate::error::{MemoryError, Result};
use crate::index::{bytes_to_vector, cosine_similarity, vector_to_bytes};

use super::types::Sector;
pub use super::types::Waypoint;

/// Load every waypoint in a sector.
pub fn by_sector(conn: &Connection, sector: Sector) -> Result<Vec<Waypoint>> {
    let mut stmt = conn.prepare(
        "SELECT id, sector, mean_v, member_ids, created_at FROM waypoints WHERE sector = ?1",
    )?;
    let rows = stmt
        .query_map(params![sector.as_str()], map_waypoint_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Load one waypoint by id.
pub fn get(conn: &Connection, id: &str) -> Result<Option<Waypoint>> {
    conn.query_row(
        "SELECT id, sector, mean_v, member_ids, created_at FROM waypoints WHERE id = ?1",
        params![id],
        map_waypoint_row,
    )
    .optional()
    .map_err(Into::into)
}

fn map_waypoint_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Waypoint> {
    let sector_str: String = row.get(1)?;
    let mean_bytes: Vec<u8> = row.get(2)?;
    let members_json: String = row.get(3)?;
    let sector = sector_str.parse::<Sector>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(Waypoint {
        id: row.get(0)?,
        sector,
        mean_v: bytes_to_vector(&mean_bytes),
        member_ids: serde_json::from_str(&members_json).unwrap_or_default(),
        created_at: row.get(4)?,
    })
}

/// Nearest waypoint in a sector by cosine against the centroid.
pub fn nearest(conn: &Connection, sector: Sector, v: &[f32]) -> Result<Option<(Waypoint, f32)>> {
    let mut best: Option<(Waypoint, f32)> = None;
    for wp in by_sector(conn, sector)? {
        let sim = cosine_similarity(v, &wp.mean_v);
        match &best {
            Some((_, s)) if *s >= sim => {}
            _ => best = Some((wp, sim)),
        }
    }
    Ok(best)
}

/// Attach a memory to the waypoint layer of one sector. Joins the nearest
/// waypoint when similarity ≥ the threshold and there is room, otherwise
/// creates a new waypoint seeded with this vector. Returns the waypoint id.
pub fn attach(
    conn: &Connection,
    sector: Sector,
    memory_id: &str,
    v: &[f32],
    config: &HsgConfig,
) -> Result<String> {
    if let Some((wp, sim)) = nearest(conn, sector, v)? {
        if f64::from(sim) >= config.waypoint_threshold && wp.member_ids.len() < config.waypoint_capacity
        {
            return join(conn, &wp, memory_id, v);
        }
    }
    create(conn, sector, memory_id, v)
}

fn create(conn: &Connection, sector: Sector, memory_id: &str, v: &[f32]) -> Result<String> {
    let id = uuid::Uuid::now_v7().to_string();
    let mut mean = v.to_vec();
    crate::embedding::l2_normalize(&mut mean);
    check_mean(&mean)?;

    conn.execute(
        "INSERT INTO waypoints (id, sector, mean_v, member_ids, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            id,
            sector.as_str(),
            vector_to_bytes(&mean),
            serde_json::to_string(&vec![memory_id])?,
            now_ms(),
        ],
    )?;
    Ok(id)
}

/// Add a member and fold its vector into the centroid incrementally:
/// new_mean = normalize(mean · n + v).
fn join(conn: &Connection, wp: &Waypoint, memory_id: &str, v: &[f32]) -> Result<String> {
    let n = wp.member_ids.len() as f32;
    let mut mean: Vec<f32> = wp
        .mean_v
        .iter()
        .zip(v.iter())
        .map(|(m, x)| m * n + x)
        .collect();
    crate::embedding::l2_normalize(&mut mean);
    check_mean(&mean)?;

    let mut members = wp.member_ids.clone();
    if !members.iter().any(|m| m == memory_id) {
        members.push(memory_id.to_string());
    }

    conn.execute(
        "UPDATE waypoints SET mean_v = ?1, member_ids = ?2 WHERE id = ?3",
        params![vector_to_bytes(&mean), serde_json::to_string(&members)?, wp.id],
    )?;
    Ok(wp.id.clone())
}

fn check_mean(mean: &[f32]) -> Result<()> {
    if mean.iter().any(|x| !x.is_finite()) {
        return Err(MemoryError::Internal(
            "waypoint centroid went non-finite".into(),
        ));
    }
    Ok(())
}

/// Remove a memory from whichever waypoints hold it. The centroid is
/// recomputed from the remaining members' stored vectors; an empty waypoint
/// is deleted along with its edges.
pub fn remove_member(conn: &Connection, memory_id: &str) -> Result<()> {
    // Narrow with a JSON substring probe, confirm membership in process.
    let candidates: Vec<Waypoint> = {
        let mut stmt = conn.prepare(
            "SELECT id, sector, mean_v, member_ids, created_at FROM waypoints \
             WHERE member_ids LIKE ?1",
        )?;
        let result = stmt.query_map(params![format!("%\"{memory_id}\"%")], map_waypoint_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        result
    };

    for wp in candidates {
        let members: Vec<String> = wp
            .member_ids
            .iter()
            .filter(|m| m.as_str() != memory_id)
            .cloned()
            .collect();
        if members.len() == wp.member_ids.len() {
            continue; // substring false positive
        }

        if members.is_empty() {
            conn.execute("DELETE FROM waypoints WHERE id = ?1", params![wp.id])?;
            conn.execute(
                "DELETE FROM waypoint_edges WHERE a = ?1 OR b = ?1",
                params![wp.id],
            )?;
            continue;
        }

        let mut sum = vec![0.0f32; wp.mean_v.len()];
        let mut resolved = 0usize;
        for member in &members {
            if let Some(v) = crate::index::get_row(conn, member, wp.sector)? {
                for (acc, x) in sum.iter_mut().zip(v.iter()) {
                    *acc += x;
                }
                resolved += 1;
            }
        }
        // Keep the old centroid if no member vectors are resolvable.
        let mean_bytes = if resolved > 0 {
            crate::embedding::l2_normalize(&mut sum);
            check_mean(&sum)?;
            vector_to_bytes(&sum)
        } else {
            vector_to_bytes(&wp.mean_v)
        };

        conn.execute(
            "UPDATE waypoints SET mean_v = ?1, member_ids = ?2 WHERE id = ?3",
            params![mean_bytes, serde_json::to_string(&members)?, wp.id],
        )?;
    }
    Ok(())
}

/// Map memory ids to the waypoints that own them, scanning once.
pub fn owners(conn: &Connection, memory_ids: &[&str]) -> Result<HashMap<String, Waypoint>> {
    let mut map = HashMap::new();
    if memory_ids.is_empty() {
        return Ok(map);
    }
    let mut stmt =
        conn.prepare("SELECT id, sector, mean_v, member_ids, created_at FROM waypoints")?;
    let waypoints = stmt
        .query_map([], map_waypoint_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for wp in waypoints {
        for mid in memory_ids {
            if wp.member_ids.iter().any(|m| m == mid) {
                map.insert((*mid).to_string(), wp.clone());
            }
        }
    }
    Ok(map)
}

// ── Edges ─────────────────────────────────────────────────────────────────────

/// Accumulate weight onto the undirected edge between two waypoints.
/// Stored normalized (a < b); the increment is atomic so concurrent bumps
/// commute.
pub fn bump_edge(conn: &Connection, wa: &str, wb: &str, delta: f64, at: i64) -> Result<()> {
    if wa == wb {
        return Ok(());
    }
    let (a, b) = if wa < wb { (wa, wb) } else { (wb, wa) };
    conn.execute(
        "INSERT INTO waypoint_edges (a, b, weight, last_activated_at) VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT(a, b) DO UPDATE SET \
         weight = weight + excluded.weight, last_activated_at = excluded.last_activated_at",
        params![a, b, delta, at],
    )?;
    Ok(())
}

/// Neighbors of a waypoint ordered by edge weight descending, capped.
pub fn neighbors(conn: &Connection, waypoint_id: &str, limit: usize) -> Result<Vec<(String, f64)>> {
    let mut stmt = conn.prepare(
        "SELECT CASE WHEN a = ?1 THEN b ELSE a END, weight FROM waypoint_edges \
         WHERE a = ?1 OR b = ?1 ORDER BY weight DESC, a, b LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![waypoint_id, limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
