//! Salience lifecycle: exponential decay and reinforcement.
//!
//! Persisted salience is current as of its anchor instant — the later of
//! the row's `last_seen_at` and the global last sweep time. Reads compute
//! the decayed value from that anchor (lazy decay); the periodic sweep
//! persists decayed values for every row and re-anchors the store.

use rusqlite::{params, Connection};
use std::collections::HashMap;

use crate::config::HsgConfig;
use crate::db::now_ms;
use crate::error::Result;

use super::types::{Memory, Sector};

const MS_PER_DAY: f64 = 86_400_000.0;

/// Per-day decay rate λ for a sector.
pub fn decay_rate(sector: Sector, config: &HsgConfig) -> f64 {
    match sector {
        Sector::Episodic => config.episodic_decay_per_day,
        _ => config.default_decay_per_day,
    }
}

/// Timestamp of the last decay sweep, 0 if none has run.
pub fn last_sweep(conn: &Connection) -> Result<i64> {
    let val: Option<String> = conn
        .query_row(
            "SELECT value FROM schema_meta WHERE key = 'last_decay_sweep'",
            [],
            |row| row.get(0),
        )
        .ok();
    Ok(val.and_then(|v| v.parse().ok()).unwrap_or(0))
}

fn set_last_sweep(conn: &Connection, at: i64) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES ('last_decay_sweep', ?1)",
        params![at.to_string()],
    )?;
    Ok(())
}

/// Decayed salience at `now`: s · exp(−λ · Δt), floored per sector.
pub fn effective_salience(memory: &Memory, sweep_at: i64, now: i64, config: &HsgConfig) -> f64 {
    let anchor = memory.last_seen_at.max(sweep_at);
    let elapsed_days = ((now - anchor).max(0) as f64) / MS_PER_DAY;
    let lambda = decay_rate(memory.primary_sector, config);
    let decayed = memory.salience * (-lambda * elapsed_days).exp();
    decayed.max(config.salience_floor)
}

/// Result of a decay sweep, per sector.
#[derive(Debug, serde::Serialize)]
pub struct DecayResult {
    pub affected_by_sector: HashMap<String, usize>,
}

/// Background sweep: persist the decayed salience of every memory and
/// re-anchor the store at `now`.
pub fn apply_decay(conn: &mut Connection, config: &HsgConfig) -> Result<DecayResult> {
    let now = now_ms();
    let sweep_at = last_sweep(conn)?;
    let mut affected_by_sector: HashMap<String, usize> = HashMap::new();

    let tx = conn.transaction()?;
    {
        let rows: Vec<(String, f64, i64, Sector)> = {
            let mut stmt = tx.prepare(
                "SELECT id, salience, last_seen_at, primary_sector FROM memories",
            )?;
            let collected = stmt
                .query_map([], |row| {
                    let sector_str: String = row.get(3)?;
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, i64>(2)?,
                        sector_str,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            collected
                .into_iter()
                .filter_map(|(id, s, seen, sec)| sec.parse::<Sector>().ok().map(|sec| (id, s, seen, sec)))
                .collect()
        };

        let mut update = tx.prepare("UPDATE memories SET salience = ?1 WHERE id = ?2")?;
        for (id, salience, last_seen_at, sector) in rows {
            let anchor = last_seen_at.max(sweep_at);
            let elapsed_days = ((now - anchor).max(0) as f64) / MS_PER_DAY;
            let lambda = decay_rate(sector, config);
            let decayed = (salience * (-lambda * elapsed_days).exp()).max(config.salience_floor);
            if (decayed - salience).abs() > f64::EPSILON {
                update.execute(params![decayed, id])?;
                *affected_by_sector.entry(sector.as_str().to_string()).or_insert(0) += 1;
            }
        }
    }
    set_last_sweep(&tx, now)?;
    tx.commit()?;

    Ok(DecayResult { affected_by_sector })
}

/// Reinforce a memory: add the sector's step to its decayed salience,
/// capped at 1.0, and mark it seen now.
pub fn reinforce(
    conn: &Connection,
    id: &str,
    user: Option<&str>,
    config: &HsgConfig,
) -> Result<()> {
    let memory = super::get_memory(conn, id, user)?;
    let now = now_ms();
    let sweep_at = last_sweep(conn)?;
    let current = effective_salience(&memory, sweep_at, now, config);
    let boosted = (current + config.reinforce_step).min(1.0);

    conn.execute(
        "UPDATE memories SET salience = ?1, last_seen_at = ?2 WHERE id = ?3",
        params![boosted, now, id],
    )?;
    Ok(())
}

/// Lazy decay on read: persist the decayed salience and stamp
/// `last_seen_at` for memories just returned from a query. Persisting the
/// decayed value first keeps the re-anchor from erasing elapsed decay.
pub fn touch_seen(conn: &Connection, ids: &[&str], config: &HsgConfig) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let now = now_ms();
    let sweep_at = last_sweep(conn)?;
    let memories = super::fetch_memories(conn, ids)?;

    let mut stmt =
        conn.prepare("UPDATE memories SET salience = ?1, last_seen_at = ?2 WHERE id = ?3")?;
    for memory in memories.values() {
        let decayed = effective_salience(memory, sweep_at, now, config);
        stmt.execute(params![decayed, now, memory.id])?;
    }
    Ok(())
}
