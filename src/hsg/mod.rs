//! Hierarchical semantic graph — memory rows, waypoints, salience, and the
//! insert/query orchestration.
//!
//! The write path lives in [`insert`], the read path in [`query`], waypoint
//! clustering and edges in [`waypoint`], salience lifecycle in [`decay`],
//! and deletion in [`forget`]. Type definitions live in [`types`].

pub mod decay;
pub mod forget;
pub mod insert;
pub mod query;
pub mod types;
pub mod waypoint;

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

use crate::error::{MemoryError, Result};
use types::{Memory, Sector};

/// Load one memory row by id. `user` scoping: a row owned by someone else is
/// reported as absent.
pub fn get_memory(conn: &Connection, id: &str, user: Option<&str>) -> Result<Memory> {
    let memory = conn
        .query_row(
            "SELECT id, user_id, content, primary_sector, sectors, tags, metadata, \
             salience, created_at, last_seen_at FROM memories WHERE id = ?1",
            params![id],
            map_memory_row,
        )
        .optional()?
        .ok_or_else(|| MemoryError::NotFound(id.to_string()))?;

    if let Some(u) = user {
        if memory.user_id != u {
            return Err(MemoryError::not_found_for_user(id));
        }
    }
    Ok(memory)
}

/// Batch-fetch memory rows by id. Missing ids are silently skipped — a
/// vector row can briefly exist without its memory row (or vice versa)
/// between acknowledged writes, and query merging must tolerate that.
pub fn fetch_memories(conn: &Connection, ids: &[&str]) -> Result<HashMap<String, Memory>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "SELECT id, user_id, content, primary_sector, sectors, tags, metadata, \
         salience, created_at, last_seen_at FROM memories WHERE id IN ({})",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let args: Vec<&dyn rusqlite::types::ToSql> =
        ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();

    let rows = stmt
        .query_map(args.as_slice(), map_memory_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows.into_iter().map(|m| (m.id.clone(), m)).collect())
}

/// Page of memory rows, newest first, optionally filtered by user and sector.
pub fn list_memories(
    conn: &Connection,
    user: Option<&str>,
    sector: Option<Sector>,
    limit: usize,
    offset: usize,
) -> Result<Vec<Memory>> {
    let mut sql = String::from(
        "SELECT id, user_id, content, primary_sector, sectors, tags, metadata, \
         salience, created_at, last_seen_at FROM memories",
    );
    let mut clauses: Vec<String> = Vec::new();
    let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(u) = user {
        args.push(Box::new(u.to_string()));
        clauses.push(format!("user_id = ?{}", args.len()));
    }
    if let Some(s) = sector {
        args.push(Box::new(s.as_str().to_string()));
        clauses.push(format!("primary_sector = ?{}", args.len()));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    args.push(Box::new(limit as i64));
    sql.push_str(&format!(" ORDER BY created_at DESC, id LIMIT ?{}", args.len()));
    args.push(Box::new(offset as i64));
    sql.push_str(&format!(" OFFSET ?{}", args.len()));

    let mut stmt = conn.prepare(&sql)?;
    let arg_refs: Vec<&dyn rusqlite::types::ToSql> = args.iter().map(|a| a.as_ref()).collect();
    let rows = stmt
        .query_map(arg_refs.as_slice(), map_memory_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn map_memory_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Memory> {
    let primary_str: String = row.get(3)?;
    let sectors_json: String = row.get(4)?;
    let tags_json: String = row.get(5)?;
    let metadata_str: Option<String> = row.get(6)?;

    let primary_sector = primary_str.parse::<Sector>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
    })?;
    let sectors: Vec<Sector> = serde_json::from_str(&sectors_json).unwrap_or_else(|_| vec![primary_sector]);
    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();

    Ok(Memory {
        id: row.get(0)?,
        user_id: row.get(1)?,
        content: row.get(2)?,
        primary_sector,
        sectors,
        tags,
        metadata: metadata_str.and_then(|s| serde_json::from_str(&s).ok()),
        salience: row.get(7)?,
        created_at: row.get(8)?,
        last_seen_at: row.get(9)?,
    })
}
