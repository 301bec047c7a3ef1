//! Fact read path: as-of and range queries, substring search, conflict
//! detection, and edge traversal.

use rusqlite::{params, Connection};

use crate::db::now_ms;
use crate::error::Result;

use super::{map_fact_row, FactField, FactPattern, TemporalEdge, TemporalFact, FACT_COLUMNS};

/// Hard cap on substring search results.
const SEARCH_LIMIT: usize = 100;

/// Facts active at instant `t` matching the pattern, confidence ≥
/// `min_confidence`, ordered by (confidence desc, valid_from desc).
pub fn query_at(
    conn: &Connection,
    user: Option<&str>,
    pattern: &FactPattern,
    t: i64,
    min_confidence: f64,
) -> Result<Vec<TemporalFact>> {
    let mut sql = format!(
        "SELECT {FACT_COLUMNS} FROM temporal_facts \
         WHERE valid_from <= ?1 AND (valid_to IS NULL OR valid_to > ?1) \
         AND confidence >= ?2"
    );
    let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(t), Box::new(min_confidence)];
    push_scope(&mut sql, &mut args, user, pattern);
    sql.push_str(" ORDER BY confidence DESC, valid_from DESC");

    run(conn, &sql, &args)
}

/// The currently-open fact for (subject, predicate), if any. Ties on
/// valid_from break by confidence.
pub fn get_current(
    conn: &Connection,
    user: Option<&str>,
    subject: &str,
    predicate: &str,
) -> Result<Option<TemporalFact>> {
    let now = now_ms();
    let mut sql = format!(
        "SELECT {FACT_COLUMNS} FROM temporal_facts \
         WHERE valid_from <= ?1 AND valid_to IS NULL"
    );
    let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(now)];
    push_scope(
        &mut sql,
        &mut args,
        user,
        &FactPattern {
            subject: Some(subject.to_string()),
            predicate: Some(predicate.to_string()),
            object: None,
        },
    );
    sql.push_str(" ORDER BY valid_from DESC, confidence DESC LIMIT 1");

    Ok(run(conn, &sql, &args)?.into_iter().next())
}

/// Facts whose validity interval overlaps `[from, to]`, or whose
/// `valid_from` falls inside it — the union of both predicates.
pub fn in_range(
    conn: &Connection,
    user: Option<&str>,
    pattern: &FactPattern,
    from: Option<i64>,
    to: Option<i64>,
) -> Result<Vec<TemporalFact>> {
    let from = from.unwrap_or(i64::MIN);
    let to = to.unwrap_or(i64::MAX);

    let mut sql = format!(
        "SELECT {FACT_COLUMNS} FROM temporal_facts WHERE \
         ((valid_from <= ?2 AND (valid_to IS NULL OR valid_to >= ?1)) \
          OR (valid_from >= ?1 AND valid_from <= ?2))"
    );
    let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(from), Box::new(to)];
    push_scope(&mut sql, &mut args, user, pattern);
    sql.push_str(" ORDER BY valid_from DESC, confidence DESC");

    run(conn, &sql, &args)
}

/// Case-sensitive substring search on one column, intersected with the
/// as-of instant, capped at 100 results.
pub fn search(
    conn: &Connection,
    user: Option<&str>,
    needle: &str,
    field: FactField,
    t: i64,
) -> Result<Vec<TemporalFact>> {
    // instr() is case-sensitive; LIKE would fold ASCII case.
    let mut sql = format!(
        "SELECT {FACT_COLUMNS} FROM temporal_facts \
         WHERE instr({}, ?1) > 0 \
         AND valid_from <= ?2 AND (valid_to IS NULL OR valid_to > ?2)",
        field.column()
    );
    let mut args: Vec<Box<dyn rusqlite::types::ToSql>> =
        vec![Box::new(needle.to_string()), Box::new(t)];
    push_scope(&mut sql, &mut args, user, &FactPattern::default());
    args.push(Box::new(SEARCH_LIMIT as i64));
    sql.push_str(&format!(
        " ORDER BY confidence DESC, valid_from DESC LIMIT ?{}",
        args.len()
    ));

    run(conn, &sql, &args)
}

/// All facts active at `t` for (subject, predicate). Two or more results
/// mean the store holds conflicting assertions.
pub fn find_conflicting(
    conn: &Connection,
    user: Option<&str>,
    subject: &str,
    predicate: &str,
    t: i64,
) -> Result<Vec<TemporalFact>> {
    query_at(
        conn,
        user,
        &FactPattern {
            subject: Some(subject.to_string()),
            predicate: Some(predicate.to_string()),
            object: None,
        },
        t,
        0.0,
    )
}

/// Every fact about a subject, newest validity first.
pub fn get_by_subject(
    conn: &Connection,
    user: Option<&str>,
    subject: &str,
) -> Result<Vec<TemporalFact>> {
    let mut sql = format!("SELECT {FACT_COLUMNS} FROM temporal_facts WHERE subject = ?1");
    let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(subject.to_string())];
    if let Some(u) = user {
        args.push(Box::new(u.to_string()));
        sql.push_str(&format!(" AND user_id = ?{}", args.len()));
    }
    sql.push_str(" ORDER BY valid_from DESC, confidence DESC");

    run(conn, &sql, &args)
}

/// Facts connected to `fact_id` by a temporal edge, in either direction.
/// The traversal itself is unscoped; the facts returned are filtered by
/// the caller's user scope so cross-tenant rows never surface.
pub fn get_related(
    conn: &Connection,
    user: Option<&str>,
    fact_id: &str,
) -> Result<Vec<(TemporalEdge, TemporalFact)>> {
    let mut stmt = conn.prepare(
        "SELECT source_id, target_id, relation_type, weight, valid_from, valid_to, user_id \
         FROM temporal_edges WHERE source_id = ?1 OR target_id = ?1",
    )?;
    let edges: Vec<TemporalEdge> = stmt
        .query_map(params![fact_id], |row| {
            Ok(TemporalEdge {
                source_id: row.get(0)?,
                target_id: row.get(1)?,
                relation_type: row.get(2)?,
                weight: row.get(3)?,
                valid_from: row.get(4)?,
                valid_to: row.get(5)?,
                user_id: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut related = Vec::new();
    for edge in edges {
        let other_id = if edge.source_id == fact_id {
            &edge.target_id
        } else {
            &edge.source_id
        };
        match super::get_fact(conn, other_id, user) {
            Ok(fact) => related.push((edge, fact)),
            // Hidden from this caller (other tenant) or already deleted.
            Err(e) if e.kind() == "not_found" => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(related)
}

fn push_scope(
    sql: &mut String,
    args: &mut Vec<Box<dyn rusqlite::types::ToSql>>,
    user: Option<&str>,
    pattern: &FactPattern,
) {
    if let Some(u) = user {
        args.push(Box::new(u.to_string()));
        sql.push_str(&format!(" AND user_id = ?{}", args.len()));
    }
    for (value, column) in [
        (&pattern.subject, "subject"),
        (&pattern.predicate, "predicate"),
        (&pattern.object, "object"),
    ] {
        if let Some(v) = value {
            args.push(Box::new(v.clone()));
            sql.push_str(&format!(" AND {column} = ?{}", args.len()));
        }
    }
}

fn run(
    conn: &Connection,
    sql: &str,
    args: &[Box<dyn rusqlite::types::ToSql>],
) -> Result<Vec<TemporalFact>> {
    let mut stmt = conn.prepare(sql)?;
    let arg_refs: Vec<&dyn rusqlite::types::ToSql> = args.iter().map(|a| a.as_ref()).collect();
    let rows = stmt
        .query_map(arg_refs.as_slice(), map_fact_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
