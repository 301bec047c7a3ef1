//! Fact write path: insert with auto-close, atomic batches, updates,
//! invalidation, deletion, and edges.

use rusqlite::{params, Connection};

use crate::db::now_ms;
use crate::error::{MemoryError, Result};
use crate::hsg::types::ANONYMOUS_USER;

use super::{get_fact, TemporalEdge};

/// A fact to be inserted.
#[derive(Debug, Clone)]
pub struct FactDraft {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    /// Defaults to now.
    pub valid_from: Option<i64>,
    /// Defaults to 1.0.
    pub confidence: Option<f64>,
    pub metadata: Option<serde_json::Value>,
}

/// Requested changes to an existing fact. Subject/predicate/object are
/// immutable — supplying a different value is a conflict, not an update.
#[derive(Debug, Clone, Default)]
pub struct FactUpdate {
    pub subject: Option<String>,
    pub predicate: Option<String>,
    pub object: Option<String>,
    pub confidence: Option<f64>,
    pub metadata: Option<serde_json::Value>,
}

fn validate_draft(draft: &FactDraft) -> Result<(i64, f64)> {
    if draft.subject.trim().is_empty()
        || draft.predicate.trim().is_empty()
        || draft.object.trim().is_empty()
    {
        return Err(MemoryError::InvalidInput(
            "fact subject, predicate, and object must be non-empty".into(),
        ));
    }
    let confidence = draft.confidence.unwrap_or(1.0);
    if !(0.0..=1.0).contains(&confidence) || confidence.is_nan() {
        return Err(MemoryError::InvalidInput(format!(
            "confidence must be in [0.0, 1.0], got {confidence}"
        )));
    }
    Ok((draft.valid_from.unwrap_or_else(now_ms), confidence))
}

/// Insert one fact, auto-closing any earlier open fact for the same
/// (user, subject, predicate) at the new fact's `valid_from`. Facts that
/// share the exact same `valid_from` are left open — concurrent same-instant
/// assertions both survive and surface through conflict detection.
pub fn add_fact(conn: &mut Connection, user: Option<&str>, draft: &FactDraft) -> Result<String> {
    let tx = conn.transaction()?;
    let id = insert_in_tx(&tx, user, draft)?;
    tx.commit()?;
    Ok(id)
}

/// Atomic batch insert: every fact lands or none do.
pub fn add_facts(
    conn: &mut Connection,
    user: Option<&str>,
    drafts: &[FactDraft],
) -> Result<Vec<String>> {
    let tx = conn.transaction()?;
    let mut ids = Vec::with_capacity(drafts.len());
    for draft in drafts {
        ids.push(insert_in_tx(&tx, user, draft)?);
    }
    tx.commit()?;
    Ok(ids)
}

fn insert_in_tx(
    tx: &rusqlite::Transaction<'_>,
    user: Option<&str>,
    draft: &FactDraft,
) -> Result<String> {
    let (valid_from, confidence) = validate_draft(draft)?;
    let user_id = user.unwrap_or(ANONYMOUS_USER);
    let now = now_ms();

    // Auto-close the currently-open predecessor. Strictly-earlier only:
    // a same-instant sibling stays open (see conflict detection).
    let closed = tx.execute(
        "UPDATE temporal_facts SET valid_to = ?1, last_updated = ?2 \
         WHERE user_id = ?3 AND subject = ?4 AND predicate = ?5 \
         AND valid_to IS NULL AND valid_from < ?1",
        params![valid_from, now, user_id, draft.subject, draft.predicate],
    )?;
    if closed > 0 {
        tracing::debug!(
            subject = %draft.subject,
            predicate = %draft.predicate,
            closed,
            "superseded open fact"
        );
    }

    let id = uuid::Uuid::now_v7().to_string();
    let metadata_json = draft.metadata.as_ref().map(serde_json::to_string).transpose()?;
    tx.execute(
        "INSERT INTO temporal_facts \
         (id, user_id, subject, predicate, object, valid_from, valid_to, confidence, last_updated, metadata) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8, ?9)",
        params![
            id,
            user_id,
            draft.subject,
            draft.predicate,
            draft.object,
            valid_from,
            confidence,
            now,
            metadata_json,
        ],
    )?;
    Ok(id)
}

/// Update confidence and/or metadata of a fact. Attempting to change
/// subject, predicate, or object is a [`MemoryError::ConflictingFact`].
pub fn update_fact(
    conn: &Connection,
    user: Option<&str>,
    id: &str,
    update: &FactUpdate,
) -> Result<()> {
    let fact = get_fact(conn, id, user)?;

    for (requested, current, column) in [
        (&update.subject, &fact.subject, "subject"),
        (&update.predicate, &fact.predicate, "predicate"),
        (&update.object, &fact.object, "object"),
    ] {
        if let Some(value) = requested {
            if value != current {
                return Err(MemoryError::ConflictingFact(format!(
                    "{column} is immutable; insert a new fact to assert '{value}'"
                )));
            }
        }
    }

    if let Some(confidence) = update.confidence {
        if !(0.0..=1.0).contains(&confidence) || confidence.is_nan() {
            return Err(MemoryError::InvalidInput(format!(
                "confidence must be in [0.0, 1.0], got {confidence}"
            )));
        }
    }

    let confidence = update.confidence.unwrap_or(fact.confidence);
    let metadata_json = match &update.metadata {
        Some(m) => Some(serde_json::to_string(m)?),
        None => fact.metadata.as_ref().map(serde_json::to_string).transpose()?,
    };

    conn.execute(
        "UPDATE temporal_facts SET confidence = ?1, metadata = ?2, last_updated = ?3 WHERE id = ?4",
        params![confidence, metadata_json, now_ms(), id],
    )?;
    Ok(())
}

/// Close a fact's validity interval at `at` (default now).
pub fn invalidate_fact(
    conn: &Connection,
    user: Option<&str>,
    id: &str,
    at: Option<i64>,
) -> Result<()> {
    let fact = get_fact(conn, id, user)?;
    let at = at.unwrap_or_else(now_ms);
    if at < fact.valid_from {
        return Err(MemoryError::InvalidInput(format!(
            "valid_to {at} precedes valid_from {}",
            fact.valid_from
        )));
    }
    conn.execute(
        "UPDATE temporal_facts SET valid_to = ?1, last_updated = ?2 WHERE id = ?3",
        params![at, now_ms(), id],
    )?;
    Ok(())
}

/// Irreversibly remove a fact. Edges referencing it cascade away.
pub fn delete_fact(conn: &Connection, user: Option<&str>, id: &str) -> Result<()> {
    get_fact(conn, id, user)?;
    conn.execute("DELETE FROM temporal_facts WHERE id = ?1", params![id])?;
    Ok(())
}

/// Create (or overwrite) a typed edge between two facts. Both endpoints
/// must exist and be visible to the caller.
pub fn add_edge(conn: &Connection, user: Option<&str>, edge: &TemporalEdge) -> Result<()> {
    get_fact(conn, &edge.source_id, user)?;
    get_fact(conn, &edge.target_id, user)?;

    conn.execute(
        "INSERT OR REPLACE INTO temporal_edges \
         (source_id, target_id, relation_type, weight, valid_from, valid_to, user_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            edge.source_id,
            edge.target_id,
            edge.relation_type,
            edge.weight,
            edge.valid_from,
            edge.valid_to,
            user.unwrap_or(ANONYMOUS_USER),
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn test_db() -> Connection {
        db::open_memory_database().unwrap()
    }

    fn draft(s: &str, p: &str, o: &str, valid_from: i64) -> FactDraft {
        FactDraft {
            subject: s.into(),
            predicate: p.into(),
            object: o.into(),
            valid_from: Some(valid_from),
            confidence: None,
            metadata: None,
        }
    }

    #[test]
    fn insert_auto_closes_predecessor() {
        let mut conn = test_db();

        let acme = add_fact(&mut conn, Some("alice"), &draft("alice", "works_at", "Acme", 1000)).unwrap();
        let globex = add_fact(&mut conn, Some("alice"), &draft("alice", "works_at", "Globex", 2000)).unwrap();

        let old = get_fact(&conn, &acme, None).unwrap();
        assert_eq!(old.valid_to, Some(2000));

        let new = get_fact(&conn, &globex, None).unwrap();
        assert!(new.valid_to.is_none());
    }

    #[test]
    fn same_instant_facts_both_stay_open() {
        let mut conn = test_db();

        add_fact(&mut conn, Some("alice"), &draft("alice", "works_at", "Acme", 1000)).unwrap();
        add_fact(&mut conn, Some("alice"), &draft("alice", "works_at", "Globex", 1000)).unwrap();

        let open: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM temporal_facts WHERE valid_to IS NULL",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(open, 2);
    }

    #[test]
    fn auto_close_is_scoped_per_user() {
        let mut conn = test_db();

        let alice = add_fact(&mut conn, Some("alice"), &draft("corp", "ceo", "Ann", 1000)).unwrap();
        add_fact(&mut conn, Some("bob"), &draft("corp", "ceo", "Ben", 2000)).unwrap();

        // Alice's fact must remain open — bob's insert is another tenant.
        let fact = get_fact(&conn, &alice, None).unwrap();
        assert!(fact.valid_to.is_none());
    }

    #[test]
    fn batch_insert_is_atomic() {
        let mut conn = test_db();

        let drafts = vec![
            draft("alice", "likes", "python", 1000),
            FactDraft {
                confidence: Some(7.0), // invalid — must roll the batch back
                ..draft("alice", "likes", "rust", 1000)
            },
        ];
        let err = add_facts(&mut conn, Some("alice"), &drafts).unwrap_err();
        assert_eq!(err.kind(), "invalid_input");

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM temporal_facts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn update_mutates_only_confidence_and_metadata() {
        let mut conn = test_db();
        let id = add_fact(&mut conn, Some("alice"), &draft("alice", "works_at", "Acme", 1000)).unwrap();

        update_fact(
            &conn,
            Some("alice"),
            &id,
            &FactUpdate {
                confidence: Some(0.4),
                metadata: Some(serde_json::json!({"source": "resume"})),
                ..Default::default()
            },
        )
        .unwrap();

        let fact = get_fact(&conn, &id, None).unwrap();
        assert!((fact.confidence - 0.4).abs() < 1e-9);
        assert_eq!(fact.metadata.unwrap()["source"], "resume");
        assert_eq!(fact.object, "Acme");
    }

    #[test]
    fn update_crossing_immutable_columns_conflicts() {
        let mut conn = test_db();
        let id = add_fact(&mut conn, Some("alice"), &draft("alice", "works_at", "Acme", 1000)).unwrap();

        let err = update_fact(
            &conn,
            Some("alice"),
            &id,
            &FactUpdate {
                object: Some("Globex".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), "conflicting_fact");

        // Restating the same value is not a conflict.
        update_fact(
            &conn,
            Some("alice"),
            &id,
            &FactUpdate {
                object: Some("Acme".into()),
                confidence: Some(0.9),
                ..Default::default()
            },
        )
        .unwrap();
    }

    #[test]
    fn ownership_mismatch_reads_as_not_found() {
        let mut conn = test_db();
        let id = add_fact(&mut conn, Some("alice"), &draft("alice", "works_at", "Acme", 1000)).unwrap();

        for err in [
            update_fact(&conn, Some("bob"), &id, &FactUpdate::default()).unwrap_err(),
            invalidate_fact(&conn, Some("bob"), &id, None).unwrap_err(),
            delete_fact(&conn, Some("bob"), &id).unwrap_err(),
        ] {
            assert_eq!(err.kind(), "not_found");
        }
    }

    #[test]
    fn invalidate_sets_valid_to() {
        let mut conn = test_db();
        let id = add_fact(&mut conn, Some("alice"), &draft("alice", "works_at", "Acme", 1000)).unwrap();

        invalidate_fact(&conn, Some("alice"), &id, Some(5000)).unwrap();
        let fact = get_fact(&conn, &id, None).unwrap();
        assert_eq!(fact.valid_to, Some(5000));

        // Closing before the fact began is invalid.
        let id2 = add_fact(&mut conn, Some("alice"), &draft("alice", "works_at", "Globex", 6000)).unwrap();
        let err = invalidate_fact(&conn, Some("alice"), &id2, Some(10)).unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[test]
    fn delete_is_irreversible_and_cascades_edges() {
        let mut conn = test_db();
        let a = add_fact(&mut conn, Some("alice"), &draft("a", "p", "x", 1000)).unwrap();
        let b = add_fact(&mut conn, Some("alice"), &draft("b", "p", "y", 1000)).unwrap();
        add_edge(
            &conn,
            Some("alice"),
            &TemporalEdge {
                source_id: a.clone(),
                target_id: b.clone(),
                relation_type: "caused_by".into(),
                weight: 1.0,
                valid_from: 1000,
                valid_to: None,
                user_id: "alice".into(),
            },
        )
        .unwrap();

        delete_fact(&conn, Some("alice"), &a).unwrap();
        assert!(get_fact(&conn, &a, None).is_err());

        let edges: i64 = conn
            .query_row("SELECT COUNT(*) FROM temporal_edges", [], |r| r.get(0))
            .unwrap();
        assert_eq!(edges, 0);
    }

    #[test]
    fn empty_spo_is_rejected() {
        let mut conn = test_db();
        let err = add_fact(&mut conn, None, &draft("", "p", "o", 1000)).unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }
}
