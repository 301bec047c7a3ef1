//! Temporal knowledge graph — validity-bounded subject-predicate-object
//! facts with confidence, point-in-time queries, and typed edges.
//!
//! A fact is true on `[valid_from, valid_to)`; an open fact has no
//! `valid_to`. At most one open fact exists per (user, subject, predicate):
//! inserting a newer one auto-closes its predecessor. Write operations live
//! in [`facts`], read operations in [`queries`].

pub mod facts;
pub mod queries;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};

/// A stored fact row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalFact {
    pub id: String,
    pub user_id: String,
    pub subject: String,
    pub predicate: String,
    pub object: String,
    /// Epoch ms at which the fact became true.
    pub valid_from: i64,
    /// Epoch ms at which the fact stopped being true; `None` while open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<i64>,
    pub confidence: f64,
    pub last_updated: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl TemporalFact {
    /// True iff the validity interval contains `t`.
    pub fn active_at(&self, t: i64) -> bool {
        self.valid_from <= t && self.valid_to.map_or(true, |end| end > t)
    }
}

/// A typed, weighted edge between two facts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalEdge {
    pub source_id: String,
    pub target_id: String,
    pub relation_type: String,
    pub weight: f64,
    pub valid_from: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<i64>,
    pub user_id: String,
}

/// Equality pattern for fact queries; `None` fields act as wildcards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactPattern {
    pub subject: Option<String>,
    pub predicate: Option<String>,
    pub object: Option<String>,
}

/// The column a substring search runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactField {
    Subject,
    Predicate,
    Object,
}

impl FactField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Predicate => "predicate",
            Self::Object => "object",
        }
    }
}

impl std::str::FromStr for FactField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "subject" => Ok(Self::Subject),
            "predicate" => Ok(Self::Predicate),
            "object" => Ok(Self::Object),
            _ => Err(format!("unknown fact field: {s}")),
        }
    }
}

pub(crate) fn map_fact_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TemporalFact> {
    let metadata_str: Option<String> = row.get(9)?;
    Ok(TemporalFact {
        id: row.get(0)?,
        user_id: row.get(1)?,
        subject: row.get(2)?,
        predicate: row.get(3)?,
        object: row.get(4)?,
        valid_from: row.get(5)?,
        valid_to: row.get(6)?,
        confidence: row.get(7)?,
        last_updated: row.get(8)?,
        metadata: metadata_str.and_then(|s| serde_json::from_str(&s).ok()),
    })
}

pub(crate) const FACT_COLUMNS: &str =
    "id, user_id, subject, predicate, object, valid_from, valid_to, confidence, last_updated, metadata";

/// Load a fact by id, enforcing ownership when a user scope is given.
/// A fact owned by a different user reads as NotFound.
pub fn get_fact(conn: &Connection, id: &str, user: Option<&str>) -> Result<TemporalFact> {
    let fact = conn
        .query_row(
            &format!("SELECT {FACT_COLUMNS} FROM temporal_facts WHERE id = ?1"),
            params![id],
            map_fact_row,
        )
        .optional()?
        .ok_or_else(|| MemoryError::NotFound(id.to_string()))?;

    if let Some(u) = user {
        if fact.user_id != u {
            return Err(MemoryError::not_found_for_user(id));
        }
    }
    Ok(fact)
}
