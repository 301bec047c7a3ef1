//! Write path — validation, vector rows, waypoint attachment, memory row.
//!
//! [`insert_memory`] is the single entry point. Everything runs inside one
//! transaction: the memory row, one vector row per assigned sector, and the
//! waypoint attachment for each sector.

use rusqlite::{params, Connection};

use crate::config::HsgConfig;
use crate::db::now_ms;
use crate::error::{MemoryError, Result};
use crate::index::VectorIndex;

use super::types::{dedup_tags, Classification, InsertResult, ANONYMOUS_USER};
use super::waypoint;

/// Initial salience of every new memory.
pub const INITIAL_SALIENCE: f64 = 0.5;

/// Draft of a memory to be stored.
#[derive(Debug, Clone, Default)]
pub struct MemoryDraft {
    pub content: String,
    pub user: Option<String>,
    pub tags: Vec<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Full write path. The caller has already embedded and classified the
/// content; this persists the memory row, the per-sector vector rows, and
/// attaches the memory to the waypoint layer of each sector.
pub fn insert_memory(
    conn: &mut Connection,
    index: &dyn VectorIndex,
    draft: &MemoryDraft,
    embedding: &[f32],
    classification: &Classification,
    config: &HsgConfig,
) -> Result<InsertResult> {
    let content = draft.content.trim();
    if content.is_empty() {
        return Err(MemoryError::InvalidInput(
            "memory content must not be empty".into(),
        ));
    }
    if !classification.sectors.contains(&classification.primary) {
        return Err(MemoryError::Internal(
            "classification primary sector missing from sector set".into(),
        ));
    }

    let id = uuid::Uuid::now_v7().to_string();
    let now = now_ms();
    let user_id = draft.user.as_deref().unwrap_or(ANONYMOUS_USER);
    let tags = dedup_tags(draft.tags.clone());
    let metadata_json = draft
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO memories (id, user_id, content, primary_sector, sectors, tags, metadata, \
         salience, created_at, last_seen_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            id,
            user_id,
            content,
            classification.primary.as_str(),
            serde_json::to_string(&classification.sectors)?,
            serde_json::to_string(&tags)?,
            metadata_json,
            INITIAL_SALIENCE,
            now,
        ],
    )?;

    for &sector in &classification.sectors {
        index.upsert(&tx, &id, sector, draft.user.as_deref(), embedding)?;
        waypoint::attach(&tx, sector, &id, embedding, config)?;
    }

    tx.commit()?;

    tracing::info!(
        id = %id,
        primary = %classification.primary,
        sector_count = classification.sectors.len(),
        "memory stored"
    );

    Ok(InsertResult {
        id,
        primary_sector: classification.primary,
        sectors: classification.sectors.clone(),
    })
}
