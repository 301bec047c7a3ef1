//! Core type definitions for the hierarchical semantic graph.
//!
//! Defines [`Sector`] (the five cognitive categories), [`Memory`] (a full
//! record), [`Waypoint`] (a centroid-summarized cluster acting as a hub for
//! associative traversal), and the draft/result types of the write path.

use serde::{Deserialize, Serialize};

/// Owner id recorded when a caller provides no user scope.
pub const ANONYMOUS_USER: &str = "anonymous";

/// The five cognitive sectors a memory can be classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sector {
    /// Events, experiences, session logs — fast decay.
    Episodic,
    /// Facts, knowledge, preferences — slow decay.
    Semantic,
    /// Workflows, patterns, how-to — slow decay.
    Procedural,
    /// Affect-laden content.
    Emotional,
    /// Meta-observations, reviews, summaries.
    Reflective,
}

impl Sector {
    pub const ALL: [Sector; 5] = [
        Sector::Episodic,
        Sector::Semantic,
        Sector::Procedural,
        Sector::Emotional,
        Sector::Reflective,
    ];

    /// Fixed tie-break preference order for classification.
    pub const PREFERENCE: [Sector; 5] = [
        Sector::Semantic,
        Sector::Episodic,
        Sector::Procedural,
        Sector::Reflective,
        Sector::Emotional,
    ];

    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Episodic => "episodic",
            Self::Semantic => "semantic",
            Self::Procedural => "procedural",
            Self::Emotional => "emotional",
            Self::Reflective => "reflective",
        }
    }
}

impl std::fmt::Display for Sector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Sector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "episodic" => Ok(Self::Episodic),
            "semantic" => Ok(Self::Semantic),
            "procedural" => Ok(Self::Procedural),
            "emotional" => Ok(Self::Emotional),
            "reflective" => Ok(Self::Reflective),
            _ => Err(format!("unknown sector: {s}")),
        }
    }
}

/// A memory record, matching the `memories` table schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// UUID v7 (time-sortable) primary key.
    pub id: String,
    /// Owning user; `"anonymous"` when stored without a scope.
    pub user_id: String,
    /// The full text content of the memory.
    pub content: String,
    /// Highest-scoring sector from classification.
    pub primary_sector: Sector,
    /// All assigned sectors. Always contains `primary_sector`.
    pub sectors: Vec<Sector>,
    /// De-duplicated tags, insertion order preserved.
    pub tags: Vec<String>,
    /// Arbitrary JSON metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Activation score in `[0.0, 1.0]`; rises on recall, decays over time.
    pub salience: f64,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds of the last recall or reinforcement.
    pub last_seen_at: i64,
}

/// A centroid-summarized cluster of memories in one sector.
#[derive(Debug, Clone)]
pub struct Waypoint {
    pub id: String,
    pub sector: Sector,
    /// L2-normalized centroid of all member vectors.
    pub mean_v: Vec<f32>,
    /// Member memory ids, unordered.
    pub member_ids: Vec<String>,
    pub created_at: i64,
}

/// Sector assignment produced by the classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub primary: Sector,
    /// All assigned sectors, primary first.
    pub sectors: Vec<Sector>,
}

/// Result returned from an insert operation.
#[derive(Debug, Serialize)]
pub struct InsertResult {
    pub id: String,
    pub primary_sector: Sector,
    pub sectors: Vec<Sector>,
}

/// One ranked hit from a contextual query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredMemory {
    pub memory: Memory,
    /// Raw cosine similarity against the query vector.
    pub similarity: f64,
    /// Combined re-rank score.
    pub score: f64,
    /// Waypoint ids visited to reach this memory, for explainability.
    pub path: Vec<String>,
}

/// Response from a contextual query.
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub results: Vec<ScoredMemory>,
    /// True when the approximate backend returned fewer candidates than
    /// requested after over-fetching. Not an error.
    pub degraded: bool,
}

/// De-duplicate tags preserving first-seen order.
pub fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.into_iter().filter(|t| seen.insert(t.clone())).collect()
}
