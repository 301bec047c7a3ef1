//! Unified query router types — the request/response shapes of `recall`
//! and `store`, which dispatch across the semantic graph and the temporal
//! graph. The two result blocks are returned side by side; no re-ranking
//! happens across systems.

use serde::{Deserialize, Serialize};

use crate::error::Deadline;
use crate::hsg::types::{InsertResult, QueryResponse, Sector};
use crate::temporal::facts::FactDraft;
use crate::temporal::{FactPattern, TemporalFact};

/// Which subsystem(s) a recall consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecallType {
    Contextual,
    Factual,
    #[default]
    Unified,
}

impl std::str::FromStr for RecallType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contextual" => Ok(Self::Contextual),
            "factual" => Ok(Self::Factual),
            "unified" => Ok(Self::Unified),
            _ => Err(format!("unknown recall type: {s}")),
        }
    }
}

/// Options for [`crate::api::Mnema::recall`].
#[derive(Debug, Clone, Default)]
pub struct RecallOptions {
    pub recall_type: RecallType,
    pub user: Option<String>,
    /// Equality pattern for the factual block.
    pub fact_pattern: Option<FactPattern>,
    /// As-of instant for facts; defaults to now.
    pub at: Option<i64>,
    pub min_confidence: Option<f64>,
    /// Result count for the contextual block.
    pub k: Option<usize>,
    pub sectors: Option<Vec<Sector>>,
    pub min_salience: Option<f64>,
    pub deadline: Option<Deadline>,
}

/// The two result blocks of a recall.
#[derive(Debug, Serialize)]
pub struct RecallOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contextual: Option<QueryResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factual: Option<Vec<TemporalFact>>,
}

/// Which subsystem(s) a store writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    #[default]
    Contextual,
    Factual,
    Both,
}

impl std::str::FromStr for StoreType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contextual" => Ok(Self::Contextual),
            "factual" => Ok(Self::Factual),
            "both" => Ok(Self::Both),
            _ => Err(format!("unknown store type: {s}")),
        }
    }
}

/// Options for [`crate::api::Mnema::store`].
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    pub store_type: StoreType,
    pub user: Option<String>,
    /// Facts for the factual/both paths.
    pub facts: Vec<FactDraft>,
    pub tags: Vec<String>,
    pub metadata: Option<serde_json::Value>,
    pub deadline: Option<Deadline>,
}

/// Metadata key cross-linking facts to the memory stored alongside them.
pub const SOURCE_MEMORY_KEY: &str = "source_memory_id";

/// What a store produced in each subsystem.
#[derive(Debug, Serialize)]
pub struct StoreOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hsg: Option<InsertResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal: Option<Vec<String>>,
}
