//! MCP `query` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `query` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct QueryParams {
    #[schemars(description = "Natural language query text")]
    pub query: String,

    /// `"contextual"`, `"factual"`, or `"unified"` (default).
    #[schemars(
        description = "Recall type: 'contextual' (semantic search only), 'factual' (temporal facts only), or 'unified' (both, default)"
    )]
    pub r#type: Option<String>,

    #[schemars(description = "Restrict results to this user's memories and facts")]
    pub user: Option<String>,

    #[schemars(description = "Maximum contextual results to return")]
    pub k: Option<usize>,

    /// Sector names to search; all five when omitted.
    #[schemars(
        description = "Sectors to search: episodic, semantic, procedural, emotional, reflective"
    )]
    pub sectors: Option<Vec<String>>,

    #[schemars(description = "Drop contextual results below this salience")]
    pub min_salience: Option<f64>,

    #[schemars(description = "Fact pattern: subject equality filter")]
    pub subject: Option<String>,

    #[schemars(description = "Fact pattern: predicate equality filter")]
    pub predicate: Option<String>,

    #[schemars(description = "Fact pattern: object equality filter")]
    pub object: Option<String>,

    #[schemars(description = "As-of instant for facts, epoch ms. Defaults to now.")]
    pub at: Option<i64>,

    #[schemars(description = "Drop facts below this confidence")]
    pub min_confidence: Option<f64>,
}
