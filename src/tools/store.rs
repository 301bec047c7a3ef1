//! MCP `store` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One fact in a store/store_batch request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FactInput {
    #[schemars(description = "Fact subject, e.g. 'alice'")]
    pub subject: String,

    #[schemars(description = "Fact predicate, e.g. 'works_at'")]
    pub predicate: String,

    #[schemars(description = "Fact object, e.g. 'Acme'")]
    pub object: String,

    /// Epoch milliseconds; defaults to now.
    #[schemars(description = "When the fact became true, epoch ms. Defaults to now.")]
    pub valid_from: Option<i64>,

    #[schemars(description = "Confidence 0.0-1.0. Defaults to 1.0.")]
    pub confidence: Option<f64>,

    #[schemars(description = "Optional JSON metadata for this fact")]
    pub metadata: Option<serde_json::Value>,
}

impl From<FactInput> for crate::temporal::facts::FactDraft {
    fn from(input: FactInput) -> Self {
        Self {
            subject: input.subject,
            predicate: input.predicate,
            object: input.object,
            valid_from: input.valid_from,
            confidence: input.confidence,
            metadata: input.metadata,
        }
    }
}

/// Parameters for the `store` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct StoreParams {
    /// Memory text; required for `contextual` and `both`.
    #[schemars(description = "The natural language content to remember")]
    pub content: Option<String>,

    /// `"contextual"` (default), `"factual"`, or `"both"`.
    #[schemars(
        description = "Where to store: 'contextual' (semantic memory, default), 'factual' (temporal facts), or 'both' (memory plus cross-linked facts)"
    )]
    pub r#type: Option<String>,

    #[schemars(description = "Owning user id; omit for the anonymous scope")]
    pub user: Option<String>,

    #[schemars(description = "Tags attached to the memory")]
    pub tags: Option<Vec<String>>,

    #[schemars(description = "Optional JSON metadata blob")]
    pub metadata: Option<serde_json::Value>,

    /// Facts for the `factual` and `both` paths.
    #[schemars(description = "Facts to insert for 'factual' or 'both'")]
    pub facts: Option<Vec<FactInput>>,
}
