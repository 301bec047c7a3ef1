//! MCP `update_fact` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `update_fact` MCP tool. Subject, predicate, and
/// object are immutable; insert a new fact to change them.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UpdateFactParams {
    #[schemars(description = "Fact id to update")]
    pub id: String,

    #[schemars(description = "Requesting user; must own the fact")]
    pub user: Option<String>,

    #[schemars(description = "New confidence 0.0-1.0")]
    pub confidence: Option<f64>,

    #[schemars(description = "Replacement JSON metadata")]
    pub metadata: Option<serde_json::Value>,

    /// Close the fact's validity interval instead of (or in addition to)
    /// updating columns.
    #[schemars(description = "Set true to invalidate the fact (close its validity interval)")]
    pub invalidate: Option<bool>,

    #[schemars(description = "Validity end used with invalidate, epoch ms. Defaults to now.")]
    pub valid_to: Option<i64>,
}
