//! MCP `get` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `get` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetParams {
    #[schemars(description = "Memory id to fetch")]
    pub id: String,

    #[schemars(description = "Requesting user; a memory owned by someone else reads as not found")]
    pub user: Option<String>,

    #[schemars(description = "Include the per-sector embedding vectors")]
    pub include_vectors: Option<bool>,
}
