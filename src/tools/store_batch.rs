//! MCP `store_batch` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One memory in a batch store.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StoreBatchItem {
    #[schemars(description = "The natural language content to remember")]
    pub content: String,

    #[schemars(description = "Tags attached to this memory")]
    pub tags: Option<Vec<String>>,

    #[schemars(description = "Optional JSON metadata blob")]
    pub metadata: Option<serde_json::Value>,
}

/// Parameters for the `store_batch` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct StoreBatchParams {
    #[schemars(description = "Memories to store, in order")]
    pub items: Vec<StoreBatchItem>,

    #[schemars(description = "Owning user id applied to every item")]
    pub user: Option<String>,
}
