//! MCP `delete_batch` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `delete_batch` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DeleteBatchParams {
    #[schemars(description = "Memory ids to delete")]
    pub ids: Vec<String>,

    #[schemars(description = "Requesting user; must own every memory")]
    pub user: Option<String>,
}
