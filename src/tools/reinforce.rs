//! MCP `reinforce` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `reinforce` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ReinforceParams {
    #[schemars(description = "Memory id to reinforce")]
    pub id: String,

    #[schemars(description = "Requesting user; must own the memory")]
    pub user: Option<String>,
}
