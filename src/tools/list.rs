//! MCP `list` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `list` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListParams {
    #[schemars(description = "Restrict to this user's memories")]
    pub user: Option<String>,

    #[schemars(description = "Restrict to one primary sector")]
    pub sector: Option<String>,

    #[schemars(description = "Page size. Defaults to the configured limit.")]
    pub limit: Option<usize>,

    #[schemars(description = "Page offset")]
    pub offset: Option<usize>,
}
