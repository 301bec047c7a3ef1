pub mod delete_batch;
pub mod get;
pub mod list;
pub mod query;
pub mod reinforce;
pub mod store;
pub mod store_batch;
pub mod update_fact;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::tool::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use std::future::Future;
use std::sync::Arc;

use crate::api::{AddOptions, GetOptions, ListOptions, Mnema};
use crate::error::MemoryError;
use crate::hsg::types::Sector;
use crate::router::{RecallOptions, RecallType, StoreOptions, StoreType};
use crate::temporal::{facts::FactUpdate, FactPattern};

use delete_batch::DeleteBatchParams;
use get::GetParams;
use list::ListParams;
use query::QueryParams;
use reinforce::ReinforceParams;
use store::StoreParams;
use store_batch::StoreBatchParams;
use update_fact::UpdateFactParams;

/// The mnema MCP tool handler. Holds the engine and exposes all tools via
/// the `#[tool_router]` macro.
#[derive(Clone)]
pub struct MnemaTools {
    tool_router: ToolRouter<Self>,
    engine: Arc<Mnema>,
}

/// Render an engine error for the agent: message plus remediation hint.
fn tool_error(e: MemoryError) -> String {
    format!("{e} ({})", e.hint())
}

fn parse_sectors(names: Option<Vec<String>>) -> Result<Option<Vec<Sector>>, String> {
    match names {
        None => Ok(None),
        Some(list) => list
            .iter()
            .map(|s| s.parse::<Sector>())
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
    }
}

#[tool_router]
impl MnemaTools {
    pub fn new(engine: Arc<Mnema>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            engine,
        }
    }

    /// Store a memory and/or temporal facts.
    #[tool(description = "Store a memory and/or temporal facts. Types: contextual (semantic memory, default), factual (subject-predicate-object facts with validity), both (memory plus cross-linked facts).")]
    async fn store(&self, Parameters(params): Parameters<StoreParams>) -> Result<String, String> {
        let store_type: StoreType = match &params.r#type {
            Some(t) => t.parse().map_err(|e: String| e)?,
            None => StoreType::Contextual,
        };

        tracing::info!(
            store_type = ?store_type,
            has_content = params.content.is_some(),
            fact_count = params.facts.as_ref().map_or(0, Vec::len),
            "store called"
        );

        let outcome = self
            .engine
            .store(
                params.content.as_deref(),
                StoreOptions {
                    store_type,
                    user: params.user,
                    facts: params
                        .facts
                        .unwrap_or_default()
                        .into_iter()
                        .map(Into::into)
                        .collect(),
                    tags: params.tags.unwrap_or_default(),
                    metadata: params.metadata,
                    deadline: None,
                },
            )
            .await
            .map_err(tool_error)?;

        serde_json::to_string(&outcome).map_err(|e| format!("serialization failed: {e}"))
    }

    /// Recall memories and/or facts for a natural language query.
    #[tool(description = "Recall memories and facts. Types: contextual (ranked semantic hits with waypoint paths), factual (as-of fact lookup), unified (both, default).")]
    async fn query(&self, Parameters(params): Parameters<QueryParams>) -> Result<String, String> {
        let recall_type: RecallType = match &params.r#type {
            Some(t) => t.parse().map_err(|e: String| e)?,
            None => RecallType::Unified,
        };
        let sectors = parse_sectors(params.sectors)?;

        tracing::info!(query = %params.query, recall_type = ?recall_type, "query called");

        let pattern = FactPattern {
            subject: params.subject,
            predicate: params.predicate,
            object: params.object,
        };
        let outcome = self
            .engine
            .recall(
                &params.query,
                RecallOptions {
                    recall_type,
                    user: params.user,
                    fact_pattern: Some(pattern),
                    at: params.at,
                    min_confidence: params.min_confidence,
                    k: params.k,
                    sectors,
                    min_salience: params.min_salience,
                    deadline: None,
                },
            )
            .await
            .map_err(tool_error)?;

        serde_json::to_string(&outcome).map_err(|e| format!("serialization failed: {e}"))
    }

    /// List stored memories, newest first.
    #[tool(description = "List memories, newest first, optionally filtered by user and sector.")]
    async fn list(&self, Parameters(params): Parameters<ListParams>) -> Result<String, String> {
        let sector = params
            .sector
            .map(|s| s.parse::<Sector>())
            .transpose()?;

        let memories = self
            .engine
            .list(ListOptions {
                user: params.user,
                sector,
                limit: params.limit,
                offset: params.offset.unwrap_or(0),
                deadline: None,
            })
            .await
            .map_err(tool_error)?;

        let count = memories.len();
        serde_json::to_string(&serde_json::json!({
            "memories": memories,
            "count": count,
        }))
        .map_err(|e| format!("serialization failed: {e}"))
    }

    /// Fetch one memory by id.
    #[tool(description = "Get a memory by id, optionally including its per-sector embedding vectors.")]
    async fn get(&self, Parameters(params): Parameters<GetParams>) -> Result<String, String> {
        let result = self
            .engine
            .get(
                &params.id,
                GetOptions {
                    user: params.user,
                    include_vectors: params.include_vectors.unwrap_or(false),
                    deadline: None,
                },
            )
            .await
            .map_err(tool_error)?;

        serde_json::to_string(&result).map_err(|e| format!("serialization failed: {e}"))
    }

    /// Reinforce a memory's salience.
    #[tool(description = "Reinforce a memory: boost its salience (capped at 1.0) and mark it recently seen.")]
    async fn reinforce(
        &self,
        Parameters(params): Parameters<ReinforceParams>,
    ) -> Result<String, String> {
        self.engine
            .reinforce(&params.id, params.user.as_deref())
            .await
            .map_err(tool_error)?;

        tracing::info!(id = %params.id, "memory reinforced");
        serde_json::to_string(&serde_json::json!({ "id": params.id, "reinforced": true }))
            .map_err(|e| format!("serialization failed: {e}"))
    }

    /// Store several memories in one call.
    #[tool(description = "Store multiple memories in one call. Each item is embedded and classified independently.")]
    async fn store_batch(
        &self,
        Parameters(params): Parameters<StoreBatchParams>,
    ) -> Result<String, String> {
        let mut stored = Vec::with_capacity(params.items.len());
        for item in params.items {
            let result = self
                .engine
                .add(
                    &item.content,
                    AddOptions {
                        user: params.user.clone(),
                        tags: item.tags.unwrap_or_default(),
                        metadata: item.metadata,
                        deadline: None,
                    },
                )
                .await
                .map_err(tool_error)?;
            stored.push(result);
        }

        tracing::info!(count = stored.len(), "batch stored");
        serde_json::to_string(&serde_json::json!({ "stored": stored }))
            .map_err(|e| format!("serialization failed: {e}"))
    }

    /// Delete several memories in one call.
    #[tool(description = "Delete multiple memories by id. Each delete cascades to vectors and waypoint membership.")]
    async fn delete_batch(
        &self,
        Parameters(params): Parameters<DeleteBatchParams>,
    ) -> Result<String, String> {
        let mut deleted = Vec::with_capacity(params.ids.len());
        for id in &params.ids {
            self.engine
                .delete(id, params.user.as_deref())
                .await
                .map_err(tool_error)?;
            deleted.push(id.clone());
        }

        tracing::info!(count = deleted.len(), "batch deleted");
        serde_json::to_string(&serde_json::json!({ "deleted": deleted }))
            .map_err(|e| format!("serialization failed: {e}"))
    }

    /// Update or invalidate a temporal fact.
    #[tool(description = "Update a fact's confidence/metadata, or invalidate it. Subject, predicate, and object are immutable.")]
    async fn update_fact(
        &self,
        Parameters(params): Parameters<UpdateFactParams>,
    ) -> Result<String, String> {
        if params.confidence.is_some() || params.metadata.is_some() {
            self.engine
                .update_fact(
                    params.user.as_deref(),
                    &params.id,
                    FactUpdate {
                        confidence: params.confidence,
                        metadata: params.metadata.clone(),
                        ..Default::default()
                    },
                )
                .await
                .map_err(tool_error)?;
        }

        if params.invalidate.unwrap_or(false) {
            self.engine
                .invalidate_fact(params.user.as_deref(), &params.id, params.valid_to)
                .await
                .map_err(tool_error)?;
        }

        serde_json::to_string(&serde_json::json!({ "id": params.id, "updated": true }))
            .map_err(|e| format!("serialization failed: {e}"))
    }
}

#[tool_handler]
impl ServerHandler for MnemaTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "mnema is a cognitive memory server with semantic memories and temporal facts. \
                 Use store to save, query to recall, reinforce to strengthen a memory, and \
                 update_fact to correct the fact timeline."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
