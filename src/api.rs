//! Programmatic API facade.
//!
//! [`Mnema`] owns the shared resources — connection, embedder, vector
//! index, query cache — and exposes the async operations the tool server
//! and CLI project. Synchronous core functions run on the blocking pool;
//! no lock is held across an embedding call. Every operation accepts an
//! optional deadline; crossing it aborts before the next suspension point
//! without rolling back completed writes.

use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cache::QueryCache;
use crate::coactivation::{self, CoactivationPayload, Mode};
use crate::config::MnemaConfig;
use crate::db;
use crate::embedding::EmbeddingProvider;
use crate::error::{check_deadline, Deadline, MemoryError, Result};
use crate::hsg::{self, decay, forget, insert, query, types::*};
use crate::index::{self, VectorIndex};
use crate::router::{
    RecallOptions, RecallOutcome, RecallType, StoreOptions, StoreOutcome, StoreType,
    SOURCE_MEMORY_KEY,
};
use crate::sector;
use crate::temporal::{self, facts, queries, FactField, FactPattern, TemporalFact};

/// The cognitive memory engine.
pub struct Mnema {
    db: Arc<Mutex<Connection>>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    cache: Arc<QueryCache>,
    config: Arc<MnemaConfig>,
    coactivation_mode: Mode,
    /// Legacy `interval` mode only: payloads buffered in memory.
    interval_buffer: Arc<Mutex<Vec<CoactivationPayload>>>,
}

// ── Option structs ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    pub user: Option<String>,
    pub tags: Vec<String>,
    pub metadata: Option<serde_json::Value>,
    pub deadline: Option<Deadline>,
}

#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    pub user: Option<String>,
    pub include_vectors: bool,
    pub deadline: Option<Deadline>,
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub user: Option<String>,
    pub sector: Option<Sector>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub deadline: Option<Deadline>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub user: Option<String>,
    pub sectors: Option<Vec<Sector>>,
    pub limit: Option<usize>,
    pub min_salience: Option<f64>,
    pub deadline: Option<Deadline>,
}

/// One sector's vector row, attached to a [`MemoryWithVectors`].
#[derive(Debug, serde::Serialize)]
pub struct SectorVector {
    pub sector: Sector,
    pub vector: Vec<f32>,
}

#[derive(Debug, serde::Serialize)]
pub struct MemoryWithVectors {
    pub memory: Memory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vectors: Option<Vec<SectorVector>>,
}

impl Mnema {
    /// Open the engine against the configured database path.
    pub fn open(config: MnemaConfig) -> Result<Self> {
        let conn = db::open_database(config.resolved_db_path())?;
        Self::with_connection(conn, config)
    }

    /// Open against an in-memory database. Used by tests and ephemeral runs.
    pub fn open_in_memory(config: MnemaConfig) -> Result<Self> {
        let conn = db::open_memory_database()?;
        Self::with_connection(conn, config)
    }

    fn with_connection(conn: Connection, config: MnemaConfig) -> Result<Self> {
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::from(crate::embedding::create_provider(&config.embedding)?);
        if embedder.dimensions() != config.embedding.dim {
            return Err(MemoryError::InvalidInput(format!(
                "VEC_DIM {} does not match embedder output {}",
                config.embedding.dim,
                embedder.dimensions()
            )));
        }
        let index = index::create_index(&config.index, config.embedding.dim);
        let cache = Arc::new(QueryCache::from_config(&config.retrieval));
        let coactivation_mode = Mode::parse(&config.coactivation.mode);

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            embedder,
            index,
            cache,
            config: Arc::new(config),
            coactivation_mode,
            interval_buffer: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn config(&self) -> &MnemaConfig {
        &self.config
    }

    /// Shared connection handle for the coactivation worker.
    pub fn db_handle(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.db)
    }

    pub fn coactivation_mode(&self) -> Mode {
        self.coactivation_mode
    }

    // ── Internal plumbing ─────────────────────────────────────────────────

    /// Run a storage closure on the blocking pool. `BackendUnavailable` is
    /// retried once with a short backoff; everything else surfaces as-is.
    async fn with_db<T, F>(&self, deadline: Option<Deadline>, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(&mut Connection) -> Result<T> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let mut attempt = 0u8;
        loop {
            check_deadline(deadline)?;
            let db = Arc::clone(&self.db);
            let f = Arc::clone(&f);
            let result = tokio::task::spawn_blocking(move || {
                let mut conn = db
                    .lock()
                    .map_err(|_| MemoryError::Internal("db lock poisoned".into()))?;
                f(&mut conn)
            })
            .await
            .map_err(|e| MemoryError::Internal(format!("storage task failed: {e}")))?;

            match result {
                Err(e) if e.is_retryable() && attempt == 0 => {
                    tracing::warn!(error = %e, "storage call failed, retrying once");
                    attempt = 1;
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                other => return other,
            }
        }
    }

    /// Embed on the blocking pool. The connection lock is never held here.
    async fn embed(&self, text: &str, deadline: Option<Deadline>) -> Result<Vec<f32>> {
        check_deadline(deadline)?;
        let embedder = Arc::clone(&self.embedder);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || embedder.embed(&text))
            .await
            .map_err(|e| MemoryError::Internal(format!("embedding task failed: {e}")))?
    }

    /// Drain the legacy interval buffer into waypoint edges. No-op in the
    /// other modes.
    pub async fn flush_coactivation_buffer(&self) -> Result<usize> {
        if self.coactivation_mode != Mode::Interval {
            return Ok(0);
        }
        let drained: Vec<CoactivationPayload> = {
            let mut buffer = self
                .interval_buffer
                .lock()
                .map_err(|_| MemoryError::Internal("interval buffer poisoned".into()))?;
            std::mem::take(&mut *buffer)
        };
        if drained.is_empty() {
            return Ok(0);
        }
        let count = drained.len();
        self.with_db(None, move |conn| {
            for payload in &drained {
                let job = coactivation::Job {
                    id: String::new(),
                    payload: payload.clone(),
                    retries: 0,
                };
                coactivation::process_job(conn, &job)?;
            }
            Ok(())
        })
        .await?;
        Ok(count)
    }

    // ── Memory operations ─────────────────────────────────────────────────

    /// Store a new memory: embed, classify, persist.
    pub async fn add(&self, content: &str, opts: AddOptions) -> Result<InsertResult> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(MemoryError::InvalidInput(
                "memory content must not be empty".into(),
            ));
        }

        let embedding = self.embed(trimmed, opts.deadline).await?;
        let classification = sector::classify(trimmed);
        let draft = insert::MemoryDraft {
            content: trimmed.to_string(),
            user: opts.user,
            tags: opts.tags,
            metadata: opts.metadata,
        };

        let index = Arc::clone(&self.index);
        let config = Arc::clone(&self.config);
        let result = self
            .with_db(opts.deadline, move |conn| {
                insert::insert_memory(
                    conn,
                    index.as_ref(),
                    &draft,
                    &embedding,
                    &classification,
                    &config.hsg,
                )
            })
            .await?;

        self.cache.invalidate_all();
        Ok(result)
    }

    /// Fetch one memory, optionally with its per-sector vector rows.
    pub async fn get(&self, id: &str, opts: GetOptions) -> Result<MemoryWithVectors> {
        let id = id.to_string();
        let index = Arc::clone(&self.index);
        self.with_db(opts.deadline, move |conn| {
            let memory = hsg::get_memory(conn, &id, opts.user.as_deref())?;
            let vectors = if opts.include_vectors {
                let mut rows = Vec::new();
                for &sector in &memory.sectors {
                    if let Some(vector) = index.get(conn, &id, sector)? {
                        rows.push(SectorVector { sector, vector });
                    }
                }
                Some(rows)
            } else {
                None
            };
            Ok(MemoryWithVectors { memory, vectors })
        })
        .await
    }

    /// Page through memories, newest first.
    pub async fn list(&self, opts: ListOptions) -> Result<Vec<Memory>> {
        let limit = opts.limit.unwrap_or(self.config.retrieval.default_limit);
        self.with_db(opts.deadline, move |conn| {
            hsg::list_memories(conn, opts.user.as_deref(), opts.sector, limit, opts.offset)
        })
        .await
    }

    /// Contextual search with waypoint expansion and re-ranking.
    pub async fn search(&self, query_text: &str, opts: SearchOptions) -> Result<QueryResponse> {
        check_deadline(opts.deadline)?;
        let k = opts.limit.unwrap_or(self.config.retrieval.default_limit);

        let cache_key = QueryCache::key(
            opts.user.as_deref(),
            opts.sectors.as_deref(),
            query_text,
            k,
        );
        if let Some((results, degraded)) = self.cache.get(&cache_key) {
            tracing::debug!(key = %cache_key, "query cache hit");
            return Ok(QueryResponse { results, degraded });
        }

        let query_vec = self.embed(query_text, opts.deadline).await?;

        let params = query::QueryParams {
            user: opts.user,
            sectors: opts.sectors,
            k,
            fetch: k.saturating_mul(self.config.index.overfetch_factor),
            min_salience: opts.min_salience,
            deadline: opts.deadline,
        };

        let index = Arc::clone(&self.index);
        let config = Arc::clone(&self.config);
        let cache = Arc::clone(&self.cache);
        let mode = self.coactivation_mode;
        let interval_buffer = Arc::clone(&self.interval_buffer);
        let response = self
            .with_db(opts.deadline, move |conn| {
                let response = query::query(
                    conn,
                    index.as_ref(),
                    &query_vec,
                    &params,
                    &config.retrieval,
                    &config.hsg,
                )?;
                // Publish coactivation before returning — one insert.
                if response.results.len() >= 2 {
                    let payload = CoactivationPayload {
                        activations: response
                            .results
                            .iter()
                            .map(|r| {
                                (r.memory.id.clone(), r.memory.primary_sector.as_str().to_string())
                            })
                            .collect(),
                        queried_at: db::now_ms(),
                    };
                    match mode {
                        Mode::Cron => {
                            coactivation::enqueue(conn, &payload)?;
                        }
                        Mode::Interval => {
                            if let Ok(mut buffer) = interval_buffer.lock() {
                                buffer.push(payload);
                            }
                        }
                        Mode::Disabled => {}
                    }
                }
                cache.put(cache_key.clone(), response.results.clone(), response.degraded);
                Ok(response)
            })
            .await?;

        Ok(response)
    }

    /// Boost a memory's salience and mark it seen.
    pub async fn reinforce(&self, id: &str, user: Option<&str>) -> Result<()> {
        let id = id.to_string();
        let user = user.map(String::from);
        let config = Arc::clone(&self.config);
        self.with_db(None, move |conn| {
            decay::reinforce(conn, &id, user.as_deref(), &config.hsg)
        })
        .await
    }

    /// Delete one memory with full cascade.
    pub async fn delete(&self, id: &str, user: Option<&str>) -> Result<()> {
        let id = id.to_string();
        let user = user.map(String::from);
        let index = Arc::clone(&self.index);
        self.with_db(None, move |conn| {
            forget::delete_memory(conn, index.as_ref(), &id, user.as_deref())
        })
        .await?;
        self.cache.invalidate_all();
        Ok(())
    }

    /// Wipe the store, or one user's slice of it.
    pub async fn wipe(&self, user: Option<&str>) -> Result<forget::WipeResult> {
        let user = user.map(String::from);
        let index = Arc::clone(&self.index);
        let result = self
            .with_db(None, move |conn| {
                forget::wipe(conn, index.as_ref(), user.as_deref())
            })
            .await?;
        self.cache.invalidate_all();
        Ok(result)
    }

    /// Run a salience decay sweep.
    pub async fn run_decay(&self) -> Result<decay::DecayResult> {
        let config = Arc::clone(&self.config);
        self.with_db(None, move |conn| decay::apply_decay(conn, &config.hsg))
            .await
    }

    pub async fn health(&self) -> Result<db::HealthReport> {
        self.with_db(None, |conn| db::check_database_health(conn)).await
    }

    // ── Unified router ────────────────────────────────────────────────────

    /// Dispatch a recall across the semantic and temporal graphs.
    pub async fn recall(&self, query_text: &str, opts: RecallOptions) -> Result<RecallOutcome> {
        let contextual = match opts.recall_type {
            RecallType::Contextual | RecallType::Unified => Some(
                self.search(
                    query_text,
                    SearchOptions {
                        user: opts.user.clone(),
                        sectors: opts.sectors.clone(),
                        limit: opts.k,
                        min_salience: opts.min_salience,
                        deadline: opts.deadline,
                    },
                )
                .await?,
            ),
            RecallType::Factual => None,
        };

        let factual = match opts.recall_type {
            RecallType::Factual | RecallType::Unified => {
                let pattern = opts.fact_pattern.clone().unwrap_or_default();
                let at = opts.at.unwrap_or_else(db::now_ms);
                let min_confidence = opts.min_confidence.unwrap_or(0.0);
                let user = opts.user.clone();
                Some(
                    self.with_db(opts.deadline, move |conn| {
                        queries::query_at(conn, user.as_deref(), &pattern, at, min_confidence)
                    })
                    .await?,
                )
            }
            RecallType::Contextual => None,
        };

        Ok(RecallOutcome { contextual, factual })
    }

    /// Dispatch a store into the semantic and/or temporal graphs. The
    /// `both` path cross-links the inserted facts back to the new memory.
    pub async fn store(&self, content: Option<&str>, opts: StoreOptions) -> Result<StoreOutcome> {
        let hsg_result = match opts.store_type {
            StoreType::Contextual | StoreType::Both => {
                let content = content.ok_or_else(|| {
                    MemoryError::InvalidInput("content is required for contextual store".into())
                })?;
                Some(
                    self.add(
                        content,
                        AddOptions {
                            user: opts.user.clone(),
                            tags: opts.tags.clone(),
                            metadata: opts.metadata.clone(),
                            deadline: opts.deadline,
                        },
                    )
                    .await?,
                )
            }
            StoreType::Factual => None,
        };

        let temporal_ids = match opts.store_type {
            StoreType::Factual | StoreType::Both => {
                if opts.facts.is_empty() {
                    return Err(MemoryError::InvalidInput(
                        "facts are required for factual store".into(),
                    ));
                }
                let mut drafts = opts.facts.clone();
                if let Some(hsg) = &hsg_result {
                    for draft in &mut drafts {
                        let mut metadata = draft
                            .metadata
                            .take()
                            .unwrap_or_else(|| serde_json::json!({}));
                        metadata[SOURCE_MEMORY_KEY] = serde_json::json!(hsg.id);
                        draft.metadata = Some(metadata);
                    }
                }
                let user = opts.user.clone();
                Some(
                    self.with_db(opts.deadline, move |conn| {
                        facts::add_facts(conn, user.as_deref(), &drafts)
                    })
                    .await?,
                )
            }
            StoreType::Contextual => None,
        };

        Ok(StoreOutcome {
            hsg: hsg_result,
            temporal: temporal_ids,
        })
    }

    // ── Fact operations ───────────────────────────────────────────────────

    pub async fn add_fact(&self, user: Option<&str>, draft: facts::FactDraft) -> Result<String> {
        let user = user.map(String::from);
        self.with_db(None, move |conn| facts::add_fact(conn, user.as_deref(), &draft))
            .await
    }

    pub async fn add_facts(
        &self,
        user: Option<&str>,
        drafts: Vec<facts::FactDraft>,
    ) -> Result<Vec<String>> {
        let user = user.map(String::from);
        self.with_db(None, move |conn| {
            facts::add_facts(conn, user.as_deref(), &drafts)
        })
        .await
    }

    pub async fn update_fact(
        &self,
        user: Option<&str>,
        id: &str,
        update: facts::FactUpdate,
    ) -> Result<()> {
        let user = user.map(String::from);
        let id = id.to_string();
        self.with_db(None, move |conn| {
            facts::update_fact(conn, user.as_deref(), &id, &update)
        })
        .await
    }

    pub async fn invalidate_fact(
        &self,
        user: Option<&str>,
        id: &str,
        at: Option<i64>,
    ) -> Result<()> {
        let user = user.map(String::from);
        let id = id.to_string();
        self.with_db(None, move |conn| {
            facts::invalidate_fact(conn, user.as_deref(), &id, at)
        })
        .await
    }

    pub async fn delete_fact(&self, user: Option<&str>, id: &str) -> Result<()> {
        let user = user.map(String::from);
        let id = id.to_string();
        self.with_db(None, move |conn| {
            facts::delete_fact(conn, user.as_deref(), &id)
        })
        .await
    }

    pub async fn query_facts(
        &self,
        user: Option<&str>,
        pattern: FactPattern,
        at: Option<i64>,
        min_confidence: f64,
    ) -> Result<Vec<TemporalFact>> {
        let user = user.map(String::from);
        let at = at.unwrap_or_else(db::now_ms);
        self.with_db(None, move |conn| {
            queries::query_at(conn, user.as_deref(), &pattern, at, min_confidence)
        })
        .await
    }

    pub async fn query_facts_in_range(
        &self,
        user: Option<&str>,
        pattern: FactPattern,
        from: Option<i64>,
        to: Option<i64>,
    ) -> Result<Vec<TemporalFact>> {
        let user = user.map(String::from);
        self.with_db(None, move |conn| {
            queries::in_range(conn, user.as_deref(), &pattern, from, to)
        })
        .await
    }

    pub async fn get_current_fact(
        &self,
        user: Option<&str>,
        subject: &str,
        predicate: &str,
    ) -> Result<Option<TemporalFact>> {
        let user = user.map(String::from);
        let subject = subject.to_string();
        let predicate = predicate.to_string();
        self.with_db(None, move |conn| {
            queries::get_current(conn, user.as_deref(), &subject, &predicate)
        })
        .await
    }

    pub async fn get_facts_by_subject(
        &self,
        user: Option<&str>,
        subject: &str,
    ) -> Result<Vec<TemporalFact>> {
        let user = user.map(String::from);
        let subject = subject.to_string();
        self.with_db(None, move |conn| {
            queries::get_by_subject(conn, user.as_deref(), &subject)
        })
        .await
    }

    pub async fn search_facts(
        &self,
        user: Option<&str>,
        needle: &str,
        field: FactField,
        at: Option<i64>,
    ) -> Result<Vec<TemporalFact>> {
        let user = user.map(String::from);
        let needle = needle.to_string();
        let at = at.unwrap_or_else(db::now_ms);
        self.with_db(None, move |conn| {
            queries::search(conn, user.as_deref(), &needle, field, at)
        })
        .await
    }

    pub async fn find_conflicting_facts(
        &self,
        user: Option<&str>,
        subject: &str,
        predicate: &str,
        at: Option<i64>,
    ) -> Result<Vec<TemporalFact>> {
        let user = user.map(String::from);
        let subject = subject.to_string();
        let predicate = predicate.to_string();
        let at = at.unwrap_or_else(db::now_ms);
        self.with_db(None, move |conn| {
            queries::find_conflicting(conn, user.as_deref(), &subject, &predicate, at)
        })
        .await
    }

    pub async fn get_related_facts(
        &self,
        user: Option<&str>,
        fact_id: &str,
    ) -> Result<Vec<(temporal::TemporalEdge, TemporalFact)>> {
        let user = user.map(String::from);
        let fact_id = fact_id.to_string();
        self.with_db(None, move |conn| {
            queries::get_related(conn, user.as_deref(), &fact_id)
        })
        .await
    }

    pub async fn add_fact_edge(
        &self,
        user: Option<&str>,
        edge: temporal::TemporalEdge,
    ) -> Result<()> {
        let user = user.map(String::from);
        self.with_db(None, move |conn| {
            facts::add_edge(conn, user.as_deref(), &edge)
        })
        .await
    }
}
