//! The MCP tool surface.
//!
//! [`GraphTools`] holds the shared state (database connection, embedding
//! registry, config, server identity) and exposes every tool via the
//! `#[tool_router]` macro. Tools validate inputs before any write, run their
//! database work in one transaction on a blocking thread, and checkpoint the
//! WAL before returning, so a following call from any client observes the
//! effects.
//!
//! Domain failures are returned as structured `{"error": kind, ...}` JSON
//! payloads, not protocol errors, so agent callers can branch on the kind.

pub mod add_observations;
pub mod configure_embeddings;
pub mod create_entities;
pub mod create_relations;
pub mod create_subgraph;
pub mod delete_entities;
pub mod delete_relations;
pub mod generate_embeddings;
pub mod search_hybrid;
pub mod search_nodes;
pub mod search_semantic;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::tool::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use add_observations::AddObservationsParams;
use configure_embeddings::ConfigureEmbeddingsParams;
use create_entities::CreateEntitiesParams;
use create_relations::CreateRelationsParams;
use create_subgraph::CreateSubgraphParams;
use delete_entities::DeleteEntitiesParams;
use delete_relations::DeleteRelationsParams;
use generate_embeddings::GenerateEmbeddingsParams;
use search_hybrid::SearchHybridParams;
use search_nodes::SearchNodesParams;
use search_semantic::SearchSemanticParams;

use crate::config::EngramConfig;
use crate::db;
use crate::embedding::EmbeddingRegistry;
use crate::error::ToolError;
use crate::graph::types::SearchResponse;
use crate::graph::{search, store};
use crate::supervisor::ServerInfo;
use crate::vector;

/// The engram MCP tool handler.
#[derive(Clone)]
pub struct GraphTools {
    tool_router: ToolRouter<Self>,
    db: Arc<Mutex<Connection>>,
    registry: Arc<EmbeddingRegistry>,
    config: Arc<EngramConfig>,
    info: Arc<ServerInfo>,
}

/// Serialize a tool outcome to the JSON-string payload MCP carries.
fn respond<T: Serialize>(result: Result<T, ToolError>) -> Result<String, String> {
    let value = match result {
        Ok(v) => match serde_json::to_value(v) {
            Ok(v) => v,
            Err(e) => return Err(format!("serialization failed: {e}")),
        },
        Err(e) => {
            tracing::warn!(kind = e.kind(), error = %e, "tool call failed");
            e.to_value()
        }
    };
    serde_json::to_string(&value).map_err(|e| format!("serialization failed: {e}"))
}

impl GraphTools {
    /// Run database work on a blocking thread under the connection mutex.
    ///
    /// Lock contention that outlasts the busy timeout surfaces as
    /// `Conflict`; it is retried once here before reaching the client.
    pub async fn run_db<T, F>(&self, f: F) -> Result<T, ToolError>
    where
        F: Fn(&mut Connection) -> Result<T, ToolError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|e| ToolError::internal(format!("db lock poisoned: {e}")))?;
            match f(&mut conn) {
                Err(ToolError::Conflict { .. }) => f(&mut conn),
                other => other,
            }
        })
        .await
        .map_err(|e| ToolError::internal(format!("db task failed: {e}")))?
    }

    /// Enforce the per-call wall-clock budget. The underlying storage work
    /// runs to completion either way; only the response is abandoned.
    pub async fn bounded<T>(
        &self,
        secs: u64,
        fut: impl Future<Output = Result<T, ToolError>>,
    ) -> Result<T, ToolError> {
        match tokio::time::timeout(Duration::from_secs(secs), fut).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::internal(format!(
                "tool call timed out after {secs}s"
            ))),
        }
    }

    fn request_timeout(&self) -> u64 {
        self.config.server.request_timeout_secs
    }

    /// Embed a query string with the current provider, off the reactor.
    pub async fn embed_query(&self, query: String) -> Result<(Vec<f32>, String), ToolError> {
        let provider = self
            .registry
            .current()
            .map_err(|e| ToolError::ProviderUnavailable {
                detail: e.to_string(),
            })?;
        let model = provider.model_name().to_string();
        let vector = tokio::task::spawn_blocking(move || provider.embed(&query))
            .await
            .map_err(|e| ToolError::internal(format!("embedding task failed: {e}")))?
            .map_err(|e| ToolError::ProviderUnavailable {
                detail: e.to_string(),
            })?;
        Ok((vector, model))
    }

    /// Embed entities (name plus observations) with the current provider and
    /// upsert the vectors, batch by batch. With `names` unset, every entity
    /// missing an embedding under the current model is selected.
    async fn generate_for(
        &self,
        names: Option<Vec<String>>,
        force: bool,
        batch_size: usize,
    ) -> Result<serde_json::Value, ToolError> {
        let provider = self
            .registry
            .current()
            .map_err(|e| ToolError::ProviderUnavailable {
                detail: e.to_string(),
            })?;
        let model = provider.model_name().to_string();

        let model_for_select = model.clone();
        let (targets, skipped) = self
            .run_db(move |conn| {
                let candidates: Vec<i64> = match &names {
                    Some(names) => {
                        let mut missing = Vec::new();
                        let mut ids = Vec::new();
                        for name in names {
                            match store::entity_id_by_name(conn, name)? {
                                Some(id) => ids.push(id),
                                None => missing.push(name.clone()),
                            }
                        }
                        if !missing.is_empty() {
                            return Err(ToolError::MissingEntities { names: missing });
                        }
                        ids
                    }
                    None => store::all_entity_ids(conn)?,
                };
                let mut targets = Vec::new();
                let mut skipped = 0usize;
                for id in candidates {
                    if !force && vector::exists(conn, id, Some(&model_for_select))? {
                        skipped += 1;
                    } else {
                        targets.push(id);
                    }
                }
                Ok((targets, skipped))
            })
            .await?;

        let mut generated = 0usize;
        for chunk in targets.chunks(batch_size.max(1)) {
            let ids = chunk.to_vec();
            let texts = self
                .run_db(move |conn| {
                    ids.iter()
                        .map(|id| Ok((*id, store::entity_source_text(conn, *id)?)))
                        .collect::<Result<Vec<(i64, String)>, ToolError>>()
                })
                .await?;

            let provider = Arc::clone(&provider);
            let contents: Vec<String> = texts.iter().map(|(_, t)| t.clone()).collect();
            let vectors = tokio::task::spawn_blocking(move || {
                let refs: Vec<&str> = contents.iter().map(|s| s.as_str()).collect();
                provider.embed_batch(&refs)
            })
            .await
            .map_err(|e| ToolError::internal(format!("embedding task failed: {e}")))?
            .map_err(|e| ToolError::ProviderUnavailable {
                detail: e.to_string(),
            })?;

            let rows: Vec<(i64, Vec<f32>)> = texts
                .iter()
                .map(|(id, _)| *id)
                .zip(vectors.into_iter())
                .collect();
            generated += rows.len();

            let model_for_put = model.clone();
            self.run_db(move |conn| {
                vector::batch_put(conn, &model_for_put, &rows)?;
                db::checkpoint(conn)?;
                Ok(())
            })
            .await?;
        }

        Ok(json!({
            "generated": generated,
            "skipped": skipped,
            "model": model,
            "dimensions": provider.dimensions(),
        }))
    }

    /// Best-effort embedding of just-created entities when auto_generate is
    /// on. Embedding trouble must not fail a committed write.
    async fn auto_generate(&self, names: Vec<String>) {
        if !self.config.embedding.auto_generate || names.is_empty() {
            return;
        }
        let batch_size = self.config.embedding.batch_size.max(1);
        if let Err(e) = self.generate_for(Some(names), false, batch_size).await {
            tracing::warn!(error = %e, "auto-generate embeddings failed");
        }
    }
}

/// Check that every name used by a batch is declared in `external_refs`.
fn check_refs_declared(used: &BTreeSet<String>, external_refs: &[String]) -> Result<(), ToolError> {
    let declared: BTreeSet<&str> = external_refs.iter().map(|s| s.as_str()).collect();
    let undeclared: Vec<&str> = used
        .iter()
        .map(|s| s.as_str())
        .filter(|name| !declared.contains(name))
        .collect();
    if undeclared.is_empty() {
        Ok(())
    } else {
        Err(ToolError::invalid(
            "external_refs",
            format!("names used but not declared: {}", undeclared.join(", ")),
        ))
    }
}

/// Resolve every declared name; any miss fails the whole call before a write.
fn resolve_refs(conn: &Connection, external_refs: &[String]) -> Result<(), ToolError> {
    let mut missing = Vec::new();
    for name in external_refs {
        if store::entity_id_by_name(conn, name)?.is_none() {
            missing.push(name.clone());
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ToolError::MissingEntities { names: missing })
    }
}

#[tool_router]
impl GraphTools {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        registry: Arc<EmbeddingRegistry>,
        config: Arc<EngramConfig>,
        info: Arc<ServerInfo>,
    ) -> Self {
        Self {
            tool_router: Self::tool_router(),
            db,
            registry,
            config,
            info,
        }
    }

    /// Create entities with their initial observations.
    #[tool(
        description = "Create entities in the knowledge graph, each with a name, a type, and optional observations. Existing names are skipped (not updated) and reported in skipped[]."
    )]
    pub async fn create_entities(
        &self,
        Parameters(params): Parameters<CreateEntitiesParams>,
    ) -> Result<String, String> {
        let specs = params.entities;
        tracing::info!(count = specs.len(), "create_entities called");

        let result = self
            .bounded(self.request_timeout(), async {
                let (created, skipped) = self
                    .run_db(move |conn| {
                        let tx = conn.transaction()?;
                        let mut created: Vec<String> = Vec::new();
                        let mut skipped: Vec<String> = Vec::new();
                        for spec in &specs {
                            if store::entity_id_by_name(&tx, &spec.name)?.is_some() {
                                skipped.push(spec.name.clone());
                                continue;
                            }
                            let id = store::create_entity(&tx, &spec.name, &spec.entity_type)?;
                            for content in &spec.observations {
                                store::add_observation_by_id(&tx, id, content)?;
                            }
                            created.push(spec.name.clone());
                        }
                        tx.commit()?;
                        db::checkpoint(conn)?;
                        Ok((created, skipped))
                    })
                    .await?;
                let count = created.len();
                self.auto_generate(created).await;
                Ok(json!({"created": count, "skipped": skipped}))
            })
            .await;
        respond(result)
    }

    /// Create relations between existing entities.
    #[tool(
        description = "Create directed, typed relations between existing entities. external_refs must declare every entity name used; if any does not resolve, the whole call fails with MissingEntities and nothing is written."
    )]
    pub async fn create_relations(
        &self,
        Parameters(params): Parameters<CreateRelationsParams>,
    ) -> Result<String, String> {
        let result = self
            .bounded(self.request_timeout(), async {
                let used: BTreeSet<String> = params
                    .relations
                    .iter()
                    .flat_map(|r| [r.from.clone(), r.to.clone()])
                    .collect();
                check_refs_declared(&used, &params.external_refs)?;

                let relations = params.relations;
                let external_refs = params.external_refs;
                self.run_db(move |conn| {
                    let tx = conn.transaction()?;
                    resolve_refs(&tx, &external_refs)?;
                    let mut created = 0usize;
                    let mut deduplicated = 0usize;
                    for r in &relations {
                        let (_, was_created) =
                            store::create_relation(&tx, &r.from, &r.to, &r.relation_type)?;
                        if was_created {
                            created += 1;
                        } else {
                            deduplicated += 1;
                        }
                    }
                    tx.commit()?;
                    db::checkpoint(conn)?;
                    Ok(json!({"created": created, "deduplicated": deduplicated}))
                })
                .await
            })
            .await;
        respond(result)
    }

    /// Append observations to an existing entity.
    #[tool(
        description = "Append observation statements to an existing entity, in order. external_refs must include the entity name and every listed name must resolve."
    )]
    pub async fn add_observations(
        &self,
        Parameters(params): Parameters<AddObservationsParams>,
    ) -> Result<String, String> {
        let result = self
            .bounded(self.request_timeout(), async {
                let used = BTreeSet::from([params.entity_name.clone()]);
                check_refs_declared(&used, &params.external_refs)?;

                let entity_name = params.entity_name;
                let observations = params.observations;
                let external_refs = params.external_refs;
                self.run_db(move |conn| {
                    let tx = conn.transaction()?;
                    resolve_refs(&tx, &external_refs)?;
                    for content in &observations {
                        store::add_observation(&tx, &entity_name, content)?;
                    }
                    tx.commit()?;
                    db::checkpoint(conn)?;
                    Ok(json!({"added": observations.len()}))
                })
                .await
            })
            .await;
        respond(result)
    }

    /// Atomically create a subgraph of entities, relations, and observations.
    #[tool(
        description = "Atomically create entities, then relations among new or pre-existing entities, then observations on pre-existing entities. Any failure rolls back the whole call. The only tool that can combine entity creation with relation creation."
    )]
    pub async fn create_subgraph(
        &self,
        Parameters(params): Parameters<CreateSubgraphParams>,
    ) -> Result<String, String> {
        let result = self
            .bounded(self.request_timeout(), async {
                let entities = params.entities;
                let created_names: Vec<String> =
                    entities.iter().map(|e| e.name.clone()).collect();
                let relations = params.relations;
                let observations_for_existing = params.observations_for_existing;
                let payload = self.run_db(move |conn| {
                    let tx = conn.transaction()?;

                    let mut entities_created = 0usize;
                    for spec in &entities {
                        let id = store::create_entity(&tx, &spec.name, &spec.entity_type)?;
                        for content in &spec.observations {
                            store::add_observation_by_id(&tx, id, content)?;
                        }
                        entities_created += 1;
                    }

                    // Endpoints may be pre-existing or created above; any
                    // miss fails the whole call.
                    let mut missing: BTreeSet<String> = BTreeSet::new();
                    for r in &relations {
                        for name in [&r.from, &r.to] {
                            if store::entity_id_by_name(&tx, name)?.is_none() {
                                missing.insert(name.clone());
                            }
                        }
                    }
                    if !missing.is_empty() {
                        return Err(ToolError::MissingEntities {
                            names: missing.into_iter().collect(),
                        });
                    }
                    let mut relations_created = 0usize;
                    for r in &relations {
                        let (_, was_created) =
                            store::create_relation(&tx, &r.from, &r.to, &r.relation_type)?;
                        if was_created {
                            relations_created += 1;
                        }
                    }

                    let mut observations_added = 0usize;
                    for group in &observations_for_existing {
                        for content in &group.observations {
                            store::add_observation(&tx, &group.entity_name, content)?;
                            observations_added += 1;
                        }
                    }

                    tx.commit()?;
                    db::checkpoint(conn)?;
                    Ok(json!({
                        "entities_created": entities_created,
                        "relations_created": relations_created,
                        "observations_added": observations_added,
                    }))
                })
                .await?;
                self.auto_generate(created_names).await;
                Ok(payload)
            })
            .await;
        respond(result)
    }

    /// Delete entities by name, cascading.
    #[tool(
        description = "Delete entities by name, cascading to observations, relations, and embeddings. Idempotent; returns the count actually deleted."
    )]
    pub async fn delete_entities(
        &self,
        Parameters(params): Parameters<DeleteEntitiesParams>,
    ) -> Result<String, String> {
        let result = self
            .bounded(self.request_timeout(), async {
                let names = params.names;
                self.run_db(move |conn| {
                    let tx = conn.transaction()?;
                    let mut deleted = 0usize;
                    for name in &names {
                        if store::delete_entity(&tx, name)? {
                            deleted += 1;
                        }
                    }
                    tx.commit()?;
                    db::checkpoint(conn)?;
                    Ok(json!({"deleted": deleted}))
                })
                .await
            })
            .await;
        respond(result)
    }

    /// Delete relations by their identity triple.
    #[tool(description = "Delete relations by (from, to, relation_type). Idempotent; returns the count actually deleted.")]
    pub async fn delete_relations(
        &self,
        Parameters(params): Parameters<DeleteRelationsParams>,
    ) -> Result<String, String> {
        let result = self
            .bounded(self.request_timeout(), async {
                let relations = params.relations;
                self.run_db(move |conn| {
                    let tx = conn.transaction()?;
                    let mut deleted = 0usize;
                    for r in &relations {
                        if store::delete_relation(&tx, &r.from, &r.to, &r.relation_type)? {
                            deleted += 1;
                        }
                    }
                    tx.commit()?;
                    db::checkpoint(conn)?;
                    Ok(json!({"deleted": deleted}))
                })
                .await
            })
            .await;
        respond(result)
    }

    /// Dump the whole graph.
    #[tool(
        description = "Read the complete knowledge graph: all entities with their ordered observations, and all relations."
    )]
    pub async fn read_graph(&self) -> Result<String, String> {
        let result = self
            .bounded(self.request_timeout(), async {
                self.run_db(|conn| Ok(store::read_graph(conn)?)).await
            })
            .await;
        respond(result)
    }

    /// Keyword search over names, types, and observations.
    #[tool(
        description = "Keyword search over entity names, types, and observation content. Multi-word queries use OR semantics; results are ranked by BM25 with name matches weighted double, and each entity's observations are reordered matches-first."
    )]
    pub async fn search_nodes(
        &self,
        Parameters(params): Parameters<SearchNodesParams>,
    ) -> Result<String, String> {
        let k = params.k.unwrap_or(self.config.vector.default_k);
        let result = self
            .bounded(self.request_timeout(), async {
                let query = params.query;
                self.run_db(move |conn| {
                    Ok(SearchResponse {
                        entities: search::search_lexical(conn, &query, k)?,
                        warning: None,
                    })
                })
                .await
            })
            .await;
        respond(result)
    }

    /// Vector similarity search.
    #[tool(
        description = "Semantic search: the query is embedded with the current provider and matched against stored entity embeddings by cosine similarity."
    )]
    pub async fn search_entities_semantic(
        &self,
        Parameters(params): Parameters<SearchSemanticParams>,
    ) -> Result<String, String> {
        let k = params.k.unwrap_or(self.config.vector.default_k);
        let threshold = params
            .threshold
            .unwrap_or(self.config.vector.default_threshold);
        let result = self
            .bounded(self.request_timeout(), async {
                let (query_vec, model) = self.embed_query(params.query).await?;
                self.run_db(move |conn| {
                    let hits = vector::search(conn, &query_vec, k, threshold, Some(&model))?;
                    Ok(SearchResponse {
                        entities: search::hydrate_semantic_hits(conn, &hits)?,
                        warning: None,
                    })
                })
                .await
            })
            .await;
        respond(result)
    }

    /// Weighted fusion of keyword and semantic search.
    #[tool(
        description = "Hybrid search: keyword and semantic results fused with a configurable vector weight. Degrades to keyword-only with a warning when no embedding provider is available."
    )]
    pub async fn search_hybrid(
        &self,
        Parameters(params): Parameters<SearchHybridParams>,
    ) -> Result<String, String> {
        let k = params.k.unwrap_or(self.config.vector.default_k);
        let weight = params
            .vector_weight
            .unwrap_or(self.config.vector.default_hybrid_weight);
        let result = self
            .bounded(self.request_timeout(), async {
                if !(0.0..=1.0).contains(&weight) {
                    return Err(ToolError::invalid(
                        "vector_weight",
                        "must be between 0.0 and 1.0",
                    ));
                }
                // Over-fetch both sides so fusion has candidates to promote.
                let fetch = (2 * k).max(1);

                let query = params.query.clone();
                let lexical = self
                    .run_db(move |conn| Ok(search::search_lexical(conn, &query, fetch)?))
                    .await?;

                let semantic = match self.embed_query(params.query).await {
                    Ok((query_vec, model)) => self
                        .run_db(move |conn| {
                            let hits =
                                vector::search(conn, &query_vec, fetch, 0.0, Some(&model))?;
                            Ok(search::hydrate_semantic_hits(conn, &hits)?)
                        })
                        .await
                        .map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };

                let (semantic, warning) = match semantic {
                    Ok(hits) => (hits, None),
                    Err(detail) => {
                        tracing::warn!(detail = %detail, "hybrid search degraded to lexical-only");
                        (Vec::new(), Some(format!("semantic search unavailable: {detail}")))
                    }
                };

                Ok(SearchResponse {
                    entities: search::fuse_hybrid(lexical, semantic, k, weight),
                    warning,
                })
            })
            .await;
        respond(result)
    }

    /// Generate embeddings for entities.
    #[tool(
        description = "Generate embeddings for entities (name plus observations) with the current provider. Skips entities already embedded under the current model unless force is set."
    )]
    pub async fn generate_embeddings(
        &self,
        Parameters(params): Parameters<GenerateEmbeddingsParams>,
    ) -> Result<String, String> {
        let budget = self.config.server.embedding_timeout_secs;
        let force = params.force.unwrap_or(false);
        let batch_size = params
            .batch_size
            .unwrap_or(self.config.embedding.batch_size)
            .max(1);
        let result = self
            .bounded(budget, self.generate_for(params.names, force, batch_size))
            .await;
        respond(result)
    }

    /// Swap the embedding provider.
    #[tool(
        description = "Replace the current embedding provider. In-flight embed calls finish against the old provider; later calls use the new one."
    )]
    pub async fn configure_embeddings(
        &self,
        Parameters(params): Parameters<ConfigureEmbeddingsParams>,
    ) -> Result<String, String> {
        let result = self
            .bounded(self.request_timeout(), async {
                if params.provider != "local" && params.provider != "remote" {
                    return Err(ToolError::invalid(
                        "provider",
                        "must be 'local' or 'remote'",
                    ));
                }
                if params.model.is_empty() {
                    return Err(ToolError::invalid("model", "must not be empty"));
                }

                let mut embedding_config = self.config.embedding.clone();
                embedding_config.provider = params.provider.clone();
                embedding_config.model = params.model;
                if let Some(key) = params.api_key {
                    embedding_config.api_key = Some(key);
                }

                let registry = Arc::clone(&self.registry);
                let provider =
                    tokio::task::spawn_blocking(move || registry.configure(&embedding_config))
                        .await
                        .map_err(|e| ToolError::internal(format!("configure task failed: {e}")))?
                        .map_err(|e| ToolError::ProviderUnavailable {
                            detail: e.to_string(),
                        })?;

                Ok(json!({
                    "provider": params.provider,
                    "model": provider.model_name(),
                    "dimensions": provider.dimensions(),
                }))
            })
            .await;
        respond(result)
    }

    /// Store-wide counts.
    #[tool(
        description = "Knowledge graph statistics: entity, relation, observation, and embedding counts, plus distinct type counts."
    )]
    pub async fn get_stats(&self) -> Result<String, String> {
        let result = self
            .bounded(self.request_timeout(), async {
                self.run_db(|conn| Ok(store::get_stats(conn)?)).await
            })
            .await;
        respond(result)
    }

    /// Server identity and runtime details.
    #[tool(
        description = "Server identity: name, version, pid, host/port, database path, and container status."
    )]
    pub async fn get_server_info(&self) -> Result<String, String> {
        respond(Ok(self.info.as_ref().clone()))
    }
}

#[tool_handler]
impl ServerHandler for GraphTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "engram is a shared knowledge-graph memory. Use create_entities and \
                 create_relations (with external_refs) to build the graph, \
                 add_observations to record facts, and search_nodes / \
                 search_entities_semantic / search_hybrid to retrieve. \
                 create_subgraph creates entities and relations atomically."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
