//! Persistent knowledge-graph memory for AI agents, shared over MCP.
//!
//! engram stores a graph of named, typed entities connected by directed,
//! typed relations, each entity carrying an append-only list of observation
//! statements. Agents mutate and query the graph through a fixed set of MCP
//! tools; humans browse the same graph through a bundled force-directed
//! visualization served over HTTP.
//!
//! # Architecture
//!
//! - **Storage**: a single SQLite file in WAL mode with FTS5 indices over
//!   entity names/types and observation content. Every mutating tool call
//!   commits and checkpoints before its response is written, so a following
//!   call from any client sees the effects.
//! - **Embeddings**: pluggable text-to-vector providers (local ONNX
//!   all-MiniLM-L6-v2, or an OpenAI-style HTTP API), stored per
//!   (entity, model) for cosine k-NN retrieval.
//! - **Search**: BM25 keyword search over two FTS streams, vector similarity
//!   search, and a weighted hybrid of the two.
//! - **Transport**: MCP over stdio, or streamable HTTP/SSE with a health
//!   endpoint and static visualization assets.
//!
//! # Modules
//!
//! - [`config`] — TOML configuration with environment overrides
//! - [`db`] — database initialization, schema, migrations, backups
//! - [`embedding`] — text-to-vector providers and the provider registry
//! - [`graph`] — entity/relation/observation storage and search
//! - [`vector`] — per-model embedding rows and cosine k-NN
//! - [`tools`] — the MCP tool surface
//! - [`server`] — stdio and HTTP transports
//! - [`supervisor`] — port negotiation, identity file, backup scheduling

pub mod cli;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod server;
pub mod supervisor;
pub mod tools;
pub mod vector;
