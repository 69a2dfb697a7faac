//! File-backed knowledge graph and hybrid search engine for AI-agent memory.
//!
//! Plain-text documents carry inline `[[concept]]` tags. The engine extracts
//! those tags, maintains a co-occurrence graph in SQLite, detects topic
//! communities with Louvain modularity optimization, weights relevance by
//! recency decay, and answers lexical/semantic/hybrid search queries merged
//! via Reciprocal Rank Fusion.
//!
//! # Architecture
//!
//! - **Storage**: SQLite with FTS5 and
//!   [sqlite-vec](https://github.com/asg017/sqlite-vec) vector tables
//! - **Embeddings**: pluggable [`embedding::EmbeddingProvider`] (384
//!   dimensions, L2-normalized); without one the engine degrades to
//!   lexical-only search
//! - **Search**: literal-occurrence lexical scoring + cosine semantic
//!   scoring, fused with RRF (k=60) and decay-weighted
//! - **Incremental sync**: filesystem watcher with debounced targeted syncs
//!   and change-driven storage maintenance
//!
//! # Modules
//!
//! - [`config`] — Configuration loading from TOML files and environment variables
//! - [`db`] — SQLite initialization, schema, and migrations
//! - [`document`] — Corpus I/O: frontmatter, URIs, titles
//! - [`extract`] — Concept tag extraction and normalization
//! - [`graph`] — Sync pipeline, Louvain communities, context traversal
//! - [`search`] — Hybrid search and rank fusion
//! - [`decay`] — Recency decay weighting
//! - [`watch`] — Incremental orchestrator
//! - [`engine`] — The [`engine::MemoryEngine`] facade tying it together

pub mod config;
pub mod db;
pub mod decay;
pub mod document;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extract;
pub mod graph;
pub mod search;
pub mod watch;

pub use engine::MemoryEngine;
pub use error::EngineError;
