//! Engine facade.
//!
//! [`MemoryEngine`] owns the configuration, the optional embedding provider,
//! and the shared community-writer guard. Every operation opens its own
//! connection: WAL readers never block on the single in-flight writer, and
//! the engine stays cheap to clone into watcher threads.

use crate::config::EngineConfig;
use crate::db;
use crate::embedding::EmbeddingProvider;
use crate::error::{EngineError, Result};
use crate::graph::{community, context, sync};
use crate::search;
use crate::watch::SyncOrchestrator;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Full-content view returned by [`MemoryEngine::read_document`].
#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    pub uri: String,
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<String>,
}

/// Store-wide counters.
#[derive(Debug, Serialize)]
pub struct StoreStats {
    pub documents: u64,
    pub concepts: u64,
    pub mentions: u64,
    pub edges: u64,
    pub communities: u64,
    pub fts_rows: u64,
    pub db_size_bytes: u64,
}

/// Shared state reachable from watcher threads. Kept separate from the
/// watcher handle itself so debounce callbacks never keep the orchestrator
/// alive through a reference cycle.
pub(crate) struct EngineCore {
    config: EngineConfig,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    writer_active: AtomicBool,
}

impl EngineCore {
    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn connection(&self) -> Result<Connection> {
        db::open_database(self.config.resolved_db_path())
    }

    fn provider(&self) -> Option<&dyn EmbeddingProvider> {
        self.provider.as_deref()
    }

    pub(crate) fn sync_paths(&self, paths: &[std::path::PathBuf]) -> Result<sync::SyncReport> {
        let mut conn = self.connection()?;
        sync::sync_paths(&mut conn, &self.config.resolved_root(), self.provider(), paths)
    }

    /// Recompute communities, holding the writer-active guard for the write.
    pub(crate) fn detect_communities(&self) -> Result<(usize, f64)> {
        let mut conn = self.connection()?;

        self.writer_active.store(true, Ordering::SeqCst);
        let result = (|| -> Result<(usize, f64)> {
            let tx = conn.transaction()?;
            let out = community::detect_and_store(
                &tx,
                self.config.community.resolution,
                self.config.community.seed,
            )?;
            tx.commit()?;
            Ok(out)
        })();
        self.writer_active.store(false, Ordering::SeqCst);

        result
    }

    /// Whether the community detector is writing right now.
    pub(crate) fn community_writer_active(&self) -> bool {
        self.writer_active.load(Ordering::SeqCst)
    }
}

/// The sync-and-query engine. Clones share one instance.
#[derive(Clone)]
pub struct MemoryEngine {
    core: Arc<EngineCore>,
    watcher: Arc<Mutex<Option<SyncOrchestrator>>>,
}

impl MemoryEngine {
    /// Engine without an embedding provider — semantic search degrades to
    /// lexical-only.
    pub fn new(config: EngineConfig) -> Self {
        Self::build(config, None)
    }

    pub fn with_provider(config: EngineConfig, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self::build(config, Some(provider))
    }

    fn build(config: EngineConfig, provider: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self {
            core: Arc::new(EngineCore {
                config,
                provider,
                writer_active: AtomicBool::new(false),
            }),
            watcher: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        self.core.config()
    }

    /// Sync the whole corpus; see [`sync::full_sync`].
    pub fn full_sync(&self) -> Result<sync::SyncReport> {
        let mut conn = self.core.connection()?;
        sync::full_sync(
            &mut conn,
            &self.core.config.resolved_root(),
            self.core.provider(),
            self.core.config.community.resolution,
            self.core.config.community.seed,
            &self.core.writer_active,
        )
    }

    /// Sync an explicit changed-path list; see [`sync::sync_paths`].
    pub fn sync_paths(&self, paths: &[std::path::PathBuf]) -> Result<sync::SyncReport> {
        self.core.sync_paths(paths)
    }

    /// Ranked lexical/semantic/hybrid search.
    pub fn search(&self, request: &search::SearchRequest) -> Result<search::SearchResponse> {
        let conn = self.core.connection()?;
        search::search(
            &conn,
            &self.core.config.decay,
            &self.core.config.search,
            self.core.provider(),
            request,
        )
    }

    /// Direct + N-hop related concepts.
    pub fn build_context(
        &self,
        concept: &str,
        depth: usize,
        max_entities: usize,
        include_content: bool,
    ) -> Result<context::ContextResult> {
        let conn = self.core.connection()?;
        context::build_context(&conn, concept, depth, max_entities, include_content)
    }

    /// Mermaid source for a concept neighborhood.
    pub fn visualize(&self, concept: &str, depth: usize, max_nodes: usize) -> Result<String> {
        let conn = self.core.connection()?;
        context::visualize(&conn, concept, depth, max_nodes)
    }

    /// Full-content retrieval. This is the ONLY operation that updates
    /// `last_accessed` — deliberate access boosts decay, passive discovery
    /// through search or graph traversal does not.
    pub fn read_document(&self, uri: &str) -> Result<Option<DocumentView>> {
        let conn = self.core.connection()?;

        let view: Option<DocumentView> = conn
            .query_row(
                "SELECT uri, title, content, status, created, last_accessed \
                 FROM documents WHERE uri = ?1",
                params![uri],
                |row| {
                    Ok(DocumentView {
                        uri: row.get(0)?,
                        title: row.get(1)?,
                        content: row.get(2)?,
                        status: row.get(3)?,
                        created: row.get(4)?,
                        last_accessed: row.get(5)?,
                    })
                },
            )
            .optional()?;

        if view.is_some() {
            conn.execute(
                "UPDATE documents SET last_accessed = ?1 WHERE uri = ?2",
                params![Utc::now().to_rfc3339(), uri],
            )?;
        }

        Ok(view)
    }

    /// Recompute communities on demand.
    pub fn detect_communities(&self) -> Result<(usize, f64)> {
        self.core.detect_communities()
    }

    /// Table counters and database size.
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.core.connection()?;
        let count = |sql: &str| -> Result<u64> {
            Ok(conn.query_row(sql, [], |row| row.get::<_, i64>(0))? as u64)
        };

        let db_size_bytes = std::fs::metadata(self.core.config.resolved_db_path())
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(StoreStats {
            documents: count("SELECT COUNT(*) FROM documents")?,
            concepts: count("SELECT COUNT(*) FROM concepts")?,
            mentions: count("SELECT COUNT(*) FROM concept_mentions")?,
            edges: count("SELECT COUNT(*) FROM concept_edges")?,
            communities: count("SELECT COUNT(DISTINCT community_id) FROM concept_communities")?,
            fts_rows: count("SELECT COUNT(*) FROM documents_fts")?,
            db_size_bytes,
        })
    }

    /// Start the incremental orchestrator. Errors when already running.
    pub fn start_watcher(&self, debounce_ms: Option<u64>) -> Result<()> {
        let mut guard = self.watcher.lock().expect("watcher lock poisoned");
        if guard.is_some() {
            return Err(EngineError::WatcherAlreadyRunning);
        }
        *guard = Some(SyncOrchestrator::start(self.core.clone(), debounce_ms)?);
        Ok(())
    }

    /// Stop the incremental orchestrator. Errors when not running.
    pub fn stop_watcher(&self) -> Result<()> {
        let mut guard = self.watcher.lock().expect("watcher lock poisoned");
        match guard.take() {
            Some(_orchestrator) => Ok(()),
            None => Err(EngineError::WatcherNotRunning),
        }
    }

    pub fn watcher_running(&self) -> bool {
        self.watcher.lock().expect("watcher lock poisoned").is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use std::fs;
    use tempfile::TempDir;

    fn test_engine(dir: &TempDir) -> MemoryEngine {
        let mut config = EngineConfig::default();
        config.storage.root = dir.path().join("memory").to_string_lossy().into_owned();
        config.storage.db_path = dir.path().join("memory.db").to_string_lossy().into_owned();
        config.community.seed = Some(7);
        fs::create_dir_all(dir.path().join("memory")).unwrap();
        MemoryEngine::new(config)
    }

    #[test]
    fn read_document_updates_last_accessed() {
        let dir = TempDir::new().unwrap();
        let engine = test_engine(&dir);
        fs::write(
            dir.path().join("memory").join("note.md"),
            "Content with [[alpha]].",
        )
        .unwrap();
        engine.full_sync().unwrap();

        let view = engine.read_document("memory://note").unwrap().unwrap();
        assert_eq!(view.title, "note");
        assert!(view.last_accessed.is_none(), "first read reports prior state");

        let view = engine.read_document("memory://note").unwrap().unwrap();
        assert!(view.last_accessed.is_some());
    }

    #[test]
    fn read_missing_document_is_none_not_error() {
        let dir = TempDir::new().unwrap();
        let engine = test_engine(&dir);
        engine.full_sync().unwrap();
        assert!(engine.read_document("memory://ghost").unwrap().is_none());
    }

    #[test]
    fn search_does_not_boost_access() {
        let dir = TempDir::new().unwrap();
        let engine = test_engine(&dir);
        fs::write(
            dir.path().join("memory").join("note.md"),
            "quantum content [[alpha]]",
        )
        .unwrap();
        engine.full_sync().unwrap();

        let request = search::SearchRequest::new("quantum", search::SearchMode::Lexical);
        engine.search(&request).unwrap();

        let view = engine.read_document("memory://note").unwrap().unwrap();
        assert!(
            view.last_accessed.is_none(),
            "search must not reset the decay clock"
        );
    }

    #[test]
    fn stats_reflect_synced_state() {
        let dir = TempDir::new().unwrap();
        let engine = test_engine(&dir);
        fs::write(
            dir.path().join("memory").join("one.md"),
            "[[alpha]] and [[beta]]",
        )
        .unwrap();
        engine.full_sync().unwrap();

        let stats = engine.stats().unwrap();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.concepts, 2);
        assert_eq!(stats.mentions, 2);
        assert_eq!(stats.edges, 1);
        assert_eq!(stats.fts_rows, 1);
        assert!(stats.db_size_bytes > 0);
        assert!(stats.communities >= 1);
    }

    #[test]
    fn stop_without_start_errors() {
        let dir = TempDir::new().unwrap();
        let engine = test_engine(&dir);
        assert!(matches!(
            engine.stop_watcher().unwrap_err(),
            EngineError::WatcherNotRunning
        ));
    }
}
