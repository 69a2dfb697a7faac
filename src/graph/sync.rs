//! Corpus → graph synchronization.
//!
//! Two entry points share one per-document pipeline: [`full_sync`] walks the
//! whole corpus, [`sync_paths`] processes an explicit changed-path list (the
//! watcher's path). A three-tier guard keeps repeat passes cheap:
//!
//! 1. modification time unchanged → skip without reading the file;
//! 2. mtime changed but size and content hash match → bookkeeping only
//!    (handles touch-without-edit);
//! 3. otherwise → full reprocess: extract, replace mentions, upsert the
//!    document row, ensure embeddings, rebuild this document's edge
//!    contributions.
//!
//! All mutations of one pass run in a single transaction; any failure rolls
//! back entirely. A malformed document is logged and skipped, never aborting
//! the rest of the pass.

use crate::document::{self, parse_document, path_to_uri, title_for, uri_to_path};
use crate::embedding::{check_dimensions, embedding_to_bytes, EmbeddingProvider, EMBEDDING_DIM};
use crate::error::Result;
use crate::extract::{count_occurrences, extract_concepts};
use crate::graph::community;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Per-run counters reported by both sync entry points.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub documents_processed: usize,
    pub documents_removed: usize,
    pub concepts_found: usize,
    pub edges_created: usize,
    pub orphans_removed: usize,
    pub communities_detected: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modularity: Option<f64>,
}

/// Sync the entire corpus under `root`.
///
/// Additionally sweeps rows whose file is gone, deletes orphaned concepts,
/// runs community detection (inside the same transaction, with the shared
/// writer-active guard held), and finishes with best-effort storage
/// maintenance after commit.
pub fn full_sync(
    conn: &mut Connection,
    root: &Path,
    provider: Option<&dyn EmbeddingProvider>,
    gamma: f64,
    seed: Option<u64>,
    writer_active: &AtomicBool,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();
    let tx = conn.transaction()?;

    let files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "md"))
        .map(|entry| entry.into_path())
        .collect();

    for path in &files {
        if let Err(err) = process_file(&tx, root, provider, path, &mut report) {
            warn!(path = %path.display(), error = %err, "skipping document");
        }
    }

    // Sweep documents whose backing file no longer exists
    let stored_uris: Vec<String> = {
        let mut stmt = tx.prepare("SELECT uri FROM documents")?;
        let uris = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        uris
    };
    for uri in stored_uris {
        let on_disk = uri_to_path(&uri, root).map(|p| p.exists()).unwrap_or(false);
        if !on_disk && remove_document(&tx, &uri)? {
            report.documents_removed += 1;
        }
    }

    report.orphans_removed = cleanup_orphan_concepts(&tx)?;

    // Community detection is part of the same atomic pass; the guard keeps
    // the store watcher from re-triggering on our own write.
    writer_active.store(true, Ordering::SeqCst);
    let detection = community::detect_and_store(&tx, gamma, seed);
    writer_active.store(false, Ordering::SeqCst);
    let (communities, modularity) = detection?;
    report.communities_detected = communities;
    report.modularity = Some(modularity);

    tx.commit()?;

    if let Err(err) = optimize_full_text(conn) {
        warn!(error = %err, "full-text optimize failed");
    }
    if let Err(err) = reclaim_space(conn) {
        warn!(error = %err, "space reclamation failed");
    }

    info!(
        processed = report.documents_processed,
        removed = report.documents_removed,
        concepts = report.concepts_found,
        edges = report.edges_created,
        orphans = report.orphans_removed,
        communities = report.communities_detected,
        "full sync complete"
    );

    Ok(report)
}

/// Sync an explicit list of changed paths (watcher-driven).
///
/// A path that exists is processed through the guard tiers; a missing path
/// has its derived state retracted. One transaction covers the whole batch.
pub fn sync_paths(
    conn: &mut Connection,
    root: &Path,
    provider: Option<&dyn EmbeddingProvider>,
    paths: &[PathBuf],
) -> Result<SyncReport> {
    let mut report = SyncReport::default();
    let tx = conn.transaction()?;

    for path in paths {
        if path.exists() {
            if let Err(err) = process_file(&tx, root, provider, path, &mut report) {
                warn!(path = %path.display(), error = %err, "skipping document");
            }
        } else {
            let uri = path_to_uri(path, root);
            if remove_document(&tx, &uri)? {
                report.documents_removed += 1;
            }
        }
    }

    tx.commit()?;
    Ok(report)
}

/// Process one corpus file through the three-tier change guard.
fn process_file(
    tx: &Connection,
    root: &Path,
    provider: Option<&dyn EmbeddingProvider>,
    path: &Path,
    report: &mut SyncReport,
) -> Result<()> {
    let metadata = std::fs::metadata(path)?;
    let uri = path_to_uri(path, root);
    let mtime = rfc3339(metadata.modified()?);
    let disk_size = metadata.len() as i64;

    let existing: Option<(String, String, i64)> = tx
        .query_row(
            "SELECT last_indexed, content_hash, content_size FROM documents WHERE uri = ?1",
            params![uri],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    // Tier 1: mtime unchanged — nothing to do, file not even read
    if let Some((ref last_indexed, _, _)) = existing {
        if *last_indexed == mtime {
            return Ok(());
        }
    }

    let raw = std::fs::read_to_string(path)?;
    let hash = content_hash(&raw);

    // Tier 2: same size and hash — touch without edit, bookkeeping only
    if let Some((_, ref stored_hash, stored_size)) = existing {
        if stored_size == disk_size && *stored_hash == hash {
            tx.execute(
                "UPDATE documents SET last_indexed = ?1, content_size = ?2 WHERE uri = ?3",
                params![mtime, disk_size, uri],
            )?;
            return Ok(());
        }
    }

    // Tier 3: full reprocess
    let parsed = parse_document(&raw);
    let concepts = extract_concepts(&parsed.body);
    let title = title_for(path, parsed.frontmatter.as_ref());
    let status = parsed
        .frontmatter
        .as_ref()
        .and_then(|fm| fm.get_str("status"))
        .map(str::to_string);
    let tags = parsed
        .frontmatter
        .as_ref()
        .map(|fm| fm.get_str_list("tags"))
        .filter(|tags| !tags.is_empty())
        .map(|tags| serde_json::to_string(&tags).unwrap_or_else(|_| "[]".into()));
    let created = document_created(&parsed, &metadata, &mtime);

    tx.execute(
        "INSERT INTO documents (uri, title, content, created, last_indexed, status, tags, content_hash, content_size) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
         ON CONFLICT(uri) DO UPDATE SET \
             title = excluded.title, content = excluded.content, created = excluded.created, \
             last_indexed = excluded.last_indexed, status = excluded.status, tags = excluded.tags, \
             content_hash = excluded.content_hash, content_size = excluded.content_size",
        params![uri, title, parsed.body, created, mtime, status, tags, hash, disk_size],
    )?;

    // Replace-on-reprocess: this document's mentions are rebuilt wholesale
    tx.execute(
        "DELETE FROM concept_mentions WHERE document_uri = ?1",
        params![uri],
    )?;
    for concept in &concepts {
        tx.execute(
            "INSERT OR IGNORE INTO concepts (name, first_seen) VALUES (?1, ?2)",
            params![concept, created],
        )?;
        let count = count_occurrences(&parsed.body, concept);
        tx.execute(
            "INSERT OR REPLACE INTO concept_mentions (concept_name, document_uri, mention_count) \
             VALUES (?1, ?2, ?3)",
            params![concept, uri, count],
        )?;
        report.concepts_found += 1;
    }

    if let Some(provider) = provider {
        ensure_concept_embeddings(tx, provider, &concepts);
        ensure_document_embedding(tx, provider, &uri, &parsed.body);
    }

    retract_document_edges(tx, &uri)?;
    report.edges_created += build_edges(tx, &concepts, &uri)?;

    report.documents_processed += 1;
    Ok(())
}

/// Retract everything derived from a document. Returns false when the
/// document was never indexed.
pub fn remove_document(tx: &Connection, uri: &str) -> Result<bool> {
    tx.execute(
        "DELETE FROM concept_mentions WHERE document_uri = ?1",
        params![uri],
    )?;
    retract_document_edges(tx, uri)?;
    tx.execute(
        "DELETE FROM vec_documents WHERE document_uri = ?1",
        params![uri],
    )?;
    let removed = tx.execute("DELETE FROM documents WHERE uri = ?1", params![uri])?;
    Ok(removed > 0)
}

/// Remove `uri` from every edge's contributor list; drop edges whose list
/// becomes empty. Co-occurrence always equals the list length.
fn retract_document_edges(tx: &Connection, uri: &str) -> Result<()> {
    let mut stmt = tx.prepare(
        "SELECT concept_a, concept_b, source_documents FROM concept_edges \
         WHERE source_documents LIKE '%' || ?1 || '%'",
    )?;
    let edges: Vec<(String, String, String)> = stmt
        .query_map(params![uri], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for (a, b, raw) in edges {
        let mut sources: Vec<String> = serde_json::from_str(&raw).unwrap_or_default();
        let before = sources.len();
        sources.retain(|s| s != uri);
        if sources.len() == before {
            continue; // LIKE matched a URI with this one as a substring
        }

        if sources.is_empty() {
            tx.execute(
                "DELETE FROM concept_edges WHERE concept_a = ?1 AND concept_b = ?2",
                params![a, b],
            )?;
        } else {
            tx.execute(
                "UPDATE concept_edges SET co_occurrence_count = ?1, source_documents = ?2 \
                 WHERE concept_a = ?3 AND concept_b = ?4",
                params![
                    sources.len() as i64,
                    serde_json::to_string(&sources).unwrap_or_else(|_| "[]".into()),
                    a,
                    b
                ],
            )?;
        }
    }
    Ok(())
}

/// Ensure an edge row exists for every canonical pair in this document's
/// concept set, adding the document to each contributor list. Returns the
/// number of newly created edges.
fn build_edges(tx: &Connection, concepts: &[String], uri: &str) -> Result<usize> {
    if concepts.len() <= 1 {
        return Ok(0);
    }

    let mut created = 0usize;
    for i in 0..concepts.len() - 1 {
        for j in (i + 1)..concepts.len() {
            // Byte-wise ordering; locale-aware collation would diverge here
            let (a, b) = if concepts[i] < concepts[j] {
                (&concepts[i], &concepts[j])
            } else {
                (&concepts[j], &concepts[i])
            };

            let existing: Option<String> = tx
                .query_row(
                    "SELECT source_documents FROM concept_edges WHERE concept_a = ?1 AND concept_b = ?2",
                    params![a, b],
                    |row| row.get(0),
                )
                .optional()?;

            match existing {
                Some(raw) => {
                    let mut sources: Vec<String> = serde_json::from_str(&raw).unwrap_or_default();
                    if !sources.iter().any(|s| s == uri) {
                        sources.push(uri.to_string());
                        tx.execute(
                            "UPDATE concept_edges SET co_occurrence_count = ?1, source_documents = ?2 \
                             WHERE concept_a = ?3 AND concept_b = ?4",
                            params![
                                sources.len() as i64,
                                serde_json::to_string(&sources).unwrap_or_else(|_| "[]".into()),
                                a,
                                b
                            ],
                        )?;
                    }
                }
                None => {
                    tx.execute(
                        "INSERT INTO concept_edges (concept_a, concept_b, co_occurrence_count, source_documents) \
                         VALUES (?1, ?2, 1, ?3)",
                        params![a, b, serde_json::to_string(&[uri]).unwrap_or_else(|_| "[]".into())],
                    )?;
                    created += 1;
                }
            }
        }
    }
    Ok(created)
}

/// Delete concepts with zero remaining mentions, plus their stored vectors.
fn cleanup_orphan_concepts(tx: &Connection) -> Result<usize> {
    let orphans: Vec<String> = {
        let mut stmt = tx.prepare(
            "SELECT name FROM concepts WHERE name NOT IN \
             (SELECT DISTINCT concept_name FROM concept_mentions)",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        names
    };

    for name in &orphans {
        tx.execute(
            "DELETE FROM vec_concepts WHERE concept_name = ?1",
            params![name],
        )?;
        tx.execute("DELETE FROM concepts WHERE name = ?1", params![name])?;
    }
    Ok(orphans.len())
}

/// Generate missing concept embeddings. A concept that already has a
/// compatible vector is never re-embedded. Provider failures degrade to
/// lexical-only behavior, so they are logged and swallowed.
fn ensure_concept_embeddings(tx: &Connection, provider: &dyn EmbeddingProvider, concepts: &[String]) {
    for concept in concepts {
        match has_vector(tx, "vec_concepts", "concept_name", concept) {
            Ok(true) => continue,
            Ok(false) => {}
            Err(err) => {
                warn!(concept, error = %err, "embedding lookup failed");
                continue;
            }
        }
        match provider.embed(concept) {
            Ok(vector) => {
                if check_dimensions(&vector).is_err() {
                    warn!(concept, "provider returned wrong embedding dimensions");
                    continue;
                }
                if let Err(err) = tx.execute(
                    "INSERT INTO vec_concepts (concept_name, embedding) VALUES (?1, ?2)",
                    params![concept, embedding_to_bytes(&vector)],
                ) {
                    warn!(concept, error = %err, "failed to store concept embedding");
                }
            }
            Err(err) => warn!(concept, error = %err, "concept embedding failed"),
        }
    }
}

/// Generate the document embedding over at most the first 1000 characters.
fn ensure_document_embedding(tx: &Connection, provider: &dyn EmbeddingProvider, uri: &str, body: &str) {
    match has_vector(tx, "vec_documents", "document_uri", uri) {
        Ok(true) => return,
        Ok(false) => {}
        Err(err) => {
            warn!(uri, error = %err, "embedding lookup failed");
            return;
        }
    }

    let text: String = body.chars().take(1000).collect();
    match provider.embed(&text) {
        Ok(vector) => {
            if check_dimensions(&vector).is_err() {
                warn!(uri, "provider returned wrong embedding dimensions");
                return;
            }
            if let Err(err) = tx.execute(
                "INSERT INTO vec_documents (document_uri, embedding) VALUES (?1, ?2)",
                params![uri, embedding_to_bytes(&vector)],
            ) {
                warn!(uri, error = %err, "failed to store document embedding");
            }
        }
        Err(err) => warn!(uri, error = %err, "document embedding failed"),
    }
}

fn has_vector(tx: &Connection, table: &str, key_column: &str, key: &str) -> Result<bool> {
    let expected_bytes = (EMBEDDING_DIM * std::mem::size_of::<f32>()) as i64;
    let sql = format!(
        "SELECT COUNT(*) > 0 FROM {table} WHERE {key_column} = ?1 AND length(embedding) = ?2"
    );
    Ok(tx.query_row(&sql, params![key, expected_bytes], |row| row.get(0))?)
}

/// FTS5 index optimize pass.
pub fn optimize_full_text(conn: &Connection) -> Result<()> {
    conn.execute("INSERT INTO documents_fts(documents_fts) VALUES('optimize')", [])?;
    Ok(())
}

/// Reclaim file space. Must run outside any transaction.
pub fn reclaim_space(conn: &Connection) -> Result<()> {
    // wal_checkpoint returns a status row
    conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_row| Ok(()))?;
    conn.execute("VACUUM", [])?;
    Ok(())
}

fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

fn rfc3339(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339()
}

fn document_created(
    parsed: &document::ParsedDocument,
    metadata: &std::fs::Metadata,
    fallback: &str,
) -> String {
    if let Some(raw) = parsed.frontmatter.as_ref().and_then(|fm| fm.get_str("created")) {
        if let Ok(parsed_time) = DateTime::parse_from_rfc3339(raw) {
            return parsed_time.with_timezone(&Utc).to_rfc3339();
        }
    }
    metadata
        .created()
        .map(rfc3339)
        .unwrap_or_else(|_| fallback.to_string())
}
