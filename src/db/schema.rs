//! SQL DDL for all mnemograph tables.
//!
//! Defines the `documents` table with its synchronized `documents_fts` (FTS5)
//! index, the `concepts` / `concept_mentions` / `concept_edges` graph tables,
//! `concept_communities`, the vec0 embedding tables, and `schema_meta`. All
//! DDL uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

/// All schema DDL statements for the core tables.
const SCHEMA_SQL: &str = r#"
-- Indexed corpus documents
CREATE TABLE IF NOT EXISTS documents (
    uri TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    created TEXT,
    last_indexed TEXT NOT NULL,
    status TEXT,
    tags TEXT,
    content_hash TEXT NOT NULL,
    content_size INTEGER NOT NULL,
    last_accessed TEXT
);

-- Full-text index, kept in sync with documents via triggers
CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(
    title,
    content,
    content='documents',
    content_rowid='rowid',
    tokenize='unicode61 remove_diacritics 0'
);

CREATE TRIGGER IF NOT EXISTS documents_ai AFTER INSERT ON documents BEGIN
    INSERT INTO documents_fts(rowid, title, content)
    VALUES (new.rowid, new.title, new.content);
END;

CREATE TRIGGER IF NOT EXISTS documents_ad AFTER DELETE ON documents BEGIN
    INSERT INTO documents_fts(documents_fts, rowid, title, content)
    VALUES ('delete', old.rowid, old.title, old.content);
END;

CREATE TRIGGER IF NOT EXISTS documents_au AFTER UPDATE ON documents BEGIN
    INSERT INTO documents_fts(documents_fts, rowid, title, content)
    VALUES ('delete', old.rowid, old.title, old.content);
    INSERT INTO documents_fts(rowid, title, content)
    VALUES (new.rowid, new.title, new.content);
END;

-- Concept nodes
CREATE TABLE IF NOT EXISTS concepts (
    name TEXT PRIMARY KEY,
    first_seen TEXT
);

-- Per-document mention counts
CREATE TABLE IF NOT EXISTS concept_mentions (
    concept_name TEXT NOT NULL,
    document_uri TEXT NOT NULL,
    mention_count INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (concept_name, document_uri),
    FOREIGN KEY (concept_name) REFERENCES concepts(name) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_mentions_by_document ON concept_mentions(document_uri);

-- Undirected co-occurrence edges; concept_a < concept_b by byte order
CREATE TABLE IF NOT EXISTS concept_edges (
    concept_a TEXT NOT NULL,
    concept_b TEXT NOT NULL,
    co_occurrence_count INTEGER NOT NULL,
    source_documents TEXT NOT NULL,
    PRIMARY KEY (concept_a, concept_b),
    FOREIGN KEY (concept_a) REFERENCES concepts(name) ON DELETE CASCADE,
    FOREIGN KEY (concept_b) REFERENCES concepts(name) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_edges_concept_b ON concept_edges(concept_b);

-- Louvain output; fully replaced per detection run
CREATE TABLE IF NOT EXISTS concept_communities (
    concept_name TEXT PRIMARY KEY,
    community_id INTEGER NOT NULL,
    modularity REAL NOT NULL,
    resolution REAL NOT NULL,
    detected_at TEXT NOT NULL
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// vec0 virtual tables must be created separately (sqlite-vec syntax).
const VEC_TABLE_SQL: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS vec_concepts USING vec0(
    concept_name TEXT PRIMARY KEY,
    embedding FLOAT[384]
);

CREATE VIRTUAL TABLE IF NOT EXISTS vec_documents USING vec0(
    document_uri TEXT PRIMARY KEY,
    embedding FLOAT[384]
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute_batch(VEC_TABLE_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"documents".to_string()));
        assert!(tables.contains(&"concepts".to_string()));
        assert!(tables.contains(&"concept_mentions".to_string()));
        assert!(tables.contains(&"concept_edges".to_string()));
        assert!(tables.contains(&"concept_communities".to_string()));
        assert!(tables.contains(&"schema_meta".to_string()));

        // Verify the vec extension is live
        let version: String = conn
            .query_row("SELECT vec_version()", [], |r| r.get(0))
            .unwrap();
        assert!(!version.is_empty());
    }

    #[test]
    fn schema_is_idempotent() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap(); // second call should not error
    }

    #[test]
    fn fts_triggers_track_document_rows() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO documents (uri, title, content, last_indexed, content_hash, content_size) \
             VALUES ('memory://notes/alpha', 'Alpha', 'the quantum of solace', '2026-01-01T00:00:00Z', 'h', 21)",
            [],
        )
        .unwrap();

        let hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM documents_fts WHERE documents_fts MATCH 'quantum'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(hits, 1);

        conn.execute("DELETE FROM documents WHERE uri = 'memory://notes/alpha'", [])
            .unwrap();
        let hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM documents_fts WHERE documents_fts MATCH 'quantum'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(hits, 0);
    }
}
