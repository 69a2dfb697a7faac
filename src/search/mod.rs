//! Lexical, semantic, and hybrid search over the document store.
//!
//! Lexical scoring counts literal term occurrences (title hits weigh extra);
//! semantic scoring is cosine similarity against stored document embeddings;
//! hybrid fuses the two ranked lists with reciprocal rank fusion. Whatever
//! score a mode produces, the recency decay weight multiplies it before the
//! caller's min-score filter and before pagination.
//!
//! If the embedding provider is unavailable, semantic and hybrid queries
//! degrade to lexical-only results with semantic scores reported as absent.

pub mod fusion;

use crate::config::{DecayConfig, SearchConfig};
use crate::decay;
use crate::document::URI_SCHEME;
use crate::embedding::{embedding_to_bytes, l2_distance_to_cosine, EmbeddingProvider};
use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

/// Title matches count this much more than one body occurrence.
const TITLE_BONUS: f64 = 5.0;

const SNIPPET_LENGTH: usize = 200;

/// Terms with no discriminative value, dropped during query preprocessing.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is",
    "it", "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there",
    "these", "they", "this", "to", "was", "will", "with", "we", "you", "your", "our", "from",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Lexical,
    Semantic,
    Hybrid,
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lexical" | "fulltext" | "full-text" => Ok(Self::Lexical),
            "semantic" => Ok(Self::Semantic),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown search mode: {other}")),
        }
    }
}

/// A search invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub mode: SearchMode,
    pub page: usize,
    pub page_size: usize,
    /// Restrict to documents under this corpus folder.
    pub folder: Option<String>,
    /// Require all of these frontmatter tags.
    pub tags: Vec<String>,
    /// Minimum (decayed) score to keep a result.
    pub min_score: f64,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, mode: SearchMode) -> Self {
        Self {
            query: query.into(),
            mode,
            page: 1,
            page_size: 10,
            folder: None,
            tags: Vec::new(),
            min_score: 0.0,
        }
    }
}

/// One ranked result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub uri: String,
    pub title: String,
    /// The mode's final, decay-weighted score.
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexical_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_score: Option<f64>,
    pub snippet: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub mode: SearchMode,
    pub query: String,
    pub total_matched: usize,
    pub page: usize,
    pub page_size: usize,
    /// True when the embedding provider was unavailable and the engine fell
    /// back to lexical-only scoring.
    pub degraded: bool,
    pub hits: Vec<SearchHit>,
}

/// Lowercase, split on whitespace, drop stop words.
pub fn informative_terms(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .filter(|term| !STOP_WORDS.contains(term))
        .map(str::to_string)
        .collect()
}

/// Execute a search. A query with zero informative terms is a hard failure
/// in every mode.
pub fn search(
    conn: &Connection,
    decay_config: &DecayConfig,
    search_config: &SearchConfig,
    provider: Option<&dyn EmbeddingProvider>,
    request: &SearchRequest,
) -> Result<SearchResponse> {
    if request.page == 0 {
        return Err(EngineError::invalid("page", "pages are numbered from 1"));
    }
    if request.page_size == 0 {
        return Err(EngineError::invalid("page_size", "must be >= 1"));
    }

    let terms = informative_terms(&request.query);
    if terms.is_empty() {
        return Err(EngineError::NoInformativeTerms);
    }

    let documents = load_documents(conn, request.folder.as_deref(), &request.tags)?;
    let now = Utc::now();

    match request.mode {
        SearchMode::Lexical => {
            let scored = lexical_pipeline(&documents, &terms, decay_config, now);
            Ok(respond(request, SearchMode::Lexical, false, scored))
        }
        SearchMode::Semantic => {
            let limit = request.page_size * 2;
            match semantic_candidates(conn, provider, &request.query, limit, &documents) {
                Some(candidates) => {
                    let scored = semantic_pipeline(&documents, candidates, &terms, decay_config, now);
                    Ok(respond(request, SearchMode::Semantic, false, scored))
                }
                None => {
                    let scored = lexical_pipeline(&documents, &terms, decay_config, now);
                    Ok(respond(request, SearchMode::Semantic, true, scored))
                }
            }
        }
        SearchMode::Hybrid => {
            let limit = request.page_size * 3;
            match semantic_candidates(conn, provider, &request.query, limit, &documents) {
                Some(candidates) => {
                    let scored = hybrid_pipeline(
                        &documents,
                        candidates,
                        &terms,
                        decay_config,
                        search_config.rrf_k,
                        limit,
                        now,
                    );
                    Ok(respond(request, SearchMode::Hybrid, false, scored))
                }
                None => {
                    let scored = lexical_pipeline(&documents, &terms, decay_config, now);
                    Ok(respond(request, SearchMode::Hybrid, true, scored))
                }
            }
        }
    }
}

// ── Pipelines ─────────────────────────────────────────────────────────────────

struct ScoredDoc {
    uri: String,
    title: String,
    score: f64,
    lexical_score: Option<f64>,
    semantic_score: Option<f64>,
    snippet: String,
}

/// Lexical: occurrence scoring → normalize by max → decay.
fn lexical_pipeline(
    documents: &[DocRow],
    terms: &[String],
    decay_config: &DecayConfig,
    now: DateTime<Utc>,
) -> Vec<ScoredDoc> {
    let raw = lexical_candidates(documents, terms, usize::MAX);
    let max_score = raw
        .iter()
        .map(|(_, score)| *score)
        .fold(0.0f64, f64::max);
    if max_score <= 0.0 {
        return Vec::new();
    }

    raw.into_iter()
        .map(|(doc, score)| {
            let normalized = score / max_score;
            let weight = decay_weight(decay_config, doc, now);
            ScoredDoc {
                uri: doc.uri.clone(),
                title: doc.title.clone(),
                score: normalized * weight,
                lexical_score: Some(normalized),
                semantic_score: None,
                snippet: extract_snippet(&doc.content, terms, SNIPPET_LENGTH),
            }
        })
        .collect()
}

/// Semantic: cosine similarity → decay.
fn semantic_pipeline(
    documents: &[DocRow],
    candidates: Vec<(usize, f64)>,
    terms: &[String],
    decay_config: &DecayConfig,
    now: DateTime<Utc>,
) -> Vec<ScoredDoc> {
    candidates
        .into_iter()
        .map(|(index, similarity)| {
            let doc = &documents[index];
            let weight = decay_weight(decay_config, doc, now);
            ScoredDoc {
                uri: doc.uri.clone(),
                title: doc.title.clone(),
                score: similarity * weight,
                lexical_score: None,
                semantic_score: Some(similarity),
                snippet: extract_snippet(&doc.content, terms, SNIPPET_LENGTH),
            }
        })
        .collect()
}

/// Hybrid: RRF over the lexical and semantic rankings → decay on the fused
/// score. Per-signal normalized scores are preserved alongside.
fn hybrid_pipeline(
    documents: &[DocRow],
    semantic: Vec<(usize, f64)>,
    terms: &[String],
    decay_config: &DecayConfig,
    rrf_k: usize,
    lexical_limit: usize,
    now: DateTime<Utc>,
) -> Vec<ScoredDoc> {
    let lexical = lexical_candidates(documents, terms, lexical_limit);

    let lexical_ranked: Vec<String> = lexical.iter().map(|(doc, _)| doc.uri.clone()).collect();
    let semantic_ranked: Vec<String> = semantic
        .iter()
        .map(|(index, _)| documents[*index].uri.clone())
        .collect();

    let fused = fusion::rrf_merge(&[&lexical_ranked, &semantic_ranked], rrf_k);

    let by_uri: HashMap<&str, &DocRow> =
        documents.iter().map(|d| (d.uri.as_str(), d)).collect();
    let lexical_by_uri: HashMap<&str, f64> = lexical
        .iter()
        .map(|(doc, score)| (doc.uri.as_str(), (score / 100.0).min(1.0)))
        .collect();
    let semantic_by_uri: HashMap<&str, f64> = semantic
        .iter()
        .map(|(index, similarity)| (documents[*index].uri.as_str(), *similarity))
        .collect();

    fused
        .into_iter()
        .filter_map(|(uri, fused_score)| {
            let doc = by_uri.get(uri.as_str())?;
            let weight = decay_weight(decay_config, doc, now);
            Some(ScoredDoc {
                uri: doc.uri.clone(),
                title: doc.title.clone(),
                score: fused_score * weight,
                lexical_score: Some(lexical_by_uri.get(uri.as_str()).copied().unwrap_or(0.0)),
                semantic_score: Some(semantic_by_uri.get(uri.as_str()).copied().unwrap_or(0.0)),
                snippet: extract_snippet(&doc.content, terms, SNIPPET_LENGTH),
            })
        })
        .collect()
}

/// Shared tail of every mode: sort, min-score filter, paginate.
fn respond(
    request: &SearchRequest,
    mode: SearchMode,
    degraded: bool,
    mut scored: Vec<ScoredDoc>,
) -> SearchResponse {
    scored.retain(|doc| doc.score >= request.min_score);
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.uri.cmp(&b.uri))
    });

    let total_matched = scored.len();
    let hits: Vec<SearchHit> = scored
        .into_iter()
        .skip((request.page - 1) * request.page_size)
        .take(request.page_size)
        .map(|doc| SearchHit {
            uri: doc.uri,
            title: doc.title,
            score: doc.score,
            lexical_score: doc.lexical_score,
            semantic_score: doc.semantic_score,
            snippet: doc.snippet,
        })
        .collect();

    SearchResponse {
        mode,
        query: request.query.clone(),
        total_matched,
        page: request.page,
        page_size: request.page_size,
        degraded,
        hits,
    }
}

// ── Candidates ────────────────────────────────────────────────────────────────

struct DocRow {
    uri: String,
    title: String,
    content: String,
    status: Option<String>,
    created: Option<DateTime<Utc>>,
    last_accessed: Option<DateTime<Utc>>,
}

/// Load candidate rows, applying folder and tag filters up front.
fn load_documents(
    conn: &Connection,
    folder: Option<&str>,
    required_tags: &[String],
) -> Result<Vec<DocRow>> {
    let mut sql = String::from(
        "SELECT uri, title, content, status, tags, created, last_accessed FROM documents",
    );
    let folder_prefix = folder.map(|f| {
        let trimmed = f.trim_matches('/');
        format!("{URI_SCHEME}{trimmed}/%")
    });
    if folder_prefix.is_some() {
        sql.push_str(" WHERE uri LIKE ?1");
    }

    let mut stmt = conn.prepare(&sql)?;
    let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(DocRow, Option<String>)> {
        Ok((
            DocRow {
                uri: row.get(0)?,
                title: row.get(1)?,
                content: row.get(2)?,
                status: row.get(3)?,
                created: parse_time(row.get::<_, Option<String>>(5)?),
                last_accessed: parse_time(row.get::<_, Option<String>>(6)?),
            },
            row.get(4)?,
        ))
    };

    let rows: Vec<(DocRow, Option<String>)> = match &folder_prefix {
        Some(prefix) => stmt
            .query_map(params![prefix], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?,
        None => stmt
            .query_map([], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?,
    };

    Ok(rows
        .into_iter()
        .filter(|(_, tags)| tags_match(tags.as_deref(), required_tags))
        .map(|(doc, _)| doc)
        .collect())
}

fn tags_match(stored: Option<&str>, required: &[String]) -> bool {
    if required.is_empty() {
        return true;
    }
    let stored: Vec<String> = stored
        .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
        .unwrap_or_default();
    required.iter().all(|want| {
        stored
            .iter()
            .any(|have| have.eq_ignore_ascii_case(want))
    })
}

/// Literal occurrence scoring; only documents with score > 0 are candidates.
fn lexical_candidates<'a>(
    documents: &'a [DocRow],
    terms: &[String],
    limit: usize,
) -> Vec<(&'a DocRow, f64)> {
    let mut results: Vec<(&DocRow, f64)> = documents
        .iter()
        .filter_map(|doc| {
            let score = lexical_score(terms, &doc.title, &doc.content);
            (score > 0.0).then_some((doc, score))
        })
        .collect();

    results.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.uri.cmp(&b.0.uri))
    });
    results.truncate(limit);
    results
}

/// Per informative term: case-insensitive occurrence count in the body, plus
/// a flat bonus when the term appears in the title.
fn lexical_score(terms: &[String], title: &str, content: &str) -> f64 {
    let content_lower = content.to_lowercase();
    let title_lower = title.to_lowercase();

    let mut score = 0.0;
    for term in terms {
        score += content_lower.matches(term.as_str()).count() as f64;
        if title_lower.contains(term.as_str()) {
            score += TITLE_BONUS;
        }
    }
    score
}

/// KNN over stored document embeddings. Returns indexes into `documents`
/// with cosine similarity; `None` signals degraded (no provider / embed
/// failure) so callers fall back to lexical-only scoring.
fn semantic_candidates(
    conn: &Connection,
    provider: Option<&dyn EmbeddingProvider>,
    query: &str,
    limit: usize,
    documents: &[DocRow],
) -> Option<Vec<(usize, f64)>> {
    let provider = provider?;
    let embedding = match provider.embed(query) {
        Ok(vector) => vector,
        Err(err) => {
            warn!(error = %err, "query embedding failed; degrading to lexical-only");
            return None;
        }
    };

    let knn = (|| -> Result<Vec<(String, f64)>> {
        let mut stmt = conn.prepare(
            "SELECT document_uri, distance FROM vec_documents \
             WHERE embedding MATCH ?1 ORDER BY distance LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![embedding_to_bytes(&embedding), limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })();

    let rows = match knn {
        Ok(rows) => rows,
        Err(err) => {
            warn!(error = %err, "vector search failed; degrading to lexical-only");
            return None;
        }
    };

    let by_uri: HashMap<&str, usize> = documents
        .iter()
        .enumerate()
        .map(|(i, d)| (d.uri.as_str(), i))
        .collect();

    // Dropping URIs outside `documents` applies the folder/tag filters
    Some(
        rows.into_iter()
            .filter_map(|(uri, distance)| {
                by_uri
                    .get(uri.as_str())
                    .map(|&index| (index, l2_distance_to_cosine(distance)))
            })
            .collect(),
    )
}

fn decay_weight(config: &DecayConfig, doc: &DocRow, now: DateTime<Utc>) -> f64 {
    decay::document_weight(
        config,
        &doc.uri,
        doc.status.as_deref(),
        doc.created,
        doc.last_accessed,
        now,
    )
}

fn parse_time(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Extract a snippet centered near the first informative-term occurrence.
fn extract_snippet(content: &str, terms: &[String], max_length: usize) -> String {
    if content.is_empty() {
        return String::new();
    }

    let lower = content.to_lowercase();
    let first_byte = terms
        .iter()
        .filter_map(|term| lower.find(term.as_str()))
        .min()
        .unwrap_or(0);

    let chars: Vec<char> = content.chars().collect();
    let first_char = content[..first_byte].chars().count();
    let start = first_char.saturating_sub(20);
    let snippet: String = chars.iter().skip(start).take(max_length).collect();

    snippet.replace("\r\n", " ").replace('\n', " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::embedding::EMBEDDING_DIM;

    fn test_db() -> Connection {
        db::open_memory_database().unwrap()
    }

    fn insert_doc(conn: &Connection, uri: &str, title: &str, content: &str) {
        insert_doc_full(conn, uri, title, content, None, None, None);
    }

    fn insert_doc_full(
        conn: &Connection,
        uri: &str,
        title: &str,
        content: &str,
        tags: Option<&str>,
        created: Option<&str>,
        status: Option<&str>,
    ) {
        conn.execute(
            "INSERT INTO documents (uri, title, content, created, last_indexed, status, tags, content_hash, content_size) \
             VALUES (?1, ?2, ?3, ?4, '2026-01-01T00:00:00+00:00', ?5, ?6, 'h', ?7)",
            params![uri, title, content, created, status, tags, content.len() as i64],
        )
        .unwrap();
    }

    fn insert_vector(conn: &Connection, uri: &str, spike: usize) {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        v[spike % EMBEDDING_DIM] = 1.0;
        conn.execute(
            "INSERT INTO vec_documents (document_uri, embedding) VALUES (?1, ?2)",
            params![uri, embedding_to_bytes(&v)],
        )
        .unwrap();
    }

    /// Provider returning a unit vector with a spike at a fixed dimension.
    struct SpikeProvider(usize);

    impl EmbeddingProvider for SpikeProvider {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            let mut v = vec![0.0f32; EMBEDDING_DIM];
            v[self.0 % EMBEDDING_DIM] = 1.0;
            Ok(v)
        }
    }

    struct FailingProvider;

    impl EmbeddingProvider for FailingProvider {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(EngineError::Embedding("model offline".into()))
        }
    }

    fn request(query: &str, mode: SearchMode) -> SearchRequest {
        SearchRequest::new(query, mode)
    }

    fn run(
        conn: &Connection,
        provider: Option<&dyn EmbeddingProvider>,
        req: &SearchRequest,
    ) -> Result<SearchResponse> {
        search(
            conn,
            &DecayConfig::default(),
            &SearchConfig::default(),
            provider,
            req,
        )
    }

    #[test]
    fn informative_terms_drop_stop_words() {
        assert_eq!(
            informative_terms("The Machine and the Learning"),
            vec!["machine", "learning"]
        );
        assert!(informative_terms("the and of").is_empty());
        assert!(informative_terms("  ").is_empty());
    }

    #[test]
    fn stop_word_query_fails_in_every_mode() {
        let conn = test_db();
        insert_doc(&conn, "memory://a", "A", "some content the query could hit");

        for mode in [SearchMode::Lexical, SearchMode::Semantic, SearchMode::Hybrid] {
            let err = run(&conn, None, &request("the and of", mode)).unwrap_err();
            assert!(
                matches!(err, EngineError::NoInformativeTerms),
                "mode {mode:?} must fail structurally"
            );
        }
    }

    #[test]
    fn lexical_counts_occurrences_and_title_bonus() {
        let terms = vec!["quantum".to_string()];
        let body_only = lexical_score(&terms, "Notes", "quantum quantum quantum");
        assert_eq!(body_only, 3.0);

        let with_title = lexical_score(&terms, "Quantum Computing", "quantum once");
        assert_eq!(with_title, 6.0);

        assert_eq!(lexical_score(&terms, "Nothing", "no match here"), 0.0);
    }

    #[test]
    fn lexical_search_ranks_by_score() {
        let conn = test_db();
        insert_doc(&conn, "memory://rich", "Graph Theory", "graph graph graph graph");
        insert_doc(&conn, "memory://poor", "Notes", "one graph mention");
        insert_doc(&conn, "memory://none", "Other", "nothing relevant");

        let response = run(&conn, None, &request("graph", SearchMode::Lexical)).unwrap();
        assert_eq!(response.total_matched, 2);
        assert_eq!(response.hits[0].uri, "memory://rich");
        assert_eq!(response.hits[0].lexical_score, Some(1.0));
        assert!(response.hits[1].lexical_score.unwrap() < 1.0);
        assert!(!response.degraded);
    }

    #[test]
    fn folder_filter_limits_candidates() {
        let conn = test_db();
        insert_doc(&conn, "memory://projects/one", "One", "shared topic");
        insert_doc(&conn, "memory://journal/two", "Two", "shared topic");

        let mut req = request("topic", SearchMode::Lexical);
        req.folder = Some("projects".into());
        let response = run(&conn, None, &req).unwrap();
        assert_eq!(response.total_matched, 1);
        assert_eq!(response.hits[0].uri, "memory://projects/one");
    }

    #[test]
    fn tag_filter_requires_all_tags() {
        let conn = test_db();
        insert_doc_full(
            &conn,
            "memory://tagged",
            "Tagged",
            "topic here",
            Some(r#"["rust","graphs"]"#),
            None,
            None,
        );
        insert_doc_full(
            &conn,
            "memory://partial",
            "Partial",
            "topic here",
            Some(r#"["rust"]"#),
            None,
            None,
        );

        let mut req = request("topic", SearchMode::Lexical);
        req.tags = vec!["Rust".into(), "graphs".into()];
        let response = run(&conn, None, &req).unwrap();
        assert_eq!(response.total_matched, 1);
        assert_eq!(response.hits[0].uri, "memory://tagged");
    }

    #[test]
    fn decay_applies_before_min_score_filter() {
        let conn = test_db();
        let old = (Utc::now() - chrono::Duration::days(128)).to_rfc3339();
        let fresh = Utc::now().to_rfc3339();
        insert_doc_full(&conn, "memory://stale", "Stale", "topic topic", None, Some(&old), None);
        insert_doc_full(&conn, "memory://fresh", "Fresh", "topic topic", None, Some(&fresh), None);

        // Both normalize to 1.0; the stale one decays (power-law, 100 days
        // past grace → 0.1), dropping below the threshold
        let mut req = request("topic", SearchMode::Lexical);
        req.min_score = 0.5;
        let response = run(&conn, None, &req).unwrap();
        assert_eq!(response.total_matched, 1);
        assert_eq!(response.hits[0].uri, "memory://fresh");
    }

    #[test]
    fn pagination_slices_after_ranking() {
        let conn = test_db();
        for i in 0..5 {
            let occurrences = "topic ".repeat(5 - i);
            insert_doc(&conn, &format!("memory://doc{i}"), "T", &occurrences);
        }

        let mut req = request("topic", SearchMode::Lexical);
        req.page_size = 2;
        let page1 = run(&conn, None, &req).unwrap();
        assert_eq!(page1.total_matched, 5);
        assert_eq!(page1.hits.len(), 2);
        assert_eq!(page1.hits[0].uri, "memory://doc0");

        req.page = 3;
        let page3 = run(&conn, None, &req).unwrap();
        assert_eq!(page3.hits.len(), 1);
        assert_eq!(page3.hits[0].uri, "memory://doc4");
    }

    #[test]
    fn invalid_pagination_is_rejected() {
        let conn = test_db();
        let mut req = request("topic", SearchMode::Lexical);
        req.page = 0;
        assert!(matches!(
            run(&conn, None, &req).unwrap_err(),
            EngineError::InvalidParameter { name: "page", .. }
        ));
    }

    #[test]
    fn semantic_mode_ranks_by_similarity() {
        let conn = test_db();
        insert_doc(&conn, "memory://near", "Near", "text");
        insert_doc(&conn, "memory://far", "Far", "text");
        insert_vector(&conn, "memory://near", 0);
        insert_vector(&conn, "memory://far", 100);

        let provider = SpikeProvider(0);
        let response = run(&conn, Some(&provider), &request("anything", SearchMode::Semantic)).unwrap();
        assert!(!response.degraded);
        assert_eq!(response.hits[0].uri, "memory://near");
        assert!((response.hits[0].semantic_score.unwrap() - 1.0).abs() < 1e-6);
        // Orthogonal vector → similarity 0
        let far = response.hits.iter().find(|h| h.uri == "memory://far").unwrap();
        assert!(far.semantic_score.unwrap().abs() < 1e-6);
    }

    #[test]
    fn hybrid_fuses_both_signals() {
        let conn = test_db();
        insert_doc(&conn, "memory://both", "Topic", "topic topic topic");
        insert_doc(&conn, "memory://lex-only", "Topic Heavy", "topic topic topic topic topic");
        insert_doc(&conn, "memory://sem-only", "Other", "unrelated words");
        insert_vector(&conn, "memory://both", 0);
        insert_vector(&conn, "memory://sem-only", 0);

        let provider = SpikeProvider(0);
        let response = run(&conn, Some(&provider), &request("topic", SearchMode::Hybrid)).unwrap();
        assert!(!response.degraded);
        assert_eq!(response.total_matched, 3);

        // In both lists beats lexical-only first place
        assert_eq!(response.hits[0].uri, "memory://both");
        let hit = &response.hits[0];
        assert!(hit.lexical_score.unwrap() > 0.0);
        assert!(hit.semantic_score.unwrap() > 0.0);

        // Semantic-only candidate still surfaces with a nonzero fused score
        let sem_only = response.hits.iter().find(|h| h.uri == "memory://sem-only").unwrap();
        assert!(sem_only.score > 0.0);
        assert_eq!(sem_only.lexical_score, Some(0.0));
    }

    #[test]
    fn missing_provider_degrades_to_lexical() {
        let conn = test_db();
        insert_doc(&conn, "memory://a", "Topic", "topic text");

        for mode in [SearchMode::Semantic, SearchMode::Hybrid] {
            let response = run(&conn, None, &request("topic", mode)).unwrap();
            assert!(response.degraded, "mode {mode:?} must degrade");
            assert_eq!(response.total_matched, 1);
            assert!(response.hits[0].semantic_score.is_none());
        }
    }

    #[test]
    fn failing_provider_degrades_to_lexical() {
        let conn = test_db();
        insert_doc(&conn, "memory://a", "Topic", "topic text");

        let provider = FailingProvider;
        let response = run(&conn, Some(&provider), &request("topic", SearchMode::Hybrid)).unwrap();
        assert!(response.degraded);
        assert_eq!(response.total_matched, 1);
    }

    #[test]
    fn snippet_centers_on_first_term() {
        let content = format!("{}machine learning appears here{}", "x".repeat(500), "y".repeat(500));
        let snippet = extract_snippet(&content, &["machine".to_string()], 80);
        assert!(snippet.contains("machine learning"));
        assert!(snippet.len() <= 80);
    }

    #[test]
    fn snippet_flattens_newlines() {
        let snippet = extract_snippet("line one\nline two\r\nline three", &["line".to_string()], 200);
        assert!(!snippet.contains('\n'));
    }
}
