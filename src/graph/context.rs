//! Concept-neighborhood traversal.
//!
//! [`build_context`] returns a concept's direct relations plus an N-hop
//! expansion. Traversal uses an explicit worklist with a visited set keyed by
//! normalized concept name, bounded by the depth and entity limits, so a
//! pathological graph can never exhaust the stack.

use crate::error::{EngineError, Result};
use crate::extract::normalize_concept;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet, VecDeque};

/// One directly related concept.
#[derive(Debug, Clone, Serialize)]
pub struct RelatedConcept {
    pub name: String,
    pub co_occurrence_count: i64,
    /// Up to three contributing document URIs.
    pub documents: Vec<String>,
    /// Sentence-aware previews keyed by URI (only when content is requested).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub content_previews: BTreeMap<String, String>,
}

/// Result of a context build. An unknown concept yields the empty result.
#[derive(Debug, Clone, Serialize)]
pub struct ContextResult {
    pub concept: String,
    pub depth: usize,
    pub direct_relations: Vec<RelatedConcept>,
    pub expanded_relations: Vec<String>,
}

/// Build direct + N-hop related concepts around `concept_name`.
pub fn build_context(
    conn: &Connection,
    concept_name: &str,
    depth: usize,
    max_entities: usize,
    include_content: bool,
) -> Result<ContextResult> {
    if max_entities == 0 {
        return Err(EngineError::invalid("max_entities", "must be >= 1"));
    }

    let concept = normalize_concept(concept_name);
    let mut result = ContextResult {
        concept: concept.clone(),
        depth,
        direct_relations: Vec::new(),
        expanded_relations: Vec::new(),
    };

    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM concepts WHERE name = ?1",
        params![concept],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(result);
    }

    let mut stmt = conn.prepare(
        "SELECT CASE WHEN concept_a = ?1 THEN concept_b ELSE concept_a END AS related, \
                co_occurrence_count, source_documents \
         FROM concept_edges \
         WHERE concept_a = ?1 OR concept_b = ?1 \
         ORDER BY co_occurrence_count DESC \
         LIMIT ?2",
    )?;
    let direct: Vec<(String, i64, String)> = stmt
        .query_map(params![concept, max_entities as i64], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for (related, count, raw_sources) in &direct {
        let sources: Vec<String> = serde_json::from_str(raw_sources).unwrap_or_default();
        let documents: Vec<String> = sources.into_iter().take(3).collect();

        let mut content_previews = BTreeMap::new();
        if include_content {
            for uri in &documents {
                if let Some(content) = document_content(conn, uri)? {
                    content_previews.insert(uri.clone(), smart_preview(&content, 200, 50));
                }
            }
        }

        result.direct_relations.push(RelatedConcept {
            name: related.clone(),
            co_occurrence_count: *count,
            documents,
            content_previews,
        });
    }

    if depth > 1 {
        result.expanded_relations =
            expand_worklist(conn, &concept, &direct, depth, max_entities)?;
    }

    Ok(result)
}

/// Breadth-first expansion from the top direct relations, depth- and
/// entity-bounded.
fn expand_worklist(
    conn: &Connection,
    origin: &str,
    direct: &[(String, i64, String)],
    depth: usize,
    max_entities: usize,
) -> Result<Vec<String>> {
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(origin.to_string());

    let mut worklist: VecDeque<(String, usize)> = VecDeque::new();
    for (related, _, _) in direct.iter().take(5) {
        visited.insert(related.clone());
        worklist.push_back((related.clone(), 1));
    }

    let mut expanded = Vec::new();
    let mut stmt = conn.prepare(
        "SELECT DISTINCT CASE WHEN concept_a = ?1 THEN concept_b ELSE concept_a END \
         FROM concept_edges WHERE concept_a = ?1 OR concept_b = ?1",
    )?;

    while let Some((current, current_depth)) = worklist.pop_front() {
        if current_depth >= depth || expanded.len() >= max_entities {
            continue;
        }

        let neighbors: Vec<String> = stmt
            .query_map(params![current], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for neighbor in neighbors {
            if expanded.len() >= max_entities {
                break;
            }
            if visited.insert(neighbor.clone()) {
                expanded.push(neighbor.clone());
                worklist.push_back((neighbor, current_depth + 1));
            }
        }
    }

    Ok(expanded)
}

/// Render the bounded neighborhood of a concept as Mermaid diagram source.
pub fn visualize(
    conn: &Connection,
    concept_name: &str,
    depth: usize,
    max_nodes: usize,
) -> Result<String> {
    if max_nodes == 0 {
        return Err(EngineError::invalid("max_nodes", "must be >= 1"));
    }

    let concept = normalize_concept(concept_name);
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM concepts WHERE name = ?1",
        params![concept],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(format!("graph TD\n    %% concept not found: {concept}"));
    }

    // Bounded BFS to pick the node set
    let mut nodes: Vec<String> = vec![concept.clone()];
    let mut visited: HashSet<String> = nodes.iter().cloned().collect();
    let mut frontier: VecDeque<(String, usize)> = VecDeque::new();
    frontier.push_back((concept.clone(), 0));

    let mut neighbor_stmt = conn.prepare(
        "SELECT CASE WHEN concept_a = ?1 THEN concept_b ELSE concept_a END \
         FROM concept_edges WHERE concept_a = ?1 OR concept_b = ?1 \
         ORDER BY co_occurrence_count DESC",
    )?;

    while let Some((current, current_depth)) = frontier.pop_front() {
        if current_depth >= depth || nodes.len() >= max_nodes {
            continue;
        }
        let neighbors: Vec<String> = neighbor_stmt
            .query_map(params![current], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for neighbor in neighbors {
            if nodes.len() >= max_nodes {
                break;
            }
            if visited.insert(neighbor.clone()) {
                nodes.push(neighbor.clone());
                frontier.push_back((neighbor, current_depth + 1));
            }
        }
    }

    // Edges among the selected nodes
    let index: BTreeMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let mut out = String::from("graph TD\n");
    for (i, name) in nodes.iter().enumerate() {
        out.push_str(&format!("    n{i}[\"{}\"]\n", name.replace('"', "'")));
    }

    let mut edge_stmt = conn.prepare(
        "SELECT concept_a, concept_b, co_occurrence_count FROM concept_edges",
    )?;
    let edges: Vec<(String, String, i64)> = edge_stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for (a, b, weight) in edges {
        if let (Some(&ia), Some(&ib)) = (index.get(a.as_str()), index.get(b.as_str())) {
            out.push_str(&format!("    n{ia} ---|{weight}| n{ib}\n"));
        }
    }

    Ok(out)
}

fn document_content(conn: &Connection, uri: &str) -> Result<Option<String>> {
    use rusqlite::OptionalExtension;
    Ok(conn
        .query_row(
            "SELECT content FROM documents WHERE uri = ?1",
            params![uri],
            |row| row.get(0),
        )
        .optional()?)
}

/// Truncate `content` near `target_length`, preferring a sentence boundary,
/// then a paragraph break, then a word boundary.
pub fn smart_preview(content: &str, target_length: usize, tolerance: usize) -> String {
    let chars: Vec<char> = content.chars().collect();
    if chars.len() <= target_length {
        return content.to_string();
    }

    let max_length = (target_length + tolerance).min(chars.len());
    let search_space: String = chars[..max_length].iter().collect();
    let floor = target_length.saturating_sub(tolerance);

    if let Some(end) = last_sentence_boundary(&search_space) {
        if end >= floor {
            let preview: String = search_space.chars().take(end + 1).collect();
            return preview.trim_end().to_string();
        }
    }

    if let Some(end) = search_space.rfind("\n\n") {
        let end_chars = search_space[..end].chars().count();
        if end_chars >= floor {
            return format!("{}...", search_space[..end].trim_end());
        }
    }

    if let Some(end) = search_space.rfind(' ') {
        if end > 0 {
            return format!("{}...", search_space[..end].trim_end());
        }
    }

    let hard: String = chars[..target_length].iter().collect();
    format!("{hard}...")
}

/// Index (in chars) of the last sentence-ending punctuation followed by
/// whitespace, or at the very end of the text.
fn last_sentence_boundary(text: &str) -> Option<usize> {
    let chars: Vec<char> = text.chars().collect();
    let mut last = None;

    for i in 0..chars.len() {
        let is_terminal = matches!(chars[i], '.' | '!' | '?');
        if !is_terminal {
            continue;
        }
        let followed_by_break = chars
            .get(i + 1)
            .map(|c| *c == ' ' || *c == '\n')
            .unwrap_or(true);
        if followed_by_break {
            last = Some(i);
        }
    }

    last
}
