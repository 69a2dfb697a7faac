//! Human-facing command handlers over the engine operations.

use anyhow::Result;
use mnemograph::engine::MemoryEngine;
use mnemograph::search::{SearchMode, SearchRequest};

/// Run a full corpus sync and print the per-run counters.
pub fn sync(engine: &MemoryEngine) -> Result<()> {
    let report = engine.full_sync()?;

    println!("Sync complete:");
    println!("- {} documents processed", report.documents_processed);
    println!("- {} concept mentions found", report.concepts_found);
    println!("- {} concept edges created", report.edges_created);
    if report.documents_removed > 0 {
        println!("- {} removed documents retracted", report.documents_removed);
    }
    if report.orphans_removed > 0 {
        println!("- {} orphaned concepts cleaned up", report.orphans_removed);
    }
    println!(
        "- {} communities detected (modularity {:.3})",
        report.communities_detected,
        report.modularity.unwrap_or(0.0)
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn search(
    engine: &MemoryEngine,
    query: &str,
    mode: SearchMode,
    page: usize,
    page_size: usize,
    folder: Option<String>,
    tags: Vec<String>,
    min_score: f64,
    json: bool,
) -> Result<()> {
    let mut request = SearchRequest::new(query, mode);
    request.page = page;
    request.page_size = page_size;
    request.folder = folder;
    request.tags = tags;
    request.min_score = min_score;

    let response = engine.search(&request)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if response.degraded {
        println!("(embedding provider unavailable; lexical-only results)");
    }
    println!(
        "Found {} matches (page {}):",
        response.total_matched, response.page
    );
    for hit in &response.hits {
        println!("\n{} ({})", hit.title, hit.uri);
        match (hit.lexical_score, hit.semantic_score) {
            (Some(lexical), Some(semantic)) => println!(
                "  scores — fused: {:.3} | lexical: {:.3} | semantic: {:.3}",
                hit.score, lexical, semantic
            ),
            _ => println!("  score: {:.3}", hit.score),
        }
        if !hit.snippet.is_empty() {
            println!("  {}", hit.snippet);
        }
    }
    Ok(())
}

pub fn context(
    engine: &MemoryEngine,
    concept: &str,
    depth: usize,
    max_entities: usize,
    include_content: bool,
    json: bool,
) -> Result<()> {
    let result = engine.build_context(concept, depth, max_entities, include_content)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if result.direct_relations.is_empty() {
        println!("No relations found for '{}'", result.concept);
        return Ok(());
    }

    println!("Context for '{}' (depth {}):", result.concept, result.depth);
    for relation in &result.direct_relations {
        println!(
            "- {} (co-occurs {}x; {})",
            relation.name,
            relation.co_occurrence_count,
            relation.documents.join(", ")
        );
        for (uri, preview) in &relation.content_previews {
            println!("    {uri}: {preview}");
        }
    }
    if !result.expanded_relations.is_empty() {
        println!("Expanded: {}", result.expanded_relations.join(", "));
    }
    Ok(())
}

pub fn visualize(engine: &MemoryEngine, concept: &str, depth: usize, max_nodes: usize) -> Result<()> {
    println!("{}", engine.visualize(concept, depth, max_nodes)?);
    Ok(())
}

pub fn read(engine: &MemoryEngine, uri: &str) -> Result<()> {
    match engine.read_document(uri)? {
        Some(view) => {
            println!("# {}\n", view.title);
            println!("{}", view.content);
        }
        None => println!("Document not found: {uri}"),
    }
    Ok(())
}

pub fn stats(engine: &MemoryEngine) -> Result<()> {
    let stats = engine.stats()?;
    println!("Documents:   {}", stats.documents);
    println!("Concepts:    {}", stats.concepts);
    println!("Mentions:    {}", stats.mentions);
    println!("Edges:       {}", stats.edges);
    println!("Communities: {}", stats.communities);
    println!("FTS rows:    {}", stats.fts_rows);
    println!("DB size:     {} bytes", stats.db_size_bytes);
    Ok(())
}

/// Start the watcher and block until the user presses Enter (or stdin closes).
pub fn watch(engine: &MemoryEngine, debounce_ms: Option<u64>) -> Result<()> {
    engine.start_watcher(debounce_ms)?;
    println!(
        "Watching {} for changes. Press Enter to stop.",
        engine.config().resolved_root().display()
    );

    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);

    engine.stop_watcher()?;
    println!("Watcher stopped.");
    Ok(())
}
