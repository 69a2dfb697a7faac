//! Community detection over a synced corpus: determinism, replacement
//! semantics, and the degenerate no-edge case.

mod helpers;

use helpers::{test_engine, write_doc};
use mnemograph::db;
use std::collections::BTreeMap;
use tempfile::TempDir;

fn assignments(engine: &mnemograph::MemoryEngine) -> BTreeMap<String, i64> {
    let conn = db::open_database(engine.config().resolved_db_path()).unwrap();
    let mut stmt = conn
        .prepare("SELECT concept_name, community_id FROM concept_communities")
        .unwrap();
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .collect::<Result<BTreeMap<String, i64>, _>>()
        .unwrap();
    rows
}

/// Two topic clusters bridged by nothing: rust-themed and cooking-themed.
fn clustered_corpus(dir: &TempDir) {
    write_doc(dir, "r1.md", "[[rust]] [[ownership]] [[borrowing]]");
    write_doc(dir, "r2.md", "[[rust]] [[ownership]]");
    write_doc(dir, "r3.md", "[[rust]] [[borrowing]]");
    write_doc(dir, "c1.md", "[[bread]] [[yeast]] [[flour]]");
    write_doc(dir, "c2.md", "[[bread]] [[yeast]]");
    write_doc(dir, "c3.md", "[[bread]] [[flour]]");
}

#[test]
fn full_sync_populates_community_assignments() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir);
    clustered_corpus(&dir);

    let report = engine.full_sync().unwrap();
    assert_eq!(report.communities_detected, 2);
    assert!(report.modularity.unwrap() > 0.0);

    let map = assignments(&engine);
    assert_eq!(map.len(), 6);
    assert_eq!(map["rust"], map["ownership"]);
    assert_eq!(map["rust"], map["borrowing"]);
    assert_eq!(map["bread"], map["yeast"]);
    assert_eq!(map["bread"], map["flour"]);
    assert_ne!(map["rust"], map["bread"]);
}

#[test]
fn same_seed_yields_identical_runs() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir);
    clustered_corpus(&dir);
    engine.full_sync().unwrap();

    let (count1, mod1) = engine.detect_communities().unwrap();
    let run1 = assignments(&engine);
    let (count2, mod2) = engine.detect_communities().unwrap();
    let run2 = assignments(&engine);

    assert_eq!(count1, count2);
    assert!((mod1 - mod2).abs() < 1e-9);
    assert_eq!(run1, run2);
}

#[test]
fn no_edges_gives_singletons_with_zero_modularity() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir);

    // One concept per document: no co-occurrence anywhere
    write_doc(&dir, "a.md", "[[alpha]]");
    write_doc(&dir, "b.md", "[[beta]]");
    write_doc(&dir, "c.md", "[[gamma]]");

    let report = engine.full_sync().unwrap();
    assert_eq!(report.communities_detected, 3);
    assert!((report.modularity.unwrap()).abs() < 1e-12);

    let map = assignments(&engine);
    let distinct: std::collections::HashSet<i64> = map.values().copied().collect();
    assert_eq!(distinct.len(), 3);
}

#[test]
fn detection_fully_replaces_previous_run() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir);
    clustered_corpus(&dir);
    engine.full_sync().unwrap();
    assert_eq!(assignments(&engine).len(), 6);

    // Shrink the corpus to one cluster; the next full sync must leave no
    // stale assignments behind
    for name in ["c1.md", "c2.md", "c3.md"] {
        std::fs::remove_file(dir.path().join("memory").join(name)).unwrap();
    }
    let report = engine.full_sync().unwrap();
    assert_eq!(report.communities_detected, 1);

    let map = assignments(&engine);
    assert_eq!(map.len(), 3);
    assert!(!map.contains_key("bread"));
}

#[test]
fn resolution_parameter_is_recorded() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir);
    clustered_corpus(&dir);
    engine.full_sync().unwrap();

    let conn = db::open_database(engine.config().resolved_db_path()).unwrap();
    let (resolution, rows): (f64, i64) = conn
        .query_row(
            "SELECT resolution, COUNT(*) FROM concept_communities",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!(resolution, 1.0);
    assert_eq!(rows, 6);
}
