#![allow(dead_code)]

use mnemograph::config::EngineConfig;
use mnemograph::embedding::{EmbeddingProvider, EMBEDDING_DIM};
use mnemograph::engine::MemoryEngine;
use mnemograph::error::Result;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Engine config rooted in a temp directory, with a fixed Louvain seed so
/// community assertions are reproducible.
pub fn test_config(dir: &TempDir) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.storage.root = dir.path().join("memory").to_string_lossy().into_owned();
    config.storage.db_path = dir.path().join("memory.db").to_string_lossy().into_owned();
    config.community.seed = Some(42);
    config.watcher.debounce_ms = 50;
    config.watcher.community_debounce_ms = 100;
    std::fs::create_dir_all(dir.path().join("memory")).unwrap();
    config
}

pub fn test_engine(dir: &TempDir) -> MemoryEngine {
    MemoryEngine::new(test_config(dir))
}

pub fn test_engine_with_embeddings(dir: &TempDir) -> MemoryEngine {
    MemoryEngine::with_provider(test_config(dir), Arc::new(BagOfWordsEmbedder))
}

/// Write a corpus file relative to the engine's memory root.
pub fn write_doc(dir: &TempDir, rel: &str, content: &str) -> PathBuf {
    let path = dir.path().join("memory").join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

/// Deterministic embedding provider: hashes each lowercased token into a
/// dimension and L2-normalizes, so texts sharing words land near each other.
pub struct BagOfWordsEmbedder;

impl EmbeddingProvider for BagOfWordsEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        for token in text.to_lowercase().split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            v[(hasher.finish() as usize) % EMBEDDING_DIM] += 1.0;
        }

        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        } else {
            v[0] = 1.0;
        }
        Ok(v)
    }
}
