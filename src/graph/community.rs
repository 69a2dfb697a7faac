//! Louvain community detection over the concept graph.
//!
//! Modularity optimization (Blondel et al. 2008): a local-move phase moves
//! each node to the neighboring community with the best modularity gain,
//! repeated until no move improves. Edge weight is the co-occurrence count;
//! concepts with no edges participate as singleton nodes.
//!
//! Node-visitation order is shuffled per round. With a seed the shuffle is
//! reproducible (a fresh seeded RNG per round), without one results may vary
//! between runs on the same graph.

use crate::error::Result;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rusqlite::{params, Connection};
use std::collections::{BTreeMap, HashMap};

/// Run Louvain on the stored concept graph.
///
/// Returns the concept → community-id mapping (ids normalized to 0..K-1 in
/// ordinal name order) and the modularity of the partition.
pub fn run_louvain(
    conn: &Connection,
    gamma: f64,
    seed: Option<u64>,
) -> Result<(BTreeMap<String, usize>, f64)> {
    let mut stmt = conn.prepare(
        "SELECT concept_a, concept_b, co_occurrence_count FROM concept_edges",
    )?;
    let edges: Vec<(String, String, f64)> = stmt
        .query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get::<_, i64>(2)? as f64))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut name_to_id: HashMap<String, usize> = HashMap::new();
    let mut names: Vec<String> = Vec::new();
    let mut ensure_node = |name: &str, names: &mut Vec<String>, map: &mut HashMap<String, usize>| {
        if !map.contains_key(name) {
            map.insert(name.to_string(), names.len());
            names.push(name.to_string());
        }
    };

    for (a, b, _) in &edges {
        ensure_node(a, &mut names, &mut name_to_id);
        ensure_node(b, &mut names, &mut name_to_id);
    }

    // Isolated concepts (no edges) still get a community
    let mut stmt = conn.prepare("SELECT name FROM concepts")?;
    let all_concepts: Vec<String> = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for concept in &all_concepts {
        ensure_node(concept, &mut names, &mut name_to_id);
    }

    let n = names.len();
    if n == 0 {
        return Ok((BTreeMap::new(), 0.0));
    }

    let mut adj: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
    let mut total_weight = 0.0;
    for (a, b, w) in &edges {
        let ia = name_to_id[a];
        let ib = name_to_id[b];
        adj[ia].push((ib, *w));
        adj[ib].push((ia, *w));
        total_weight += w;
    }

    if total_weight == 0.0 {
        // No edges: every node its own community, modularity 0
        let communities = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        return Ok((normalize_ids(communities), 0.0));
    }

    let community = local_moves(&adj, total_weight, gamma, seed);
    let modularity = compute_modularity(&adj, &community, total_weight, gamma);

    let mapping: BTreeMap<String, usize> = names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), community[i]))
        .collect();

    Ok((normalize_ids(mapping), modularity))
}

/// Run Louvain and replace the `concept_communities` table with the result.
///
/// Returns (distinct community count, modularity). The table is fully
/// replaced — delete-all then batch insert, never merged.
pub fn detect_and_store(
    conn: &Connection,
    gamma: f64,
    seed: Option<u64>,
) -> Result<(usize, f64)> {
    let (communities, modularity) = run_louvain(conn, gamma, seed)?;

    conn.execute("DELETE FROM concept_communities", [])?;

    if communities.is_empty() {
        return Ok((0, 0.0));
    }

    let detected_at = Utc::now().to_rfc3339();
    let mut stmt = conn.prepare(
        "INSERT INTO concept_communities (concept_name, community_id, modularity, resolution, detected_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (name, community_id) in &communities {
        stmt.execute(params![name, *community_id as i64, modularity, gamma, detected_at])?;
    }

    let distinct = communities
        .values()
        .collect::<std::collections::HashSet<_>>()
        .len();
    Ok((distinct, modularity))
}

/// Local-move phase: repeat sweeps until no node changes community.
fn local_moves(adj: &[Vec<(usize, f64)>], m: f64, gamma: f64, seed: Option<u64>) -> Vec<usize> {
    let n = adj.len();
    let degree: Vec<f64> = adj
        .iter()
        .map(|neighbors| neighbors.iter().map(|(_, w)| w).sum())
        .collect();

    let mut community: Vec<usize> = (0..n).collect();
    let mut sum_tot: HashMap<usize, f64> = (0..n).map(|i| (i, degree[i])).collect();

    let mut improved = true;
    while improved {
        improved = false;

        let mut order: Vec<usize> = (0..n).collect();
        match seed {
            Some(s) => order.shuffle(&mut StdRng::seed_from_u64(s)),
            None => order.shuffle(&mut rand::thread_rng()),
        }

        for &i in &order {
            let current = community[i];
            let ki = degree[i];

            // Edge weight from i into each neighboring community
            let mut neighbor_weights: HashMap<usize, f64> = HashMap::new();
            for &(j, w) in &adj[i] {
                *neighbor_weights.entry(community[j]).or_insert(0.0) += w;
            }
            let ki_in_current = neighbor_weights.get(&current).copied().unwrap_or(0.0);

            // Remove i from its community before evaluating targets
            *sum_tot.get_mut(&current).unwrap() -= ki;

            let current_gain =
                ki_in_current / m - gamma * sum_tot[&current] * ki / (2.0 * m * m);

            let mut best_comm = current;
            let mut best_gain = 0.0;
            for (&target, &ki_in) in &neighbor_weights {
                let gain = ki_in / m - gamma * sum_tot[&target] * ki / (2.0 * m * m);
                let net = gain - current_gain;
                if net > best_gain {
                    best_gain = net;
                    best_comm = target;
                }
            }

            community[i] = best_comm;
            *sum_tot.get_mut(&best_comm).unwrap() += ki;

            if best_comm != current {
                improved = true;
            }
        }
    }

    community
}

/// Q = (1/2m) · Σ over adjacent pairs [w_ij − γ·k_i·k_j/(2m)] · δ(c_i, c_j)
fn compute_modularity(adj: &[Vec<(usize, f64)>], community: &[usize], m: f64, gamma: f64) -> f64 {
    if m == 0.0 {
        return 0.0;
    }

    let degree: Vec<f64> = adj
        .iter()
        .map(|neighbors| neighbors.iter().map(|(_, w)| w).sum())
        .collect();

    let mut q = 0.0;
    for (i, neighbors) in adj.iter().enumerate() {
        for &(j, w) in neighbors {
            if community[i] == community[j] {
                q += w - gamma * degree[i] * degree[j] / (2.0 * m);
            }
        }
    }

    q / (2.0 * m)
}

/// Renumber community ids to a contiguous 0..K-1 range, assigning in ordinal
/// concept-name order so identical partitions always get identical ids.
fn normalize_ids(communities: BTreeMap<String, usize>) -> BTreeMap<String, usize> {
    let mut id_map: HashMap<usize, usize> = HashMap::new();
    let mut next = 0usize;
    let mut result = BTreeMap::new();

    for (name, comm) in communities {
        let normalized = *id_map.entry(comm).or_insert_with(|| {
            let id = next;
            next += 1;
            id
        });
        result.insert(name, normalized);
    }

    result
}
