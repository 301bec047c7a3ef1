//! Read path — candidate retrieval, waypoint expansion, re-ranking.
//!
//! Candidates come from the vector index per sector (over-fetched), are
//! merged and de-duplicated, then expanded through the waypoint edge graph
//! under a hard visit bound. The final order is a weighted blend of cosine
//! similarity, decayed salience, recency, and a path bonus for memories
//! reached through associative expansion. Each result carries the waypoint
//! path that led to it.

use rusqlite::Connection;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::config::{HsgConfig, RetrievalConfig};
use crate::db::now_ms;
use crate::error::{check_deadline, Deadline, Result};
use crate::index::{cosine_similarity, VectorIndex};

use super::decay::{effective_salience, last_sweep, touch_seen};
use super::types::{Memory, QueryResponse, ScoredMemory, Sector};
use super::waypoint;

const MS_PER_DAY: f64 = 86_400_000.0;

/// Parameters of one contextual query.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pub user: Option<String>,
    /// Restrict to these sectors; `None` searches all five.
    pub sectors: Option<Vec<Sector>>,
    pub k: usize,
    /// Candidates fetched per sector before merging (k · F).
    pub fetch: usize,
    pub min_salience: Option<f64>,
    pub deadline: Option<Deadline>,
}

struct Candidate {
    memory: Memory,
    similarity: f64,
    salience: f64,
    path: Vec<String>,
    path_bonus: f64,
}

/// Run a contextual query against the HSG.
pub fn query(
    conn: &Connection,
    index: &dyn VectorIndex,
    query_vec: &[f32],
    params: &QueryParams,
    retrieval: &RetrievalConfig,
    hsg: &HsgConfig,
) -> Result<QueryResponse> {
    check_deadline(params.deadline)?;
    let now = now_ms();
    let sweep_at = last_sweep(conn)?;
    let user = params.user.as_deref();

    let sectors: Vec<Sector> = params
        .sectors
        .clone()
        .unwrap_or_else(|| Sector::ALL.to_vec());

    // 1. Candidate retrieval per sector; de-duplicate by id keeping max score.
    let mut merged: HashMap<String, f64> = HashMap::new();
    let mut degraded = false;
    for &sector in &sectors {
        let out = index.search(conn, sector, query_vec, params.fetch.max(params.k), user)?;
        degraded |= out.degraded;
        for hit in out.hits {
            let entry = merged.entry(hit.id).or_insert(f64::MIN);
            *entry = entry.max(f64::from(hit.score));
        }
    }
    check_deadline(params.deadline)?;

    let candidate_ids: Vec<&str> = merged.keys().map(String::as_str).collect();
    let rows = super::fetch_memories(conn, &candidate_ids)?;

    let mut candidates: HashMap<String, Candidate> = HashMap::new();
    for (id, similarity) in &merged {
        // Vector rows can momentarily outlive (or precede) their memory
        // row; such partials are skipped, not errors.
        let Some(memory) = rows.get(id) else { continue };
        if !visible(memory, user, params.min_salience, sweep_at, now, hsg) {
            continue;
        }
        let salience = effective_salience(memory, sweep_at, now, hsg);
        candidates.insert(
            id.clone(),
            Candidate {
                memory: memory.clone(),
                similarity: *similarity,
                salience,
                path: Vec::new(),
                path_bonus: 0.0,
            },
        );
    }

    // 2. Waypoint expansion from the top-N direct candidates.
    let mut seeds: Vec<(&String, f64)> = candidates
        .iter()
        .map(|(id, c)| (id, c.similarity))
        .collect();
    seeds.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    let seed_ids: Vec<String> = seeds
        .iter()
        .take(retrieval.expansion_seeds)
        .map(|(id, _)| (*id).clone())
        .collect();

    let seed_refs: Vec<&str> = seed_ids.iter().map(String::as_str).collect();
    let seed_owners = waypoint::owners(conn, &seed_refs)?;

    // Direct candidates record their owning waypoint as a one-hop path.
    for (memory_id, wp) in &seed_owners {
        if let Some(c) = candidates.get_mut(memory_id) {
            c.path = vec![wp.id.clone()];
        }
    }

    let expanded = expand(conn, &seed_owners, retrieval.max_expansion, hsg)?;
    check_deadline(params.deadline)?;

    // 3. Pull members of expanded waypoints into the candidate pool.
    for visit in &expanded {
        let Some(wp) = waypoint::get(conn, &visit.waypoint_id)? else { continue };
        for member in &wp.member_ids {
            if candidates.contains_key(member) {
                continue;
            }
            let member_rows = super::fetch_memories(conn, &[member.as_str()])?;
            let Some(memory) = member_rows.get(member) else { continue };
            if !visible(memory, user, params.min_salience, sweep_at, now, hsg) {
                continue;
            }
            // Skip members whose vector row has not landed yet.
            let Some(v) = index.get(conn, member, wp.sector)? else { continue };
            let salience = effective_salience(memory, sweep_at, now, hsg);
            candidates.insert(
                member.clone(),
                Candidate {
                    memory: memory.clone(),
                    similarity: f64::from(cosine_similarity(query_vec, &v)),
                    salience,
                    path: visit.path.clone(),
                    path_bonus: 1.0 / (1.0 + visit.depth as f64),
                },
            );
        }
    }

    // 4. Re-rank: α·cosine + β·salience + γ·recency + δ·path_bonus.
    let mut results: Vec<ScoredMemory> = candidates
        .into_values()
        .map(|c| {
            let age_days = ((now - c.memory.last_seen_at).max(0) as f64) / MS_PER_DAY;
            let recency = (-std::f64::consts::LN_2 * age_days / retrieval.recency_half_life_days).exp();
            let score = retrieval.weight_cosine * c.similarity
                + retrieval.weight_salience * c.salience
                + retrieval.weight_recency * recency
                + retrieval.weight_path * c.path_bonus;
            let mut memory = c.memory;
            memory.salience = c.salience;
            ScoredMemory {
                memory,
                similarity: c.similarity,
                score,
                path: c.path,
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.memory.id.cmp(&b.memory.id))
    });
    results.truncate(params.k);

    // 5. Lazy decay + recency stamp for everything returned.
    let returned_ids: Vec<&str> = results.iter().map(|r| r.memory.id.as_str()).collect();
    touch_seen(conn, &returned_ids, hsg)?;

    Ok(QueryResponse { results, degraded })
}

fn visible(
    memory: &Memory,
    user: Option<&str>,
    min_salience: Option<f64>,
    sweep_at: i64,
    now: i64,
    hsg: &HsgConfig,
) -> bool {
    // The index pre-filters scoped queries, but waypoint members and
    // post-filtered backends cross tenant lines; re-check here.
    if let Some(u) = user {
        if memory.user_id != u {
            return false;
        }
    }
    if let Some(floor) = min_salience {
        if effective_salience(memory, sweep_at, now, hsg) < floor {
            return false;
        }
    }
    true
}

struct ExpansionVisit {
    waypoint_id: String,
    /// Waypoint ids from the seed to this waypoint, inclusive.
    path: Vec<String>,
    depth: usize,
}

/// Breadth-first traversal of waypoint edges from the seed waypoints.
///
/// `max_visits` is a hard cap on neighbors visited, checked before each
/// neighbor is taken — never after a batch.
fn expand(
    conn: &Connection,
    seed_owners: &HashMap<String, waypoint::Waypoint>,
    max_visits: usize,
    hsg: &HsgConfig,
) -> Result<Vec<ExpansionVisit>> {
    let mut visits: Vec<ExpansionVisit> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut frontier: VecDeque<(String, Vec<String>, usize)> = VecDeque::new();

    // Deterministic seed order.
    let mut seed_waypoints: Vec<&waypoint::Waypoint> = seed_owners.values().collect();
    seed_waypoints.sort_by(|a, b| a.id.cmp(&b.id));
    seed_waypoints.dedup_by(|a, b| a.id == b.id);
    for wp in seed_waypoints {
        if seen.insert(wp.id.clone()) {
            frontier.push_back((wp.id.clone(), vec![wp.id.clone()], 0));
        }
    }

    let mut visited_neighbors = 0usize;
    'expansion: while let Some((wid, path, depth)) = frontier.pop_front() {
        for (neighbor, _weight) in waypoint::neighbors(conn, &wid, hsg.max_waypoint_neighbors)? {
            if visited_neighbors >= max_visits {
                break 'expansion;
            }
            visited_neighbors += 1;
            if !seen.insert(neighbor.clone()) {
                continue;
            }
            let mut neighbor_path = path.clone();
            neighbor_path.push(neighbor.clone());
            visits.push(ExpansionVisit {
                waypoint_id: neighbor.clone(),
                path: neighbor_path.clone(),
                depth: depth + 1,
            });
            frontier.push_back((neighbor, neighbor_path, depth + 1));
        }
    }

    Ok(visits)
}
