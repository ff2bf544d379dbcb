// src/dag/engine.rs
//! `build_sub_dag`, `topological_sort`, `build_history`: walk the message DAG
//! upward from a seed set of parent ids and linearize it deterministically
//! for a model prompt.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use thiserror::Error;

use crate::store::{MessageStore, Message};

use super::history::{format_history, HistoryMessage};

#[derive(Debug, Error)]
pub enum DagError {
    #[error("no parent ids supplied")]
    EmptyParents,
    #[error("sub-dag contains a cycle or is otherwise malformed")]
    InvalidDag,
    #[error("store error while building sub-dag: {0}")]
    Store(#[from] anyhow::Error),
}

/// The reachable-ancestor set of a seed, keyed by message id.
pub type SubDag = HashMap<String, Message>;

/// Breadth-first walk of `parent_ids` upward from `seed_ids`, batched through
/// `MessageStore::get_many`. Unknown ids are skipped, not fatal. The result
/// contains the seed nodes themselves.
pub async fn build_sub_dag(
    seed_ids: &[String],
    store: &dyn MessageStore,
) -> Result<SubDag, DagError> {
    let mut nodes: SubDag = HashMap::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut frontier: Vec<String> = seed_ids.to_vec();

    while !frontier.is_empty() {
        let to_fetch: Vec<String> = frontier
            .drain(..)
            .filter(|id| visited.insert(id.clone()))
            .collect();

        if to_fetch.is_empty() {
            continue;
        }

        let fetched = store.get_many(&to_fetch).await?;

        let mut next_frontier = Vec::new();
        for (id, msg) in fetched {
            next_frontier.extend(msg.parent_ids.iter().cloned());
            nodes.insert(id, msg);
        }
        frontier = next_frontier;
    }

    Ok(nodes)
}

/// Deterministic tie-break key for simultaneously-ready nodes: earliest
/// creation timestamp, then id.
#[derive(Eq, PartialEq)]
struct Candidate {
    created_at: chrono::DateTime<chrono::Utc>,
    id: String,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert so the earliest candidate sorts highest.
        other
            .created_at
            .cmp(&self.created_at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Modified Kahn's algorithm: every parent precedes its children, the sole
/// root sorts first, an uninterrupted linear run (most importantly a
/// question and its one answer) stays contiguous rather than being
/// interleaved with other ready nodes, and any remaining tie among
/// simultaneously-ready nodes breaks deterministically on creation order.
pub fn topological_sort(nodes: &SubDag) -> Result<Vec<Message>, DagError> {
    if nodes.is_empty() {
        return Ok(Vec::new());
    }

    // Children restricted to the sub-dag, and in-degree restricted the same way.
    let mut children_of: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();

    for (id, msg) in nodes {
        in_degree.entry(id.as_str()).or_insert(0);
        for parent in &msg.parent_ids {
            if nodes.contains_key(parent) {
                children_of.entry(parent.as_str()).or_default().push(id.as_str());
                *in_degree.entry(id.as_str()).or_insert(0) += 1;
            }
        }
    }

    // Static snapshot of each node's sub-dag parent count, taken before Kahn's
    // bookkeeping starts mutating `in_degree`. The chain-link check below
    // must see "exactly one sub-dag parent" as the structural property the
    // spec defines it to be, not the live, partially-decremented in-degree --
    // otherwise a merge node can look like a chain link the moment all but
    // one of its parents have been processed.
    let parent_count: HashMap<&str, usize> = in_degree.clone();

    let mut ready: BinaryHeap<Candidate> = BinaryHeap::new();
    for (id, msg) in nodes {
        if in_degree.get(id.as_str()).copied().unwrap_or(0) == 0 {
            ready.push(Candidate { created_at: msg.created_at, id: id.clone() });
        }
    }

    let mut emitted: Vec<Message> = Vec::with_capacity(nodes.len());
    let mut emitted_ids: HashSet<String> = HashSet::new();

    while let Some(candidate) = ready.pop() {
        let mut current_id = candidate.id;

        loop {
            let Some(msg) = nodes.get(&current_id) else { break };
            if !emitted_ids.insert(current_id.clone()) {
                break;
            }
            emitted.push(msg.clone());

            let children = children_of.get(current_id.as_str()).cloned().unwrap_or_default();

            // If this node has exactly one sub-dag child, and that child's
            // only sub-dag parent is this node, follow the chain directly
            // instead of returning to the ready queue -- keeps a question
            // and its one answer (or any other uninterrupted run) adjacent.
            if children.len() == 1 {
                let only_child = children[0];
                let child_parent_count = parent_count.get(only_child).copied().unwrap_or(0);
                if child_parent_count == 1 {
                    current_id = only_child.to_string();
                    continue;
                }
            }

            for child in children {
                if let Some(deg) = in_degree.get_mut(child) {
                    *deg -= 1;
                    if *deg == 0 {
                        if let Some(child_msg) = nodes.get(child) {
                            ready.push(Candidate {
                                created_at: child_msg.created_at,
                                id: child.to_string(),
                            });
                        }
                    }
                }
            }
            break;
        }
    }

    if emitted.len() != nodes.len() {
        return Err(DagError::InvalidDag);
    }

    Ok(emitted)
}

/// Compose `build_sub_dag` → `topological_sort` → `format_history`. Empty
/// `parent_ids` is not an error: it means "first question, no history" and
/// returns an empty sequence.
pub async fn build_history(
    parent_ids: &[String],
    store: &dyn MessageStore,
) -> Result<Vec<HistoryMessage>, DagError> {
    if parent_ids.is_empty() {
        return Ok(Vec::new());
    }

    let sub_dag = build_sub_dag(parent_ids, store).await?;
    let ordered = topological_sort(&sub_dag)?;
    Ok(format_history(&ordered))
}
