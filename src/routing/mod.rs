//! The routing engine (`spec.md` §4.A): weighted, multi-destination,
//! best-first search on the road cache's adjacency with a geodesic
//! admissible heuristic toward the centroid of the destination nodes.
//! Grounded in `pyosmroute/osm/_routing.py::Router` (insertion-ordered
//! queue, `maxdistance` heuristic field, first-seen-wins de-duplication).
//!
//! The queue is a [`priority_queue::PriorityQueue`] keyed on
//! `(est_total, insertion_sequence)` rather than the original's manually
//! insertion-sorted `Vec`, which gives the same "lowest heuristic first,
//! earliest-inserted wins ties" ordering (`DESIGN.md` Open Question 7)
//! without a linear scan per push.

use crate::cache::RoadCache;
use crate::geo;
use crate::model::NodeId;
use ordered_float::OrderedFloat;
use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

/// Terminal outcome of a [`route`] call (`spec.md` §4.A).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStatus {
    Success,
    NoSuchNode,
    NoRoute,
    GaveUp,
}

#[derive(Debug, Clone)]
pub struct RouteResult {
    pub status: RouteStatus,
    pub nodes: Vec<NodeId>,
    pub distance: f64,
}

impl RouteResult {
    fn failed(status: RouteStatus) -> Self {
        RouteResult {
            status,
            nodes: Vec::new(),
            distance: 0.0,
        }
    }
}

/// Per-call routing parameters (`spec.md` §4.A inputs).
#[derive(Debug, Clone)]
pub struct RouteOptions {
    pub max_dist: Option<f64>,
    pub max_count: usize,
    pub seed: Option<NodeId>,
    pub exclude: Vec<NodeId>,
    pub use_weights: bool,
}

impl Default for RouteOptions {
    fn default() -> Self {
        RouteOptions {
            max_dist: None,
            max_count: 1_000_000,
            seed: None,
            exclude: Vec::new(),
            use_weights: true,
        }
    }
}

struct QueueEntry {
    distance: f64,
    weighted_distance: f64,
    nodes: Vec<NodeId>,
}

type Priority = Reverse<(OrderedFloat<f64>, u64)>;

#[allow(clippy::too_many_arguments)]
fn try_enqueue(
    queue: &mut PriorityQueue<NodeId, Priority>,
    entries: &mut HashMap<NodeId, QueueEntry>,
    seq: &mut u64,
    cache: &RoadCache,
    centroid: (f64, f64),
    use_weights: bool,
    prev: &QueueEntry,
    to: NodeId,
    weight: f64,
    distance: f64,
) {
    // First-seen-wins: a node already present in the queue keeps its
    // earlier (lower-seq, and by construction no-worse) entry.
    if entries.contains_key(&to) {
        return;
    }
    if use_weights && weight == 0.0 {
        return;
    }
    let weighted_step = if use_weights { distance / weight } else { distance };
    let weighted_distance = prev.weighted_distance + weighted_step;
    let total_distance = prev.distance + distance;
    let mut nodes = prev.nodes.clone();
    nodes.push(to);

    let to_pos = cache.node(to).map(|n| (n.lon, n.lat));
    let heuristic = to_pos
        .and_then(|p| geo::geodist(p, centroid).ok())
        .unwrap_or(0.0);
    let est_total = weighted_distance + heuristic;

    entries.insert(
        to,
        QueueEntry {
            distance: total_distance,
            weighted_distance,
            nodes,
        },
    );
    *seq += 1;
    queue.push(to, Reverse((OrderedFloat(est_total), *seq)));
}

fn centroid_of(cache: &RoadCache, nodes: &[NodeId]) -> (f64, f64) {
    let points: Vec<(f64, f64)> = nodes
        .iter()
        .filter_map(|n| cache.node(*n).map(|nd| (nd.lon, nd.lat)))
        .collect();
    if points.is_empty() {
        return (0.0, 0.0);
    }
    let n = points.len() as f64;
    let (sx, sy) = points.iter().fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));
    (sx / n, sy / n)
}

/// Weighted best-first search from `start` to any node in `ends`
/// (`spec.md` §4.A).
pub fn route(cache: &RoadCache, start: NodeId, ends: &[NodeId], opts: &RouteOptions) -> RouteResult {
    if cache.neighbors(start).is_none() {
        return RouteResult::failed(RouteStatus::NoSuchNode);
    }

    let centroid = centroid_of(cache, ends);
    let mut closed: HashSet<NodeId> = opts.exclude.iter().copied().collect();
    closed.insert(start);

    let mut queue: PriorityQueue<NodeId, Priority> = PriorityQueue::new();
    let mut entries: HashMap<NodeId, QueueEntry> = HashMap::new();
    let mut seq: u64 = 0;

    let blank = QueueEntry {
        distance: 0.0,
        weighted_distance: 0.0,
        nodes: vec![start],
    };

    if let Some(neighbors) = cache.neighbors(start) {
        if let Some(seed) = opts.seed {
            if let Some(seg) = neighbors.get(&seed) {
                try_enqueue(
                    &mut queue, &mut entries, &mut seq, cache, centroid, opts.use_weights, &blank,
                    seed, seg.weight, seg.length_m,
                );
            }
        }
        for (&nbr, seg) in neighbors.iter() {
            if Some(nbr) == opts.seed {
                continue;
            }
            try_enqueue(
                &mut queue, &mut entries, &mut seq, cache, centroid, opts.use_weights, &blank, nbr,
                seg.weight, seg.length_m,
            );
        }
    }

    for _ in 0..opts.max_count {
        let (node, _) = match queue.pop() {
            Some(x) => x,
            None => return RouteResult::failed(RouteStatus::NoRoute),
        };
        if closed.contains(&node) {
            continue;
        }
        let entry = match entries.remove(&node) {
            Some(e) => e,
            None => continue,
        };
        if ends.contains(&node) {
            return RouteResult {
                status: RouteStatus::Success,
                nodes: entry.nodes,
                distance: entry.distance,
            };
        }
        closed.insert(node);

        if let Some(max_dist) = opts.max_dist {
            if entry.distance > max_dist {
                continue;
            }
        }

        if let Some(neighbors) = cache.neighbors(node) {
            for (&nbr, seg) in neighbors.iter() {
                if closed.contains(&nbr) {
                    continue;
                }
                try_enqueue(
                    &mut queue, &mut entries, &mut seq, cache, centroid, opts.use_weights, &entry,
                    nbr, seg.weight, seg.length_m,
                );
            }
        }
    }

    RouteResult::failed(RouteStatus::GaveUp)
}
