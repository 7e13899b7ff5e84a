//! The transition model (`spec.md` §4.T): driving distance between two
//! candidate segments at consecutive observations, and the lazy/eager
//! transition-probability tables built on top of it. Grounded in
//! `pyosmroute/osm/_osmcache.py::OSMCache.driving_distance` and
//! `TripData/lib/osm/_probabilities.py` (`transition_probability`,
//! `LazyTransitionProbabilities`, `get_all`).

use crate::cache::RoadCache;
use crate::geo;
use crate::model::{Candidate, NodeId, Observation};
use crate::routing::{self, RouteOptions, RouteStatus};
use std::collections::HashMap;

/// Driving distance between the footpoints of `s1` (at time t) and `s2`
/// (at time t+1), per `spec.md` §4.T. Returns `None` when the pair is
/// unreachable (the counterpart of the original's `(None, [])`).
pub fn driving_distance(
    cache: &RoadCache,
    s1: &Candidate,
    s2: &Candidate,
    max_dist: Option<f64>,
    grace_distance: f64,
) -> Option<(f64, Vec<NodeId>)> {
    if s1.segment.way_id == s2.segment.way_id && s1.segment.segment_index == s2.segment.segment_index
    {
        let diff = s2.alongtrack - s1.alongtrack;
        if s1.segment.oneway && diff < -grace_distance {
            let result = routing::route(
                cache,
                s1.segment.node2,
                &[s1.segment.node1],
                &RouteOptions::default(),
            );
            return if result.status == RouteStatus::Success && !result.nodes.is_empty() {
                Some((result.distance + s1.segment.length_m + diff, result.nodes))
            } else {
                None
            };
        }
        return Some((diff.abs(), Vec::new()));
    }

    // Shared-endpoint shortcuts (spec.md §4.T step 2): mutually exclusive
    // node-pair cases, each only returning if traversal is valid in that
    // direction; an invalid case falls through to full routing rather than
    // being treated as unreachable.
    if s1.segment.node1 == s2.segment.node1 {
        if !s1.segment.oneway {
            return Some((s1.alongtrack + s2.alongtrack, vec![s1.segment.node1]));
        }
    } else if s1.segment.node1 == s2.segment.node2 {
        if !s1.segment.oneway && !s2.segment.oneway {
            return Some((
                s1.alongtrack + s2.segment.length_m - s2.alongtrack,
                vec![s1.segment.node1],
            ));
        }
    } else if s1.segment.node2 == s2.segment.node1 {
        return Some((
            s1.segment.length_m - s1.alongtrack + s2.alongtrack,
            vec![s1.segment.node2],
        ));
    } else if s1.segment.node2 == s2.segment.node2 {
        if !s2.segment.oneway {
            return Some((
                s1.segment.length_m - s1.alongtrack + s2.segment.length_m - s2.alongtrack,
                vec![s1.segment.node2],
            ));
        }
    }

    let opts = RouteOptions {
        max_dist,
        ..Default::default()
    };
    let result = routing::route(cache, s1.segment.node1, &[s2.segment.node1, s2.segment.node2], &opts);
    if result.status != RouteStatus::Success || result.nodes.is_empty() {
        return None;
    }

    if s2.segment.oneway && !result.nodes.contains(&s2.segment.node1) {
        let reroute = routing::route(
            cache,
            s1.segment.node1,
            &[s2.segment.node1],
            &RouteOptions { max_dist, ..Default::default() },
        );
        if reroute.status != RouteStatus::Success || reroute.nodes.is_empty() {
            return None;
        }
        let mut nodes = reroute.nodes;
        let sdist = if nodes.contains(&s1.segment.node2) {
            if !nodes.is_empty() {
                nodes.remove(0);
            }
            -s1.alongtrack
        } else {
            s1.alongtrack
        };
        let edist = if let Some(pos) = nodes.iter().position(|&n| n == s2.segment.node2) {
            nodes.remove(pos);
            -s2.alongtrack
        } else {
            s2.alongtrack
        };
        return Some((sdist + edist + reroute.distance, nodes));
    }

    let mut nodes = result.nodes;
    let sdist = if nodes.contains(&s1.segment.node2) {
        if !nodes.is_empty() {
            nodes.remove(0);
        }
        -s1.alongtrack
    } else {
        s1.alongtrack
    };
    let edist = if nodes.last() == Some(&s2.segment.node1) {
        s2.alongtrack
    } else if nodes.last() == Some(&s2.segment.node2) {
        s2.segment.length_m - s2.alongtrack
    } else {
        // The router only succeeds when the popped node is one of the two
        // requested ends, so this is unreachable in practice.
        return None;
    };
    Some((sdist + edist + result.distance, nodes))
}

/// Transition probability between `s1` and `s2` (`spec.md` §4.T):
/// `exp(-|gps_dist - driving| / beta)`, or `0` when unreachable.
pub fn transition_probability(
    cache: &RoadCache,
    s1: &Candidate,
    s2: &Candidate,
    gps_dist: f64,
    beta: f64,
    max_dist: Option<f64>,
    grace_distance: f64,
) -> (f64, Vec<NodeId>) {
    match driving_distance(cache, s1, s2, max_dist, grace_distance) {
        Some((driving, nodes)) => ((-(gps_dist - driving).abs() / beta).exp(), nodes),
        None => (0.0, Vec::new()),
    }
}

/// Memoized `T[t, i, j]` lookup used by the Viterbi decoder, abstracting
/// over the lazy (per-row, on first access) and eager (precomputed) table
/// variants (`spec.md` §4.T).
pub trait TransitionTable {
    /// Returns the transition probability and connecting node list for
    /// `(t, i, j)`.
    fn get(&mut self, t: usize, i: usize, j: usize) -> (f64, Vec<NodeId>);
}

fn dt_seconds(obs: &[Observation], t: usize) -> f64 {
    (obs[t + 1].datetime - obs[t].datetime).num_seconds() as f64
}

/// Computes one row `T[t, i, ·]`, reusing a single `gps_dist` call across
/// all `j` (`spec.md` §4.T: "lazy table... on lookup... compute the entire
/// row... in one pass reusing gps_dist and max_dist").
fn compute_row(
    cache: &RoadCache,
    observations: &[Observation],
    states: &[Vec<Candidate>],
    beta: f64,
    grace_distance: f64,
    max_velocity: f64,
    t: usize,
    i: usize,
) -> Vec<(f64, Vec<NodeId>)> {
    let gps_dist = geo::geodist(
        (observations[t].lon, observations[t].lat),
        (observations[t + 1].lon, observations[t + 1].lat),
    )
    .unwrap_or(f64::NAN);
    let max_dist = dt_seconds(observations, t) * max_velocity;
    states[t + 1]
        .iter()
        .map(|cand_j| {
            transition_probability(
                cache,
                &states[t][i],
                cand_j,
                gps_dist,
                beta,
                Some(max_dist),
                grace_distance,
            )
        })
        .collect()
}

/// Lazy transition table: memoizes a whole `(t, i, ·)` row on first access
/// to any `(t, i, j)` cell, matching `LazyTransitionProbabilities`.
pub struct LazyTransitionTable<'a> {
    cache: &'a RoadCache,
    observations: &'a [Observation],
    states: &'a [Vec<Candidate>],
    beta: f64,
    grace_distance: f64,
    max_velocity: f64,
    rows: HashMap<(usize, usize), Vec<(f64, Vec<NodeId>)>>,
}

impl<'a> LazyTransitionTable<'a> {
    pub fn new(
        cache: &'a RoadCache,
        observations: &'a [Observation],
        states: &'a [Vec<Candidate>],
        beta: f64,
        grace_distance: f64,
        max_velocity: f64,
    ) -> Self {
        LazyTransitionTable {
            cache,
            observations,
            states,
            beta,
            grace_distance,
            max_velocity,
            rows: HashMap::new(),
        }
    }
}

impl<'a> TransitionTable for LazyTransitionTable<'a> {
    fn get(&mut self, t: usize, i: usize, j: usize) -> (f64, Vec<NodeId>) {
        let row = self.rows.entry((t, i)).or_insert_with(|| {
            compute_row(
                self.cache,
                self.observations,
                self.states,
                self.beta,
                self.grace_distance,
                self.max_velocity,
                t,
                i,
            )
        });
        row.get(j).cloned().unwrap_or((0.0, Vec::new()))
    }
}

/// Eager transition table: precomputes every row in advance, optionally in
/// parallel across `(t, i)` pairs (matches `get_all`'s `Pool` fan-out,
/// expressed with `rayon` instead of the original's process pool).
pub struct EagerTransitionTable {
    cells: HashMap<(usize, usize, usize), (f64, Vec<NodeId>)>,
}

impl EagerTransitionTable {
    pub fn build(
        cache: &RoadCache,
        observations: &[Observation],
        states: &[Vec<Candidate>],
        beta: f64,
        grace_distance: f64,
        max_velocity: f64,
    ) -> Self {
        use rayon::prelude::*;

        let tasks: Vec<(usize, usize)> = (0..states.len().saturating_sub(1))
            .flat_map(|t| (0..states[t].len()).map(move |i| (t, i)))
            .collect();

        let rows: Vec<Vec<((usize, usize, usize), (f64, Vec<NodeId>))>> = tasks
            .par_iter()
            .map(|&(t, i)| {
                compute_row(cache, observations, states, beta, grace_distance, max_velocity, t, i)
                    .into_iter()
                    .enumerate()
                    .map(|(j, cell)| ((t, i, j), cell))
                    .collect()
            })
            .collect();

        EagerTransitionTable {
            cells: rows.into_iter().flatten().collect(),
        }
    }
}

impl TransitionTable for EagerTransitionTable {
    fn get(&mut self, t: usize, i: usize, j: usize) -> (f64, Vec<NodeId>) {
        self.cells.get(&(t, i, j)).cloned().unwrap_or((0.0, Vec::new()))
    }
}
