//! The in-memory road-graph cache: materializes `ways`, `nodes`, and a
//! bidirectional adjacency (`routing[from][to] -> Segment`) from a set of
//! way ids (`spec.md` §4.R), and fits observations against a way's
//! segments (`spec.md` §4.S). Grounded in
//! `pyosmroute/osm/_osmcache.py::OSMCache` (`addways`/`_addlink`/
//! `get_segment`), generalized from that class's mutable dict-of-dicts into
//! an `IndexMap`-backed adjacency so routing's first-seen-wins tie-break
//! (`DESIGN.md` Open Question 7) stays reproducible across runs.

use crate::error::CacheError;
use crate::geo;
use crate::model::{Candidate, Node, NodeId, Segment, TransportMode, Way, WayId};
use crate::store::SpatialStore;
use indexmap::IndexMap;
use std::collections::HashMap;

/// A read-only-after-build road graph for one matching run.
#[derive(Debug, Clone)]
pub struct RoadCache {
    nodes: HashMap<NodeId, Node>,
    ways: HashMap<WayId, Way>,
    routing: HashMap<NodeId, IndexMap<NodeId, Segment>>,
    mode: TransportMode,
}

fn is_oneway(tags: &std::collections::BTreeMap<String, String>) -> bool {
    tags.get("oneway")
        .map(|v| matches!(v.as_str(), "yes" | "true" | "1"))
        .unwrap_or(false)
}

impl RoadCache {
    /// Builds a cache from the union of way ids returned by candidate query
    /// (`spec.md` §4.Q/§4.R): one bulk `ways` fetch, one bulk `nodes` fetch.
    pub fn build(
        store: &dyn SpatialStore,
        way_ids: &[WayId],
        mode: TransportMode,
    ) -> Result<RoadCache, CacheError> {
        let way_records = store.ways(way_ids)?;

        let mut referenced_node_ids: Vec<NodeId> = way_records
            .iter()
            .flat_map(|w| w.node_ids.iter().copied())
            .collect();
        referenced_node_ids.sort_unstable_by_key(|n| n.0);
        referenced_node_ids.dedup();

        let node_records = store.nodes(&referenced_node_ids)?;
        let nodes: HashMap<NodeId, Node> = node_records
            .into_iter()
            .map(|n| {
                (
                    n.id,
                    Node {
                        id: n.id,
                        lon: n.lon,
                        lat: n.lat,
                        tags: n.tags,
                    },
                )
            })
            .collect();

        let mut ways: HashMap<WayId, Way> = HashMap::with_capacity(way_records.len());
        let mut routing: HashMap<NodeId, IndexMap<NodeId, Segment>> = HashMap::new();
        let tag_key = match mode {
            TransportMode::Train => "railway",
            _ => "highway",
        };

        for rec in way_records {
            let oneway = is_oneway(&rec.tags);
            let type_tag = rec.tags.get(tag_key).cloned().unwrap_or_default();
            let name = rec.tags.get("name").cloned();
            let weight = crate::model::transport_weight(mode, &type_tag);

            for k in 1..rec.node_ids.len() {
                let n1_id = rec.node_ids[k - 1];
                let n2_id = rec.node_ids[k];
                let n1 = nodes.get(&n1_id).ok_or(CacheError::MissingNode(n1_id))?;
                let n2 = nodes.get(&n2_id).ok_or(CacheError::MissingNode(n2_id))?;
                let p1 = (n1.lon, n1.lat);
                let p2 = (n2.lon, n2.lat);
                let length_m = geo::geodist(p1, p2)?;
                let bearing_deg = geo::bearing_to(p1, p2)?;

                let forward = Segment {
                    way_id: rec.id,
                    segment_index: k,
                    node1: n1_id,
                    node2: n2_id,
                    p1,
                    p2,
                    length_m,
                    bearing_deg,
                    oneway,
                    type_tag: type_tag.clone(),
                    name: name.clone(),
                    weight,
                };
                routing.entry(n1_id).or_default().insert(n2_id, forward);

                if !oneway {
                    let reverse = Segment {
                        way_id: rec.id,
                        segment_index: k,
                        node1: n2_id,
                        node2: n1_id,
                        p1: p2,
                        p2: p1,
                        length_m,
                        bearing_deg: geo::bearing_to(p2, p1)?,
                        oneway,
                        type_tag: type_tag.clone(),
                        name: name.clone(),
                        weight,
                    };
                    routing.entry(n2_id).or_default().insert(n1_id, reverse);
                }
            }

            ways.insert(
                rec.id,
                Way {
                    id: rec.id,
                    node_ids: rec.node_ids,
                    tags: rec.tags,
                },
            );
        }

        let link_count: usize = routing.values().map(|m| m.len()).sum();
        log::debug!(
            "loaded {} nodes and {} ways with {} routing links",
            nodes.len(),
            ways.len(),
            link_count
        );

        Ok(RoadCache {
            nodes,
            ways,
            routing,
            mode,
        })
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn way(&self, id: WayId) -> Option<&Way> {
        self.ways.get(&id)
    }

    /// The forward-registered outbound neighbors of `node`, in the order
    /// they were first registered (used by [`crate::routing`]'s
    /// first-seen-wins dedup for determinism).
    pub fn neighbors(&self, node: NodeId) -> Option<&IndexMap<NodeId, Segment>> {
        self.routing.get(&node)
    }

    pub fn segment(&self, from: NodeId, to: NodeId) -> Option<&Segment> {
        self.routing.get(&from).and_then(|m| m.get(&to))
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.routing.contains_key(&node) || self.nodes.contains_key(&node)
    }

    /// The forward-direction segments of `way_id`, in way-node traversal
    /// order (`spec.md` §4.S step 1).
    fn forward_segments(&self, way_id: WayId) -> Result<Vec<&Segment>, CacheError> {
        let way = self.ways.get(&way_id).ok_or(CacheError::UnknownWay(way_id))?;
        (1..way.node_ids.len())
            .map(|k| {
                self.segment(way.node_ids[k - 1], way.node_ids[k])
                    .ok_or(CacheError::MissingSegment(way_id, k))
            })
            .collect()
    }

    /// Segment fit (`spec.md` §4.S): picks the polyline segment of `way_id`
    /// minimizing squared 2D distance to `point`, then computes along-track
    /// position, foot, cross-track error, and distance from route.
    pub fn get_segment(&self, way_id: WayId, point: (f64, f64)) -> Result<Candidate, CacheError> {
        let segments = self.forward_segments(way_id)?;

        let mut best_idx = 0usize;
        let mut best_dist = f64::INFINITY;
        for (idx, seg) in segments.iter().enumerate() {
            let d = squared_point_to_segment(seg.p1, seg.p2, point);
            if d < best_dist {
                best_dist = d;
                best_idx = idx;
            }
        }
        let best = segments[best_idx];

        let raw_along = geo::along_track_distance(best.p1, best.p2, point)?;
        let alongtrack = raw_along.clamp(0.0, best.length_m);
        let foot = best.interpolate(alongtrack);
        let xte_m = geo::crosstrack_error(best.p1, best.p2, point)?.abs();
        let dist_from_route_m = geo::geodist(point, foot)?;

        Ok(Candidate {
            segment: best.clone(),
            alongtrack,
            foot,
            xte_m,
            dist_from_route_m,
        })
    }
}

/// Squared 2D distance from `p3` to the finite line segment `(p1, p2)`,
/// in raw (lon, lat) degree space. Mirrors
/// `pyosmroute/osm/_osmcache.py::_distcompare`.
fn squared_point_to_segment(p1: (f64, f64), p2: (f64, f64), p3: (f64, f64)) -> f64 {
    let (x1, y1) = p1;
    let (x2, y2) = p2;
    let (x3, y3) = p3;
    let px = x2 - x1;
    let py = y2 - y1;
    let denom = px * px + py * py;
    let u = if denom == 0.0 {
        0.0
    } else {
        ((x3 - x1) * px + (y3 - y1) * py) / denom
    }
    .clamp(0.0, 1.0);
    let x = x1 + u * px;
    let y = y1 + u * py;
    let dx = x - x3;
    let dy = y - y3;
    dx * dx + dy * dy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NodeRecord, WayRecord};
    use std::collections::BTreeMap;

    struct FixedStore {
        ways: Vec<WayRecord>,
        nodes: Vec<NodeRecord>,
    }

    impl SpatialStore for FixedStore {
        fn ways(&self, _ids: &[WayId]) -> Result<Vec<WayRecord>, crate::error::StoreError> {
            Ok(self.ways.clone())
        }
        fn nodes(&self, _ids: &[NodeId]) -> Result<Vec<NodeRecord>, crate::error::StoreError> {
            Ok(self.nodes.clone())
        }
        fn nearest_ways(
            &self,
            _point: (f64, f64),
            _radius_m: f64,
        ) -> Result<Vec<WayId>, crate::error::StoreError> {
            Ok(self.ways.iter().map(|w| w.id).collect())
        }
    }

    fn two_way_tags() -> BTreeMap<String, String> {
        let mut t = BTreeMap::new();
        t.insert("highway".to_string(), "residential".to_string());
        t
    }

    fn oneway_tags() -> BTreeMap<String, String> {
        let mut t = two_way_tags();
        t.insert("oneway".to_string(), "yes".to_string());
        t
    }

    fn straight_line_store(oneway: bool) -> FixedStore {
        FixedStore {
            ways: vec![WayRecord {
                id: WayId(1),
                node_ids: vec![NodeId(1), NodeId(2), NodeId(3)],
                tags: if oneway { oneway_tags() } else { two_way_tags() },
            }],
            nodes: vec![
                NodeRecord {
                    id: NodeId(1),
                    lon: 0.0,
                    lat: 0.0,
                    tags: BTreeMap::new(),
                },
                NodeRecord {
                    id: NodeId(2),
                    lon: 0.001,
                    lat: 0.0,
                    tags: BTreeMap::new(),
                },
                NodeRecord {
                    id: NodeId(3),
                    lon: 0.002,
                    lat: 0.0,
                    tags: BTreeMap::new(),
                },
            ],
        }
    }

    #[test]
    fn two_way_segment_has_reverse_with_swapped_endpoints() {
        let store = straight_line_store(false);
        let cache = RoadCache::build(&store, &[WayId(1)], TransportMode::Car).unwrap();
        let fwd = cache.segment(NodeId(1), NodeId(2)).unwrap();
        let rev = cache.segment(NodeId(2), NodeId(1)).unwrap();
        assert_eq!(rev.node1, NodeId(2));
        assert_eq!(rev.node2, NodeId(1));
        assert_eq!(rev.p1, fwd.p2);
        assert_eq!(rev.p2, fwd.p1);
        assert!((rev.length_m - fwd.length_m).abs() < 1e-6);
    }

    #[test]
    fn oneway_segment_has_no_reverse() {
        let store = straight_line_store(true);
        let cache = RoadCache::build(&store, &[WayId(1)], TransportMode::Car).unwrap();
        assert!(cache.segment(NodeId(1), NodeId(2)).is_some());
        assert!(cache.segment(NodeId(2), NodeId(1)).is_none());
    }

    #[test]
    fn get_segment_picks_nearest_and_clamps_alongtrack() {
        let store = straight_line_store(false);
        let cache = RoadCache::build(&store, &[WayId(1)], TransportMode::Car).unwrap();
        let candidate = cache.get_segment(WayId(1), (0.0005, 0.0001)).unwrap();
        assert_eq!(candidate.segment.segment_index, 1);
        assert!(candidate.alongtrack >= 0.0 && candidate.alongtrack <= candidate.segment.length_m);
    }

    #[test]
    fn unroutable_tag_yields_zero_weight() {
        let mut tags = BTreeMap::new();
        tags.insert("highway".to_string(), "river".to_string());
        let store = FixedStore {
            ways: vec![WayRecord {
                id: WayId(2),
                node_ids: vec![NodeId(10), NodeId(11)],
                tags,
            }],
            nodes: vec![
                NodeRecord {
                    id: NodeId(10),
                    lon: 0.0,
                    lat: 0.0,
                    tags: BTreeMap::new(),
                },
                NodeRecord {
                    id: NodeId(11),
                    lon: 0.001,
                    lat: 0.0,
                    tags: BTreeMap::new(),
                },
            ],
        };
        let cache = RoadCache::build(&store, &[WayId(2)], TransportMode::Car).unwrap();
        assert_eq!(cache.segment(NodeId(10), NodeId(11)).unwrap().weight, 0.0);
    }
}
