//! The spatial store interface consumed by the engine (`spec.md` §6.1).
//! This crate never implements a store itself — bulk OSM loading, the
//! projection SQL, and nearest-way indexing are explicitly out of scope
//! (`spec.md` §1) and left to the caller, mirroring the teacher's
//! `MapMatchingAlgorithm: Send + Sync` convention of depending on injected
//! collaborators through a trait object.

use crate::error::StoreError;
use crate::model::{NodeId, WayId};
use std::collections::BTreeMap;

/// A way record as returned by the store: ordered node ids plus tags.
#[derive(Debug, Clone, PartialEq)]
pub struct WayRecord {
    pub id: WayId,
    pub node_ids: Vec<NodeId>,
    pub tags: BTreeMap<String, String>,
}

/// A node record as returned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub id: NodeId,
    pub lon: f64,
    pub lat: f64,
    pub tags: BTreeMap<String, String>,
}

/// Required operations on the caller's spatial database, per `spec.md`
/// §6.1. Implementations must already filter `nearest_ways` to routable
/// highway classes (exclude cycleway/footway/bridleway/steps/path; require
/// a non-null `highway` tag) and return results ordered nearest-first.
pub trait SpatialStore: Send + Sync {
    fn ways(&self, ids: &[WayId]) -> Result<Vec<WayRecord>, StoreError>;
    fn nodes(&self, ids: &[NodeId]) -> Result<Vec<NodeRecord>, StoreError>;
    fn nearest_ways(&self, point: (f64, f64), radius_m: f64) -> Result<Vec<WayId>, StoreError>;
}

/// Fans `nearest_ways` queries for a batch of points out across a bounded
/// thread pool, per `spec.md` §5 (candidate queries may be parallelized up
/// to `db_threads` concurrent calls; response order is irrelevant since
/// results are merged back by point index).
pub fn query_candidates_parallel(
    store: &dyn SpatialStore,
    points: &[(f64, f64)],
    radius_m: f64,
    db_threads: usize,
) -> Result<Vec<Vec<WayId>>, StoreError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(db_threads.max(1))
        .build()
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
    pool.install(|| {
        use rayon::prelude::*;
        points
            .par_iter()
            .map(|p| store.nearest_ways(*p, radius_m))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MockStore {
        ways: HashMap<WayId, WayRecord>,
        nodes: HashMap<NodeId, NodeRecord>,
        near: Mutex<HashMap<(i64, i64), Vec<WayId>>>,
    }

    impl SpatialStore for MockStore {
        fn ways(&self, ids: &[WayId]) -> Result<Vec<WayRecord>, StoreError> {
            Ok(ids.iter().filter_map(|id| self.ways.get(id).cloned()).collect())
        }
        fn nodes(&self, ids: &[NodeId]) -> Result<Vec<NodeRecord>, StoreError> {
            Ok(ids.iter().filter_map(|id| self.nodes.get(id).cloned()).collect())
        }
        fn nearest_ways(&self, point: (f64, f64), _radius_m: f64) -> Result<Vec<WayId>, StoreError> {
            let key = (point.0 as i64, point.1 as i64);
            Ok(self.near.lock().unwrap().get(&key).cloned().unwrap_or_default())
        }
    }

    #[test]
    fn parallel_query_preserves_point_order() {
        let store = MockStore {
            ways: HashMap::new(),
            nodes: HashMap::new(),
            near: Mutex::new(HashMap::from([
                ((0, 0), vec![WayId(1)]),
                ((1, 1), vec![WayId(2)]),
            ])),
        };
        let points = vec![(0.0, 0.0), (1.0, 1.0)];
        let result = query_candidates_parallel(&store, &points, 50.0, 2).unwrap();
        assert_eq!(result[0], vec![WayId(1)]);
        assert_eq!(result[1], vec![WayId(2)]);
    }
}
