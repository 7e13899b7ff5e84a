use super::Segment;

/// A candidate match of an observation to a segment, produced by
/// [`crate::cache::RoadCache::get_segment`] (segment fit, `spec.md` §4.S).
///
/// Carries an owned copy of the matched [`Segment`] rather than a borrow of
/// the cache: candidates outlive a single pipeline stage (they are retained
/// across scoring, transition computation, and summary assembly), and
/// segments are cheap, `Clone`-able value types once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub segment: Segment,
    /// Metres along `segment`, in `[0, segment.length_m]`.
    pub alongtrack: f64,
    pub foot: (f64, f64),
    pub xte_m: f64,
    pub dist_from_route_m: f64,
}
