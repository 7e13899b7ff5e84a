//! Core data types shared across the map-matching pipeline: typed ids,
//! the raw observation/node/way/segment entities, and the candidate and
//! state-space types built on top of them.

mod candidate;
mod ids;
mod observation;
mod way;
mod weighting;

pub use candidate::Candidate;
pub use ids::{NodeId, WayId};
pub use observation::{Observation, RawGpsRecord};
pub use way::{Node, Segment, Way};
pub use weighting::{normalize_tag, transport_weight, TransportMode};
