//! Hidden Markov Model map-matching engine for GPS traces against an
//! OSM-derived road network.
//!
//! The pipeline runs: clean the raw GPS trace, query a caller-supplied
//! [`store::SpatialStore`] for nearby road geometry, build a [`cache::RoadCache`]
//! adjacency, fit each observation against nearby segments, score emission and
//! transition probabilities, decode the most likely path with Viterbi, and
//! assemble point/segment summaries. See [`orchestrator::match_trace`] for the
//! entry point.

pub mod cache;
pub mod conditioning;
pub mod config;
pub mod emission;
pub mod error;
pub mod geo;
pub mod model;
pub mod orchestrator;
pub mod routing;
pub mod store;
pub mod transition;
pub mod viterbi;

pub use config::MatchOptions;
pub use error::MapMatchError;
pub use orchestrator::{match_trace, MatchOutcome, Stats};

#[cfg(test)]
pub(crate) fn init_test_logging() {
    let _ = env_logger::try_init();
}
