use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A raw, unconditioned GPS record as handed to the engine by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawGpsRecord {
    pub timestamp: String,
    pub lon: f64,
    pub lat: f64,
}

/// A conditioned GPS observation, produced by [`crate::conditioning`].
///
/// Field names mirror the `gps_*` columns documented in `spec.md` §6.4 so a
/// caller flattening this struct for CSV output gets the exact column set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub t_index: usize,
    pub datetime: NaiveDateTime,
    pub lon: f64,
    pub lat: f64,
    /// metres/second, `None` for the first point or when undefined.
    pub velocity: Option<f64>,
    /// degrees in [0, 360), `None` when undefined.
    pub bearing: Option<f64>,
    /// degrees/second, `None` when undefined.
    pub rotation: Option<f64>,
    /// metres to the previous retained point, `None` for the first point.
    pub distance: Option<f64>,
    /// index into the original, pre-conditioning input sequence.
    pub original_index: usize,
}
