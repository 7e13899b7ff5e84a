//! GPS trace conditioning: timestamp parsing, iterative outlier/min-distance
//! thinning, and windowed velocity/bearing/rotation/distance computation.
//! Grounded in `pyosmroute/gpsclean.py`; see `DESIGN.md` for the documented
//! divergences (min_velocity recursion factor, unwindowed distance field).

use crate::error::ConditioningError;
use crate::geo;
use crate::model::{Observation, RawGpsRecord};
use chrono::NaiveDateTime;

/// Options controlling [`condition`]. Field defaults match `spec.md` §4.C
/// and §6.2.
#[derive(Debug, Clone)]
pub struct ConditioningOptions {
    /// Points whose 2-point velocity exceeds this (m/s) are flagged as
    /// outliers. `spec.md` default 100.
    pub outlier_max_velocity: f64,
    /// Points whose 2-point velocity is at or below this (m/s) are flagged
    /// as stationary duplicates. `spec.md` default 0.
    pub min_velocity: f64,
    /// Greedy thinning radius in metres; `None` disables thinning.
    /// `spec.md` default 30 (supplied by the orchestrator).
    pub min_point_distance: Option<f64>,
    /// Symmetric window width for velocity/bearing/rotation. `spec.md`
    /// default 3.
    pub parameter_window: usize,
    /// Minimum number of surviving points required. `spec.md` default 10.
    pub minpoints: usize,
    /// Recursion depth cap for the thinning pass. `spec.md` default 100.
    pub recursion_limit: u32,
}

impl Default for ConditioningOptions {
    fn default() -> Self {
        ConditioningOptions {
            outlier_max_velocity: 100.0,
            min_velocity: 0.0,
            min_point_distance: Some(30.0),
            parameter_window: 3,
            minpoints: 10,
            recursion_limit: 100,
        }
    }
}

/// Parses a timestamp of the form `YYYY-MM-DD HH:MM:SS`, trimming fractional
/// seconds, a trailing zone marker, and the `T` date/time separator.
/// Mirrors `pyosmroute/gpsclean.py::_parsetime`.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let trimmed = text
        .split('.')
        .next()?
        .split('+')
        .next()?
        .replace('"', "")
        .replace('Z', "")
        .replace('T', " ");
    NaiveDateTime::parse_from_str(trimmed.trim(), "%Y-%m-%d %H:%M:%S").ok()
}

#[derive(Debug, Clone)]
struct Point {
    original_index: usize,
    datetime: NaiveDateTime,
    lon: f64,
    lat: f64,
}

fn vel_between(a: &Point, b: &Point) -> f64 {
    let difftime = (b.datetime - a.datetime).num_seconds();
    if difftime == 0 {
        return f64::NAN;
    }
    let dist = geo::geodist((a.lon, a.lat), (b.lon, b.lat)).unwrap_or(f64::NAN);
    dist / difftime as f64
}

/// Recursive outlier/min-distance thinning pass. Mirrors
/// `pyosmroute/gpsclean.py::cleanpoints`.
fn clean_points(
    points: Vec<Point>,
    max_velocity: f64,
    min_velocity: Option<f64>,
    min_distance: Option<f64>,
    recursion_limit: u32,
) -> Vec<Point> {
    let n = points.len();
    if n < 3 {
        return points;
    }

    // 2-point velocity between i-1 and i, NaN at i = 0.
    let velocity: Vec<f64> = (0..n)
        .map(|i| {
            if i == 0 {
                f64::NAN
            } else {
                vel_between(&points[i - 1], &points[i])
            }
        })
        .collect();

    let mut badpoints = std::collections::BTreeSet::new();
    let mut n_high = 0usize;
    let mut n_low = 0usize;
    for i in 1..n {
        if velocity[i] > max_velocity {
            badpoints.insert(i);
            n_high += 1;
        }
        if let Some(min_v) = min_velocity {
            if velocity[i] <= min_v {
                badpoints.insert(i);
                n_low += 1;
            }
        }
    }

    if badpoints.contains(&1) && n > 2 {
        let vel_1_2 = vel_between(&points[1], &points[2]);
        if vel_1_2 < max_velocity {
            badpoints.remove(&1);
            badpoints.insert(0);
        }
    }

    let mut n_lowdist = 0usize;
    if let Some(min_dist) = min_distance {
        let mut anchor = (points[0].lon, points[0].lat);
        for i in 1..n {
            if badpoints.contains(&i) {
                continue;
            }
            let newpt = (points[i].lon, points[i].lat);
            let d = geo::geodist(anchor, newpt).unwrap_or(f64::INFINITY);
            if d <= min_dist {
                badpoints.insert(i);
                n_lowdist += 1;
            } else {
                anchor = newpt;
            }
        }
    }

    if badpoints.is_empty() {
        return points;
    }

    log::debug!(
        "removing {n_high} fast, {n_low} slow, {n_lowdist} low-distance points ({:.1}% of {n}, recursion level {recursion_limit})",
        badpoints.len() as f64 * 100.0 / n as f64
    );

    let kept: Vec<Point> = points
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !badpoints.contains(i))
        .map(|(_, p)| p)
        .collect();

    if recursion_limit > 0 {
        clean_points(
            kept,
            max_velocity,
            min_velocity.map(|v| v / 2.0),
            None,
            recursion_limit - 1,
        )
    } else {
        kept
    }
}

fn windowed_pair(n: usize, i: usize, nwindow: usize) -> (usize, usize) {
    let iminus = nwindow / 2;
    let iplus = nwindow - iminus - 1;
    let lo = i.saturating_sub(iminus).max(0);
    let hi = (i + iplus).min(n - 1);
    (lo, hi)
}

/// Runs the full conditioning pipeline on a raw GPS trace: parse, thin, and
/// compute windowed kinematics. See `spec.md` §4.C.
pub fn condition(
    records: &[RawGpsRecord],
    opts: &ConditioningOptions,
) -> Result<Vec<Observation>, ConditioningError> {
    if records.is_empty() {
        return Err(ConditioningError::EmptyTrace);
    }

    let mut points = Vec::with_capacity(records.len());
    for (original_index, rec) in records.iter().enumerate() {
        if let Some(datetime) = parse_timestamp(&rec.timestamp) {
            points.push(Point {
                original_index,
                datetime,
                lon: rec.lon,
                lat: rec.lat,
            });
        }
    }
    if points.is_empty() {
        return Err(ConditioningError::AllPointsDropped);
    }

    let cleaned = clean_points(
        points,
        opts.outlier_max_velocity,
        Some(opts.min_velocity),
        opts.min_point_distance,
        opts.recursion_limit,
    );
    if cleaned.is_empty() {
        return Err(ConditioningError::AllPointsDropped);
    }

    let n = cleaned.len();
    let nwindow = opts.parameter_window.max(1);

    // First pass: each point's own windowed bearing, the way
    // `pyosmroute/lib/gpsclean.py` first fills a `_bearing` column for the
    // whole trace before diffing it in `_rotationbyrow`.
    let windows: Vec<(usize, usize)> = (0..n).map(|i| windowed_pair(n, i, nwindow)).collect();
    let bearings: Vec<f64> = windows
        .iter()
        .map(|&(lo, hi)| {
            if lo == hi {
                f64::NAN
            } else {
                geo::bearing_to((cleaned[lo].lon, cleaned[lo].lat), (cleaned[hi].lon, cleaned[hi].lat))
                    .unwrap_or(f64::NAN)
            }
        })
        .collect();

    let mut observations = Vec::with_capacity(n);
    for (t_index, p) in cleaned.iter().enumerate() {
        let (lo, hi) = windows[t_index];
        let (velocity, bearing, rotation) = if lo == hi {
            (None, None, None)
        } else {
            let v = vel_between(&cleaned[lo], &cleaned[hi]);
            let b = bearings[t_index];
            let difftime = (cleaned[hi].datetime - cleaned[lo].datetime).num_seconds();
            let r = if difftime == 0 {
                f64::NAN
            } else {
                geo::bearing_diff(bearings[lo], bearings[hi]) / difftime as f64
            };
            (
                v.is_finite().then_some(v),
                b.is_finite().then_some(b),
                r.is_finite().then_some(r),
            )
        };

        let distance = if t_index == 0 {
            None
        } else {
            geo::geodist(
                (cleaned[t_index - 1].lon, cleaned[t_index - 1].lat),
                (p.lon, p.lat),
            )
            .ok()
        };

        observations.push(Observation {
            t_index,
            datetime: p.datetime,
            lon: p.lon,
            lat: p.lat,
            velocity,
            bearing,
            rotation,
            distance,
            original_index: p.original_index,
        });
    }

    if observations.len() < opts.minpoints {
        return Err(ConditioningError::AllPointsDropped);
    }

    Ok(observations)
}
