//! Emission model (`spec.md` §4.E): combines a Gaussian score on distance
//! from the matched route with a speed-scaled bearing penalty. Grounded in
//! `pyosmroute/osm/_probabilities.py::emission_probability` (the literal
//! source of the formula; the distilled spec's `hmm_map_matching.rs` uses a
//! structurally similar but log-space Gaussian this crate does not need,
//! since probabilities here stay in `[0, 1]` linear space to match the
//! Viterbi decoder's product-of-probabilities convention).

use crate::model::{Candidate, Observation};

/// The GPS-bearing-vs-speed clamp used by the bearing penalty; not exposed
/// as a `MatchOptions` field, matching `emission_probability(..., maxspeed=30)`
/// in the original.
pub const DEFAULT_MAXSPEED_MS: f64 = 30.0;

/// Options controlling [`emission_probability`].
#[derive(Debug, Clone, Copy)]
pub struct EmissionOptions {
    /// Standard deviation of GPS error (metres). `spec.md` default 10.
    pub sigma_z: f64,
    /// Weight of the bearing-mismatch penalty. `spec.md` default 1.
    pub bearing_penalty_weight: f64,
    /// Speed (m/s) above which the bearing penalty is applied at full
    /// strength. Default 30.
    pub maxspeed: f64,
}

impl Default for EmissionOptions {
    fn default() -> Self {
        EmissionOptions {
            sigma_z: 10.0,
            bearing_penalty_weight: 1.0,
            maxspeed: DEFAULT_MAXSPEED_MS,
        }
    }
}

/// Absolute bearing difference between the GPS-derived bearing and a
/// candidate segment's bearing, folded for two-way segments (`spec.md`
/// §4.E: "for two-way segments values > 90° are folded to `180-diff`").
fn bearing_diff_mode(gps_bearing: f64, segment_bearing: f64, oneway: bool) -> f64 {
    let diff = crate::geo::bearing_diff(gps_bearing, segment_bearing).abs();
    if oneway || diff <= 90.0 {
        diff
    } else {
        180.0 - diff
    }
}

/// Emission probability of observation `obs` given candidate `cand`
/// (`spec.md` §4.E). Returns a value in `[0, 1]`, bounds permitting: the
/// formula is not itself guaranteed to land in that range if
/// `bearing_penalty_weight` is pushed above 1 (the docstring in the
/// original explicitly allows this), so callers relying on the `[0,1]`
/// testable property must use the documented default weight.
pub fn emission_probability(cand: &Candidate, obs: &Observation, opts: &EmissionOptions) -> f64 {
    let velocity = obs.velocity.unwrap_or(0.0).max(0.0);
    let bdiff = match obs.bearing {
        Some(b) if !b.is_nan() => {
            bearing_diff_mode(b, cand.segment.bearing_deg, cand.segment.oneway)
        }
        _ => 0.0,
    };

    let speedscale = if velocity >= opts.maxspeed {
        1.0
    } else {
        (velocity / opts.maxspeed).powf(0.25)
    };
    let penalty = opts.bearing_penalty_weight * speedscale * (bdiff / 180.0);

    let z = cand.dist_from_route_m / opts.sigma_z;
    let eprob = (-0.5 * z * z).exp();
    eprob * (1.0 - penalty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Segment;
    use chrono::NaiveDate;

    fn segment(bearing_deg: f64, oneway: bool) -> Segment {
        Segment {
            way_id: crate::model::WayId(1),
            segment_index: 1,
            node1: crate::model::NodeId(1),
            node2: crate::model::NodeId(2),
            p1: (0.0, 0.0),
            p2: (0.001, 0.0),
            length_m: 111.0,
            bearing_deg,
            oneway,
            type_tag: "residential".to_string(),
            name: None,
            weight: 1.0,
        }
    }

    fn candidate(dist_from_route_m: f64, bearing_deg: f64, oneway: bool) -> Candidate {
        Candidate {
            segment: segment(bearing_deg, oneway),
            alongtrack: 0.0,
            foot: (0.0, 0.0),
            xte_m: dist_from_route_m,
            dist_from_route_m,
        }
    }

    fn obs(velocity: Option<f64>, bearing: Option<f64>) -> Observation {
        Observation {
            t_index: 0,
            datetime: NaiveDate::from_ymd_opt(2020, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            lon: 0.0,
            lat: 0.0,
            velocity,
            bearing,
            rotation: None,
            distance: None,
            original_index: 0,
        }
    }

    #[test]
    fn perfect_match_at_high_speed_is_one() {
        let cand = candidate(0.0, 90.0, false);
        let observation = obs(Some(40.0), Some(90.0));
        let eprob = emission_probability(&cand, &observation, &EmissionOptions::default());
        assert!((eprob - 1.0).abs() < 1e-9);
    }

    #[test]
    fn emission_is_bounded_for_default_weight() {
        let cand = candidate(15.0, 90.0, false);
        let observation = obs(Some(10.0), Some(270.0));
        let eprob = emission_probability(&cand, &observation, &EmissionOptions::default());
        assert!((0.0..=1.0).contains(&eprob));
    }

    #[test]
    fn twoway_segment_folds_bearing_difference_past_90() {
        // Travelling at 270 on a segment whose forward bearing is 90:
        // raw diff is 180, folds to 0 for a two-way segment (either
        // direction of travel is plausible).
        let cand_twoway = candidate(0.0, 90.0, false);
        let cand_oneway = candidate(0.0, 90.0, true);
        let observation = obs(Some(40.0), Some(270.0));
        let twoway = emission_probability(&cand_twoway, &observation, &EmissionOptions::default());
        let oneway = emission_probability(&cand_oneway, &observation, &EmissionOptions::default());
        assert!((twoway - 1.0).abs() < 1e-9);
        assert!(oneway < twoway);
    }
}
