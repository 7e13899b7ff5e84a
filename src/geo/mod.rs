//! Spherical-earth geometry: great-circle distance, bearing, cross-track
//! and along-track distance. Grounded in the shape of the teacher's
//! `util/geo/haversine.rs` (free functions, explicit input validation) but
//! using the radius and formulas of `pyosmroute/lib/geomeasure.py`, which is
//! the literal source `spec.md` §4.G was distilled from.

use crate::error::GeoError;

/// Mean earth radius in metres, per `spec.md` §4.G.
pub const EARTH_RADIUS_M: f64 = 6_371_008.7714;

fn validate(p: (f64, f64)) -> Result<(), GeoError> {
    let (lon, lat) = p;
    if !(-180.0..=180.0).contains(&lon) {
        return Err(GeoError::InvalidLongitude(lon));
    }
    if !(-90.0..=90.0).contains(&lat) {
        return Err(GeoError::InvalidLatitude(lat));
    }
    Ok(())
}

/// Wraps a longitude difference (in degrees) into `(-180, 180]`.
fn wrap_degrees(diff: f64) -> f64 {
    let wrapped = ((diff + 180.0).rem_euclid(360.0)) - 180.0;
    if wrapped <= -180.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}

/// Great-circle (haversine) distance between two (lon, lat) points, in
/// metres.
pub fn geodist(p1: (f64, f64), p2: (f64, f64)) -> Result<f64, GeoError> {
    validate(p1)?;
    validate(p2)?;
    let (lon1, lat1) = p1;
    let (lon2, lat2) = p2;
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = wrap_degrees(lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    Ok(EARTH_RADIUS_M * c)
}

/// Initial forward azimuth from `p1` to `p2`, degrees in `[0, 360)`.
/// Returns `NaN` iff `p1 == p2`.
pub fn bearing_to(p1: (f64, f64), p2: (f64, f64)) -> Result<f64, GeoError> {
    validate(p1)?;
    validate(p2)?;
    if p1 == p2 {
        return Ok(f64::NAN);
    }
    let (lon1, lat1) = p1;
    let (lon2, lat2) = p2;
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dlambda = wrap_degrees(lon2 - lon1).to_radians();

    let y = dlambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlambda.cos();
    let theta = y.atan2(x).to_degrees();
    Ok((theta + 360.0).rem_euclid(360.0))
}

/// Signed bearing difference `b2 - b1`, wrapped to `(-180, 180]`, positive =
/// clockwise from `b1`.
pub fn bearing_diff(b1: f64, b2: f64) -> f64 {
    wrap_degrees(b2 - b1)
}

/// Signed perpendicular distance of `p3` from the great circle through
/// `p1 -> p2`, in metres. Positive = to the right of the `p1->p2` direction.
pub fn crosstrack_error(p1: (f64, f64), p2: (f64, f64), p3: (f64, f64)) -> Result<f64, GeoError> {
    let d13 = geodist(p1, p3)? / EARTH_RADIUS_M;
    let theta13 = bearing_to(p1, p3)?.to_radians();
    let theta12 = bearing_to(p1, p2)?.to_radians();
    let xt = (d13.sin() * (theta13 - theta12).sin()).asin();
    Ok(xt * EARTH_RADIUS_M)
}

/// Scalar projection of `p3` onto the `p1->p2` great circle, measured from
/// `p1`, in metres. Negative when the projection falls behind `p1` (i.e. the
/// bearing to `p3` diverges from the `p1->p2` bearing by more than 90
/// degrees). Not clamped to `[0, length]`; see `DESIGN.md` Open Question 8.
pub fn along_track_distance(
    p1: (f64, f64),
    p2: (f64, f64),
    p3: (f64, f64),
) -> Result<f64, GeoError> {
    let d13 = geodist(p1, p3)? / EARTH_RADIUS_M;
    let xt = crosstrack_error(p1, p2, p3)? / EARTH_RADIUS_M;
    let along = ((d13.cos()) / (xt.cos())).acos();
    let theta13 = bearing_to(p1, p3)?;
    let theta12 = bearing_to(p1, p2)?;
    let sign = if bearing_diff(theta12, theta13).abs() > 90.0 {
        -1.0
    } else {
        1.0
    };
    Ok(sign * along * EARTH_RADIUS_M)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // Literal worked numbers from `pyosmroute/lib/geomeasure.py`'s
    // `__main__` self-test block (spec.md §8 scenario S3).
    const A: (f64, f64) = (-64.36449, 45.09123);
    const B: (f64, f64) = (-63.57497, 44.64842);

    #[test]
    fn scenario_s3_geodist_and_bearing() {
        let d = geodist(A, B).unwrap();
        assert!((d - 82700.0).abs() < 50.0, "geodist = {d}");
        let b = bearing_to(A, B).unwrap();
        assert!((b - 114.0).abs() < 1.0, "bearing = {b}");
    }

    #[test]
    fn scenario_s3_bearing_diff_signs() {
        assert_relative_eq!(bearing_diff(359.0, 1.0), 2.0, epsilon = 1e-9);
        assert_relative_eq!(bearing_diff(1.0, 359.0), -2.0, epsilon = 1e-9);
    }

    #[test]
    fn geodist_is_symmetric() {
        let d1 = geodist(A, B).unwrap();
        let d2 = geodist(B, A).unwrap();
        assert_relative_eq!(d1, d2, max_relative = 1e-6);
    }

    #[test]
    fn bearing_to_identical_points_is_nan() {
        assert!(bearing_to(A, A).unwrap().is_nan());
    }

    #[test]
    fn reciprocal_bearings_differ_by_180_modulo_wrap() {
        let b12 = bearing_to(A, B).unwrap();
        let b21 = bearing_to(B, A).unwrap();
        let diff = bearing_diff(b12, b21);
        assert_relative_eq!(diff.abs(), 180.0, epsilon = 1e-6);
    }

    #[test]
    fn along_track_splits_segment_for_interior_projection() {
        let midpoint = ((A.0 + B.0) / 2.0, (A.1 + B.1) / 2.0);
        let a1 = along_track_distance(A, B, midpoint).unwrap();
        let a2 = along_track_distance(B, A, midpoint).unwrap();
        let total = geodist(A, B).unwrap();
        assert_relative_eq!(a1.abs() + a2.abs(), total, max_relative = 1e-3);
    }

    #[test]
    fn invalid_longitude_is_rejected() {
        assert!(geodist((200.0, 0.0), A).is_err());
    }
}
