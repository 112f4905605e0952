//! Great-circle geometry.
//!
//! A ride-pooling matcher on sparse, rapidly-changing pickup/dropoff pairs
//! can't afford a network round trip to an external routing provider per
//! candidate, so this module computes distance, bearing and travel time
//! directly via the haversine formula: a pure function over coordinates,
//! computed instead of looked up.

use crate::domain::types::Coordinate;

/// Mean Earth radius in kilometres, as used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Assumed average vehicle speed for travel-time estimates.
pub const AVERAGE_SPEED_KMH: f64 = 30.0;

/// Default same-direction tolerance used by the compatibility predicate.
pub const DEFAULT_DIRECTION_THRESHOLD_DEG: f64 = 45.0;

/// Great-circle distance between two coordinates, in kilometres.
pub fn distance(a: &Coordinate, b: &Coordinate) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let sin_dlat = (dlat / 2.0).sin();
    let sin_dlng = (dlng / 2.0).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlng * sin_dlng;
    let c = 2.0 * h.sqrt().asin();
    EARTH_RADIUS_KM * c
}

/// Initial bearing from `a` to `b`, in degrees, normalised to `[0, 360)`.
pub fn bearing(a: &Coordinate, b: &Coordinate) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlng = (b.lng - a.lng).to_radians();

    let y = dlng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlng.cos();
    let deg = y.atan2(x).to_degrees();
    (deg + 360.0) % 360.0
}

/// Estimated travel time in minutes for a given distance, assuming
/// [`AVERAGE_SPEED_KMH`].
pub fn travel_time(distance_km: f64) -> f64 {
    (distance_km / AVERAGE_SPEED_KMH) * 60.0
}

/// True iff `p` lies within `radius_km` of `center`.
pub fn within_radius(p: &Coordinate, center: &Coordinate, radius_km: f64) -> bool {
    distance(p, center) <= radius_km
}

/// Minimum circular difference between two bearings, in degrees, in `[0, 180]`.
fn bearing_diff(a: f64, b: f64) -> f64 {
    let diff = (a - b).abs() % 360.0;
    diff.min(360.0 - diff)
}

/// True iff the bearing of leg `a1 -> a2` differs from the bearing of leg
/// `b1 -> b2` by no more than `theta_deg`.
pub fn same_direction(
    a1: &Coordinate,
    a2: &Coordinate,
    b1: &Coordinate,
    b2: &Coordinate,
    theta_deg: f64,
) -> bool {
    let bearing_a = bearing(a1, a2);
    let bearing_b = bearing(b1, b2);
    bearing_diff(bearing_a, bearing_b) <= theta_deg
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng).unwrap()
    }

    #[test]
    fn distance_jfk_to_manhattan_is_about_21_km() {
        let pickup = coord(40.6413, -73.7781);
        let dropoff = coord(40.7580, -73.9855);
        let d = distance(&pickup, &dropoff);
        assert!((d - 21.3).abs() < 0.5, "distance was {d}");
    }

    #[test]
    fn travel_time_at_average_speed_matches_jfk_leg() {
        let t = travel_time(21.3);
        assert!((t - 42.6).abs() < 0.2, "travel time was {t}");
    }

    #[test]
    fn bearing_is_normalised_to_0_360() {
        let a = coord(0.0, 0.0);
        let b = coord(-1.0, -1.0);
        let b_deg = bearing(&a, &b);
        assert!((0.0..360.0).contains(&b_deg));
    }

    #[test]
    fn within_radius_boundary_is_inclusive() {
        let center = coord(1.0, 1.0);
        let p = coord(1.0, 1.0);
        assert!(within_radius(&p, &center, 0.0));
    }

    #[test]
    fn same_direction_true_for_parallel_legs() {
        let a1 = coord(0.0, 0.0);
        let a2 = coord(1.0, 0.0);
        let b1 = coord(0.0, 1.0);
        let b2 = coord(1.0, 1.0);
        assert!(same_direction(&a1, &a2, &b1, &b2, 1.0));
    }

    #[test]
    fn same_direction_false_for_opposite_legs() {
        let a1 = coord(0.0, 0.0);
        let a2 = coord(1.0, 0.0);
        let b1 = coord(1.0, 0.0);
        let b2 = coord(0.0, 0.0);
        assert!(!same_direction(&a1, &a2, &b1, &b2, 45.0));
    }
}
