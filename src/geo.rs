use crate::types::Coordinate;

/// Mean Earth radius used by the Haversine formula, in meters
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates in meters
///
/// Uses the Haversine formula against a spherical Earth of radius
/// [`EARTH_RADIUS_METERS`]. Identical points yield `0.0`.
#[must_use]
pub fn haversine_distance(from: Coordinate, to: Coordinate) -> f64 {
    let lat_from = from.lat.to_radians();
    let lat_to = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lng = (to.lng - from.lng).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat_from.cos() * lat_to.cos() * (delta_lng / 2.0).sin().powi(2);

    // Rounding can push `a` a hair past 1.0 for antipodal points
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Total length of a polyline in meters
#[must_use]
pub fn path_length(waypoints: &[Coordinate]) -> f64 {
    waypoints
        .windows(2)
        .map(|pair| haversine_distance(pair[0], pair[1]))
        .sum()
}

impl Coordinate {
    /// Great-circle distance to another coordinate in meters
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        haversine_distance(*self, *other)
    }

    /// Linear interpolation of latitude and longitude, independently
    ///
    /// `t <= 0.0` returns `self` and `t >= 1.0` returns `to` exactly.
    #[must_use]
    pub fn lerp(&self, to: &Self, t: f64) -> Self {
        if t >= 1.0 {
            return *to;
        }
        if t <= 0.0 {
            return *self;
        }
        Self {
            lat: lerp_within(self.lat, to.lat, t),
            lng: lerp_within(self.lng, to.lng, t),
        }
    }
}

/// Interpolate and keep the result inside the endpoint interval despite rounding
fn lerp_within(from: f64, to: f64, t: f64) -> f64 {
    (to - from)
        .mul_add(t, from)
        .clamp(from.min(to), from.max(to))
}
