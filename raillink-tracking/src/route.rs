use serde::{Deserialize, Serialize};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Great-circle distance in metres.
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Initial bearing from `a` to `b` in degrees, normalised to [0, 360).
pub fn bearing_deg(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let y = d_lng.sin() * lat_b.cos();
    let x = lat_a.cos() * lat_b.sin() - lat_a.sin() * lat_b.cos() * d_lng.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// A train route as an ordered polyline with precomputed segment distances,
/// so a journey fraction maps onto a map position in constant extra work.
#[derive(Debug, Clone)]
pub struct RoutePath {
    points: Vec<GeoPoint>,
    cumulative_m: Vec<f64>,
    total_m: f64,
}

impl RoutePath {
    pub fn new(points: Vec<GeoPoint>) -> Result<Self, RouteError> {
        if points.len() < 2 {
            return Err(RouteError::TooShort(points.len()));
        }
        let mut cumulative_m = Vec::with_capacity(points.len());
        cumulative_m.push(0.0);
        let mut total_m = 0.0;
        for pair in points.windows(2) {
            total_m += haversine_m(pair[0], pair[1]);
            cumulative_m.push(total_m);
        }
        Ok(Self {
            points,
            cumulative_m,
            total_m,
        })
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn total_m(&self) -> f64 {
        self.total_m
    }

    /// Index of the segment containing the given distance from the origin.
    fn segment_at(&self, distance_m: f64) -> usize {
        let mut index = 0;
        while index + 2 < self.points.len() && self.cumulative_m[index + 1] <= distance_m {
            index += 1;
        }
        index
    }

    /// Interpolated position at a journey fraction in [0, 1]. Out-of-range
    /// fractions clamp to the endpoints.
    pub fn position_at(&self, fraction: f64) -> GeoPoint {
        let fraction = fraction.clamp(0.0, 1.0);
        let target = fraction * self.total_m;
        let index = self.segment_at(target);

        let start = self.points[index];
        let end = self.points[index + 1];
        let segment_len = self.cumulative_m[index + 1] - self.cumulative_m[index];
        if segment_len == 0.0 {
            return start;
        }
        let t = (target - self.cumulative_m[index]) / segment_len;
        GeoPoint {
            lat: start.lat + (end.lat - start.lat) * t,
            lng: start.lng + (end.lng - start.lng) * t,
        }
    }

    /// Heading of the segment under a journey fraction.
    pub fn bearing_at(&self, fraction: f64) -> f64 {
        let fraction = fraction.clamp(0.0, 1.0);
        let index = self.segment_at(fraction * self.total_m);
        bearing_deg(self.points[index], self.points[index + 1])
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("A route needs at least two points, got {0}")]
    TooShort(usize),
}
