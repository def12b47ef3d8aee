//! Location fixes and distance math

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mean earth radius used for great-circle distances
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A single timestamped location sample from the platform location service
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,

    /// Horizontal accuracy radius in meters
    pub accuracy_m: f64,

    /// Reported ground speed in m/s. Negative means unknown.
    #[serde(default = "unknown_speed")]
    pub speed_mps: f64,

    pub timestamp: DateTime<Utc>,
}

fn unknown_speed() -> f64 {
    -1.0
}

impl LocationFix {
    pub fn new(latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_m: 10.0,
            speed_mps: unknown_speed(),
            timestamp,
        }
    }

    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed_mps = speed_mps;
        self
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = accuracy_m;
        self
    }

    /// Distance from this fix to a coordinate, in meters
    pub fn distance_to(&self, latitude: f64, longitude: f64) -> f64 {
        distance_m(self.latitude, self.longitude, latitude, longitude)
    }
}

/// Haversine great-circle distance in meters
pub fn distance_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Offset a coordinate northwards by `meters`. Handy for building test fixtures.
pub fn offset_north(latitude: f64, longitude: f64, meters: f64) -> (f64, f64) {
    let d_lat = (meters / EARTH_RADIUS_M).to_degrees();
    (latitude + d_lat, longitude)
}
