use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};
use uuid::Uuid;

use crate::error::{Result, RideError};

/// A geographic point in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees, -90..=90
    pub lat: f64,
    /// Longitude in degrees, -180..=180
    pub lng: f64,
}

impl Coordinate {
    /// Create a coordinate without range checks
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Create a coordinate, rejecting values outside the valid latitude/longitude ranges
    ///
    /// # Errors
    ///
    /// Returns [`RideError::InvalidArgument`] for non-finite or out-of-range values.
    pub fn try_new(lat: f64, lng: f64) -> Result<Self> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(RideError::InvalidArgument(format!(
                "latitude must be between -90 and 90, got {lat}"
            )));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(RideError::InvalidArgument(format!(
                "longitude must be between -180 and 180, got {lng}"
            )));
        }
        Ok(Self { lat, lng })
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

/// One emitted sample of a simulated ride
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    /// Interpolated position
    pub coordinate: Coordinate,
    /// Index of the waypoint that starts the segment this sample belongs to
    pub segment_index: usize,
    /// Distance traveled since the first waypoint, in meters
    pub cumulative_distance_m: f64,
    /// Progress within the segment, 0.0..=1.0
    pub progress: f64,
    /// Pacing delay that follows this sample
    pub tick: Duration,
}

impl PositionUpdate {
    /// Whether this sample sits exactly on the end of its segment
    #[must_use]
    pub fn is_segment_end(&self) -> bool {
        self.progress >= 1.0
    }
}

impl fmt::Display for PositionUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "point {}: {} traveled {:.2} m",
            self.segment_index, self.coordinate, self.cumulative_distance_m
        )
    }
}

/// Ride simulation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideConfig {
    /// Baseline travel speed in km/h
    pub nominal_speed_kmh: f64,
    /// Lower bound of the per-segment speed multiplier
    pub jitter_min: f64,
    /// Upper bound of the per-segment speed multiplier
    pub jitter_max: f64,
    /// Shortest tick in seconds
    pub tick_min_secs: f64,
    /// Longest tick in seconds
    pub tick_max_secs: f64,
    /// Skip the trailing waypoint event when the last tick already reported it
    pub dedupe_final: bool,
}

impl Default for RideConfig {
    fn default() -> Self {
        Self {
            nominal_speed_kmh: crate::DEFAULT_SPEED_KMH,
            jitter_min: 0.8,
            jitter_max: 1.2,
            tick_min_secs: 1.0,
            tick_max_secs: 2.0,
            dedupe_final: false,
        }
    }
}

impl RideConfig {
    /// Default config with a different nominal speed
    #[must_use]
    pub fn with_speed(nominal_speed_kmh: f64) -> Self {
        Self {
            nominal_speed_kmh,
            ..Self::default()
        }
    }

    /// Check that the jitter and tick ranges are usable
    ///
    /// The nominal speed is not checked here: callers pass the speed they ride
    /// at explicitly and validate it with [`validate_speed`].
    ///
    /// # Errors
    ///
    /// Returns [`RideError::InvalidArgument`] naming the first bad range.
    pub fn validate(&self) -> Result<()> {
        if !(self.jitter_min > 0.0
            && self.jitter_min <= self.jitter_max
            && self.jitter_max.is_finite())
        {
            return Err(RideError::InvalidArgument(format!(
                "speed jitter range {}..={} is invalid",
                self.jitter_min, self.jitter_max
            )));
        }
        if !(self.tick_min_secs > 0.0
            && self.tick_min_secs <= self.tick_max_secs
            && self.tick_max_secs.is_finite())
        {
            return Err(RideError::InvalidArgument(format!(
                "tick range {}..={}s is invalid",
                self.tick_min_secs, self.tick_max_secs
            )));
        }
        Ok(())
    }
}

/// Reject speeds that cannot drive a ride
///
/// # Errors
///
/// Returns [`RideError::InvalidArgument`] for zero, negative or non-finite speeds.
pub fn validate_speed(speed_kmh: f64) -> Result<()> {
    if speed_kmh.is_finite() && speed_kmh > 0.0 {
        Ok(())
    } else {
        Err(RideError::InvalidArgument(format!(
            "speed must be a positive number of km/h, got {speed_kmh}"
        )))
    }
}

/// Totals for a finished ride
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RideSummary {
    /// Full polyline length in meters
    pub total_distance_m: f64,
    /// Number of updates delivered
    pub updates: usize,
    /// Sum of all pacing delays
    pub simulated_time: Duration,
}

impl fmt::Display for RideSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2} m ({:.2} km) in {:.1}s over {} updates",
            self.total_distance_m,
            self.total_distance_m / 1000.0,
            self.simulated_time.as_secs_f64(),
            self.updates
        )
    }
}

/// Identifier for one ride started on a device session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RideId(Uuid);

impl RideId {
    /// Generate a fresh random id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RideId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// OS product version reported by a device, e.g. `17.2.1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProductVersion {
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
    /// Patch version
    pub patch: u32,
}

impl FromStr for ProductVersion {
    type Err = RideError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().split('.');
        let mut next = |required: bool| -> Result<u32> {
            match parts.next() {
                Some(part) => part
                    .parse()
                    .map_err(|_| RideError::Parse(format!("invalid product version: {s}"))),
                None if required => Err(RideError::Parse(format!("invalid product version: {s}"))),
                None => Ok(0),
            }
        };
        let major = next(true)?;
        let minor = next(false)?;
        let patch = next(false)?;
        if parts.next().is_some() {
            return Err(RideError::Parse(format!("invalid product version: {s}")));
        }
        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

impl fmt::Display for ProductVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Device information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device serial number (UDID)
    pub serial_number: String,
    /// User-visible device name
    pub name: Option<String>,
    /// OS version
    pub product_version: ProductVersion,
}

impl DeviceInfo {
    /// Create new device info
    #[must_use]
    pub const fn new(serial_number: String, product_version: ProductVersion) -> Self {
        Self {
            serial_number,
            name: None,
            product_version,
        }
    }

    /// Whether the device OS can run the location simulation service
    #[must_use]
    pub const fn is_supported(&self) -> bool {
        self.product_version.major >= crate::MIN_SUPPORTED_MAJOR_VERSION
    }
}
