#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # Ridesim 🚲
//!
//! Simulate GPS bike rides on a connected device.
//!
//! A route is a polyline of waypoints. Ridesim walks it segment by segment at a
//! nominal speed, interpolating positions every one to two seconds, and hands each
//! position to a location simulation service in real time. Every segment gets its
//! own random speed multiplier (±20%) so the ride does not look machine-paced.
//!
//! Talking to the device itself (discovery, tunnels, the instrumentation service)
//! is left to whatever implements [`LocationService`]. This crate ships a console
//! backend that only logs positions.
//!
//! ## Building blocks
//!
//! - [`haversine_distance`]: great-circle distance between two coordinates
//! - [`RideTicks`]: lazy iterator with the pacing math for one ride, no sleeping
//! - [`RideSimulator`]: runs a ride in real time against a [`PositionSink`], or
//!   spawns it and streams samples over a channel
//! - [`DeviceSession`]: one ride at a time per device; single points teleport
//! - [`parse_coordinates`] / [`load_geojson`]: route input
//!
//! Randomness and pacing are injectable: seed the simulator for reproducible rides
//! and swap in an [`InstantClock`] to run them without waiting.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ridesim::{Coordinate, RideConfig, RideSimulator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let route = vec![
//!         Coordinate::new(25.0330, 121.5654),
//!         Coordinate::new(25.0375, 121.5637),
//!     ];
//!
//!     // Ride at 15 km/h and print every sample as it arrives
//!     let mut ride = RideSimulator::new(RideConfig::default()).spawn(route, 15.0, 1)?;
//!     while let Some(update) = ride.next_update().await {
//!         println!("{update}");
//!     }
//!
//!     Ok(())
//! }
//! ```

/// Interactive command parsing
pub mod command;
/// Location service seam and per-device ride sessions
pub mod device;
/// Error types and handling
pub mod error;
/// Great-circle distance and interpolation
pub mod geo;
pub mod input;
/// Ride simulation: pacing math, clocks, sinks
pub mod simulator;
/// Type definitions and data structures
pub mod types;

// Re-export the main types for convenient usage
pub use command::{Command, HELP};
pub use device::{
    select_first_device, ConsoleLocationService, DeviceSession, LocationService, RideOutcome,
};
pub use error::{Result, RideError};
pub use geo::{haversine_distance, path_length, EARTH_RADIUS_METERS};
pub use input::{load_geojson, parse_coordinates, parse_geojson};
pub use simulator::{
    Clock, FnSink, InstantClock, PositionSink, RideHandle, RideSimulator, RideTicks, TokioClock,
};
pub use types::{
    validate_speed, Coordinate, DeviceInfo, PositionUpdate, ProductVersion, RideConfig, RideId,
    RideSummary,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Oldest iOS major version whose developer services expose location simulation
pub const MIN_SUPPORTED_MAJOR_VERSION: u32 = 17;

/// Default nominal riding speed in km/h
pub const DEFAULT_SPEED_KMH: f64 = 15.0;
