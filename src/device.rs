use async_trait::async_trait;
use rand::{rngs::StdRng, SeedableRng};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{error, info, warn};

use crate::{
    error::{Result, RideError},
    simulator::{join_ride, Clock, PositionSink, RideSimulator, TokioClock},
    types::{Coordinate, DeviceInfo, PositionUpdate, RideConfig, RideId, RideSummary},
};

/// The device-side location simulation service
///
/// Everything behind this trait (device discovery, tunnels, handshakes, the
/// instrumentation channel) belongs to the device automation layer. A ride only
/// needs to move the simulated position and to stop simulating.
#[async_trait]
pub trait LocationService: Send {
    /// Start, or move, the simulated position
    async fn set_location(&mut self, coordinate: Coordinate) -> Result<()>;

    /// Stop simulating and return the device to its real position
    async fn stop(&mut self) -> Result<()>;
}

/// Dry-run location service that only logs what it would send to a device
#[derive(Debug, Default)]
pub struct ConsoleLocationService {
    current: Option<Coordinate>,
    updates: usize,
}

impl ConsoleLocationService {
    /// Create a new console service
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Position currently being simulated, if any
    #[must_use]
    pub const fn current(&self) -> Option<Coordinate> {
        self.current
    }

    /// Number of positions set so far
    #[must_use]
    pub const fn update_count(&self) -> usize {
        self.updates
    }
}

#[async_trait]
impl LocationService for ConsoleLocationService {
    async fn set_location(&mut self, coordinate: Coordinate) -> Result<()> {
        info!("Simulating location {coordinate}");
        self.current = Some(coordinate);
        self.updates += 1;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if self.current.take().is_some() {
            info!("Location simulation stopped");
        }
        Ok(())
    }
}

/// Pick the first connected device and check it can simulate location
///
/// # Errors
///
/// Returns [`RideError::DeviceNotFound`] if `devices` is empty, or
/// [`RideError::UnsupportedDevice`] if the first device runs an OS older than
/// [`MIN_SUPPORTED_MAJOR_VERSION`](crate::MIN_SUPPORTED_MAJOR_VERSION).
pub fn select_first_device(devices: &[DeviceInfo]) -> Result<&DeviceInfo> {
    info!("Found {} device(s)", devices.len());
    for (i, device) in devices.iter().enumerate() {
        info!(
            "{}. {} (iOS {})",
            i + 1,
            device.name.as_deref().unwrap_or(&device.serial_number),
            device.product_version
        );
    }

    let device = devices.first().ok_or(RideError::DeviceNotFound)?;
    if !device.is_supported() {
        return Err(RideError::UnsupportedDevice {
            serial: device.serial_number.clone(),
            version: device.product_version.to_string(),
            required: crate::MIN_SUPPORTED_MAJOR_VERSION,
        });
    }

    Ok(device)
}

/// How a ride started on a [`DeviceSession`] ended
#[derive(Debug)]
pub struct RideOutcome {
    /// Ride that finished
    pub id: RideId,
    /// Summary, or the error that stopped the ride
    pub result: Result<RideSummary>,
}

/// Forwards every ride sample to the device
struct ServiceSink<S> {
    service: Arc<Mutex<S>>,
    ride: RideId,
}

#[async_trait]
impl<S: LocationService + 'static> PositionSink for ServiceSink<S> {
    async fn on_update(&mut self, update: &PositionUpdate) -> Result<()> {
        info!("[ride {}] {}", self.ride, update);
        self.service
            .lock()
            .await
            .set_location(update.coordinate)
            .await
            .inspect_err(|e| error!("[ride {}] Failed to set location: {}", self.ride, e))
    }
}

struct ActiveRide {
    id: RideId,
    task: JoinHandle<Result<RideSummary>>,
}

/// A location-simulation session on one device
///
/// The session owns the device's [`LocationService`] and lets at most one ride
/// drive it at a time: starting a new ride cancels the one in flight. Rides run
/// on their own tasks, so the caller stays free to read more commands.
///
/// # Examples
///
/// ```no_run
/// use ridesim::{parse_coordinates, ConsoleLocationService, DeviceSession, RideConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut session = DeviceSession::new(ConsoleLocationService::new(), RideConfig::default());
///
///     let route = parse_coordinates("[[25.0330,121.5654],[25.0400,121.5700]]")?;
///     session.start(route).await?;
///
///     if let Some(result) = session.wait().await {
///         println!("Ride finished: {}", result?);
///     }
///
///     session.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct DeviceSession<S, C = TokioClock>
where
    S: LocationService + 'static,
    C: Clock + Clone + 'static,
{
    service: Arc<Mutex<S>>,
    config: RideConfig,
    clock: C,
    active: Option<ActiveRide>,
    stopped: bool,
    outcome_sender: mpsc::UnboundedSender<RideOutcome>,
    outcome_receiver: Option<mpsc::UnboundedReceiver<RideOutcome>>,
}

impl<S: LocationService + 'static> DeviceSession<S> {
    /// Session that paces rides in real time
    #[must_use]
    pub fn new(service: S, config: RideConfig) -> Self {
        Self::with_clock(service, config, TokioClock)
    }
}

impl<S, C> DeviceSession<S, C>
where
    S: LocationService + 'static,
    C: Clock + Clone + 'static,
{
    /// Session with a custom pacing clock
    #[must_use]
    pub fn with_clock(service: S, config: RideConfig, clock: C) -> Self {
        let (outcome_sender, outcome_receiver) = mpsc::unbounded_channel();
        Self {
            service: Arc::new(Mutex::new(service)),
            config,
            clock,
            active: None,
            stopped: false,
            outcome_sender,
            outcome_receiver: Some(outcome_receiver),
        }
    }

    /// Ride parameters used for new rides
    #[must_use]
    pub const fn config(&self) -> &RideConfig {
        &self.config
    }

    /// Shared handle to the underlying location service
    #[must_use]
    pub fn service(&self) -> Arc<Mutex<S>> {
        Arc::clone(&self.service)
    }

    /// Take the receiver of ride outcomes
    ///
    /// Every ride that ends on its own, successfully or not, reports here.
    /// Cancelled rides do not. Returns `None` after the first call.
    pub fn outcomes(&mut self) -> Option<mpsc::UnboundedReceiver<RideOutcome>> {
        self.outcome_receiver.take()
    }

    /// Whether a ride is currently in flight
    #[must_use]
    pub fn is_riding(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|ride| !ride.task.is_finished())
    }

    /// Id of the most recently started ride that has not been collected
    #[must_use]
    pub fn active_ride(&self) -> Option<RideId> {
        self.active.as_ref().map(|ride| ride.id)
    }

    /// Send the device to `coordinates`
    ///
    /// A single coordinate teleports the device. Two or more start a paced ride at
    /// the configured nominal speed. Any ride already in flight is cancelled first.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::InvalidArgument`] for an empty coordinate list or an
    /// invalid [`RideConfig`].
    pub async fn start(&mut self, coordinates: Vec<Coordinate>) -> Result<RideId> {
        let speed = self.config.nominal_speed_kmh;
        self.start_with_speed(coordinates, speed).await
    }

    /// Like [`start`](Self::start) with an explicit nominal speed
    ///
    /// # Errors
    ///
    /// Returns [`RideError::InvalidArgument`] for an empty coordinate list, a
    /// non-positive speed, or an invalid [`RideConfig`].
    pub async fn start_with_speed(
        &mut self,
        coordinates: Vec<Coordinate>,
        nominal_speed_kmh: f64,
    ) -> Result<RideId> {
        if coordinates.is_empty() {
            return Err(RideError::InvalidArgument(
                "no coordinates to simulate".to_string(),
            ));
        }
        self.config.validate()?;
        crate::types::validate_speed(nominal_speed_kmh)?;

        self.cancel().await;
        self.stopped = false;

        let id = RideId::new();
        let service = Arc::clone(&self.service);
        let outcomes = self.outcome_sender.clone();

        let task = if coordinates.len() == 1 {
            let point = coordinates[0];
            info!("[ride {id}] Teleporting to {point}");
            tokio::spawn(async move {
                let result = teleport(&service, point).await;
                report(&outcomes, id, &result);
                result
            })
        } else {
            info!(
                "[ride {id}] Riding through {} waypoints at {:.1} km/h",
                coordinates.len(),
                nominal_speed_kmh
            );
            let mut simulator = RideSimulator::with_rng_and_clock(
                self.config.clone(),
                StdRng::from_entropy(),
                self.clock.clone(),
            );
            tokio::spawn(async move {
                let mut sink = ServiceSink { service, ride: id };
                let result = simulator
                    .simulate(&coordinates, nominal_speed_kmh, &mut sink)
                    .await;
                report(&outcomes, id, &result);
                result
            })
        };

        self.active = Some(ActiveRide { id, task });
        Ok(id)
    }

    /// Cancel the ride in flight, if any, and wait until it has let go of the device
    pub async fn cancel(&mut self) {
        if let Some(ride) = self.active.take() {
            if !ride.task.is_finished() {
                info!("[ride {}] Cancelling", ride.id);
            }
            ride.task.abort();
            let _ = ride.task.await;
        }
    }

    /// Wait for the ride in flight to finish
    ///
    /// Returns `None` when no ride has been started since the last collection.
    /// A cancelled ride yields [`RideError::Cancelled`].
    pub async fn wait(&mut self) -> Option<Result<RideSummary>> {
        let ride = self.active.take()?;
        Some(join_ride(ride.task).await)
    }

    /// Cancel any ride and stop simulating location on the device
    ///
    /// # Errors
    ///
    /// Returns the service's error if stopping fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.cancel().await;
        self.stopped = true;
        self.service.lock().await.stop().await
    }
}

impl<S, C> Drop for DeviceSession<S, C>
where
    S: LocationService + 'static,
    C: Clock + Clone + 'static,
{
    fn drop(&mut self) {
        let ride = self.active.take();
        if let Some(ride) = &ride {
            ride.task.abort();
        }

        if self.stopped || tokio::runtime::Handle::try_current().is_err() {
            return;
        }
        let service = Arc::clone(&self.service);
        tokio::spawn(async move {
            if let Some(ride) = ride {
                let _ = ride.task.await;
            }
            let value = service.lock().await.stop().await;
            if let Err(e) = value {
                warn!("Failed to stop location simulation: {}", e);
            }
        });
    }
}

async fn teleport<S: LocationService>(
    service: &Mutex<S>,
    point: Coordinate,
) -> Result<RideSummary> {
    service.lock().await.set_location(point).await?;
    Ok(RideSummary {
        total_distance_m: 0.0,
        updates: 1,
        simulated_time: std::time::Duration::ZERO,
    })
}

fn report(
    outcomes: &mpsc::UnboundedSender<RideOutcome>,
    id: RideId,
    result: &Result<RideSummary>,
) {
    match result {
        Ok(summary) => info!("[ride {id}] Finished: {summary}"),
        Err(e) => error!("[ride {id}] Failed: {e}"),
    }
    // Nobody listening is fine
    let _ = outcomes.send(RideOutcome {
        id,
        result: result.clone(),
    });
}
