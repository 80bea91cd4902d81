use async_trait::async_trait;
use futures::stream::{self, Stream};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info};

use crate::{
    error::{Result, RideError},
    geo::haversine_distance,
    types::{validate_speed, Coordinate, PositionUpdate, RideConfig, RideSummary},
};

/// Source of real-time pacing for a ride
///
/// The simulator awaits [`Clock::sleep`] after every emitted sample. Swapping the
/// clock lets a ride run at wall-clock speed against a device, or instantly in tests.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Suspend the ride for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock pacing backed by `tokio::time::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Default)]
struct InstantClockState {
    elapsed_nanos: AtomicU64,
    sleeps: AtomicUsize,
}

/// Clock that returns immediately and only accounts for the time it was asked to wait
///
/// Clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct InstantClock {
    state: Arc<InstantClockState>,
}

impl InstantClock {
    /// Create a clock with zeroed counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total time requested through [`Clock::sleep`]
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.state.elapsed_nanos.load(Ordering::SeqCst))
    }

    /// Number of sleeps requested
    #[must_use]
    pub fn sleep_count(&self) -> usize {
        self.state.sleeps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Clock for InstantClock {
    async fn sleep(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.state.elapsed_nanos.fetch_add(nanos, Ordering::SeqCst);
        self.state.sleeps.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
    }
}

/// Consumer of position updates
///
/// Returning an error aborts the ride and the error is handed back to whoever
/// started it. A sink that wants the ride to keep going after a failure should
/// handle the failure itself and return `Ok(())`.
#[async_trait]
pub trait PositionSink: Send {
    /// Handle one sample. The ride does not advance until this returns.
    async fn on_update(&mut self, update: &PositionUpdate) -> Result<()>;
}

/// Adapts a closure into a [`PositionSink`]
pub struct FnSink<F>(pub F);

impl<F> FnSink<F>
where
    F: FnMut(&PositionUpdate) -> Result<()> + Send,
{
    /// Wrap `f`
    #[must_use]
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> PositionSink for FnSink<F>
where
    F: FnMut(&PositionUpdate) -> Result<()> + Send,
{
    async fn on_update(&mut self, update: &PositionUpdate) -> Result<()> {
        (self.0)(update)
    }
}

#[async_trait]
impl PositionSink for Vec<PositionUpdate> {
    async fn on_update(&mut self, update: &PositionUpdate) -> Result<()> {
        self.push(*update);
        Ok(())
    }
}

#[async_trait]
impl PositionSink for mpsc::Sender<PositionUpdate> {
    async fn on_update(&mut self, update: &PositionUpdate) -> Result<()> {
        self.send(*update)
            .await
            .map_err(|_| RideError::ChannelClosed)
    }
}

/// In-flight state of one segment
#[derive(Debug, Clone, Copy)]
struct Segment {
    index: usize,
    from: Coordinate,
    to: Coordinate,
    distance_m: f64,
    travel_secs: f64,
    elapsed_secs: f64,
}

/// Lazy, finite sequence of position updates for one ride
///
/// Pure pacing math: the iterator draws speed jitter and tick lengths from its
/// random source but never sleeps. Each item's `tick` is the delay a real-time
/// consumer should wait before asking for the next item. The last item is always
/// the final waypoint with the full polyline length.
#[derive(Debug)]
pub struct RideTicks<R> {
    waypoints: Vec<Coordinate>,
    nominal_speed_kmh: f64,
    config: RideConfig,
    rng: R,
    next_segment: usize,
    current: Option<Segment>,
    completed_distance_m: f64,
    last: Option<PositionUpdate>,
    finished: bool,
}

impl<R: Rng> RideTicks<R> {
    /// Validate the inputs and prepare a ride
    ///
    /// # Errors
    ///
    /// Returns [`RideError::InvalidArgument`] for fewer than 2 waypoints, a
    /// non-positive speed, or an invalid config.
    pub fn new(
        waypoints: Vec<Coordinate>,
        nominal_speed_kmh: f64,
        config: RideConfig,
        rng: R,
    ) -> Result<Self> {
        if waypoints.len() < 2 {
            return Err(RideError::InvalidArgument(format!(
                "a ride needs at least 2 waypoints, got {}",
                waypoints.len()
            )));
        }
        if let Some(i) = waypoints
            .iter()
            .position(|w| !w.lat.is_finite() || !w.lng.is_finite())
        {
            return Err(RideError::InvalidArgument(format!(
                "waypoint {i} is not a finite coordinate"
            )));
        }
        validate_speed(nominal_speed_kmh)?;
        config.validate()?;

        Ok(Self {
            waypoints,
            nominal_speed_kmh,
            config,
            rng,
            next_segment: 0,
            current: None,
            completed_distance_m: 0.0,
            last: None,
            finished: false,
        })
    }

    fn start_segment(&mut self, index: usize) -> Segment {
        let from = self.waypoints[index];
        let to = self.waypoints[index + 1];
        let distance_m = haversine_distance(from, to);

        let jitter = self
            .rng
            .gen_range(self.config.jitter_min..=self.config.jitter_max);
        let actual_speed_kmh = self.nominal_speed_kmh * jitter;
        let speed_mps = actual_speed_kmh * 1000.0 / 3600.0;
        let travel_secs = distance_m / speed_mps;

        debug!(
            "Point {} -> {}: distance {:.2} m, actual speed {:.2} km/h, expected {:.2}s",
            index,
            index + 1,
            distance_m,
            actual_speed_kmh,
            travel_secs
        );

        Segment {
            index,
            from,
            to,
            distance_m,
            travel_secs,
            elapsed_secs: 0.0,
        }
    }

    fn advance(&mut self, mut segment: Segment) -> PositionUpdate {
        let mut tick_secs = self
            .rng
            .gen_range(self.config.tick_min_secs..=self.config.tick_max_secs);

        let progress = if segment.elapsed_secs + tick_secs >= segment.travel_secs {
            tick_secs = segment.travel_secs - segment.elapsed_secs;
            segment.elapsed_secs = segment.travel_secs;
            1.0
        } else {
            segment.elapsed_secs += tick_secs;
            (segment.elapsed_secs / segment.travel_secs).min(1.0)
        };
        self.current = Some(segment);

        PositionUpdate {
            coordinate: segment.from.lerp(&segment.to, progress),
            segment_index: segment.index,
            cumulative_distance_m: if progress >= 1.0 {
                self.completed_distance_m + segment.distance_m
            } else {
                segment.distance_m.mul_add(progress, self.completed_distance_m)
            },
            progress,
            tick: Duration::from_secs_f64(tick_secs.max(0.0)),
        }
    }

    fn final_update(&self) -> PositionUpdate {
        let last_index = self.waypoints.len() - 1;
        PositionUpdate {
            coordinate: self.waypoints[last_index],
            segment_index: last_index,
            cumulative_distance_m: self.completed_distance_m,
            progress: 1.0,
            tick: Duration::ZERO,
        }
    }
}

impl<R: Rng> Iterator for RideTicks<R> {
    type Item = PositionUpdate;

    fn next(&mut self) -> Option<PositionUpdate> {
        loop {
            if self.finished {
                return None;
            }

            if let Some(segment) = self.current {
                if segment.elapsed_secs < segment.travel_secs {
                    let update = self.advance(segment);
                    self.last = Some(update);
                    return Some(update);
                }
                self.completed_distance_m += segment.distance_m;
                self.current = None;
                continue;
            }

            if self.next_segment + 1 < self.waypoints.len() {
                let segment = self.start_segment(self.next_segment);
                self.next_segment += 1;
                self.current = Some(segment);
                continue;
            }

            self.finished = true;
            let update = self.final_update();
            let duplicate = self.last.is_some_and(|last| {
                let same_distance =
                    last.cumulative_distance_m.to_bits() == update.cumulative_distance_m.to_bits();
                last.coordinate == update.coordinate && same_distance
            });
            if self.config.dedupe_final && duplicate {
                return None;
            }
            self.last = Some(update);
            return Some(update);
        }
    }
}

impl<R: Rng> std::iter::FusedIterator for RideTicks<R> {}

/// Real-time bike ride simulator
///
/// Converts a polyline into paced, interpolated [`PositionUpdate`]s. Each segment gets
/// its own random speed multiplier and is walked in ticks of random length. The
/// simulator waits for the sink and then for the clock after every sample.
///
/// # Examples
///
/// ```no_run
/// use ridesim::{Coordinate, FnSink, RideConfig, RideSimulator};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let route = [
///         Coordinate::new(25.0330, 121.5654),
///         Coordinate::new(25.0400, 121.5700),
///     ];
///
///     let mut simulator = RideSimulator::new(RideConfig::default());
///     let summary = simulator
///         .simulate(&route, 15.0, &mut FnSink::new(|update| {
///             println!("{update}");
///             Ok(())
///         }))
///         .await?;
///
///     println!("Ride complete: {summary}");
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct RideSimulator<R = StdRng, C = TokioClock> {
    config: RideConfig,
    rng: R,
    clock: C,
}

impl RideSimulator {
    /// Wall-clock simulator with an entropy-seeded random source
    #[must_use]
    pub fn new(config: RideConfig) -> Self {
        Self::with_rng_and_clock(config, StdRng::from_entropy(), TokioClock)
    }

    /// Wall-clock simulator with a reproducible random source
    #[must_use]
    pub fn seeded(config: RideConfig, seed: u64) -> Self {
        Self::with_rng_and_clock(config, StdRng::seed_from_u64(seed), TokioClock)
    }
}

impl<R: Rng + Send, C: Clock> RideSimulator<R, C> {
    /// Simulator with an explicit random source and clock
    #[must_use]
    pub const fn with_rng_and_clock(config: RideConfig, rng: R, clock: C) -> Self {
        Self { config, rng, clock }
    }

    /// Ride parameters
    #[must_use]
    pub const fn config(&self) -> &RideConfig {
        &self.config
    }

    /// Clock used for pacing
    #[must_use]
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    /// Plan a ride without pacing it
    ///
    /// # Errors
    ///
    /// Returns [`RideError::InvalidArgument`] for fewer than 2 waypoints or a
    /// non-positive speed.
    pub fn plan(
        &mut self,
        waypoints: &[Coordinate],
        nominal_speed_kmh: f64,
    ) -> Result<RideTicks<&mut R>> {
        RideTicks::new(
            waypoints.to_vec(),
            nominal_speed_kmh,
            self.config.clone(),
            &mut self.rng,
        )
    }

    /// Run a ride to completion, delivering every sample to `sink`
    ///
    /// Blocks the calling task for the whole simulated duration.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::InvalidArgument`] before emitting anything when the
    /// input is malformed, or the first error returned by `sink`.
    pub async fn simulate<S>(
        &mut self,
        waypoints: &[Coordinate],
        nominal_speed_kmh: f64,
        sink: &mut S,
    ) -> Result<RideSummary>
    where
        S: PositionSink + ?Sized,
    {
        let ticks = RideTicks::new(
            waypoints.to_vec(),
            nominal_speed_kmh,
            self.config.clone(),
            &mut self.rng,
        )?;

        info!(
            "Starting ride over {} waypoints, nominal speed {:.1} km/h",
            waypoints.len(),
            nominal_speed_kmh
        );

        let mut summary = RideSummary::default();
        for update in ticks {
            sink.on_update(&update).await?;

            summary.updates += 1;
            summary.total_distance_m = update.cumulative_distance_m;

            if !update.tick.is_zero() {
                self.clock.sleep(update.tick).await;
                summary.simulated_time += update.tick;
            }
        }

        info!("Ride complete! Total distance: {summary}");
        Ok(summary)
    }
}

impl<R, C> RideSimulator<R, C>
where
    R: Rng + Send + 'static,
    C: Clock + 'static,
{
    /// Run a ride on its own task and stream its samples over a bounded channel
    ///
    /// The ride waits whenever `buffer` samples are queued, so the consumer controls
    /// backpressure by how fast it drains the handle.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::InvalidArgument`] for malformed input, without spawning.
    pub fn spawn(
        mut self,
        waypoints: Vec<Coordinate>,
        nominal_speed_kmh: f64,
        buffer: usize,
    ) -> Result<RideHandle> {
        RideTicks::new(
            waypoints.clone(),
            nominal_speed_kmh,
            self.config.clone(),
            &mut self.rng,
        )?;

        let (mut sender, updates) = mpsc::channel(buffer.max(1));
        let task = tokio::spawn(async move {
            self.simulate(&waypoints, nominal_speed_kmh, &mut sender)
                .await
        });

        Ok(RideHandle { updates, task })
    }
}

/// Consumer end of a spawned ride
#[derive(Debug)]
pub struct RideHandle {
    updates: mpsc::Receiver<PositionUpdate>,
    task: JoinHandle<Result<RideSummary>>,
}

impl RideHandle {
    /// Receive the next sample, or `None` once the ride has ended
    pub async fn next_update(&mut self) -> Option<PositionUpdate> {
        self.updates.recv().await
    }

    /// Stop the ride at its next suspension point
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Whether the ride task has ended
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Drain any remaining samples and wait for the ride's summary
    ///
    /// # Errors
    ///
    /// Returns [`RideError::Cancelled`] if the ride was cancelled, or the error
    /// that ended the ride.
    pub async fn join(mut self) -> Result<RideSummary> {
        while self.updates.recv().await.is_some() {}
        join_ride(self.task).await
    }

    /// Turn the handle into a stream of samples
    ///
    /// The ride keeps running detached and the stream ends when it does. How the
    /// ride ended is logged by a watcher task, so this must be called from within
    /// a Tokio runtime.
    pub fn into_stream(self) -> impl Stream<Item = PositionUpdate> {
        let Self { updates, task } = self;
        tokio::spawn(async move {
            match join_ride(task).await {
                Ok(summary) => debug!("Streamed ride finished: {summary}"),
                Err(e) if e.is_cancellation() => debug!("Streamed ride stopped: {e}"),
                Err(e) => error!("Streamed ride failed: {e}"),
            }
        });

        stream::unfold(updates, |mut updates| async move {
            updates.recv().await.map(|update| (update, updates))
        })
    }
}

/// Await a ride task, mapping task failures into ride errors
pub(crate) async fn join_ride(task: JoinHandle<Result<RideSummary>>) -> Result<RideSummary> {
    match task.await {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Err(RideError::Cancelled),
        Err(e) => Err(RideError::Other(format!("ride task failed: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::path_length;
    use futures::StreamExt;

    fn instant_simulator(seed: u64) -> RideSimulator<StdRng, InstantClock> {
        RideSimulator::with_rng_and_clock(
            RideConfig::default(),
            StdRng::seed_from_u64(seed),
            InstantClock::new(),
        )
    }

    fn two_points_1km() -> [Coordinate; 2] {
        // 1 km due north from the equator
        let a = Coordinate::new(0.0, 0.0);
        let lat = (1000.0 / crate::geo::EARTH_RADIUS_METERS).to_degrees();
        [a, Coordinate::new(lat, 0.0)]
    }

    #[tokio::test]
    async fn test_two_waypoint_ride_progress() {
        let route = [Coordinate::new(25.0330, 121.5654), Coordinate::new(25.0400, 121.5700)];
        let segment = haversine_distance(route[0], route[1]);

        let mut updates = Vec::new();
        let summary = instant_simulator(7)
            .simulate(&route, 15.0, &mut updates)
            .await
            .unwrap();

        assert!(updates.len() >= 3);
        assert_eq!(summary.updates, updates.len());
        assert!(updates[0].cumulative_distance_m > 0.0);
        for pair in updates.windows(2) {
            assert!(pair[0].cumulative_distance_m <= pair[1].cumulative_distance_m);
        }

        let last = updates.last().unwrap();
        assert_eq!(last.coordinate, route[1]);
        assert!((last.cumulative_distance_m - segment).abs() < 1e-9);
        assert!(last.tick.is_zero());
    }

    #[tokio::test]
    async fn test_interpolation_stays_within_segment_bounds() {
        let route = [
            Coordinate::new(24.1477, 120.6736),
            Coordinate::new(24.1500, 120.6600),
            Coordinate::new(24.1400, 120.6650),
        ];

        let mut updates = Vec::new();
        instant_simulator(11)
            .simulate(&route, 20.0, &mut updates)
            .await
            .unwrap();

        for update in updates.iter().filter(|u| u.segment_index + 1 < route.len()) {
            let from = route[update.segment_index];
            let to = route[update.segment_index + 1];
            assert!(update.coordinate.lat >= from.lat.min(to.lat));
            assert!(update.coordinate.lat <= from.lat.max(to.lat));
            assert!(update.coordinate.lng >= from.lng.min(to.lng));
            assert!(update.coordinate.lng <= from.lng.max(to.lng));
            assert!((0.0..=1.0).contains(&update.progress));
        }
    }

    #[tokio::test]
    async fn test_segment_indices_for_three_waypoints() {
        let route = [
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 0.003),
            Coordinate::new(0.003, 0.003),
        ];

        let mut updates = Vec::new();
        instant_simulator(3)
            .simulate(&route, 15.0, &mut updates)
            .await
            .unwrap();

        let (last, ticks) = updates.split_last().unwrap();
        let boundary = ticks
            .iter()
            .position(|u| u.segment_index == 1)
            .expect("second segment emitted samples");

        assert!(boundary > 0);
        assert!(ticks[..boundary].iter().all(|u| u.segment_index == 0));
        assert!(ticks[boundary..].iter().all(|u| u.segment_index == 1));
        assert_eq!(ticks[boundary - 1].coordinate, route[1]);
        assert!(ticks[boundary - 1].is_segment_end());
        assert!(!ticks[0].is_segment_end());
        assert_eq!(last.segment_index, 2);
        assert_eq!(last.coordinate, route[2]);
    }

    #[tokio::test]
    async fn test_zero_length_segment_emits_only_final() {
        let route = [Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 0.0)];
        let mut simulator = instant_simulator(1);
        let clock = simulator.clock().clone();

        let mut updates = Vec::new();
        simulator.simulate(&route, 15.0, &mut updates).await.unwrap();

        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].coordinate, route[1]);
        assert!(updates[0].cumulative_distance_m.abs() < f64::EPSILON);
        assert_eq!(clock.sleep_count(), 0);
    }

    #[tokio::test]
    async fn test_simulated_time_within_jitter_band() {
        let route = two_points_1km();
        let baseline_secs = 1000.0 / (15_000.0 / 3600.0);

        for seed in 0..20 {
            let mut simulator = instant_simulator(seed);
            let clock = simulator.clock().clone();
            let mut updates = Vec::new();
            let summary = simulator
                .simulate(&route, 15.0, &mut updates)
                .await
                .unwrap();

            let simulated = summary.simulated_time.as_secs_f64();
            assert!(
                simulated >= baseline_secs / 1.2 - 1e-6 && simulated <= baseline_secs / 0.8 + 1e-6,
                "seed {seed}: {simulated}s outside jitter band around {baseline_secs}s"
            );
            assert!((clock.elapsed().as_secs_f64() - simulated).abs() < 1e-6);
            let paced = updates.iter().filter(|u| !u.tick.is_zero()).count();
            assert_eq!(clock.sleep_count(), paced);
        }
    }

    #[tokio::test]
    async fn test_seeded_rides_are_reproducible() {
        let route = [
            Coordinate::new(25.0330, 121.5654),
            Coordinate::new(25.0350, 121.5680),
            Coordinate::new(25.0380, 121.5690),
        ];

        let mut first = Vec::new();
        let mut second = Vec::new();
        instant_simulator(42).simulate(&route, 18.0, &mut first).await.unwrap();
        instant_simulator(42).simulate(&route, 18.0, &mut second).await.unwrap();
        assert_eq!(first, second);

        let planned: Vec<_> = instant_simulator(42).plan(&route, 18.0).unwrap().collect();
        assert_eq!(planned, first);
    }

    #[test]
    fn test_ticks_respect_bounds_and_sum_to_travel_time() {
        let route = two_points_1km();
        let mut simulator = instant_simulator(5);
        let updates: Vec<_> = simulator.plan(&route, 12.0).unwrap().collect();

        let (_, ticks) = updates.split_last().unwrap();
        let (clipped, full) = ticks.split_last().unwrap();
        for update in full {
            let secs = update.tick.as_secs_f64();
            assert!((1.0..=2.0).contains(&secs), "tick {secs}s out of range");
        }
        assert!(clipped.tick.as_secs_f64() <= 2.0);
        assert!((clipped.progress - 1.0).abs() < f64::EPSILON);

        let total: f64 = ticks.iter().map(|u| u.tick.as_secs_f64()).sum();
        let distance = haversine_distance(route[0], route[1]);
        // Travel time must fall inside the jitter band
        assert!(total >= distance / (12.0 * 1.2 / 3.6) - 1e-6);
        assert!(total <= distance / (12.0 * 0.8 / 3.6) + 1e-6);
    }

    #[test]
    fn test_final_event_duplicate_and_dedupe() {
        let route = two_points_1km();

        let mut plain = instant_simulator(9);
        let updates: Vec<_> = plain.plan(&route, 15.0).unwrap().collect();
        let n = updates.len();
        assert_eq!(updates[n - 2].coordinate, updates[n - 1].coordinate);
        assert_eq!(updates[n - 2].segment_index, 0);
        assert_eq!(updates[n - 1].segment_index, 1);

        let mut deduped = RideSimulator::with_rng_and_clock(
            RideConfig {
                dedupe_final: true,
                ..RideConfig::default()
            },
            StdRng::seed_from_u64(9),
            InstantClock::new(),
        );
        let deduped: Vec<_> = deduped.plan(&route, 15.0).unwrap().collect();
        assert_eq!(deduped.len(), n - 1);
        assert_eq!(deduped.last().unwrap().coordinate, route[1]);
    }

    #[test]
    fn test_dedupe_keeps_final_after_zero_length_tail() {
        let route = [
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 0.002),
            Coordinate::new(0.0, 0.002),
        ];
        let mut simulator = RideSimulator::with_rng_and_clock(
            RideConfig {
                dedupe_final: true,
                ..RideConfig::default()
            },
            StdRng::seed_from_u64(2),
            InstantClock::new(),
        );
        let updates: Vec<_> = simulator.plan(&route, 15.0).unwrap().collect();
        let last = updates.last().unwrap();

        assert_eq!(last.coordinate, route[2]);
        assert!((last.cumulative_distance_m - path_length(&route)).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_input_is_rejected() {
        let mut simulator = instant_simulator(0);
        let single = vec![Coordinate::new(0.0, 0.0)];
        let pair = vec![Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 0.01)];

        let test_cases = vec![
            (Vec::new(), 15.0),
            (single, 15.0),
            (pair.clone(), 0.0),
            (pair.clone(), -3.0),
            (pair, f64::NAN),
            (vec![Coordinate::new(0.0, 0.0), Coordinate::new(f64::NAN, 0.0)], 15.0),
        ];

        for (waypoints, speed) in test_cases {
            let result = simulator.plan(&waypoints, speed);
            assert!(
                matches!(result, Err(RideError::InvalidArgument(_))),
                "expected InvalidArgument for {} waypoints at {speed} km/h",
                waypoints.len()
            );
        }
    }

    #[tokio::test]
    async fn test_sink_error_aborts_ride() {
        let route = two_points_1km();
        let mut calls = 0;
        let mut sink = FnSink::new(|_| {
            calls += 1;
            if calls == 3 {
                Err(RideError::Service("device went away".to_string()))
            } else {
                Ok(())
            }
        });

        let result = instant_simulator(4).simulate(&route, 15.0, &mut sink).await;
        assert!(matches!(result, Err(RideError::Service(_))));
        drop(sink);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_spawned_ride_streams_in_order() {
        let route = vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 0.002),
            Coordinate::new(0.002, 0.002),
        ];

        let mut expected = Vec::new();
        instant_simulator(21)
            .simulate(&route, 15.0, &mut expected)
            .await
            .unwrap();

        let handle = instant_simulator(21).spawn(route, 15.0, 1).unwrap();
        let streamed: Vec<_> = handle.into_stream().collect().await;
        assert_eq!(streamed, expected);
    }

    #[tokio::test]
    async fn test_spawned_ride_join_and_cancel() {
        let route = two_points_1km().to_vec();

        let mut handle = instant_simulator(8).spawn(route.clone(), 15.0, 4).unwrap();
        assert!(handle.next_update().await.is_some());
        assert!(!handle.is_finished());
        let summary = handle.join().await.unwrap();
        assert!((summary.total_distance_m - path_length(&route)).abs() < 1e-9);

        // Real clock: the ride is parked in its first sleep when cancelled
        let handle = RideSimulator::seeded(RideConfig::default(), 8)
            .spawn(route, 15.0, 4)
            .unwrap();
        handle.cancel();
        assert!(matches!(handle.join().await, Err(RideError::Cancelled)));
    }

    #[tokio::test]
    async fn test_handle_finishes_after_last_update() {
        let mut handle = instant_simulator(13)
            .spawn(two_points_1km().to_vec(), 15.0, 2)
            .unwrap();
        while handle.next_update().await.is_some() {}
        while !handle.is_finished() {
            tokio::task::yield_now().await;
        }
        assert!(handle.join().await.is_ok());
    }

    #[tokio::test]
    async fn test_ride_speed_ignores_config_speed() {
        let route = [Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 0.001)];
        let config = RideConfig {
            nominal_speed_kmh: 0.0,
            ..RideConfig::default()
        };

        let mut simulator = RideSimulator::with_rng_and_clock(
            config,
            StdRng::seed_from_u64(6),
            InstantClock::new(),
        );
        let mut updates = Vec::new();
        let summary = simulator.simulate(&route, 15.0, &mut updates).await.unwrap();
        assert_eq!(summary.updates, updates.len());
        assert_eq!(updates.last().unwrap().coordinate, route[1]);

        assert!(simulator.plan(&route, 15.0).is_ok());
        assert!(simulator.spawn(route.to_vec(), 15.0, 1).is_ok());
    }

    #[test]
    fn test_spawn_rejects_invalid_input_without_runtime() {
        let result = instant_simulator(0).spawn(vec![Coordinate::new(0.0, 0.0)], 15.0, 4);
        assert!(matches!(result, Err(RideError::InvalidArgument(_))));
    }
}
