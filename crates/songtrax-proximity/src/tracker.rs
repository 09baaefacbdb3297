//! Proximity tracking.
//!
//! A [`ProximityTracker`] owns one position subscription at a time. Every
//! reading is resolved against the known locations; when the nearest one is
//! inside the threshold the directory is asked whether anything was shared
//! there. Each reading yields exactly one [`ProximityUpdate`].

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use songtrax_core::{
    nearest_location, DistanceResult, Location, LocationId, Position, Result, SampleDirectory,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::source::{Permission, PositionSource, Subscription, SubscriptionId, WatchOptions};

/// Whether the user is near a location with samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "signal", content = "locationId", rename_all = "camelCase")]
pub enum ProximitySignal {
    Nearby(LocationId),
    #[default]
    NotNearby,
}

impl ProximitySignal {
    pub const fn is_nearby(self) -> bool {
        matches!(self, Self::Nearby(_))
    }

    pub const fn location(self) -> Option<LocationId> {
        match self {
            Self::Nearby(id) => Some(id),
            Self::NotNearby => None,
        }
    }
}

/// Result of processing one position reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityUpdate {
    pub position: Position,
    /// Nearest location, `None` when there are no locations at all.
    pub result: Option<DistanceResult>,
    pub signal: ProximitySignal,
    /// Nearest location whenever it is inside the threshold, samples or not.
    pub selected_location: Option<LocationId>,
}

/// Last known tracker state.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximitySnapshot {
    pub position: Option<Position>,
    pub result: Option<DistanceResult>,
    pub signal: ProximitySignal,
    pub selected_location: Option<LocationId>,
    pub permission: Permission,
}

/// Stream of updates from one tracking run.
///
/// Yields `None` once the run is stopped or never started (permission
/// denied).
#[derive(Debug)]
pub struct ProximityEvents {
    rx: mpsc::UnboundedReceiver<ProximityUpdate>,
}

impl ProximityEvents {
    pub async fn recv(&mut self) -> Option<ProximityUpdate> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ProximityUpdate> {
        self.rx.try_recv().ok()
    }
}

struct TrackerState {
    snapshot: ProximitySnapshot,
    /// Identity of the live run. Bumped on every start and stop.
    generation: u64,
}

struct ActiveRun {
    subscription: SubscriptionId,
    task: JoinHandle<()>,
}

/// Tracks the user against a set of locations.
pub struct ProximityTracker {
    source: Arc<dyn PositionSource>,
    directory: Arc<dyn SampleDirectory>,
    options: WatchOptions,
    state: Arc<Mutex<TrackerState>>,
    run: Mutex<Option<ActiveRun>>,
    /// Held across a whole start or stop, so they never interleave.
    lifecycle: tokio::sync::Mutex<()>,
}

impl ProximityTracker {
    pub fn new(source: Arc<dyn PositionSource>, directory: Arc<dyn SampleDirectory>) -> Self {
        Self {
            source,
            directory,
            options: WatchOptions::default(),
            state: Arc::new(Mutex::new(TrackerState {
                snapshot: ProximitySnapshot::default(),
                generation: 0,
            })),
            run: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub const fn with_options(mut self, options: WatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Start tracking against `locations`, replacing any previous run.
    ///
    /// If permission is not granted the tracker stays disabled: this
    /// returns `Ok` with an already finished event stream.
    pub async fn start(&self, locations: Vec<Location>) -> Result<ProximityEvents> {
        let _lifecycle = self.lifecycle.lock().await;
        self.stop_run().await;

        let (tx, rx) = mpsc::unbounded_channel();

        let permission = self.source.request_permission().await;
        self.state.lock().snapshot.permission = permission;
        if permission != Permission::Granted {
            warn!("Location permission {permission:?}, proximity tracking disabled");
            return Ok(ProximityEvents { rx });
        }

        let Subscription { id, updates } = self.source.subscribe(self.options).await?;

        info!(
            "Tracking {} locations (subscription {id:?})",
            locations.len()
        );
        debug!(
            "Watching every {:?} (at most every {:?}), ignoring moves under {} m",
            self.options.interval, self.options.fastest_interval, self.options.min_distance_metres
        );

        let token = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.generation
        };
        let worker = Worker {
            directory: Arc::clone(&self.directory),
            state: Arc::clone(&self.state),
            locations,
            token,
            events: tx,
        };
        *self.run.lock() = Some(ActiveRun {
            subscription: id,
            task: tokio::spawn(worker.run(updates)),
        });

        Ok(ProximityEvents { rx })
    }

    /// Stop tracking. Calling this when not tracking does nothing.
    ///
    /// Waits for a concurrent [`start`](Self::start) to finish first, so a
    /// run started before this call never outlives it.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.stop_run().await;
    }

    async fn stop_run(&self) {
        let Some(run) = self.run.lock().take() else {
            return;
        };
        self.state.lock().generation += 1;
        run.task.abort();
        self.source.unsubscribe(run.subscription).await;
        debug!("Proximity tracking stopped");
    }

    pub fn is_tracking(&self) -> bool {
        self.run.lock().is_some()
    }

    pub fn snapshot(&self) -> ProximitySnapshot {
        self.state.lock().snapshot
    }
}

impl Drop for ProximityTracker {
    fn drop(&mut self) {
        // Unsubscribing needs an await; dropping the aborted task's receiver
        // is enough for the source to forget us.
        if let Some(run) = self.run.get_mut().take() {
            run.task.abort();
        }
    }
}

struct Worker {
    directory: Arc<dyn SampleDirectory>,
    state: Arc<Mutex<TrackerState>>,
    locations: Vec<Location>,
    token: u64,
    events: mpsc::UnboundedSender<ProximityUpdate>,
}

impl Worker {
    async fn run(self, mut updates: mpsc::UnboundedReceiver<Result<Position>>) {
        while let Some(reading) = updates.recv().await {
            let position = match reading {
                Ok(position) => position,
                Err(e) => {
                    warn!("Position update failed: {e}");
                    continue;
                }
            };

            let update = resolve(self.directory.as_ref(), &self.locations, position).await;

            {
                let mut state = self.state.lock();
                if state.generation != self.token {
                    trace!("Dropping reading from a stopped run");
                    return;
                }
                let previous = state.snapshot.signal;
                state.snapshot.position = Some(update.position);
                state.snapshot.result = update.result;
                state.snapshot.signal = update.signal;
                state.snapshot.selected_location = update.selected_location;
                if previous != update.signal {
                    info!("Proximity changed: {previous:?} -> {:?}", update.signal);
                }
            }

            if self.events.send(update).is_err() {
                trace!("No one is listening for proximity updates");
            }
        }
        debug!("Position stream ended");
    }
}

/// Evaluate a single reading.
///
/// The directory is only consulted when the nearest location is inside the
/// threshold. A failed lookup counts as "no samples".
pub async fn resolve(
    directory: &dyn SampleDirectory,
    locations: &[Location],
    position: Position,
) -> ProximityUpdate {
    let result = nearest_location(&position, locations);

    let selected_location = result
        .filter(|r| r.within_threshold)
        .map(|r| r.location_id);

    let signal = match selected_location {
        Some(id) => match directory.has_samples_at(id).await {
            Ok(true) => ProximitySignal::Nearby(id),
            Ok(false) => ProximitySignal::NotNearby,
            Err(e) => {
                warn!("Sample lookup for location {id} failed: {e}");
                ProximitySignal::NotNearby
            }
        },
        None => ProximitySignal::NotNearby,
    };

    ProximityUpdate {
        position,
        result,
        signal,
        selected_location,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

    use super::*;
    use crate::source::ChannelPositionSource;
    use async_trait::async_trait;
    use songtrax_core::Error;
    use std::collections::HashSet;
    use std::time::Duration;

    const HOME: Position = Position::new(-27.4975, 153.0137);

    #[derive(Default)]
    struct MemoryDirectory {
        locations: Vec<Location>,
        with_samples: HashSet<LocationId>,
        delay: Option<Duration>,
        fail: bool,
    }

    impl MemoryDirectory {
        fn with_samples(ids: &[u64]) -> Self {
            Self {
                with_samples: ids.iter().copied().map(LocationId).collect(),
                ..Self::default()
            }
        }

        /// One location 50 m north of home, one 400 m north, both with samples.
        fn campus() -> Self {
            Self {
                locations: vec![
                    Location::new(LocationId(1), HOME.offset_north(50.0)),
                    Location::new(LocationId(2), HOME.offset_north(400.0)),
                ],
                ..Self::with_samples(&[1, 2])
            }
        }
    }

    #[async_trait]
    impl SampleDirectory for MemoryDirectory {
        async fn locations(&self) -> Result<Vec<Location>> {
            Ok(self.locations.clone())
        }

        async fn has_samples_at(&self, location: LocationId) -> Result<bool> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(Error::BackendUnavailable("offline".to_string()));
            }
            Ok(self.with_samples.contains(&location))
        }
    }

    /// Delegates to a channel source but takes a while to subscribe.
    struct SlowSource {
        inner: Arc<ChannelPositionSource>,
        delay: Duration,
    }

    #[async_trait]
    impl PositionSource for SlowSource {
        async fn request_permission(&self) -> Permission {
            self.inner.request_permission().await
        }

        async fn subscribe(&self, options: WatchOptions) -> Result<Subscription> {
            tokio::time::sleep(self.delay).await;
            self.inner.subscribe(options).await
        }

        async fn unsubscribe(&self, id: SubscriptionId) {
            self.inner.unsubscribe(id).await;
        }
    }

    fn nearby_pair() -> Vec<Location> {
        vec![
            Location::new(LocationId(1), HOME.offset_north(50.0)),
            Location::new(LocationId(2), HOME.offset_north(150.0)),
        ]
    }

    async fn tracker_with(
        source: Arc<dyn PositionSource>,
        directory: MemoryDirectory,
    ) -> (ProximityTracker, Vec<Location>) {
        let locations = directory.locations().await.unwrap();
        let directory: Arc<dyn SampleDirectory> = Arc::new(directory);
        (ProximityTracker::new(source, directory), locations)
    }

    async fn campus_tracker(
        source: &Arc<ChannelPositionSource>,
    ) -> (ProximityTracker, Vec<Location>) {
        let source: Arc<dyn PositionSource> = source.clone();
        tracker_with(source, MemoryDirectory::campus()).await
    }

    #[tokio::test]
    async fn test_nearby_with_samples() {
        let update = resolve(&MemoryDirectory::with_samples(&[1]), &nearby_pair(), HOME).await;
        assert_eq!(update.signal, ProximitySignal::Nearby(LocationId(1)));
        assert_eq!(update.selected_location, Some(LocationId(1)));
        assert!(update.result.unwrap().within_threshold);
    }

    #[tokio::test]
    async fn test_selected_without_samples() {
        let update = resolve(&MemoryDirectory::with_samples(&[2]), &nearby_pair(), HOME).await;
        assert_eq!(update.signal, ProximitySignal::NotNearby);
        assert_eq!(update.selected_location, Some(LocationId(1)));
    }

    #[tokio::test]
    async fn test_lookup_failure_is_not_nearby() {
        let directory = MemoryDirectory {
            fail: true,
            ..MemoryDirectory::with_samples(&[1])
        };
        let update = resolve(&directory, &nearby_pair(), HOME).await;
        assert_eq!(update.signal, ProximitySignal::NotNearby);
        assert_eq!(update.selected_location, Some(LocationId(1)));
    }

    #[tokio::test]
    async fn test_out_of_range() {
        let far = HOME.offset_north(-500.0);
        let update = resolve(&MemoryDirectory::with_samples(&[1, 2]), &nearby_pair(), far).await;
        assert_eq!(update.signal, ProximitySignal::NotNearby);
        assert!(update.selected_location.is_none());
        assert_eq!(update.result.unwrap().location_id, LocationId(1));
    }

    #[tokio::test]
    async fn test_no_locations() {
        let update = resolve(&MemoryDirectory::default(), &[], HOME).await;
        assert!(update.result.is_none());
        assert!(!update.signal.is_nearby());
    }

    #[test]
    fn test_signal_serialization() {
        let json = serde_json::to_value(ProximitySignal::Nearby(LocationId(4))).unwrap();
        assert_eq!(json, serde_json::json!({"signal": "nearby", "locationId": 4}));
        let json = serde_json::to_value(ProximitySignal::NotNearby).unwrap();
        assert_eq!(json, serde_json::json!({"signal": "notNearby"}));
        assert_eq!(ProximitySignal::NotNearby.location(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_walk_in_and_out_of_range() {
        let source = Arc::new(ChannelPositionSource::default());
        let (tracker, locations) = campus_tracker(&source).await;
        let mut events = tracker.start(locations).await.unwrap();
        assert!(tracker.is_tracking());

        source.push(HOME);
        let update = events.recv().await.unwrap();
        assert_eq!(update.signal, ProximitySignal::Nearby(LocationId(1)));
        assert_eq!(update.selected_location, Some(LocationId(1)));

        tokio::time::advance(Duration::from_secs(1)).await;
        source.push(HOME.offset_north(-300.0));
        let update = events.recv().await.unwrap();
        assert_eq!(update.signal, ProximitySignal::NotNearby);
        assert!(update.selected_location.is_none());

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.signal, ProximitySignal::NotNearby);
        assert_eq!(snapshot.permission, Permission::Granted);
        assert_eq!(snapshot.position, Some(HOME.offset_north(-300.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_keeps_last_state() {
        let source = Arc::new(ChannelPositionSource::default());
        let (tracker, locations) = campus_tracker(&source).await;
        let mut events = tracker.start(locations).await.unwrap();

        source.push(HOME);
        assert!(events.recv().await.unwrap().signal.is_nearby());

        source.push_error("satellites lost");
        tokio::time::advance(Duration::from_secs(1)).await;
        source.push(HOME.offset_north(380.0));

        // The error produced no update of its own.
        let update = events.recv().await.unwrap();
        assert_eq!(update.signal, ProximitySignal::Nearby(LocationId(2)));
        assert_eq!(tracker.snapshot().selected_location, Some(LocationId(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied_stays_silent() {
        let source = Arc::new(ChannelPositionSource::new(Permission::Denied));
        let (tracker, locations) = campus_tracker(&source).await;

        let mut events = tracker.start(locations).await.unwrap();
        source.push(HOME);

        assert!(events.recv().await.is_none());
        assert!(!tracker.is_tracking());
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.permission, Permission::Denied);
        assert_eq!(snapshot.signal, ProximitySignal::NotNearby);
        assert!(snapshot.position.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_unsubscribes() {
        let source = Arc::new(ChannelPositionSource::default());
        let (tracker, locations) = campus_tracker(&source).await;

        tracker.stop().await;

        let mut events = tracker.start(locations).await.unwrap();
        assert_eq!(source.subscriber_count(), 1);

        tracker.stop().await;
        tracker.stop().await;
        assert_eq!(source.subscriber_count(), 0);
        assert!(!tracker.is_tracking());
        assert!(events.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_subscription() {
        let source = Arc::new(ChannelPositionSource::default());
        let (tracker, locations) = campus_tracker(&source).await;

        let mut first = tracker.start(locations.clone()).await.unwrap();
        let mut second = tracker.start(locations).await.unwrap();
        assert_eq!(source.subscriber_count(), 1);
        assert!(first.recv().await.is_none());

        source.push(HOME);
        assert!(second.recv().await.unwrap().signal.is_nearby());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_in_flight_when_stopped_is_discarded() {
        let source = Arc::new(ChannelPositionSource::default());
        let directory = MemoryDirectory {
            delay: Some(Duration::from_secs(2)),
            ..MemoryDirectory::campus()
        };
        let (tracker, locations) = tracker_with(source.clone(), directory).await;
        let mut events = tracker.start(locations).await.unwrap();

        source.push(HOME);
        // Let the worker pick the reading up and park in the lookup.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(500)).await;

        tracker.stop().await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(events.recv().await.is_none());
        assert!(tracker.snapshot().position.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_start_ends_that_run() {
        let source = Arc::new(ChannelPositionSource::default());
        let slow: Arc<dyn PositionSource> = Arc::new(SlowSource {
            inner: source.clone(),
            delay: Duration::from_secs(1),
        });
        let (tracker, locations) = tracker_with(slow, MemoryDirectory::campus()).await;

        let (started, ()) = tokio::join!(tracker.start(locations), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            tracker.stop().await;
        });

        let mut events = started.unwrap();
        assert!(!tracker.is_tracking());
        assert_eq!(source.subscriber_count(), 0);
        assert!(events.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_starts_keep_the_last() {
        let source = Arc::new(ChannelPositionSource::default());
        let slow: Arc<dyn PositionSource> = Arc::new(SlowSource {
            inner: source.clone(),
            delay: Duration::from_secs(1),
        });
        let (tracker, locations) = tracker_with(slow, MemoryDirectory::campus()).await;

        let (first, second) =
            tokio::join!(tracker.start(locations.clone()), tracker.start(locations));
        let (mut first, mut second) = (first.unwrap(), second.unwrap());

        assert!(tracker.is_tracking());
        assert_eq!(source.subscriber_count(), 1);
        assert!(first.recv().await.is_none());

        source.push(HOME);
        let update = second.recv().await.unwrap();
        assert_eq!(update.signal, ProximitySignal::Nearby(LocationId(1)));
        assert_eq!(tracker.snapshot().signal, update.signal);
    }
}
