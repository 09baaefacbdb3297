//! Position sources.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use songtrax_core::{Error, Position, Result};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Outcome of asking the user for location access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Granted,
    Denied,
    #[default]
    Unknown,
}

/// How often and how eagerly a subscription reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    /// Readings closer than this to the last delivered one are dropped.
    pub min_distance_metres: f64,
    /// Cadence a source is expected to report at. Push-driven sources such
    /// as [`ChannelPositionSource`] do not enforce it; feeders pace by it.
    pub interval: Duration,
    /// Readings arriving sooner than this after the last delivered one are dropped.
    pub fastest_interval: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            min_distance_metres: 10.0,
            interval: Duration::from_millis(1000),
            fastest_interval: Duration::from_millis(500),
        }
    }
}

/// Identity of a live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// A live stream of readings. `Err` items are transport failures.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub updates: mpsc::UnboundedReceiver<Result<Position>>,
}

/// Something that can report the device position.
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Ask for (or report the already decided) location permission.
    async fn request_permission(&self) -> Permission;

    /// Start continuous updates.
    async fn subscribe(&self, options: WatchOptions) -> Result<Subscription>;

    /// Stop a subscription. Unknown ids are ignored.
    async fn unsubscribe(&self, id: SubscriptionId);
}

struct Watcher {
    options: WatchOptions,
    tx: mpsc::UnboundedSender<Result<Position>>,
    last_delivered: Option<(Position, Instant)>,
}

impl Watcher {
    fn accepts(&self, position: &Position, now: Instant) -> bool {
        let Some((last, at)) = self.last_delivered else {
            return true;
        };
        now.duration_since(at) >= self.options.fastest_interval
            && last.distance_to(position) >= self.options.min_distance_metres
    }
}

/// A source fed by hand: readings pushed in are fanned out to every
/// subscriber, filtered by each subscriber's [`WatchOptions`].
pub struct ChannelPositionSource {
    permission: Mutex<Permission>,
    watchers: Mutex<HashMap<SubscriptionId, Watcher>>,
    next_id: AtomicU64,
}

impl ChannelPositionSource {
    pub fn new(permission: Permission) -> Self {
        Self {
            permission: Mutex::new(permission),
            watchers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn set_permission(&self, permission: Permission) {
        *self.permission.lock() = permission;
    }

    /// Deliver a reading. Returns how many subscribers received it.
    pub fn push(&self, position: Position) -> usize {
        let now = Instant::now();
        let mut delivered = 0;

        self.watchers.lock().retain(|id, watcher| {
            if !watcher.accepts(&position, now) {
                trace!("Subscription {id:?} filtered reading {position}");
                return true;
            }
            if watcher.tx.send(Ok(position)).is_err() {
                debug!("Subscription {id:?} receiver gone, removing");
                return false;
            }
            watcher.last_delivered = Some((position, now));
            delivered += 1;
            true
        });

        delivered
    }

    /// Report a transport failure to every subscriber.
    pub fn push_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.watchers.lock().retain(|_, watcher| {
            watcher
                .tx
                .send(Err(Error::PositionTransport(message.clone())))
                .is_ok()
        });
    }

    /// End every subscription. Readings already delivered stay queued.
    pub fn close(&self) {
        let closed = self.watchers.lock().drain().count();
        debug!("Position source closed, {closed} subscriptions ended");
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.watchers.lock().len()
    }
}

impl Default for ChannelPositionSource {
    fn default() -> Self {
        Self::new(Permission::Granted)
    }
}

#[async_trait]
impl PositionSource for ChannelPositionSource {
    async fn request_permission(&self) -> Permission {
        *self.permission.lock()
    }

    async fn subscribe(&self, options: WatchOptions) -> Result<Subscription> {
        if *self.permission.lock() != Permission::Granted {
            return Err(Error::PermissionDenied);
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, updates) = mpsc::unbounded_channel();
        self.watchers.lock().insert(
            id,
            Watcher {
                options,
                tx,
                last_delivered: None,
            },
        );
        debug!("Subscription {id:?} started with {options:?}");

        Ok(Subscription { id, updates })
    }

    async fn unsubscribe(&self, id: SubscriptionId) {
        if self.watchers.lock().remove(&id).is_some() {
            debug!("Subscription {id:?} stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

    use super::*;

    const HOME: Position = Position::new(-27.4975, 153.0137);

    #[tokio::test(start_paused = true)]
    async fn test_readings_are_filtered_by_distance_and_rate() {
        let source = ChannelPositionSource::default();
        let mut sub = source.subscribe(WatchOptions::default()).await.unwrap();

        assert_eq!(source.push(HOME), 1);
        // Too soon.
        tokio::time::advance(Duration::from_millis(200)).await;
        assert_eq!(source.push(HOME.offset_north(50.0)), 0);
        // Late enough but hardly moved.
        tokio::time::advance(Duration::from_millis(400)).await;
        assert_eq!(source.push(HOME.offset_north(5.0)), 0);
        // Late enough and far enough.
        assert_eq!(source.push(HOME.offset_north(20.0)), 1);

        assert_eq!(sub.updates.recv().await.unwrap().unwrap(), HOME);
        let second = sub.updates.recv().await.unwrap().unwrap();
        assert!((HOME.distance_to(&second) - 20.0).abs() < 1e-6);
        assert!(sub.updates.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_errors_reach_subscribers() {
        let source = ChannelPositionSource::default();
        let mut sub = source.subscribe(WatchOptions::default()).await.unwrap();
        source.push_error("gps lost");
        assert!(matches!(
            sub.updates.recv().await.unwrap(),
            Err(Error::PositionTransport(_))
        ));
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_stream() {
        let source = ChannelPositionSource::default();
        let mut sub = source.subscribe(WatchOptions::default()).await.unwrap();
        source.unsubscribe(sub.id).await;
        source.unsubscribe(sub.id).await;
        assert_eq!(source.subscriber_count(), 0);
        assert!(sub.updates.recv().await.is_none());
        assert_eq!(source.push(HOME), 0);
    }

    #[tokio::test]
    async fn test_close_keeps_queued_readings() {
        let source = ChannelPositionSource::default();
        let mut sub = source.subscribe(WatchOptions::default()).await.unwrap();
        source.push(HOME);
        source.close();
        assert_eq!(sub.updates.recv().await.unwrap().unwrap(), HOME);
        assert!(sub.updates.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_subscribe_requires_permission() {
        let source = ChannelPositionSource::new(Permission::Denied);
        assert_eq!(source.request_permission().await, Permission::Denied);
        assert!(matches!(
            source.subscribe(WatchOptions::default()).await,
            Err(Error::PermissionDenied)
        ));
    }
}
