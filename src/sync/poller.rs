use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_stream::wrappers::WatchStream;
use tracing::{info, warn};

use crate::client::locations::LocationFeed;
use crate::models::geofence::GeoPoint;
use crate::models::location::VehicleLocation;
use crate::observability::metrics::Metrics;

/// Follow-mode selection shared between the view layer and the poll loop.
#[derive(Debug, Clone, Default)]
struct FollowTarget {
    vehicle_id: Option<String>,
}

/// Live vehicle positions, refreshed on a fixed interval.
///
/// Each successful tick replaces the whole location set; a failed tick
/// logs and is skipped, leaving the previous set displayed, and the next
/// tick fires on schedule (ticks are frequent and idempotent, so there is
/// no backoff). When follow mode has a focus vehicle, each successful tick
/// also publishes that vehicle's coordinate on the viewport-center channel.
pub struct LocationPoller {
    feed: Arc<dyn LocationFeed>,
    metrics: Metrics,
    locations: RwLock<HashMap<String, VehicleLocation>>,
    follow: Mutex<FollowTarget>,
    center_tx: watch::Sender<Option<GeoPoint>>,
}

impl LocationPoller {
    pub fn new(feed: Arc<dyn LocationFeed>, metrics: Metrics) -> Arc<Self> {
        let (center_tx, _center_rx) = watch::channel(None);
        Arc::new(Self {
            feed,
            metrics,
            locations: RwLock::new(HashMap::new()),
            follow: Mutex::new(FollowTarget::default()),
            center_tx,
        })
    }

    /// Snapshot of the latest poll cycle, for the live-marker layer.
    pub fn locations(&self) -> Vec<VehicleLocation> {
        self.locations
            .read()
            .expect("location lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn location_of(&self, vehicle_id: &str) -> Option<VehicleLocation> {
        self.locations
            .read()
            .expect("location lock poisoned")
            .get(vehicle_id)
            .cloned()
    }

    /// Stream of viewport centers for the map to follow.
    pub fn center_stream(&self) -> WatchStream<Option<GeoPoint>> {
        WatchStream::new(self.center_tx.subscribe())
    }

    /// Enable follow mode on a vehicle. Fetches the vehicle's position
    /// once so the viewport recenters immediately instead of waiting for
    /// the next tick.
    pub async fn follow(&self, vehicle_id: &str) {
        {
            let mut follow = self.follow.lock().expect("follow lock poisoned");
            follow.vehicle_id = Some(vehicle_id.to_string());
        }

        match self.feed.vehicle_location(vehicle_id).await {
            Ok(location) => {
                let _ = self.center_tx.send(Some(location.position()));
            }
            Err(err) => {
                warn!(vehicle_id, error = %err, "on-demand vehicle lookup failed");
            }
        }
    }

    pub fn unfollow(&self) {
        let mut follow = self.follow.lock().expect("follow lock poisoned");
        follow.vehicle_id = None;
    }

    /// Spawn the poll loop. The returned handle aborts the task on
    /// `stop()` or drop, so a poller bound to a map view cannot outlive it.
    pub fn spawn(self: &Arc<Self>, poll_interval: Duration) -> PollerHandle {
        let poller = self.clone();
        let task = tokio::spawn(async move {
            info!(interval_ms = poll_interval.as_millis() as u64, "location poller started");
            let mut ticker = interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                poller.tick().await;
            }
        });

        PollerHandle { task }
    }

    async fn tick(&self) {
        match self.feed.list_locations().await {
            Ok(samples) => {
                self.metrics
                    .poll_ticks_total
                    .with_label_values(&["success"])
                    .inc();
                self.replace(samples);
                self.recenter();
            }
            Err(err) => {
                // Prior set stays displayed; the next tick is unaffected.
                self.metrics
                    .poll_ticks_total
                    .with_label_values(&["error"])
                    .inc();
                warn!(error = %err, "location poll tick failed; keeping previous set");
            }
        }
    }

    fn replace(&self, samples: Vec<VehicleLocation>) {
        let fresh: HashMap<String, VehicleLocation> = samples
            .into_iter()
            .map(|sample| (sample.vehicle_id.clone(), sample))
            .collect();
        let mut locations = self.locations.write().expect("location lock poisoned");
        *locations = fresh;
    }

    fn recenter(&self) {
        let focus = {
            let follow = self.follow.lock().expect("follow lock poisoned");
            follow.vehicle_id.clone()
        };
        let Some(vehicle_id) = focus else { return };

        if let Some(location) = self.location_of(&vehicle_id) {
            let _ = self.center_tx.send(Some(location.position()));
        }
    }
}

/// Scoped ownership of the poll loop; dropping it tears the task down.
pub struct PollerHandle {
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
