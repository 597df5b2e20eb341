//! Live state store.
//!
//! The store owns the authoritative, observable snapshot of dashboard
//! state. All mutation goes through named reducer entry points, one per
//! event kind; each executes atomically under a [`tokio::sync::watch`]
//! sender, so readers only ever observe complete snapshots. No reducer
//! can fail: capacity-driven drops are steady-state behavior, and a
//! reducer invoked while paused is a no-op for the paused aggregators.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::trace;

use crate::bounded::{FrameRing, LogBuffer, PointCloud, VitalsHistory};
use crate::telemetry::{DetectedPoint, DeviceStatus, LogEntry, RadarFrame, VitalsSample};

/// Bounds for the store's aggregated collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLimits {
    /// Maximum number of retained radar frames.
    pub frame_capacity: usize,
    /// Maximum number of retained point-cloud points.
    pub point_capacity: usize,
    /// Update cycles after which an unrefreshed point is evicted.
    pub point_max_age: u32,
    /// Wall-clock span of retained vitals history.
    pub vitals_retention: Duration,
    /// Maximum number of retained sensor log lines.
    pub log_capacity: usize,
    /// Initial UI time-window selection.
    pub time_window: Duration,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            frame_capacity: 200,
            point_capacity: 500,
            point_max_age: 15,
            vitals_retention: Duration::from_secs(300),
            log_capacity: 1000,
            time_window: Duration::from_secs(60),
        }
    }
}

/// A consistent point-in-time view of dashboard state.
///
/// Snapshots are immutable once observed; readers hold clones and never
/// see a snapshot mid-update.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    /// Last known device status, if any has been reported.
    pub device: Option<DeviceStatus>,
    /// Recent radar frames, oldest first.
    pub frames: FrameRing,
    /// Aged point-cloud accumulator.
    pub points: PointCloud,
    /// Time-windowed vitals history.
    pub vitals: VitalsHistory,
    /// Recent sensor log lines.
    pub logs: LogBuffer,
    /// Whether the display is frozen.
    pub paused: bool,
    /// UI-selected history window.
    pub time_window: Duration,
    /// Whether the telemetry channel is connected.
    pub connected: bool,
}

impl StateSnapshot {
    /// Create an empty snapshot with the given bounds.
    #[must_use]
    pub fn new(limits: &StoreLimits) -> Self {
        Self {
            device: None,
            frames: FrameRing::new(limits.frame_capacity),
            points: PointCloud::new(limits.point_capacity, limits.point_max_age),
            vitals: VitalsHistory::new(limits.vitals_retention),
            logs: LogBuffer::new(limits.log_capacity),
            paused: false,
            time_window: limits.time_window,
            connected: false,
        }
    }
}

/// The single owner of mutable dashboard state.
///
/// Cloning the store clones a handle to the same state; every view of the
/// snapshot comes from [`LiveStateStore::subscribe`] or
/// [`LiveStateStore::snapshot`].
#[derive(Clone)]
pub struct LiveStateStore {
    tx: Arc<watch::Sender<StateSnapshot>>,
}

impl std::fmt::Debug for LiveStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.tx.borrow();
        f.debug_struct("LiveStateStore")
            .field("frames", &snapshot.frames.len())
            .field("points", &snapshot.points.len())
            .field("vitals", &snapshot.vitals.len())
            .field("logs", &snapshot.logs.len())
            .field("paused", &snapshot.paused)
            .field("connected", &snapshot.connected)
            .finish()
    }
}

impl Default for LiveStateStore {
    fn default() -> Self {
        Self::new(&StoreLimits::default())
    }
}

impl LiveStateStore {
    /// Create a new store with the given bounds.
    #[must_use]
    pub fn new(limits: &StoreLimits) -> Self {
        let (tx, _rx) = watch::channel(StateSnapshot::new(limits));
        Self { tx: Arc::new(tx) }
    }

    /// Subscribe to snapshot changes.
    ///
    /// The receiver observes each published snapshot atomically; it never
    /// sees a partially applied mutation.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<StateSnapshot> {
        self.tx.subscribe()
    }

    /// A point-in-time copy of the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        self.tx.borrow().clone()
    }

    /// Ingest a radar frame.
    ///
    /// A no-op while paused: the frame is discarded outright, not queued
    /// for replay on resume.
    pub fn apply_frame(&self, frame: RadarFrame) {
        self.tx.send_modify(|state| {
            if state.paused {
                trace!(sequence = frame.sequence, "frame dropped while paused");
                return;
            }
            state.frames.push(frame);
        });
    }

    /// Ingest one point-cloud update cycle.
    ///
    /// A no-op while paused; the batch is discarded and retained points do
    /// not age.
    pub fn apply_points(&self, batch: Vec<DetectedPoint>) {
        self.tx.send_modify(|state| {
            if state.paused {
                trace!(count = batch.len(), "point batch dropped while paused");
                return;
            }
            state.points.ingest(batch);
        });
    }

    /// Ingest a derived vitals sample.
    ///
    /// A no-op while paused. History is pruned to the retention window on
    /// every ingestion.
    pub fn apply_vitals(&self, sample: VitalsSample) {
        let now_secs = now_unix_secs();
        self.tx.send_modify(|state| {
            if state.paused {
                trace!("vitals sample dropped while paused");
                return;
            }
            state.vitals.push(sample, now_secs);
        });
    }

    /// Ingest a sensor log line. Logs are always live, independent of
    /// pause.
    pub fn apply_log(&self, entry: LogEntry) {
        self.tx.send_modify(|state| {
            state.logs.push(entry);
        });
    }

    /// Record a device status update.
    ///
    /// Streamed updates and command/query responses reconciled by the
    /// caller both go through this entry point.
    pub fn apply_device_status(&self, status: DeviceStatus) {
        self.tx.send_modify(|state| {
            state.device = Some(status);
        });
    }

    /// Freeze or unfreeze the visible state.
    ///
    /// Flips the flag only; no aggregator is mutated here.
    pub fn set_paused(&self, paused: bool) {
        self.tx.send_modify(|state| {
            state.paused = paused;
        });
    }

    /// Record the UI-selected history window.
    pub fn set_time_window(&self, window: Duration) {
        self.tx.send_modify(|state| {
            state.time_window = window;
        });
    }

    /// Record telemetry channel connectivity.
    pub fn set_connected(&self, connected: bool) {
        self.tx.send_modify(|state| {
            state.connected = connected;
        });
    }
}

/// Current wall-clock time in unix seconds (fractional).
fn now_unix_secs() -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let micros = Utc::now().timestamp_micros() as f64;
    micros / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::LogSeverity;

    fn make_frame(sequence: u64) -> RadarFrame {
        RadarFrame {
            sequence,
            timestamp: sequence as f64,
            magnitudes: vec![0.1],
            heatmap: None,
            points: Vec::new(),
            phase: None,
        }
    }

    fn make_point(x: f32) -> DetectedPoint {
        DetectedPoint {
            x,
            y: 0.0,
            z: 0.0,
            velocity: 0.0,
            snr: 10.0,
            track_id: None,
        }
    }

    fn make_sample(timestamp: f64) -> VitalsSample {
        VitalsSample {
            heart_rate: 60.0,
            respiration_rate: 14.0,
            heart_confidence: 0.9,
            respiration_confidence: 0.9,
            phase_stability: 0.8,
            quality: 0.9,
            source: "chirp-phase".to_string(),
            timestamp,
        }
    }

    fn make_log(message: &str) -> LogEntry {
        LogEntry {
            severity: LogSeverity::Info,
            source: "sensor".to_string(),
            message: message.to_string(),
            timestamp: 0.0,
        }
    }

    fn small_store() -> LiveStateStore {
        LiveStateStore::new(&StoreLimits {
            frame_capacity: 5,
            point_capacity: 8,
            point_max_age: 3,
            vitals_retention: Duration::from_secs(300),
            log_capacity: 4,
            time_window: Duration::from_secs(60),
        })
    }

    #[test]
    fn test_initial_snapshot() {
        let store = LiveStateStore::default();
        let snapshot = store.snapshot();
        assert!(snapshot.device.is_none());
        assert!(snapshot.frames.is_empty());
        assert!(snapshot.points.is_empty());
        assert!(snapshot.vitals.is_empty());
        assert!(snapshot.logs.is_empty());
        assert!(!snapshot.paused);
        assert!(!snapshot.connected);
        assert_eq!(snapshot.time_window, Duration::from_secs(60));
    }

    #[test]
    fn test_default_limits() {
        let limits = StoreLimits::default();
        assert_eq!(limits.frame_capacity, 200);
        assert_eq!(limits.point_capacity, 500);
        assert_eq!(limits.point_max_age, 15);
        assert_eq!(limits.vitals_retention, Duration::from_secs(300));
        assert_eq!(limits.log_capacity, 1000);
    }

    #[test]
    fn test_frame_ingestion_respects_ring_bound() {
        let store = small_store();
        for sequence in 1..=12 {
            store.apply_frame(make_frame(sequence));
        }
        let snapshot = store.snapshot();
        assert_eq!(snapshot.frames.len(), 5);
        assert_eq!(snapshot.frames.oldest().unwrap().sequence, 8);
        assert_eq!(snapshot.frames.latest().unwrap().sequence, 12);
    }

    #[test]
    fn test_pause_freezes_frames_exactly() {
        let store = small_store();
        store.apply_frame(make_frame(1));
        store.apply_frame(make_frame(2));

        store.set_paused(true);
        let frozen = store.snapshot().frames;

        for sequence in 3..=20 {
            store.apply_frame(make_frame(sequence));
        }
        assert_eq!(store.snapshot().frames, frozen);

        // Resuming and ingesting one frame appends exactly that frame.
        store.set_paused(false);
        store.apply_frame(make_frame(21));
        let snapshot = store.snapshot();
        assert_eq!(snapshot.frames.len(), 3);
        assert_eq!(snapshot.frames.latest().unwrap().sequence, 21);
    }

    #[test]
    fn test_pause_gates_points_and_vitals_but_not_logs() {
        let store = small_store();
        store.set_paused(true);

        store.apply_points(vec![make_point(1.0)]);
        store.apply_vitals(make_sample(now_unix_secs()));
        store.apply_log(make_log("still live"));

        let snapshot = store.snapshot();
        assert!(snapshot.points.is_empty());
        assert!(snapshot.vitals.is_empty());
        assert_eq!(snapshot.logs.len(), 1);
    }

    #[test]
    fn test_paused_cycles_do_not_age_points() {
        let store = small_store();
        store.apply_points(vec![make_point(1.0)]);

        store.set_paused(true);
        for _ in 0..10 {
            store.apply_points(Vec::new());
        }
        store.set_paused(false);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.points.len(), 1);
        assert_eq!(snapshot.points.iter().next().unwrap().age, 0);
    }

    #[test]
    fn test_point_aging_through_reducer() {
        let store = small_store();
        store.apply_points(vec![make_point(1.0)]);
        store.apply_points(Vec::new()); // age 1
        store.apply_points(Vec::new()); // age 2
        assert_eq!(store.snapshot().points.len(), 1);

        store.apply_points(Vec::new()); // age 3 -> evicted
        assert!(store.snapshot().points.is_empty());
    }

    #[test]
    fn test_vitals_ingestion_prunes_old_samples() {
        let store = small_store();
        let now = now_unix_secs();
        store.apply_vitals(make_sample(now - 400.0));
        store.apply_vitals(make_sample(now));

        let snapshot = store.snapshot();
        // The stale sample was already outside the window when it was
        // ingested; only the live one is retained.
        assert_eq!(snapshot.vitals.len(), 1);
        assert!((snapshot.vitals.latest().unwrap().timestamp - now).abs() < 1.0);
    }

    #[test]
    fn test_log_buffer_bound_through_reducer() {
        let store = small_store();
        for i in 0..6 {
            store.apply_log(make_log(&format!("line {i}")));
        }
        let snapshot = store.snapshot();
        assert_eq!(snapshot.logs.len(), 4);
        assert_eq!(snapshot.logs.iter().next().unwrap().message, "line 2");
    }

    #[test]
    fn test_device_status_reducer() {
        let store = small_store();
        store.apply_device_status(DeviceStatus {
            device_id: "radar-01".to_string(),
            model: "IWR6843".to_string(),
            firmware: "3.6.0".to_string(),
            connected: true,
        });
        let snapshot = store.snapshot();
        assert_eq!(snapshot.device.as_ref().unwrap().device_id, "radar-01");

        // Device status is not gated by pause.
        store.set_paused(true);
        store.apply_device_status(DeviceStatus {
            device_id: "radar-02".to_string(),
            model: String::new(),
            firmware: String::new(),
            connected: false,
        });
        assert_eq!(store.snapshot().device.unwrap().device_id, "radar-02");
    }

    #[test]
    fn test_set_time_window_and_connected() {
        let store = small_store();
        store.set_time_window(Duration::from_secs(120));
        store.set_connected(true);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.time_window, Duration::from_secs(120));
        assert!(snapshot.connected);
    }

    #[tokio::test]
    async fn test_subscribers_observe_published_snapshots() {
        let store = small_store();
        let mut rx = store.subscribe();

        store.apply_frame(make_frame(1));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().frames.len(), 1);

        let clone = store.clone();
        clone.apply_frame(make_frame(2));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().frames.len(), 2);
    }
}
