//! Bounded collections backing the live state snapshot.
//!
//! Sustained high-frequency input must never grow memory without bound, so
//! every aggregated collection here is bounded by count, by age, or by
//! wall-clock span. Eviction under capacity pressure is the intended
//! steady-state behavior, not an error condition.

use std::collections::VecDeque;
use std::time::Duration;

use crate::telemetry::{DetectedPoint, LogEntry, RadarFrame, VitalsSample};

/// Fixed-capacity FIFO of recent radar frames.
///
/// Pushing beyond capacity silently evicts the oldest frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRing {
    frames: VecDeque<RadarFrame>,
    capacity: usize,
}

impl FrameRing {
    /// Create a new ring with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a frame, evicting the oldest if the ring is full.
    pub fn push(&mut self, frame: RadarFrame) {
        if self.frames.len() >= self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    /// The most recently ingested frame, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&RadarFrame> {
        self.frames.back()
    }

    /// The oldest retained frame, if any.
    #[must_use]
    pub fn oldest(&self) -> Option<&RadarFrame> {
        self.frames.front()
    }

    /// Iterate over retained frames, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &RadarFrame> {
        self.frames.iter()
    }

    /// Number of retained frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the ring is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Maximum number of retained frames.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remove all retained frames.
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

/// A detected point carrying a decay counter.
///
/// The age counts update cycles since the point was ingested; it never
/// decreases. A re-detected physical target arrives as a fresh point at
/// age 0 in a later batch.
#[derive(Debug, Clone, PartialEq)]
pub struct AgedPoint {
    /// The detection itself.
    pub point: DetectedPoint,
    /// Update cycles since ingestion.
    pub age: u32,
}

/// Age-based point-cloud accumulator.
///
/// Models decay of a sparse, noisy detector: on every update cycle each
/// retained point ages by one, points reaching the age ceiling are
/// evicted, the new batch enters at age 0, and the set is truncated to
/// the newest `capacity` points if still over capacity.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    points: VecDeque<AgedPoint>,
    capacity: usize,
    max_age: u32,
}

impl PointCloud {
    /// Create a new accumulator with the given capacity and age ceiling.
    #[must_use]
    pub fn new(capacity: usize, max_age: u32) -> Self {
        Self {
            points: VecDeque::new(),
            capacity: capacity.max(1),
            max_age: max_age.max(1),
        }
    }

    /// Apply one update cycle.
    ///
    /// Ages every retained point by 1, evicts points whose age reaches the
    /// ceiling, appends the new batch at age 0, then truncates to the
    /// newest `capacity` points.
    pub fn ingest(&mut self, batch: impl IntoIterator<Item = DetectedPoint>) {
        for aged in &mut self.points {
            aged.age = aged.age.saturating_add(1);
        }
        let ceiling = self.max_age;
        self.points.retain(|aged| aged.age < ceiling);

        for point in batch {
            self.points.push_back(AgedPoint { point, age: 0 });
        }

        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    /// Iterate over retained points, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &AgedPoint> {
        self.points.iter()
    }

    /// Number of retained points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the accumulator is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Maximum number of retained points.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Age at which a point is evicted.
    #[must_use]
    pub fn max_age(&self) -> u32 {
        self.max_age
    }

    /// Remove all retained points.
    pub fn clear(&mut self) {
        self.points.clear();
    }
}

/// Time-windowed history of derived vital-sign samples.
///
/// Bounded by wall-clock span rather than by count, because the sample
/// rate is not constant. Pruning happens on every push, not on a periodic
/// sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct VitalsHistory {
    samples: Vec<VitalsSample>,
    retention: Duration,
}

impl VitalsHistory {
    /// Create a new history with the given retention window.
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            samples: Vec::new(),
            retention,
        }
    }

    /// Append a sample and prune everything older than the window.
    ///
    /// `now_secs` is the current wall-clock time in unix seconds; samples
    /// with `timestamp <= now_secs - retention` are dropped.
    pub fn push(&mut self, sample: VitalsSample, now_secs: f64) {
        self.samples.push(sample);
        let cutoff = now_secs - self.retention.as_secs_f64();
        self.samples.retain(|s| s.timestamp > cutoff);
    }

    /// The most recent sample, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&VitalsSample> {
        self.samples.last()
    }

    /// Retained samples, oldest first.
    #[must_use]
    pub fn samples(&self) -> &[VitalsSample] {
        &self.samples
    }

    /// Number of retained samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The retention window.
    #[must_use]
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Remove all retained samples.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Capacity-bounded FIFO of sensor log lines.
#[derive(Debug, Clone, PartialEq)]
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl LogBuffer {
    /// Create a new buffer with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest if the buffer is full.
    pub fn push(&mut self, entry: LogEntry) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Iterate over retained entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of retained entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
