//! Telemetry payload types.
//!
//! This module defines the typed payloads carried by streaming envelopes:
//! radar acquisition frames, detected points, derived vital-sign samples,
//! device status, and sensor log lines. Each type deserializes fail-soft
//! from an envelope payload; a payload that does not match its declared
//! type is simply not a value of that type.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known envelope type tags.
pub mod kinds {
    /// A radar acquisition frame.
    pub const FRAME: &str = "frame";
    /// A detected-point batch for one update cycle.
    pub const POINTS: &str = "points";
    /// A derived vital-signs sample.
    pub const VITALS: &str = "vitals";
    /// A device status update.
    pub const STATUS: &str = "status";
    /// A sensor log line.
    pub const LOG: &str = "log";
}

/// A single detected point from the radar point cloud.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedPoint {
    /// X coordinate in meters.
    pub x: f32,
    /// Y coordinate in meters.
    pub y: f32,
    /// Z coordinate in meters.
    pub z: f32,
    /// Radial velocity in m/s.
    pub velocity: f32,
    /// Signal-to-noise ratio in dB.
    pub snr: f32,
    /// Tracker-assigned identity, if the firmware runs a tracker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<u32>,
}

/// A 2-D magnitude map in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heatmap {
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
    /// Row-major cell values; length is `rows * cols`.
    pub values: Vec<f32>,
}

impl Heatmap {
    /// Whether the value vector matches the declared dimensions.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.values.len() == self.rows * self.cols
    }

    /// The value at `(row, col)`, or `None` when out of bounds.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.values.get(row * self.cols + col).copied()
    }
}

/// One radar acquisition cycle.
///
/// Frames are immutable once ingested; the frame ring owns them
/// exclusively after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadarFrame {
    /// Monotonically increasing sequence number.
    pub sequence: u64,
    /// Capture time in unix seconds (fractional).
    pub timestamp: f64,
    /// 1-D magnitude vector (range profile).
    pub magnitudes: Vec<f32>,
    /// Optional 2-D magnitude map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heatmap: Option<Heatmap>,
    /// Detected points for this cycle.
    #[serde(default)]
    pub points: Vec<DetectedPoint>,
    /// Optional scalar phase value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<f32>,
}

impl RadarFrame {
    /// Deserialize a frame from an envelope payload.
    ///
    /// Returns `None` if the payload does not have the frame shape.
    #[must_use]
    pub fn from_payload(payload: &Value) -> Option<Self> {
        serde_json::from_value(payload.clone()).ok()
    }

    /// Number of detected points in this frame.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }
}

/// A detected-point batch for one point-cloud update cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointBatch {
    /// Capture time in unix seconds (fractional).
    pub timestamp: f64,
    /// Points observed this cycle.
    #[serde(default)]
    pub points: Vec<DetectedPoint>,
}

impl PointBatch {
    /// Deserialize a point batch from an envelope payload.
    ///
    /// Returns `None` if the payload does not have the batch shape.
    #[must_use]
    pub fn from_payload(payload: &Value) -> Option<Self> {
        serde_json::from_value(payload.clone()).ok()
    }
}

/// A derived vital-signs sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalsSample {
    /// Heart rate in beats per minute.
    pub heart_rate: f64,
    /// Respiration rate in breaths per minute.
    pub respiration_rate: f64,
    /// Confidence in the heart-rate estimate, 0.0 to 1.0.
    pub heart_confidence: f64,
    /// Confidence in the respiration-rate estimate, 0.0 to 1.0.
    pub respiration_confidence: f64,
    /// Phase-unwrap stability score, 0.0 to 1.0.
    pub phase_stability: f64,
    /// Overall signal quality, 0.0 to 1.0.
    pub quality: f64,
    /// Which extraction pipeline produced this sample.
    pub source: String,
    /// Capture time in unix seconds (fractional).
    pub timestamp: f64,
}

impl VitalsSample {
    /// Deserialize a vitals sample from an envelope payload.
    ///
    /// Returns `None` if the payload does not have the sample shape.
    #[must_use]
    pub fn from_payload(payload: &Value) -> Option<Self> {
        serde_json::from_value(payload.clone()).ok()
    }
}

/// A device status update.
///
/// Status reaches the store through one reducer path whether it arrives
/// streamed or is reconciled from a command/query API response by the
/// caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    /// Stable device identifier.
    pub device_id: String,
    /// Device model name.
    #[serde(default)]
    pub model: String,
    /// Firmware version string.
    #[serde(default)]
    pub firmware: String,
    /// Whether the device is connected to its acquisition host.
    pub connected: bool,
}

impl DeviceStatus {
    /// Deserialize a device status from an envelope payload.
    ///
    /// Returns `None` if the payload does not have the status shape.
    #[must_use]
    pub fn from_payload(payload: &Value) -> Option<Self> {
        serde_json::from_value(payload.clone()).ok()
    }
}

/// Severity of a sensor log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSeverity {
    /// Diagnostic detail.
    Debug,
    /// Normal operational message.
    Info,
    /// Something unexpected but recoverable.
    Warning,
    /// A failure on the sensor side.
    Error,
}

impl std::fmt::Display for LogSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A sensor log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Severity of the line.
    pub severity: LogSeverity,
    /// Which subsystem emitted the line.
    #[serde(default)]
    pub source: String,
    /// The log message.
    pub message: String,
    /// Capture time in unix seconds (fractional).
    pub timestamp: f64,
}

impl LogEntry {
    /// Deserialize a log entry from an envelope payload.
    ///
    /// Returns `None` if the payload does not have the entry shape.
    #[must_use]
    pub fn from_payload(payload: &Value) -> Option<Self> {
        serde_json::from_value(payload.clone()).ok()
    }
}
