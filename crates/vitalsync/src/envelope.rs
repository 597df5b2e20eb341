//! Streaming message envelope.
//!
//! Every inbound streaming message is a JSON object carrying a `type` tag,
//! a capture timestamp, and a type-specific payload. The envelope is the
//! only part of the wire shape this layer interprets; payload shapes are
//! owned by the handlers bound to each type tag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The typed, timestamped wrapper around every inbound streaming message.
///
/// Wire shape: `{ "type": string, "timestamp": unix seconds (fractional),
/// "payload": <type-specific JSON> }`. Every envelope has exactly one type
/// tag; the payload is opaque at this level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The declared message type used for dispatch.
    #[serde(rename = "type")]
    pub kind: String,

    /// Capture time in unix seconds (fractional).
    pub timestamp: f64,

    /// Type-specific payload; not validated here.
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Create a new envelope.
    #[must_use]
    pub fn new(kind: impl Into<String>, timestamp: f64, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            timestamp,
            payload,
        }
    }

    /// Parse an inbound text frame into an envelope.
    ///
    /// This is fail-soft by contract: non-JSON input, or JSON without a
    /// usable string `type`, yields `None`. A missing timestamp defaults to
    /// zero and a missing payload to JSON null; neither makes the frame
    /// malformed.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        let kind = value.get("type")?.as_str()?;
        if kind.is_empty() {
            return None;
        }

        let timestamp = value
            .get("timestamp")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let payload = value.get("payload").cloned().unwrap_or(Value::Null);

        Some(Self {
            kind: kind.to_string(),
            timestamp,
            payload,
        })
    }

    /// The capture time as a UTC datetime, if the timestamp is representable.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn capture_time(&self) -> Option<DateTime<Utc>> {
        if !self.timestamp.is_finite() {
            return None;
        }
        let secs = self.timestamp.trunc() as i64;
        let nanos = (self.timestamp.fract() * 1_000_000_000.0) as u32;
        DateTime::from_timestamp(secs, nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_well_formed() {
        let env = Envelope::parse(
            r#"{"type":"frame","timestamp":1700000000.25,"payload":{"sequence":7}}"#,
        )
        .unwrap();
        assert_eq!(env.kind, "frame");
        assert!((env.timestamp - 1_700_000_000.25).abs() < f64::EPSILON);
        assert_eq!(env.payload["sequence"], 7);
    }

    #[test]
    fn test_parse_non_json() {
        assert!(Envelope::parse("not json at all").is_none());
        assert!(Envelope::parse("").is_none());
        assert!(Envelope::parse("\x00\x01\x02").is_none());
    }

    #[test]
    fn test_parse_missing_type() {
        assert!(Envelope::parse(r#"{"timestamp":1.0,"payload":{}}"#).is_none());
    }

    #[test]
    fn test_parse_non_string_type() {
        assert!(Envelope::parse(r#"{"type":42,"timestamp":1.0}"#).is_none());
        assert!(Envelope::parse(r#"{"type":null}"#).is_none());
    }

    #[test]
    fn test_parse_empty_type() {
        assert!(Envelope::parse(r#"{"type":""}"#).is_none());
    }

    #[test]
    fn test_parse_missing_timestamp_defaults_to_zero() {
        let env = Envelope::parse(r#"{"type":"log"}"#).unwrap();
        assert!((env.timestamp - 0.0).abs() < f64::EPSILON);
        assert_eq!(env.payload, Value::Null);
    }

    #[test]
    fn test_parse_unknown_type_is_accepted() {
        // Unknown tags are routed to wildcard subscribers, not rejected here.
        let env = Envelope::parse(r#"{"type":"mystery","timestamp":2.5}"#).unwrap();
        assert_eq!(env.kind, "mystery");
    }

    #[test]
    fn test_capture_time() {
        let env = Envelope::new("frame", 1_700_000_000.5, Value::Null);
        let time = env.capture_time().unwrap();
        assert_eq!(time.timestamp(), 1_700_000_000);
        assert_eq!(time.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_capture_time_non_finite() {
        let env = Envelope::new("frame", f64::NAN, Value::Null);
        assert!(env.capture_time().is_none());
    }

    #[test]
    fn test_serialize_uses_wire_tag() {
        let env = Envelope::new("vitals", 3.0, json!({"heart_rate": 62.0}));
        let text = serde_json::to_string(&env).unwrap();
        assert!(text.contains(r#""type":"vitals""#));

        let back: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(back, env);
    }
}
