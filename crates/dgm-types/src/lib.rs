//! `dgm-types` – shared vocabulary of the dynamic graph manager.
//!
//! Every other crate in the workspace speaks in terms of the types defined
//! here: signal naming helpers, the messages carried over the topic bus, and
//! the single [`DgmError`] type returned by all fallible operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Separator between the segments of a fully qualified signal name,
/// e.g. `Device(robot)::output(vector3d)::joint_positions`.
pub const QUALIFIED_SEPARATOR: &str = "::";

/// Return the short name of a qualified signal name: the segment after the
/// last `::`.  A name without separator is returned unchanged.
pub fn short_name(qualified: &str) -> &str {
    qualified
        .rsplit(QUALIFIED_SEPARATOR)
        .next()
        .unwrap_or(qualified)
}

/// Build the dotted `<entity>.<signal>` identifier used as key in periodic
/// call lists and tracer registrations.
pub fn recompute_id(entity: &str, signal: &str) -> String {
    format!("{entity}.{signal}")
}

/// A value carried on a transport topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TopicMessage {
    Double(f64),
    Vector(Vec<f64>),
    Vector3([f64; 3]),
}

impl TopicMessage {
    /// Flatten the message back into the signal representation.
    pub fn to_values(&self) -> Vec<f64> {
        match self {
            TopicMessage::Double(v) => vec![*v],
            TopicMessage::Vector(v) => v.clone(),
            TopicMessage::Vector3(v) => v.to_vec(),
        }
    }
}

/// Unified event wrapper for the topic bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "dgm-middleware::ros_publish"
    pub source: String,
    pub payload: EventPayload,
}

/// Variants of data that can be routed over the topic bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// One sample of a graph signal published on a transport topic.
    SignalSample {
        topic: String,
        signal: String,
        /// Graph time index at which the sample was taken.
        time: i64,
        message: TopicMessage,
    },
}

/// Error type shared by the device, tracer, transport and robot layers.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DgmError {
    #[error("Unknown signal: {0}")]
    UnknownSignal(String),

    #[error("Parameter not found: {0}")]
    ParamNotFound(String),

    #[error("Tracer {tracer} cannot {operation} while {state}")]
    TracerState {
        tracer: String,
        operation: String,
        state: String,
    },

    #[error("Unknown topic type: {0}")]
    UnknownTopicType(String),

    #[error("Cannot convert {signal} to {expected}: got {len} value(s)")]
    Conversion {
        signal: String,
        expected: String,
        len: usize,
    },

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Not found in periodic call list: {0}")]
    NotScheduled(String),

    #[error("Signal {signal} expects {expected} value(s), got {got}")]
    SizeMismatch {
        signal: String,
        expected: usize,
        got: usize,
    },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Channel error: {0}")]
    Channel(String),
}

impl From<std::io::Error> for DgmError {
    fn from(e: std::io::Error) -> Self {
        DgmError::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_takes_last_segment() {
        assert_eq!(
            short_name("Device(robot)::output(vector3d)::joint_positions"),
            "joint_positions"
        );
        assert_eq!(short_name("plain"), "plain");
    }

    #[test]
    fn recompute_id_is_dotted() {
        assert_eq!(recompute_id("device", "joint_positions"), "device.joint_positions");
    }

    #[test]
    fn topic_message_flattens() {
        assert_eq!(TopicMessage::Double(2.0).to_values(), vec![2.0]);
        assert_eq!(
            TopicMessage::Vector3([1.0, 2.0, 3.0]).to_values(),
            vec![1.0, 2.0, 3.0]
        );
    }

    #[test]
    fn event_serializes_with_tagged_message() {
        let event = Event {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: "dgm-middleware::ros_publish".to_string(),
            payload: EventPayload::SignalSample {
                topic: "/dg__device__joint_positions".to_string(),
                signal: "device__joint_positions".to_string(),
                time: 3,
                message: TopicMessage::Vector(vec![0.5, 1.5]),
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"vector\""));
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
    }

    #[test]
    fn dgm_error_display() {
        let err = DgmError::TracerState {
            tracer: "trace".to_string(),
            operation: "start".to_string(),
            state: "unopened".to_string(),
        };
        assert_eq!(err.to_string(), "Tracer trace cannot start while unopened");

        let io: DgmError = std::io::Error::other("disk full").into();
        assert!(io.to_string().contains("disk full"));
    }
}
