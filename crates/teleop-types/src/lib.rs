//! `teleop-types` – shared message vocabulary.
//!
//! Every payload that crosses the pub/sub bus is one of the [`Message`]
//! variants.  The geometry types mirror the field layout of the usual
//! robotics wire formats so that a transport adapter can translate them
//! one-to-one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Standard metadata carried by stamped messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub seq: u32,
    pub stamp: DateTime<Utc>,
    /// e.g. "MTMR"
    pub frame_id: String,
}

impl Header {
    /// Header stamped with the current time.
    pub fn now(seq: u32, frame_id: impl Into<String>) -> Self {
        Self {
            seq,
            stamp: Utc::now(),
            frame_id: frame_id.into(),
        }
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::now(0, "")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

/// Rotation quaternion in wire order (x, y, z, w).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    pub fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

/// Rigid transform: rotate by `rotation`, then translate by `translation`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: Vector3,
    pub rotation: Quaternion,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformStamped {
    pub header: Header,
    pub child_frame_id: String,
    pub transform: Transform,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Twist {
    pub linear: Vector3,
    pub angular: Vector3,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TwistStamped {
    pub header: Header,
    pub twist: Twist,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Wrench {
    pub force: Vector3,
    pub torque: Vector3,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WrenchStamped {
    pub header: Header,
    pub wrench: Wrench,
}

/// Joint-space state.  The vectors are parallel; any of them may be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JointState {
    pub header: Header,
    pub name: Vec<String>,
    pub position: Vec<f64>,
    pub velocity: Vec<f64>,
    pub effort: Vec<f64>,
}

/// Variants of data that can be routed over the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "msg")]
pub enum Message {
    TransformStamped(TransformStamped),
    TwistStamped(TwistStamped),
    WrenchStamped(WrenchStamped),
    JointState(JointState),
    Empty,
    Text(String),
    Flag(bool),
}

impl Message {
    /// Stable type name, used in logs and error reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::TransformStamped(_) => "geometry_msgs/TransformStamped",
            Message::TwistStamped(_) => "geometry_msgs/TwistStamped",
            Message::WrenchStamped(_) => "geometry_msgs/WrenchStamped",
            Message::JointState(_) => "sensor_msgs/JointState",
            Message::Empty => "std_msgs/Empty",
            Message::Text(_) => "std_msgs/String",
            Message::Flag(_) => "std_msgs/Bool",
        }
    }
}

/// Envelope for everything published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Topic the event was published on, e.g. "MTMR/measured_cp".
    pub topic: String,
    /// e.g. "teleop-proxy::MTMR"
    pub source: String,
    pub payload: Message,
}

impl Event {
    pub fn new(topic: impl Into<String>, source: impl Into<String>, payload: Message) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            topic: topic.into(),
            source: source.into(),
            payload,
        }
    }
}

/// Error type shared by every crate in the workspace.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TeleopError {
    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("Unexpected message on {topic}: expected {expected}, found {found}")]
    UnexpectedMessage {
        topic: String,
        expected: String,
        found: String,
    },

    #[error("Invalid Argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quaternion_default_is_identity() {
        let q = Quaternion::default();
        assert_eq!(q, Quaternion::new(0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn message_kind_names() {
        assert_eq!(Message::Empty.kind(), "std_msgs/Empty");
        assert_eq!(Message::Flag(true).kind(), "std_msgs/Bool");
        assert_eq!(Message::Text("x".into()).kind(), "std_msgs/String");
        assert_eq!(
            Message::WrenchStamped(WrenchStamped::default()).kind(),
            "geometry_msgs/WrenchStamped"
        );
    }

    #[test]
    fn message_serializes_with_type_tag() {
        let msg = Message::Text("DVRK_EFFORT_CARTESIAN".to_string());
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"Text\""));
        assert!(json.contains("DVRK_EFFORT_CARTESIAN"));
    }

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            "MTMR/body/servo_cf",
            "test",
            Message::WrenchStamped(WrenchStamped {
                header: Header::now(3, "MTMR"),
                wrench: Wrench {
                    force: Vector3::new(1.0, -2.0, 0.5),
                    torque: Vector3::zero(),
                },
            }),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert_eq!(event.topic, back.topic);
        assert_eq!(event.payload, back.payload);
    }

    #[test]
    fn teleop_error_display() {
        let err = TeleopError::UnexpectedMessage {
            topic: "MTMR/body/servo_cf".to_string(),
            expected: "geometry_msgs/WrenchStamped".to_string(),
            found: "std_msgs/Empty".to_string(),
        };
        let s = err.to_string();
        assert!(s.contains("MTMR/body/servo_cf"));
        assert!(s.contains("std_msgs/Empty"));
    }
}
