//! Arm presets.

use std::fmt;

use teleop_frames::Frame;
use tracing::warn;

/// Yaw of the MTM base frame relative to the robot control frame.
pub const MTM_BASE_YAW: f64 = 1.57079;

/// Pitch of the MTM tip frame relative to the device gimbal.
pub const MTM_TIP_PITCH: f64 = -1.57079;

/// Which physical arm a proxy stands in for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArmKind {
    /// Right master tool manipulator.
    Mtmr,
    /// Left master tool manipulator.
    Mtml,
    /// Any other name; gets identity base and tip frames.
    Unknown(String),
}

impl ArmKind {
    /// Classify an arm by name.  Matching is exact ("MTMR", "MTML").
    pub fn parse(name: &str) -> Self {
        match name {
            "MTMR" => ArmKind::Mtmr,
            "MTML" => ArmKind::Mtml,
            other => ArmKind::Unknown(other.to_string()),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ArmKind::Unknown(_))
    }

    /// Preset `(base, tip)` frames.
    ///
    /// Unknown arms get identity frames and a warning, so the raw device
    /// pose is published unchanged.
    pub fn default_frames(&self) -> (Frame, Frame) {
        match self {
            ArmKind::Mtmr | ArmKind::Mtml => (
                Frame::from_rpy(0.0, 0.0, MTM_BASE_YAW),
                Frame::from_rpy(0.0, MTM_TIP_PITCH, 0.0),
            ),
            ArmKind::Unknown(name) => {
                warn!(arm = %name, "arm type not understood, should be MTMR or MTML");
                (Frame::identity(), Frame::identity())
            }
        }
    }
}

impl fmt::Display for ArmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArmKind::Mtmr => write!(f, "MTMR"),
            ArmKind::Mtml => write!(f, "MTML"),
            ArmKind::Unknown(name) => write!(f, "{name}"),
        }
    }
}
