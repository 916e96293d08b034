//! `teleop-proxy` – republishes a teleoperation input device onto the bus.
//!
//! A [`ProxyDevice`] stands in for one master arm.  Whatever drives it (a
//! haptic driver, a joystick, the interactive shell) pushes raw device
//! poses, twists and gripper openings in; the proxy remaps them into the
//! robot control frame and publishes them.  In the other direction it
//! listens for commanded wrenches and keeps the latest force for the driver
//! to render.
//!
//! # Modules
//!
//! - [`arm`] – [`ArmKind`]: known arm presets and their base/tip frames.
//! - [`topics`] – [`ArmTopics`]: topic names derived from the arm name.
//! - [`gripper`] – [`GripperMapping`]: normalized opening to joint angle.
//! - [`proxy`] – [`ProxyDevice`] itself.
//! - [`sweep`] – [`sweep_orientation`]: scripted roll/pitch/yaw sweep for
//!   checking the frame remapping against a live consumer.

pub mod arm;
pub mod gripper;
pub mod proxy;
pub mod sweep;
pub mod topics;

pub use arm::ArmKind;
pub use gripper::GripperMapping;
pub use proxy::{ProxyDevice, ROBOT_STATE};
pub use sweep::{sweep_orientation, Axis, SweepConfig};
pub use topics::ArmTopics;
