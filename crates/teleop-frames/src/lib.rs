//! `teleop-frames` – rigid-body frames for device-to-robot remapping.
//!
//! A [`Frame`] is a position plus an orientation.  Frames compose with `*`
//! exactly like homogeneous transforms: if `a` maps frame B into frame A and
//! `b` maps C into B, then `a * b` maps C into A.
//!
//! Orientations are built either from roll/pitch/yaw (fixed X-Y-Z axes, so
//! `R = Rz(yaw) * Ry(pitch) * Rx(roll)`) or from a quaternion.
//!
//! # Example
//!
//! ```rust
//! use std::f64::consts::FRAC_PI_2;
//! use teleop_frames::Frame;
//!
//! let base = Frame::from_rpy(0.0, 0.0, FRAC_PI_2);
//! let mut device = Frame::identity();
//! device.set_position(1.0, 0.0, 0.0);
//!
//! // Express the device position in the base's parent frame.
//! let [x, y, _] = (base.inverse() * device).position();
//! assert!(x.abs() < 1e-9);
//! assert!((y + 1.0).abs() < 1e-9);
//! ```

use std::fmt;
use std::ops::Mul;

use nalgebra::{Isometry3, Point3, Quaternion, Translation3, UnitQuaternion, Vector3};
use teleop_types::{self as types, TeleopError};

/// Quaternions with a norm below this are rejected as degenerate.
const MIN_QUATERNION_NORM: f64 = 1e-9;

/// A rigid-body frame: rotation followed by translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    iso: Isometry3<f64>,
}

impl Frame {
    /// The identity frame: origin position, no rotation.
    pub fn identity() -> Self {
        Self {
            iso: Isometry3::identity(),
        }
    }

    pub fn new(position: [f64; 3], rotation: UnitQuaternion<f64>) -> Self {
        Self {
            iso: Isometry3::from_parts(Translation3::new(position[0], position[1], position[2]), rotation),
        }
    }

    /// Pure rotation from roll, pitch and yaw about the fixed X, Y, Z axes.
    pub fn from_rpy(roll: f64, pitch: f64, yaw: f64) -> Self {
        Self::new([0.0; 3], UnitQuaternion::from_euler_angles(roll, pitch, yaw))
    }

    /// Pure rotation from a quaternion given in (x, y, z, w) order.
    ///
    /// The quaternion is normalized.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::InvalidArgument`] when the quaternion has (near)
    /// zero norm or contains non-finite components.
    pub fn from_quaternion(x: f64, y: f64, z: f64, w: f64) -> Result<Self, TeleopError> {
        Ok(Self::new([0.0; 3], unit_quaternion(x, y, z, w)?))
    }

    /// Position as `[x, y, z]`.
    pub fn position(&self) -> [f64; 3] {
        let t = &self.iso.translation.vector;
        [t.x, t.y, t.z]
    }

    pub fn rotation(&self) -> UnitQuaternion<f64> {
        self.iso.rotation
    }

    /// Orientation as `(roll, pitch, yaw)`.
    pub fn rpy(&self) -> (f64, f64, f64) {
        self.iso.rotation.euler_angles()
    }

    /// Orientation as a quaternion in `[x, y, z, w]` order, with `w >= 0`.
    pub fn quaternion_xyzw(&self) -> [f64; 4] {
        let q = self.iso.rotation;
        if q.w < 0.0 {
            [-q.i, -q.j, -q.k, -q.w]
        } else {
            [q.i, q.j, q.k, q.w]
        }
    }

    pub fn set_position(&mut self, x: f64, y: f64, z: f64) {
        self.iso.translation = Translation3::new(x, y, z);
    }

    pub fn set_rotation(&mut self, rotation: UnitQuaternion<f64>) {
        self.iso.rotation = rotation;
    }

    pub fn set_rotation_rpy(&mut self, roll: f64, pitch: f64, yaw: f64) {
        self.iso.rotation = UnitQuaternion::from_euler_angles(roll, pitch, yaw);
    }

    /// See [`Frame::from_quaternion`] for the error conditions.
    pub fn set_rotation_quaternion(&mut self, x: f64, y: f64, z: f64, w: f64) -> Result<(), TeleopError> {
        self.iso.rotation = unit_quaternion(x, y, z, w)?;
        Ok(())
    }

    pub fn inverse(&self) -> Self {
        Self {
            iso: self.iso.inverse(),
        }
    }

    /// Map a point expressed in this frame into the parent frame.
    pub fn transform_point(&self, p: [f64; 3]) -> [f64; 3] {
        let out = self.iso.transform_point(&Point3::new(p[0], p[1], p[2]));
        [out.x, out.y, out.z]
    }

    /// Rotate a free vector (velocity, force); translation does not apply.
    pub fn rotate_vector(&self, v: [f64; 3]) -> [f64; 3] {
        let out = self.iso.transform_vector(&Vector3::new(v[0], v[1], v[2]));
        [out.x, out.y, out.z]
    }

    /// Translation distance and rotation angle to `other` are both within
    /// `tolerance`.
    pub fn approx_eq(&self, other: &Frame, tolerance: f64) -> bool {
        let dp = (self.iso.translation.vector - other.iso.translation.vector).norm();
        let dr = self.iso.rotation.angle_to(&other.iso.rotation);
        dp <= tolerance && dr <= tolerance
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mul for Frame {
    type Output = Frame;

    fn mul(self, rhs: Frame) -> Frame {
        Frame {
            iso: self.iso * rhs.iso,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [x, y, z] = self.position();
        let (roll, pitch, yaw) = self.rpy();
        let [qx, qy, qz, qw] = self.quaternion_xyzw();
        write!(
            f,
            "position: {x:.4}, {y:.4}, {z:.4} | rpy: {roll:.4}, {pitch:.4}, {yaw:.4} | xyzw: {qx:.4}, {qy:.4}, {qz:.4}, {qw:.4}"
        )
    }
}

impl From<&Frame> for types::Transform {
    fn from(frame: &Frame) -> Self {
        let [x, y, z] = frame.position();
        let [qx, qy, qz, qw] = frame.quaternion_xyzw();
        types::Transform {
            translation: types::Vector3::new(x, y, z),
            rotation: types::Quaternion::new(qx, qy, qz, qw),
        }
    }
}

impl TryFrom<&types::Transform> for Frame {
    type Error = TeleopError;

    fn try_from(t: &types::Transform) -> Result<Self, Self::Error> {
        let r = &t.rotation;
        let rotation = unit_quaternion(r.x, r.y, r.z, r.w)?;
        Ok(Frame::new([t.translation.x, t.translation.y, t.translation.z], rotation))
    }
}

fn unit_quaternion(x: f64, y: f64, z: f64, w: f64) -> Result<UnitQuaternion<f64>, TeleopError> {
    let q = Quaternion::new(w, x, y, z);
    let norm = q.norm();
    if !norm.is_finite() || norm < MIN_QUATERNION_NORM {
        return Err(TeleopError::InvalidArgument(format!(
            "degenerate quaternion ({x}, {y}, {z}, {w})"
        )));
    }
    Ok(UnitQuaternion::from_quaternion(q))
}
