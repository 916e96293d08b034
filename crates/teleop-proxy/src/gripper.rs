//! Gripper opening to joint angle.

/// Linear map from a normalized gripper opening to a joint angle in radians.
///
/// `0.0` maps to `min_angle` and `1.0` to `max_angle`.  Inputs outside
/// `[0, 1]` extrapolate along the same line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GripperMapping {
    pub min_angle: f64,
    pub max_angle: f64,
}

impl GripperMapping {
    pub const DEFAULT_MIN_ANGLE: f64 = -3.16;
    pub const DEFAULT_MAX_ANGLE: f64 = 1.2;

    pub fn new(min_angle: f64, max_angle: f64) -> Self {
        Self { min_angle, max_angle }
    }

    pub fn range(&self) -> f64 {
        self.max_angle - self.min_angle
    }

    pub fn angle_for(&self, normalized: f64) -> f64 {
        self.min_angle + self.range() * normalized
    }
}

impl Default for GripperMapping {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MIN_ANGLE, Self::DEFAULT_MAX_ANGLE)
    }
}
