//! Scripted orientation sweep.
//!
//! Drives a proxy through roll, then pitch, then yaw, one axis at a time,
//! so the remapped orientation can be checked visually in whatever consumes
//! `measured_cp`.

use std::time::Duration;

use teleop_types::TeleopError;
use tracing::info;

use crate::proxy::ProxyDevice;

/// Rotation axis swept by [`sweep_orientation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Roll,
    Pitch,
    Yaw,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::Roll, Axis::Pitch, Axis::Yaw];

    /// `(roll, pitch, yaw)` with only this axis set to `angle`.
    pub fn rpy(self, angle: f64) -> (f64, f64, f64) {
        match self {
            Axis::Roll => (angle, 0.0, 0.0),
            Axis::Pitch => (0.0, angle, 0.0),
            Axis::Yaw => (0.0, 0.0, angle),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepConfig {
    pub min: f64,
    pub max: f64,
    pub steps: u32,
    /// Pause after every step.
    pub interval: Duration,
}

impl SweepConfig {
    /// Angles visited per axis: `min + span * i / steps` for `i` in
    /// `0..steps`.  `max` itself is never reached.
    pub fn angles(&self) -> impl Iterator<Item = f64> + '_ {
        let span = self.max - self.min;
        (0..self.steps).map(move |i| self.min + span * f64::from(i) / f64::from(self.steps))
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            min: -1.57,
            max: 1.57,
            steps: 100,
            interval: Duration::from_millis(100),
        }
    }
}

/// Sweep each axis in turn.  Cancel by dropping the future.
pub async fn sweep_orientation(proxy: &ProxyDevice, config: &SweepConfig) -> Result<(), TeleopError> {
    for axis in Axis::ALL {
        info!(arm = %proxy.arm(), ?axis, "sweeping");
        for angle in config.angles() {
            let (roll, pitch, yaw) = axis.rpy(angle);
            proxy.set_orientation(roll, pitch, yaw)?;
            info!(?axis, angle, "angle");
            tokio::time::sleep(config.interval).await;
        }
    }
    Ok(())
}
