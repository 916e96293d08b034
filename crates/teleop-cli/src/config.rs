//! Configuration – reads/writes `~/.teleop/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use teleop_middleware::bus::DEFAULT_CAPACITY;
use teleop_proxy::{GripperMapping, SweepConfig};
use teleop_types::TeleopError;
use tracing::warn;

/// Persisted proxy configuration stored in `~/.teleop/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Arms to proxy, e.g. `["MTMR", "MTML"]`.
    #[serde(default = "default_arms")]
    pub arms: Vec<String>,

    /// Per-topic buffer of the in-process bus.
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,

    /// Status heartbeat rate.  `0` disables the heartbeat.
    #[serde(default = "default_status_rate_hz")]
    pub status_rate_hz: f64,

    #[serde(default = "default_gripper_min_angle")]
    pub gripper_min_angle: f64,

    #[serde(default = "default_gripper_max_angle")]
    pub gripper_max_angle: f64,

    #[serde(default = "default_sweep_steps")]
    pub sweep_steps: u32,

    #[serde(default = "default_sweep_min")]
    pub sweep_min: f64,

    #[serde(default = "default_sweep_max")]
    pub sweep_max: f64,

    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

fn default_arms() -> Vec<String> {
    vec!["MTMR".to_string()]
}
fn default_bus_capacity() -> usize {
    DEFAULT_CAPACITY
}
fn default_status_rate_hz() -> f64 {
    10.0
}
fn default_gripper_min_angle() -> f64 {
    GripperMapping::DEFAULT_MIN_ANGLE
}
fn default_gripper_max_angle() -> f64 {
    GripperMapping::DEFAULT_MAX_ANGLE
}
fn default_sweep_steps() -> u32 {
    100
}
fn default_sweep_min() -> f64 {
    -1.57
}
fn default_sweep_max() -> f64 {
    1.57
}
fn default_sweep_interval_ms() -> u64 {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            arms: default_arms(),
            bus_capacity: default_bus_capacity(),
            status_rate_hz: default_status_rate_hz(),
            gripper_min_angle: default_gripper_min_angle(),
            gripper_max_angle: default_gripper_max_angle(),
            sweep_steps: default_sweep_steps(),
            sweep_min: default_sweep_min(),
            sweep_max: default_sweep_max(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl Config {
    pub fn gripper_mapping(&self) -> GripperMapping {
        GripperMapping::new(self.gripper_min_angle, self.gripper_max_angle)
    }

    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            min: self.sweep_min,
            max: self.sweep_max,
            steps: self.sweep_steps,
            interval: Duration::from_millis(self.sweep_interval_ms),
        }
    }

    /// Heartbeat period, `None` when disabled or when the rate gives no
    /// representable non-zero period.
    pub fn status_period(&self) -> Option<Duration> {
        if !(self.status_rate_hz.is_finite() && self.status_rate_hz > 0.0) {
            return None;
        }
        match Duration::try_from_secs_f64(1.0 / self.status_rate_hz) {
            Ok(period) if !period.is_zero() => Some(period),
            _ => {
                warn!(rate_hz = self.status_rate_hz, "status rate out of range, heartbeat disabled");
                None
            }
        }
    }
}

/// Return the path to `~/.teleop/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".teleop").join("config.toml")
}

/// Load the config from disk and apply environment overrides.  Returns
/// `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, TeleopError> {
    Ok(load_from(&config_path())?.map(|mut cfg| {
        apply_env_overrides(&mut cfg);
        cfg
    }))
}

/// Parse a config file without environment overrides.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, TeleopError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| TeleopError::Config(format!("failed to read {}: {e}", path.display())))?;
    let cfg: Config = toml::from_str(&raw)
        .map_err(|e| TeleopError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Apply `TELEOP_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `TELEOP_ARMS` | `arms` (comma-separated) |
/// | `TELEOP_BUS_CAPACITY` | `bus_capacity` |
/// | `TELEOP_STATUS_RATE_HZ` | `status_rate_hz` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("TELEOP_ARMS") {
        let arms: Vec<String> = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if !arms.is_empty() {
            cfg.arms = arms;
        }
    }
    if let Ok(v) = std::env::var("TELEOP_BUS_CAPACITY")
        && let Ok(capacity) = v.parse::<usize>()
        && capacity > 0
    {
        cfg.bus_capacity = capacity;
    }
    if let Ok(v) = std::env::var("TELEOP_STATUS_RATE_HZ")
        && let Ok(rate) = v.parse::<f64>()
        && rate.is_finite()
        && rate >= 0.0
    {
        cfg.status_rate_hz = rate;
    }
}

/// Save the config to disk, creating `~/.teleop/` if necessary.
pub fn save(cfg: &Config) -> Result<(), TeleopError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), TeleopError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| TeleopError::Config(format!("failed to create config directory: {e}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| TeleopError::Config(format!("failed to set config directory permissions: {e}")))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| TeleopError::Serialization(format!("failed to serialize config: {e}")))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| TeleopError::Config(format!("failed to write {}: {e}", path.display())))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| TeleopError::Config(format!("failed to write {}: {e}", path.display())))?;
    Ok(())
}
