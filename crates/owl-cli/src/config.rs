//! Configuration Vault – reads/writes `~/.owl/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use owl_hal::{DetectorSettings, StereoGeometry};
use owl_runtime::{BehaviorSettings, LogSettings, LoopSettings, MachineSettings};
use owl_types::{AxisLimits, OwlError};

/// Wire transport to the servo controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum TransportKind {
    #[default]
    Udp,
    Tcp,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Udp => write!(f, "udp"),
            TransportKind::Tcp => write!(f, "tcp"),
        }
    }
}

/// Persisted configuration stored in `~/.owl/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// `host:port` of the servo controller.
    #[serde(default = "default_controller_addr")]
    pub controller_addr: String,

    #[serde(default)]
    pub transport: TransportKind,

    /// Send/receive timeout for one command exchange.
    #[serde(default = "default_transport_timeout_ms")]
    pub transport_timeout_ms: u64,

    /// MJPEG stream of the combined stereo image.
    #[serde(default = "default_video_url")]
    pub video_url: String,

    /// Socket read timeout of the video stream.  A read that times out
    /// drops the connection; it is reopened on the next tick.
    #[serde(default = "default_source_timeout_ms")]
    pub source_timeout_ms: u64,

    #[serde(default = "default_eye_width")]
    pub eye_width: u32,

    #[serde(default = "default_eye_height")]
    pub eye_height: u32,

    /// Mirror the combined frame before splitting it into eyes.
    #[serde(default = "default_true")]
    pub flip_horizontal: bool,

    /// Tick period.
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,

    /// Stalled ticks in a row tolerated before the camera counts as lost.
    #[serde(default = "default_max_stalled_frames")]
    pub max_stalled_frames: u32,

    /// Servo units per nudge key press.
    #[serde(default = "default_nudge_step")]
    pub nudge_step: i32,

    /// Accept nudge keys while a behavior is running.
    #[serde(default = "default_true")]
    pub nudge_while_active: bool,

    #[serde(default)]
    pub limits: AxisLimits,

    #[serde(default)]
    pub behaviors: BehaviorSettings,

    #[serde(default)]
    pub detector: DetectorSettings,

    #[serde(default)]
    pub log: LogSettings,
}

fn default_controller_addr() -> String {
    "10.0.0.10:12345".to_string()
}
fn default_transport_timeout_ms() -> u64 {
    40
}
fn default_video_url() -> String {
    "http://10.0.0.10:8080/stream/video.mjpeg".to_string()
}
fn default_source_timeout_ms() -> u64 {
    500
}
fn default_eye_width() -> u32 {
    640
}
fn default_eye_height() -> u32 {
    480
}
fn default_true() -> bool {
    true
}
fn default_frame_interval_ms() -> u64 {
    50
}
fn default_max_stalled_frames() -> u32 {
    40
}
fn default_nudge_step() -> i32 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            controller_addr: default_controller_addr(),
            transport: TransportKind::default(),
            transport_timeout_ms: default_transport_timeout_ms(),
            video_url: default_video_url(),
            source_timeout_ms: default_source_timeout_ms(),
            eye_width: default_eye_width(),
            eye_height: default_eye_height(),
            flip_horizontal: true,
            frame_interval_ms: default_frame_interval_ms(),
            max_stalled_frames: default_max_stalled_frames(),
            nudge_step: default_nudge_step(),
            nudge_while_active: true,
            limits: AxisLimits::default(),
            behaviors: BehaviorSettings::default(),
            detector: DetectorSettings::default(),
            log: LogSettings::default(),
        }
    }
}

impl Config {
    /// Reject settings the loop cannot run with.
    pub fn validate(&self) -> Result<(), OwlError> {
        self.limits.validate()?;
        if self.nudge_step <= 0 {
            return Err(OwlError::InvalidConfig(format!(
                "nudge_step must be positive, got {}",
                self.nudge_step
            )));
        }
        if self.eye_width == 0 || self.eye_height == 0 {
            return Err(OwlError::InvalidConfig(format!(
                "eye size must be non-zero, got {}x{}",
                self.eye_width, self.eye_height
            )));
        }
        if self.transport_timeout_ms == 0 || self.source_timeout_ms == 0 {
            return Err(OwlError::InvalidConfig(
                "transport_timeout_ms and source_timeout_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn geometry(&self) -> StereoGeometry {
        StereoGeometry {
            eye_width: self.eye_width,
            eye_height: self.eye_height,
            flip_horizontal: self.flip_horizontal,
        }
    }

    pub fn transport_timeout(&self) -> Duration {
        Duration::from_millis(self.transport_timeout_ms)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    /// Settings for the control loop.  The tracker's aim point follows the
    /// configured eye size.
    pub fn loop_settings(&self, max_ticks: Option<u64>) -> LoopSettings {
        let mut behaviors = self.behaviors.clone();
        behaviors.track.image_width = self.eye_width;
        behaviors.track.image_height = self.eye_height;
        LoopSettings {
            frame_interval: Duration::from_millis(self.frame_interval_ms),
            max_stalled_frames: self.max_stalled_frames,
            max_ticks,
            limits: self.limits,
            machine: MachineSettings {
                nudge_step: self.nudge_step,
                nudge_while_active: self.nudge_while_active,
                behaviors,
            },
        }
    }
}

/// Return the path to `~/.owl/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".owl").join("config.toml")
}

/// Load the config from a specific path.  Returns `None` if the file does
/// not exist.  Environment overrides are not applied here.
pub fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config = toml::from_str(&raw)
        .map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `OWL_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `OWL_CONTROLLER_ADDR` | `controller_addr` |
/// | `OWL_VIDEO_URL` | `video_url` |
/// | `OWL_FRAME_INTERVAL_MS` | `frame_interval_ms` |
/// | `OWL_NUDGE_STEP` | `nudge_step` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("OWL_CONTROLLER_ADDR") {
        cfg.controller_addr = v;
    }
    if let Ok(v) = std::env::var("OWL_VIDEO_URL") {
        cfg.video_url = v;
    }
    if let Ok(v) = std::env::var("OWL_FRAME_INTERVAL_MS")
        && let Ok(ms) = v.parse::<u64>() {
            cfg.frame_interval_ms = ms;
        }
    if let Ok(v) = std::env::var("OWL_NUDGE_STEP")
        && let Ok(step) = v.parse::<i32>() {
            cfg.nudge_step = step;
        }
}

/// Save the config to a specific path, creating its directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    // Owner-only read/write (rw-------) on Unix.
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
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use owl_types::Axis;

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_meta = std::fs::metadata(path.parent().unwrap()).expect("dir metadata");
        assert_eq!(dir_meta.permissions().mode() & 0o777, 0o700, "config directory must have 0o700 permissions");
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, Config::default());
        assert_eq!(loaded.controller_addr, "10.0.0.10:12345");
        assert_eq!(loaded.transport, TransportKind::Udp);
        assert_eq!(loaded.limits.range(Axis::LeftTilt).center, 1460);
    }

    #[test]
    fn config_path_points_to_owl_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".owl"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            transport = "tcp"
            nudge_step = 8

            [limits.neck_pan]
            min = 1200
            max = 1800
            center = 1500

            [behaviors.neck_sweep]
            amplitude = 120

            [log]
            format = "json"
            "#,
        )
        .expect("parse");
        assert_eq!(cfg.transport, TransportKind::Tcp);
        assert_eq!(cfg.nudge_step, 8);
        assert_eq!(cfg.limits.neck_pan.center, 1500);
        assert_eq!(cfg.limits.right_pan, AxisLimits::default().right_pan);
        assert_eq!(cfg.behaviors.neck_sweep.amplitude, 120);
        assert_eq!(cfg.behaviors.neck_sweep.period_ticks, 120);
        assert_eq!(cfg.frame_interval_ms, 50);
        assert_eq!(cfg.log.format, owl_runtime::LogFormat::Json);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn parse_error_is_reported() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "nudge_step = \"five\"").expect("write");
        let err = load_from(&path).unwrap_err();
        assert!(err.contains("Failed to parse config"));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = Config::default();
        cfg.limits.right_tilt.center = 3000;
        assert!(matches!(cfg.validate(), Err(OwlError::InvalidConfig(_))));

        let mut cfg = Config::default();
        cfg.nudge_step = 0;
        assert!(matches!(cfg.validate(), Err(OwlError::InvalidConfig(_))));

        let mut cfg = Config::default();
        cfg.transport_timeout_ms = 0;
        assert!(matches!(cfg.validate(), Err(OwlError::InvalidConfig(_))));
    }

    #[test]
    fn loop_settings_follow_config() {
        let mut cfg = Config::default();
        cfg.eye_width = 320;
        cfg.eye_height = 240;
        cfg.nudge_while_active = false;
        let settings = cfg.loop_settings(Some(10));
        assert_eq!(settings.frame_interval, Duration::from_millis(50));
        assert_eq!(settings.max_ticks, Some(10));
        assert_eq!(settings.machine.behaviors.track.image_width, 320);
        assert_eq!(settings.machine.behaviors.track.image_height, 240);
        assert!(!settings.machine.nudge_while_active);
        assert_eq!(cfg.geometry().eye_width, 320);
    }

    #[test]
    fn apply_env_overrides_changes_controller_addr() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("OWL_CONTROLLER_ADDR", "192.168.1.50:12345") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.controller_addr, "192.168.1.50:12345");
        unsafe { std::env::remove_var("OWL_CONTROLLER_ADDR") };
    }

    #[test]
    fn apply_env_overrides_changes_video_url() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("OWL_VIDEO_URL", "http://owl.local:8080/stream") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.video_url, "http://owl.local:8080/stream");
        unsafe { std::env::remove_var("OWL_VIDEO_URL") };
    }

    #[test]
    fn apply_env_overrides_changes_frame_interval() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("OWL_FRAME_INTERVAL_MS", "20") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.frame_interval_ms, 20);
        unsafe { std::env::remove_var("OWL_FRAME_INTERVAL_MS") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_nudge_step() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("OWL_NUDGE_STEP", "lots") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.nudge_step, 5);
        unsafe { std::env::remove_var("OWL_NUDGE_STEP") };
    }
}
