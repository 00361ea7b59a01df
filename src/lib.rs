pub mod capture;
pub mod notify;
pub mod pipeline;
pub mod utils;

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::pipeline::zones::Zone;

/// Construction-time validation failure. The core never silently proceeds
/// with an invalid zone or parameter.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid zone: {0}")]
    InvalidZone(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Whole-run configuration. Passed explicitly to whoever needs it; there is
/// no process-global config state.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(rename = "camera", default)]
    pub cameras: Vec<CameraConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Class ids worth notifying about
    pub classes: Vec<u32>,
    /// Confidence threshold (exclusive)
    pub confidence: f32,
    /// Frame-diff detector: grid cell size in pixels
    pub cell_size: u32,
    /// Frame-diff detector: mean luma delta per cell that counts as motion
    pub diff_threshold: f32,
    /// Frame-diff detector: minimum cluster size in cells
    pub min_cells: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            classes: vec![0],
            confidence: 0.25,
            cell_size: 16,
            diff_threshold: 25.0,
            min_cells: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Telegram bot token; empty means log-only delivery
    pub token: String,
    pub chat_id: String,
    /// Notices with a level above this are dropped (1 = most important)
    pub verbose_level: u8,
    /// Minimum seconds between detection-frame notifications per camera
    pub min_interval_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            chat_id: String::new(),
            verbose_level: 2,
            min_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Parameters {
    /// Surveillance run duration as "HH:MM"
    pub overwatch_time: String,
    /// Minimum duration of one loop iteration, in seconds
    pub min_loop_secs: f64,
    /// Heartbeat log interval in minutes
    pub alive_log_minutes: u64,
    /// Streak length required before a notification
    pub min_detections_in_a_row: u32,
    /// Consecutive read timeouts that trigger exactly one failure report
    pub timeouts_before_failure_report: u32,
    /// Fixed per-read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Archive notified detection frames to disk
    pub save_frames: bool,
    pub frames_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            overwatch_time: "08:00".into(),
            min_loop_secs: 1.0,
            alive_log_minutes: 30,
            min_detections_in_a_row: 3,
            timeouts_before_failure_report: 5,
            read_timeout_ms: 750,
            save_frames: false,
            frames_dir: PathBuf::from("logs/detection_frames"),
            logs_dir: PathBuf::from("logs"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    pub name: String,
    /// Source address (device path or stream URL, depending on the source)
    pub address: String,
    /// Exclusion zones as normalized [left, top, right, bottom] rectangles
    #[serde(default)]
    pub zones: Vec<Zone>,
    #[serde(default)]
    pub show_window: bool,
    /// Border trim as [left, right, top, bottom] pixel counts, applied to
    /// every frame before detection
    #[serde(default)]
    pub crop: Option<crate::capture::CropMargins>,
}

impl Config {
    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let config: Config = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cameras.is_empty() {
            return Err(ConfigError::Invalid("no cameras configured".into()));
        }
        for (i, camera) in self.cameras.iter().enumerate() {
            if camera.name.is_empty() {
                return Err(ConfigError::Invalid(format!("camera #{i} has no name")));
            }
            if self.cameras[..i].iter().any(|c| c.name == camera.name) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate camera name {:?}",
                    camera.name
                )));
            }
        }
        if self.parameters.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid("read_timeout_ms must be positive".into()));
        }
        if !self.parameters.min_loop_secs.is_finite() || self.parameters.min_loop_secs < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "min_loop_secs must be a non-negative number, got {}",
                self.parameters.min_loop_secs
            )));
        }
        if self.notify.verbose_level > 3 {
            return Err(ConfigError::Invalid(format!(
                "verbose_level must be 0-3, got {}",
                self.notify.verbose_level
            )));
        }
        if !(0.0..=1.0).contains(&self.model.confidence) {
            return Err(ConfigError::Invalid(format!(
                "model confidence {} outside [0, 1]",
                self.model.confidence
            )));
        }
        utils::overwatch_end(&self.parameters.overwatch_time)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }

    pub fn read_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.parameters.read_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            model: ModelConfig::default(),
            notify: NotifyConfig::default(),
            parameters: Parameters::default(),
            cameras: vec![CameraConfig {
                name: "gate".into(),
                address: "/dev/video0".into(),
                zones: vec![Zone::new(0.1, 0.1, 0.9, 0.9).unwrap()],
                show_window: false,
                crop: None,
            }],
        }
    }

    #[test]
    fn default_parameters_validate() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn empty_camera_list_is_rejected() {
        let mut config = valid_config();
        config.cameras.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_or_nan_loop_time_is_rejected() {
        let mut config = valid_config();
        config.parameters.min_loop_secs = -1.0;
        assert!(config.validate().is_err());

        config.parameters.min_loop_secs = f64::NAN;
        assert!(config.validate().is_err());

        config.parameters.min_loop_secs = f64::INFINITY;
        assert!(config.validate().is_err());

        config.parameters.min_loop_secs = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn out_of_range_verbose_level_is_rejected() {
        let mut config = valid_config();
        config.notify.verbose_level = 9;
        assert!(config.validate().is_err());

        config.notify.verbose_level = 3;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn duplicate_camera_names_are_rejected() {
        let mut config = valid_config();
        let dup = config.cameras[0].clone();
        config.cameras.push(dup);
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_with_invalid_zone_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overwatch.toml");
        std::fs::write(
            &path,
            r#"
            [[camera]]
            name = "gate"
            address = "/dev/video0"
            zones = [[0.9, 0.1, 0.1, 0.9]]
            "#,
        )
        .unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("zone"), "got: {err}");
    }

    #[test]
    fn toml_round_trips_cameras_and_zones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overwatch.toml");
        std::fs::write(
            &path,
            r#"
            [parameters]
            read_timeout_ms = 500
            min_detections_in_a_row = 2

            [[camera]]
            name = "gate"
            address = "/dev/video0"
            zones = [[0.1, 0.1, 0.9, 0.9], [0.0, 0.0, 0.2, 0.2]]
            show_window = true
            crop = [16, 16, 0, 32]

            [[camera]]
            name = "yard"
            address = "/dev/video2"
            "#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.parameters.read_timeout_ms, 500);
        assert_eq!(config.parameters.min_detections_in_a_row, 2);
        assert_eq!(config.cameras.len(), 2);
        assert_eq!(config.cameras[0].zones.len(), 2);
        assert!(config.cameras[0].show_window);
        let crop = config.cameras[0].crop.unwrap();
        assert_eq!((crop.left, crop.right, crop.top, crop.bottom), (16, 16, 0, 32));
        assert!(config.cameras[1].zones.is_empty());
        assert!(config.cameras[1].crop.is_none());
    }
}
