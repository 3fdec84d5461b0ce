//! Kiosk configuration, loaded once at startup from a JSON file.
//!
//! Every field has a default so a partial file is accepted; a file that does
//! not parse or fails [`Config::validate`] is an error the daemon treats as
//! fatal.

use crate::types::AppSelection;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "TABLET_CONFIG";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub home_assistant: HomeAssistantConfig,
    pub cookbook: CookbookConfig,
    pub mqtt: MqttConfig,
    pub presence_detection: PresenceConfig,
    pub screen: ScreenConfig,
    pub shortcuts: ShortcutConfig,
    pub web_view: WebViewConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HomeAssistantConfig {
    pub url: String,
    /// Long-lived access token. Only reported by diagnostics; the browser
    /// session handles Home Assistant login itself.
    pub token: String,
}

impl Default for HomeAssistantConfig {
    fn default() -> Self {
        Self {
            url: "http://homeassistant.local:8123".into(),
            token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CookbookConfig {
    pub url: String,
}

impl Default for CookbookConfig {
    fn default() -> Self {
        Self {
            url: "https://www.allrecipes.com".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub enabled: bool,
    pub broker: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub topic_prefix: String,
    pub client_id: String,
    /// Publish Home Assistant discovery entries on connect.
    pub discovery: bool,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            broker: "localhost".into(),
            port: 1883,
            username: String::new(),
            password: String::new(),
            topic_prefix: "tablet".into(),
            client_id: "tablet-ha-app".into(),
            discovery: true,
        }
    }
}

impl MqttConfig {
    /// Username/password pair, only when both are set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.username.is_empty() || self.password.is_empty() {
            None
        } else {
            Some((&self.username, &self.password))
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    pub enabled: bool,
    pub check_interval_ms: u64,
    pub presence_timeout_seconds: u64,
    /// Minimum face score (0.0–1.0) for a frame to count as "seen".
    pub detection_confidence: f32,
    /// V4L2 device path.
    pub camera_device: String,
    /// UltraFace RFB-320 ONNX model.
    pub model_path: PathBuf,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_ms: 1000,
            presence_timeout_seconds: 30,
            detection_confidence: 0.5,
            camera_device: "/dev/video0".into(),
            model_path: PathBuf::from("models/version-RFB-320.onnx"),
        }
    }
}

impl PresenceConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn presence_timeout(&self) -> Duration {
        Duration::from_secs(self.presence_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    pub turn_off_when_no_presence: bool,
    pub dim_brightness_when_no_presence: bool,
    pub dim_level: u8,
    pub normal_brightness: u8,
    /// Name under `/sys/class/backlight`; the first device found when unset.
    pub backlight: Option<String>,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            turn_off_when_no_presence: true,
            dim_brightness_when_no_presence: false,
            dim_level: 20,
            normal_brightness: 100,
            backlight: None,
        }
    }
}

/// What the screen does while nobody is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenAction {
    PowerOff,
    Dim(u8),
    Nothing,
}

impl ScreenConfig {
    /// Turning the screen off wins over dimming when both are enabled.
    pub fn absent_action(&self) -> ScreenAction {
        if self.turn_off_when_no_presence {
            ScreenAction::PowerOff
        } else if self.dim_brightness_when_no_presence {
            ScreenAction::Dim(self.dim_level)
        } else {
            ScreenAction::Nothing
        }
    }
}

/// Key names bound to the local shortcuts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShortcutConfig {
    pub switch_app: String,
    pub exit_fullscreen: String,
    pub quit_app: String,
}

impl Default for ShortcutConfig {
    fn default() -> Self {
        Self {
            switch_app: "F1".into(),
            exit_fullscreen: "F11".into(),
            quit_app: "Ctrl+Q".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebViewConfig {
    /// Browser executable used to render the apps.
    pub browser: String,
    /// Extra arguments passed before the URL.
    pub args: Vec<String>,
}

impl Default for WebViewConfig {
    fn default() -> Self {
        Self {
            browser: "chromium".into(),
            args: Vec::new(),
        }
    }
}

impl Config {
    /// Read, parse and validate the config file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&text)?;
        tracing::info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let pd = &self.presence_detection;
        if pd.check_interval_ms == 0 {
            return Err(invalid("presence_detection.check_interval_ms must be > 0"));
        }
        if pd.presence_timeout_seconds == 0 {
            return Err(invalid(
                "presence_detection.presence_timeout_seconds must be > 0",
            ));
        }
        if !(0.0..=1.0).contains(&pd.detection_confidence) {
            return Err(invalid(
                "presence_detection.detection_confidence must be within 0.0–1.0",
            ));
        }
        if self.screen.dim_level > 100 || self.screen.normal_brightness > 100 {
            return Err(invalid(
                "screen.dim_level and screen.normal_brightness must be within 0–100",
            ));
        }
        if self.mqtt.enabled {
            if self.mqtt.broker.trim().is_empty() {
                return Err(invalid("mqtt.broker must not be empty"));
            }
            if self.mqtt.topic_prefix.trim_matches('/').is_empty() {
                return Err(invalid("mqtt.topic_prefix must not be empty"));
            }
        }
        Ok(())
    }

    /// URL the web view shows for `app`.
    pub fn url_for(&self, app: AppSelection) -> &str {
        match app {
            AppSelection::HomeAssistant => &self.home_assistant.url,
            AppSelection::Cookbook => &self.cookbook.url,
        }
    }
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::Invalid(msg.to_string())
}

/// Locate the config file: `$TABLET_CONFIG`, then `config.json` next to the
/// executable, then `config.json` in the working directory.
pub fn resolve_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(CONFIG_FILE_NAME)));
    match beside_exe {
        Some(path) if path.exists() => path,
        _ => PathBuf::from(CONFIG_FILE_NAME),
    }
}
