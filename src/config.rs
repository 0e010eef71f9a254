use crate::error::{Result, SentryError};
use chrono::NaiveTime;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SentryConfig {
    #[serde(default)]
    pub mqtt: MqttConfig,

    #[serde(default)]
    pub alert: AlertConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MqttConfig {
    /// Broker hostname
    #[serde(default = "default_mqtt_host")]
    pub host: String,

    /// Broker port
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Broker username (empty disables authentication)
    #[serde(default)]
    pub username: String,

    /// Broker API key / password
    #[serde(default)]
    pub api_key: String,

    /// MQTT client identifier
    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default)]
    pub feeds: FeedConfig,
}

/// Topic names for every feed the node publishes or subscribes to.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FeedConfig {
    #[serde(default = "default_feed_temperature")]
    pub temperature: String,

    #[serde(default = "default_feed_humidity")]
    pub humidity: String,

    #[serde(default = "default_feed_motion_state")]
    pub motion_state: String,

    #[serde(default = "default_feed_camera_timestamp")]
    pub camera_timestamp: String,

    #[serde(default = "default_feed_light_control")]
    pub light_control: String,

    #[serde(default = "default_feed_fan_control")]
    pub fan_control: String,

    #[serde(default = "default_feed_system_mode")]
    pub system_mode: String,
}

impl FeedConfig {
    /// Inbound feeds the node subscribes to.
    pub fn control_feeds(&self) -> Vec<String> {
        vec![
            self.light_control.clone(),
            self.fan_control.clone(),
            self.system_mode.clone(),
        ]
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AlertConfig {
    /// Minimum seconds between accepted motion triggers
    #[serde(default = "default_debounce_seconds")]
    pub debounce_seconds: u64,

    /// Seconds an alert session stays open before auto-clearing
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
}

impl AlertConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_secs(self.debounce_seconds)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScheduleConfig {
    /// Sensor poll interval in seconds
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,

    /// Local time of day for nightly maintenance, "HH:MM"
    #[serde(default = "default_maintenance_time")]
    pub maintenance_time: String,
}

impl ScheduleConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn maintenance_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.maintenance_time, "%H:%M").map_err(|e| {
            SentryError::component(
                "config".to_string(),
                format!("invalid maintenance_time {:?}: {e}", self.maintenance_time),
            )
        })
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Directory for daily journal files
    #[serde(default = "default_data_path")]
    pub data_path: String,

    /// Directory for captured alert images
    #[serde(default = "default_image_path")]
    pub image_path: String,

    /// Application log file (tracing output)
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

impl SentryConfig {
    /// Load configuration from the default file location.
    pub fn load() -> Result<Self> {
        Self::load_from_file("homesentry.toml")
    }

    /// Load configuration from an optional TOML file plus HOMESENTRY_*
    /// environment overrides, falling back to built-in defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .add_source(File::with_name(&path_str).required(false))
            .add_source(Environment::with_prefix("HOMESENTRY").separator("__"))
            .build()?;

        let config: SentryConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);
        Ok(config)
    }

    /// Validate values that the type system cannot enforce.
    pub fn validate(&self) -> Result<()> {
        if self.alert.debounce_seconds == 0 {
            return Err(invalid("alert.debounce_seconds must be greater than zero"));
        }
        if self.alert.cooldown_seconds == 0 {
            return Err(invalid("alert.cooldown_seconds must be greater than zero"));
        }
        if self.schedule.poll_interval_seconds == 0 {
            return Err(invalid(
                "schedule.poll_interval_seconds must be greater than zero",
            ));
        }
        self.schedule.maintenance_time()?;
        if self.logging.data_path.is_empty() {
            return Err(invalid("logging.data_path must not be empty"));
        }
        if self.logging.image_path.is_empty() {
            return Err(invalid("logging.image_path must not be empty"));
        }
        if self.mqtt.host.is_empty() {
            return Err(invalid("mqtt.host must not be empty"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> SentryError {
    SentryError::component("config", message)
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            username: String::new(),
            api_key: String::new(),
            client_id: default_client_id(),
            feeds: FeedConfig::default(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            temperature: default_feed_temperature(),
            humidity: default_feed_humidity(),
            motion_state: default_feed_motion_state(),
            camera_timestamp: default_feed_camera_timestamp(),
            light_control: default_feed_light_control(),
            fan_control: default_feed_fan_control(),
            system_mode: default_feed_system_mode(),
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            debounce_seconds: default_debounce_seconds(),
            cooldown_seconds: default_cooldown_seconds(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval_seconds(),
            maintenance_time: default_maintenance_time(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            image_path: default_image_path(),
            log_file: default_log_file(),
        }
    }
}

fn default_mqtt_host() -> String {
    "io.adafruit.com".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "homesentry-node".to_string()
}

fn default_feed_temperature() -> String {
    "feeds/temperature".to_string()
}

fn default_feed_humidity() -> String {
    "feeds/humidity".to_string()
}

fn default_feed_motion_state() -> String {
    "feeds/motion-state".to_string()
}

fn default_feed_camera_timestamp() -> String {
    "feeds/camera-timestamp".to_string()
}

fn default_feed_light_control() -> String {
    "feeds/light-control".to_string()
}

fn default_feed_fan_control() -> String {
    "feeds/fan-control".to_string()
}

fn default_feed_system_mode() -> String {
    "feeds/system-mode".to_string()
}

fn default_debounce_seconds() -> u64 {
    60
}

fn default_cooldown_seconds() -> u64 {
    10
}

fn default_poll_interval_seconds() -> u64 {
    30
}

fn default_maintenance_time() -> String {
    "00:05".to_string()
}

fn default_data_path() -> String {
    "data".to_string()
}

fn default_image_path() -> String {
    "images".to_string()
}

fn default_log_file() -> String {
    "logs/app.log".to_string()
}
