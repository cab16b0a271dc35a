use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub flow: FlowRules,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_request_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct StreamConfig {
    #[serde(default = "default_reconnect_seconds")]
    pub reconnect_seconds: u64,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_reconnect_seconds() -> u64 {
    5
}

fn default_channel_capacity() -> usize {
    100
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconnect_seconds: default_reconnect_seconds(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MapConfig {
    #[serde(default = "default_map_provider")]
    pub provider: String,
    #[serde(default = "default_static_map_base")]
    pub static_base_url: String,
    #[serde(default = "default_map_width")]
    pub width: u32,
    #[serde(default = "default_map_height")]
    pub height: u32,
}

fn default_map_provider() -> String {
    "static".to_string()
}

fn default_static_map_base() -> String {
    "https://maps.googleapis.com/maps/api/staticmap".to_string()
}

fn default_map_width() -> u32 {
    800
}

fn default_map_height() -> u32 {
    400
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            provider: default_map_provider(),
            static_base_url: default_static_map_base(),
            width: default_map_width(),
            height: default_map_height(),
        }
    }
}

/// Timing and retry rules for the interactive flows.
#[derive(Debug, Deserialize, Clone)]
pub struct FlowRules {
    #[serde(default = "default_otp_countdown")]
    pub otp_countdown_seconds: i64,
    #[serde(default = "default_otp_resend_limit")]
    pub otp_resend_limit: u32,
    #[serde(default = "default_login_wait")]
    pub login_wait_seconds: u64,
    #[serde(default = "default_tracking_tick_seconds")]
    pub tracking_tick_seconds: u64,
    #[serde(default = "default_tracking_tick_step")]
    pub tracking_tick_step: f64,
}

fn default_otp_countdown() -> i64 {
    30
}

fn default_otp_resend_limit() -> u32 {
    5
}

fn default_login_wait() -> u64 {
    120
}

fn default_tracking_tick_seconds() -> u64 {
    10
}

fn default_tracking_tick_step() -> f64 {
    0.5
}

impl Default for FlowRules {
    fn default() -> Self {
        Self {
            otp_countdown_seconds: default_otp_countdown(),
            otp_resend_limit: default_otp_resend_limit(),
            login_wait_seconds: default_login_wait(),
            tracking_tick_seconds: default_tracking_tick_seconds(),
            tracking_tick_step: default_tracking_tick_step(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: String,
}

fn default_storage_path() -> String {
    "raillink-local.json".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Add in the current environment file
            // Default to 'development' env
            // Note that this file is _optional_
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked in to git
            .add_source(config::File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of RAILLINK)
            .add_source(config::Environment::with_prefix("RAILLINK").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
