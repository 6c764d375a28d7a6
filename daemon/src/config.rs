use std::path::Path;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use twoline::lcd::DriverConfig;
use twoline::model::{FlashDefaults, MessageDefaults};
use twoline::orchestrator::OrchestratorConfig;

use crate::error::TwolineError;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub device: String,
    pub host: String,
    pub port: u16,
    pub size_x: u8,
    pub size_y: u8,
    /// Seconds between blink colors.
    pub blink_interval: f64,
    /// Seconds between pages of text that does not fit the panel.
    pub text_cycle_interval: f64,
    pub orchestrator_tick_ms: u64,
    pub driver_tick_ms: u64,
    pub request_timeout_ms: u64,
    pub brightness: u8,
    pub contrast: u8,
    pub message_interval: u64,
    pub flash_timeout: u64,
    pub debug_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device: "/dev/ttyACM0".to_string(),
            host: "0.0.0.0".to_string(),
            port: 9101,
            size_x: 16,
            size_y: 2,
            blink_interval: 0.25,
            text_cycle_interval: 2.0,
            orchestrator_tick_ms: 200,
            driver_tick_ms: 100,
            request_timeout_ms: 5000,
            brightness: 255,
            contrast: 200,
            message_interval: 5,
            flash_timeout: 10,
            debug_mode: false,
        }
    }
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            tick: Duration::from_millis(self.orchestrator_tick_ms),
            request_timeout: self.request_timeout(),
            message_defaults: MessageDefaults {
                interval: self.message_interval,
                ..MessageDefaults::default()
            },
            flash_defaults: FlashDefaults {
                timeout: self.flash_timeout,
                ..FlashDefaults::default()
            },
        }
    }

    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            width: self.size_x,
            height: self.size_y,
            tick: Duration::from_millis(self.driver_tick_ms),
            blink_interval: seconds(self.blink_interval),
            text_cycle_interval: seconds(self.text_cycle_interval),
            brightness: self.brightness,
            contrast: self.contrast,
        }
    }
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_else(|_| {
        warn!("invalid interval {value}, using 1s");
        Duration::from_secs(1)
    })
}

/// Reads the config file. A missing file means defaults; a malformed one is
/// an error.
pub async fn parse_config<P>(path: P) -> Result<Config, TwolineError>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    match tokio::fs::read_to_string(path).await {
        Ok(config_file) => toml::from_str(&config_file).map_err(TwolineError::ConfigFileParsingError),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("unable to read config file {}, using defaults", path.display());
            Ok(Config::default())
        }
        Err(e) => Err(TwolineError::ConfigFileReadError(e)),
    }
}
