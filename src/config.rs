use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Deserializer, Serialize, de};

use crate::error::AppError;

#[derive(Debug, Default, Hash, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Pull {
    #[default]
    Up,
    Down,
    Floating,
}

impl Pull {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "up" => Some(Pull::Up),
            "down" => Some(Pull::Down),
            "floating" | "none" | "off" => Some(Pull::Floating),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for Pull {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Pull::parse(&raw).ok_or_else(|| {
            de::Error::custom(format!("unknown pull '{raw}', expected up|down|floating|none"))
        })
    }
}

/// One entry of the `pins` table, as written in the config file.
///
/// Direction and polarity fields are validated when the entry is registered,
/// not at parse time, so a bad entry reports its pin name.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PinConfig {
    pub name: String,
    pub pin: u32,
    pub direction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull: Option<Pull>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_high: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_low: Option<bool>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Defaults {
    pub delay_ms: u64,
    pub debounce_ms: u64,
    pub snapshot_interval_ms: u64,
    pub watch_duration_ms: u64,
    pub cycles: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            delay_ms: 1000,
            debounce_ms: 200,
            snapshot_interval_ms: 500,
            watch_duration_ms: 20_000,
            cycles: 3,
        }
    }
}

impl Defaults {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms)
    }

    pub fn watch_duration(&self) -> Duration {
        Duration::from_millis(self.watch_duration_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_chip")]
    pub chip: String,
    pub pins: Vec<PinConfig>,
    #[serde(default)]
    pub defaults: Defaults,
}

fn default_chip() -> String {
    "/dev/gpiochip0".to_string()
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let contents = fs::read_to_string(&path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, AppError> {
        serde_json::from_str(contents)
            .map_err(|e| AppError::Config(format!("Invalid config json: {e}")))
    }
}
