use std::fmt;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::config::{AppConfig, PinConfig, Pull};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "in" | "input" => Some(Direction::Input),
            "out" | "output" => Some(Direction::Output),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Input => "INPUT",
            Direction::Output => "OUTPUT",
        })
    }
}

/// Direction together with the polarity settings valid for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "direction", rename_all = "lowercase")]
pub enum PinMode {
    Input { pull: Pull, active_low: bool },
    Output { active_high: bool },
}

impl PinMode {
    pub fn direction(&self) -> Direction {
        match self {
            PinMode::Input { .. } => Direction::Input,
            PinMode::Output { .. } => Direction::Output,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinDescriptor {
    pub name: String,
    pub pin_id: u32,
    #[serde(flatten)]
    pub mode: PinMode,
}

impl PinDescriptor {
    pub fn direction(&self) -> Direction {
        self.mode.direction()
    }
}

impl TryFrom<&PinConfig> for PinDescriptor {
    type Error = AppError;

    fn try_from(cfg: &PinConfig) -> Result<Self, Self::Error> {
        let direction =
            Direction::parse(&cfg.direction).ok_or_else(|| AppError::InvalidDirection {
                name: cfg.name.clone(),
                direction: cfg.direction.clone(),
            })?;

        let mode = match direction {
            Direction::Input => {
                if cfg.active_high.is_some() {
                    return Err(AppError::Config(format!(
                        "pin {}: `active_high` only applies to outputs, use `active_low`",
                        cfg.name
                    )));
                }
                PinMode::Input {
                    pull: cfg.pull.unwrap_or_default(),
                    active_low: cfg.active_low.unwrap_or(true),
                }
            }
            Direction::Output => {
                if cfg.pull.is_some() || cfg.active_low.is_some() {
                    return Err(AppError::Config(format!(
                        "pin {}: `pull` and `active_low` only apply to inputs, use `active_high`",
                        cfg.name
                    )));
                }
                PinMode::Output {
                    active_high: cfg.active_high.unwrap_or(true),
                }
            }
        };

        Ok(Self {
            name: cfg.name.clone(),
            pin_id: cfg.pin,
            mode,
        })
    }
}

impl fmt::Display for PinDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: GPIO {} [", self.name, self.pin_id)?;
        match self.mode {
            PinMode::Input { pull, active_low } => {
                let pull = match pull {
                    Pull::Up => "UP",
                    Pull::Down => "DOWN",
                    Pull::Floating => "NONE",
                };
                write!(f, "IN, pull={pull}")?;
                if active_low {
                    f.write_str(", active-low")?;
                }
            }
            PinMode::Output { active_high } => {
                write!(f, "OUT, active_high={active_high}")?;
            }
        }
        f.write_str("]")
    }
}

/// Named pins in registration order.
#[derive(Debug, Default)]
pub struct PinRegistry {
    pins: Vec<PinDescriptor>,
    index: FxHashMap<String, usize>,
}

impl PinRegistry {
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let mut registry = Self::default();
        for cfg in &config.pins {
            registry.register(PinDescriptor::try_from(cfg)?)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, descriptor: PinDescriptor) -> Result<(), AppError> {
        if self.index.contains_key(&descriptor.name) {
            return Err(AppError::DuplicateName(descriptor.name));
        }
        self.index
            .insert(descriptor.name.clone(), self.pins.len());
        self.pins.push(descriptor);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&PinDescriptor, AppError> {
        self.index
            .get(name)
            .map(|&i| &self.pins[i])
            .ok_or_else(|| AppError::UnknownPin(name.to_string()))
    }

    pub fn all(&self) -> impl Iterator<Item = (&str, &PinDescriptor)> {
        self.pins.iter().map(|d| (d.name.as_str(), d))
    }

    pub fn outputs(&self) -> impl Iterator<Item = &PinDescriptor> {
        self.pins
            .iter()
            .filter(|d| d.direction() == Direction::Output)
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}
