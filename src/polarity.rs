//! Translation between logical pin meaning and electrical levels.
//!
//! Outputs use the `active_high` convention, inputs use `active_low`. The two
//! are not interchangeable: feeding an output's `active_high` flag into
//! [`from_electrical`] inverts the result.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    High,
    Low,
}

impl Level {
    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::High => "HIGH",
            Level::Low => "LOW",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    On,
    Off,
}

impl From<bool> for OutputState {
    fn from(on: bool) -> Self {
        if on { OutputState::On } else { OutputState::Off }
    }
}

impl fmt::Display for OutputState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputState::On => "ON",
            OutputState::Off => "OFF",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputState {
    Active,
    Inactive,
}

impl From<bool> for InputState {
    fn from(active: bool) -> Self {
        if active {
            InputState::Active
        } else {
            InputState::Inactive
        }
    }
}

impl fmt::Display for InputState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InputState::Active => "ACTIVE",
            InputState::Inactive => "INACTIVE",
        })
    }
}

/// Electrical level that drives an output to `logical_on`.
pub fn to_electrical(logical_on: bool, active_high: bool) -> Level {
    if logical_on == active_high {
        Level::High
    } else {
        Level::Low
    }
}

/// Logical activity of an input reading `level`.
pub fn from_electrical(level: Level, active_low: bool) -> bool {
    (level == Level::Low && active_low) || (level == Level::High && !active_low)
}

/// Logical state of an output currently driven at `level`.
pub fn output_from_electrical(level: Level, active_high: bool) -> bool {
    level.is_high() == active_high
}
