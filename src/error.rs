use thiserror::Error;

use crate::registry::Direction;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unknown pin '{0}', run `list` to see configured pins")]
    UnknownPin(String),
    #[error("{name} is {direction}, use {hint} instead")]
    WrongDirection {
        name: String,
        direction: Direction,
        hint: &'static str,
    },
    #[error("Duplicate pin name: {0}")]
    DuplicateName(String),
    #[error("Invalid direction '{direction}' for pin {name}, expected 'in' or 'out'")]
    InvalidDirection { name: String, direction: String },
    #[error("No OUTPUT pins configured to cycle")]
    EmptyDeviceSet,
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("GPIO driver error: {0}")]
    Driver(String),
}

impl AppError {
    /// Configuration problems stop the process before any pin is claimed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::DuplicateName(_) | AppError::InvalidDirection { .. } | AppError::Config(_)
        )
    }
}
