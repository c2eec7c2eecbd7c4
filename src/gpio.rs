use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;

use crate::config::Pull;
use crate::error::AppError;
use crate::polarity::Level;
use crate::registry::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Rising,
    Falling,
    Both,
}

impl EdgeKind {
    pub fn matches(self, observed: EdgeKind) -> bool {
        match self {
            EdgeKind::Both => observed != EdgeKind::Both,
            _ => self == observed,
        }
    }
}

/// Unfiltered transition as reported by the backend.
#[derive(Debug, Clone, Copy)]
pub struct RawEdge {
    pub pin_id: u32,
    pub edge: EdgeKind,
    pub timestamp_ms: u64,
}

/// Forwards raw transitions from the backend's notification context into a
/// single-consumer queue.
pub struct EdgeHandler {
    edge_tx: mpsc::UnboundedSender<RawEdge>,
}

impl EdgeHandler {
    pub fn new(edge_tx: mpsc::UnboundedSender<RawEdge>) -> Self {
        Self { edge_tx }
    }

    pub fn channel() -> (EventHandler, mpsc::UnboundedReceiver<RawEdge>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self::new(tx)), rx)
    }

    pub fn dispatch(&self, edge: RawEdge) {
        // receiver gone means the watcher stopped
        let _ = self.edge_tx.send(edge);
    }
}

pub type EventHandler = Arc<EdgeHandler>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinSettings {
    pub direction: Direction,
    pub pull: Pull,
    pub initial: Level,
}

impl PinSettings {
    pub fn input(pull: Pull) -> Self {
        Self {
            direction: Direction::Input,
            pull,
            initial: Level::Low,
        }
    }

    pub fn output(initial: Level) -> Self {
        Self {
            direction: Direction::Output,
            pull: Pull::Floating,
            initial,
        }
    }
}

pub trait GpioBackend: Send + Sync {
    fn configure(&self, pin_id: u32, settings: &PinSettings) -> Result<(), AppError>;
    fn write(&self, pin_id: u32, level: Level) -> Result<(), AppError>;
    fn read(&self, pin_id: u32) -> Result<Level, AppError>;
    fn on_edge(
        &self,
        pin_id: u32,
        edge: EdgeKind,
        debounce_ms: u64,
        handler: EventHandler,
    ) -> Result<(), AppError>;
    fn clear_edge(&self, pin_id: u32) -> Result<(), AppError>;
    /// Returns every claimed line to the platform default.
    fn reset_all(&self) -> Result<(), AppError>;
}

pub type SharedBackend = Arc<dyn GpioBackend>;

pub(crate) fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
