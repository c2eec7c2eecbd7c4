use std::fmt;

use tokio::sync::mpsc;

use crate::polarity::{InputState, Level, OutputState};
use crate::registry::PinDescriptor;
use crate::watcher::EdgeEvent;

/// Human-readable progress reported by commands.
#[derive(Debug, Clone)]
pub enum StatusEvent {
    Pin(PinDescriptor),
    Info(String),
    Warning(String),
    Output {
        device: String,
        pin_id: u32,
        state: OutputState,
        cycle: Option<u32>,
    },
    Edge(EdgeEvent),
    Snapshot {
        device: String,
        level: Level,
        state: InputState,
        initial: bool,
    },
    Confirmed {
        device: String,
        pin_id: u32,
        state: OutputState,
        level: Level,
    },
    Interrupted,
    Released,
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusEvent::Pin(descriptor) => write!(f, "- {descriptor}"),
            StatusEvent::Info(msg) => write!(f, "[INFO] {msg}"),
            StatusEvent::Warning(msg) => write!(f, "[WARN] {msg}"),
            StatusEvent::Output {
                device,
                pin_id,
                state,
                cycle: Some(cycle),
            } => write!(f, "[CYCLE {cycle}] {device} (GPIO {pin_id}) -> {state}"),
            StatusEvent::Output {
                device,
                pin_id,
                state,
                cycle: None,
            } => write!(f, "[STATE] {device} (GPIO {pin_id}) -> {state}"),
            StatusEvent::Edge(event) => write!(f, "[EDGE] {event}"),
            StatusEvent::Snapshot {
                device,
                level,
                state,
                initial,
            } => {
                let prefix = if *initial { "Initial: " } else { "" };
                write!(f, "[STATE] {prefix}{device} = {level} ({state})")
            }
            StatusEvent::Confirmed {
                device,
                pin_id,
                state,
                level,
            } => write!(
                f,
                "[INFO] {device} (GPIO {pin_id}) set to {state} (physical {level})"
            ),
            StatusEvent::Interrupted => f.write_str("[INFO] Interrupted."),
            StatusEvent::Released => f.write_str("[CLEANUP] GPIO reset."),
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: StatusEvent);
}

impl EventSink for mpsc::UnboundedSender<StatusEvent> {
    fn emit(&self, event: StatusEvent) {
        let _ = self.send(event);
    }
}

/// How a command's main loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Cancelled,
    Expired,
}
