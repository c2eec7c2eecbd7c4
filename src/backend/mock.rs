use std::sync::{Mutex, RwLock};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::Pull;
use crate::error::AppError;
use crate::gpio::{EdgeKind, EventHandler, GpioBackend, PinSettings, RawEdge, epoch_millis};
use crate::polarity::Level;
use crate::registry::Direction;

/// Driver call recorded by [`MockGpioBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverOp {
    Configure(u32, Direction),
    Write(u32, Level),
    Subscribe(u32),
    Unsubscribe(u32),
    Reset,
}

#[derive(Default)]
pub struct MockGpioBackend {
    pins: RwLock<FxHashMap<u32, MockPinState>>, // keyed by pin id
    journal: Mutex<Vec<DriverOp>>,
    failing: Mutex<FxHashSet<u32>>,
}

struct MockPinState {
    settings: PinSettings,
    level: Level,
    subscription: Option<(EdgeKind, u64, EventHandler)>,
}

impl MockGpioBackend {
    /// Drives an input line from the outside, as wiring or a sensor would.
    /// Every level change reaches the edge handler unfiltered.
    pub fn set_input_level(&self, pin_id: u32, level: Level) -> Result<(), AppError> {
        let notify = {
            let mut pins = self
                .pins
                .write()
                .map_err(|e| AppError::Driver(format!("lock poisoned: {e}")))?;
            let pin = pins
                .get_mut(&pin_id)
                .ok_or_else(|| AppError::Driver(format!("pin {pin_id} not configured")))?;

            if pin.settings.direction != Direction::Input {
                return Err(AppError::Driver(format!(
                    "pin {pin_id} is an output and cannot be driven externally"
                )));
            }

            let observed = match (pin.level, level) {
                (Level::Low, Level::High) => Some(EdgeKind::Rising),
                (Level::High, Level::Low) => Some(EdgeKind::Falling),
                _ => None,
            };
            pin.level = level;

            match (observed, &pin.subscription) {
                (Some(edge), Some((kind, _, handler))) if kind.matches(edge) => {
                    Some((handler.clone(), edge))
                }
                _ => None,
            }
        };

        if let Some((handler, edge)) = notify {
            handler.dispatch(RawEdge {
                pin_id,
                edge,
                timestamp_ms: epoch_millis(),
            });
        }
        Ok(())
    }

    /// Makes every subsequent write to `pin_id` fail.
    pub fn fail_writes(&self, pin_id: u32) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(pin_id);
        }
    }

    pub fn level(&self, pin_id: u32) -> Option<Level> {
        self.pins
            .read()
            .ok()
            .and_then(|pins| pins.get(&pin_id).map(|p| p.level))
    }

    pub fn debounce_ms(&self, pin_id: u32) -> Option<u64> {
        self.pins.read().ok().and_then(|pins| {
            pins.get(&pin_id)
                .and_then(|p| p.subscription.as_ref().map(|(_, ms, _)| *ms))
        })
    }

    pub fn journal(&self) -> Vec<DriverOp> {
        self.journal.lock().map(|j| j.clone()).unwrap_or_default()
    }

    pub fn writes(&self, pin_id: u32) -> Vec<Level> {
        self.journal()
            .into_iter()
            .filter_map(|op| match op {
                DriverOp::Write(pin, level) if pin == pin_id => Some(level),
                _ => None,
            })
            .collect()
    }

    pub fn write_count(&self) -> usize {
        self.journal()
            .iter()
            .filter(|op| matches!(op, DriverOp::Write(..)))
            .count()
    }

    pub fn reset_count(&self) -> usize {
        self.journal()
            .iter()
            .filter(|op| matches!(op, DriverOp::Reset))
            .count()
    }

    fn record(&self, op: DriverOp) -> Result<(), AppError> {
        self.journal
            .lock()
            .map_err(|e| AppError::Driver(format!("lock poisoned: {e}")))?
            .push(op);
        Ok(())
    }
}

fn idle_level(pull: Pull) -> Level {
    match pull {
        Pull::Up => Level::High,
        Pull::Down | Pull::Floating => Level::Low,
    }
}

impl GpioBackend for MockGpioBackend {
    fn configure(&self, pin_id: u32, settings: &PinSettings) -> Result<(), AppError> {
        let mut pins = self
            .pins
            .write()
            .map_err(|e| AppError::Driver(format!("lock poisoned: {e}")))?;

        let level = match settings.direction {
            Direction::Input => idle_level(settings.pull),
            Direction::Output => settings.initial,
        };
        pins.insert(
            pin_id,
            MockPinState {
                settings: *settings,
                level,
                subscription: None,
            },
        );
        drop(pins);

        self.record(DriverOp::Configure(pin_id, settings.direction))
    }

    fn write(&self, pin_id: u32, level: Level) -> Result<(), AppError> {
        let failing = self
            .failing
            .lock()
            .map_err(|e| AppError::Driver(format!("lock poisoned: {e}")))?
            .contains(&pin_id);
        if failing {
            return Err(AppError::Driver(format!("write to pin {pin_id} failed")));
        }

        let mut pins = self
            .pins
            .write()
            .map_err(|e| AppError::Driver(format!("lock poisoned: {e}")))?;
        let pin = pins
            .get_mut(&pin_id)
            .ok_or_else(|| AppError::Driver(format!("pin {pin_id} not configured")))?;

        if pin.settings.direction != Direction::Output {
            return Err(AppError::Driver(
                "pin must be in output mode to set value".into(),
            ));
        }
        pin.level = level;
        drop(pins);

        self.record(DriverOp::Write(pin_id, level))
    }

    fn read(&self, pin_id: u32) -> Result<Level, AppError> {
        let pins = self
            .pins
            .read()
            .map_err(|e| AppError::Driver(format!("lock poisoned: {e}")))?;
        pins.get(&pin_id)
            .map(|p| p.level)
            .ok_or_else(|| AppError::Driver(format!("pin {pin_id} not configured")))
    }

    fn on_edge(
        &self,
        pin_id: u32,
        edge: EdgeKind,
        debounce_ms: u64,
        handler: EventHandler,
    ) -> Result<(), AppError> {
        let mut pins = self
            .pins
            .write()
            .map_err(|e| AppError::Driver(format!("lock poisoned: {e}")))?;
        let pin = pins
            .get_mut(&pin_id)
            .ok_or_else(|| AppError::Driver(format!("pin {pin_id} not configured")))?;

        if pin.settings.direction != Direction::Input {
            return Err(AppError::Driver(
                "edge detection requires an input pin".into(),
            ));
        }
        pin.subscription = Some((edge, debounce_ms, handler));
        drop(pins);

        self.record(DriverOp::Subscribe(pin_id))
    }

    fn clear_edge(&self, pin_id: u32) -> Result<(), AppError> {
        let mut pins = self
            .pins
            .write()
            .map_err(|e| AppError::Driver(format!("lock poisoned: {e}")))?;
        if let Some(pin) = pins.get_mut(&pin_id) {
            pin.subscription = None;
        }
        drop(pins);

        self.record(DriverOp::Unsubscribe(pin_id))
    }

    fn reset_all(&self) -> Result<(), AppError> {
        self.pins
            .write()
            .map_err(|e| AppError::Driver(format!("lock poisoned: {e}")))?
            .clear();
        self.record(DriverOp::Reset)
    }
}
