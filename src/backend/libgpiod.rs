use log::{debug, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, yield_now};
use std::time::Duration;

use libgpiod::{chip::Chip, line, line::EventClock, request};
use parking_lot::{FairMutex, RwLock};
use rustc_hash::FxHashMap;

use crate::config::Pull;
use crate::error::AppError;
use crate::gpio::{EdgeKind, EventHandler, GpioBackend, PinSettings, RawEdge};
use crate::polarity::Level;
use crate::registry::Direction;

const LIBGPIOD_BACKEND_EVENT_BUFFER_CAPACITY: usize = 64;
const LIBGPIOD_BACKEND_EVENT_WAIT_TIMEOUT_MS: Duration = Duration::from_millis(10);

/// Pins are line offsets on a single gpiochip.
pub struct LibgpiodBackend {
    chip: String,
    pins: RwLock<FxHashMap<u32, PinHandle>>, // keyed by line offset
}

struct PinHandle {
    listener: Option<EdgeListener>, // stopped before the request is released
    settings: PinSettings,
    gpiod_handle: Arc<FairMutex<GpiodHandle>>,
}

struct GpiodHandle {
    request: request::Request,
}

impl GpiodHandle {
    fn new(chip: &str, line_cfg: &line::Config) -> Result<Self, AppError> {
        let chip = Self::open_chip(chip)?;
        let request = Self::request_lines(&chip, line_cfg)?;
        Ok(Self { request })
    }

    fn open_chip(path: &str) -> Result<Chip, AppError> {
        let p = PathBuf::from(path);
        Chip::open(&p).map_err(|e| AppError::Driver(format!("open chip {path}: {e}")))
    }

    fn request_lines(chip: &Chip, line_cfg: &line::Config) -> Result<request::Request, AppError> {
        let mut req_cfg = request::Config::new()
            .map_err(|e| AppError::Driver(format!("request config: {e}")))?;
        req_cfg
            .set_consumer(env!("CARGO_PKG_NAME"))
            .map_err(|e| AppError::Driver(format!("request consumer: {e}")))?;
        chip.request_lines(Some(&req_cfg), line_cfg)
            .map_err(|e| AppError::Driver(format!("request lines: {e}")))
    }
}

struct EdgeListener {
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EdgeListener {
    fn new(
        pin_id: u32,
        gpiod_handle: Arc<FairMutex<GpiodHandle>>,
        handler: EventHandler,
    ) -> Result<Self, AppError> {
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_flag = cancel.clone();
        let mut buffer = request::Buffer::new(LIBGPIOD_BACKEND_EVENT_BUFFER_CAPACITY)
            .map_err(|e| AppError::Driver(format!("event buffer: {e}")))?;

        let handle = std::thread::spawn(move || {
            while !cancel_flag.load(Ordering::Relaxed) {
                let hdl = gpiod_handle.lock();
                let req = &hdl.request;

                let has_event =
                    match req.wait_edge_events(Some(LIBGPIOD_BACKEND_EVENT_WAIT_TIMEOUT_MS)) {
                        Ok(v) => v,
                        Err(e) => {
                            warn!("wait edge events error for pin {pin_id}: {e}");
                            drop(hdl);
                            yield_now();
                            continue;
                        }
                    };
                if !has_event {
                    drop(hdl);
                    yield_now();
                    continue;
                }

                let events = match req.read_edge_events(&mut buffer) {
                    Ok(evts) => evts,
                    Err(e) => {
                        warn!("read edge events error for pin {pin_id}: {e}");
                        drop(hdl);
                        yield_now();
                        continue;
                    }
                };
                for evt in events {
                    let Ok(evt) = evt else { continue };
                    let edge = match evt.event_type() {
                        Ok(line::EdgeKind::Rising) => EdgeKind::Rising,
                        Ok(line::EdgeKind::Falling) => EdgeKind::Falling,
                        Err(_) => continue,
                    };

                    handler.dispatch(RawEdge {
                        pin_id,
                        edge,
                        timestamp_ms: evt.timestamp().as_millis() as u64,
                    });
                }
            }
        });

        Ok(Self {
            cancel,
            handle: Some(handle),
        })
    }
}

impl Drop for EdgeListener {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl LibgpiodBackend {
    /// The chip is opened lazily, when the first line is configured.
    pub fn new(chip: impl Into<String>) -> Result<Self, AppError> {
        let chip = chip.into();
        if chip.is_empty() {
            return Err(AppError::Config("gpiochip path must not be empty".into()));
        }
        Ok(Self {
            chip,
            pins: RwLock::new(FxHashMap::default()),
        })
    }

    fn make_line_settings(
        settings: &PinSettings,
        edge: Option<(EdgeKind, u64)>,
    ) -> Result<line::Settings, AppError> {
        let mut ls = line::Settings::new()
            .map_err(|e| AppError::Driver(format!("libgpiod settings: {e}")))?;

        match settings.direction {
            Direction::Output => {
                ls.set_direction(line::Direction::Output)
                    .map_err(|e| AppError::Driver(format!("set direction: {e}")))?;
                ls.set_drive(line::Drive::PushPull)
                    .map_err(|e| AppError::Driver(format!("set drive: {e}")))?;
            }
            Direction::Input => {
                ls.set_direction(line::Direction::Input)
                    .map_err(|e| AppError::Driver(format!("set direction: {e}")))?;
                let bias = match settings.pull {
                    Pull::Up => Some(line::Bias::PullUp),
                    Pull::Down => Some(line::Bias::PullDown),
                    Pull::Floating => None,
                };
                ls.set_bias(bias)
                    .map_err(|e| AppError::Driver(format!("set bias: {e}")))?;
            }
        }

        if let Some((kind, debounce_ms)) = edge {
            let edge = match kind {
                EdgeKind::Rising => line::Edge::Rising,
                EdgeKind::Falling => line::Edge::Falling,
                EdgeKind::Both => line::Edge::Both,
            };
            ls.set_edge_detection(Some(edge))
                .map_err(|e| AppError::Driver(format!("set edge detection: {e}")))?;
            ls.set_event_clock(EventClock::Realtime)
                .map_err(|e| AppError::Driver(format!("set event clock: {e}")))?;
            ls.set_debounce_period(Duration::from_millis(debounce_ms));
        }

        Ok(ls)
    }

    fn make_line_config(offset: u32, settings: line::Settings) -> Result<line::Config, AppError> {
        let mut cfg =
            line::Config::new().map_err(|e| AppError::Driver(format!("line config: {e}")))?;
        cfg.add_line_settings(&[offset], settings)
            .map_err(|e| AppError::Driver(format!("line config add settings: {e}")))?;
        Ok(cfg)
    }

    fn reconfigure(
        handle: &PinHandle,
        pin_id: u32,
        edge: Option<(EdgeKind, u64)>,
    ) -> Result<(), AppError> {
        let line_settings = Self::make_line_settings(&handle.settings, edge)?;
        let line_cfg = Self::make_line_config(pin_id, line_settings)?;
        handle
            .gpiod_handle
            .lock()
            .request
            .reconfigure_lines(&line_cfg)
            .map_err(|e| AppError::Driver(format!("reconfigure lines: {e}")))
    }
}

fn to_value(level: Level) -> line::Value {
    match level {
        Level::High => line::Value::Active,
        Level::Low => line::Value::InActive,
    }
}

impl GpioBackend for LibgpiodBackend {
    fn configure(&self, pin_id: u32, settings: &PinSettings) -> Result<(), AppError> {
        let line_settings = Self::make_line_settings(settings, None)?;
        let line_cfg = Self::make_line_config(pin_id, line_settings)?;
        let gpiod_handle = GpiodHandle::new(&self.chip, &line_cfg)?;

        if settings.direction == Direction::Output {
            gpiod_handle
                .request
                .set_value(pin_id, to_value(settings.initial))
                .map_err(|e| AppError::Driver(format!("set initial value: {e}")))?;
        }

        // replacing an existing handle releases the previous line request
        self.pins.write().insert(
            pin_id,
            PinHandle {
                listener: None,
                settings: *settings,
                gpiod_handle: Arc::new(FairMutex::new(gpiod_handle)),
            },
        );
        debug!("configured line {pin_id} on {} as {:?}", self.chip, settings.direction);
        Ok(())
    }

    fn write(&self, pin_id: u32, level: Level) -> Result<(), AppError> {
        let pins = self.pins.read();
        let handle = pins
            .get(&pin_id)
            .ok_or_else(|| AppError::Driver(format!("line {pin_id} not requested")))?;

        if handle.settings.direction != Direction::Output {
            return Err(AppError::Driver(
                "pin must be in output mode to set value".into(),
            ));
        }

        handle
            .gpiod_handle
            .lock()
            .request
            .set_value(pin_id, to_value(level))
            .map_err(|e| AppError::Driver(format!("set value: {e}")))?;
        Ok(())
    }

    fn read(&self, pin_id: u32) -> Result<Level, AppError> {
        let pins = self.pins.read();
        let handle = pins
            .get(&pin_id)
            .ok_or_else(|| AppError::Driver(format!("line {pin_id} not requested")))?;

        let value = handle
            .gpiod_handle
            .lock()
            .request
            .value(pin_id)
            .map_err(|e| AppError::Driver(format!("get value: {e}")))?;
        Ok(match value {
            line::Value::InActive => Level::Low,
            line::Value::Active => Level::High,
        })
    }

    fn on_edge(
        &self,
        pin_id: u32,
        edge: EdgeKind,
        debounce_ms: u64,
        handler: EventHandler,
    ) -> Result<(), AppError> {
        let mut pins = self.pins.write();
        let handle = pins
            .get_mut(&pin_id)
            .ok_or_else(|| AppError::Driver(format!("line {pin_id} not requested")))?;

        if handle.settings.direction != Direction::Input {
            return Err(AppError::Driver(
                "edge detection requires an input line".into(),
            ));
        }

        // stop the previous listener before the line is reconfigured
        drop(handle.listener.take());
        Self::reconfigure(handle, pin_id, Some((edge, debounce_ms)))?;
        handle.listener = Some(EdgeListener::new(
            pin_id,
            handle.gpiod_handle.clone(),
            handler,
        )?);
        Ok(())
    }

    fn clear_edge(&self, pin_id: u32) -> Result<(), AppError> {
        let mut pins = self.pins.write();
        let Some(handle) = pins.get_mut(&pin_id) else {
            return Ok(());
        };

        if let Some(listener) = handle.listener.take() {
            drop(listener);
            Self::reconfigure(handle, pin_id, None)?;
        }
        Ok(())
    }

    fn reset_all(&self) -> Result<(), AppError> {
        let released = {
            let mut pins = self.pins.write();
            let count = pins.len();
            pins.clear();
            count
        };
        debug!("released {released} line request(s) on {}", self.chip);
        Ok(())
    }
}
