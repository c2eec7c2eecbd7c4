use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};

use crate::config::Defaults;
use crate::error::AppError;
use crate::events::{EventSink, Outcome, StatusEvent};
use crate::gpio::SharedBackend;
use crate::registry::PinRegistry;
use crate::runner::ExerciseRunner;
use crate::session::Session;
use crate::shutdown::Shutdown;
use crate::watcher::EdgeWatcher;

/// One operator request. `None` durations fall back to the config defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Cycle {
        delay: Option<Duration>,
    },
    Test {
        pin: String,
        cycles: Option<u32>,
        delay: Option<Duration>,
    },
    Watch {
        pin: String,
        duration: Option<Duration>,
        debounce: Option<Duration>,
    },
    Set {
        pin: String,
        state: String,
    },
}

/// Parses `on|off|high|low|1|0|true|false`, case-insensitively.
pub fn parse_state(raw: &str) -> Result<bool, AppError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "on" | "high" | "1" | "true" => Ok(true),
        "off" | "low" | "0" | "false" => Ok(false),
        _ => Err(AppError::InvalidValue(format!(
            "unknown state '{raw}', expected on|off|high|low|1|0|true|false"
        ))),
    }
}

pub struct CommandDispatcher {
    registry: Arc<PinRegistry>,
    backend: SharedBackend,
    defaults: Defaults,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<PinRegistry>, backend: SharedBackend, defaults: Defaults) -> Self {
        Self {
            registry,
            backend,
            defaults,
        }
    }

    pub fn registry(&self) -> &PinRegistry {
        &self.registry
    }

    /// Runs `command`. Every command except `list` claims the driver first
    /// and releases it before returning, whatever the result.
    pub async fn execute(
        &self,
        command: Command,
        shutdown: Shutdown,
        sink: &dyn EventSink,
    ) -> Result<Outcome, AppError> {
        if command == Command::List {
            self.list(sink);
            return Ok(Outcome::Completed);
        }

        let mut session = Session::new(self.registry.clone(), self.backend.clone());
        let result = match session.configure_all() {
            Ok(()) => self.run(&session, command, shutdown, sink).await,
            Err(e) => Err(e),
        };
        session.release();
        sink.emit(StatusEvent::Released);

        match &result {
            Ok(outcome) => info!("command finished: {outcome:?}"),
            Err(AppError::EmptyDeviceSet) => warn!("{}", AppError::EmptyDeviceSet),
            Err(e) => error!("command failed: {e}"),
        }
        result
    }

    pub fn list(&self, sink: &dyn EventSink) {
        sink.emit(StatusEvent::Info("Available pins:".to_string()));
        for (_, descriptor) in self.registry.all() {
            sink.emit(StatusEvent::Pin(descriptor.clone()));
        }
    }

    async fn run(
        &self,
        session: &Session,
        command: Command,
        mut shutdown: Shutdown,
        sink: &dyn EventSink,
    ) -> Result<Outcome, AppError> {
        match command {
            Command::List => {
                self.list(sink);
                Ok(Outcome::Completed)
            }
            Command::Cycle { delay } => {
                let delay = delay.unwrap_or_else(|| self.defaults.delay());
                ExerciseRunner::new(sink, shutdown)
                    .cycle(&session.outputs(), delay)
                    .await
            }
            Command::Test { pin, cycles, delay } => {
                let device = session.device(&pin)?;
                let cycles = cycles.unwrap_or(self.defaults.cycles);
                let delay = delay.unwrap_or_else(|| self.defaults.delay());
                ExerciseRunner::new(sink, shutdown)
                    .test(&device, cycles, delay)
                    .await
            }
            Command::Watch {
                pin,
                duration,
                debounce,
            } => {
                let device = session.device(&pin)?;
                let pin_id = device.descriptor().pin_id;
                let mut watcher = EdgeWatcher::for_device(device)?;
                let duration = duration.unwrap_or_else(|| self.defaults.watch_duration());
                let debounce = debounce.unwrap_or_else(|| self.defaults.debounce());
                sink.emit(StatusEvent::Info(format!(
                    "Watching INPUT {pin} (GPIO {pin_id}) for {:.1}s (debounce={}ms)",
                    duration.as_secs_f64(),
                    debounce.as_millis()
                )));
                let outcome = watcher
                    .watch(
                        duration,
                        debounce,
                        self.defaults.snapshot_interval(),
                        &mut shutdown,
                        sink,
                    )
                    .await?;
                match outcome {
                    Outcome::Cancelled => sink.emit(StatusEvent::Interrupted),
                    _ => sink.emit(StatusEvent::Info("Done watching input.".to_string())),
                }
                Ok(outcome)
            }
            Command::Set { pin, state } => {
                let device = session.device(&pin)?;
                let on = parse_state(&state)?;
                ExerciseRunner::new(sink, shutdown).set_once(&device, on)?;
                Ok(Outcome::Completed)
            }
        }
    }
}
