mod backend;
mod commands;
mod config;
mod device;
mod error;
mod events;
mod gpio;
mod polarity;
mod registry;
mod runner;
mod session;
pub mod shutdown;
mod watcher;

pub use commands::{Command, CommandDispatcher, parse_state};
pub use config::{AppConfig, Defaults, PinConfig, Pull};
pub use device::{Device, InputDevice, OutputDevice, PinLock};
pub use error::AppError;
pub use events::{EventSink, Outcome, StatusEvent};
pub use gpio::{
    EdgeHandler, EdgeKind, EventHandler, GpioBackend, PinSettings, RawEdge, SharedBackend,
};
pub use polarity::{
    InputState, Level, OutputState, from_electrical, output_from_electrical, to_electrical,
};
pub use registry::{Direction, PinDescriptor, PinMode, PinRegistry};
pub use runner::ExerciseRunner;
pub use session::Session;
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use watcher::{EdgeEvent, EdgeWatcher, WatchState};

#[cfg(feature = "hardware-gpio")]
pub use backend::LibgpiodBackend;
pub use backend::{DriverOp, MockGpioBackend};
