use std::fmt;
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::config::Pull;
use crate::error::AppError;
use crate::gpio::{GpioBackend, PinSettings, SharedBackend};
use crate::polarity::{self, InputState, Level, OutputState};
use crate::registry::{PinDescriptor, PinMode};

/// Serializes writes to one physical pin.
pub type PinLock = Arc<Mutex<()>>;

#[derive(Clone)]
pub struct OutputDevice {
    descriptor: PinDescriptor,
    active_high: bool,
    backend: SharedBackend,
    lock: PinLock,
}

impl OutputDevice {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn pin_id(&self) -> u32 {
        self.descriptor.pin_id
    }

    pub fn descriptor(&self) -> &PinDescriptor {
        &self.descriptor
    }

    /// Claims the line as an output driven to logical OFF.
    pub fn configure(&self) -> Result<(), AppError> {
        let initial = polarity::to_electrical(false, self.active_high);
        self.backend
            .configure(self.pin_id(), &PinSettings::output(initial))
    }

    pub fn set(&self, on: bool) -> Result<(), AppError> {
        let level = polarity::to_electrical(on, self.active_high);
        let _guard = self.lock.lock();
        debug!("{} -> {} ({level})", self.name(), OutputState::from(on));
        self.backend.write(self.pin_id(), level)
    }

    /// Reads the driven level back and translates it to ON/OFF.
    pub fn read_back(&self) -> Result<(Level, OutputState), AppError> {
        let level = {
            let _guard = self.lock.lock();
            self.backend.read(self.pin_id())?
        };
        let on = polarity::output_from_electrical(level, self.active_high);
        Ok((level, on.into()))
    }
}

impl fmt::Debug for OutputDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OutputDevice").field(&self.descriptor).finish()
    }
}

#[derive(Clone)]
pub struct InputDevice {
    descriptor: PinDescriptor,
    pull: Pull,
    active_low: bool,
    backend: SharedBackend,
}

impl InputDevice {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn pin_id(&self) -> u32 {
        self.descriptor.pin_id
    }

    pub fn descriptor(&self) -> &PinDescriptor {
        &self.descriptor
    }

    pub fn configure(&self) -> Result<(), AppError> {
        self.backend
            .configure(self.pin_id(), &PinSettings::input(self.pull))
    }

    pub fn read(&self) -> Result<bool, AppError> {
        let level = self.backend.read(self.pin_id())?;
        Ok(polarity::from_electrical(level, self.active_low))
    }

    /// Raw level together with its logical meaning.
    pub fn sample(&self) -> Result<(Level, InputState), AppError> {
        let level = self.backend.read(self.pin_id())?;
        Ok((level, self.translate(level)))
    }

    fn translate(&self, level: Level) -> InputState {
        polarity::from_electrical(level, self.active_low).into()
    }

    pub(crate) fn backend(&self) -> &dyn GpioBackend {
        self.backend.as_ref()
    }
}

impl fmt::Debug for InputDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InputDevice").field(&self.descriptor).finish()
    }
}

/// A configured pin, with only the operations its direction allows.
#[derive(Debug, Clone)]
pub enum Device {
    Input(InputDevice),
    Output(OutputDevice),
}

impl Device {
    pub fn bind(descriptor: &PinDescriptor, backend: SharedBackend, lock: PinLock) -> Self {
        let descriptor = descriptor.clone();
        match descriptor.mode {
            PinMode::Input { pull, active_low } => Device::Input(InputDevice {
                descriptor,
                pull,
                active_low,
                backend,
            }),
            PinMode::Output { active_high } => Device::Output(OutputDevice {
                descriptor,
                active_high,
                backend,
                lock,
            }),
        }
    }

    pub fn descriptor(&self) -> &PinDescriptor {
        match self {
            Device::Input(d) => d.descriptor(),
            Device::Output(d) => d.descriptor(),
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor().name
    }

    pub fn configure(&self) -> Result<(), AppError> {
        match self {
            Device::Input(d) => d.configure(),
            Device::Output(d) => d.configure(),
        }
    }

    pub fn set(&self, on: bool) -> Result<(), AppError> {
        self.as_output()?.set(on)
    }

    pub fn read(&self) -> Result<bool, AppError> {
        self.as_input()?.read()
    }

    pub fn as_output(&self) -> Result<&OutputDevice, AppError> {
        match self {
            Device::Output(d) => Ok(d),
            Device::Input(_) => Err(self.wrong_direction("watch")),
        }
    }

    pub fn as_input(&self) -> Result<&InputDevice, AppError> {
        match self {
            Device::Input(d) => Ok(d),
            Device::Output(_) => Err(self.wrong_direction("test or set")),
        }
    }

    pub fn into_input(self) -> Result<InputDevice, AppError> {
        match self {
            Device::Input(d) => Ok(d),
            Device::Output(_) => Err(self.wrong_direction("test or set")),
        }
    }

    fn wrong_direction(&self, hint: &'static str) -> AppError {
        let descriptor = self.descriptor();
        AppError::WrongDirection {
            name: descriptor.name.clone(),
            direction: descriptor.direction(),
            hint,
        }
    }
}
