use std::time::Duration;

use log::{debug, info};
use tokio::time;

use crate::device::{Device, OutputDevice};
use crate::error::AppError;
use crate::events::{EventSink, Outcome, StatusEvent};
use crate::polarity::OutputState;
use crate::shutdown::Shutdown;

/// Toggles outputs while honouring the shutdown signal between holds.
///
/// The runner never releases the driver itself; callers run it inside a
/// [`Session`](crate::session::Session) scope.
pub struct ExerciseRunner<'a> {
    sink: &'a dyn EventSink,
    shutdown: Shutdown,
}

impl<'a> ExerciseRunner<'a> {
    pub fn new(sink: &'a dyn EventSink, shutdown: Shutdown) -> Self {
        Self { sink, shutdown }
    }

    /// ON, hold, OFF, hold for each device in order, until cancelled.
    pub async fn cycle(
        &mut self,
        devices: &[OutputDevice],
        period: Duration,
    ) -> Result<Outcome, AppError> {
        if devices.is_empty() {
            self.sink
                .emit(StatusEvent::Warning(AppError::EmptyDeviceSet.to_string()));
            return Err(AppError::EmptyDeviceSet);
        }

        let names: Vec<String> = devices
            .iter()
            .map(|d| format!("{}(GPIO {})", d.name(), d.pin_id()))
            .collect();
        self.sink.emit(StatusEvent::Info(format!(
            "Cycling outputs: {}",
            names.join(", ")
        )));

        loop {
            for device in devices {
                for on in [true, false] {
                    if self.shutdown.is_cancelled() {
                        return Ok(self.interrupted());
                    }
                    self.switch(device, on, None)?;
                    if self.hold(period).await {
                        return Ok(self.interrupted());
                    }
                }
            }
        }
    }

    /// Exactly `cycles` ON/OFF pairs on one output.
    pub async fn test(
        &mut self,
        device: &Device,
        cycles: u32,
        period: Duration,
    ) -> Result<Outcome, AppError> {
        let output = device.as_output()?;
        if cycles == 0 {
            return Err(AppError::InvalidValue(
                "cycles must be at least 1".to_string(),
            ));
        }

        self.sink.emit(StatusEvent::Info(format!(
            "Testing OUTPUT {} (GPIO {}) for {cycles} cycles...",
            output.name(),
            output.pin_id()
        )));
        for cycle in 1..=cycles {
            for on in [true, false] {
                if self.shutdown.is_cancelled() {
                    return Ok(self.interrupted());
                }
                self.switch(output, on, Some(cycle))?;
                if self.hold(period).await {
                    return Ok(self.interrupted());
                }
            }
        }
        self.sink.emit(StatusEvent::Info(format!(
            "Completed testing {}.",
            output.name()
        )));
        Ok(Outcome::Completed)
    }

    /// Single write followed by a read-back; returns the confirmed state.
    pub fn set_once(&self, device: &Device, logical_on: bool) -> Result<bool, AppError> {
        let output = device.as_output()?;
        output.set(logical_on)?;
        let (level, state) = output.read_back()?;
        info!("{} confirmed {state} ({level})", output.name());
        self.sink.emit(StatusEvent::Confirmed {
            device: output.name().to_string(),
            pin_id: output.pin_id(),
            state,
            level,
        });
        Ok(state == OutputState::On)
    }

    fn switch(&self, device: &OutputDevice, on: bool, cycle: Option<u32>) -> Result<(), AppError> {
        self.sink.emit(StatusEvent::Output {
            device: device.name().to_string(),
            pin_id: device.pin_id(),
            state: on.into(),
            cycle,
        });
        device.set(on)
    }

    /// Returns true if the hold was cut short by shutdown.
    async fn hold(&mut self, period: Duration) -> bool {
        tokio::select! {
            _ = time::sleep(period) => false,
            _ = self.shutdown.cancelled() => true,
        }
    }

    fn interrupted(&self) -> Outcome {
        debug!("exercise loop interrupted");
        self.sink.emit(StatusEvent::Interrupted);
        Outcome::Cancelled
    }
}
