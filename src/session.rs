//! Process-wide claim over the configured pins.
//!
//! A [`Session`] is the only way to obtain bound devices. Releasing it drives
//! claimed outputs to logical OFF and resets the driver; this happens exactly
//! once, either through [`Session::release`] or when the session is dropped
//! on an unwinding path.

use std::sync::Arc;

use log::{info, warn};
use rustc_hash::FxHashMap;

use crate::device::{Device, OutputDevice, PinLock};
use crate::error::AppError;
use crate::gpio::SharedBackend;
use crate::registry::{PinDescriptor, PinRegistry};

pub struct Session {
    registry: Arc<PinRegistry>,
    backend: SharedBackend,
    locks: FxHashMap<u32, PinLock>,
    claimed: Vec<Device>,
    released: bool,
}

impl Session {
    pub fn new(registry: Arc<PinRegistry>, backend: SharedBackend) -> Self {
        let mut locks: FxHashMap<u32, PinLock> = FxHashMap::default();
        for (_, descriptor) in registry.all() {
            locks.entry(descriptor.pin_id).or_default();
        }
        Self {
            registry,
            backend,
            locks,
            claimed: Vec::new(),
            released: false,
        }
    }

    /// Configures every registered pin in registration order.
    pub fn configure_all(&mut self) -> Result<(), AppError> {
        let devices: Vec<Device> = self
            .registry
            .all()
            .map(|(_, descriptor)| self.bind(descriptor))
            .collect();
        for device in devices {
            device.configure()?;
            self.claimed.push(device);
        }
        info!("claimed {} GPIO line(s)", self.claimed.len());
        Ok(())
    }

    pub fn device(&self, name: &str) -> Result<Device, AppError> {
        let descriptor = self.registry.lookup(name)?;
        Ok(self.bind(descriptor))
    }

    pub fn outputs(&self) -> Vec<OutputDevice> {
        self.registry
            .outputs()
            .filter_map(|descriptor| match self.bind(descriptor) {
                Device::Output(d) => Some(d),
                Device::Input(_) => None,
            })
            .collect()
    }

    pub fn registry(&self) -> &PinRegistry {
        &self.registry
    }

    pub fn release(mut self) {
        self.teardown();
    }

    fn bind(&self, descriptor: &PinDescriptor) -> Device {
        let lock = self
            .locks
            .get(&descriptor.pin_id)
            .cloned()
            .unwrap_or_default();
        Device::bind(descriptor, self.backend.clone(), lock)
    }

    fn teardown(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        for device in &self.claimed {
            if let Device::Output(output) = device
                && let Err(e) = output.set(false)
            {
                warn!("failed to switch {} off during release: {e}", output.name());
            }
        }
        if let Err(e) = self.backend.reset_all() {
            warn!("driver reset failed: {e}");
        }
        info!("GPIO lines released");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}
