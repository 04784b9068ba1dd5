///! Generic device interface and name registry.
///!
///! # Design
///! Every timer driver is exposed as a [Device]: it is opened against the board [Platform],
///! controlled with driver specific commands and closed again. Devices are looked up by name
///! through a fixed capacity [Registry].
use heapless::Vec;

use crate::{hardware::Platform, Error};

/// A timer device.
pub trait Device {
    /// Driver specific control commands.
    type Command;

    /// The unique name the device is registered under.
    fn name(&self) -> &'static str;

    /// Human readable description.
    fn info(&self) -> &'static str;

    /// Bring up the hardware and start the device.
    fn open<P: Platform>(&mut self, platform: &mut P) -> Result<(), Error>;

    /// Stop the device. Closing a closed device has no effect.
    fn close(&mut self);

    /// Issue a control command.
    fn control(&self, _command: Self::Command) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    /// Read the current device value.
    fn read(&self) -> Result<u32, Error> {
        Err(Error::Unsupported)
    }
}

/// A fixed capacity collection of uniquely named devices.
pub struct Registry<D, const M: usize> {
    devices: Vec<D, M>,
}

impl<D: Device, const M: usize> Registry<D, M> {
    pub const fn new() -> Self {
        Self {
            devices: Vec::new(),
        }
    }

    /// Add a device.
    ///
    /// # Returns
    /// The device back in the error if it could not be registered.
    pub fn register(&mut self, device: D) -> Result<(), (Error, D)> {
        let name = device.name();
        if self.find(name).is_some() {
            return Err((Error::DuplicateDevice(name), device));
        }

        self.devices
            .push(device)
            .map_err(|device| (Error::RegistryFull, device))?;
        log::info!("Registered {}", name);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&D> {
        self.devices.iter().find(|device| device.name() == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut D> {
        self.devices.iter_mut().find(|device| device.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &D> {
        self.devices.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut D> {
        self.devices.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl<D: Device, const M: usize> Default for Registry<D, M> {
    fn default() -> Self {
        Self::new()
    }
}
