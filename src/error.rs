/// Errors reported by the timer devices and their registration.
///
/// # Note
/// Register accesses are infallible. Only ownership, allocation and configuration problems are
/// reported.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The device was opened twice without being closed.
    #[error("Device already open")]
    AlreadyOpen,
    /// The operation requires an open device.
    #[error("Device not open")]
    NotOpen,
    /// The static channel state is already owned by another device.
    #[error("Channel state already in use")]
    StateInUse,
    /// The pending event queue is full and the event was dropped.
    #[error("Event queue full")]
    QueueFull,
    /// The device does not implement the operation.
    #[error("Unsupported operation")]
    Unsupported,
    /// A device with the same name is already registered.
    #[error("Duplicate device {0}")]
    DuplicateDevice(&'static str),
    /// The registry has no room for another device.
    #[error("Registry full")]
    RegistryFull,
    /// No channel of the selected board carries this name.
    #[error("Unknown channel")]
    UnknownChannel,
    /// Two channels of a configuration table share a DMA channel or timer.
    #[error("Conflict between {0} and {1}")]
    Conflict(&'static str, &'static str),
    /// The peripheral handed to a device is not the one its configuration names.
    #[error("Peripheral does not match configuration of {0}")]
    WrongPeripheral(&'static str),
    /// The settings could not be parsed.
    #[error("Invalid settings")]
    Settings,
}
