///! Module for all hardware-specific abstractions of the timer board support.
pub mod clocks;
pub mod design_parameters;
pub mod dma;
pub mod gpio;
#[cfg(feature = "sim")]
pub mod sim;
pub mod timers;

pub use clocks::{Bus, ClockControl, Peripheral};
pub use dma::{DmaChannelId, DmaEvent, DmaId, DmaRequest, DmaRingChannel};
pub use gpio::{Pin, PinConfig, PinControl, PinFunction, Port, Remap};
pub use timers::{CaptureTimer, CaptureUnit, Polarity, TimerId, TimerPeripheral};

/// Everything needed from the board to bring up a timer device: clock gating and pin muxing.
pub trait Platform: ClockControl + PinControl {}

impl<T: ClockControl + PinControl> Platform for T {}
