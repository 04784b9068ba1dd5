///! GPIO configuration needed by the timer inputs.

/// GPIO ports.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Port {
    A = 0,
    B = 1,
    C = 2,
    D = 3,
    E = 4,
    F = 5,
    G = 6,
}

/// A single GPIO pin.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Pin {
    pub port: Port,
    pub index: u8,
}

impl Pin {
    pub const fn new(port: Port, index: u8) -> Self {
        assert!(index < 16);
        Self { port, index }
    }
}

/// AFIO remaps applied globally on parts with a remap controller.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Remap {
    /// Full remap of TIM1 (ETR onto PE7, CH1 and CH2 onto PE9 and PE11).
    Tim1Full,
    /// Partial remap 1 of TIM2 (CH1/ETR onto PA15, CH2 onto PB3).
    Tim2Partial1,
    /// Full remap of TIM2 (CH1/ETR onto PA15, CH2 onto PB3, CH3 and CH4 onto PB10 and PB11).
    Tim2Full,
    /// Partial remap of TIM3 (CH1 and CH2 onto PB4 and PB5).
    Tim3Partial,
    /// Full remap of TIM3 (CH1 and CH2 onto PC6 and PC7).
    Tim3Full,
    /// Remap of TIM4 (CH1 and CH2 onto PD12 and PD13).
    Tim4Full,
    /// Remap 1 of TIM8 (ETR onto PB4).
    Tim8Remap1,
    /// Remap 3 of TIM8 (CH1 and CH2 onto PD14 and PD15).
    Tim8Remap3,
    /// JTAG-DP disabled, SW-DP enabled. Frees PA15, PB3 and PB4.
    SwjJtagOff,
}

/// How a pin is connected to its timer input.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PinFunction {
    /// The reset mapping, nothing to configure.
    Default,
    /// Through an AFIO remap.
    Remap(Remap),
    /// Through a per-pin alternate function number.
    Alternate(u8),
}

/// Input conditioning of a pin.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Pull {
    None,
    Up,
    Down,
}

/// A pin and its connection to a timer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PinConfig {
    pub pin: Pin,
    pub function: PinFunction,
}

impl PinConfig {
    pub const fn new(port: Port, index: u8, function: PinFunction) -> Self {
        Self {
            pin: Pin::new(port, index),
            function,
        }
    }
}

/// Access to the GPIO and AFIO registers.
pub trait PinControl {
    /// Configure a pin as input. An alternate function, if any, is selected on the pin.
    fn configure_input(&mut self, pin: Pin, pull: Pull, function: PinFunction);

    /// Apply an AFIO remap.
    fn apply_remap(&mut self, remap: Remap);
}

/// Check if the pin is shared with the JTAG debug port and requires the JTAG-DP to be released.
pub fn needs_jtag_release(pin: Pin) -> bool {
    matches!(
        (pin.port, pin.index),
        (Port::A, 15) | (Port::B, 3) | (Port::B, 4)
    )
}

/// Configure a timer input pin with its remap and JTAG release applied.
pub fn configure_timer_input<P: PinControl>(gpio: &mut P, config: &PinConfig, pull: Pull) {
    gpio.configure_input(config.pin, pull, config.function);

    if let PinFunction::Remap(remap) = config.function {
        log::debug!("Applying remap {:?}", remap);
        gpio.apply_remap(remap);
    }

    if needs_jtag_release(config.pin) {
        log::debug!("Releasing JTAG for {:?}", config.pin);
        gpio.apply_remap(Remap::SwjJtagOff);
    }
}
