///! Peripheral clock gating.
///!
///! Every peripheral used by the drivers is gated by one bit in the enable register of its bus.
///! Enabling is a read-modify-write OR of that bit, so enabling an already-enabled peripheral has
///! no further effect.
use super::{dma::DmaId, gpio::Port, timers::TimerId};

/// Peripheral buses with an enable register.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Bus {
    Ahb,
    Apb1,
    Apb2,
}

/// Peripherals whose clocks are managed by the drivers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Peripheral {
    /// Alternate function IO and remap control.
    Afio,
    Gpio(Port),
    Timer(TimerId),
    Dma(DmaId),
}

impl Peripheral {
    /// The bus and enable-register bit gating the peripheral clock.
    pub fn gate(&self) -> (Bus, u32) {
        let (bus, bit) = match self {
            Self::Afio => (Bus::Apb2, 0),
            Self::Gpio(port) => (Bus::Apb2, 2 + *port as u32),
            Self::Timer(TimerId::Tim1) => (Bus::Apb2, 11),
            Self::Timer(TimerId::Tim8) => (Bus::Apb2, 13),
            Self::Timer(TimerId::Tim2) => (Bus::Apb1, 0),
            Self::Timer(TimerId::Tim3) => (Bus::Apb1, 1),
            Self::Timer(TimerId::Tim4) => (Bus::Apb1, 2),
            Self::Timer(TimerId::Tim5) => (Bus::Apb1, 3),
            Self::Timer(TimerId::Tim9) => (Bus::Apb1, 6),
            Self::Dma(DmaId::Dma1) => (Bus::Ahb, 0),
            Self::Dma(DmaId::Dma2) => (Bus::Ahb, 1),
        };
        (bus, 1 << bit)
    }
}

/// Access to the clock enable registers.
pub trait ClockControl {
    /// Set bits in a bus enable register.
    fn set_enable_bits(&mut self, bus: Bus, mask: u32);

    /// Enable the clock of a peripheral.
    fn enable(&mut self, peripheral: Peripheral) {
        let (bus, mask) = peripheral.gate();
        self.set_enable_bits(bus, mask);
        log::trace!("Clock enabled: {:?}", peripheral);
    }
}
