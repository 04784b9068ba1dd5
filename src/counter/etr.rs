///! External trigger (ETR) pulse counter.
///!
///! # Design
///! The timer counter is clocked by the ETR pin in external clock mode 2, so it counts the falling
///! edges of the input signal. The trigger filter is set to its lightest setting.
use arbitrary_int::u4;

use super::{Command, Extension};
use crate::device::Device;
use crate::hardware::{
    design_parameters::TIMER_PERIOD,
    gpio::{self, Pull},
    timers::{ClockDivision, CountMode, EtrPrescaler, TimeBase, TimerPeripheral},
    Peripheral, PinConfig, Platform, TimerId,
};
use crate::Error;

/// Static description of an ETR counting channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EtrConfig {
    pub name: &'static str,
    pub info: &'static str,
    pub timer: TimerId,
    /// The ETR pin and its connection to the timer.
    pub pin: PinConfig,
}

/// A pulse counter on the external trigger input of a timer.
pub struct EtrCounter<T> {
    config: EtrConfig,
    timer: T,
    extension: Extension,
    open: bool,
}

impl<T: TimerPeripheral> EtrCounter<T> {
    /// Construct the counter. `timer` must be `config.timer`.
    pub fn new(config: EtrConfig, timer: T) -> Result<Self, Error> {
        if timer.id() != config.timer {
            return Err(Error::WrongPeripheral(config.name));
        }
        Ok(Self {
            config,
            timer,
            extension: Extension::new(),
            open: false,
        })
    }

    pub fn config(&self) -> &EtrConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Overflows since the last read.
    pub fn overflows(&self) -> u32 {
        self.extension.overflows()
    }

    /// Handle the timer update interrupt. Call this from the timer update interrupt handler.
    pub fn on_update_interrupt(&self) {
        self.extension.on_update(self.config.name, &self.timer);
    }

    /// Read the pulse count since the last read and restart counting.
    pub fn take_count(&self) -> u32 {
        self.extension.take(&self.timer)
    }
}

impl<T: TimerPeripheral> Device for EtrCounter<T> {
    type Command = Command;

    fn name(&self) -> &'static str {
        self.config.name
    }

    fn info(&self) -> &'static str {
        self.config.info
    }

    fn open<P: Platform>(&mut self, platform: &mut P) -> Result<(), Error> {
        if self.open {
            return Err(Error::AlreadyOpen);
        }

        let config = self.config;
        platform.enable(Peripheral::Gpio(config.pin.pin.port));
        platform.enable(Peripheral::Afio);
        platform.enable(Peripheral::Timer(config.timer));
        gpio::configure_timer_input(platform, &config.pin, Pull::Up);

        let timer = &mut self.timer;
        timer.set_enabled(false);
        timer.set_time_base(TimeBase {
            prescaler: 0,
            period: TIMER_PERIOD,
            division: ClockDivision::Div1,
            mode: CountMode::Up,
        });

        // External clock mode 2: count falling ETR edges, lightly filtered.
        let smcr = timer
            .smcr()
            .with_etps(EtrPrescaler::Off)
            .with_etp(true)
            .with_etf(u4::new(1))
            .with_ece(true);
        timer.set_smcr(smcr);

        self.extension.start(timer);

        self.open = true;
        log::info!("ETR counter {} open: {}", config.name, config.info);
        Ok(())
    }

    fn close(&mut self) {
        self.extension.stop(&mut self.timer);
        self.open = false;
        log::info!("ETR counter {} closed", self.config.name);
    }

    fn control(&self, command: Command) -> Result<(), Error> {
        self.extension.control(self.open, &self.timer, command)
    }

    fn read(&self) -> Result<u32, Error> {
        if !self.open {
            return Err(Error::NotOpen);
        }
        Ok(self.take_count())
    }
}
