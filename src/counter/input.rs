///! Capture input pulse counter.
///!
///! # Design
///! The filtered TI1 or TI2 input of a timer drives the slave mode controller in external clock
///! mode 1, so every edge of the configured polarity advances the counter. The capture unit of
///! the input only conditions the signal (polarity and filter); its captures are unused.
use arbitrary_int::u4;

use super::{Command, Extension};
use crate::device::Device;
use crate::hardware::{
    design_parameters::TIMER_PERIOD,
    gpio::{self, Pull},
    timers::{
        CapturePrescaler, CaptureSelection, CaptureTimer, CaptureUnit, ClockDivision,
        CountMode, InputCapture, SlaveMode, TimeBase, TriggerSelect,
    },
    Peripheral, PinConfig, Platform, Polarity, TimerId,
};
use crate::Error;

/// The timer input clocking the counter.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClockInput {
    Ti1,
    Ti2,
}

impl ClockInput {
    /// The capture unit conditioning the input.
    pub fn unit(&self) -> CaptureUnit {
        match self {
            Self::Ti1 => CaptureUnit::Cc1,
            Self::Ti2 => CaptureUnit::Cc2,
        }
    }

    pub fn trigger(&self) -> TriggerSelect {
        match self {
            Self::Ti1 => TriggerSelect::Ti1fp1,
            Self::Ti2 => TriggerSelect::Ti2fp2,
        }
    }
}

/// Static description of a capture input counting channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InputConfig {
    pub name: &'static str,
    pub info: &'static str,
    pub timer: TimerId,
    pub input: ClockInput,
    /// The counted edge.
    pub polarity: Polarity,
    /// Input filter setting. Zero counts every edge.
    pub filter: u4,
    pub pin: PinConfig,
}

/// A pulse counter on a capture input of a timer.
pub struct InputCounter<T> {
    config: InputConfig,
    timer: T,
    extension: Extension,
    open: bool,
}

impl<T: CaptureTimer> InputCounter<T> {
    /// Construct the counter. `timer` must be `config.timer`.
    pub fn new(config: InputConfig, timer: T) -> Result<Self, Error> {
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

    pub fn config(&self) -> &InputConfig {
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

impl<T: CaptureTimer> Device for InputCounter<T> {
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
        // Pulled down so that an unconnected input does not count.
        gpio::configure_timer_input(platform, &config.pin, Pull::Down);

        let timer = &mut self.timer;
        timer.set_enabled(false);
        timer.set_time_base(TimeBase {
            prescaler: 0,
            period: TIMER_PERIOD,
            division: ClockDivision::Div1,
            mode: CountMode::Up,
        });

        let unit = config.input.unit();
        timer.configure_capture(
            unit,
            InputCapture {
                selection: CaptureSelection::Direct,
                polarity: config.polarity,
                prescaler: CapturePrescaler::Div1,
                filter: config.filter,
            },
        );
        timer.enable_capture(unit, true);

        let smcr = timer
            .smcr()
            .with_ts(config.input.trigger())
            .with_sms(SlaveMode::ExternalClock1);
        timer.set_smcr(smcr);
        log::debug!("{}: SMCR {:#06x}", config.name, smcr.raw_value());

        self.extension.start(timer);

        self.open = true;
        log::info!("Input counter {} open: {}", config.name, config.info);
        Ok(())
    }

    fn close(&mut self) {
        self.extension.stop(&mut self.timer);
        self.open = false;
        log::info!("Input counter {} closed", self.config.name);
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
