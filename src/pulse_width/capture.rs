///! PWM input capture configuration.
///!
///! # Design
///! A timer input is routed into both capture units of a pair. The primary unit captures on the
///! configured edge and records the period, the secondary unit captures the opposite edge of the
///! same input and records the pulse width. The filtered input also drives the slave mode
///! controller in reset mode, so the counter restarts on every primary edge and both captures are
///! counted from the start of the current period.
///!
///! Captures are not signalled by interrupt. The primary capture issues a DMA request instead,
///! see [super::ring].

use crate::hardware::{
    design_parameters::TIMER_PERIOD,
    timers::{
        CaptureSelection, CapturePrescaler, CaptureTimer, CaptureUnit,
        ClockDivision, CountMode, InputCapture, SlaveMode, TimeBase,
        TriggerSelect,
    },
};

use super::ChannelConfig;

/// The timer input channel measured in PWM input mode. Only the first two inputs of a timer can
/// drive the slave mode controller.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PwmInputChannel {
    Ch1,
    Ch2,
}

/// Word order of a capture pair in the ring, as produced by a CCR1-based burst.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PairOrder {
    /// `[period, width]`
    PeriodFirst,
    /// `[width, period]`
    WidthFirst,
}

impl PairOrder {
    /// Split a pair of ring words into `(width, period)`.
    pub fn decode(&self, first: u32, second: u32) -> (u32, u32) {
        match self {
            Self::PeriodFirst => (second, first),
            Self::WidthFirst => (first, second),
        }
    }
}

impl PwmInputChannel {
    /// The capture unit directly connected to the input. It latches the period.
    pub fn period_unit(&self) -> CaptureUnit {
        match self {
            Self::Ch1 => CaptureUnit::Cc1,
            Self::Ch2 => CaptureUnit::Cc2,
        }
    }

    /// The neighbouring capture unit. It latches the pulse width.
    pub fn width_unit(&self) -> CaptureUnit {
        match self {
            Self::Ch1 => CaptureUnit::Cc2,
            Self::Ch2 => CaptureUnit::Cc1,
        }
    }

    /// The filtered input that resets the counter.
    pub fn trigger(&self) -> TriggerSelect {
        match self {
            Self::Ch1 => TriggerSelect::Ti1fp1,
            Self::Ch2 => TriggerSelect::Ti2fp2,
        }
    }

    pub fn pair_order(&self) -> PairOrder {
        match self {
            Self::Ch1 => PairOrder::PeriodFirst,
            Self::Ch2 => PairOrder::WidthFirst,
        }
    }
}

/// Put the timer into PWM input mode for the configured channel.
///
/// The timer is left stopped, counting at the undivided timer clock divided by the configured
/// prescaler, with both capture units armed and no capture interrupts enabled.
pub fn configure<T: CaptureTimer>(config: &ChannelConfig, timer: &mut T) {
    timer.set_enabled(false);

    timer.set_time_base(TimeBase {
        prescaler: config.prescaler,
        period: TIMER_PERIOD,
        division: ClockDivision::Div1,
        mode: CountMode::Up,
    });

    let channel = config.channel;
    timer.configure_capture(
        channel.period_unit(),
        InputCapture {
            selection: CaptureSelection::Direct,
            polarity: config.polarity,
            prescaler: CapturePrescaler::Div1,
            filter: config.filter,
        },
    );
    timer.configure_capture(
        channel.width_unit(),
        InputCapture {
            selection: CaptureSelection::Indirect,
            polarity: config.polarity.opposite(),
            prescaler: CapturePrescaler::Div1,
            filter: config.filter,
        },
    );
    timer.enable_capture(channel.period_unit(), true);
    timer.enable_capture(channel.width_unit(), true);

    let smcr = timer
        .smcr()
        .with_ts(channel.trigger())
        .with_sms(SlaveMode::Reset);
    timer.set_smcr(smcr);
}
