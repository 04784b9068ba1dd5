///! Board variants, their channel tables and startup settings.
///!
///! # Design
///! Every supported part has a compiled-in catalog of the measurement channels it can offer:
///! which timer, pin, pin function and DMA channel each one uses. Several catalog entries may
///! describe alternative pins of the same timer, and the same timer may appear in several kinds
///! of channel. The enabled subset is selected by name at
///! startup through [Settings] and checked with [validate] before any device is constructed.
use arbitrary_int::u4;
use fugit::HertzU32;
use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

use crate::counter::{ClockInput, EtrConfig, InputConfig};
use crate::hardware::{
    design_parameters::{N32G45X_TIMER_CLOCK, N32L40X_TIMER_CLOCK},
    dma::{DmaChannelId, DmaId, DmaRequest},
    Pin, PinConfig, PinFunction, Polarity, Port, Remap, TimerId,
};
use crate::pulse_width::{ChannelConfig, DmaConfig, PwmInputChannel};
use crate::Error;

/// Maximum number of pulse-width channels enabled at once.
pub const MAX_PULSE_CHANNELS: usize = 4;

/// Maximum number of ETR counters enabled at once.
pub const MAX_ETR_CHANNELS: usize = 8;

/// Maximum number of capture input counters enabled at once.
pub const MAX_INPUT_CHANNELS: usize = 8;

/// Supported parts.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Board {
    N32g45x,
    N32l40x,
}

const fn pulse(
    name: &'static str,
    info: &'static str,
    timer: TimerId,
    pin: PinConfig,
    channel: DmaChannelId,
    request: DmaRequest,
) -> ChannelConfig {
    ChannelConfig {
        name,
        info,
        timer,
        channel: PwmInputChannel::Ch1,
        prescaler: 0,
        polarity: Polarity::Rising,
        filter: u4::new(0),
        pin,
        dma: DmaConfig { channel, request },
    }
}

const fn etr(
    name: &'static str,
    info: &'static str,
    timer: TimerId,
    pin: PinConfig,
) -> EtrConfig {
    EtrConfig {
        name,
        info,
        timer,
        pin,
    }
}

const fn input(
    name: &'static str,
    info: &'static str,
    timer: TimerId,
    input: ClockInput,
    pin: PinConfig,
) -> InputConfig {
    InputConfig {
        name,
        info,
        timer,
        input,
        polarity: Polarity::Rising,
        filter: u4::new(0),
        pin,
    }
}

const fn dma(controller: DmaId, channel: u8) -> DmaChannelId {
    DmaChannelId {
        controller,
        channel,
    }
}

const N32G45X_PULSE: &[ChannelConfig] = &[
    pulse(
        "pulse1",
        "TIM1 PA8",
        TimerId::Tim1,
        PinConfig::new(Port::A, 8, PinFunction::Default),
        dma(DmaId::Dma1, 2),
        DmaRequest::Tim1Ch1,
    ),
    pulse(
        "pulse4",
        "TIM4 PB6",
        TimerId::Tim4,
        PinConfig::new(Port::B, 6, PinFunction::Default),
        dma(DmaId::Dma1, 1),
        DmaRequest::Tim4Ch1,
    ),
    pulse(
        "pulse8",
        "TIM8 PC6",
        TimerId::Tim8,
        PinConfig::new(Port::C, 6, PinFunction::Default),
        dma(DmaId::Dma2, 3),
        DmaRequest::Tim8Ch1,
    ),
];

const N32G45X_ETR: &[EtrConfig] = &[
    etr(
        "etr1_pa12",
        "TIM1 PA12",
        TimerId::Tim1,
        PinConfig::new(Port::A, 12, PinFunction::Default),
    ),
    etr(
        "etr1_pe7",
        "TIM1 PE7",
        TimerId::Tim1,
        PinConfig::new(Port::E, 7, PinFunction::Remap(Remap::Tim1Full)),
    ),
    etr(
        "etr2_pa0",
        "TIM2 PA0",
        TimerId::Tim2,
        PinConfig::new(Port::A, 0, PinFunction::Default),
    ),
    etr(
        "etr2_pa15",
        "TIM2 PA15",
        TimerId::Tim2,
        PinConfig::new(Port::A, 15, PinFunction::Remap(Remap::Tim2Partial1)),
    ),
    etr(
        "etr3_pd2",
        "TIM3 PD2",
        TimerId::Tim3,
        PinConfig::new(Port::D, 2, PinFunction::Default),
    ),
    etr(
        "etr4_pe0",
        "TIM4 PE0",
        TimerId::Tim4,
        PinConfig::new(Port::E, 0, PinFunction::Default),
    ),
    etr(
        "etr8_pa0",
        "TIM8 PA0",
        TimerId::Tim8,
        PinConfig::new(Port::A, 0, PinFunction::Default),
    ),
    etr(
        "etr8_pb4",
        "TIM8 PB4",
        TimerId::Tim8,
        PinConfig::new(Port::B, 4, PinFunction::Remap(Remap::Tim8Remap1)),
    ),
];

const N32L40X_ETR: &[EtrConfig] = &[
    etr(
        "etr1_pa12",
        "TIM1 PA12",
        TimerId::Tim1,
        PinConfig::new(Port::A, 12, PinFunction::Alternate(2)),
    ),
    etr(
        "etr2_pa0",
        "TIM2 PA0",
        TimerId::Tim2,
        PinConfig::new(Port::A, 0, PinFunction::Alternate(5)),
    ),
    etr(
        "etr2_pa15",
        "TIM2 PA15",
        TimerId::Tim2,
        PinConfig::new(Port::A, 15, PinFunction::Alternate(2)),
    ),
    etr(
        "etr3_pd2",
        "TIM3 PD2",
        TimerId::Tim3,
        PinConfig::new(Port::D, 2, PinFunction::Alternate(2)),
    ),
    etr(
        "etr9_pb2",
        "TIM9 PB2",
        TimerId::Tim9,
        PinConfig::new(Port::B, 2, PinFunction::Alternate(1)),
    ),
];

const N32G45X_INPUT: &[InputConfig] = &[
    input(
        "eclk1_pa8",
        "TIM1 PA8",
        TimerId::Tim1,
        ClockInput::Ti1,
        PinConfig::new(Port::A, 8, PinFunction::Default),
    ),
    input(
        "eclk1_pe9",
        "TIM1 PE9",
        TimerId::Tim1,
        ClockInput::Ti1,
        PinConfig::new(Port::E, 9, PinFunction::Remap(Remap::Tim1Full)),
    ),
    input(
        "eclk1_pa9",
        "TIM1 PA9",
        TimerId::Tim1,
        ClockInput::Ti2,
        PinConfig::new(Port::A, 9, PinFunction::Default),
    ),
    input(
        "eclk1_pe11",
        "TIM1 PE11",
        TimerId::Tim1,
        ClockInput::Ti2,
        PinConfig::new(Port::E, 11, PinFunction::Remap(Remap::Tim1Full)),
    ),
    input(
        "eclk2_pa0",
        "TIM2 PA0",
        TimerId::Tim2,
        ClockInput::Ti1,
        PinConfig::new(Port::A, 0, PinFunction::Default),
    ),
    input(
        "eclk2_pa15",
        "TIM2 PA15",
        TimerId::Tim2,
        ClockInput::Ti1,
        PinConfig::new(Port::A, 15, PinFunction::Remap(Remap::Tim2Full)),
    ),
    input(
        "eclk2_pa1",
        "TIM2 PA1",
        TimerId::Tim2,
        ClockInput::Ti2,
        PinConfig::new(Port::A, 1, PinFunction::Default),
    ),
    input(
        "eclk2_pb3",
        "TIM2 PB3",
        TimerId::Tim2,
        ClockInput::Ti2,
        PinConfig::new(Port::B, 3, PinFunction::Remap(Remap::Tim2Full)),
    ),
    input(
        "eclk3_pa6",
        "TIM3 PA6",
        TimerId::Tim3,
        ClockInput::Ti1,
        PinConfig::new(Port::A, 6, PinFunction::Default),
    ),
    input(
        "eclk3_pb4",
        "TIM3 PB4",
        TimerId::Tim3,
        ClockInput::Ti1,
        PinConfig::new(Port::B, 4, PinFunction::Remap(Remap::Tim3Partial)),
    ),
    input(
        "eclk3_pc6",
        "TIM3 PC6",
        TimerId::Tim3,
        ClockInput::Ti1,
        PinConfig::new(Port::C, 6, PinFunction::Remap(Remap::Tim3Full)),
    ),
    input(
        "eclk3_pa7",
        "TIM3 PA7",
        TimerId::Tim3,
        ClockInput::Ti2,
        PinConfig::new(Port::A, 7, PinFunction::Default),
    ),
    input(
        "eclk3_pb5",
        "TIM3 PB5",
        TimerId::Tim3,
        ClockInput::Ti2,
        PinConfig::new(Port::B, 5, PinFunction::Remap(Remap::Tim3Partial)),
    ),
    input(
        "eclk3_pc7",
        "TIM3 PC7",
        TimerId::Tim3,
        ClockInput::Ti2,
        PinConfig::new(Port::C, 7, PinFunction::Remap(Remap::Tim3Full)),
    ),
    input(
        "eclk4_pb6",
        "TIM4 PB6",
        TimerId::Tim4,
        ClockInput::Ti1,
        PinConfig::new(Port::B, 6, PinFunction::Default),
    ),
    input(
        "eclk4_pd12",
        "TIM4 PD12",
        TimerId::Tim4,
        ClockInput::Ti1,
        PinConfig::new(Port::D, 12, PinFunction::Remap(Remap::Tim4Full)),
    ),
    input(
        "eclk4_pb7",
        "TIM4 PB7",
        TimerId::Tim4,
        ClockInput::Ti2,
        PinConfig::new(Port::B, 7, PinFunction::Default),
    ),
    input(
        "eclk4_pd13",
        "TIM4 PD13",
        TimerId::Tim4,
        ClockInput::Ti2,
        PinConfig::new(Port::D, 13, PinFunction::Remap(Remap::Tim4Full)),
    ),
    input(
        "eclk5_pa0",
        "TIM5 PA0",
        TimerId::Tim5,
        ClockInput::Ti1,
        PinConfig::new(Port::A, 0, PinFunction::Default),
    ),
    input(
        "eclk5_pa1",
        "TIM5 PA1",
        TimerId::Tim5,
        ClockInput::Ti2,
        PinConfig::new(Port::A, 1, PinFunction::Default),
    ),
    input(
        "eclk8_pc6",
        "TIM8 PC6",
        TimerId::Tim8,
        ClockInput::Ti1,
        PinConfig::new(Port::C, 6, PinFunction::Default),
    ),
    input(
        "eclk8_pd14",
        "TIM8 PD14",
        TimerId::Tim8,
        ClockInput::Ti1,
        PinConfig::new(Port::D, 14, PinFunction::Remap(Remap::Tim8Remap3)),
    ),
    input(
        "eclk8_pc7",
        "TIM8 PC7",
        TimerId::Tim8,
        ClockInput::Ti2,
        PinConfig::new(Port::C, 7, PinFunction::Default),
    ),
    input(
        "eclk8_pd15",
        "TIM8 PD15",
        TimerId::Tim8,
        ClockInput::Ti2,
        PinConfig::new(Port::D, 15, PinFunction::Remap(Remap::Tim8Remap3)),
    ),
];

const N32L40X_INPUT: &[InputConfig] = &[
    input(
        "eclk1_pa8",
        "TIM1 PA8",
        TimerId::Tim1,
        ClockInput::Ti1,
        PinConfig::new(Port::A, 8, PinFunction::Alternate(2)),
    ),
    input(
        "eclk2_pa0",
        "TIM2 PA0",
        TimerId::Tim2,
        ClockInput::Ti1,
        PinConfig::new(Port::A, 0, PinFunction::Alternate(2)),
    ),
    input(
        "eclk2_pa15",
        "TIM2 PA15",
        TimerId::Tim2,
        ClockInput::Ti1,
        PinConfig::new(Port::A, 15, PinFunction::Alternate(5)),
    ),
    input(
        "eclk2_pa1",
        "TIM2 PA1",
        TimerId::Tim2,
        ClockInput::Ti2,
        PinConfig::new(Port::A, 1, PinFunction::Alternate(2)),
    ),
    input(
        "eclk2_pb3",
        "TIM2 PB3",
        TimerId::Tim2,
        ClockInput::Ti2,
        PinConfig::new(Port::B, 3, PinFunction::Alternate(2)),
    ),
    input(
        "eclk3_pa6",
        "TIM3 PA6",
        TimerId::Tim3,
        ClockInput::Ti1,
        PinConfig::new(Port::A, 6, PinFunction::Alternate(2)),
    ),
    input(
        "eclk3_pb4",
        "TIM3 PB4",
        TimerId::Tim3,
        ClockInput::Ti1,
        PinConfig::new(Port::B, 4, PinFunction::Alternate(5)),
    ),
    input(
        "eclk3_pc6",
        "TIM3 PC6",
        TimerId::Tim3,
        ClockInput::Ti1,
        PinConfig::new(Port::C, 6, PinFunction::Alternate(5)),
    ),
    input(
        "eclk3_pa7",
        "TIM3 PA7",
        TimerId::Tim3,
        ClockInput::Ti2,
        PinConfig::new(Port::A, 7, PinFunction::Alternate(2)),
    ),
    input(
        "eclk3_pb5",
        "TIM3 PB5",
        TimerId::Tim3,
        ClockInput::Ti2,
        PinConfig::new(Port::B, 5, PinFunction::Alternate(2)),
    ),
    input(
        "eclk3_pc7",
        "TIM3 PC7",
        TimerId::Tim3,
        ClockInput::Ti2,
        PinConfig::new(Port::C, 7, PinFunction::Alternate(2)),
    ),
];

impl Board {
    /// All pulse-width channels the part offers.
    pub fn pulse_channels(&self) -> &'static [ChannelConfig] {
        match self {
            Self::N32g45x => N32G45X_PULSE,
            // No DMA request remapping for the timer captures.
            Self::N32l40x => &[],
        }
    }

    /// All ETR counter pins the part offers.
    pub fn etr_channels(&self) -> &'static [EtrConfig] {
        match self {
            Self::N32g45x => N32G45X_ETR,
            Self::N32l40x => N32L40X_ETR,
        }
    }

    /// All capture input counter pins the part offers.
    pub fn input_channels(&self) -> &'static [InputConfig] {
        match self {
            Self::N32g45x => N32G45X_INPUT,
            Self::N32l40x => N32L40X_INPUT,
        }
    }

    /// Kernel clock of the timers.
    pub fn timer_clock(&self) -> HertzU32 {
        match self {
            Self::N32g45x => N32G45X_TIMER_CLOCK,
            Self::N32l40x => N32L40X_TIMER_CLOCK,
        }
    }

    pub fn find_pulse(&self, name: &str) -> Result<&'static ChannelConfig, Error> {
        self.pulse_channels()
            .iter()
            .find(|c| c.name == name)
            .ok_or(Error::UnknownChannel)
    }

    pub fn find_etr(&self, name: &str) -> Result<&'static EtrConfig, Error> {
        self.etr_channels()
            .iter()
            .find(|c| c.name == name)
            .ok_or(Error::UnknownChannel)
    }

    pub fn find_input(&self, name: &str) -> Result<&'static InputConfig, Error> {
        self.input_channels()
            .iter()
            .find(|c| c.name == name)
            .ok_or(Error::UnknownChannel)
    }
}

/// The hardware a channel occupies.
#[derive(Copy, Clone)]
struct Resources {
    name: &'static str,
    timer: TimerId,
    pin: Pin,
    dma: Option<DmaChannelId>,
}

impl Resources {
    fn pulse(config: &ChannelConfig) -> Self {
        Self {
            name: config.name,
            timer: config.timer,
            pin: config.pin.pin,
            dma: Some(config.dma.channel),
        }
    }

    fn etr(config: &EtrConfig) -> Self {
        Self {
            name: config.name,
            timer: config.timer,
            pin: config.pin.pin,
            dma: None,
        }
    }

    fn input(config: &InputConfig) -> Self {
        Self {
            name: config.name,
            timer: config.timer,
            pin: config.pin.pin,
            dma: None,
        }
    }

    fn conflicts(&self, other: &Self) -> bool {
        self.timer == other.timer
            || self.pin == other.pin
            || (self.dma.is_some() && self.dma == other.dma)
    }
}

/// Check a channel selection for shared resources.
///
/// No two devices may use the same timer or the same pin, and no two pulse-width channels may
/// share a DMA channel.
///
/// # Returns
/// The names of the first conflicting pair in [Error::Conflict].
pub fn validate(
    pulse: &[ChannelConfig],
    etr: &[EtrConfig],
    input: &[InputConfig],
) -> Result<(), Error> {
    let all = pulse
        .iter()
        .map(Resources::pulse)
        .chain(etr.iter().map(Resources::etr))
        .chain(input.iter().map(Resources::input));

    for (i, a) in all.clone().enumerate() {
        if let Some(b) = all.clone().skip(i + 1).find(|b| a.conflicts(b)) {
            return Err(Error::Conflict(a.name, b.name));
        }
    }

    Ok(())
}

/// Startup configuration choosing the board and its enabled channels.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub board: Board,
    /// Names of the enabled pulse-width channels.
    pub pulse: Vec<String<16>, MAX_PULSE_CHANNELS>,
    /// Names of the enabled ETR counters.
    pub etr: Vec<String<16>, MAX_ETR_CHANNELS>,
    /// Names of the enabled capture input counters.
    #[serde(default)]
    pub input: Vec<String<16>, MAX_INPUT_CHANNELS>,
}

/// The channel configurations selected by [Settings].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    pub pulse: Vec<ChannelConfig, MAX_PULSE_CHANNELS>,
    pub etr: Vec<EtrConfig, MAX_ETR_CHANNELS>,
    pub input: Vec<InputConfig, MAX_INPUT_CHANNELS>,
}

impl Settings {
    /// Parse settings from JSON.
    pub fn from_json(json: &[u8]) -> Result<Self, Error> {
        let (settings, _) =
            serde_json_core::from_slice::<Self>(json).map_err(|e| {
                log::error!("Invalid settings: {:?}", e);
                Error::Settings
            })?;
        Ok(settings)
    }

    /// Resolve the enabled channel names and validate the selection.
    pub fn select(&self) -> Result<Selection, Error> {
        let mut selection = Selection {
            pulse: Vec::new(),
            etr: Vec::new(),
            input: Vec::new(),
        };

        for name in &self.pulse {
            let config = self.board.find_pulse(name)?;
            // Capacity matches the settings vector.
            selection.pulse.push(*config).ok();
        }
        for name in &self.etr {
            let config = self.board.find_etr(name)?;
            selection.etr.push(*config).ok();
        }
        for name in &self.input {
            let config = self.board.find_input(name)?;
            selection.input.push(*config).ok();
        }

        validate(&selection.pulse, &selection.etr, &selection.input)?;
        log::info!(
            "{:?}: {} pulse width, {} ETR, {} input counter channels",
            self.board,
            selection.pulse.len(),
            selection.etr.len(),
            selection.input.len()
        );
        Ok(selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulse_tables_are_conflict_free() {
        for board in [Board::N32g45x, Board::N32l40x] {
            assert_eq!(validate(board.pulse_channels(), &[], &[]), Ok(()));
        }
    }

    #[test]
    fn alternative_pins_conflict() {
        let board = Board::N32g45x;
        let a = *board.find_etr("etr1_pa12").unwrap();
        let b = *board.find_etr("etr1_pe7").unwrap();
        assert_eq!(
            validate(&[], &[a, b], &[]),
            Err(Error::Conflict("etr1_pa12", "etr1_pe7"))
        );

        // TIM2 and TIM8 share PA0.
        let a = *board.find_etr("etr2_pa0").unwrap();
        let b = *board.find_etr("etr8_pa0").unwrap();
        assert!(validate(&[], &[a, b], &[]).is_err());

        let pulse = *board.find_pulse("pulse4").unwrap();
        let etr = *board.find_etr("etr4_pe0").unwrap();
        assert_eq!(
            validate(&[pulse], &[etr], &[]),
            Err(Error::Conflict("pulse4", "etr4_pe0"))
        );
    }

    #[test]
    fn one_pin_per_timer_validates() {
        for board in [Board::N32g45x, Board::N32l40x] {
            let mut seen: Vec<EtrConfig, MAX_ETR_CHANNELS> = Vec::new();
            for config in board.etr_channels() {
                if !seen
                    .iter()
                    .any(|s| s.timer == config.timer || s.pin.pin == config.pin.pin)
                {
                    seen.push(*config).unwrap();
                }
            }
            assert_eq!(validate(&[], &seen, &[]), Ok(()));

            let mut seen: Vec<InputConfig, MAX_INPUT_CHANNELS> = Vec::new();
            for config in board.input_channels() {
                if !seen
                    .iter()
                    .any(|s| s.timer == config.timer || s.pin.pin == config.pin.pin)
                {
                    seen.push(*config).unwrap();
                }
            }
            assert_eq!(validate(&[], &[], &seen), Ok(()));
        }
    }

    #[test]
    fn input_counters_share_timers_and_pins() {
        let board = Board::N32g45x;
        let pulse = *board.find_pulse("pulse1").unwrap();
        let input = *board.find_input("eclk1_pa8").unwrap();
        assert_eq!(
            validate(&[pulse], &[], &[input]),
            Err(Error::Conflict("pulse1", "eclk1_pa8"))
        );

        // TIM3 on PC6 against TIM8 on PC6.
        let a = *board.find_input("eclk3_pc6").unwrap();
        let b = *board.find_input("eclk8_pc6").unwrap();
        assert_eq!(
            validate(&[], &[], &[a, b]),
            Err(Error::Conflict("eclk3_pc6", "eclk8_pc6"))
        );

        let etr = *board.find_etr("etr2_pa0").unwrap();
        let input = *board.find_input("eclk5_pa1").unwrap();
        assert_eq!(validate(&[], &[etr], &[input]), Ok(()));

        let l40x = Board::N32l40x.find_input("eclk3_pb4").unwrap();
        assert_eq!(l40x.input, ClockInput::Ti1);
        assert_eq!(l40x.pin.function, PinFunction::Alternate(5));
        assert_eq!(
            Board::N32l40x.find_input("eclk5_pa0"),
            Err(Error::UnknownChannel)
        );
    }

    #[test]
    fn settings_select_channels() {
        let settings = Settings::from_json(
            br#"{"board":"N32g45x","pulse":["pulse1","pulse8"],"etr":["etr2_pa15","etr3_pd2"]}"#,
        )
        .unwrap();
        let selection = settings.select().unwrap();
        assert_eq!(selection.pulse.len(), 2);
        assert_eq!(selection.pulse[1].timer, TimerId::Tim8);
        assert_eq!(
            selection.etr[0].pin.function,
            PinFunction::Remap(Remap::Tim2Partial1)
        );
        assert!(selection.input.is_empty());

        let settings = Settings::from_json(
            br#"{"board":"N32l40x","pulse":[],"etr":["etr9_pb2"],"input":["eclk2_pa15","eclk3_pa6"]}"#,
        )
        .unwrap();
        let selection = settings.select().unwrap();
        assert_eq!(selection.input.len(), 2);
        assert_eq!(selection.input[0].timer, TimerId::Tim2);
        assert_eq!(selection.input[1].pin.function, PinFunction::Alternate(2));
    }

    #[test]
    fn settings_errors() {
        assert_eq!(Settings::from_json(b"{\"board\":"), Err(Error::Settings));

        let settings = Settings::from_json(
            br#"{"board":"N32l40x","pulse":["pulse1"],"etr":[]}"#,
        )
        .unwrap();
        assert_eq!(settings.select(), Err(Error::UnknownChannel));

        let settings = Settings::from_json(
            br#"{"board":"N32g45x","pulse":["pulse1"],"etr":["etr1_pa12"]}"#,
        )
        .unwrap();
        assert_eq!(
            settings.select(),
            Err(Error::Conflict("pulse1", "etr1_pa12"))
        );
    }
}
