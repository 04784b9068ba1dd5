///! Timer register abstraction used for pulse capture and external reference counting.
///!
///! # Design
///! The general purpose and advanced timers of the N32 family share the register layout that the
///! drivers in this crate rely on. Rather than touching vendor register blocks directly, the
///! drivers operate on a narrow capability set: [TimerPeripheral] for the time base, slave mode
///! controller and update event, and [CaptureTimer] for the input capture units and DMA burst
///! engine. A board crate implements these traits on top of its peripheral access crate, and the
///! [super::sim] backend implements them for host tests.
///!
///! Register values that are composed from multiple fields (SMCR, DCR) are passed as typed
///! bitfields so that the drivers read like the reference manual.
use arbitrary_int::{u4, u5};
use bitbybit::{bitenum, bitfield};
use num_enum::IntoPrimitive;

/// Identifies one of the timer peripherals.
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive)]
#[repr(u8)]
pub enum TimerId {
    Tim1 = 1,
    Tim2 = 2,
    Tim3 = 3,
    Tim4 = 4,
    Tim5 = 5,
    Tim8 = 8,
    Tim9 = 9,
}

/// Slave mode controller operation of a timer.
#[bitenum(u3, exhaustive = true)]
#[derive(Debug, PartialEq)]
pub enum SlaveMode {
    Disabled = 0b000,
    Encoder1 = 0b001,
    Encoder2 = 0b010,
    Encoder3 = 0b011,
    /// The counter is reinitialized on a rising edge of the trigger input.
    Reset = 0b100,
    Gated = 0b101,
    Trigger = 0b110,
    ExternalClock1 = 0b111,
}

/// Selects the trigger input of the slave mode controller.
#[bitenum(u3, exhaustive = true)]
#[derive(Debug, PartialEq)]
pub enum TriggerSelect {
    Itr0 = 0b000,
    Itr1 = 0b001,
    Itr2 = 0b010,
    Itr3 = 0b011,
    Ti1fEd = 0b100,
    /// Filtered timer input 1.
    Ti1fp1 = 0b101,
    /// Filtered timer input 2.
    Ti2fp2 = 0b110,
    Etrf = 0b111,
}

/// Prescalers for the external trigger input.
#[bitenum(u2, exhaustive = true)]
#[derive(Debug, PartialEq)]
pub enum EtrPrescaler {
    Off = 0b00,
    Div2 = 0b01,
    Div4 = 0b10,
    Div8 = 0b11,
}

/// Slave mode control register.
#[bitfield(u32, default = 0)]
#[derive(Debug, PartialEq)]
pub struct Smcr {
    #[bits(0..=2, rw)]
    pub sms: SlaveMode,
    #[bits(4..=6, rw)]
    pub ts: TriggerSelect,
    #[bit(7, rw)]
    pub msm: bool,
    /// External trigger filter.
    #[bits(8..=11, rw)]
    pub etf: u4,
    #[bits(12..=13, rw)]
    pub etps: EtrPrescaler,
    /// External clock mode 2 enable.
    #[bit(14, rw)]
    pub ece: bool,
    /// External trigger polarity. Set to count on falling edges.
    #[bit(15, rw)]
    pub etp: bool,
}

/// DMA control register, configuring DMA bursts through the DMA address register.
#[bitfield(u32, default = 0)]
#[derive(Debug, PartialEq)]
pub struct Dcr {
    /// Register offset (in words) of the first burst transfer.
    #[bits(0..=4, rw)]
    pub dba: u5,
    /// Number of transfers in the burst, minus one.
    #[bits(8..=12, rw)]
    pub dbl: u5,
}

/// Word offsets into the timer register block, used as DMA burst base.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DmaBase {
    Ccr1 = 13,
    Ccr2 = 14,
    Ccr3 = 15,
    Ccr4 = 16,
}

impl Dcr {
    /// Construct a burst configuration of `transfers` words starting at `base`.
    pub fn burst(base: DmaBase, transfers: u8) -> Self {
        assert!((1..=18).contains(&transfers));
        Self::new_with_raw_value(0)
            .with_dba(u5::new(base as u8))
            .with_dbl(u5::new(transfers - 1))
    }

    /// The number of words moved per DMA request.
    pub fn transfers(&self) -> u8 {
        self.dbl().value() + 1
    }
}

/// Counting direction of the time base.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CountMode {
    Up,
    Down,
}

/// Division between the timer clock and the sampling clock of the digital filters.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClockDivision {
    Div1,
    Div2,
    Div4,
}

/// Time base unit configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TimeBase {
    /// The counter clock is the timer clock divided by `prescaler + 1`.
    pub prescaler: u16,
    /// Auto-reload value.
    pub period: u16,
    pub division: ClockDivision,
    pub mode: CountMode,
}

/// One of the capture/compare units of a timer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CaptureUnit {
    Cc1,
    Cc2,
    Cc3,
    Cc4,
}

/// The edge on which an input capture latches the counter.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Polarity {
    Rising,
    Falling,
}

impl Polarity {
    pub fn opposite(&self) -> Self {
        match self {
            Self::Rising => Self::Falling,
            Self::Falling => Self::Rising,
        }
    }
}

/// Routing of a timer input into a capture unit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CaptureSelection {
    /// TIx of the same index as the capture unit (e.g. TI1 into CC1).
    Direct,
    /// The neighbouring input (e.g. TI2 into CC1).
    Indirect,
    /// The trigger controller output.
    Trc,
}

/// Prescaler on the capture events.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CapturePrescaler {
    Div1,
    Div2,
    Div4,
    Div8,
}

/// Input capture unit configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InputCapture {
    pub selection: CaptureSelection,
    pub polarity: Polarity,
    pub prescaler: CapturePrescaler,
    /// Digital filter setting. Zero disables the filter.
    pub filter: u4,
}

/// Time base, slave controller and update event of a timer.
///
/// Methods taking `&self` only perform accesses that are safe to issue concurrently with the
/// driver owning the timer (flag clears and counter accesses), as these are used from interrupt
/// context.
pub trait TimerPeripheral {
    /// The timer this peripheral represents.
    fn id(&self) -> TimerId;

    /// Program prescaler, auto-reload and counting mode.
    fn set_time_base(&mut self, base: TimeBase);

    /// Read the slave mode control register.
    fn smcr(&self) -> Smcr;

    /// Write the slave mode control register.
    fn set_smcr(&mut self, smcr: Smcr);

    /// Start or stop the counter.
    fn set_enabled(&mut self, enabled: bool);

    /// Allow the update (overflow) event to generate an interrupt.
    fn listen_update(&mut self, enabled: bool);

    /// Check the update interrupt flag.
    fn is_update_pending(&self) -> bool;

    /// Clear the update interrupt flag.
    fn clear_update(&self);

    /// Current counter value.
    fn counter(&self) -> u16;

    /// Overwrite the counter.
    fn set_counter(&self, value: u16);
}

/// A timer offering input capture units that can feed a DMA channel.
pub trait CaptureTimer: TimerPeripheral {
    /// Configure an input capture unit.
    fn configure_capture(&mut self, unit: CaptureUnit, capture: InputCapture);

    /// Arm or disarm an input capture unit.
    fn enable_capture(&mut self, unit: CaptureUnit, enabled: bool);

    /// Configure the DMA burst engine.
    fn set_dcr(&mut self, dcr: Dcr);

    /// Allow capture events of the unit to generate DMA requests.
    fn listen_dma(&mut self, unit: CaptureUnit, enabled: bool);

    /// The address of the DMA burst register, used as DMA peripheral address.
    fn dma_address(&self) -> usize;
}
