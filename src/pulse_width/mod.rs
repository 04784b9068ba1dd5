///! Pulse width and period measurement via timer capture and DMA.
///!
///! # Design
///! Each measurement channel uses one timer in PWM input mode ([capture]), one DMA channel that
///! continuously copies both capture registers into a ring buffer ([ring]), the DMA interrupt
///! handler that signals ring halves ([notifier]) and a consumer task that decodes the samples
///! and calls the registered [PulseHandler] ([consumer]).
///!
///! All memory shared between these parts lives in a [PulseChannelState], which is meant to be
///! allocated statically. Constructing a [PulseWidth] device claims the state and hands out the
///! [Consumer] that must be spawned as a task.
///!
///! ```text
///! capture edge -> DMA burst -> ring -> DMA IRQ -> event queue -> consumer -> handler
///! ```
///!
///! # Note
///! Samples are reported in timer ticks. See [PulseSource::nanos] for conversion.
use core::cell::Cell;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use arbitrary_int::u4;
use critical_section::Mutex;
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use fugit::{HertzU32, NanosDurationU64};
use num_enum::IntoPrimitive;

use crate::device::Device;
use crate::hardware::{
    design_parameters::{DMA_BUFFER_SIZE, EVENT_QUEUE_DEPTH},
    dma::{DmaChannelId, DmaEvent, DmaRequest, DmaRingChannel},
    gpio::{self, Pull},
    CaptureTimer, Peripheral, PinConfig, Platform, Polarity, TimerId,
};
use crate::Error;

pub mod capture;
pub mod consumer;
pub mod notifier;
pub mod ring;

pub use capture::{PairOrder, PwmInputChannel};
pub use consumer::Consumer;
pub use notifier::TransferEvent;
pub use ring::RingBuffer;

/// The DMA resources of a measurement channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DmaConfig {
    pub channel: DmaChannelId,
    /// The timer request line remapped onto the channel.
    pub request: DmaRequest,
}

/// Static description of one pulse-width measurement channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Device name used for registration.
    pub name: &'static str,
    /// Human readable description, e.g. the timer and pin.
    pub info: &'static str,
    pub timer: TimerId,
    pub channel: PwmInputChannel,
    /// The counter runs at the timer clock divided by `prescaler + 1`.
    pub prescaler: u16,
    /// Edge starting a period.
    pub polarity: Polarity,
    /// Input capture filter setting. Zero keeps the shortest measurable pulse.
    pub filter: u4,
    pub pin: PinConfig,
    pub dma: DmaConfig,
}

/// Identifies the channel a sample was measured on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PulseSource {
    pub name: &'static str,
    pub timer: TimerId,
    /// Counter tick rate the samples are expressed in.
    pub tick_rate: HertzU32,
}

impl PulseSource {
    /// Convert a tick count of this source into nanoseconds.
    pub fn nanos(&self, ticks: u32) -> NanosDurationU64 {
        NanosDurationU64::from_ticks(
            ticks as u64 * 1_000_000_000 / self.tick_rate.raw() as u64,
        )
    }
}

/// Classification of a handler invocation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive)]
#[repr(u32)]
pub enum Status {
    /// A measured pulse.
    Sample = 0,
    /// End of a capture cutoff. Width and period are zero.
    EndOfCapture = 1,
}

/// Receiver of decoded pulse samples.
///
/// Handlers are called from the consumer task and must return quickly.
pub trait PulseHandler: Sync {
    /// Handle one sample. `width` and `period` are in timer ticks.
    fn on_pulse(&self, source: PulseSource, width: u32, period: u32, status: Status);
}

/// Plain function handler.
pub type PulseFn = fn(PulseSource, u32, u32, Status);

impl PulseHandler for PulseFn {
    fn on_pulse(&self, source: PulseSource, width: u32, period: u32, status: Status) {
        self(source, width, period, status)
    }
}

/// Control commands of a pulse-width device.
#[derive(Copy, Clone)]
pub enum Command {
    /// Replace the handler. Takes effect with the next processed sample.
    SetCallback(Option<&'static dyn PulseHandler>),
    /// Cut off the current capture: process everything captured since the last ring wrap and
    /// finish with an [Status::EndOfCapture] call.
    TestTimeout,
}

/// Memory shared by the DMA, its interrupt, the control path and the consumer of one channel.
pub struct PulseChannelState<const N: usize = DMA_BUFFER_SIZE> {
    pub(crate) ring: RingBuffer<N>,
    pub(crate) events:
        Channel<CriticalSectionRawMutex, TransferEvent, EVENT_QUEUE_DEPTH>,
    handler: Mutex<Cell<Option<&'static dyn PulseHandler>>>,
    pub(crate) dropped: AtomicU32,
    claimed: AtomicBool,
}

impl<const N: usize> PulseChannelState<N> {
    pub const fn new() -> Self {
        Self {
            ring: RingBuffer::new(),
            events: Channel::new(),
            handler: Mutex::new(Cell::new(None)),
            dropped: AtomicU32::new(0),
            claimed: AtomicBool::new(false),
        }
    }

    /// The ring buffer the DMA writes into.
    pub fn ring(&self) -> &RingBuffer<N> {
        &self.ring
    }

    /// Number of transfer events lost because the queue was full.
    pub fn dropped_events(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Number of queued transfer events.
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    pub(crate) fn handler(&self) -> Option<&'static dyn PulseHandler> {
        critical_section::with(|cs| self.handler.borrow(cs).get())
    }

    pub(crate) fn set_handler(&self, handler: Option<&'static dyn PulseHandler>) {
        critical_section::with(|cs| self.handler.borrow(cs).set(handler));
    }

    fn claim(&self) -> Result<(), Error> {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .map(|_| ())
            .map_err(|_| Error::StateInUse)
    }
}

impl<const N: usize> Default for PulseChannelState<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// A pulse-width measurement device.
pub struct PulseWidth<'a, T, D, const N: usize = DMA_BUFFER_SIZE> {
    config: ChannelConfig,
    source: PulseSource,
    timer: T,
    dma: D,
    state: &'a PulseChannelState<N>,
    open: bool,
}

impl<'a, T, D, const N: usize> PulseWidth<'a, T, D, N>
where
    T: CaptureTimer,
    D: DmaRingChannel,
{
    /// Construct the device and its consumer.
    ///
    /// # Args
    /// * `config` - The channel description.
    /// * `timer_clock` - The kernel clock of the timer.
    /// * `timer` - The timer used for capturing. Must be `config.timer`.
    /// * `dma` - The DMA channel moving the captures. Must be `config.dma.channel`.
    /// * `state` - Shared channel memory. It can only be claimed once.
    ///
    /// # Returns
    /// The device and the consumer to be run as a task.
    pub fn new(
        config: ChannelConfig,
        timer_clock: HertzU32,
        timer: T,
        dma: D,
        state: &'a PulseChannelState<N>,
    ) -> Result<(Self, Consumer<'a, N>), Error> {
        if timer.id() != config.timer || dma.id() != config.dma.channel {
            return Err(Error::WrongPeripheral(config.name));
        }
        state.claim()?;

        let source = PulseSource {
            name: config.name,
            timer: config.timer,
            tick_rate: HertzU32::from_raw(
                timer_clock.raw() / (config.prescaler as u32 + 1),
            ),
        };
        let consumer =
            Consumer::new(source, config.channel.pair_order(), state);

        Ok((
            Self {
                config,
                source,
                timer,
                dma,
                state,
                open: false,
            },
            consumer,
        ))
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn source(&self) -> PulseSource {
        self.source
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn state(&self) -> &'a PulseChannelState<N> {
        self.state
    }

    /// Access the timer, e.g. for diagnostics.
    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Access the DMA channel, e.g. for diagnostics.
    pub fn dma(&self) -> &D {
        &self.dma
    }

    /// Handle the DMA channel interrupt. Call this from the DMA channel interrupt handler.
    pub fn on_dma_interrupt(&self) -> Option<TransferEvent> {
        notifier::on_interrupt(&self.dma, self.state)
    }

    /// Register or remove the sample handler.
    pub fn set_callback(&self, handler: Option<&'static dyn PulseHandler>) {
        self.state.set_handler(handler);
    }

    /// Request a cutoff of the running capture.
    ///
    /// The DMA remaining-transfer count is sampled and queued for the consumer, which then
    /// processes the ring up to the current write position and signals the end of capture.
    ///
    /// # Note
    /// Only one cutoff should be outstanding at a time.
    pub fn cutoff(&self) -> Result<(), Error> {
        if !self.open {
            return Err(Error::NotOpen);
        }

        let residual = self.dma.remaining();
        self.state
            .events
            .try_send(TransferEvent::Stop { residual })
            .map_err(|_| {
                self.state.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!("{}: cutoff dropped, event queue full", self.config.name);
                Error::QueueFull
            })
    }
}

impl<'a, T, D, const N: usize> Device for PulseWidth<'a, T, D, N>
where
    T: CaptureTimer,
    D: DmaRingChannel,
{
    type Command = Command;

    fn name(&self) -> &'static str {
        self.config.name
    }

    fn info(&self) -> &'static str {
        self.config.info
    }

    /// Bring up pin, timer and DMA. The timer is started last, once the DMA is armed.
    fn open<P: Platform>(&mut self, platform: &mut P) -> Result<(), Error> {
        if self.open {
            return Err(Error::AlreadyOpen);
        }

        let config = self.config;

        // Events of a previous session refer to a ring that is about to be restarted.
        while self.state.events.try_receive().is_ok() {}

        platform.enable(Peripheral::Gpio(config.pin.pin.port));
        gpio::configure_timer_input(platform, &config.pin, Pull::Up);

        platform.enable(Peripheral::Afio);
        platform.enable(Peripheral::Timer(config.timer));
        capture::configure(&config, &mut self.timer);

        ring::configure(
            &config,
            &mut self.timer,
            &mut self.dma,
            platform,
            &self.state.ring,
        );
        self.dma.set_enabled(true);
        self.timer.set_enabled(true);

        self.open = true;
        log::info!("Pulse width {} open: {}", config.name, config.info);
        Ok(())
    }

    fn close(&mut self) {
        self.timer
            .listen_dma(self.config.channel.period_unit(), false);
        self.timer.set_enabled(false);
        self.dma.set_enabled(false);
        self.dma.clear_pending(DmaEvent::HalfTransfer);
        self.dma.clear_pending(DmaEvent::TransferComplete);
        self.open = false;
        log::info!("Pulse width {} closed", self.config.name);
    }

    fn control(&self, command: Command) -> Result<(), Error> {
        match command {
            Command::SetCallback(handler) => {
                self.set_callback(handler);
                Ok(())
            }
            Command::TestTimeout => self.cutoff(),
        }
    }
}
