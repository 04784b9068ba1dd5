///! Simulated timer, DMA and board peripherals for host testing.
///!
///! # Design
///! Each simulated peripheral records its register level operations into a shared [SimLog], so
///! that tests can assert on the order of configuration steps across peripherals. The simulated
///! DMA channel writes capture bursts into the ring buffer exactly as the hardware would, and
///! raises the half/full transfer flags at the corresponding positions.
use spin::Mutex;

use super::{
    clocks::{Bus, ClockControl},
    dma::{DmaChannelId, DmaEvent, DmaRequest, DmaRingChannel, PeripheralToMemory},
    gpio::{Pin, PinControl, PinFunction, Pull, Remap},
    timers::{
        CaptureTimer, CaptureUnit, Dcr, InputCapture, Smcr, TimeBase, TimerId,
        TimerPeripheral,
    },
};
use crate::hardware::design_parameters::DMA_BUFFER_SIZE;
use crate::pulse_width::RingBuffer;

/// Recorded register level operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Op {
    ClockEnabled(Bus, u32),
    PinConfigured(Pin, Pull, PinFunction),
    Remapped(Remap),
    TimerEnabled(TimerId, bool),
    TimeBase(TimerId, TimeBase),
    CaptureConfigured(TimerId, CaptureUnit, InputCapture),
    CaptureEnabled(TimerId, CaptureUnit, bool),
    /// Raw SMCR value written.
    Smcr(TimerId, u32),
    /// Raw DCR value written.
    Dcr(TimerId, u32),
    DmaRequests(TimerId, CaptureUnit, bool),
    UpdateInterrupt(TimerId, bool),
    DmaConfigured(DmaChannelId, PeripheralToMemory),
    DmaRemapped(DmaChannelId, DmaRequest),
    DmaListen(DmaChannelId, DmaEvent),
    DmaEnabled(DmaChannelId, bool),
}

const LOG_DEPTH: usize = 128;

/// Operation log shared by the simulated peripherals.
#[derive(Default)]
pub struct SimLog {
    ops: Mutex<heapless::Vec<Op, LOG_DEPTH>>,
}

impl SimLog {
    pub const fn new() -> Self {
        Self {
            ops: Mutex::new(heapless::Vec::new()),
        }
    }

    /// Append an operation. Operations beyond the log depth are discarded.
    pub fn record(&self, op: Op) {
        self.ops.lock().push(op).ok();
    }

    /// A copy of all operations recorded so far.
    pub fn ops(&self) -> heapless::Vec<Op, LOG_DEPTH> {
        self.ops.lock().clone()
    }

    /// Index of the first occurrence of an operation.
    pub fn position(&self, op: &Op) -> Option<usize> {
        self.ops.lock().iter().position(|o| o == op)
    }

    pub fn contains(&self, op: &Op) -> bool {
        self.position(op).is_some()
    }

    pub fn clear(&self) {
        self.ops.lock().clear();
    }
}

/// Simulated clock controller and GPIO/AFIO block.
pub struct SimPlatform<'a> {
    log: &'a SimLog,
    ahb: u32,
    apb1: u32,
    apb2: u32,
}

impl<'a> SimPlatform<'a> {
    pub fn new(log: &'a SimLog) -> Self {
        Self {
            log,
            ahb: 0,
            apb1: 0,
            apb2: 0,
        }
    }

    /// Current value of a bus enable register.
    pub fn enabled(&self, bus: Bus) -> u32 {
        match bus {
            Bus::Ahb => self.ahb,
            Bus::Apb1 => self.apb1,
            Bus::Apb2 => self.apb2,
        }
    }
}

impl ClockControl for SimPlatform<'_> {
    fn set_enable_bits(&mut self, bus: Bus, mask: u32) {
        let reg = match bus {
            Bus::Ahb => &mut self.ahb,
            Bus::Apb1 => &mut self.apb1,
            Bus::Apb2 => &mut self.apb2,
        };
        *reg |= mask;
        self.log.record(Op::ClockEnabled(bus, mask));
    }
}

impl PinControl for SimPlatform<'_> {
    fn configure_input(&mut self, pin: Pin, pull: Pull, function: PinFunction) {
        self.log.record(Op::PinConfigured(pin, pull, function));
    }

    fn apply_remap(&mut self, remap: Remap) {
        self.log.record(Op::Remapped(remap));
    }
}

#[derive(Default)]
struct TimerState {
    enabled: bool,
    time_base: Option<TimeBase>,
    smcr: u32,
    dcr: u32,
    captures: [Option<InputCapture>; 4],
    capture_enabled: [bool; 4],
    dma_requests: [bool; 4],
    update_listen: bool,
    update_pending: bool,
    counter: u16,
}

/// Simulated general purpose or advanced timer.
pub struct SimTimer<'a> {
    id: TimerId,
    log: &'a SimLog,
    state: Mutex<TimerState>,
}

fn unit_index(unit: CaptureUnit) -> usize {
    match unit {
        CaptureUnit::Cc1 => 0,
        CaptureUnit::Cc2 => 1,
        CaptureUnit::Cc3 => 2,
        CaptureUnit::Cc4 => 3,
    }
}

impl<'a> SimTimer<'a> {
    pub fn new(id: TimerId, log: &'a SimLog) -> Self {
        Self {
            id,
            log,
            state: Mutex::new(TimerState::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn time_base(&self) -> Option<TimeBase> {
        self.state.lock().time_base
    }

    pub fn capture(&self, unit: CaptureUnit) -> Option<InputCapture> {
        self.state.lock().captures[unit_index(unit)]
    }

    pub fn is_capture_enabled(&self, unit: CaptureUnit) -> bool {
        self.state.lock().capture_enabled[unit_index(unit)]
    }

    pub fn is_dma_requesting(&self, unit: CaptureUnit) -> bool {
        self.state.lock().dma_requests[unit_index(unit)]
    }

    pub fn dcr(&self) -> Dcr {
        Dcr::new_with_raw_value(self.state.lock().dcr)
    }

    pub fn is_update_listening(&self) -> bool {
        self.state.lock().update_listen
    }

    /// Clock the counter by `edges` external edges.
    ///
    /// Each wrap past the auto-reload value sets the update flag. Edges are ignored while the
    /// timer is stopped.
    pub fn clock(&self, edges: u32) {
        let mut state = self.state.lock();
        if !state.enabled {
            return;
        }
        let period = state.time_base.map(|b| b.period).unwrap_or(u16::MAX) as u32;
        for _ in 0..edges {
            if state.counter as u32 >= period {
                state.counter = 0;
                state.update_pending = true;
            } else {
                state.counter += 1;
            }
        }
    }
}

impl TimerPeripheral for SimTimer<'_> {
    fn id(&self) -> TimerId {
        self.id
    }

    fn set_time_base(&mut self, base: TimeBase) {
        self.state.lock().time_base = Some(base);
        self.log.record(Op::TimeBase(self.id, base));
    }

    fn smcr(&self) -> Smcr {
        Smcr::new_with_raw_value(self.state.lock().smcr)
    }

    fn set_smcr(&mut self, smcr: Smcr) {
        self.state.lock().smcr = smcr.raw_value();
        self.log.record(Op::Smcr(self.id, smcr.raw_value()));
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.state.lock().enabled = enabled;
        self.log.record(Op::TimerEnabled(self.id, enabled));
    }

    fn listen_update(&mut self, enabled: bool) {
        self.state.lock().update_listen = enabled;
        self.log.record(Op::UpdateInterrupt(self.id, enabled));
    }

    fn is_update_pending(&self) -> bool {
        self.state.lock().update_pending
    }

    fn clear_update(&self) {
        self.state.lock().update_pending = false;
    }

    fn counter(&self) -> u16 {
        self.state.lock().counter
    }

    fn set_counter(&self, value: u16) {
        self.state.lock().counter = value;
    }
}

impl CaptureTimer for SimTimer<'_> {
    fn configure_capture(&mut self, unit: CaptureUnit, capture: InputCapture) {
        self.state.lock().captures[unit_index(unit)] = Some(capture);
        self.log
            .record(Op::CaptureConfigured(self.id, unit, capture));
    }

    fn enable_capture(&mut self, unit: CaptureUnit, enabled: bool) {
        self.state.lock().capture_enabled[unit_index(unit)] = enabled;
        self.log.record(Op::CaptureEnabled(self.id, unit, enabled));
    }

    fn set_dcr(&mut self, dcr: Dcr) {
        self.state.lock().dcr = dcr.raw_value();
        self.log.record(Op::Dcr(self.id, dcr.raw_value()));
    }

    fn listen_dma(&mut self, unit: CaptureUnit, enabled: bool) {
        self.state.lock().dma_requests[unit_index(unit)] = enabled;
        self.log.record(Op::DmaRequests(self.id, unit, enabled));
    }

    fn dma_address(&self) -> usize {
        // DMAR of the timer register block.
        0x4001_0000 + 0x400 * u8::from(self.id) as usize + 0x4C
    }
}

#[derive(Default)]
struct DmaState {
    transfer: Option<PeripheralToMemory>,
    request: Option<DmaRequest>,
    listen_half: bool,
    listen_complete: bool,
    half_pending: bool,
    complete_pending: bool,
    enabled: bool,
    remaining: u16,
}

/// Simulated circular DMA channel writing into a [RingBuffer].
pub struct SimDma<'a, const N: usize = DMA_BUFFER_SIZE> {
    id: DmaChannelId,
    log: &'a SimLog,
    ring: &'a RingBuffer<N>,
    state: Mutex<DmaState>,
}

impl<'a, const N: usize> SimDma<'a, N> {
    pub fn new(id: DmaChannelId, log: &'a SimLog, ring: &'a RingBuffer<N>) -> Self {
        Self {
            id,
            log,
            ring,
            state: Mutex::new(DmaState::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn transfer(&self) -> Option<PeripheralToMemory> {
        self.state.lock().transfer
    }

    pub fn request(&self) -> Option<DmaRequest> {
        self.state.lock().request
    }

    /// Serve one capture burst: the two capture register words are written at the current
    /// position and the transfer counter advances.
    ///
    /// # Returns
    /// The event whose flag was raised by this burst, if any.
    pub fn capture(&self, first: u32, second: u32) -> Option<DmaEvent> {
        let mut state = self.state.lock();
        if !state.enabled {
            return None;
        }

        let index = N - state.remaining as usize;
        self.ring.store(index, first);
        self.ring.store(index + 1, second);
        state.remaining -= 2;

        if state.remaining == 0 {
            state.remaining = N as u16;
            state.complete_pending |= state.listen_complete;
            Some(DmaEvent::TransferComplete)
        } else if index + 2 == N / 2 {
            state.half_pending |= state.listen_half;
            Some(DmaEvent::HalfTransfer)
        } else {
            None
        }
    }

    /// Raise an interrupt flag directly.
    pub fn raise(&self, event: DmaEvent) {
        let mut state = self.state.lock();
        match event {
            DmaEvent::HalfTransfer => state.half_pending = true,
            DmaEvent::TransferComplete => state.complete_pending = true,
        }
    }
}

impl<const N: usize> DmaRingChannel for SimDma<'_, N> {
    fn id(&self) -> DmaChannelId {
        self.id
    }

    fn configure(&mut self, transfer: &PeripheralToMemory) {
        let mut state = self.state.lock();
        state.transfer = Some(*transfer);
        state.remaining = transfer.count;
        self.log.record(Op::DmaConfigured(self.id, *transfer));
    }

    fn remap(&mut self, request: DmaRequest) {
        self.state.lock().request = Some(request);
        self.log.record(Op::DmaRemapped(self.id, request));
    }

    fn listen(&mut self, event: DmaEvent) {
        let mut state = self.state.lock();
        match event {
            DmaEvent::HalfTransfer => state.listen_half = true,
            DmaEvent::TransferComplete => state.listen_complete = true,
        }
        self.log.record(Op::DmaListen(self.id, event));
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.state.lock().enabled = enabled;
        self.log.record(Op::DmaEnabled(self.id, enabled));
    }

    fn remaining(&self) -> u16 {
        self.state.lock().remaining
    }

    fn is_pending(&self, event: DmaEvent) -> bool {
        let state = self.state.lock();
        match event {
            DmaEvent::HalfTransfer => state.half_pending,
            DmaEvent::TransferComplete => state.complete_pending,
        }
    }

    fn clear_pending(&self, event: DmaEvent) {
        let mut state = self.state.lock();
        match event {
            DmaEvent::HalfTransfer => state.half_pending = false,
            DmaEvent::TransferComplete => state.complete_pending = false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::dma::{DataSize, DmaId, Priority};

    #[test]
    fn dma_raises_half_and_full() {
        let log = SimLog::new();
        let ring = RingBuffer::<8>::new();
        let mut dma = SimDma::new(
            DmaChannelId {
                controller: DmaId::Dma1,
                channel: 1,
            },
            &log,
            &ring,
        );
        assert_eq!(dma.capture(1, 1), None);

        dma.configure(&PeripheralToMemory {
            peripheral_address: 0,
            memory_address: ring.address(),
            count: 8,
            peripheral_increment: false,
            memory_increment: true,
            peripheral_size: DataSize::Word,
            memory_size: DataSize::Word,
            circular: true,
            priority: Priority::High,
        });
        dma.listen(DmaEvent::HalfTransfer);
        dma.listen(DmaEvent::TransferComplete);
        dma.set_enabled(true);

        assert_eq!(dma.capture(1, 2), None);
        assert_eq!(dma.capture(3, 4), Some(DmaEvent::HalfTransfer));
        assert!(dma.is_pending(DmaEvent::HalfTransfer));
        assert_eq!(dma.remaining(), 4);
        assert_eq!(dma.capture(5, 6), None);
        assert_eq!(dma.capture(7, 8), Some(DmaEvent::TransferComplete));
        assert!(dma.is_pending(DmaEvent::TransferComplete));
        assert_eq!(dma.remaining(), 8);
        assert_eq!(ring.load(7), 8);

        dma.capture(9, 10);
        assert_eq!(ring.load(0), 9);
    }

    #[test]
    fn enable_bits_accumulate() {
        let log = SimLog::new();
        let mut platform = SimPlatform::new(&log);
        platform.set_enable_bits(Bus::Apb2, 1);
        platform.set_enable_bits(Bus::Apb2, 1 << 11);
        platform.set_enable_bits(Bus::Apb2, 1);
        assert_eq!(platform.enabled(Bus::Apb2), 1 | 1 << 11);
        assert_eq!(platform.enabled(Bus::Apb1), 0);
    }

    #[test]
    fn counter_wraps_and_flags_update() {
        let log = SimLog::new();
        let mut timer = SimTimer::new(TimerId::Tim2, &log);
        timer.clock(10);
        assert_eq!(timer.counter(), 0);

        timer.set_enabled(true);
        timer.clock(0x1_0000 + 5);
        assert!(timer.is_update_pending());
        assert_eq!(timer.counter(), 5);
    }
}
