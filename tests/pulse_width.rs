use std::boxed::Box;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::vec::Vec;

use arbitrary_int::{u4, Number};
use tim_bsp::{
    board::Board,
    hardware::{
        dma::{DataSize, DmaChannelId, DmaEvent, DmaId, DmaRingChannel, Priority},
        gpio::Pull,
        sim::{Op, SimDma, SimLog, SimPlatform, SimTimer},
        timers::{CaptureSelection, CaptureUnit},
        Bus, CaptureTimer, Pin, PinFunction, Polarity, Port, TimerId, TimerPeripheral,
    },
    pulse_width::{
        ChannelConfig, Command, Consumer, PulseChannelState, PulseHandler, PulseSource,
        PulseWidth, Status, TransferEvent,
    },
    Device, Error,
};

const N: usize = 16;

type Pulse<'a> = PulseWidth<'a, SimTimer<'a>, SimDma<'a, N>, N>;

fn config() -> ChannelConfig {
    *Board::N32g45x.find_pulse("pulse4").unwrap()
}

fn setup<'a>(
    log: &'a SimLog,
    state: &'a PulseChannelState<N>,
) -> (Pulse<'a>, Consumer<'a, N>) {
    let config = config();
    PulseWidth::new(
        config,
        Board::N32g45x.timer_clock(),
        SimTimer::new(config.timer, log),
        SimDma::new(config.dma.channel, log, state.ring()),
        state,
    )
    .unwrap()
}

#[derive(Default)]
struct Recorder(Mutex<Vec<(u32, u32, Status)>>);

impl PulseHandler for Recorder {
    fn on_pulse(&self, source: PulseSource, width: u32, period: u32, status: Status) {
        assert_eq!(source.name, "pulse4");
        self.0.lock().unwrap().push((width, period, status));
    }
}

impl Recorder {
    fn take(&self) -> Vec<(u32, u32, Status)> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

fn recorder() -> &'static Recorder {
    Box::leak(Box::default())
}

/// Serve one capture burst of the period/width pair and run the DMA interrupt if it fired.
fn burst(device: &Pulse, period: u32, width: u32) -> Option<TransferEvent> {
    device.dma().capture(period, width)?;
    device.on_dma_interrupt()
}

fn drain(consumer: &mut Consumer<N>) -> usize {
    let mut events = 0;
    while consumer.try_service().is_some() {
        events += 1;
    }
    events
}

#[test]
fn open_configures_in_order() {
    let log = SimLog::new();
    let state = PulseChannelState::new();
    let (mut device, _consumer) = setup(&log, &state);
    let mut platform = SimPlatform::new(&log);
    device.open(&mut platform).unwrap();
    assert!(device.is_open());

    let dma = device.config().dma.channel;
    let steps = [
        Op::ClockEnabled(Bus::Apb2, 1 << 3),
        Op::PinConfigured(Pin::new(Port::B, 6), Pull::Up, PinFunction::Default),
        Op::ClockEnabled(Bus::Apb2, 1 << 0),
        Op::ClockEnabled(Bus::Apb1, 1 << 2),
        Op::Smcr(TimerId::Tim4, 0b101_0100),
        Op::ClockEnabled(Bus::Ahb, 1 << 0),
        Op::DmaListen(dma, DmaEvent::TransferComplete),
        Op::DmaListen(dma, DmaEvent::HalfTransfer),
        Op::Dcr(TimerId::Tim4, 0x010D),
        Op::DmaRequests(TimerId::Tim4, CaptureUnit::Cc1, true),
        Op::DmaEnabled(dma, true),
        Op::TimerEnabled(TimerId::Tim4, true),
    ];
    let positions: Vec<usize> = steps
        .iter()
        .map(|op| log.position(op).unwrap_or_else(|| panic!("missing {:?}", op)))
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{:?}", log.ops());
    assert_eq!(
        log.ops().last(),
        Some(&Op::TimerEnabled(TimerId::Tim4, true))
    );

    let transfer = device.dma().transfer().unwrap();
    assert_eq!(transfer.peripheral_address, device.timer().dma_address());
    assert_eq!(transfer.memory_address, state.ring().address());
    assert_eq!(transfer.count, N as u16);
    assert!(transfer.circular && transfer.memory_increment);
    assert!(!transfer.peripheral_increment);
    assert_eq!(transfer.peripheral_size, DataSize::Word);
    assert_eq!(transfer.memory_size, DataSize::Word);
    assert_eq!(transfer.priority, Priority::High);

    let timer = device.timer();
    assert_eq!(timer.time_base().unwrap().period, 0xFFFF);
    let period = timer.capture(CaptureUnit::Cc1).unwrap();
    assert_eq!(period.selection, CaptureSelection::Direct);
    assert_eq!(period.polarity, Polarity::Rising);
    let width = timer.capture(CaptureUnit::Cc2).unwrap();
    assert_eq!(width.selection, CaptureSelection::Indirect);
    assert_eq!(width.polarity, Polarity::Falling);
    assert!(timer.is_capture_enabled(CaptureUnit::Cc1));
    assert!(timer.is_capture_enabled(CaptureUnit::Cc2));
    assert!(!timer.is_dma_requesting(CaptureUnit::Cc2));

    assert_eq!(device.source().tick_rate, fugit::HertzU32::MHz(144));
    assert_eq!(device.source().nanos(144).ticks(), 1000);
}

#[test]
fn clock_enables_are_idempotent() {
    let log = SimLog::new();
    let state = PulseChannelState::new();
    let (mut device, _consumer) = setup(&log, &state);
    let mut platform = SimPlatform::new(&log);
    device.open(&mut platform).unwrap();
    let apb2 = platform.enabled(Bus::Apb2);

    device.close();
    device.open(&mut platform).unwrap();
    assert_eq!(platform.enabled(Bus::Apb2), apb2);
    assert_eq!(platform.enabled(Bus::Apb1), 1 << 2);
    assert_eq!(platform.enabled(Bus::Ahb), 1 << 0);
}

#[test]
fn cutoff_after_open_only_ends_capture() {
    let log = SimLog::new();
    let state = PulseChannelState::new();
    let (mut device, mut consumer) = setup(&log, &state);
    device.open(&mut SimPlatform::new(&log)).unwrap();

    let recorder = recorder();
    device.control(Command::SetCallback(Some(recorder))).unwrap();
    device.control(Command::TestTimeout).unwrap();

    assert_eq!(
        consumer.try_service(),
        Some(TransferEvent::Stop { residual: N as u16 })
    );
    assert_eq!(recorder.take(), [(0, 0, Status::EndOfCapture)]);
    assert_eq!(consumer.try_service(), None);
}

#[test]
fn halves_are_delivered_in_order() {
    let log = SimLog::new();
    let state = PulseChannelState::new();
    let (mut device, mut consumer) = setup(&log, &state);
    device.open(&mut SimPlatform::new(&log)).unwrap();
    let recorder = recorder();
    device.set_callback(Some(recorder));

    for (i, period) in [900, 800, 700].into_iter().enumerate() {
        assert_eq!(burst(&device, period, 100 * (i as u32 + 1)), None);
    }
    assert_eq!(burst(&device, 600, 400), Some(TransferEvent::Half));
    assert_eq!(consumer.try_service(), Some(TransferEvent::Half));
    assert_eq!(
        recorder.take(),
        [
            (100, 900, Status::Sample),
            (200, 800, Status::Sample),
            (300, 700, Status::Sample),
            (400, 600, Status::Sample),
        ]
    );
    assert!(state.ring().is_clear(0..N / 2));

    burst(&device, 50, 50);
    // A zero capture cannot be told apart from an unwritten slot.
    burst(&device, 500, 0);
    burst(&device, 0, 1);
    assert_eq!(burst(&device, 1, 1), Some(TransferEvent::Full));

    let event = embassy_futures::block_on(consumer.service());
    assert_eq!(event, TransferEvent::Full);
    assert_eq!(
        recorder.take(),
        [(50, 50, Status::Sample), (1, 1, Status::Sample)]
    );
    assert!(state.ring().is_clear(0..N));
}

#[test]
fn cutoff_processes_written_prefix() {
    let log = SimLog::new();
    let state = PulseChannelState::new();
    let (mut device, mut consumer) = setup(&log, &state);
    device.open(&mut SimPlatform::new(&log)).unwrap();
    let recorder = recorder();
    device.set_callback(Some(recorder));

    burst(&device, 1000, 10);
    burst(&device, 1000, 20);
    burst(&device, 1000, 30);
    device.control(Command::TestTimeout).unwrap();

    assert_eq!(
        consumer.try_service(),
        Some(TransferEvent::Stop { residual: 10 })
    );
    assert_eq!(
        recorder.take(),
        [
            (10, 1000, Status::Sample),
            (20, 1000, Status::Sample),
            (30, 1000, Status::Sample),
            (0, 0, Status::EndOfCapture),
        ]
    );
    assert!(state.ring().is_clear(0..N));
}

#[test]
fn lagging_consumer_never_duplicates() {
    let log = SimLog::new();
    let state = PulseChannelState::new();
    let (mut device, mut consumer) = setup(&log, &state);
    device.open(&mut SimPlatform::new(&log)).unwrap();
    let recorder = recorder();
    device.set_callback(Some(recorder));

    // Two full ring passes before the consumer gets to run.
    for pass in 0..2 {
        for i in 0..N as u32 / 2 {
            burst(&device, 1000 * (pass + 1), i + 1);
        }
    }
    assert_eq!(state.pending_events(), 4);
    assert_eq!(drain(&mut consumer), 4);

    // Only the data of the second pass survived, and it is reported once.
    let samples = recorder.take();
    assert_eq!(samples.len(), N / 2);
    assert!(samples.iter().all(|&(_, period, _)| period == 2000));
    assert_eq!(state.dropped_events(), 0);
}

#[test]
fn full_queue_drops_and_counts() {
    let log = SimLog::new();
    let state = PulseChannelState::new();
    let (mut device, mut consumer) = setup(&log, &state);
    device.open(&mut SimPlatform::new(&log)).unwrap();

    for _ in 0..11 {
        device.dma().raise(DmaEvent::TransferComplete);
        assert_eq!(device.on_dma_interrupt(), Some(TransferEvent::Full));
    }
    assert!(!device.dma().is_pending(DmaEvent::TransferComplete));
    assert_eq!(state.pending_events(), 10);
    assert_eq!(state.dropped_events(), 1);

    assert_eq!(device.control(Command::TestTimeout), Err(Error::QueueFull));
    assert_eq!(state.dropped_events(), 2);

    assert_eq!(drain(&mut consumer), 10);
    assert_eq!(device.on_dma_interrupt(), None);
    device.control(Command::TestTimeout).unwrap();
}

#[test]
fn transfer_complete_takes_precedence() {
    let log = SimLog::new();
    let state = PulseChannelState::new();
    let (mut device, _consumer) = setup(&log, &state);
    device.open(&mut SimPlatform::new(&log)).unwrap();

    device.dma().raise(DmaEvent::HalfTransfer);
    device.dma().raise(DmaEvent::TransferComplete);
    assert_eq!(device.on_dma_interrupt(), Some(TransferEvent::Full));
    assert_eq!(device.on_dma_interrupt(), Some(TransferEvent::Half));
    assert_eq!(device.on_dma_interrupt(), None);
}

#[test]
fn runs_without_callback() {
    let log = SimLog::new();
    let state = PulseChannelState::new();
    let (mut device, mut consumer) = setup(&log, &state);
    device.open(&mut SimPlatform::new(&log)).unwrap();

    for i in 0..N as u32 / 2 {
        burst(&device, 100, i + 1);
    }
    device.control(Command::TestTimeout).unwrap();
    assert_eq!(drain(&mut consumer), 3);
    assert!(state.ring().is_clear(0..N));

    // Registering later only sees new data.
    let recorder = recorder();
    device.control(Command::SetCallback(Some(recorder))).unwrap();
    device.control(Command::TestTimeout).unwrap();
    drain(&mut consumer);
    assert_eq!(recorder.take(), [(0, 0, Status::EndOfCapture)]);

    device.control(Command::SetCallback(None)).unwrap();
    burst(&device, 100, 1);
    device.control(Command::TestTimeout).unwrap();
    drain(&mut consumer);
    assert!(recorder.take().is_empty());
}

#[test]
fn open_close_lifecycle() {
    let log = SimLog::new();
    let state = PulseChannelState::new();
    let (mut device, mut consumer) = setup(&log, &state);
    let mut platform = SimPlatform::new(&log);

    assert_eq!(device.control(Command::TestTimeout), Err(Error::NotOpen));
    device.open(&mut platform).unwrap();
    assert_eq!(device.open(&mut platform), Err(Error::AlreadyOpen));
    assert_eq!(device.read(), Err(Error::Unsupported));

    device.close();
    assert!(!device.is_open());
    assert!(!device.timer().is_enabled());
    assert!(!device.dma().is_enabled());
    assert!(!device.timer().is_dma_requesting(CaptureUnit::Cc1));
    assert_eq!(device.dma().capture(100, 10), None);
    assert_eq!(device.control(Command::TestTimeout), Err(Error::NotOpen));
    assert_eq!(consumer.try_service(), None);

    // Reopening restarts the ring from the beginning.
    device.open(&mut platform).unwrap();
    assert_eq!(device.dma().remaining(), N as u16);
    assert!(state.ring().is_clear(0..N));
}

#[test]
fn reopen_discards_stale_events() {
    let log = SimLog::new();
    let state = PulseChannelState::new();
    let (mut device, mut consumer) = setup(&log, &state);
    let mut platform = SimPlatform::new(&log);
    device.open(&mut platform).unwrap();
    let recorder = recorder();
    device.set_callback(Some(recorder));

    burst(&device, 1000, 10);
    device.control(Command::TestTimeout).unwrap();
    device.dma().raise(DmaEvent::HalfTransfer);
    device.dma().raise(DmaEvent::TransferComplete);
    device.close();
    assert!(!device.dma().is_pending(DmaEvent::HalfTransfer));
    assert!(!device.dma().is_pending(DmaEvent::TransferComplete));
    assert_eq!(state.pending_events(), 1);

    device.open(&mut platform).unwrap();
    assert_eq!(state.pending_events(), 0);
    assert_eq!(device.on_dma_interrupt(), None);
    assert_eq!(consumer.try_service(), None);
    assert!(recorder.take().is_empty());

    burst(&device, 1000, 20);
    device.control(Command::TestTimeout).unwrap();
    drain(&mut consumer);
    assert_eq!(
        recorder.take(),
        [(20, 1000, Status::Sample), (0, 0, Status::EndOfCapture)]
    );
}

#[test]
fn mismatched_peripherals_are_rejected() {
    let log = SimLog::new();
    let state = PulseChannelState::<N>::new();
    let config = config();

    let wrong_timer = PulseWidth::new(
        config,
        Board::N32g45x.timer_clock(),
        SimTimer::new(TimerId::Tim1, &log),
        SimDma::new(config.dma.channel, &log, state.ring()),
        &state,
    );
    assert!(matches!(wrong_timer, Err(Error::WrongPeripheral("pulse4"))));

    let other = DmaChannelId {
        controller: DmaId::Dma2,
        channel: config.dma.channel.channel,
    };
    let wrong_dma = PulseWidth::new(
        config,
        Board::N32g45x.timer_clock(),
        SimTimer::new(config.timer, &log),
        SimDma::new(other, &log, state.ring()),
        &state,
    );
    assert!(matches!(wrong_dma, Err(Error::WrongPeripheral("pulse4"))));

    // A rejected device does not hold on to the state.
    let (device, _consumer) = setup(&log, &state);
    assert_eq!(device.timer().id(), TimerId::Tim4);
}

#[test]
fn filter_reaches_both_capture_units() {
    let log = SimLog::new();
    let state = PulseChannelState::<N>::new();
    let config = ChannelConfig {
        filter: u4::new(15),
        ..config()
    };
    let (mut device, _consumer): (Pulse, _) = PulseWidth::new(
        config,
        Board::N32g45x.timer_clock(),
        SimTimer::new(config.timer, &log),
        SimDma::new(config.dma.channel, &log, state.ring()),
        &state,
    )
    .unwrap();
    device.open(&mut SimPlatform::new(&log)).unwrap();

    for unit in [CaptureUnit::Cc1, CaptureUnit::Cc2] {
        let capture = device.timer().capture(unit).unwrap();
        assert_eq!(capture.filter, u4::MAX);
    }
}

#[test]
fn state_is_claimed_once() {
    let log = SimLog::new();
    let state = PulseChannelState::<N>::new();
    let _device = setup(&log, &state);

    let config = config();
    let again = PulseWidth::new(
        config,
        Board::N32g45x.timer_clock(),
        SimTimer::new(config.timer, &log),
        SimDma::new(config.dma.channel, &log, state.ring()),
        &state,
    );
    assert!(matches!(again, Err(Error::StateInUse)));
}

#[test]
fn registers_by_name() {
    let log = SimLog::new();
    let state = PulseChannelState::new();
    let (device, _consumer) = setup(&log, &state);

    let mut registry = tim_bsp::Registry::<Pulse, 3>::new();
    assert!(registry.register(device).is_ok());
    let device = registry.find("pulse4").unwrap();
    assert_eq!(device.info(), "TIM4 PB6");
    assert_eq!(device.timer().id(), TimerId::Tim4);
}

/// Counts the samples between two end-of-capture calls.
#[derive(Default)]
struct PulseCounter {
    current: AtomicU32,
    windows: Mutex<Vec<u32>>,
}

impl PulseHandler for PulseCounter {
    fn on_pulse(&self, _source: PulseSource, _width: u32, _period: u32, status: Status) {
        match status {
            Status::Sample => {
                self.current.fetch_add(1, Ordering::Relaxed);
            }
            Status::EndOfCapture => {
                let count = self.current.swap(0, Ordering::Relaxed);
                self.windows.lock().unwrap().push(count);
            }
        }
    }
}

#[test]
fn periodic_cutoff_counts_pulses() {
    let log = SimLog::new();
    let state = PulseChannelState::new();
    let (mut device, mut consumer) = setup(&log, &state);
    device.open(&mut SimPlatform::new(&log)).unwrap();
    let counter: &'static PulseCounter = Box::leak(Box::default());
    device.set_callback(Some(counter));

    // Pulses per one second window. The windows cross both ring halves and a wrap.
    for pulses in [3, 2, 5, 0, 7] {
        for _ in 0..pulses {
            burst(&device, 1440, 720);
        }
        device.control(Command::TestTimeout).unwrap();
        drain(&mut consumer);
    }

    assert_eq!(*counter.windows.lock().unwrap(), [3, 2, 5, 0, 7]);
}
