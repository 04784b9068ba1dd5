use fugit::HertzU32;

/// Words in each pulse-width DMA ring buffer. Each capture event moves two words, so the ring
/// holds `DMA_BUFFER_SIZE / 2` samples. Larger rings lower the consumer wake-up rate at high
/// pulse rates at the cost of RAM.
pub const DMA_BUFFER_SIZE: usize = 1 << 12;

/// Depth of the pending transfer event queue of each pulse-width channel.
pub const EVENT_QUEUE_DEPTH: usize = 10;

/// Auto-reload of the capture and ETR timers. The longest measurable period is this many ticks.
pub const TIMER_PERIOD: u16 = 0xFFFF;

/// Words moved per capture event: both capture registers of the PWM input pair.
pub const CAPTURE_BURST_LENGTH: u8 = 2;

/// Timer kernel clock of the N32G45x parts (144 MHz, 6.9 ns per tick).
pub const N32G45X_TIMER_CLOCK: HertzU32 = HertzU32::MHz(144);

/// Timer kernel clock of the N32L40x parts.
pub const N32L40X_TIMER_CLOCK: HertzU32 = HertzU32::MHz(64);
