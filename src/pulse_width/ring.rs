///! DMA ring transport for PWM input captures.
///!
///! # Design
///! The timer DMA burst engine copies both capture registers into the ring on every primary edge
///! capture. The DMA channel runs in circular mode over the whole ring and raises a half-transfer
///! event once the lower half is written and a transfer-complete event once the upper half is
///! written, after which it wraps. The consumer only ever touches the half named by the event it
///! handles, while the DMA is writing the other half.
///!
///! A slot pair is valid if both words are non-zero. Consumed slots are zeroed again, so a slot
///! that was never written and a slot that has already been processed read the same.
///!
///! # Note
///! An absent input signal never updates the capture registers, so the ring stays zero. A
///! capture of zero ticks is indistinguishable from this and is skipped as well.
use core::ops::Range;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::hardware::{
    design_parameters::{CAPTURE_BURST_LENGTH, DMA_BUFFER_SIZE},
    dma::{DataSize, DmaEvent, DmaRingChannel, PeripheralToMemory, Priority},
    timers::{CaptureTimer, Dcr, DmaBase},
    ClockControl, Peripheral,
};

use super::ChannelConfig;

/// Word buffer written by the DMA controller and read by the consumer.
///
/// The words are atomics so that the buffer can be shared between the DMA engine and the
/// consumer task without a lock. Relaxed loads and stores compile to plain word accesses.
pub struct RingBuffer<const N: usize = DMA_BUFFER_SIZE> {
    words: [AtomicU32; N],
}

impl<const N: usize> RingBuffer<N> {
    const VALID: () = assert!(
        N.is_power_of_two() && N >= 4 && N <= u16::MAX as usize,
        "ring size must be a power of two addressable by the DMA counter"
    );

    /// Construct a zeroed ring.
    pub const fn new() -> Self {
        let () = Self::VALID;
        #[allow(clippy::declare_interior_mutable_const)]
        const ZERO: AtomicU32 = AtomicU32::new(0);
        Self { words: [ZERO; N] }
    }

    /// Number of words in the ring.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// The memory address handed to the DMA controller.
    pub fn address(&self) -> usize {
        self.words.as_ptr() as usize
    }

    /// Read one word.
    pub fn load(&self, index: usize) -> u32 {
        self.words[index].load(Ordering::Relaxed)
    }

    /// Write one word, as the DMA controller would.
    pub(crate) fn store(&self, index: usize, value: u32) {
        self.words[index].store(value, Ordering::Relaxed);
    }

    /// Zero a range of words.
    pub fn clear(&self, range: Range<usize>) {
        for word in &self.words[range] {
            word.store(0, Ordering::Relaxed);
        }
    }

    /// Check if every word in the range reads zero.
    pub fn is_clear(&self, range: Range<usize>) -> bool {
        self.words[range]
            .iter()
            .all(|word| word.load(Ordering::Relaxed) == 0)
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Arm the DMA ring transfer of a channel.
///
/// The ring is zeroed, the DMA channel is configured and connected to the timer request line,
/// both ring interrupts are enabled, and only then the timer starts issuing DMA requests. A
/// capture request can thus never reach an unconfigured channel. The DMA channel itself is not
/// enabled here.
///
/// # Note
/// The DMA channel must not be shared with another peripheral. This is not checked here, see
/// [crate::board::validate].
pub fn configure<T, D, C, const N: usize>(
    config: &ChannelConfig,
    timer: &mut T,
    dma: &mut D,
    clocks: &mut C,
    ring: &RingBuffer<N>,
) where
    T: CaptureTimer,
    D: DmaRingChannel,
    C: ClockControl,
{
    ring.clear(0..N);

    clocks.enable(Peripheral::Dma(config.dma.channel.controller));

    dma.configure(&PeripheralToMemory {
        peripheral_address: timer.dma_address(),
        memory_address: ring.address(),
        count: N as u16,
        peripheral_increment: false,
        memory_increment: true,
        peripheral_size: DataSize::Word,
        memory_size: DataSize::Word,
        circular: true,
        priority: Priority::High,
    });
    dma.remap(config.dma.request);
    dma.listen(DmaEvent::TransferComplete);
    dma.listen(DmaEvent::HalfTransfer);

    // Burst both capture registers of the pair, starting at CCR1.
    timer.set_dcr(Dcr::burst(DmaBase::Ccr1, CAPTURE_BURST_LENGTH));
    timer.listen_dma(config.channel.period_unit(), true);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_range() {
        let ring = RingBuffer::<8>::new();
        for i in 0..8 {
            ring.store(i, i as u32 + 1);
        }
        ring.clear(2..6);
        assert!(ring.is_clear(2..6));
        assert_eq!(ring.load(1), 2);
        assert_eq!(ring.load(6), 7);
    }
}
