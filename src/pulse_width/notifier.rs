///! DMA interrupt handling of the pulse-width channels.
///!
///! The interrupt handler only acknowledges the DMA event and queues a message for the consumer.
///! It never touches the ring or calls user code, so its run time does not depend on the
///! callback.
use core::ops::Range;
use core::sync::atomic::Ordering;

use crate::hardware::dma::{DmaEvent, DmaRingChannel};

use super::PulseChannelState;

/// Messages passed from the DMA interrupt (or a cutoff request) to the consumer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransferEvent {
    /// The lower half of the ring has been written.
    Half,
    /// The upper half of the ring has been written.
    Full,
    /// Capture cutoff requested. `residual` is the DMA remaining-transfer count at the time of
    /// the request.
    Stop { residual: u16 },
}

impl TransferEvent {
    /// Ring words handled for this event in a ring of `capacity` words.
    pub fn span(&self, capacity: usize) -> Range<usize> {
        match *self {
            Self::Half => 0..capacity / 2,
            Self::Full => capacity / 2..capacity,
            Self::Stop { residual } => {
                0..capacity.saturating_sub(residual as usize)
            }
        }
    }
}

/// Service a DMA interrupt of a pulse-width channel.
///
/// Transfer-complete takes precedence over half-transfer. At most one event is acknowledged and
/// queued per call. If the queue is full the event is dropped and counted.
///
/// # Returns
/// The event that was serviced, if any flag was pending.
pub fn on_interrupt<D: DmaRingChannel, const N: usize>(
    dma: &D,
    state: &PulseChannelState<N>,
) -> Option<TransferEvent> {
    let event = if dma.is_pending(DmaEvent::TransferComplete) {
        dma.clear_pending(DmaEvent::TransferComplete);
        TransferEvent::Full
    } else if dma.is_pending(DmaEvent::HalfTransfer) {
        dma.clear_pending(DmaEvent::HalfTransfer);
        TransferEvent::Half
    } else {
        return None;
    };

    if state.events.try_send(event).is_err() {
        state.dropped.fetch_add(1, Ordering::Relaxed);
    }

    Some(event)
}
