///! Pulse-width sample consumer.
///!
///! # Design
///! The consumer is the only reader of a channel's ring. It waits for transfer events, decodes the
///! half of the ring named by the event and passes every valid sample to the registered handler.
///! Afterwards exactly the processed words are zeroed, which marks them invalid until the DMA
///! writes them again on its next pass.
///!
///! The DMA keeps writing while the consumer runs. Handlers must be short: a handler that takes
///! longer than half a ring period lets the DMA overwrite data before it is read.
///!
///! If the consumer falls behind and events are dropped, a half is picked up again on its next
///! event. Repeated events for the same half only rescan words that were cleared or rewritten
///! since, so they never produce duplicate samples.
use super::{
    capture::PairOrder, notifier::TransferEvent, PulseChannelState, PulseSource,
    Status,
};

/// The consumer of a pulse-width channel, to be run as a dedicated task.
pub struct Consumer<'a, const N: usize> {
    source: PulseSource,
    order: PairOrder,
    state: &'a PulseChannelState<N>,
}

impl<'a, const N: usize> Consumer<'a, N> {
    pub(super) fn new(
        source: PulseSource,
        order: PairOrder,
        state: &'a PulseChannelState<N>,
    ) -> Self {
        Self {
            source,
            order,
            state,
        }
    }

    /// The channel this consumer serves.
    pub fn source(&self) -> PulseSource {
        self.source
    }

    /// Process transfer events forever.
    ///
    /// # Note
    /// Spawn this on an executor task with a priority above the application tasks but below the
    /// DMA interrupt.
    pub async fn run(mut self) {
        loop {
            self.service().await;
        }
    }

    /// Wait for the next transfer event and process it.
    pub async fn service(&mut self) -> TransferEvent {
        let event = self.state.events.receive().await;
        self.process(event);
        event
    }

    /// Process the next transfer event, if one is queued.
    pub fn try_service(&mut self) -> Option<TransferEvent> {
        let event = self.state.events.try_receive().ok()?;
        self.process(event);
        Some(event)
    }

    fn process(&self, event: TransferEvent) {
        let ring = &self.state.ring;
        let span = event.span(N);

        let mut slot = span.start;
        while slot + 1 < span.end {
            let (first, second) = (ring.load(slot), ring.load(slot + 1));
            if first != 0 && second != 0 {
                let (width, period) = self.order.decode(first, second);
                self.deliver(width, period, Status::Sample);
            }
            slot += 2;
        }

        if let TransferEvent::Stop { .. } = event {
            self.deliver(0, 0, Status::EndOfCapture);
        }

        ring.clear(span);
    }

    fn deliver(&self, width: u32, period: u32, status: Status) {
        if let Some(handler) = self.state.handler() {
            handler.on_pulse(self.source, width, period, status);
        }
    }
}
