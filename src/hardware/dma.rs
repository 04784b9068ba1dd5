///! DMA channel abstraction for circular peripheral-to-memory transfers.
///!
///! # Design
///! Only the channel features needed to stream timer capture registers into a memory ring are
///! exposed: the request remapping that connects a channel to a timer DMA request line, the
///! half/full transfer interrupts and the remaining-transfer counter. The interrupt flag accesses
///! take `&self` as they are performed from interrupt context while the owning driver holds the
///! channel.
/// Identifies a DMA controller.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DmaId {
    Dma1,
    Dma2,
}

/// A DMA channel of a specific controller.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DmaChannelId {
    pub controller: DmaId,
    /// Channel index, starting at 1 as in the reference manual.
    pub channel: u8,
}

/// Peripheral request lines that can be remapped onto a DMA channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DmaRequest {
    Tim1Ch1,
    Tim1Ch2,
    Tim4Ch1,
    Tim4Ch2,
    Tim8Ch1,
    Tim8Ch2,
}

/// Interrupt events of a DMA channel used by the ring transport.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DmaEvent {
    /// The first half of the memory buffer has been written.
    HalfTransfer,
    /// The complete memory buffer has been written.
    TransferComplete,
}

/// Width of a single DMA data item.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DataSize {
    Byte,
    HalfWord,
    Word,
}

/// DMA channel arbitration priority.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Priority {
    Low,
    Medium,
    High,
    VeryHigh,
}

/// A peripheral-to-memory transfer configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PeripheralToMemory {
    pub peripheral_address: usize,
    pub memory_address: usize,
    /// Number of data items until the transfer completes (or wraps in circular mode).
    pub count: u16,
    pub peripheral_increment: bool,
    pub memory_increment: bool,
    pub peripheral_size: DataSize,
    pub memory_size: DataSize,
    pub circular: bool,
    pub priority: Priority,
}

/// A DMA channel able to run a circular ring transfer.
pub trait DmaRingChannel {
    /// The channel this represents.
    fn id(&self) -> DmaChannelId;

    /// Program the channel. The channel must be disabled.
    fn configure(&mut self, transfer: &PeripheralToMemory);

    /// Connect the channel to a peripheral request line.
    fn remap(&mut self, request: DmaRequest);

    /// Enable the interrupt for an event.
    fn listen(&mut self, event: DmaEvent);

    /// Start or stop the channel.
    fn set_enabled(&mut self, enabled: bool);

    /// Number of data items left until the current cycle completes.
    fn remaining(&self) -> u16;

    /// Check if an interrupt event is pending.
    fn is_pending(&self, event: DmaEvent) -> bool;

    /// Clear a pending interrupt event.
    fn clear_pending(&self, event: DmaEvent);
}
