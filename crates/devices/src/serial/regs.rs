//! Register layout of the 16550 UART.
//!
//! Everything here is a pure decoder/encoder over byte values; the UART
//! device owns the storage.

use bitflags::bitflags;

/// Register indices (offset from the base port) for guest reads.
pub mod read {
    pub const RBR: u8 = 0;
    pub const IER: u8 = 1;
    pub const IIR: u8 = 2;
    pub const LCR: u8 = 3;
    pub const MCR: u8 = 4;
    pub const LSR: u8 = 5;
    pub const MSR: u8 = 6;
}

/// Register indices (offset from the base port) for guest writes.
pub mod write {
    pub const THR: u8 = 0;
    pub const IER: u8 = 1;
    pub const FCR: u8 = 2;
    pub const LCR: u8 = 3;
    pub const MCR: u8 = 4;
    pub const MSR: u8 = 6;
}

bitflags! {
    /// Interrupt Enable Register.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct InterruptEnable: u8 {
        const RX_DATA_AVAILABLE = 1 << 0;
        const TX_EMPTY = 1 << 1;
        const RX_LINE_STATUS = 1 << 2;
        /// Accepted and stored; modem status interrupts are never raised.
        const MODEM_STATUS = 1 << 3;
    }
}

impl InterruptEnable {
    pub fn rx_data_available(self) -> bool {
        self.contains(Self::RX_DATA_AVAILABLE)
    }

    pub fn tx_empty(self) -> bool {
        self.contains(Self::TX_EMPTY)
    }

    pub fn rx_line_status(self) -> bool {
        self.contains(Self::RX_LINE_STATUS)
    }

    pub fn modem_status(self) -> bool {
        self.contains(Self::MODEM_STATUS)
    }
}

bitflags! {
    /// Line Status Register. Never stored, always computed on read.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct LineStatus: u8 {
        const DATA_READY = 1 << 0;
        const OVERRUN_ERROR = 1 << 1;
        const THR_EMPTY = 1 << 5;
        const TX_EMPTY = 1 << 6;
    }
}

impl LineStatus {
    /// Compute the register from FIFO occupancy and the overrun latch.
    ///
    /// Overrun is only reported while the receive FIFO is empty.
    pub fn compute(rx_len: usize, tx_len: usize, overrun: bool) -> Self {
        let mut lsr = Self::empty();
        if rx_len > 0 {
            lsr |= Self::DATA_READY;
        } else if overrun {
            lsr |= Self::OVERRUN_ERROR;
        }
        if tx_len == 0 {
            lsr |= Self::THR_EMPTY | Self::TX_EMPTY;
        }
        lsr
    }

    pub fn overrun(self) -> bool {
        self.contains(Self::OVERRUN_ERROR)
    }
}

/// FIFO Control Register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FifoControl(pub u8);

impl FifoControl {
    pub const ENABLE: u8 = 1 << 0;
    pub const CLEAR_RX: u8 = 1 << 1;
    pub const CLEAR_TX: u8 = 1 << 2;
    pub const TRIGGER_MASK: u8 = 0b11 << 6;

    pub fn fifo_enabled(self) -> bool {
        self.0 & Self::ENABLE != 0
    }

    pub fn clear_rx_requested(self) -> bool {
        self.0 & Self::CLEAR_RX != 0
    }

    pub fn clear_tx_requested(self) -> bool {
        self.0 & Self::CLEAR_TX != 0
    }

    /// Receive occupancy (in bytes) at which a data-available interrupt fires.
    pub fn rx_trigger_level(self) -> usize {
        match (self.0 & Self::TRIGGER_MASK) >> 6 {
            0 => 1,
            1 => 4,
            2 => 8,
            _ => 14,
        }
    }
}

/// Line Control Register. Only DLAB has behavior; the framing bits are stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineControl(pub u8);

impl LineControl {
    pub const DLAB: u8 = 1 << 7;

    pub fn dlab(self) -> bool {
        self.0 & Self::DLAB != 0
    }
}

/// Highest-priority pending interrupt, as reported in IIR bits 3:0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterruptCause {
    None,
    TxEmpty,
    RxData,
    LineStatus,
    FifoTimeout,
}

impl InterruptCause {
    pub fn id_bits(self) -> u8 {
        match self {
            Self::None => 0x01,
            Self::TxEmpty => 0x02,
            Self::RxData => 0x04,
            Self::LineStatus => 0x06,
            Self::FifoTimeout => 0x0C,
        }
    }

    pub fn is_pending(self) -> bool {
        self != Self::None
    }
}

/// Interrupt Identification Register value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptIdent(u8);

impl InterruptIdent {
    /// Bits 7:6, set whenever FIFO mode is enabled.
    pub const FIFO_ENABLED: u8 = 0b11 << 6;
    const ID_MASK: u8 = 0x0F;

    pub fn new(cause: InterruptCause, fifo_enabled: bool) -> Self {
        let fifo_bits = if fifo_enabled { Self::FIFO_ENABLED } else { 0 };
        Self(fifo_bits | cause.id_bits())
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn cause(self) -> InterruptCause {
        match self.0 & Self::ID_MASK {
            0x02 => InterruptCause::TxEmpty,
            0x04 => InterruptCause::RxData,
            0x06 => InterruptCause::LineStatus,
            0x0C => InterruptCause::FifoTimeout,
            _ => InterruptCause::None,
        }
    }
}

impl From<InterruptIdent> for u8 {
    fn from(iir: InterruptIdent) -> Self {
        iir.0
    }
}
