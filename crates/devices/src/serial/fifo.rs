use std::collections::VecDeque;

/// Depth of the 16550 receive and transmit FIFOs.
pub const FIFO_CAPACITY: usize = 16;

/// Bounded byte queue backing one direction of the UART.
///
/// Pushing onto a full queue never blocks and never evicts: the new byte is
/// handed back to the caller, which decides whether that is an overrun or a
/// silent drop.
#[derive(Debug, Clone)]
pub struct ByteFifo {
    buf: VecDeque<u8>,
}

impl Default for ByteFifo {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteFifo {
    pub fn new() -> Self {
        Self {
            buf: VecDeque::with_capacity(FIFO_CAPACITY),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() >= FIFO_CAPACITY
    }

    pub fn push(&mut self, byte: u8) -> Result<(), u8> {
        if self.is_full() {
            return Err(byte);
        }
        self.buf.push_back(byte);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<u8> {
        self.buf.pop_front()
    }
}
