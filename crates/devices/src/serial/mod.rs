//! 16550 UART emulation.
//!
//! The device is split in two halves that share one lock:
//!
//! - the register contract ([`Uart16550`] as a [`vboard_platform::PortIoDevice`]),
//!   called synchronously from the vCPU thread;
//! - the protocol loop, started with [`Uart16550::start`], which moves bytes
//!   between the FIFOs and the host streams and drives the interrupt line.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

mod fifo;
mod pump;
pub mod regs;
mod state;
pub mod timing;
mod uart;

pub use fifo::{ByteFifo, FIFO_CAPACITY};
pub use pump::IrqArbiter;
pub use state::UartState;
pub use uart::Uart16550;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartConfig {
    pub base_port: u16,
    pub irq: u8,
    /// Input clock used to derive baud timing from the divisor latch.
    pub clock_hz: u32,
    /// Period of the idle recomputation tick of the protocol loop.
    pub tick: Duration,
}

impl UartConfig {
    pub const COM1: Self = Self {
        base_port: 0x3F8,
        irq: 4,
        clock_hz: timing::UART_CLOCK_HZ,
        tick: Duration::from_millis(1),
    };

    pub fn validate(&self) -> Result<(), SerialError> {
        if self.base_port % 8 != 0 {
            return Err(SerialError::InvalidConfig("base port must be 8-aligned"));
        }
        if self.clock_hz == 0 {
            return Err(SerialError::InvalidConfig("clock must be non-zero"));
        }
        if self.tick.is_zero() {
            return Err(SerialError::InvalidConfig("tick period must be non-zero"));
        }
        Ok(())
    }
}

impl Default for UartConfig {
    fn default() -> Self {
        Self::COM1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerialError {
    #[error("invalid serial configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("serial device already started")]
    AlreadyStarted,

    /// The host console can no longer accept output. There is no way to report
    /// this to the guest, so callers should treat it as fatal.
    #[error("failed to write serial output to host: {0}")]
    HostOutput(String),
}

/// Host side of the serial line.
pub struct SerialIo {
    pub input: Box<dyn AsyncRead + Send + Unpin>,
    pub output: Box<dyn AsyncWrite + Send + Unpin>,
}

impl SerialIo {
    pub fn new(
        input: impl AsyncRead + Send + Unpin + 'static,
        output: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            input: Box::new(input),
            output: Box::new(output),
        }
    }

    /// Wire the UART to the process's standard input and output.
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl fmt::Debug for SerialIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialIo").finish_non_exhaustive()
    }
}
