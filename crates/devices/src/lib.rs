#![forbid(unsafe_code)]

pub mod serial;

pub use serial::{SerialError, SerialIo, Uart16550, UartConfig};
