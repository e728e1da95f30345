#![forbid(unsafe_code)]

pub mod interrupts;
pub mod io;

pub use interrupts::{IrqLevel, IrqLine};
pub use io::{PortIoDevice, PortIoError, PortMap};
