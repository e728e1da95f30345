//! The slice of a hardware-virtualization backend the machine needs.

use std::fmt;
use std::io;

use thiserror::Error;
use vboard_platform::IrqLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoDirection {
    /// Guest `IN`/`INS`: the device fills `data`.
    In,
    /// Guest `OUT`/`OUTS`: `data` holds the bytes written by the guest.
    Out,
}

/// Decoded port I/O exit.
///
/// `data` covers the whole access: `size` bytes per element, one element per
/// repetition of a string instruction.
#[derive(Debug)]
pub struct PortIoExit<'a> {
    pub direction: IoDirection,
    pub port: u16,
    /// Element width in bytes (1, 2 or 4).
    pub size: usize,
    pub data: &'a mut [u8],
}

#[derive(Debug)]
pub enum VmExit<'a> {
    PortIo(PortIoExit<'a>),
    /// The guest executed `HLT` with interrupts it cannot wake from.
    Halt,
    Shutdown,
    /// Any other exit reason, as the backend's raw code.
    Other(u32),
}

/// One virtual CPU.
///
/// `run_once` enters the guest and returns at the next exit. Implementations
/// retry internally when the underlying call is interrupted by a signal.
pub trait Vcpu: Send {
    fn run_once(&mut self) -> Result<VmExit<'_>, HypervisorError>;

    fn registers(&self) -> Result<VcpuRegisters, HypervisorError>;
}

/// Virtual interrupt controller of the VM.
pub trait IrqChip: Send + Sync {
    fn set_irq_line(&self, irq: u32, level: IrqLevel) -> Result<(), HypervisorError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VcpuRegisters {
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rsp: u64,
    pub rip: u64,
    pub rflags: u64,
    pub cs: u16,
    pub ds: u16,
    pub es: u16,
    pub ss: u16,
}

impl fmt::Display for VcpuRegisters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AX: {:#x}, BX: {:#x}, CX: {:#x}, DX: {:#x}, DI: {:#x}, SI: {:#x}, \
             DS: {:#06x}, ES: {:#06x}, CS: {:#06x}, IP: {:#x}, SS: {:#06x}, SP: {:#x}, \
             FLAGS: {:#x}",
            self.rax,
            self.rbx,
            self.rcx,
            self.rdx,
            self.rdi,
            self.rsi,
            self.ds,
            self.es,
            self.cs,
            self.rip,
            self.ss,
            self.rsp,
            self.rflags,
        )
    }
}

#[derive(Debug, Error)]
pub enum HypervisorError {
    #[error("vcpu run failed: {0}")]
    Run(#[source] io::Error),

    #[error("failed to set irq line {irq}: {source}")]
    IrqLine {
        irq: u32,
        #[source]
        source: io::Error,
    },

    #[error("failed to read vcpu registers: {0}")]
    Registers(#[source] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_dump_lists_every_register() {
        let regs = VcpuRegisters {
            rax: 0x3f8,
            rip: 0x7c00,
            cs: 0xf000,
            rflags: 0x2,
            ..VcpuRegisters::default()
        };
        let dump = regs.to_string();
        assert!(dump.starts_with("AX: 0x3f8, BX: 0x0,"));
        assert!(dump.contains("CS: 0xf000"));
        assert!(dump.contains("IP: 0x7c00"));
        assert!(dump.ends_with("FLAGS: 0x2"));
    }

    #[test]
    fn irq_line_error_names_the_line() {
        let err = HypervisorError::IrqLine {
            irq: 4,
            source: io::ErrorKind::InvalidInput.into(),
        };
        assert!(err.to_string().starts_with("failed to set irq line 4:"));
    }
}
