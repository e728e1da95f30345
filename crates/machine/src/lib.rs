#![forbid(unsafe_code)]

//! A minimal virtual machine board: one vCPU and a COM1 UART behind the
//! port I/O bus.

pub mod config;
pub mod dispatch;
pub mod hypervisor;
pub mod irq;

use std::io;
use std::sync::Arc;

use thiserror::Error;
use tokio::runtime::{Builder, Runtime};
use vboard_devices::{SerialError, SerialIo, Uart16550};
use vboard_platform::{PortIoError, PortMap};

pub use config::MachineConfig;
pub use hypervisor::{
    HypervisorError, IoDirection, IrqChip, PortIoExit, Vcpu, VcpuRegisters, VmExit,
};
pub use irq::IrqChipLine;

#[derive(Debug, Error)]
pub enum MachineError {
    #[error(transparent)]
    PortIo(#[from] PortIoError),

    #[error(transparent)]
    Serial(#[from] SerialError),

    #[error(transparent)]
    Hypervisor(#[from] HypervisorError),

    #[error("failed to build device runtime: {0}")]
    Runtime(#[source] io::Error),
}

/// Why [`Machine::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// The CPU executed `HLT`.
    Halted,
    /// The guest shut the VM down.
    Shutdown,
}

pub struct Machine<V: Vcpu> {
    vcpu: V,
    ports: PortMap,
    serial: Arc<Uart16550>,
    // Taken on drop and shut down without waiting for blocked host reads.
    runtime: Option<Runtime>,
}

impl<V: Vcpu> Machine<V> {
    /// Build the board: map COM1 at `config.serial.base_port`, wire its
    /// interrupt to `irq_chip`, and start its protocol loop on `io`.
    pub fn new(
        config: MachineConfig,
        vcpu: V,
        irq_chip: Arc<dyn IrqChip>,
        io: SerialIo,
    ) -> Result<Self, MachineError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.serial_worker_threads.max(1))
            .thread_name("vboard-serial")
            .enable_all()
            .build()
            .map_err(MachineError::Runtime)?;

        let line = IrqChipLine::new(irq_chip, u32::from(config.serial.irq));
        let serial = Arc::new(Uart16550::new(config.serial, line)?);

        let mut ports = PortMap::new();
        ports.register(config.serial.base_port, serial.clone())?;
        serial.start(runtime.handle(), io)?;

        tracing::debug!("machine ready ({} port window(s) mapped)", ports.len());
        Ok(Self {
            vcpu,
            ports,
            serial,
            runtime: Some(runtime),
        })
    }

    pub fn vcpu(&self) -> &V {
        &self.vcpu
    }

    pub fn ports(&self) -> &PortMap {
        &self.ports
    }

    pub fn serial(&self) -> &Arc<Uart16550> {
        &self.serial
    }

    /// Run the guest until it halts or shuts down.
    pub fn run(&mut self) -> Result<RunExit, MachineError> {
        loop {
            if let Some(exit) = self.step()? {
                tracing::debug!("guest stopped: {exit:?}");
                return Ok(exit);
            }
        }
    }

    /// Handle exactly one VM exit.
    pub fn step(&mut self) -> Result<Option<RunExit>, MachineError> {
        let outcome = match self.vcpu.run_once()? {
            VmExit::PortIo(exit) => dispatch::handle_port_io(&self.ports, exit).map(|()| None),
            VmExit::Halt => Ok(Some(RunExit::Halted)),
            VmExit::Shutdown => Ok(Some(RunExit::Shutdown)),
            VmExit::Other(reason) => {
                tracing::trace!("ignoring vm exit {reason}");
                Ok(None)
            }
        };

        if let Err(err) = &outcome {
            match self.vcpu.registers() {
                Ok(regs) => tracing::error!("port I/O failed: {err}; {regs}"),
                Err(reg_err) => {
                    tracing::error!("port I/O failed: {err}; registers unavailable: {reg_err}")
                }
            }
        }
        let exit = outcome?;

        if let Some(err) = self.serial.fatal_error() {
            return Err(err.into());
        }
        Ok(exit)
    }
}

impl<V: Vcpu> Drop for Machine<V> {
    fn drop(&mut self) {
        self.serial.stop();
        // The stdin reader sits in a blocking read that only returns on input.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
