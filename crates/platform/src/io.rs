use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

/// Number of consecutive ports decoded by a single device window.
pub const PORT_WINDOW_LEN: u16 = 8;

const REGISTER_MASK: u16 = PORT_WINDOW_LEN - 1;

/// A device that exposes byte-wide registers in an 8-port I/O window.
///
/// `reg` is the offset of the accessed port inside the window (`0..=7`). Devices
/// are shared between the vCPU thread and their own background activity, so
/// accessors take `&self` and synchronize internally.
///
/// Out-of-range indices must read as `0` and ignore writes.
pub trait PortIoDevice: Send + Sync {
    fn read(&self, reg: u8) -> u8;
    fn write(&self, reg: u8, value: u8);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PortIoError {
    #[error("device already registered at I/O base {base:#06x}")]
    DuplicateDevice { base: u16 },

    #[error("I/O base {base:#06x} is not aligned to an 8-port window")]
    UnalignedBase { base: u16 },

    #[error("no device mapped at I/O port {port:#06x}")]
    Unmapped { port: u16 },
}

/// Address decoder for the legacy I/O port space.
///
/// The low three bits of a port select the register; the remaining bits select
/// the device window.
#[derive(Default)]
pub struct PortMap {
    devices: HashMap<u16, Arc<dyn PortIoDevice>>,
}

impl PortMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split a port number into its window base and register index.
    pub fn decode(port: u16) -> (u16, u8) {
        (port & !REGISTER_MASK, (port & REGISTER_MASK) as u8)
    }

    pub fn register(&mut self, base: u16, device: Arc<dyn PortIoDevice>) -> Result<(), PortIoError> {
        if base & REGISTER_MASK != 0 {
            return Err(PortIoError::UnalignedBase { base });
        }
        if self.devices.contains_key(&base) {
            return Err(PortIoError::DuplicateDevice { base });
        }
        self.devices.insert(base, device);
        tracing::debug!("registered port I/O device at {base:#06x}");
        Ok(())
    }

    pub fn is_mapped(&self, port: u16) -> bool {
        let (base, _) = Self::decode(port);
        self.devices.contains_key(&base)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn read(&self, port: u16) -> Result<u8, PortIoError> {
        let (dev, reg) = self.lookup(port)?;
        Ok(dev.read(reg))
    }

    pub fn write(&self, port: u16, value: u8) -> Result<(), PortIoError> {
        let (dev, reg) = self.lookup(port)?;
        dev.write(reg, value);
        Ok(())
    }

    fn lookup(&self, port: u16) -> Result<(&Arc<dyn PortIoDevice>, u8), PortIoError> {
        let (base, reg) = Self::decode(port);
        self.devices
            .get(&base)
            .map(|dev| (dev, reg))
            .ok_or(PortIoError::Unmapped { port })
    }
}

impl std::fmt::Debug for PortMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut bases: Vec<_> = self.devices.keys().copied().collect();
        bases.sort_unstable();
        f.debug_struct("PortMap")
            .field("bases", &bases)
            .finish()
    }
}
