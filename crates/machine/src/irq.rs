use std::sync::Arc;

use vboard_platform::{IrqLevel, IrqLine};

use crate::hypervisor::IrqChip;

/// Interrupt line routed to one input of the VM's interrupt controller.
pub struct IrqChipLine {
    chip: Arc<dyn IrqChip>,
    irq: u32,
}

impl IrqChipLine {
    pub fn new(chip: Arc<dyn IrqChip>, irq: u32) -> Self {
        Self { chip, irq }
    }
}

impl IrqLine for IrqChipLine {
    fn set_level(&mut self, level: IrqLevel) {
        // The device has no way to observe a failed edge; keep running.
        if let Err(err) = self.chip.set_irq_line(self.irq, level) {
            tracing::warn!("failed to set IRQ line {} to {level}: {err}", self.irq);
        }
    }
}
