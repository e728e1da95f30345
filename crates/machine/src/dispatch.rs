use vboard_platform::{PortIoError, PortMap};

use crate::hypervisor::{IoDirection, PortIoExit};

/// Perform a port I/O exit against `ports`.
///
/// Each element is split into its little-endian bytes, byte `i` addressing
/// `port + i`; string accesses repeat that per element. A zero `size` is
/// treated as byte access.
pub fn handle_port_io(ports: &PortMap, exit: PortIoExit<'_>) -> Result<(), PortIoError> {
    let PortIoExit {
        direction,
        port,
        size,
        data,
    } = exit;

    for element in data.chunks_mut(size.max(1)) {
        for (offset, byte) in element.iter_mut().enumerate() {
            let port = port.wrapping_add(offset as u16);
            match direction {
                IoDirection::In => *byte = ports.read(port)?,
                IoDirection::Out => ports.write(port, *byte)?,
            }
        }
    }
    Ok(())
}
