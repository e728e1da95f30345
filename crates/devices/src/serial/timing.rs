use std::time::Duration;

/// Input clock of the emulated UART (a 4.9152 MHz crystal).
pub const UART_CLOCK_HZ: u32 = 4_915_200;

pub fn divisor(dll: u8, dlm: u8) -> u16 {
    u16::from_le_bytes([dll, dlm])
}

/// Baud rate for `divisor`, or `None` when the divisor is zero or the rate
/// rounds down to zero.
pub fn baud_rate(clock_hz: u32, divisor: u16) -> Option<u32> {
    if divisor == 0 {
        return None;
    }
    let baud = u64::from(clock_hz) / (16 * u64::from(divisor));
    u32::try_from(baud).ok().filter(|&baud| baud != 0)
}

/// Time needed to shift one character out at the programmed baud rate.
pub fn byte_time(clock_hz: u32, divisor: u16) -> Option<Duration> {
    baud_rate(clock_hz, divisor).map(|baud| Duration::from_secs(1) / baud)
}

/// Idle time after which a partially filled receive FIFO reports a timeout.
pub fn char_timeout(clock_hz: u32, divisor: u16, trigger_level: usize) -> Option<Duration> {
    let trigger_level = u32::try_from(trigger_level).ok()?;
    byte_time(clock_hz, divisor)?.checked_mul(trigger_level)
}
