use std::env;
use std::str::FromStr;
use std::time::Duration;

use vboard_devices::UartConfig;

/// Serial protocol-loop tick in microseconds.
pub const SERIAL_TICK_ENV: &str = "VBOARD_SERIAL_TICK_US";
/// Worker threads of the runtime hosting the serial tasks.
pub const SERIAL_WORKER_THREADS_ENV: &str = "VBOARD_SERIAL_WORKER_THREADS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineConfig {
    /// COM1 placement and timing.
    pub serial: UartConfig,
    pub serial_worker_threads: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            serial: UartConfig::COM1,
            serial_worker_threads: 2,
        }
    }
}

impl MachineConfig {
    /// Defaults, overridden by any parseable non-zero environment values.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(us) = parse_env::<u64>(SERIAL_TICK_ENV).filter(|&us| us > 0) {
            config.serial.tick = Duration::from_micros(us);
        }
        if let Some(threads) = parse_env::<usize>(SERIAL_WORKER_THREADS_ENV).filter(|&n| n > 0) {
            config.serial_worker_threads = threads;
        }
        config
    }
}

fn parse_env<T: FromStr>(var: &str) -> Option<T> {
    env::var(var).ok().and_then(|value| value.trim().parse().ok())
}
