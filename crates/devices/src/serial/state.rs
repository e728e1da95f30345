use std::time::{Duration, Instant};

use super::fifo::ByteFifo;
use super::regs::{
    read, write, FifoControl, InterruptCause, InterruptEnable, InterruptIdent, LineControl,
    LineStatus,
};
use super::timing;

/// Register file and FIFOs of one UART.
///
/// This is the state guarded by the device lock. All methods are synchronous
/// and non-blocking; time is passed in explicitly so interrupt computation can
/// be exercised without the protocol loop.
#[derive(Debug, Clone)]
pub struct UartState {
    rx: ByteFifo,
    tx: ByteFifo,
    ier: InterruptEnable,
    fcr: FifoControl,
    lcr: LineControl,
    mcr: u8,
    msr: u8,
    dll: u8,
    dlm: u8,
    rx_overrun: bool,
    last_rx: Option<Instant>,
    clock_hz: u32,
}

impl UartState {
    pub fn new(clock_hz: u32) -> Self {
        Self {
            rx: ByteFifo::new(),
            tx: ByteFifo::new(),
            ier: InterruptEnable::empty(),
            fcr: FifoControl::default(),
            lcr: LineControl::default(),
            mcr: 0,
            msr: 0,
            dll: 0,
            dlm: 0,
            rx_overrun: false,
            last_rx: None,
            clock_hz,
        }
    }

    pub fn rx_len(&self) -> usize {
        self.rx.len()
    }

    pub fn tx_len(&self) -> usize {
        self.tx.len()
    }

    pub fn rx_overrun(&self) -> bool {
        self.rx_overrun
    }

    pub fn divisor(&self) -> u16 {
        timing::divisor(self.dll, self.dlm)
    }

    /// Receive idle timeout at the current divisor and trigger level.
    pub fn char_timeout(&self) -> Option<Duration> {
        timing::char_timeout(self.clock_hz, self.divisor(), self.fcr.rx_trigger_level())
    }

    pub fn read(&mut self, reg: u8, now: Instant) -> u8 {
        match reg {
            read::RBR => {
                if self.lcr.dlab() {
                    self.dll
                } else {
                    self.rx.pop().unwrap_or(0)
                }
            }
            read::IER => {
                if self.lcr.dlab() {
                    self.dlm
                } else {
                    self.ier.bits()
                }
            }
            read::IIR => self.interrupt_ident(now).bits(),
            read::LCR => self.lcr.0,
            read::MCR => self.mcr,
            read::LSR => self.read_line_status().bits(),
            read::MSR => self.msr,
            _ => 0,
        }
    }

    /// Apply a guest register write. Returns `true` when a byte was queued for
    /// transmission.
    pub fn write(&mut self, reg: u8, value: u8) -> bool {
        match reg {
            write::THR if self.lcr.dlab() => self.dll = value,
            // A full transmit FIFO drops the byte; the guest is expected to poll
            // LSR.THR_EMPTY.
            write::THR => return self.tx.push(value).is_ok(),
            write::IER if self.lcr.dlab() => self.dlm = value,
            write::IER => self.ier = InterruptEnable::from_bits_retain(value),
            // The clear-FIFO request bits are latched but not acted upon.
            write::FCR => self.fcr = FifoControl(value),
            write::LCR => self.lcr = LineControl(value),
            write::MCR => self.mcr = value,
            write::MSR => self.msr = value,
            _ => {}
        }
        false
    }

    /// Accept a byte from the host. Returns `false` if it was lost to an overrun.
    pub fn receive(&mut self, byte: u8, now: Instant) -> bool {
        match self.rx.push(byte) {
            Ok(()) => {
                self.last_rx = Some(now);
                true
            }
            Err(_) => {
                self.rx_overrun = true;
                false
            }
        }
    }

    pub fn pop_tx(&mut self) -> Option<u8> {
        self.tx.pop()
    }

    fn read_line_status(&mut self) -> LineStatus {
        let lsr = LineStatus::compute(self.rx.len(), self.tx.len(), self.rx_overrun);
        if lsr.overrun() {
            self.rx_overrun = false;
        }
        lsr
    }

    pub fn interrupt_cause(&self, now: Instant) -> InterruptCause {
        if self.ier.rx_data_available() && self.rx.len() >= self.fcr.rx_trigger_level() {
            return InterruptCause::RxData;
        }
        if self.ier.rx_line_status() && !self.rx.is_empty() && self.rx_timed_out(now) {
            return InterruptCause::FifoTimeout;
        }
        if self.rx_overrun {
            return InterruptCause::LineStatus;
        }
        if self.ier.tx_empty() && self.tx.is_empty() {
            return InterruptCause::TxEmpty;
        }
        InterruptCause::None
    }

    pub fn interrupt_ident(&self, now: Instant) -> InterruptIdent {
        InterruptIdent::new(self.interrupt_cause(now), self.fcr.fifo_enabled())
    }

    fn rx_timed_out(&self, now: Instant) -> bool {
        // No valid baud timing (zero divisor) means no timeout interrupts.
        let (Some(timeout), Some(last_rx)) = (self.char_timeout(), self.last_rx) else {
            return false;
        };
        now.saturating_duration_since(last_rx) > timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::fifo::FIFO_CAPACITY;
    use crate::serial::timing::UART_CLOCK_HZ;

    fn uart() -> UartState {
        UartState::new(UART_CLOCK_HZ)
    }

    fn set_divisor(uart: &mut UartState, divisor: u16) {
        let [dll, dlm] = divisor.to_le_bytes();
        uart.write(write::LCR, 0x83);
        uart.write(write::THR, dll);
        uart.write(write::IER, dlm);
        uart.write(write::LCR, 0x03);
    }

    #[test]
    fn transmit_fifo_preserves_order_and_drops_when_full() {
        let mut uart = uart();
        for b in 0..FIFO_CAPACITY as u8 {
            assert!(uart.write(write::THR, b));
        }
        assert!(!uart.write(write::THR, 0xEE));
        assert_eq!(uart.tx_len(), FIFO_CAPACITY);

        let sent: Vec<u8> = std::iter::from_fn(|| uart.pop_tx()).collect();
        assert_eq!(sent, (0..FIFO_CAPACITY as u8).collect::<Vec<_>>());
    }

    #[test]
    fn overrun_drops_excess_bytes_and_is_reported_once() {
        let now = Instant::now();
        let mut uart = uart();
        for b in 0..FIFO_CAPACITY as u8 {
            assert!(uart.receive(b, now));
        }
        assert!(!uart.receive(0xAA, now));
        assert!(!uart.receive(0xBB, now));
        assert!(uart.rx_overrun());

        // Data ready hides the overrun while bytes remain queued.
        assert_eq!(uart.read(read::LSR, now), 0x61);
        let received: Vec<u8> = (0..FIFO_CAPACITY)
            .map(|_| uart.read(read::RBR, now))
            .collect();
        assert_eq!(received, (0..FIFO_CAPACITY as u8).collect::<Vec<_>>());

        assert_eq!(uart.read(read::LSR, now), 0x62);
        assert!(!uart.rx_overrun());
        assert_eq!(uart.read(read::LSR, now), 0x60);
    }

    #[test]
    fn empty_receive_buffer_reads_zero() {
        let now = Instant::now();
        let mut uart = uart();
        assert_eq!(uart.read(read::RBR, now), 0);
        assert_eq!(uart.rx_len(), 0);
        assert_eq!(uart.read(read::LSR, now), 0x60);
    }

    #[test]
    fn dlab_aliases_data_registers_to_divisor() {
        let now = Instant::now();
        let mut uart = uart();
        uart.receive(b'x', now);
        uart.write(write::IER, 0x01);

        uart.write(write::LCR, 0x80);
        uart.write(write::THR, 0x20);
        uart.write(write::IER, 0x02);
        assert_eq!(uart.tx_len(), 0);
        assert_eq!(uart.read(read::RBR, now), 0x20);
        assert_eq!(uart.read(read::IER, now), 0x02);
        assert_eq!(uart.rx_len(), 1);
        assert_eq!(uart.divisor(), 0x0220);

        uart.write(write::LCR, 0x03);
        assert_eq!(uart.read(read::RBR, now), b'x');
        assert_eq!(uart.read(read::IER, now), 0x01);
        uart.write(write::THR, b'y');
        assert_eq!(uart.pop_tx(), Some(b'y'));

        uart.write(write::LCR, 0x83);
        assert_eq!(uart.read(read::RBR, now), 0x20);
        assert_eq!(uart.read(read::LCR, now), 0x83);
    }

    #[test]
    fn rx_data_fires_exactly_at_trigger_level() {
        let now = Instant::now();
        let mut uart = uart();
        uart.write(write::FCR, 0x81);
        uart.write(write::IER, 0x01);

        for b in 0..7 {
            uart.receive(b, now);
            assert_eq!(uart.interrupt_cause(now), InterruptCause::None);
        }
        uart.receive(7, now);
        assert_eq!(uart.interrupt_cause(now), InterruptCause::RxData);
        assert_eq!(uart.read(read::IIR, now), 0xC4);

        uart.read(read::RBR, now);
        assert_eq!(uart.interrupt_cause(now), InterruptCause::None);
        assert_eq!(uart.read(read::IIR, now), 0xC1);
    }

    #[test]
    fn fifo_timeout_after_idle_character_times() {
        let t0 = Instant::now();
        let mut uart = uart();
        set_divisor(&mut uart, 32);
        uart.write(write::FCR, 0x41);
        uart.write(write::IER, 0x05);
        uart.receive(b'a', t0);

        // One byte is below the 4-byte trigger.
        assert_eq!(uart.interrupt_cause(t0), InterruptCause::None);
        let timeout = uart.char_timeout().unwrap();
        assert_eq!(timeout, Duration::from_nanos(4 * 104_166));
        assert_eq!(uart.interrupt_cause(t0 + timeout), InterruptCause::None);
        assert_eq!(
            uart.interrupt_cause(t0 + timeout + Duration::from_micros(1)),
            InterruptCause::FifoTimeout
        );
        assert_eq!(
            uart.read(read::IIR, t0 + Duration::from_millis(5)),
            0xCC
        );
    }

    #[test]
    fn zero_divisor_suppresses_fifo_timeout() {
        let t0 = Instant::now();
        let mut uart = uart();
        uart.write(write::IER, 0x04);
        uart.receive(b'a', t0);
        assert_eq!(uart.divisor(), 0);
        assert_eq!(uart.char_timeout(), None);
        assert_eq!(
            uart.interrupt_cause(t0 + Duration::from_secs(60)),
            InterruptCause::None
        );
    }

    #[test]
    fn cause_priority_order() {
        let now = Instant::now();
        let mut uart = uart();
        uart.write(write::IER, 0x07);
        assert_eq!(uart.interrupt_cause(now), InterruptCause::TxEmpty);

        uart.write(write::THR, b'z');
        assert_eq!(uart.interrupt_cause(now), InterruptCause::None);

        for b in 0..=FIFO_CAPACITY as u8 {
            uart.receive(b, now);
        }
        // Receive data outranks the overrun.
        assert_eq!(uart.interrupt_cause(now), InterruptCause::RxData);

        while uart.rx_len() > 0 {
            uart.read(read::RBR, now);
        }
        assert_eq!(uart.interrupt_cause(now), InterruptCause::LineStatus);

        // Reading LSR acknowledges the overrun.
        assert_eq!(uart.read(read::LSR, now), 0x02);
        assert_eq!(uart.interrupt_cause(now), InterruptCause::None);
        uart.pop_tx();
        assert_eq!(uart.interrupt_cause(now), InterruptCause::TxEmpty);
        assert_eq!(uart.read(read::IIR, now), 0x02);
    }

    #[test]
    fn fifo_clear_bits_are_stored_but_not_applied() {
        let now = Instant::now();
        let mut uart = uart();
        uart.receive(1, now);
        uart.write(write::THR, 2);
        uart.write(write::FCR, 0x07);
        assert_eq!(uart.rx_len(), 1);
        assert_eq!(uart.tx_len(), 1);
        assert_eq!(uart.read(read::IIR, now) & 0xC0, 0xC0);
    }

    #[test]
    fn modem_registers_pass_through_and_unused_indices_are_inert() {
        let now = Instant::now();
        let mut uart = uart();
        uart.write(write::MCR, 0x0B);
        uart.write(write::MSR, 0xB0);
        uart.write(7, 0x55);
        assert_eq!(uart.read(read::MCR, now), 0x0B);
        assert_eq!(uart.read(read::MSR, now), 0xB0);
        assert_eq!(uart.read(7, now), 0);
        assert_eq!(uart.read(42, now), 0);
        // LSR is read-only.
        uart.write(5, 0xFF);
        assert_eq!(uart.read(read::LSR, now), 0x60);
    }
}
