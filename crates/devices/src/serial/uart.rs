use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch, Notify};
use tokio_util::sync::CancellationToken;
use vboard_platform::{IrqLine, PortIoDevice};

use super::fifo::FIFO_CAPACITY;
use super::pump::{self, IrqArbiter};
use super::regs::{InterruptCause, InterruptIdent};
use super::state::UartState;
use super::{SerialError, SerialIo, UartConfig};

/// A 16550-compatible UART with host-backed I/O.
///
/// Register accesses never block on host I/O: transmitted bytes are queued in
/// the transmit FIFO and drained by the protocol loop, and received bytes are
/// only ever popped from the receive FIFO.
pub struct Uart16550 {
    config: UartConfig,
    state: Mutex<UartState>,
    pub(super) tx_ready: Notify,
    pub(super) cancel: CancellationToken,
    irq: Mutex<Option<Box<dyn IrqLine>>>,
    fatal: Mutex<Option<SerialError>>,
}

impl std::fmt::Debug for Uart16550 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uart16550")
            .field("config", &self.config)
            .field("state", &*self.lock())
            .field("stopped", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Uart16550 {
    pub fn new(config: UartConfig, irq: impl IrqLine + 'static) -> Result<Self, SerialError> {
        config.validate()?;
        Ok(Self {
            config,
            state: Mutex::new(UartState::new(config.clock_hz)),
            tx_ready: Notify::new(),
            cancel: CancellationToken::new(),
            irq: Mutex::new(Some(Box::new(irq))),
            fatal: Mutex::new(None),
        })
    }

    pub fn config(&self) -> UartConfig {
        self.config
    }

    /// Spawn the host-input reader, the protocol loop and the interrupt
    /// arbiter on `runtime`.
    ///
    /// A UART can only be started once.
    pub fn start(self: &Arc<Self>, runtime: &Handle, io: SerialIo) -> Result<(), SerialError> {
        let line = lock(&self.irq)
            .take()
            .ok_or(SerialError::AlreadyStarted)?;

        let (input_tx, input_rx) = mpsc::channel(FIFO_CAPACITY);
        let (irq_tx, irq_rx) = watch::channel(InterruptIdent::new(InterruptCause::None, false));

        runtime.spawn(pump::read_host_input(io.input, input_tx));
        runtime.spawn(pump::arbitrate(
            IrqArbiter::new(line),
            irq_rx,
            self.cancel.clone(),
        ));
        runtime.spawn(pump::run_protocol(
            Arc::clone(self),
            input_rx,
            io.output,
            irq_tx,
        ));

        tracing::debug!(
            "serial port {:#06x} started (irq {})",
            self.config.base_port,
            self.config.irq
        );
        Ok(())
    }

    /// Stop the protocol loop and the interrupt arbiter.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Unrecoverable host-side failure observed by the protocol loop, if any.
    pub fn fatal_error(&self) -> Option<SerialError> {
        lock(&self.fatal).clone()
    }

    pub(super) fn fail(&self, err: SerialError) {
        lock(&self.fatal).get_or_insert(err);
        self.cancel.cancel();
    }

    /// Current Interrupt Identification Register value, without side effects.
    pub fn interrupt_ident(&self) -> InterruptIdent {
        self.lock().interrupt_ident(Instant::now())
    }

    pub(super) fn lock(&self) -> MutexGuard<'_, UartState> {
        lock(&self.state)
    }
}

impl PortIoDevice for Uart16550 {
    fn read(&self, reg: u8) -> u8 {
        self.lock().read(reg, Instant::now())
    }

    fn write(&self, reg: u8, value: u8) {
        let queued = self.lock().write(reg, value);
        if queued {
            self.tx_ready.notify_one();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
