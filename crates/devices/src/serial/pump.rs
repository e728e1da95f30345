use std::io;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use vboard_platform::{IrqLevel, IrqLine};

use super::regs::{InterruptCause, InterruptIdent};
use super::uart::Uart16550;
use super::SerialError;

/// Edge detector in front of the UART interrupt pin.
///
/// The line is pulsed (lowered, then raised again if something is still
/// pending) only when the reported cause changes, so the same cause reported by
/// consecutive recomputations never reaches the interrupt controller twice.
pub struct IrqArbiter {
    line: Box<dyn IrqLine>,
    last: InterruptCause,
}

impl IrqArbiter {
    pub fn new(line: Box<dyn IrqLine>) -> Self {
        Self {
            line,
            last: InterruptCause::None,
        }
    }

    pub fn update(&mut self, iir: InterruptIdent) {
        let cause = iir.cause();
        if cause == self.last {
            return;
        }
        self.line.set_level(IrqLevel::Low);
        if cause.is_pending() {
            self.line.set_level(IrqLevel::High);
        }
        self.last = cause;
    }
}

/// Apply the latest published IIR to the line.
///
/// The channel holds a single value: while the line is busy, intermediate
/// recomputations are overwritten and only the newest one is seen.
pub(super) async fn arbitrate(
    mut arbiter: IrqArbiter,
    mut rx: watch::Receiver<InterruptIdent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        let iir = *rx.borrow_and_update();
        arbiter.update(iir);
    }
    tracing::debug!("serial interrupt arbiter stopped");
}

/// Forward host input to the protocol loop one byte at a time.
pub(super) async fn read_host_input(
    mut input: Box<dyn AsyncRead + Send + Unpin>,
    tx: mpsc::Sender<u8>,
) {
    loop {
        match input.read_u8().await {
            Ok(byte) => {
                if tx.send(byte).await.is_err() {
                    break;
                }
            }
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                tracing::debug!("host serial input closed");
                break;
            }
            Err(err) => {
                tracing::warn!("failed to read host serial input: {err}");
                break;
            }
        }
    }
}

pub(super) async fn run_protocol(
    uart: Arc<Uart16550>,
    mut input: mpsc::Receiver<u8>,
    mut output: Box<dyn AsyncWrite + Send + Unpin>,
    irq: watch::Sender<InterruptIdent>,
) {
    let cancel = uart.cancel.clone();
    let mut tick = tokio::time::interval(uart.config().tick);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut input_open = true;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = uart.tx_ready.notified() => {
                if let Err(err) = drain_tx(&uart, &mut output).await {
                    tracing::error!("failed to write serial output to host: {err}");
                    uart.fail(SerialError::HostOutput(err.to_string()));
                    break;
                }
            }
            byte = input.recv(), if input_open => match byte {
                Some(byte) => {
                    if !uart.lock().receive(byte, Instant::now()) {
                        tracing::trace!("serial receive FIFO overrun");
                    }
                }
                None => input_open = false,
            },
            _ = tick.tick() => {}
        }

        let iir = uart.lock().interrupt_ident(Instant::now());
        if irq.send(iir).is_err() {
            break;
        }
    }
    tracing::debug!("serial protocol loop stopped");
}

async fn drain_tx(
    uart: &Uart16550,
    output: &mut (dyn AsyncWrite + Send + Unpin),
) -> io::Result<()> {
    loop {
        let next = uart.lock().pop_tx();
        let Some(byte) = next else {
            break;
        };
        output.write_all(&[byte]).await?;
    }
    output.flush().await
}
