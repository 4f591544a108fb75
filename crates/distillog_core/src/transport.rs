//! Transporte de bytes usado pelo link.
//!
//! [`Opener`] abre a sessão, [`Transport`] é o handle aberto. A implementação
//! real usa o crate `serialport`; testes e `--simulate` usam
//! [`MockDevice`](crate::mock::MockDevice).

use crate::clock::{Clock, SystemClock};
use crate::config::{BAUD_RATE, LinkConfig};
use crate::error::LinkError;
use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::debug;

/// Handle de transporte aberto. Pertence exclusivamente ao worker.
pub trait Transport: Send {
    /// Lê até `n` bytes. Retorna menos bytes se o timeout de leitura expirar;
    /// timeout não é erro.
    fn read_up_to(&mut self, n: usize) -> io::Result<Vec<u8>>;

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Descarta bytes pendentes de entrada.
    fn flush_input(&mut self) -> io::Result<()>;

    /// Descarta bytes pendentes de saída.
    fn flush_output(&mut self) -> io::Result<()>;

    fn close(&mut self);
}

/// Abre um [`Transport`] a partir da configuração da sessão.
pub trait Opener: Send + 'static {
    type Port: Transport + 'static;

    fn open(&self, config: &LinkConfig) -> Result<Self::Port, LinkError>;
}

// ──────────────────────────────────────────────
// Porta serial real
// ──────────────────────────────────────────────

/// Abre portas seriais via `serialport`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialOpener;

impl Opener for SerialOpener {
    type Port = SerialTransport;

    fn open(&self, config: &LinkConfig) -> Result<SerialTransport, LinkError> {
        // DTR desligado na abertura: evita o reset automático do Arduino
        let port = serialport::new(&config.port, BAUD_RATE)
            .timeout(config.read_timeout())
            .flow_control(serialport::FlowControl::None)
            .dtr_on_open(false)
            .open()
            .map_err(|e| LinkError::TransportOpenFailed {
                port: config.port.clone(),
                reason: e.to_string(),
            })?;

        debug!("Porta {} aberta a {BAUD_RATE} baud", config.port);
        Ok(SerialTransport {
            port: Some(port),
            read_timeout: config.read_timeout(),
            clock: SystemClock::new(),
        })
    }
}

// ──────────────────────────────────────────────
// Leitura com prazo total
// ──────────────────────────────────────────────

/// Fonte de bytes cujo timeout pode ser ajustado antes de cada leitura.
trait TimedRead {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl TimedRead for Box<dyn SerialPort> {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_timeout(timeout).map_err(io::Error::from)
    }

    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf)
    }
}

/// Lê até `n` bytes sem ultrapassar `timeout` no total: cada leitura recebe
/// só o tempo que resta até o prazo.
fn read_until_deadline<S: TimedRead, C: Clock>(
    source: &mut S,
    clock: &C,
    n: usize,
    timeout: Duration,
) -> io::Result<Vec<u8>> {
    let deadline = clock.now() + timeout;
    let mut buf = vec![0u8; n];
    let mut filled = 0;

    while filled < n {
        let now = clock.now();
        if now >= deadline {
            break;
        }
        source.set_read_timeout(deadline - now)?;

        match source.read_some(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut
                || e.kind() == io::ErrorKind::WouldBlock =>
            {
                // Timeout normal, retorna o que chegou
                break;
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    buf.truncate(filled);
    Ok(buf)
}

/// Porta serial aberta.
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    /// Prazo total de cada `read_up_to`
    read_timeout: Duration,
    clock: SystemClock,
}

impl SerialTransport {
    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "porta fechada"))
    }
}

impl Transport for SerialTransport {
    fn read_up_to(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let (timeout, clock) = (self.read_timeout, self.clock);
        read_until_deadline(self.port()?, &clock, n, timeout)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let port = self.port()?;
        port.write_all(bytes)?;
        port.flush()
    }

    fn flush_input(&mut self) -> io::Result<()> {
        self.port()?.clear(ClearBuffer::Input).map_err(io::Error::from)
    }

    fn flush_output(&mut self) -> io::Result<()> {
        self.port()?.clear(ClearBuffer::Output).map_err(io::Error::from)
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("Porta serial fechada");
        }
    }
}
