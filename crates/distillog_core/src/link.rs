//! Máquina de estados do link serial.
//!
//! Roda na thread do worker e é dona exclusiva do transporte:
//!
//! ```text
//! Idle → Connecting ─┬→ AwaitingSetup ─→ Ready ⇄ Polling
//!                    └→ Failed            (qualquer erro fatal → Failed)
//! ```
//!
//! O controlador só enxerga o [`LinkShared`] (atômicos + mutex da fila) e o
//! canal de [`LinkEvent`].

use crate::clock::Clock;
use crate::config::{ChecksumPolicy, LinkConfig};
use crate::error::LinkError;
use crate::protocol::{ENVELOPE_SIZE, decode_envelope, encode_poll_request};
use crate::queue::SampleQueue;
use crate::transport::{Opener, Transport};
use crate::types::{DecodedSample, SessionState};
use crossbeam_channel::Sender;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Pausa entre iterações do worker.
pub const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Texto impresso pelo firmware ao terminar o boot.
pub const SETUP_MARKER: &str = "SETUP DONE!";

/// O marcador só é procurado depois que o buffer passa deste tamanho.
const SETUP_MIN_BUFFER: usize = 10;

/// Capacidade do canal de eventos para o controlador.
pub const EVENT_BUFFER: usize = 64;

/// Evento publicado pelo worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    StateChanged(SessionState),
    SetupComplete,
    Failed(String),
}

// ──────────────────────────────────────────────
// Estado compartilhado
// ──────────────────────────────────────────────

/// Contadores da sessão.
#[derive(Debug, Default)]
struct LinkCounters {
    polls: AtomicU64,
    samples: AtomicU64,
    soft_misses: AtomicU64,
    ack_mismatches: AtomicU64,
    checksum_mismatches: AtomicU64,
}

/// Cópia dos contadores da sessão.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Requisições `'t'` enviadas
    pub polls: u64,
    /// Amostras enfileiradas
    pub samples: u64,
    /// Ticks ignorados (resposta curta, malformada ou rejeitada)
    pub soft_misses: u64,
    pub ack_mismatches: u64,
    pub checksum_mismatches: u64,
}

/// Estado visível ao controlador. Cada campo tem um único escritor.
#[derive(Debug)]
pub struct LinkShared {
    state: AtomicU8,
    stop_requested: AtomicBool,
    polling: AtomicBool,
    poll_interval_ms: AtomicU64,
    polling_started_at: Mutex<Option<Duration>>,
    setup_complete: AtomicBool,
    pending_failure: Mutex<Option<String>>,
    last_failure: Mutex<Option<String>>,
    samples: SampleQueue,
    counters: LinkCounters,
}

impl LinkShared {
    pub fn new(poll_interval_ms: u64) -> Self {
        Self {
            state: AtomicU8::new(SessionState::Idle as u8),
            stop_requested: AtomicBool::new(false),
            polling: AtomicBool::new(false),
            poll_interval_ms: AtomicU64::new(poll_interval_ms),
            polling_started_at: Mutex::new(None),
            setup_complete: AtomicBool::new(false),
            pending_failure: Mutex::new(None),
            last_failure: Mutex::new(None),
            samples: SampleQueue::new(),
            counters: LinkCounters::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Liga o polling. O primeiro chamado da sessão fixa a época de
    /// `elapsed_secs`.
    pub fn start_polling(&self, now: Duration) {
        lock(&self.polling_started_at).get_or_insert(now);
        self.polling.store(true, Ordering::Release);
    }

    pub fn stop_polling(&self) {
        self.polling.store(false, Ordering::Release);
    }

    pub fn is_polling(&self) -> bool {
        self.polling.load(Ordering::Acquire)
    }

    pub fn polling_started_at(&self) -> Option<Duration> {
        *lock(&self.polling_started_at)
    }

    /// Aplicado no próximo tick. Valor usado como recebido.
    pub fn set_poll_interval_ms(&self, value: u64) {
        self.poll_interval_ms.store(value, Ordering::Release);
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms.load(Ordering::Acquire)
    }

    /// Sinal de nível: permanece ativo até [`Self::acknowledge_setup`].
    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.load(Ordering::Acquire)
    }

    pub fn acknowledge_setup(&self) {
        self.setup_complete.store(false, Ordering::Release);
    }

    /// Mensagem de falha ainda não consumida (uma única vez por falha).
    pub fn take_failure(&self) -> Option<String> {
        lock(&self.pending_failure).take()
    }

    pub fn last_failure(&self) -> Option<String> {
        lock(&self.last_failure).clone()
    }

    fn record_failure(&self, message: String) {
        *lock(&self.last_failure) = Some(message.clone());
        *lock(&self.pending_failure) = Some(message);
    }

    pub fn drain_samples(&self) -> Vec<DecodedSample> {
        self.samples.drain()
    }

    pub fn stats(&self) -> LinkStats {
        let c = &self.counters;
        LinkStats {
            polls: c.polls.load(Ordering::Relaxed),
            samples: c.samples.load(Ordering::Relaxed),
            soft_misses: c.soft_misses.load(Ordering::Relaxed),
            ack_mismatches: c.ack_mismatches.load(Ordering::Relaxed),
            checksum_mismatches: c.checksum_mismatches.load(Ordering::Relaxed),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

// ──────────────────────────────────────────────
// Máquina de estados
// ──────────────────────────────────────────────

/// Protocolo de uma sessão. Não é reutilizável após `Failed`/`Stopped`.
pub struct LinkStateMachine<O: Opener, C: Clock> {
    config: LinkConfig,
    opener: O,
    clock: Arc<C>,
    shared: Arc<LinkShared>,
    events: Sender<LinkEvent>,

    port: Option<O::Port>,
    state: SessionState,
    setup_buffer: Vec<u8>,
    connect_started: Duration,
    last_poll: Option<Duration>,
}

impl<O: Opener, C: Clock> LinkStateMachine<O, C> {
    pub fn new(
        config: LinkConfig,
        opener: O,
        clock: Arc<C>,
        shared: Arc<LinkShared>,
        events: Sender<LinkEvent>,
    ) -> Self {
        Self {
            config,
            opener,
            clock,
            shared,
            events,
            port: None,
            state: SessionState::Idle,
            setup_buffer: Vec::new(),
            connect_started: Duration::ZERO,
            last_poll: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Loop completo do worker: conecta, roda ticks até estado terminal e
    /// fecha o transporte.
    pub fn run(mut self) {
        info!("Thread do link iniciada ({})", self.config.port);
        self.connect();

        while !self.state.is_terminal() {
            if self.shared.stop_requested() {
                self.transition(SessionState::Stopped);
                break;
            }

            self.tick();
            if self.state.is_terminal() {
                break;
            }

            self.clock.sleep(TICK_INTERVAL);
        }

        self.close_port();
        info!("Thread do link encerrada ({})", self.state);
    }

    /// `Idle → Connecting → AwaitingSetup | Failed`.
    pub fn connect(&mut self) {
        if self.state != SessionState::Idle {
            return;
        }

        self.transition(SessionState::Connecting);
        self.connect_started = self.clock.now();

        match self.opener.open(&self.config) {
            Ok(port) => {
                self.port = Some(port);
                info!("Aguardando o dispositivo concluir o setup...");
                self.transition(SessionState::AwaitingSetup);
            }
            Err(e) => self.fail(e),
        }
    }

    /// Uma iteração do loop, sem o sleep.
    pub fn tick(&mut self) {
        match self.state {
            SessionState::AwaitingSetup => self.await_setup(),
            SessionState::Ready | SessionState::Polling => {
                let next = if self.shared.is_polling() {
                    SessionState::Polling
                } else {
                    SessionState::Ready
                };
                if next != self.state {
                    self.transition(next);
                }

                if self.state == SessionState::Polling && self.poll_due() {
                    self.poll_once();
                }
            }
            _ => {}
        }
    }

    fn await_setup(&mut self) {
        match self.port_io(|port| port.read_up_to(1)) {
            Ok(bytes) => self.setup_buffer.extend_from_slice(&bytes),
            Err(e) => {
                self.fail(LinkError::TransportIoFailed(e.to_string()));
                return;
            }
        }

        if self.setup_buffer.len() > SETUP_MIN_BUFFER
            && String::from_utf8_lossy(&self.setup_buffer).contains(SETUP_MARKER)
        {
            info!("Dispositivo concluiu o setup");
            self.setup_buffer.clear();
            self.shared.setup_complete.store(true, Ordering::Release);
            self.transition(SessionState::Ready);
            self.publish(LinkEvent::SetupComplete);
            return;
        }

        let timeout = self.config.setup_timeout();
        if self.clock.now().saturating_sub(self.connect_started) > timeout {
            self.fail(LinkError::SetupTimeout(timeout));
        }
    }

    fn poll_due(&self) -> bool {
        let interval = Duration::from_millis(self.shared.poll_interval_ms());
        match self.last_poll {
            None => true,
            Some(last) => self.clock.now().saturating_sub(last) >= interval,
        }
    }

    fn poll_once(&mut self) {
        self.last_poll = Some(self.clock.now());
        bump(&self.shared.counters.polls);

        let response = self.port_io(|port| {
            port.flush_input()?;
            port.flush_output()?;
            port.write_all(&encode_poll_request())?;
            port.read_up_to(ENVELOPE_SIZE)
        });

        let bytes = match response {
            Ok(bytes) => bytes,
            Err(e) => {
                self.fail(LinkError::TransportIoFailed(e.to_string()));
                return;
            }
        };

        match self.accept(&bytes) {
            Ok(sample) => {
                debug!(
                    "Amostra: gás {:.2} | saída {:.2} | t={:.2}s",
                    sample.gas_temp, sample.outlet_temp, sample.elapsed_secs
                );
                self.shared.samples.push(sample);
                bump(&self.shared.counters.samples);
            }
            Err(e) if e.is_fatal() => self.fail(e),
            Err(e) => {
                warn!("Tick ignorado: {e} ({bytes:02X?})");
                bump(&self.shared.counters.soft_misses);
            }
        }
    }

    /// Valida o envelope e converte em amostra.
    fn accept(&self, bytes: &[u8]) -> Result<DecodedSample, LinkError> {
        let envelope = decode_envelope(bytes)?;

        if !envelope.ack_ok {
            bump(&self.shared.counters.ack_mismatches);
            warn!("{}", LinkError::UnexpectedAck(envelope.ack));
        }

        let computed = envelope.computed_checksum();
        if computed != envelope.checksum {
            bump(&self.shared.counters.checksum_mismatches);
            let mismatch = LinkError::ChecksumMismatch {
                received: envelope.checksum,
                computed,
            };
            match self.config.checksum_policy {
                ChecksumPolicy::Warn => warn!("{mismatch}"),
                ChecksumPolicy::Reject => return Err(mismatch),
            }
        }

        let now = self.clock.now();
        let epoch = self.shared.polling_started_at().unwrap_or(now);
        let elapsed = now.saturating_sub(epoch).as_secs_f64();

        Ok(DecodedSample::from_frame(&envelope.frame, elapsed))
    }

    fn port_io<T>(&mut self, op: impl FnOnce(&mut O::Port) -> io::Result<T>) -> io::Result<T> {
        match self.port.as_mut() {
            Some(port) => op(port),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "transporte não aberto")),
        }
    }

    fn transition(&mut self, next: SessionState) {
        if next == self.state {
            return;
        }
        info!("Link: {} → {}", self.state, next);
        self.state = next;
        self.shared.set_state(next);
        self.publish(LinkEvent::StateChanged(next));
    }

    fn fail(&mut self, err: LinkError) {
        let message = err.to_string();
        error!("Sessão encerrada: {message}");
        self.shared.record_failure(message.clone());
        self.shared.polling.store(false, Ordering::Release);
        self.transition(SessionState::Failed);
        self.publish(LinkEvent::Failed(message));
        self.close_port();
    }

    fn close_port(&mut self) {
        if let Some(mut port) = self.port.take() {
            port.close();
        }
    }

    /// Envio não-bloqueante: se o controlador não drena o canal, o evento é
    /// descartado.
    fn publish(&self, event: LinkEvent) {
        if self.events.try_send(event).is_err() {
            debug!("Canal de eventos cheio, descartando evento");
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
