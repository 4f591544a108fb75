//! Fachada do controlador: inicia a thread do link e expõe comandos e
//! leituras que nunca bloqueiam em I/O.

use crate::clock::{Clock, SystemClock};
use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::link::{EVENT_BUFFER, LinkEvent, LinkShared, LinkStateMachine, LinkStats};
use crate::transport::Opener;
use crate::types::{DecodedSample, SessionState};
use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info, warn};

/// Logger de um dispositivo. Uma instância = uma sessão.
pub struct DeviceLogger<C: Clock = SystemClock> {
    config: LinkConfig,
    clock: Arc<C>,
    shared: Arc<LinkShared>,
    events_tx: Sender<LinkEvent>,
    events_rx: Receiver<LinkEvent>,
    worker: Option<JoinHandle<()>>,
    started: bool,
}

impl DeviceLogger<SystemClock> {
    pub fn new(config: LinkConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }
}

impl<C: Clock> DeviceLogger<C> {
    pub fn with_clock(config: LinkConfig, clock: Arc<C>) -> Self {
        let (events_tx, events_rx) = bounded(EVENT_BUFFER);
        let shared = Arc::new(LinkShared::new(config.poll_interval_ms));
        Self {
            config,
            clock,
            shared,
            events_tx,
            events_rx,
            worker: None,
            started: false,
        }
    }

    /// Inicia a thread do link e espera o sinal de start.
    ///
    /// O sinal chega antes da abertura do transporte: falha ao abrir aparece
    /// depois, via [`Self::take_failure`] / [`LinkEvent::Failed`].
    pub fn start<O: Opener>(&mut self, opener: O) -> Result<(), LinkError> {
        if self.started {
            return Err(LinkError::AlreadyStarted);
        }
        self.started = true;

        info!("Iniciando logger na porta {}", self.config.port);

        let machine = LinkStateMachine::new(
            self.config.clone(),
            opener,
            Arc::clone(&self.clock),
            Arc::clone(&self.shared),
            self.events_tx.clone(),
        );
        let (started_tx, started_rx) = bounded::<()>(1);

        let handle = std::thread::Builder::new()
            .name("device-link".into())
            .spawn(move || {
                let _ = started_tx.send(());
                machine.run();
            })?;
        self.worker = Some(handle);

        let timeout = self.config.start_timeout();
        if started_rx.recv_timeout(timeout).is_err() {
            error!("Thread do link não sinalizou start em {timeout:?}");
            self.shared.request_stop();
            return Err(LinkError::StartTimeout(timeout));
        }
        Ok(())
    }

    /// Pede parada e espera a thread terminar.
    ///
    /// Latência máxima: um tick mais o timeout de leitura em andamento.
    pub fn stop(&mut self) {
        self.shared.request_stop();
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                error!("Thread do link terminou com panic");
            }
        }
    }

    pub fn start_polling(&self) {
        if !self.state().is_setup_done() {
            warn!("Polling pedido antes do setup ({}); será aplicado quando pronto", self.state());
        }
        self.shared.start_polling(self.clock.now());
    }

    pub fn stop_polling(&self) {
        self.shared.stop_polling();
    }

    /// Sem clamp aqui; veja [`crate::config::clamp_poll_interval_ms`].
    pub fn set_poll_interval_ms(&self, value: u64) {
        self.shared.set_poll_interval_ms(value);
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.shared.poll_interval_ms()
    }

    pub fn drain_samples(&self) -> Vec<DecodedSample> {
        self.shared.drain_samples()
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_alive(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn is_polling(&self) -> bool {
        self.shared.is_polling()
    }

    pub fn is_setup_complete(&self) -> bool {
        self.shared.is_setup_complete()
    }

    pub fn acknowledge_setup(&self) {
        self.shared.acknowledge_setup();
    }

    pub fn take_failure(&self) -> Option<String> {
        self.shared.take_failure()
    }

    pub fn last_failure(&self) -> Option<String> {
        self.shared.last_failure()
    }

    pub fn stats(&self) -> LinkStats {
        self.shared.stats()
    }

    /// Canal de eventos do worker (transições, setup, falha).
    pub fn events(&self) -> Receiver<LinkEvent> {
        self.events_rx.clone()
    }
}

impl<C: Clock> Drop for DeviceLogger<C> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::mock::MockDevice;
    use crate::protocol::{ACK, encode_envelope};
    use crate::types::TelemetryFrame;
    use std::time::{Duration, Instant};

    /// Espera (em tempo real) até a condição valer.
    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        false
    }

    fn simulated(device: &MockDevice) -> DeviceLogger<ManualClock> {
        let mut logger =
            DeviceLogger::with_clock(LinkConfig::with_port("SIM"), Arc::new(ManualClock::new()));
        logger.start(device.clone()).unwrap();
        logger
    }

    #[test]
    fn end_to_end_through_worker_thread() {
        let device = MockDevice::silent().with_boot_output(b"...SETUP DONE!");
        let frame = TelemetryFrame {
            gas_temp: 2050,
            outlet_temp: 1980,
            ..Default::default()
        };
        device.push_response(encode_envelope(ACK, 0x0000, &frame).unwrap());

        let mut logger = simulated(&device);
        assert!(wait_for(|| logger.is_setup_complete()));
        assert_eq!(logger.state(), SessionState::Ready);
        logger.acknowledge_setup();

        logger.start_polling();
        let mut samples = Vec::new();
        assert!(wait_for(|| {
            samples.extend(logger.drain_samples());
            !samples.is_empty()
        }));

        assert_eq!(samples.len(), 1);
        assert!((samples[0].gas_temp - 20.50).abs() < 1e-9);
        assert!((samples[0].outlet_temp - 19.80).abs() < 1e-9);

        logger.stop();
        assert!(!logger.is_alive());
        assert_eq!(logger.state(), SessionState::Stopped);
        assert!(device.is_closed());
        assert!(logger.take_failure().is_none());
    }

    #[test]
    fn open_failure_is_surfaced_once() {
        let device = MockDevice::silent().with_open_error("não encontrada");
        let logger = simulated(&device);

        assert!(wait_for(|| !logger.is_alive()));
        assert_eq!(logger.state(), SessionState::Failed);
        let message = logger.take_failure().unwrap();
        assert!(message.contains("não encontrada"));
        assert!(logger.take_failure().is_none());
        assert_eq!(logger.last_failure(), Some(message));
    }

    #[test]
    fn setup_timeout_through_worker_thread() {
        let device = MockDevice::silent();
        let logger = simulated(&device);
        let events = logger.events();

        assert!(wait_for(|| !logger.is_alive()));
        assert_eq!(logger.state(), SessionState::Failed);
        let received: Vec<LinkEvent> = events.try_iter().collect();
        assert!(received.contains(&LinkEvent::StateChanged(SessionState::AwaitingSetup)));
        assert!(received.iter().any(|e| matches!(e, LinkEvent::Failed(_))));
        assert!(device.is_closed());
    }

    #[test]
    fn session_cannot_be_restarted() {
        let device = MockDevice::arduino();
        let mut logger = simulated(&device);
        assert!(matches!(
            logger.start(device.clone()),
            Err(LinkError::AlreadyStarted)
        ));
    }

    #[test]
    fn stop_with_real_clock_is_prompt() {
        let device = MockDevice::arduino();
        let mut logger = DeviceLogger::new(LinkConfig::with_port("SIM"));
        logger.start(device.clone()).unwrap();
        assert!(logger.is_alive());

        let started = Instant::now();
        logger.stop();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!logger.is_alive());
        assert!(device.is_closed());
    }

    #[test]
    fn drain_before_polling_is_empty() {
        let device = MockDevice::arduino();
        let logger = simulated(&device);
        assert!(logger.drain_samples().is_empty());
        assert!(!logger.is_polling());
    }

    #[test]
    fn poll_interval_is_stored_as_given() {
        let logger = DeviceLogger::new(LinkConfig::default());
        logger.set_poll_interval_ms(5);
        assert_eq!(logger.poll_interval_ms(), 5);
    }
}
