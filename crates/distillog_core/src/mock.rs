//! Dispositivo simulado para testes e para o modo `--simulate`.
//!
//! Emula o firmware: imprime um banner de boot terminando em `SETUP DONE!` e
//! responde cada `'t'` com um envelope válido. O comportamento pode ser
//! roteirizado (falha ao abrir, respostas específicas, falha de I/O).
//!
//! [`MockDevice`] é `Clone` e compartilha estado com a porta aberta, então o
//! teste continua inspecionando o dispositivo depois que a porta foi movida
//! para o worker.

use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::protocol::{POLL_REQUEST, encode_valid_envelope};
use crate::transport::{Opener, Transport};
use crate::types::TelemetryFrame;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Banner padrão do firmware.
pub const BOOT_BANNER: &[u8] = b"Distillog v1\r\nMAX31855 OK\r\nSETUP DONE!\r\n";

/// Gera leituras que sobem lentamente até estabilizar, como num alambique.
#[derive(Debug, Clone)]
struct SimulatedSensor {
    msg_id: u16,
    gas_temp: i16,
}

impl SimulatedSensor {
    const START: i16 = 2000;
    const PLATEAU: i16 = 9_800;
    const STEP: i16 = 35;

    fn new() -> Self {
        Self {
            msg_id: 0,
            gas_temp: Self::START,
        }
    }

    fn next_frame(&mut self) -> TelemetryFrame {
        self.msg_id = self.msg_id.wrapping_add(1);
        self.gas_temp = (self.gas_temp + Self::STEP).min(Self::PLATEAU);

        TelemetryFrame {
            msg_type: 1,
            msg_id: self.msg_id,
            thermocouple_temp: self.gas_temp + 150,
            gas_temp: self.gas_temp,
            outlet_temp: Self::START + (self.gas_temp - Self::START) / 4,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    open_error: Option<String>,
    boot_output: Vec<u8>,
    pending: VecDeque<u8>,
    scripted: VecDeque<Vec<u8>>,
    sensor: Option<SimulatedSensor>,
    fail_after_writes: Option<usize>,
    fail_reads: bool,

    writes: Vec<Vec<u8>>,
    poll_requests: usize,
    flushes: usize,
    opened: bool,
    closed: bool,
}

/// Microcontrolador simulado.
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    /// Dispositivo que não emite nada e não responde.
    pub fn silent() -> Self {
        Self::default()
    }

    /// Dispositivo completo: banner de boot + respostas geradas.
    pub fn arduino() -> Self {
        Self::silent()
            .with_boot_output(BOOT_BANNER)
            .with_generated_frames()
    }

    pub fn with_boot_output(self, bytes: &[u8]) -> Self {
        self.lock().boot_output = bytes.to_vec();
        self
    }

    /// Responde polls sem resposta roteirizada com frames gerados.
    pub fn with_generated_frames(self) -> Self {
        self.lock().sensor = Some(SimulatedSensor::new());
        self
    }

    pub fn with_open_error(self, reason: &str) -> Self {
        self.lock().open_error = Some(reason.to_string());
        self
    }

    /// Escritas a partir da `n`-ésima (0 = todas) falham com `BrokenPipe`.
    pub fn fail_writes_after(self, n: usize) -> Self {
        self.lock().fail_after_writes = Some(n);
        self
    }

    pub fn fail_reads(self) -> Self {
        self.lock().fail_reads = true;
        self
    }

    /// Enfileira a resposta do próximo poll (bytes arbitrários).
    pub fn push_response(&self, bytes: Vec<u8>) {
        self.lock().scripted.push_back(bytes);
    }

    pub fn poll_requests(&self) -> usize {
        self.lock().poll_requests
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    pub fn flushes(&self) -> usize {
        self.lock().flushes
    }

    pub fn was_opened(&self) -> bool {
        self.lock().opened
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Opener for MockDevice {
    type Port = MockPort;

    fn open(&self, config: &LinkConfig) -> Result<MockPort, LinkError> {
        let mut state = self.lock();
        if let Some(reason) = &state.open_error {
            return Err(LinkError::TransportOpenFailed {
                port: config.port.clone(),
                reason: reason.clone(),
            });
        }

        state.opened = true;
        state.closed = false;
        let boot = state.boot_output.clone();
        state.pending = boot.into();

        Ok(MockPort {
            device: self.clone(),
        })
    }
}

/// Porta aberta de um [`MockDevice`].
#[derive(Debug)]
pub struct MockPort {
    device: MockDevice,
}

impl Transport for MockPort {
    fn read_up_to(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let mut state = self.device.lock();
        if state.fail_reads {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "dispositivo desconectado"));
        }
        let count = n.min(state.pending.len());
        Ok(state.pending.drain(..count).collect())
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.device.lock();
        if state
            .fail_after_writes
            .is_some_and(|limit| state.writes.len() >= limit)
        {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "dispositivo desconectado"));
        }
        state.writes.push(bytes.to_vec());

        for _ in bytes.iter().filter(|&&b| b == POLL_REQUEST) {
            state.poll_requests += 1;
            let response = match state.scripted.pop_front() {
                Some(bytes) => bytes,
                None => match state.sensor.as_mut() {
                    Some(sensor) => encode_valid_envelope(&sensor.next_frame()).unwrap_or_default(),
                    None => Vec::new(),
                },
            };
            state.pending.extend(response);
        }
        Ok(())
    }

    fn flush_input(&mut self) -> io::Result<()> {
        let mut state = self.device.lock();
        state.pending.clear();
        state.flushes += 1;
        Ok(())
    }

    fn flush_output(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn close(&mut self) {
        self.device.lock().closed = true;
    }
}
