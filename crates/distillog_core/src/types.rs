//! Definição de tipos do logger de temperatura.
//!
//! O [`TelemetryFrame`] espelha byte a byte o struct empacotado (`pack 1`) que o
//! firmware envia; o [`DecodedSample`] é o que a UI consome.

use serde::{Deserialize, Serialize};

// ──────────────────────────────────────────────
// Frame de telemetria (wire)
// ──────────────────────────────────────────────

/// Frame de telemetria enviado pelo microcontrolador.
///
/// A ordem dos campos é a ordem no fio; temperaturas em centésimos de grau.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TelemetryFrame {
    /// Tipo da mensagem
    pub msg_type: u8,
    /// Contador de mensagens do firmware
    pub msg_id: u16,
    /// Termopar (centésimos de grau)
    pub thermocouple_temp: i16,
    /// Temperatura do gás/vapor (centésimos de grau)
    pub gas_temp: i16,
    /// Temperatura na saída do condensador (centésimos de grau)
    pub outlet_temp: i16,
}

// ──────────────────────────────────────────────
// Amostra decodificada
// ──────────────────────────────────────────────

/// Amostra entregue ao controlador, já em unidades inteiras de grau.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct DecodedSample {
    pub gas_temp: f64,
    pub outlet_temp: f64,
    /// Segundos desde o primeiro `start_polling` da sessão
    pub elapsed_secs: f64,
}

impl DecodedSample {
    /// Converte um frame bruto. `elapsed_secs` vem do relógio do worker.
    pub fn from_frame(frame: &TelemetryFrame, elapsed_secs: f64) -> Self {
        Self {
            gas_temp: f64::from(frame.gas_temp) / 100.0,
            outlet_temp: f64::from(frame.outlet_temp) / 100.0,
            elapsed_secs,
        }
    }
}

// ──────────────────────────────────────────────
// Estado da sessão
// ──────────────────────────────────────────────

/// Estado da máquina de estados do link serial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SessionState {
    Idle = 0,
    Connecting = 1,
    AwaitingSetup = 2,
    Ready = 3,
    Polling = 4,
    Failed = 5,
    Stopped = 6,
}

impl SessionState {
    /// Estados em que o worker já terminou.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Failed | SessionState::Stopped)
    }

    /// Estados em que o dispositivo já concluiu o boot.
    pub fn is_setup_done(self) -> bool {
        matches!(self, SessionState::Ready | SessionState::Polling)
    }

    pub fn label(self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Connecting => "Connecting",
            SessionState::AwaitingSetup => "Awaiting setup",
            SessionState::Ready => "Ready",
            SessionState::Polling => "Polling",
            SessionState::Failed => "Failed",
            SessionState::Stopped => "Stopped",
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => SessionState::Connecting,
            2 => SessionState::AwaitingSetup,
            3 => SessionState::Ready,
            4 => SessionState::Polling,
            5 => SessionState::Failed,
            6 => SessionState::Stopped,
            _ => SessionState::Idle,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_from_frame_scales_hundredths() {
        let frame = TelemetryFrame {
            gas_temp: 2050,
            outlet_temp: -125,
            ..Default::default()
        };
        let sample = DecodedSample::from_frame(&frame, 3.5);
        assert!((sample.gas_temp - 20.50).abs() < 1e-9);
        assert!((sample.outlet_temp + 1.25).abs() < 1e-9);
        assert_eq!(sample.elapsed_secs, 3.5);
    }

    #[test]
    fn state_u8_roundtrip() {
        for state in [
            SessionState::Idle,
            SessionState::Connecting,
            SessionState::AwaitingSetup,
            SessionState::Ready,
            SessionState::Polling,
            SessionState::Failed,
            SessionState::Stopped,
        ] {
            assert_eq!(SessionState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn terminal_states() {
        assert!(SessionState::Failed.is_terminal());
        assert!(SessionState::Stopped.is_terminal());
        assert!(!SessionState::Polling.is_terminal());
    }
}
