//! Erros da sessão serial.
//!
//! `TransportOpenFailed`, `TransportIoFailed` e `SetupTimeout` encerram a
//! sessão. Os demais erros de resposta apenas fazem o tick ser ignorado.

use crate::protocol::ProtocolError;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Falha ao abrir a porta {port}: {reason}")]
    TransportOpenFailed { port: String, reason: String },

    #[error("Erro de I/O na porta serial: {0}")]
    TransportIoFailed(String),

    #[error("O dispositivo não concluiu o setup em {0:?} (sem resposta ou firmware incorreto)")]
    SetupTimeout(Duration),

    #[error("Resposta malformada ({actual} bytes, esperado {expected})")]
    MalformedResponse { expected: usize, actual: usize },

    #[error("Frame ilegível: {0}")]
    UndecodableFrame(String),

    #[error("Resposta não começa com ACK (0x{0:02X})")]
    UnexpectedAck(u8),

    #[error("Checksum divergente: recebido 0x{received:04X}, calculado 0x{computed:04X}")]
    ChecksumMismatch { received: u16, computed: u16 },

    #[error("A thread do link não iniciou em {0:?}")]
    StartTimeout(Duration),

    #[error("Sessão já iniciada; crie um novo DeviceLogger para reconectar")]
    AlreadyStarted,

    #[error("Falha ao criar thread do link: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Erros de decodificação de uma resposta: sempre recuperáveis.
impl From<ProtocolError> for LinkError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::WrongLength { expected, actual } => {
                LinkError::MalformedResponse { expected, actual }
            }
            other => LinkError::UndecodableFrame(other.to_string()),
        }
    }
}

impl LinkError {
    /// Erros que levam a sessão ao estado `Failed`.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LinkError::TransportOpenFailed { .. }
                | LinkError::TransportIoFailed(_)
                | LinkError::SetupTimeout(_)
        )
    }
}
