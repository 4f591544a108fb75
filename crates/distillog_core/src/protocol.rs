//! Protocolo serial com o microcontrolador.
//!
//! Requisição: um único byte ASCII `'t'`.
//! Resposta (envelope, 12 bytes):
//!
//! ```text
//! ┌────────┬──────────────┬───────────────────────────┐
//! │ ACK(1) │ CRC16-LE (2) │ TelemetryFrame (9, LE)    │
//! └────────┴──────────────┴───────────────────────────┘
//! ```
//!
//! O frame é serializado com bincode (fixint, little-endian), o que reproduz
//! exatamente o layout empacotado do firmware.

use crate::checksum::checksum;
use crate::types::TelemetryFrame;

/// Byte de requisição de telemetria.
pub const POLL_REQUEST: u8 = b't';

/// Marcador ACK (ASCII ACK) esperado no início do envelope.
pub const ACK: u8 = 0x06;

/// Tamanho do frame empacotado.
pub const FRAME_SIZE: usize = 9;

/// Tamanho do header (ACK + checksum).
const HEADER_SIZE: usize = 3;

/// Tamanho total do envelope.
pub const ENVELOPE_SIZE: usize = HEADER_SIZE + FRAME_SIZE;

/// Erros do protocolo.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Tamanho inválido ({actual} bytes, esperado {expected})")]
    WrongLength { expected: usize, actual: usize },

    #[error("Erro de serialização: {0}")]
    Serialize(String),

    #[error("Erro de deserialização: {0}")]
    Deserialize(String),
}

/// Envelope decodificado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// `false` se o primeiro byte não for [`ACK`]; não invalida o envelope
    pub ack_ok: bool,
    pub ack: u8,
    /// Checksum transmitido pelo firmware
    pub checksum: u16,
    pub frame: TelemetryFrame,
    /// Bytes brutos do frame, base para o CRC
    pub frame_bytes: [u8; FRAME_SIZE],
}

impl Envelope {
    /// CRC-16/ARC calculado localmente sobre os bytes do frame.
    pub fn computed_checksum(&self) -> u16 {
        checksum(&self.frame_bytes)
    }

    pub fn checksum_matches(&self) -> bool {
        self.computed_checksum() == self.checksum
    }
}

/// Codifica a requisição de telemetria.
pub fn encode_poll_request() -> [u8; 1] {
    [POLL_REQUEST]
}

/// Serializa um [`TelemetryFrame`] no layout do fio.
pub fn encode_frame(frame: &TelemetryFrame) -> Result<Vec<u8>, ProtocolError> {
    bincode::serialize(frame).map_err(|e| ProtocolError::Serialize(e.to_string()))
}

/// Deserializa exatamente [`FRAME_SIZE`] bytes em [`TelemetryFrame`].
pub fn decode_frame(data: &[u8]) -> Result<TelemetryFrame, ProtocolError> {
    if data.len() != FRAME_SIZE {
        return Err(ProtocolError::WrongLength {
            expected: FRAME_SIZE,
            actual: data.len(),
        });
    }
    bincode::deserialize(data).map_err(|e| ProtocolError::Deserialize(e.to_string()))
}

/// Monta um envelope completo. Usado pelo dispositivo simulado.
pub fn encode_envelope(ack: u8, checksum: u16, frame: &TelemetryFrame) -> Result<Vec<u8>, ProtocolError> {
    let body = encode_frame(frame)?;

    let mut envelope = Vec::with_capacity(ENVELOPE_SIZE);
    envelope.push(ack);
    envelope.extend_from_slice(&checksum.to_le_bytes());
    envelope.extend_from_slice(&body);

    Ok(envelope)
}

/// Monta um envelope com ACK e CRC corretos.
pub fn encode_valid_envelope(frame: &TelemetryFrame) -> Result<Vec<u8>, ProtocolError> {
    let body = encode_frame(frame)?;
    encode_envelope(ACK, checksum(&body), frame)
}

/// Decodifica a resposta do firmware.
///
/// Só falha se o tamanho for diferente de [`ENVELOPE_SIZE`]. ACK incorreto é
/// reportado em [`Envelope::ack_ok`].
pub fn decode_envelope(data: &[u8]) -> Result<Envelope, ProtocolError> {
    if data.len() != ENVELOPE_SIZE {
        return Err(ProtocolError::WrongLength {
            expected: ENVELOPE_SIZE,
            actual: data.len(),
        });
    }

    let ack = data[0];
    let checksum = u16::from_le_bytes([data[1], data[2]]);

    let mut frame_bytes = [0u8; FRAME_SIZE];
    frame_bytes.copy_from_slice(&data[HEADER_SIZE..]);
    let frame = decode_frame(&frame_bytes)?;

    Ok(Envelope {
        ack_ok: ack == ACK,
        ack,
        checksum,
        frame,
        frame_bytes,
    })
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> TelemetryFrame {
        TelemetryFrame {
            msg_type: 1,
            msg_id: 0x1234,
            thermocouple_temp: 2500,
            gas_temp: 2050,
            outlet_temp: 1980,
        }
    }

    #[test]
    fn frame_layout_is_packed_little_endian() {
        let bytes = encode_frame(&sample_frame()).unwrap();
        assert_eq!(
            bytes,
            vec![0x01, 0x34, 0x12, 0xC4, 0x09, 0x02, 0x08, 0xBC, 0x07]
        );
    }

    #[test]
    fn frame_bytes_roundtrip() {
        let raw_frames: [[u8; FRAME_SIZE]; 3] = [
            [0x01, 0x34, 0x12, 0xC4, 0x09, 0x02, 0x08, 0xBC, 0x07],
            [0xFF, 0xFF, 0xFF, 0x00, 0x80, 0xFF, 0x7F, 0x9C, 0xFF],
            [0; FRAME_SIZE],
        ];
        for raw in raw_frames {
            let frame = decode_frame(&raw).unwrap();
            assert_eq!(encode_frame(&frame).unwrap(), raw.to_vec());
        }
    }

    #[test]
    fn negative_temperatures_decode() {
        let raw = [0x00, 0x00, 0x00, 0x00, 0x80, 0x9C, 0xFF, 0x00, 0x00];
        let frame = decode_frame(&raw).unwrap();
        assert_eq!(frame.thermocouple_temp, i16::MIN);
        assert_eq!(frame.gas_temp, -100);
    }

    #[test]
    fn poll_request_is_ascii_t() {
        assert_eq!(encode_poll_request(), [b't']);
    }

    #[test]
    fn decodes_envelope_fields() {
        let frame = sample_frame();
        let envelope = encode_envelope(ACK, 0xBEEF, &frame).unwrap();
        assert_eq!(envelope.len(), ENVELOPE_SIZE);
        assert_eq!(&envelope[1..3], &[0xEF, 0xBE]);

        let decoded = decode_envelope(&envelope).unwrap();
        assert!(decoded.ack_ok);
        assert_eq!(decoded.checksum, 0xBEEF);
        assert_eq!(decoded.frame, frame);
        assert!(!decoded.checksum_matches());
    }

    #[test]
    fn valid_envelope_checksum_matches() {
        let envelope = encode_valid_envelope(&sample_frame()).unwrap();
        let decoded = decode_envelope(&envelope).unwrap();
        assert!(decoded.checksum_matches());
        assert_eq!(decoded.computed_checksum(), checksum(&envelope[3..]));
    }

    #[test]
    fn wrong_ack_is_not_a_decode_failure() {
        let envelope = encode_envelope(0x15, 0, &sample_frame()).unwrap();
        let decoded = decode_envelope(&envelope).unwrap();
        assert!(!decoded.ack_ok);
        assert_eq!(decoded.ack, 0x15);
        assert_eq!(decoded.frame, sample_frame());
    }

    #[test]
    fn rejects_any_other_length() {
        let data = [ACK; 32];
        for len in 0..data.len() {
            if len == ENVELOPE_SIZE {
                continue;
            }
            assert!(matches!(
                decode_envelope(&data[..len]),
                Err(ProtocolError::WrongLength { expected: ENVELOPE_SIZE, actual }) if actual == len
            ));
        }
    }

    #[test]
    fn rejects_short_frame() {
        assert!(matches!(
            decode_frame(&[0x01, 0x02]),
            Err(ProtocolError::WrongLength { expected: FRAME_SIZE, actual: 2 })
        ));
    }
}
