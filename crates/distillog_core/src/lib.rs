//! # Distillog Core
//!
//! Comunicação com o microcontrolador do logger de temperatura via porta
//! serial: abre o link, espera o firmware concluir o boot, faz polling
//! periódico do frame de telemetria e entrega amostras decodificadas ao
//! controlador (UI ou logger) sem bloqueá-lo.
//!
//! ## Módulos
//! - [`protocol`] – Envelope de 12 bytes e frame empacotado (bincode)
//! - [`checksum`] – CRC-16/ARC
//! - [`link`] – Máquina de estados do worker
//! - [`queue`] – Fila de amostras worker → controlador
//! - [`logger`] – Fachada do controlador ([`DeviceLogger`])
//! - [`transport`] – Porta serial (`serialport`) e traits de transporte
//! - [`mock`] – Dispositivo simulado
//! - [`config`] – Configuração unificada via TOML
//! - [`clock`] – Relógio real e simulado

pub mod checksum;
pub mod clock;
pub mod config;
pub mod error;
pub mod link;
pub mod logger;
pub mod mock;
pub mod protocol;
pub mod queue;
pub mod transport;
pub mod types;

// Re-exports convenientes
pub use config::{AppConfig, ChecksumPolicy, ConfigError, LinkConfig, MonitorConfig};
pub use error::LinkError;
pub use link::{LinkEvent, LinkStats};
pub use logger::DeviceLogger;
pub use types::{DecodedSample, SessionState, TelemetryFrame};
