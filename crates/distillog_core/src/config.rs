//! Configuração unificada via TOML.
//!
//! Um único `config.toml` ao lado do executável com as seções `[link]` e
//! `[monitor]`.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Falha ao ler ou gravar o config.toml.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro ao ler {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Erro ao parsear {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },

    #[error("Erro ao serializar configuração: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Erro ao gravar {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Baud rate fixo do firmware.
pub const BAUD_RATE: u32 = 115_200;

/// Limites do intervalo de polling (ms).
pub const POLL_INTERVAL_MIN_MS: u64 = 200;
pub const POLL_INTERVAL_MAX_MS: u64 = 100_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Limita o intervalo de polling ao intervalo aceito pelo firmware.
///
/// Responsabilidade do controlador: o link aplica o valor recebido como está.
pub fn clamp_poll_interval_ms(value: u64) -> u64 {
    value.clamp(POLL_INTERVAL_MIN_MS, POLL_INTERVAL_MAX_MS)
}

/// Política para checksum divergente.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumPolicy {
    /// Loga e aceita a amostra
    #[default]
    Warn,
    /// Descarta a amostra (tick ignorado)
    Reject,
}

/// Configuração do link serial (uma sessão).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Porta serial (ex.: "COM3", "/dev/ttyACM0")
    pub port: String,
    /// Timeout de cada leitura (ms)
    pub read_timeout_ms: u64,
    /// Tempo máximo para o firmware imprimir "SETUP DONE!" (s)
    pub setup_timeout_secs: u64,
    /// Intervalo inicial de polling (ms)
    pub poll_interval_ms: u64,
    /// Espera máxima pelo start da thread do worker (s)
    pub start_timeout_secs: u64,
    pub checksum_policy: ChecksumPolicy,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            read_timeout_ms: 500,
            setup_timeout_secs: 15,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            start_timeout_secs: 5,
            checksum_policy: ChecksumPolicy::Warn,
        }
    }
}

impl LinkConfig {
    pub fn with_port(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Default::default()
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn setup_timeout(&self) -> Duration {
        Duration::from_secs(self.setup_timeout_secs)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }
}

/// Configuração do monitor (controlador headless).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Intervalo entre drenagens da fila (ms)
    pub drain_interval_ms: u64,
    /// Inicia o polling assim que o setup termina
    pub auto_start_polling: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            drain_interval_ms: 250,
            auto_start_polling: true,
        }
    }
}

/// Configuração raiz do aplicativo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub link: LinkConfig,
    pub monitor: MonitorConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    ///
    /// Arquivo ausente ou inválido cai nos valores padrão com um aviso.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match Self::try_load(path) {
                Ok(config) => {
                    info!("Configuração carregada de {}", path.display());
                    return config;
                }
                Err(e) => warn!("{e}"),
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Lê e parseia o arquivo, sem fallback.
    pub fn try_load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    ///
    /// Porta vazia é permitida aqui (pode vir da linha de comando).
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let link = &self.link;

        if link.read_timeout_ms == 0 {
            errors.push("Timeout de leitura não pode ser 0".into());
        }
        if link.setup_timeout_secs == 0 {
            errors.push("Timeout de setup não pode ser 0".into());
        }
        if link.start_timeout_secs == 0 {
            errors.push("Timeout de start não pode ser 0".into());
        }
        if link.poll_interval_ms != clamp_poll_interval_ms(link.poll_interval_ms) {
            errors.push(format!(
                "Intervalo de polling inválido: {} ms ({POLL_INTERVAL_MIN_MS}–{POLL_INTERVAL_MAX_MS})",
                link.poll_interval_ms
            ));
        }
        if self.monitor.drain_interval_ms == 0 {
            errors.push("Intervalo de drenagem não pode ser 0".into());
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        let errors = config.validate();
        assert!(errors.is_empty(), "Erros: {:?}", errors);
    }

    #[test]
    fn protocol_defaults() {
        let link = LinkConfig::default();
        assert_eq!(link.read_timeout(), Duration::from_millis(500));
        assert_eq!(link.setup_timeout(), Duration::from_secs(15));
        assert_eq!(link.start_timeout(), Duration::from_secs(5));
        assert_eq!(link.poll_interval_ms, 1000);
        assert_eq!(link.checksum_policy, ChecksumPolicy::Warn);
    }

    #[test]
    fn roundtrip_toml() {
        let mut config = AppConfig::default();
        config.link.port = "/dev/ttyACM0".into();
        config.link.checksum_policy = ChecksumPolicy::Reject;
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.link.port, "/dev/ttyACM0");
        assert_eq!(parsed.link.checksum_policy, ChecksumPolicy::Reject);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let partial = r#"
[link]
port = "COM3"
checksum_policy = "reject"
"#;
        let config: AppConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.link.port, "COM3");
        assert_eq!(config.link.checksum_policy, ChecksumPolicy::Reject);
        assert_eq!(config.link.read_timeout_ms, 500);
        assert_eq!(config.monitor.drain_interval_ms, 250);
    }

    #[test]
    fn clamps_poll_interval() {
        assert_eq!(clamp_poll_interval_ms(0), 200);
        assert_eq!(clamp_poll_interval_ms(750), 750);
        assert_eq!(clamp_poll_interval_ms(1_000_000), 100_000);
    }

    /// Caminho único em temp_dir para cada teste.
    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("distillog-{}-{name}", std::process::id()))
    }

    #[test]
    fn save_then_try_load_roundtrip() {
        let path = scratch_path("roundtrip.toml");
        let mut config = AppConfig::default();
        config.link.port = "/dev/ttyACM0".into();
        config.link.poll_interval_ms = 750;

        config.save(&path).unwrap();
        let loaded = AppConfig::try_load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.link.port, "/dev/ttyACM0");
        assert_eq!(loaded.link.poll_interval_ms, 750);
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let path = scratch_path("garbage.toml");
        std::fs::write(&path, "[link\nport = ").unwrap();

        let err = AppConfig::try_load(&path).unwrap_err();
        let fallback = AppConfig::load(&path);
        std::fs::remove_file(&path).ok();

        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("garbage.toml"));
        assert_eq!(fallback.link.poll_interval_ms, LinkConfig::default().poll_interval_ms);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = AppConfig::try_load(&scratch_path("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn save_into_missing_directory_is_a_write_error() {
        let path = scratch_path("no-such-dir").join("config.toml");
        let err = AppConfig::default().save(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Write { .. }));
    }

    #[test]
    fn rejects_out_of_range_interval() {
        let mut config = AppConfig::default();
        config.link.poll_interval_ms = 50;
        assert_eq!(config.validate().len(), 1);
    }
}
