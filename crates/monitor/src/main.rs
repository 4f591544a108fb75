//! # Distillog Monitor
//!
//! Controlador headless do logger de temperatura: conecta ao Arduino, espera
//! o setup, liga o polling e imprime as amostras conforme chegam.
//!
//! ## Uso
//! ```bash
//! distillog_monitor --port /dev/ttyACM0            # Porta real
//! distillog_monitor --simulate --duration 30       # Dispositivo simulado
//! distillog_monitor --port COM3 --interval 500     # Intervalo em ms (200–100000)
//! ```

mod args;

use args::Args;
use crossbeam_channel::RecvTimeoutError;
use distillog_core::config::{AppConfig, MonitorConfig, clamp_poll_interval_ms};
use distillog_core::mock::MockDevice;
use distillog_core::transport::SerialOpener;
use distillog_core::{DeviceLogger, LinkEvent};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

fn main() -> ExitCode {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = match Args::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    // ── Config ──
    let config_path = args.config.clone().unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load(&config_path);

    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    if let Some(port) = args.port {
        config.link.port = port;
    }
    if let Some(ms) = args.interval_ms {
        config.link.poll_interval_ms = clamp_poll_interval_ms(ms);
    }
    if args.simulate && config.link.port.is_empty() {
        config.link.port = "SIM".into();
    }

    for problem in config.validate() {
        warn!("Config: {problem}");
    }
    if config.link.port.is_empty() {
        error!("Nenhuma porta serial configurada (use --port ou [link].port no config.toml)");
        return ExitCode::FAILURE;
    }

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   🌡  DISTILLOG MONITOR");
    println!("══════════════════════════════════════════════");
    println!("  Porta:     {}", config.link.port);
    println!("  Modo:      {}", if args.simulate { "simulado" } else { "serial" });
    println!("  Intervalo: {} ms", config.link.poll_interval_ms);
    println!("══════════════════════════════════════════════");
    println!();

    // ── Sessão ──
    let mut logger = DeviceLogger::new(config.link.clone());
    let started = if args.simulate {
        logger.start(MockDevice::arduino())
    } else {
        logger.start(SerialOpener)
    };
    if let Err(e) = started {
        error!("{e}");
        return ExitCode::FAILURE;
    }

    let code = monitor_loop(&logger, &config.monitor, args.duration);
    logger.stop();

    let stats = logger.stats();
    info!(
        "Resumo: {} polls | {} amostras | {} ignorados | {} ACK inválidos | {} checksums divergentes",
        stats.polls, stats.samples, stats.soft_misses, stats.ack_mismatches, stats.checksum_mismatches
    );
    code
}

/// Loop do controlador: reage ao setup, drena a fila e para em falha ou
/// quando `duration` expira.
fn monitor_loop(logger: &DeviceLogger, cfg: &MonitorConfig, duration: Option<Duration>) -> ExitCode {
    let events = logger.events();
    let drain_interval = Duration::from_millis(cfg.drain_interval_ms.max(1));
    let started = Instant::now();
    let mut received = 0usize;

    loop {
        match events.recv_timeout(drain_interval) {
            Ok(LinkEvent::StateChanged(state)) => debug!("Estado do link: {state}"),
            Ok(LinkEvent::SetupComplete) => debug!("Evento de setup recebido"),
            Ok(LinkEvent::Failed(_)) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if logger.is_setup_complete() {
            logger.acknowledge_setup();
            info!("Dispositivo pronto");
            if cfg.auto_start_polling {
                logger.start_polling();
            } else {
                info!("auto_start_polling desativado; aguardando sem polling");
            }
        }

        for sample in logger.drain_samples() {
            received += 1;
            info!(
                "#{received:<5} t={:>8.1}s | gás {:>7.2}° | saída {:>7.2}°",
                sample.elapsed_secs, sample.gas_temp, sample.outlet_temp
            );
        }

        if let Some(message) = logger.take_failure() {
            error!("Sessão falhou: {message}");
            return ExitCode::FAILURE;
        }
        if !logger.is_alive() {
            break;
        }
        if duration.is_some_and(|d| started.elapsed() >= d) {
            info!("Duração atingida, encerrando");
            break;
        }
    }

    ExitCode::SUCCESS
}
