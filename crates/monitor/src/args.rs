//! Argumentos de linha de comando.

use std::path::PathBuf;
use std::time::Duration;

/// Opções do monitor. Valores ausentes vêm do `config.toml`.
#[derive(Debug, Default, PartialEq)]
pub struct Args {
    pub config: Option<PathBuf>,
    pub port: Option<String>,
    pub interval_ms: Option<u64>,
    pub duration: Option<Duration>,
    pub simulate: bool,
}

impl Args {
    pub fn parse<I: IntoIterator<Item = String>>(iter: I) -> Result<Self, String> {
        let mut args = Args::default();
        let mut iter = iter.into_iter();

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--simulate" => args.simulate = true,
                "--config" => args.config = Some(PathBuf::from(value(&mut iter, &arg)?)),
                "--port" => args.port = Some(value(&mut iter, &arg)?),
                "--interval" => args.interval_ms = Some(number(&mut iter, &arg)?),
                "--duration" => {
                    let secs = number(&mut iter, &arg)?;
                    args.duration = (secs > 0).then(|| Duration::from_secs(secs));
                }
                other => return Err(format!("Argumento desconhecido: {other}")),
            }
        }

        Ok(args)
    }
}

fn value(iter: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
    iter.next().ok_or_else(|| format!("{flag} requer um valor"))
}

fn number(iter: &mut impl Iterator<Item = String>, flag: &str) -> Result<u64, String> {
    let raw = value(iter, flag)?;
    raw.parse()
        .map_err(|_| format!("{flag}: valor inválido '{raw}'"))
}
