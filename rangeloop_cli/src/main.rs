//! `rangeloop` binary: ranging sensor acquisition and closed-loop hold.

mod backend;
mod cli;
mod error_fmt;
mod rt;
mod run;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;
use rangeloop_core::LoopError;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE, RtLock};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};
use crate::rt::RtRequest;

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(err) = real_main(&cli) {
        tracing::error!(error = %format!("{err:#}"), "command failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        std::process::exit(exit_code_for_error(&err));
    }
}

fn real_main(cli: &Cli) -> eyre::Result<()> {
    let cfg = load_config(&cli.config)?;
    init_tracing(cli.json, &cli.log_level, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "config loaded");

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        if let Err(e) = ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed)) {
            tracing::warn!(error = %e, "failed to install Ctrl-C handler");
        }
    }

    match &cli.cmd {
        Commands::Monitor {
            duration_ms,
            inches,
            std_dev_limit,
        } => {
            run::monitor(&cfg, *duration_ms, *inches, *std_dev_limit, cli.json, &stop)?;
        }
        Commands::Settings { out } => {
            run::settings(&cfg, out.as_deref(), cli.json)?;
        }
        Commands::SetMode { mode } => {
            run::set_mode(&cfg, (*mode).into(), cli.json)?;
        }
        Commands::Hold {
            setpoint_mm,
            profile,
            duration_ms,
            rt,
            rt_prio,
            rt_lock,
            rt_cpu,
        } => {
            let rt = rt.then(|| RtRequest {
                prio: *rt_prio,
                lock: rt_lock.unwrap_or_else(RtLock::os_default),
                cpu: *rt_cpu,
            });
            run::hold(&cfg, *setpoint_mm, *profile, *duration_ms, rt, cli.json, &stop)?;
        }
        Commands::SelfCheck { burst } => {
            run::self_check(&cfg, *burst, cli.json)?;
        }
    }
    Ok(())
}

/// Read, parse and validate the config file. Validation failures surface as
/// `LoopError::Config` so they share the config exit code.
fn load_config(path: &Path) -> eyre::Result<rangeloop_config::Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = rangeloop_config::load_toml(&text)
        .wrap_err_with(|| format!("parse config {}", path.display()))?;
    cfg.validate()
        .map_err(|e| LoopError::Config(e.to_string()))?;
    Ok(cfg)
}

/// Console logs go to stderr so stdout stays machine-readable. A file sink is
/// added when `[logging] file` is set; its guard lives for the whole process.
fn init_tracing(
    json: bool,
    console_level: &str,
    logging: &rangeloop_config::Logging,
) -> eyre::Result<()> {
    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(console_level))
        .wrap_err_with(|| format!("invalid --log-level {console_level:?}"))?;
    let console: Box<dyn Layer<Registry> + Send + Sync> = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).boxed()
    };

    let file_layer = match &logging.file {
        Some(file) => {
            let path = Path::new(file);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file has no file name: {file}"))?;
            let appender = match logging.rotation.as_deref() {
                Some("daily") => tracing_appender::rolling::daily(dir, name),
                Some("hourly") => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            let level = logging.level.as_deref().unwrap_or("info");
            let file_filter = EnvFilter::try_new(level)
                .wrap_err_with(|| format!("invalid logging.level {level:?}"))?;
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(file_filter),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console.with_filter(console_filter))
        .with(file_layer)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    Ok(())
}
