// SPDX-FileCopyrightText: Copyright © 2026 Nebula Contributors
//
// SPDX-License-Identifier: MPL-2.0

mod apply;
mod cli;
mod config;
mod error;
mod extract;
mod http;
mod index;
mod installation;
mod metadata;
mod service;
mod status;
mod token;

use clap::Parser;
use log::{error, info};

use cli::Cli;
use config::Config;
use metadata::TufMetadataUpdater;
use service::SystemdServiceController;
use token::GoogleServiceAccountTokenSource;

/// Main entry point. Only a failure to open the log file at startup is
/// fatal (spec §7); everything else is continuable and handled inside the
/// poller/watcher loops.
#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let (config, options) = cli.command.into_config();

    if let Err(e) = init_logging(&config) {
        eprintln!("fatal: could not open log file: {e}");
        return std::process::ExitCode::FAILURE;
    }

    info!(
        "nebula serve starting: http_addr={} internal_http_addr={} auto_update={}",
        options.http_addr, options.internal_http_addr, options.auto_update
    );

    match run(config).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal startup error: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

/// Writes to both stderr and `INSTALL_ROOT/nebula_tuf_client.log` (spec §6),
/// since `env_logger` only takes one target at a time.
struct TeeWriter {
    file: std::fs::File,
}

impl std::io::Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stderr().flush()?;
        self.file.flush()
    }
}

/// Opens `INSTALL_ROOT/nebula_tuf_client.log` and binds `env_logger` to a
/// sink that mirrors every record to it and to stderr. This is the one
/// startup step spec §7 calls fatal: if the log file cannot be opened, the
/// caller aborts before anything else runs.
fn init_logging(config: &Config) -> std::io::Result<()> {
    use std::io::Write as _;

    std::fs::create_dir_all(&config.install_root)?;
    let log_path = config.install_root.join("nebula_tuf_client.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let level = if config.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Pipe(Box::new(TeeWriter { file })))
        .init();
    Ok(())
}

/// Bootstraps the TUF trust root, then spawns the Metadata Poller and
/// Consent Watcher as two cooperating tasks, joined until shutdown (spec
/// §5). A `SIGINT`/`SIGTERM` flips the shared shutdown watch so each loop
/// finishes its current iteration before the process exits.
async fn run(config: Config) -> error::Result<()> {
    std::fs::create_dir_all(&config.install_root)
        .map_err(|e| error::Error::BootstrapFailed(format!("install root: {e}")))?;

    metadata::bootstrap_root_metadata(&config).await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let updater: Box<dyn metadata::MetadataUpdater> = Box::new(TufMetadataUpdater::new(&config));
    let token_source: Box<dyn token::TokenSource> =
        match GoogleServiceAccountTokenSource::from_key_file(&config.service_account_key_path) {
            Ok(source) => Box::new(source),
            Err(e) => {
                error!(
                    "could not load service account key at {:?}: {e}; falling back to an empty token source",
                    config.service_account_key_path
                );
                Box::new(token::StaticTokenSource(String::new()))
            }
        };
    let service: Box<dyn service::ServiceController> = match SystemdServiceController::connect().await {
        Ok(controller) => Box::new(controller),
        Err(e) => {
            error!("could not connect to systemd over D-Bus: {e}; restarts will fail until it is reachable");
            Box::new(service::RecordingServiceController::default())
        }
    };

    let poller = tokio::spawn(metadata::run_poller_loop(config.clone(), updater, shutdown_rx.clone()));
    let watcher = tokio::spawn(apply::run_watcher_loop(config, token_source, service, shutdown_rx));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal, waiting for current iteration to finish");
            let _ = shutdown_tx.send(true);
        }
    }

    let _ = poller.await;
    let _ = watcher.await;

    Ok(())
}
