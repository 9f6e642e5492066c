// SPDX-FileCopyrightText: 2025-2026 TII (SSRC) and the Ghaf contributors
// SPDX-License-Identifier: Apache-2.0

mod http;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use tokio::net::TcpListener;

use virus_scanner_service::config::{ServiceConfig, verify_config};
use virus_scanner_service::pipeline::Pipeline;
use virus_scanner_service::scanner::{ClamdScanner, VirusScanner};
use virus_scanner_service::sparql::SparqlClient;
use virus_scanner_service::util::{LogTarget, init_logger, wait_for_shutdown};

#[derive(Parser)]
#[command(name = "virus-scanner-service")]
#[command(about = "Scans uploaded files with ClamAV and records STIX malware analyses")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser)]
enum Commands {
    /// Start the service
    Run {
        /// JSON configuration file (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        debug: bool,
        /// Log destination: stderr or journal
        #[arg(long, default_value_t = LogTarget::Stderr)]
        log: LogTarget,
        #[arg(long, env = "BIND_ADDRESS")]
        bind: Option<SocketAddr>,
        #[arg(long, env = "MU_SPARQL_ENDPOINT")]
        sparql_endpoint: Option<String>,
        #[arg(long, env = "CLAMD_SOCKET")]
        clamd_socket: Option<PathBuf>,
        /// Local mount of the `share://` volume
        #[arg(long, env = "SHARE_ROOT")]
        share_root: Option<PathBuf>,
        /// Log every delta body received
        #[arg(long, env = "LOG_INCOMING_DELTA")]
        log_incoming_delta: bool,
        /// Log every direct scan request body received
        #[arg(long, env = "LOG_INCOMING_SCAN_REQUESTS")]
        log_incoming_scan_requests: bool,
    },
    /// Verify configuration file without starting the service
    Verify {
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            debug,
            log,
            bind,
            sparql_endpoint,
            clamd_socket,
            share_root,
            log_incoming_delta,
            log_incoming_scan_requests,
        } => {
            init_logger(log, debug)?;

            let mut config = match config {
                Some(path) => ServiceConfig::read(&path).with_context(|| {
                    format!("Failed to load configuration from {}", path.display())
                })?,
                None => ServiceConfig::default(),
            };

            if let Some(bind) = bind {
                config.bind = bind;
            }
            if let Some(endpoint) = sparql_endpoint {
                config.store.endpoint = endpoint;
            }
            if let Some(socket) = clamd_socket {
                config.clamd.socket = socket;
            }
            if let Some(root) = share_root {
                config.share.root = root;
            }
            config.log_incoming_delta |= log_incoming_delta;
            config.log_incoming_scan_requests |= log_incoming_scan_requests;

            config.ensure_valid()?;
            config.log_config_info();

            let store =
                Arc::new(SparqlClient::new(&config.store).context("Failed to build SPARQL client")?);
            let scanner = Arc::new(ClamdScanner::new(&config.clamd));
            match scanner.validate_availability().await {
                Ok(()) => match scanner.version().await {
                    Ok(version) => info!("ClamAV version: {version}"),
                    Err(e) => warn!("ClamAV version query failed: {e}"),
                },
                Err(e) => warn!(
                    "ClamAV unavailable: {e}. Scans will be recorded as unknown until it is reachable."
                ),
            }

            let pipeline = Arc::new(Pipeline::new(store, scanner, &config));
            serve(&config, pipeline)
                .await
                .context("Service execution failed")
        }
        Commands::Verify { config } => verify_config(&config)
            .with_context(|| format!("Failed to verify configuration file {}", config.display())),
    }
}

async fn serve(
    config: &ServiceConfig,
    pipeline: Arc<Pipeline<SparqlClient, ClamdScanner>>,
) -> Result<()> {
    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!("Listening on {}", config.bind);

    axum::serve(listener, http::router(Arc::clone(&pipeline), config.max_body_size))
        .with_graceful_shutdown(async {
            if let Err(e) = wait_for_shutdown().await {
                error!("Signal handling failed: {e}");
            }
        })
        .await?;

    pipeline.shutdown(config.shutdown_grace()).await;
    info!("Shutdown complete");
    Ok(())
}
