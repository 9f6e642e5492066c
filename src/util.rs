// SPDX-FileCopyrightText: 2025-2026 TII (SSRC) and the Ghaf contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use log::info;

// =============================================================================
// Logger
// =============================================================================

/// Where log records go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogTarget {
    /// Human readable lines on stderr.
    #[default]
    Stderr,
    /// Structured records in the systemd journal.
    Journal,
}

impl std::fmt::Display for LogTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stderr => write!(f, "stderr"),
            Self::Journal => write!(f, "journal"),
        }
    }
}

impl std::str::FromStr for LogTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stderr" => Ok(Self::Stderr),
            "journal" => Ok(Self::Journal),
            _ => Err(format!("Invalid log target: {s}. Use: stderr, journal")),
        }
    }
}

/// Initialize the global logger.
///
/// `RUST_LOG` still refines the stderr logger below the chosen level.
pub fn init_logger(target: LogTarget, debug: bool) -> Result<()> {
    let log_level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    match target {
        LogTarget::Stderr => {
            env_logger::Builder::new()
                .filter_level(log_level)
                .parse_default_env()
                .try_init()?;
        }
        LogTarget::Journal => {
            systemd_journal_logger::JournalLog::new()?.install()?;
            log::set_max_level(log_level);
        }
    }
    Ok(())
}

// =============================================================================
// Signal Handling
// =============================================================================

/// Shutdown signal received.
#[derive(Debug, Clone, Copy)]
pub enum ShutdownSignal {
    Sigint,
    Sigterm,
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
pub async fn wait_for_shutdown() -> Result<ShutdownSignal> {
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received");
            Ok(ShutdownSignal::Sigint)
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received");
            Ok(ShutdownSignal::Sigterm)
        }
    }
}
