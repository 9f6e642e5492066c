// SPDX-FileCopyrightText: 2025-2026 TII (SSRC) and the Ghaf contributors
// SPDX-License-Identifier: Apache-2.0

use std::fs;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::model::check_iri;

/// Default clamd control socket (Debian/Ubuntu packaging).
pub const DEFAULT_CLAMD_SOCKET: &str = "/var/run/clamav/clamd.ctl";

/// Default SPARQL endpoint of a mu-semtech stack.
pub const DEFAULT_SPARQL_ENDPOINT: &str = "http://database:8890/sparql";

/// Default base IRI for new analysis resources; the UUID is appended.
pub const DEFAULT_ANALYSIS_BASE_IRI: &str = "http://data.gift/virus-scanner/analysis/id/";

/// Default request body limit, large enough for deltas of bulk uploads.
pub const DEFAULT_MAX_BODY_SIZE: usize = 50 * 1024 * 1024;

/// Largest chunk clamd accepts in one INSTREAM frame is bounded by `u32`.
const MAX_CHUNK_SIZE_LIMIT: usize = u32::MAX as usize;

// =============================================================================
// ScanMode
// =============================================================================

/// How file content is handed to clamd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Stream the bytes over the socket (works when clamd cannot see the share).
    #[default]
    Instream,
    /// Pass an open file descriptor (clamd must run on the same host).
    Fildes,
}

impl std::fmt::Display for ScanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Instream => write!(f, "instream"),
            Self::Fildes => write!(f, "fildes"),
        }
    }
}

impl std::str::FromStr for ScanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "instream" => Ok(Self::Instream),
            "fildes" => Ok(Self::Fildes),
            _ => Err(format!("Invalid scan mode: {s}. Use: instream, fildes")),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

/// Connection to the `ClamAV` daemon.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default, rename_all = "camelCase")]
pub struct ClamdConfig {
    /// Unix socket of clamd.
    pub socket: PathBuf,

    /// Content transfer mode (default: instream).
    pub mode: ScanMode,

    /// Maximum INSTREAM frame size in bytes (default 1 MiB).
    /// Must stay below clamd's `StreamMaxLength`.
    pub max_chunk_size: usize,
}

impl Default for ClamdConfig {
    fn default() -> Self {
        Self {
            socket: PathBuf::from(DEFAULT_CLAMD_SOCKET),
            mode: ScanMode::default(),
            max_chunk_size: 1024 * 1024,
        }
    }
}

/// SPARQL endpoint used for lookups and analysis inserts.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    pub endpoint: String,

    /// Send `mu-auth-sudo: true` so the authorization layer is bypassed.
    /// Needed to insert into graphs the service has no session for.
    pub sudo: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_SPARQL_ENDPOINT.to_string(),
            sudo: true,
        }
    }
}

/// Local mount of the file service share.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default, rename_all = "camelCase")]
pub struct ShareConfig {
    /// Directory that `share://` IRIs are relative to.
    pub root: PathBuf,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/share"),
        }
    }
}

/// Service configuration, built once at startup and handed to each component.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceConfig {
    /// HTTP listen address (default 0.0.0.0:80).
    pub bind: SocketAddr,

    /// Base IRI for analysis resources.
    pub analysis_base_iri: String,

    /// Log every incoming delta body.
    pub log_incoming_delta: bool,

    /// Log every incoming direct scan request body.
    pub log_incoming_scan_requests: bool,

    /// Seconds to wait for running batches on shutdown.
    pub shutdown_grace_secs: u64,

    /// Largest accepted request body in bytes (default 50 MiB).
    pub max_body_size: usize,

    pub clamd: ClamdConfig,
    pub store: StoreConfig,
    pub share: ShareConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 80)),
            analysis_base_iri: DEFAULT_ANALYSIS_BASE_IRI.to_string(),
            log_incoming_delta: false,
            log_incoming_scan_requests: false,
            shutdown_grace_secs: 30,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            clamd: ClamdConfig::default(),
            store: StoreConfig::default(),
            share: ShareConfig::default(),
        }
    }
}

/// Check if a path is an accessible directory.
fn check_dir(dir: &Path) -> Result<(), &'static str> {
    match dir.metadata() {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err("is not a directory"),
        Err(e) if e.kind() == ErrorKind::NotFound => Err("does not exist"),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => Err("permission denied"),
        Err(_) => Err("is not accessible"),
    }
}

impl ServiceConfig {
    /// Validate configuration.
    /// Returns `Ok(())` if valid, or `Err(Vec<String>)` with error messages.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors: Vec<String> = Vec::new();

        if !(self.store.endpoint.starts_with("http://")
            || self.store.endpoint.starts_with("https://"))
        {
            errors.push(format!(
                "SPARQL endpoint '{}' is not an http(s) URL",
                self.store.endpoint
            ));
        }

        if let Err(e) = check_iri(&self.analysis_base_iri) {
            errors.push(format!("Analysis base IRI {e}"));
        } else if !(self.analysis_base_iri.ends_with('/') || self.analysis_base_iri.ends_with('#'))
        {
            errors.push("Analysis base IRI must end with '/' or '#'".to_string());
        }

        if !self.clamd.socket.is_absolute() {
            errors.push(format!(
                "clamd socket '{}' is not an absolute path",
                self.clamd.socket.display()
            ));
        }

        if self.clamd.max_chunk_size == 0 || self.clamd.max_chunk_size > MAX_CHUNK_SIZE_LIMIT {
            errors.push(format!(
                "maxChunkSize {} out of range (1..={MAX_CHUNK_SIZE_LIMIT})",
                self.clamd.max_chunk_size
            ));
        }

        if self.max_body_size == 0 {
            errors.push("maxBodySize must be greater than 0".to_string());
        }

        if let Err(e) = check_dir(&self.share.root) {
            errors.push(format!("Share root '{}' {e}", self.share.root.display()));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Log configuration info.
    pub fn log_config_info(&self) {
        info!(
            "SPARQL endpoint {} (sudo={})",
            self.store.endpoint, self.store.sudo
        );
        info!(
            "clamd socket {} (mode={}, chunk={}B)",
            self.clamd.socket.display(),
            self.clamd.mode,
            self.clamd.max_chunk_size
        );
        info!("Share root {}", self.share.root.display());
        info!("Listening address {} (body limit {}B)", self.bind, self.max_body_size);
        if self.log_incoming_delta {
            debug!("Logging incoming delta bodies");
        }
        if self.log_incoming_scan_requests {
            debug!("Logging incoming scan request bodies");
        }
    }

    /// Read configuration from a JSON file. Missing keys take defaults.
    pub fn read(config_path: &Path) -> Result<Self> {
        let config_data = fs::read(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        serde_json::from_slice(&config_data).context("Failed to parse config JSON")
    }

    /// Fail with all validation errors joined, after logging each one.
    pub fn ensure_valid(&self) -> Result<()> {
        if let Err(errors) = self.validate() {
            for err in &errors {
                log::error!("Configuration: {err}");
            }
            anyhow::bail!("Configuration has {} errors", errors.len());
        }
        Ok(())
    }
}

/// Verify configuration file without starting the service.
pub fn verify_config(config_path: &Path) -> Result<()> {
    let config = ServiceConfig::read(config_path)?;

    match config.validate() {
        Ok(()) => {
            eprintln!("Configuration valid");
            Ok(())
        }
        Err(errors) => {
            for err in &errors {
                eprintln!("{err}");
            }
            anyhow::bail!("Configuration has {} errors", errors.len())
        }
    }
}
