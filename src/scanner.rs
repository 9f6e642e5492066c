// SPDX-FileCopyrightText: 2025-2026 TII (SSRC) and the Ghaf contributors
// SPDX-License-Identifier: Apache-2.0

//! Virus scanning capability.
//!
//! [`VirusScanner`] is a point-in-time infection check of a path on the share.
//! It keeps no state between calls; [`ClamdScanner`] opens one clamd
//! connection per call.
//!
//! Scan reports distinguish between:
//! - clean: `infected == false`, no threat names
//! - infected: `infected == true`, one name per matched signature
//!
//! Anything else (scanner unavailable, clamd `ERROR`, unparseable reply) is a
//! [`ScanEngineError`]. An indeterminate answer is never reported as clean.

use std::future::Future;
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use sendfd::SendWithFd;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::config::{ClamdConfig, ScanMode};

/// Outcome of a completed scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub infected: bool,
    /// Signature names, in the order clamd reported them.
    pub threat_names: Vec<String>,
}

impl ScanReport {
    #[must_use]
    pub const fn clean() -> Self {
        Self {
            infected: false,
            threat_names: Vec::new(),
        }
    }

    #[must_use]
    pub const fn infected(threat_names: Vec<String>) -> Self {
        Self {
            infected: true,
            threat_names,
        }
    }
}

/// The scanner could not give a verdict.
#[derive(Debug, Error)]
pub enum ScanEngineError {
    #[error("failed to connect to clamd at {}: {source}", path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("clamd I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("clamd error: {0}")]
    Engine(String),
    #[error("indeterminate clamd reply: {0:?}")]
    Indeterminate(String),
    #[error("scan task failed: {0}")]
    Blocking(String),
}

/// Virus scanner interface.
pub trait VirusScanner: Send + Sync {
    /// Check that the scanner is reachable and functional.
    fn validate_availability(&self) -> impl Future<Output = Result<(), ScanEngineError>> + Send;

    /// Scan the file at `path`.
    fn scan_path(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<ScanReport, ScanEngineError>> + Send;
}

/// `ClamAV` scanner talking to clamd over its Unix socket.
pub struct ClamdScanner {
    socket: PathBuf,
    mode: ScanMode,
    max_chunk_size: usize,
}

impl ClamdScanner {
    #[must_use]
    pub fn new(config: &ClamdConfig) -> Self {
        Self {
            socket: config.socket.clone(),
            mode: config.mode,
            max_chunk_size: config.max_chunk_size.max(1),
        }
    }

    async fn connect(&self) -> Result<UnixStream, ScanEngineError> {
        UnixStream::connect(&self.socket)
            .await
            .map_err(|source| ScanEngineError::Connect {
                path: self.socket.clone(),
                source,
            })
    }

    /// Send a bare command (PING, VERSION) and return the reply.
    async fn command(&self, command: &[u8]) -> Result<String, ScanEngineError> {
        let mut stream = self.connect().await?;
        stream.write_all(command).await?;
        read_reply(&mut stream).await
    }

    /// Report the clamd engine and signature database version.
    pub async fn version(&self) -> Result<String, ScanEngineError> {
        self.command(b"zVERSION\0").await
    }

    /// Stream the file in `max_chunk_size` frames (INSTREAM protocol).
    ///
    /// Frame: 4-byte big-endian length, then data. A zero length ends the stream.
    async fn send_stream_for_scan(&self, path: &Path) -> Result<String, ScanEngineError> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut stream = self.connect().await?;
        stream.write_all(b"zINSTREAM\0").await?;

        let mut buf = vec![0u8; self.max_chunk_size];
        let mut total: u64 = 0;
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            let len = u32::try_from(n).unwrap_or(u32::MAX);
            stream.write_all(&len.to_be_bytes()).await?;
            stream.write_all(&buf[..n]).await?;
            total += n as u64;
        }

        // End marker (4 zero bytes)
        stream.write_all(&[0, 0, 0, 0]).await?;
        debug!("Streamed {total} bytes of {}", path.display());

        read_reply(&mut stream).await
    }

    /// Pass an open descriptor to clamd (FILDES protocol). Blocking.
    fn send_fd_for_scan(socket: &Path, path: &Path) -> Result<String, ScanEngineError> {
        let file = std::fs::File::open(path)?;
        let mut stream = std::os::unix::net::UnixStream::connect(socket).map_err(|source| {
            ScanEngineError::Connect {
                path: socket.to_path_buf(),
                source,
            }
        })?;
        stream.write_all(b"nFILDES\n")?;
        stream.send_with_fd(&[0], &[file.as_raw_fd()])?;

        let mut buf = Vec::new();
        stream.read_to_end(&mut buf)?;
        Ok(clean_reply(&buf))
    }

    /// Parse a clamd reply into a [`ScanReport`].
    ///
    /// With `AllMatchScan` enabled clamd sends one `FOUND` line per signature.
    pub fn parse_response(response: &str, name_for_logging: &str) -> Result<ScanReport, ScanEngineError> {
        let mut threat_names = Vec::new();
        let mut clean = false;

        for line in response
            .split(['\0', '\n'])
            .map(str::trim)
            .filter(|l| !l.is_empty())
        {
            if line.ends_with("FOUND") {
                let signature = line
                    .rsplit_once(": ")
                    .map_or("unknown", |(_, s)| s.trim_end_matches(" FOUND"));
                threat_names.push(signature.to_string());
            } else if line.ends_with("ERROR") {
                error!("ClamAV error for {name_for_logging}: {line}");
                return Err(ScanEngineError::Engine(line.to_string()));
            } else if line.ends_with("OK") {
                clean = true;
            } else {
                error!("Unexpected ClamAV response for {name_for_logging}: {line}");
                return Err(ScanEngineError::Indeterminate(line.to_string()));
            }
        }

        if !threat_names.is_empty() {
            warn!("Virus in {name_for_logging}: {}", threat_names.join(", "));
            return Ok(ScanReport::infected(threat_names));
        }
        if clean {
            debug!("Clean: {name_for_logging}");
            return Ok(ScanReport::clean());
        }

        error!("Empty ClamAV response for {name_for_logging}");
        Err(ScanEngineError::Indeterminate(response.to_string()))
    }
}

impl VirusScanner for ClamdScanner {
    async fn validate_availability(&self) -> Result<(), ScanEngineError> {
        let response = self.command(b"zPING\0").await?;

        if response == "PONG" {
            info!("ClamAV daemon available: {}", self.socket.display());
            Ok(())
        } else {
            Err(ScanEngineError::Indeterminate(response))
        }
    }

    async fn scan_path(&self, path: &Path) -> Result<ScanReport, ScanEngineError> {
        debug!("ClamAV scanning ({}) {}", self.mode, path.display());

        let response = match self.mode {
            ScanMode::Instream => self.send_stream_for_scan(path).await?,
            ScanMode::Fildes => {
                let socket = self.socket.clone();
                let file = path.to_path_buf();
                tokio::task::spawn_blocking(move || Self::send_fd_for_scan(&socket, &file))
                    .await
                    .map_err(|e| ScanEngineError::Blocking(e.to_string()))??
            }
        };

        Self::parse_response(&response, &path.display().to_string())
    }
}

async fn read_reply<R: AsyncRead + Unpin>(stream: &mut R) -> Result<String, ScanEngineError> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    Ok(clean_reply(&buf))
}

fn clean_reply(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf)
        .trim_matches('\0')
        .trim()
        .to_string()
}
