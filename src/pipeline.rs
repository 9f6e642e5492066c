// SPDX-FileCopyrightText: 2025-2026 TII (SSRC) and the Ghaf contributors
// SPDX-License-Identifier: Apache-2.0

//! Entry points into the scanning pipeline.
//!
//! Deltas are acknowledged immediately and processed as a background batch
//! tracked by a [`TaskTracker`]; direct requests scan a single file and wait
//! for the stored analysis.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use log::{debug, error, info, warn};
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use crate::config::ServiceConfig;
use crate::delta::ChangeDelta;
use crate::model::{LogicalFileRef, RefError};
use crate::orchestrator::ScanOrchestrator;
use crate::recorder::{RecordedAnalysis, StorageError};
use crate::report::{BatchSummary, log_summary, summarize};
use crate::scanner::VirusScanner;
use crate::sparql::TripleStore;

/// What became of a delta notification.
#[derive(Debug)]
pub enum DeltaAck {
    /// The delta inserted nothing.
    NoInserts,
    /// Insertions, but no logical files among them.
    NoFiles,
    /// A batch was submitted; the handle resolves when it is done.
    Accepted {
        files: usize,
        batch: JoinHandle<BatchSummary>,
    },
}

/// Rejections of a direct scan request.
#[derive(Debug, Error)]
pub enum ScanRequestError {
    #[error("`file` must be a non-empty string")]
    MissingFile,
    #[error("invalid `file`: {0}")]
    InvalidFile(RefError),
    #[error("{0} is a physical file IRI, should be a logical file IRI")]
    PhysicalFile(String),
    #[error("No physical file IRI found for: {0}")]
    Unresolved(LogicalFileRef),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Extract the logical file from a `{ "file": "<iri>" }` body.
pub fn requested_file(body: &Value) -> Result<LogicalFileRef, ScanRequestError> {
    let raw = body
        .get("file")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(ScanRequestError::MissingFile)?;
    LogicalFileRef::parse(raw).map_err(|e| match e {
        RefError::Physical(iri) => ScanRequestError::PhysicalFile(iri),
        other => ScanRequestError::InvalidFile(other),
    })
}

pub struct Pipeline<S, V> {
    orchestrator: Arc<ScanOrchestrator<S, V>>,
    tracker: TaskTracker,
    log_incoming_delta: bool,
    log_incoming_scan_requests: bool,
}

impl<S, V> Pipeline<S, V>
where
    S: TripleStore + 'static,
    V: VirusScanner + 'static,
{
    pub fn new(store: Arc<S>, scanner: Arc<V>, config: &ServiceConfig) -> Self {
        Self {
            orchestrator: Arc::new(ScanOrchestrator::new(store, scanner, config)),
            tracker: TaskTracker::new(),
            log_incoming_delta: config.log_incoming_delta,
            log_incoming_scan_requests: config.log_incoming_scan_requests,
        }
    }

    /// Pick the files out of `delta` and scan them in the background.
    pub fn handle_delta(&self, delta: &ChangeDelta) -> DeltaAck {
        if self.log_incoming_delta {
            info!("Received delta: {delta:?}");
        }

        if !delta.has_inserts() {
            debug!("Delta without inserts, nothing to do");
            return DeltaAck::NoInserts;
        }

        let files = delta.files_to_scan();
        if files.is_empty() {
            debug!("No logical files in delta, nothing to do");
            return DeltaAck::NoFiles;
        }

        info!("Scheduling {} file(s) for scanning", files.len());
        DeltaAck::Accepted {
            files: files.len(),
            batch: self.submit(files),
        }
    }

    /// Run `files` as one sequential batch on the tracker.
    pub fn submit(&self, files: Vec<LogicalFileRef>) -> JoinHandle<BatchSummary> {
        let orchestrator = Arc::clone(&self.orchestrator);
        self.tracker.spawn(async move {
            match AssertUnwindSafe(orchestrator.run(files)).catch_unwind().await {
                Ok(reports) => {
                    let summary = summarize(&reports);
                    log_summary(&summary);
                    summary
                }
                Err(_) => {
                    error!("Scan batch panicked, remaining files were not scanned");
                    BatchSummary::default()
                }
            }
        })
    }

    /// Scan one file on request and return the stored analysis.
    ///
    /// A logical file without a physical file is rejected without recording
    /// anything.
    pub async fn scan_single(&self, body: &Value) -> Result<RecordedAnalysis, ScanRequestError> {
        if self.log_incoming_scan_requests {
            info!("Received scan request: {body}");
        }

        let file = requested_file(body)?;
        let outcome = self.orchestrator.scan(file).await;
        if outcome.is_unresolved() {
            return Err(ScanRequestError::Unresolved(outcome.file));
        }

        let recorded = self.orchestrator.record(&outcome).await?;
        info!(
            "{} -> {} ({})",
            outcome.file, outcome.verdict, recorded.analysis.iri
        );
        Ok(recorded)
    }

    /// Stop accepting batches and wait up to `grace` for running ones.
    pub async fn shutdown(&self, grace: Duration) {
        self.tracker.close();
        if self.tracker.is_empty() {
            return;
        }
        info!(
            "Waiting up to {}s for {} scan batch(es)",
            grace.as_secs(),
            self.tracker.len()
        );
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                "Shutdown timeout, abandoning {} scan batch(es)",
                self.tracker.len()
            );
        }
    }
}
