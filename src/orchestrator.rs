// SPDX-FileCopyrightText: 2025-2026 TII (SSRC) and the Ghaf contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-file scan pipeline.
//!
//! Each file goes `Pending -> Resolving -> Scanning -> Done | Failed`. A
//! failure while resolving or scanning never aborts the batch: it becomes an
//! `unknown` verdict carrying the diagnostic, and the outcome is still
//! recorded.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use thiserror::Error;

use crate::config::ServiceConfig;
use crate::model::{LogicalFileRef, PhysicalFileRef, Verdict};
use crate::recorder::{AnalysisRecorder, RecordedAnalysis, StorageError};
use crate::resolver::{FileResolver, ResolveError};
use crate::scanner::{ScanEngineError, ScanReport, VirusScanner};
use crate::sparql::TripleStore;

/// Where a file is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Pending,
    Resolving,
    Scanning,
    Done,
    Failed,
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Resolving => "resolving",
            Self::Scanning => "scanning",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Why a scan produced no verdict.
#[derive(Debug, Error)]
pub enum ScanFailure {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Engine(#[from] ScanEngineError),
}

/// Result of one scan attempt. Not persisted as such.
#[derive(Debug)]
pub struct ScanOutcome {
    pub file: LogicalFileRef,
    pub state: ItemState,
    pub verdict: Verdict,
    /// Signature names in scanner order; empty unless malicious.
    pub threat_names: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub error: Option<ScanFailure>,
    pub physical_file: Option<PhysicalFileRef>,
    pub resolved_path: Option<PathBuf>,
}

impl ScanOutcome {
    /// Fresh outcome for a file that has not been looked at yet.
    #[must_use]
    pub fn pending(file: LogicalFileRef) -> Self {
        let now = Utc::now();
        Self {
            file,
            state: ItemState::Pending,
            verdict: Verdict::Unknown,
            threat_names: Vec::new(),
            started_at: now,
            ended_at: now,
            error: None,
            physical_file: None,
            resolved_path: None,
        }
    }

    fn enter(&mut self, state: ItemState) {
        debug!("{}: {} -> {state}", self.file, self.state);
        self.state = state;
    }

    fn finish(&mut self, report: ScanReport) {
        if report.infected {
            self.verdict = Verdict::Malicious;
            self.threat_names = report.threat_names;
        } else {
            self.verdict = Verdict::Benign;
        }
        self.ended_at = Utc::now();
        self.enter(ItemState::Done);
    }

    fn fail(&mut self, failure: ScanFailure) {
        warn!("Scan of {} failed: {failure}", self.file);
        self.verdict = Verdict::Unknown;
        self.threat_names.clear();
        self.error = Some(failure);
        self.ended_at = Utc::now();
        self.enter(ItemState::Failed);
    }

    /// True when the logical file has no physical file in the store.
    #[must_use]
    pub const fn is_unresolved(&self) -> bool {
        matches!(self.error, Some(ScanFailure::Resolve(ResolveError::NotFound(_))))
    }
}

/// One processed item of a batch.
#[derive(Debug)]
pub struct FileReport {
    pub outcome: ScanOutcome,
    pub recording: Result<RecordedAnalysis, StorageError>,
}

pub struct ScanOrchestrator<S, V> {
    resolver: FileResolver<S>,
    scanner: Arc<V>,
    recorder: AnalysisRecorder<S>,
}

impl<S: TripleStore, V: VirusScanner> ScanOrchestrator<S, V> {
    pub fn new(store: Arc<S>, scanner: Arc<V>, config: &ServiceConfig) -> Self {
        Self {
            resolver: FileResolver::new(Arc::clone(&store), &config.share),
            scanner,
            recorder: AnalysisRecorder::new(store, &config.analysis_base_iri),
        }
    }

    /// Resolve and scan one file. Never fails; problems end up in the outcome.
    pub async fn scan(&self, file: LogicalFileRef) -> ScanOutcome {
        let mut outcome = ScanOutcome::pending(file);
        outcome.started_at = Utc::now();

        outcome.enter(ItemState::Resolving);
        let resolved = match self.resolver.locate(&outcome.file).await {
            Ok(resolved) => resolved,
            Err(e) => {
                outcome.fail(e.into());
                return outcome;
            }
        };
        outcome.physical_file = Some(resolved.physical);
        outcome.resolved_path = Some(resolved.path.clone());

        outcome.enter(ItemState::Scanning);
        match self.scanner.scan_path(&resolved.path).await {
            Ok(report) => outcome.finish(report),
            Err(e) => outcome.fail(e.into()),
        }
        outcome
    }

    pub async fn record(&self, outcome: &ScanOutcome) -> Result<RecordedAnalysis, StorageError> {
        self.recorder.record(outcome).await
    }

    /// Scan and record one file.
    pub async fn process(&self, file: LogicalFileRef) -> FileReport {
        let outcome = self.scan(file).await;
        let recording = self.record(&outcome).await;
        match &recording {
            Ok(recorded) => info!(
                "{} -> {} ({})",
                outcome.file, outcome.verdict, recorded.analysis.iri
            ),
            Err(e) => error!("{e}"),
        }
        FileReport { outcome, recording }
    }

    /// Process `worklist` one file at a time, in order.
    pub async fn run(&self, worklist: Vec<LogicalFileRef>) -> Vec<FileReport> {
        let total = worklist.len();
        let mut reports = Vec::with_capacity(total);
        for (index, file) in worklist.into_iter().enumerate() {
            debug!("[{}/{total}] {file}", index + 1);
            reports.push(self.process(file).await);
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeScanner, MemoryStore, Scripted, ShareFixture};
    use assert_matches::assert_matches;

    const GRAPH: &str = "http://mu.semte.ch/graphs/organizations/1";

    fn file(id: &str) -> LogicalFileRef {
        LogicalFileRef::parse(&format!("http://mu.semte.ch/services/file-service/files/{id}")).unwrap()
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        share: ShareFixture,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: Arc::new(MemoryStore::new()),
                share: ShareFixture::new(),
            }
        }

        /// Upload `id` as `uploads/<id>.bin` with `content`.
        fn upload(&self, id: &str, content: &[u8]) {
            self.store.add_file(
                GRAPH,
                file(id).as_str(),
                &format!("share://uploads/{id}.bin"),
            );
            self.share.write(&format!("uploads/{id}.bin"), content);
        }

        fn orchestrator(&self, scanner: FakeScanner) -> ScanOrchestrator<MemoryStore, FakeScanner> {
            ScanOrchestrator::new(
                Arc::clone(&self.store),
                Arc::new(scanner),
                &self.share.service_config(),
            )
        }
    }

    #[tokio::test]
    async fn clean_file_is_benign() {
        let fx = Fixture::new();
        fx.upload("a", b"hello");

        let outcome = fx.orchestrator(FakeScanner::clean()).scan(file("a")).await;

        assert_eq!(outcome.verdict, Verdict::Benign);
        assert_eq!(outcome.state, ItemState::Done);
        assert!(outcome.error.is_none());
        assert!(outcome.threat_names.is_empty());
        assert_eq!(
            outcome.resolved_path,
            Some(fx.share.path().join("uploads/a.bin"))
        );
        assert!(outcome.started_at <= outcome.ended_at);
    }

    #[tokio::test]
    async fn infected_file_is_malicious_with_names() {
        let fx = Fixture::new();
        fx.upload("a", b"X5O!P%@AP");
        let scanner = FakeScanner::clean().with(
            "a.bin",
            Scripted::Infected(vec!["Eicar-Signature".into(), "Other".into()]),
        );

        let outcome = fx.orchestrator(scanner).scan(file("a")).await;

        assert_eq!(outcome.verdict, Verdict::Malicious);
        assert_eq!(outcome.threat_names, vec!["Eicar-Signature", "Other"]);
    }

    #[tokio::test]
    async fn unresolved_file_is_unknown_without_scan() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator(FakeScanner::clean());

        let outcome = orchestrator.scan(file("ghost")).await;

        assert_eq!(outcome.verdict, Verdict::Unknown);
        assert_eq!(outcome.state, ItemState::Failed);
        assert!(outcome.is_unresolved());
        assert!(outcome.resolved_path.is_none());
        assert!(orchestrator.scanner.scanned().is_empty());
    }

    #[tokio::test]
    async fn missing_bytes_are_unknown() {
        let fx = Fixture::new();
        fx.store.add_file(GRAPH, file("a").as_str(), "share://uploads/a.bin");

        let outcome = fx.orchestrator(FakeScanner::clean()).scan(file("a")).await;

        assert_eq!(outcome.verdict, Verdict::Unknown);
        assert!(!outcome.is_unresolved());
        assert_matches!(
            outcome.error,
            Some(ScanFailure::Resolve(ResolveError::MissingOnDisk(_)))
        );
    }

    #[tokio::test]
    async fn engine_failure_is_unknown() {
        let fx = Fixture::new();
        fx.upload("a", b"data");

        let outcome = fx
            .orchestrator(FakeScanner::answering(Scripted::Unavailable))
            .scan(file("a"))
            .await;

        assert_eq!(outcome.verdict, Verdict::Unknown);
        assert_matches!(outcome.error, Some(ScanFailure::Engine(ScanEngineError::Connect { .. })));
        assert!(outcome.physical_file.is_some());
    }

    #[tokio::test]
    async fn indeterminate_answer_is_never_benign() {
        let fx = Fixture::new();
        fx.upload("a", b"data");

        let outcome = fx
            .orchestrator(FakeScanner::answering(Scripted::Garbled))
            .scan(file("a"))
            .await;

        assert_eq!(outcome.verdict, Verdict::Unknown);
        assert_matches!(
            outcome.error,
            Some(ScanFailure::Engine(ScanEngineError::Indeterminate(_)))
        );
    }

    #[tokio::test]
    async fn run_keeps_order_and_isolates_failures() {
        let fx = Fixture::new();
        fx.upload("a", b"one");
        fx.upload("c", b"three");
        let orchestrator = fx.orchestrator(
            FakeScanner::clean().with("c.bin", Scripted::Infected(vec!["Bad".into()])),
        );

        let reports = orchestrator
            .run(vec![file("a"), file("missing"), file("c")])
            .await;

        let verdicts: Vec<_> = reports.iter().map(|r| r.outcome.verdict).collect();
        assert_eq!(
            verdicts,
            vec![Verdict::Benign, Verdict::Unknown, Verdict::Malicious]
        );
        assert_eq!(reports[1].outcome.file, file("missing"));
        assert!(reports.iter().all(|r| r.recording.is_ok()));
        assert_eq!(fx.store.update_count(), 3);
        assert_eq!(
            orchestrator.scanner.scanned(),
            vec![
                fx.share.path().join("uploads/a.bin"),
                fx.share.path().join("uploads/c.bin"),
            ]
        );
    }

    #[tokio::test]
    async fn storage_failure_stays_with_its_item() {
        let fx = Fixture::new();
        fx.upload("a", b"one");
        fx.upload("b", b"two");
        fx.store.fail_updates();

        let reports = fx
            .orchestrator(FakeScanner::clean())
            .run(vec![file("a"), file("b")])
            .await;

        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.recording.is_err()));
        assert!(reports.iter().all(|r| r.outcome.verdict == Verdict::Benign));
    }
}
