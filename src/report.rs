// SPDX-FileCopyrightText: 2025-2026 TII (SSRC) and the Ghaf contributors
// SPDX-License-Identifier: Apache-2.0

//! Batch summaries.

use log::{debug, info, warn};

use crate::model::{LogicalFileRef, Verdict};
use crate::orchestrator::FileReport;

/// What happened to a batch, grouped for the log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    /// One group per verdict, in vocabulary order. Empty groups are kept.
    pub by_verdict: Vec<(Verdict, Vec<LogicalFileRef>)>,
    /// Recorded, but the file was in no graph.
    pub orphans: Vec<LogicalFileRef>,
    /// The analysis could not be stored.
    pub storage_failures: Vec<(LogicalFileRef, String)>,
}

impl BatchSummary {
    #[must_use]
    pub fn files_with(&self, verdict: Verdict) -> &[LogicalFileRef] {
        self.by_verdict
            .iter()
            .find(|(v, _)| *v == verdict)
            .map(|(_, files)| files.as_slice())
            .unwrap_or(&[])
    }
}

#[must_use]
pub fn summarize(reports: &[FileReport]) -> BatchSummary {
    let mut summary = BatchSummary {
        total: reports.len(),
        by_verdict: Verdict::ALL.iter().map(|v| (*v, Vec::new())).collect(),
        ..BatchSummary::default()
    };

    for report in reports {
        let file = &report.outcome.file;
        if let Some((_, files)) = summary
            .by_verdict
            .iter_mut()
            .find(|(v, _)| *v == report.outcome.verdict)
        {
            files.push(file.clone());
        }
        match &report.recording {
            Ok(recorded) if recorded.is_orphan() => summary.orphans.push(file.clone()),
            Ok(_) => {}
            Err(e) => summary.storage_failures.push((file.clone(), e.to_string())),
        }
    }

    summary
}

/// `verdict: count` for every group in vocabulary order, empty ones included.
#[must_use]
pub fn verdict_counts(summary: &BatchSummary) -> Vec<String> {
    summary
        .by_verdict
        .iter()
        .map(|(verdict, files)| format!("{verdict}: {}", files.len()))
        .collect()
}

pub fn log_summary(summary: &BatchSummary) {
    info!("Scanned {} file(s)", summary.total);
    for ((verdict, files), line) in summary.by_verdict.iter().zip(verdict_counts(summary)) {
        info!("  {line}");
        for file in files {
            if *verdict == Verdict::Benign {
                debug!("    {file}");
            } else {
                info!("    {file}");
            }
        }
    }
    if !summary.orphans.is_empty() {
        warn!(
            "  {} analysis record(s) are in no graph: {}",
            summary.orphans.len(),
            join(&summary.orphans)
        );
    }
    for (file, error) in &summary.storage_failures {
        warn!("  not stored: {file}: {error}");
    }
}

fn join(files: &[LogicalFileRef]) -> String {
    files
        .iter()
        .map(LogicalFileRef::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
