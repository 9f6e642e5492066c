// SPDX-FileCopyrightText: 2025-2026 TII (SSRC) and the Ghaf contributors
// SPDX-License-Identifier: Apache-2.0

//! Persistence of scan outcomes as STIX `MalwareAnalysis` resources.
//!
//! The analysis is written with one conditional update into every graph
//! where the scanned file is a `nfo:FileDataObject`, so it is visible to the
//! same users as the file itself. If the file is visible nowhere the update
//! writes nothing and the analysis is an orphan.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::model::{LogicalFileRef, Verdict};
use crate::orchestrator::ScanOutcome;
use crate::sparql::{
    PREFIX_MU, PREFIX_NFO, PREFIX_STIX, StoreError, TripleStore, escape_datetime, escape_string,
    escape_uri,
};

/// JSON:API resource type of analysis records.
pub const RESOURCE_TYPE: &str = "malware-analyses";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to store malware analysis of {file}: {source}")]
    Write {
        file: LogicalFileRef,
        #[source]
        source: StoreError,
    },
}

/// One scan attempt as it is written to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalwareAnalysis {
    pub id: Uuid,
    pub iri: String,
    pub sample_ref: LogicalFileRef,
    pub result: Verdict,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub threat_names: Vec<String>,
}

impl MalwareAnalysis {
    /// Threat names as stored in `stix:result_name`, if any.
    #[must_use]
    pub fn result_name(&self) -> Option<String> {
        if self.threat_names.is_empty() {
            return None;
        }
        serde_json::to_string(&self.threat_names).ok()
    }

    fn insert_statement(&self) -> String {
        let mut properties = vec![
            "a stix:MalwareAnalysis".to_string(),
            format!("mu:uuid {}", escape_string(&self.id.to_string())),
            format!("stix:analysis_started {}", escape_datetime(&self.started_at)),
            format!("stix:analysis_ended {}", escape_datetime(&self.ended_at)),
            format!("stix:result {}", escape_string(self.result.as_str())),
            format!("stix:sample_ref {}", escape_uri(self.sample_ref.as_str())),
        ];
        if let Some(names) = self.result_name() {
            properties.push(format!("stix:result_name {}", escape_string(&names)));
        }

        format!(
            "{PREFIX_MU}\n{PREFIX_NFO}\n{PREFIX_STIX}\n\
             INSERT {{\n  GRAPH ?g {{\n    {} {} .\n  }}\n}}\n\
             WHERE {{\n  GRAPH ?graph {{\n    {} a nfo:FileDataObject .\n  }}\n  BIND(?graph AS ?g)\n}}",
            escape_uri(&self.iri),
            properties.join(" ;\n      "),
            escape_uri(self.sample_ref.as_str()),
        )
    }

    fn graphs_query(&self) -> String {
        format!(
            "{PREFIX_STIX}\n\
             SELECT DISTINCT ?g WHERE {{\n  GRAPH ?g {{\n    {} a stix:MalwareAnalysis .\n  }}\n}}",
            escape_uri(&self.iri)
        )
    }
}

/// A stored analysis and the graphs holding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAnalysis {
    pub analysis: MalwareAnalysis,
    /// `None` when the write went through but the graphs could not be read back.
    pub graphs: Option<BTreeSet<String>>,
}

impl RecordedAnalysis {
    /// The file was not visible in any graph, so nothing was written.
    #[must_use]
    pub fn is_orphan(&self) -> bool {
        self.graphs.as_ref().is_some_and(BTreeSet::is_empty)
    }

    /// JSON:API document for the HTTP response.
    #[must_use]
    pub fn to_document(&self) -> AnalysisDocument {
        let analysis = &self.analysis;
        AnalysisDocument {
            data: AnalysisResource {
                kind: RESOURCE_TYPE,
                id: analysis.id.to_string(),
                attributes: AnalysisAttributes {
                    uri: analysis.iri.clone(),
                    analysis_started: analysis.started_at,
                    analysis_ended: analysis.ended_at,
                    result: analysis.result,
                    sample_ref: analysis.sample_ref.clone(),
                    result_name: analysis.result_name(),
                },
            },
            meta: AnalysisMeta {
                graphs: self
                    .graphs
                    .as_ref()
                    .map(|graphs| graphs.iter().cloned().collect()),
                orphan: self.is_orphan(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AnalysisDocument {
    pub data: AnalysisResource,
    pub meta: AnalysisMeta,
}

#[derive(Debug, Serialize)]
pub struct AnalysisResource {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
    pub attributes: AnalysisAttributes,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AnalysisAttributes {
    pub uri: String,
    pub analysis_started: DateTime<Utc>,
    pub analysis_ended: DateTime<Utc>,
    pub result: Verdict,
    pub sample_ref: LogicalFileRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalysisMeta {
    /// `null` when unknown.
    pub graphs: Option<Vec<String>>,
    pub orphan: bool,
}

pub struct AnalysisRecorder<S> {
    store: Arc<S>,
    base_iri: String,
}

impl<S: TripleStore> AnalysisRecorder<S> {
    pub fn new(store: Arc<S>, base_iri: &str) -> Self {
        Self {
            store,
            base_iri: base_iri.to_owned(),
        }
    }

    /// Build a fresh analysis for `outcome`. Every call mints a new id.
    #[must_use]
    pub fn prepare(&self, outcome: &ScanOutcome) -> MalwareAnalysis {
        let id = Uuid::new_v4();
        MalwareAnalysis {
            id,
            iri: format!("{}{id}", self.base_iri),
            sample_ref: outcome.file.clone(),
            result: outcome.verdict,
            started_at: outcome.started_at,
            ended_at: outcome.ended_at,
            threat_names: outcome.threat_names.clone(),
        }
    }

    /// Write a new analysis for `outcome` into every graph holding the file.
    ///
    /// Only a failed write is an error. The graphs are read back afterwards;
    /// if that query fails the analysis is still returned, with unknown graphs.
    pub async fn record(&self, outcome: &ScanOutcome) -> Result<RecordedAnalysis, StorageError> {
        let analysis = self.prepare(outcome);

        self.store
            .update(&analysis.insert_statement())
            .await
            .map_err(|source| StorageError::Write {
                file: analysis.sample_ref.clone(),
                source,
            })?;

        let graphs = match self.store.select(&analysis.graphs_query()).await {
            Ok(rows) => {
                let graphs: BTreeSet<String> = rows
                    .into_iter()
                    .filter_map(|mut row| row.remove("g"))
                    .map(|term| term.value)
                    .collect();
                if graphs.is_empty() {
                    warn!(
                        "{} is not in any graph, analysis {} was not stored",
                        analysis.sample_ref, analysis.iri
                    );
                } else {
                    debug!("Stored {} in {} graph(s)", analysis.iri, graphs.len());
                }
                Some(graphs)
            }
            Err(e) => {
                warn!("Stored {} but could not read back its graphs: {e}", analysis.iri);
                None
            }
        };

        Ok(RecordedAnalysis { analysis, graphs })
    }
}
