// SPDX-FileCopyrightText: 2025-2026 TII (SSRC) and the Ghaf contributors
// SPDX-License-Identifier: Apache-2.0

//! Test doubles: an in-memory SPARQL store and a scripted scanner.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use oxigraph::model::Term as OxTerm;
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;
use tempfile::TempDir;

use crate::config::{DEFAULT_CLAMD_SOCKET, ServiceConfig, ShareConfig};
use crate::model::{Term, TermKind};
use crate::scanner::{ScanEngineError, ScanReport, VirusScanner};
use crate::sparql::{NFO_FILE_DATA_OBJECT, Solution, StoreError, TripleStore};

const NIE_DATA_SOURCE: &str = "http://www.semanticdesktop.org/ontologies/2007/01/19/nie#dataSource";

// =============================================================================
// Store
// =============================================================================

/// [`TripleStore`] backed by an in-memory oxigraph store.
pub struct MemoryStore {
    store: Store,
    updates: AtomicUsize,
    fail_queries: AtomicBool,
    fail_updates: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            store: Store::new().unwrap(),
            updates: AtomicUsize::new(0),
            fail_queries: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
        }
    }

    /// Load fixture data, bypassing the failure switches and the counter.
    #[allow(deprecated)]
    pub fn load(&self, update: &str) {
        self.store.update(update).unwrap();
    }

    /// What the file service writes for an upload: a logical file and a
    /// physical file pointing back at it, both in `graph`.
    pub fn add_file(&self, graph: &str, logical: &str, physical: &str) {
        self.load(&format!(
            "INSERT DATA {{ GRAPH <{graph}> {{
                <{logical}> a <{NFO_FILE_DATA_OBJECT}> .
                <{physical}> a <{NFO_FILE_DATA_OBJECT}> ;
                    <{NIE_DATA_SOURCE}> <{logical}> .
            }} }}"
        ));
    }

    /// Make the logical file visible in `graph` without a physical file.
    pub fn add_logical_only(&self, graph: &str, logical: &str) {
        self.load(&format!(
            "INSERT DATA {{ GRAPH <{graph}> {{ <{logical}> a <{NFO_FILE_DATA_OBJECT}> . }} }}"
        ));
    }

    pub fn fail_queries(&self) {
        self.fail_queries.store(true, Ordering::SeqCst);
    }

    pub fn fail_updates(&self) {
        self.fail_updates.store(true, Ordering::SeqCst);
    }

    /// Number of update statements that went through [`TripleStore::update`].
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Rows of a query, values rendered as plain strings.
    pub fn rows(&self, query: &str) -> Vec<HashMap<String, String>> {
        run_select(&self.store, query)
            .unwrap()
            .into_iter()
            .map(|row| row.into_iter().map(|(k, v)| (k, v.value)).collect())
            .collect()
    }
}

fn convert(term: &OxTerm) -> Term {
    match term {
        OxTerm::NamedNode(node) => Term::uri(node.as_str()),
        OxTerm::BlankNode(node) => Term {
            kind: TermKind::Bnode,
            value: node.as_str().to_owned(),
            datatype: None,
            lang: None,
        },
        OxTerm::Literal(literal) => Term {
            kind: TermKind::Literal,
            value: literal.value().to_owned(),
            datatype: Some(literal.datatype().as_str().to_owned()),
            lang: literal.language().map(str::to_owned),
        },
        #[allow(unreachable_patterns)]
        other => Term::literal(other.to_string()),
    }
}

fn store_error(e: impl std::fmt::Display) -> StoreError {
    StoreError::Status {
        status: 400,
        body: e.to_string(),
    }
}

#[allow(deprecated)]
fn run_select(store: &Store, query: &str) -> Result<Vec<Solution>, StoreError> {
    match store.query(query).map_err(store_error)? {
        QueryResults::Solutions(solutions) => {
            let mut rows = Vec::new();
            for solution in solutions {
                let solution = solution.map_err(store_error)?;
                rows.push(
                    solution
                        .iter()
                        .map(|(var, term)| (var.as_str().to_owned(), convert(term)))
                        .collect(),
                );
            }
            Ok(rows)
        }
        _ => Err(StoreError::Decode("not a SELECT query".into())),
    }
}

impl TripleStore for MemoryStore {
    async fn select(&self, query: &str) -> Result<Vec<Solution>, StoreError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(StoreError::Status {
                status: 503,
                body: "store offline".into(),
            });
        }
        run_select(&self.store, query)
    }

    #[allow(deprecated)]
    async fn update(&self, update: &str) -> Result<(), StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Status {
                status: 503,
                body: "store offline".into(),
            });
        }
        self.store.update(update).map_err(store_error)?;
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Scanner
// =============================================================================

/// What [`FakeScanner`] answers for a file.
#[derive(Debug, Clone)]
pub enum Scripted {
    Clean,
    Infected(Vec<String>),
    Unavailable,
    Garbled,
}

/// [`VirusScanner`] answering from a script keyed by file name.
pub struct FakeScanner {
    script: HashMap<String, Scripted>,
    fallback: Scripted,
    scanned: Mutex<Vec<PathBuf>>,
}

impl FakeScanner {
    pub fn answering(fallback: Scripted) -> Self {
        Self {
            script: HashMap::new(),
            fallback,
            scanned: Mutex::new(Vec::new()),
        }
    }

    pub fn clean() -> Self {
        Self::answering(Scripted::Clean)
    }

    #[must_use]
    pub fn with(mut self, file_name: &str, answer: Scripted) -> Self {
        self.script.insert(file_name.to_owned(), answer);
        self
    }

    /// Paths scanned so far, in call order.
    pub fn scanned(&self) -> Vec<PathBuf> {
        self.scanned.lock().unwrap().clone()
    }
}

impl VirusScanner for FakeScanner {
    async fn validate_availability(&self) -> Result<(), ScanEngineError> {
        match self.fallback {
            Scripted::Unavailable => Err(unavailable()),
            _ => Ok(()),
        }
    }

    async fn scan_path(&self, path: &Path) -> Result<ScanReport, ScanEngineError> {
        self.scanned.lock().unwrap().push(path.to_path_buf());
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match self.script.get(&name).unwrap_or(&self.fallback) {
            Scripted::Clean => Ok(ScanReport::clean()),
            Scripted::Infected(names) => Ok(ScanReport::infected(names.clone())),
            Scripted::Unavailable => Err(unavailable()),
            Scripted::Garbled => Err(ScanEngineError::Indeterminate("stream: ???".into())),
        }
    }
}

fn unavailable() -> ScanEngineError {
    ScanEngineError::Connect {
        path: PathBuf::from(DEFAULT_CLAMD_SOCKET),
        source: io::Error::from(io::ErrorKind::ConnectionRefused),
    }
}

// =============================================================================
// Share volume
// =============================================================================

/// A temporary share root.
pub struct ShareFixture {
    dir: TempDir,
}

impl ShareFixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config(&self) -> ShareConfig {
        ShareConfig {
            root: self.path().to_path_buf(),
        }
    }

    /// Service config pointing at this share.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            share: self.config(),
            ..ServiceConfig::default()
        }
    }

    /// Write `content` at `relative` below the share root.
    pub fn write(&self, relative: &str, content: &[u8]) -> PathBuf {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }
}
