// SPDX-FileCopyrightText: 2025-2026 TII (SSRC) and the Ghaf contributors
// SPDX-License-Identifier: Apache-2.0

//! Triplestore access.
//!
//! The pipeline only needs two capabilities from the store: run a read query
//! and run an update statement. [`TripleStore`] captures those; [`SparqlClient`]
//! implements them over the SPARQL 1.1 protocol.
//!
//! The escape helpers build query text from values that were validated
//! beforehand (see [`crate::model::check_iri`]).

use std::collections::HashMap;
use std::future::Future;

use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use reqwest::header::{ACCEPT, HeaderValue};
use serde::Deserialize;
use thiserror::Error;

use crate::config::StoreConfig;
use crate::model::Term;

// =============================================================================
// Vocabulary
// =============================================================================

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const NFO_FILE_DATA_OBJECT: &str =
    "http://www.semanticdesktop.org/ontologies/2007/03/22/nfo#FileDataObject";
pub const XSD_DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";

pub const PREFIX_NFO: &str = "PREFIX nfo: <http://www.semanticdesktop.org/ontologies/2007/03/22/nfo#>";
pub const PREFIX_NIE: &str = "PREFIX nie: <http://www.semanticdesktop.org/ontologies/2007/01/19/nie#>";
pub const PREFIX_MU: &str = "PREFIX mu: <http://mu.semte.ch/vocabularies/core/>";
pub const PREFIX_STIX: &str = "PREFIX stix: <http://docs.oasis-open.org/cti/ns/stix#>";

const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";
const SUDO_HEADER: &str = "mu-auth-sudo";

// =============================================================================
// Escaping
// =============================================================================

/// `<iri>`. The IRI must already be validated.
#[must_use]
pub fn escape_uri(iri: &str) -> String {
    format!("<{iri}>")
}

/// Long-quoted string literal with backslashes and quotes escaped.
#[must_use]
pub fn escape_string(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"\"\"{escaped}\"\"\"")
}

/// `xsd:dateTime` literal in UTC with millisecond precision.
#[must_use]
pub fn escape_datetime(value: &DateTime<Utc>) -> String {
    format!(
        "\"{}\"^^<{XSD_DATE_TIME}>",
        value.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

// =============================================================================
// Store capability
// =============================================================================

/// One row of a SELECT result: variable name to bound term.
pub type Solution = HashMap<String, Term>;

/// Errors talking to the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SPARQL endpoint unreachable: {0}")]
    Http(#[from] reqwest::Error),
    #[error("SPARQL endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed SPARQL response: {0}")]
    Decode(String),
}

/// Read and write access to a triplestore.
pub trait TripleStore: Send + Sync {
    /// Run a SELECT query and return its solutions in store order.
    fn select(&self, query: &str) -> impl Future<Output = Result<Vec<Solution>, StoreError>> + Send;

    /// Run an update statement.
    fn update(&self, update: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[derive(Deserialize)]
struct SparqlResults {
    results: SparqlBindings,
}

#[derive(Deserialize)]
struct SparqlBindings {
    bindings: Vec<Solution>,
}

/// Decode a `application/sparql-results+json` document.
pub fn parse_select_results(body: &[u8]) -> Result<Vec<Solution>, StoreError> {
    serde_json::from_slice::<SparqlResults>(body)
        .map(|r| r.results.bindings)
        .map_err(|e| StoreError::Decode(e.to_string()))
}

// =============================================================================
// HTTP client
// =============================================================================

/// SPARQL 1.1 protocol client (form-encoded POST).
pub struct SparqlClient {
    http: reqwest::Client,
    endpoint: String,
    sudo: bool,
}

impl SparqlClient {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            sudo: config.sudo,
        })
    }

    async fn post(&self, param: &str, text: &str) -> Result<reqwest::Response, StoreError> {
        let mut request = self
            .http
            .post(&self.endpoint)
            .header(ACCEPT, HeaderValue::from_static(SPARQL_RESULTS_JSON))
            .form(&[(param, text)]);
        if self.sudo {
            request = request.header(SUDO_HEADER, HeaderValue::from_static("true"));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

impl TripleStore for SparqlClient {
    async fn select(&self, query: &str) -> Result<Vec<Solution>, StoreError> {
        debug!("SPARQL query:\n{query}");
        let body = self.post("query", query).await?.bytes().await?;
        parse_select_results(&body)
    }

    async fn update(&self, update: &str) -> Result<(), StoreError> {
        debug!("SPARQL update:\n{update}");
        let body = self.post("update", update).await?.text().await?;
        debug!("SPARQL update response: {body}");
        Ok(())
    }
}
