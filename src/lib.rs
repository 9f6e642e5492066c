// SPDX-FileCopyrightText: 2025-2026 TII (SSRC) and the Ghaf contributors
// SPDX-License-Identifier: Apache-2.0

//! Virus scanning gate for a linked-data document platform.
//!
//! Files uploaded to the platform show up as `nfo:FileDataObject` triples in
//! change deltas. This library picks them out, resolves each logical file to
//! the bytes on the shared volume, scans them with `ClamAV`, and stores a STIX
//! `MalwareAnalysis` resource in every graph the file is visible in.
//!
//! # Modules
//!
//! - [`delta`] - Delta payload model and the file filter
//! - [`resolver`] - Logical to physical file lookup
//! - [`scanner`] - Scan capability and the clamd socket client
//! - [`recorder`] - Conditional insert of analysis resources
//! - [`orchestrator`] - Sequential per-file pipeline with failure isolation
//! - [`report`] - Batch summaries for the log
//! - [`pipeline`] - Delta and direct-request entry points
//! - [`sparql`] - Store capability, escaping, and the HTTP SPARQL client

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod delta;
pub mod model;
pub mod orchestrator;
pub mod pipeline;
pub mod recorder;
pub mod report;
pub mod resolver;
pub mod scanner;
pub mod sparql;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;
