// SPDX-FileCopyrightText: 2025-2026 TII (SSRC) and the Ghaf contributors
// SPDX-License-Identifier: Apache-2.0

//! Change delta payloads and the selection of files worth scanning.
//!
//! The delta notifier posts an array of change sets, each listing inserted
//! and deleted triples. Only insertions of `?file a nfo:FileDataObject`
//! matter here; deletions are ignored.

use std::collections::HashSet;

use log::{debug, warn};
use serde::Deserialize;

use crate::model::{LogicalFileRef, Term, TermKind, is_physical};
use crate::sparql::{NFO_FILE_DATA_OBJECT, RDF_TYPE};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl Triple {
    fn declares_file(&self) -> bool {
        self.subject.kind == TermKind::Uri
            && self.predicate.is_uri(RDF_TYPE)
            && self.object.is_uri(NFO_FILE_DATA_OBJECT)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChangeSet {
    #[serde(default)]
    pub inserts: Vec<Triple>,
    #[serde(default)]
    pub deletes: Vec<Triple>,
}

/// A delta notification body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ChangeDelta(pub Vec<ChangeSet>);

impl ChangeDelta {
    pub fn inserts(&self) -> impl Iterator<Item = &Triple> {
        self.0.iter().flat_map(|set| set.inserts.iter())
    }

    #[must_use]
    pub fn has_inserts(&self) -> bool {
        self.inserts().next().is_some()
    }

    /// Logical files declared by inserted triples, in first-seen order.
    ///
    /// Physical file subjects are skipped: the file service declares both
    /// resources as `nfo:FileDataObject` and only the logical one is scanned.
    #[must_use]
    pub fn files_to_scan(&self) -> Vec<LogicalFileRef> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();

        for triple in self.inserts().filter(|t| t.declares_file()) {
            let subject = &triple.subject.value;
            if is_physical(subject) {
                debug!("Skipping physical file {subject}");
                continue;
            }
            if !seen.insert(subject.as_str()) {
                continue;
            }
            match LogicalFileRef::parse(subject) {
                Ok(file) => files.push(file),
                Err(e) => warn!("Ignoring file subject {subject:?}: {e}"),
            }
        }

        files
    }
}
