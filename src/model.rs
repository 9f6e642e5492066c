// SPDX-FileCopyrightText: 2025-2026 TII (SSRC) and the Ghaf contributors
// SPDX-License-Identifier: Apache-2.0

//! Core vocabulary: file references, RDF terms and scan verdicts.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// IRI scheme used by the file service for stored bytes on the shared volume.
pub const PHYSICAL_FILE_PREFIX: &str = "share://";

/// Characters that may not appear inside a SPARQL `IRIREF`.
const FORBIDDEN_IRI_CHARS: &[char] = &['<', '>', '"', '{', '}', '|', '^', '`', '\\'];

// =============================================================================
// File references
// =============================================================================

/// Reasons a string is rejected as a file reference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefError {
    #[error("file reference is empty")]
    Empty,
    #[error("file reference contains invalid IRI character {0:?}")]
    InvalidChar(char),
    #[error("{0} is a physical file IRI, should be a logical file IRI")]
    Physical(String),
    #[error("{0} is not a physical file IRI")]
    NotPhysical(String),
    #[error("{0} escapes the share root")]
    UnsafePath(String),
}

/// Check that `value` can be embedded verbatim as `<value>` in SPARQL.
pub fn check_iri(value: &str) -> Result<(), RefError> {
    if value.is_empty() {
        return Err(RefError::Empty);
    }
    match value
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || FORBIDDEN_IRI_CHARS.contains(c))
    {
        Some(c) => Err(RefError::InvalidChar(c)),
        None => Ok(()),
    }
}

/// Returns true if the IRI uses the physical file scheme.
#[must_use]
pub fn is_physical(iri: &str) -> bool {
    iri.starts_with(PHYSICAL_FILE_PREFIX)
}

/// A file as known to the domain model (the "virtual" file resource).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct LogicalFileRef(String);

impl LogicalFileRef {
    /// Validate a logical file IRI. Physical (`share://`) IRIs are refused.
    pub fn parse(value: &str) -> Result<Self, RefError> {
        check_iri(value)?;
        if is_physical(value) {
            return Err(RefError::Physical(value.to_owned()));
        }
        Ok(Self(value.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalFileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The stored bytes of a file, addressed as `share://<relative path>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PhysicalFileRef(String);

impl PhysicalFileRef {
    pub fn parse(value: &str) -> Result<Self, RefError> {
        check_iri(value)?;
        if !is_physical(value) {
            return Err(RefError::NotPhysical(value.to_owned()));
        }
        Ok(Self(value.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Map to a path below the local mount of the share.
    ///
    /// `share://uploads/my-file.pdf` with root `/share` is
    /// `/share/uploads/my-file.pdf`.
    pub fn to_path(&self, share_root: &Path) -> Result<PathBuf, RefError> {
        let relative = Path::new(&self.0[PHYSICAL_FILE_PREFIX.len()..]);
        if !is_safe_relative_path(relative) {
            return Err(RefError::UnsafePath(self.0.clone()));
        }
        Ok(share_root.join(relative))
    }
}

impl fmt::Display for PhysicalFileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check that a relative path has no traversal components (.. or absolute).
fn is_safe_relative_path(path: &Path) -> bool {
    !path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir))
}

// =============================================================================
// RDF terms
// =============================================================================

/// Kind of an RDF term, as named by the SPARQL JSON results format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TermKind {
    Uri,
    Literal,
    TypedLiteral,
    Bnode,
}

/// An RDF term in the JSON shape shared by delta messages and SPARQL results.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Term {
    #[serde(rename = "type")]
    pub kind: TermKind,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
    #[serde(default, rename = "xml:lang", skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

impl Term {
    #[must_use]
    pub fn uri(value: impl Into<String>) -> Self {
        Self {
            kind: TermKind::Uri,
            value: value.into(),
            datatype: None,
            lang: None,
        }
    }

    #[must_use]
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            kind: TermKind::Literal,
            value: value.into(),
            datatype: None,
            lang: None,
        }
    }

    /// Returns true if this is the IRI `iri`.
    #[must_use]
    pub fn is_uri(&self, iri: &str) -> bool {
        self.kind == TermKind::Uri && self.value == iri
    }
}

// =============================================================================
// Verdict
// =============================================================================

/// STIX 2.1 malware result vocabulary (`malware-result-ov`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Benign,
    Suspicious,
    Malicious,
    /// Scan did not complete; always paired with a diagnostic.
    Unknown,
}

impl Verdict {
    /// The whole vocabulary, in reporting order.
    pub const ALL: [Self; 4] = [Self::Benign, Self::Suspicious, Self::Malicious, Self::Unknown];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Benign => "benign",
            Self::Suspicious => "suspicious",
            Self::Malicious => "malicious",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| format!("Invalid verdict: {s}. Use: benign, suspicious, malicious, unknown"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const LOGICAL: &str = "http://mu.semte.ch/services/file-service/files/6543bc046ea4f3000e00000c";

    #[test]
    fn logical_ref_accepts_http_iri() {
        let file = LogicalFileRef::parse(LOGICAL).unwrap();
        assert_eq!(file.as_str(), LOGICAL);
        assert_eq!(file.to_string(), LOGICAL);
    }

    #[test]
    fn logical_ref_rejects_empty() {
        assert_eq!(LogicalFileRef::parse(""), Err(RefError::Empty));
    }

    #[test]
    fn logical_ref_rejects_physical() {
        assert_matches!(
            LogicalFileRef::parse("share://uploads/a.pdf"),
            Err(RefError::Physical(_))
        );
    }

    #[test]
    fn logical_ref_rejects_injection() {
        assert_eq!(
            LogicalFileRef::parse("http://x/a> } ; DROP ALL ; { <b"),
            Err(RefError::InvalidChar('>'))
        );
        assert_eq!(
            LogicalFileRef::parse("http://x/a b"),
            Err(RefError::InvalidChar(' '))
        );
    }

    #[test]
    fn physical_ref_requires_share_scheme() {
        assert_matches!(
            PhysicalFileRef::parse(LOGICAL),
            Err(RefError::NotPhysical(_))
        );
        assert!(PhysicalFileRef::parse("share://a.pdf").is_ok());
    }

    #[test]
    fn physical_ref_maps_to_share_root() {
        let physical = PhysicalFileRef::parse("share://uploads/my-file.pdf").unwrap();
        assert_eq!(
            physical.to_path(Path::new("/share")).unwrap(),
            PathBuf::from("/share/uploads/my-file.pdf")
        );
        assert_eq!(
            physical.to_path(Path::new("/share/")).unwrap(),
            PathBuf::from("/share/uploads/my-file.pdf")
        );
    }

    #[test]
    fn physical_ref_rejects_traversal() {
        let physical = PhysicalFileRef::parse("share://uploads/../../etc/passwd").unwrap();
        assert_matches!(
            physical.to_path(Path::new("/share")),
            Err(RefError::UnsafePath(_))
        );
    }

    #[test]
    fn physical_ref_rejects_absolute() {
        let physical = PhysicalFileRef::parse("share:///etc/passwd").unwrap();
        assert_matches!(
            physical.to_path(Path::new("/share")),
            Err(RefError::UnsafePath(_))
        );
    }

    #[test]
    fn safe_path_dot_in_name() {
        assert!(is_safe_relative_path(Path::new("file..txt")));
        assert!(is_safe_relative_path(Path::new(".hidden")));
    }

    #[test]
    fn verdict_round_trips_through_str() {
        for verdict in Verdict::ALL {
            assert_eq!(verdict.as_str().parse::<Verdict>(), Ok(verdict));
        }
    }

    #[test]
    fn verdict_rejects_outside_vocabulary() {
        assert!("clean".parse::<Verdict>().is_err());
        assert!("Benign".parse::<Verdict>().is_err());
    }

    #[test]
    fn term_deserializes_delta_shape() {
        let term: Term = serde_json::from_str(
            r#"{"type": "typed-literal", "value": "1", "datatype": "http://www.w3.org/2001/XMLSchema#integer"}"#,
        )
        .unwrap();
        assert_eq!(term.kind, TermKind::TypedLiteral);
        assert_eq!(term.value, "1");
        assert!(term.datatype.is_some());
    }

    #[test]
    fn term_deserializes_language_tag() {
        let term: Term =
            serde_json::from_str(r#"{"type": "literal", "value": "bestand", "xml:lang": "nl"}"#)
                .unwrap();
        assert_eq!(term.lang.as_deref(), Some("nl"));
        assert!(!term.is_uri("bestand"));
    }
}
