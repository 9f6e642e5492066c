// SPDX-FileCopyrightText: 2025-2026 TII (SSRC) and the Ghaf contributors
// SPDX-License-Identifier: Apache-2.0

//! Logical to physical file resolution.
//!
//! The file service stores two resources per upload: the logical file the
//! domain model links to, and the physical file (`share://...`) that points
//! back at it with `nie:dataSource`. Scanning needs the latter.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use thiserror::Error;

use crate::config::ShareConfig;
use crate::model::{LogicalFileRef, PhysicalFileRef, RefError};
use crate::sparql::{PREFIX_NIE, StoreError, TripleStore, escape_uri};

/// Why a logical file could not be mapped to readable bytes.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("No physical file IRI found for: {0}")]
    NotFound(LogicalFileRef),
    #[error("physical file lookup failed: {0}")]
    Store(#[from] StoreError),
    #[error("store returned an unusable physical file IRI: {0}")]
    InvalidPhysical(#[from] RefError),
    #[error("File not found on disk: {}", .0.display())]
    MissingOnDisk(PathBuf),
    #[error("{} is not a regular file", .0.display())]
    NotAFile(PathBuf),
    #[error("cannot access {}: {source}", path.display())]
    Inaccessible {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A logical file resolved down to a path on the local share mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub physical: PhysicalFileRef,
    pub path: PathBuf,
}

pub struct FileResolver<S> {
    store: Arc<S>,
    share_root: PathBuf,
}

impl<S: TripleStore> FileResolver<S> {
    pub fn new(store: Arc<S>, share: &ShareConfig) -> Self {
        Self {
            store,
            share_root: share.root.clone(),
        }
    }

    fn physical_file_query(logical: &LogicalFileRef) -> String {
        format!(
            "{PREFIX_NIE}\n\
             SELECT DISTINCT ?physicalFile\n\
             WHERE {{\n  GRAPH ?g {{\n    ?physicalFile nie:dataSource {} .\n  }}\n}}",
            escape_uri(logical.as_str())
        )
    }

    /// Look up the physical file that declares `logical` as its data source.
    ///
    /// Assumes every graph links the logical file to the same physical file.
    /// If the store disagrees, the first binding wins and a warning is logged.
    pub async fn resolve(&self, logical: &LogicalFileRef) -> Result<PhysicalFileRef, ResolveError> {
        let rows = self
            .store
            .select(&Self::physical_file_query(logical))
            .await?;

        let mut candidates = rows
            .iter()
            .filter_map(|row| row.get("physicalFile"))
            .map(|term| term.value.as_str());

        let Some(first) = candidates.next() else {
            return Err(ResolveError::NotFound(logical.clone()));
        };

        if rows.len() > 1 {
            warn!(
                "{logical} has {} physical files, assuming the first ({first}) is the one",
                rows.len()
            );
        }

        let physical = PhysicalFileRef::parse(first)?;
        debug!("{logical} -> {physical}");
        Ok(physical)
    }

    /// Resolve and check that the bytes are present on the share mount.
    pub async fn locate(&self, logical: &LogicalFileRef) -> Result<ResolvedFile, ResolveError> {
        let physical = self.resolve(logical).await?;
        let path = physical.to_path(&self.share_root)?;
        check_regular_file(&path).await?;
        Ok(ResolvedFile { physical, path })
    }
}

async fn check_regular_file(path: &Path) -> Result<(), ResolveError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(ResolveError::NotAFile(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(ResolveError::MissingOnDisk(path.to_path_buf()))
        }
        Err(source) => Err(ResolveError::Inaccessible {
            path: path.to_path_buf(),
            source,
        }),
    }
}
