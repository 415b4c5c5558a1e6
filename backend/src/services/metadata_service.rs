//! `maven-metadata.xml` storage.
//!
//! Read-modify-write cycles on one metadata file are serialized through a
//! per-path lock. All I/O is blocking; async callers use `spawn_blocking`.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use thiserror::Error;

use crate::formats::maven::{parse_metadata_xml, write_metadata_xml};
use crate::formats::METADATA_FILENAME;
use crate::models::metadata::RepositoryMetadata;
use crate::storage::checksum::{ChecksumAlgorithm, ChecksummedFile};
use crate::storage::filesystem::write_atomic;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Metadata IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed metadata {path}: {source}")]
    Xml {
        path: PathBuf,
        #[source]
        source: quick_xml::DeError,
    },
}

/// `<dir>/maven-metadata.xml`
pub fn metadata_path(dir: &Path) -> PathBuf {
    dir.join(METADATA_FILENAME)
}

/// `<dir>/maven-metadata-<remoteId>.xml`, the proxied copy from one remote.
pub fn proxied_metadata_path(dir: &Path, remote_id: &str) -> PathBuf {
    dir.join(format!("maven-metadata-{}.xml", remote_id))
}

/// Serialized access to metadata files.
#[derive(Default)]
pub struct MetadataStore {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `path`.
    pub fn with_lock<T>(&self, path: &Path, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(path.to_path_buf()).or_default().clone()
        };
        let result = {
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            f()
        };
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Only the map and this call hold it: nobody else is waiting.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(path);
        }
        result
    }

    /// Read a metadata file; `None` when it does not exist.
    pub fn read(path: &Path) -> Result<Option<RepositoryMetadata>, MetadataError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(MetadataError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        parse_metadata_xml(&content)
            .map(Some)
            .map_err(|source| MetadataError::Xml {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Write a metadata file atomically and fix its checksums.
    pub fn write(path: &Path, metadata: &RepositoryMetadata) -> Result<(), MetadataError> {
        write_atomic(path, write_metadata_xml(metadata).as_bytes()).map_err(|source| {
            MetadataError::Io {
                path: path.to_path_buf(),
                source,
            }
        })?;
        if !ChecksummedFile::new(path).fix_checksums(ChecksumAlgorithm::PROXY) {
            tracing::warn!(path = %path.display(), "Unable to fix metadata checksums");
        }
        Ok(())
    }

    /// Read-modify-write under the path lock. `change` returns whether it
    /// modified anything; only then is `lastUpdated` bumped and the file
    /// written. A missing file starts from `create()`.
    pub fn update<C, F>(&self, path: &Path, create: C, change: F) -> Result<bool, MetadataError>
    where
        C: FnOnce() -> RepositoryMetadata,
        F: FnOnce(&mut RepositoryMetadata) -> bool,
    {
        self.with_lock(path, || {
            let mut metadata = Self::read(path)?.unwrap_or_else(create);
            if !change(&mut metadata) {
                return Ok(false);
            }
            metadata.touch(Utc::now());
            Self::write(path, &metadata)?;
            Ok(true)
        })
    }

    /// Fold proxied copies into `target`. Unreadable copies are skipped with a
    /// warning. Returns whether `target` was (re)written.
    pub fn merge_proxied(&self, target: &Path, proxied: &[PathBuf]) -> Result<bool, MetadataError> {
        self.with_lock(target, || {
            let existing = Self::read(target)?;
            let exists = existing.is_some();
            let mut merged = existing.unwrap_or_default();
            let mut changed = false;
            let mut sources = 0usize;

            for copy in proxied {
                match Self::read(copy) {
                    Ok(Some(metadata)) => {
                        sources += 1;
                        changed |= merged.merge(&metadata);
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!(path = %copy.display(), error = %e, "Skipping proxied metadata"),
                }
            }

            if sources == 0 && !exists {
                return Ok(false);
            }
            if changed || !exists {
                Self::write(target, &merged)?;
                return Ok(true);
            }
            // Unchanged content may still lack checksums.
            ChecksummedFile::new(target).fix_checksums(ChecksumAlgorithm::PROXY);
            Ok(false)
        })
    }
}
