//! Artifact storage
//!
//! Generated artifacts belong to an owning context (an order line, a job).
//! Each generation supersedes everything previously stored for the same
//! context, so stores support removing a context's artifacts by name.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::debug;

/// Errors raised by artifact stores
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot list {path}: {source}")]
    List {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid artifact id '{id}': {reason}")]
    InvalidId { id: String, reason: &'static str },
}

/// Where a stored artifact ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub context: String,
    /// Location of the serialized document
    pub document: String,
    /// Location of the raster image
    pub raster: String,
}

/// Base name shared by the document and raster files of one artifact
pub fn artifact_name(template: &str, context: &str) -> String {
    format!("blueprint_{}_line_{}_evaluated", template, context)
}

/// Split an artifact stem into its template and context parts.
///
/// Neither part may contain `_line_`, so the split is unambiguous.
fn split_stem(stem: &str) -> Option<(&str, &str)> {
    stem.strip_prefix("blueprint_")?
        .strip_suffix("_evaluated")?
        .split_once("_line_")
}

/// True when `file_name` is an artifact generated for exactly `context`
pub fn belongs_to(file_name: &str, context: &str) -> bool {
    file_name
        .strip_suffix(".svg")
        .or_else(|| file_name.strip_suffix(".png"))
        .and_then(split_stem)
        .is_some_and(|(_, owner)| owner == context)
}

/// Reject ids that cannot be embedded in a file name unambiguously
pub fn check_id(id: &str) -> Result<(), StoreError> {
    let reason = if id.is_empty() {
        "empty"
    } else if id.contains(['/', '\\', '\0']) {
        "contains a path separator"
    } else if id.contains("..") {
        "contains '..'"
    } else if id.contains("_line_") {
        "contains '_line_'"
    } else {
        return Ok(());
    };
    Err(StoreError::InvalidId {
        id: id.to_string(),
        reason,
    })
}

/// Validate the context and artifact name handed to a store
fn check_artifact(context: &str, name: &str) -> Result<(), StoreError> {
    check_id(context)?;
    let (template, _) = split_stem(name)
        .filter(|(_, owner)| *owner == context)
        .ok_or_else(|| StoreError::InvalidId {
            id: name.to_string(),
            reason: "not an artifact name of its context",
        })?;
    check_id(template)
}

/// Storage collaborator for generated artifacts
pub trait ArtifactStore: Send + Sync {
    /// Store one artifact's document and raster for `context`
    fn store(
        &self,
        context: &str,
        name: &str,
        document: &[u8],
        raster: &[u8],
    ) -> Result<ArtifactRef, StoreError>;

    /// Remove every artifact of `context`, returning how many files went
    fn remove_context(&self, context: &str) -> Result<usize, StoreError>;
}

/// Stores artifacts as files in one directory
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn write(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        let path = self.root.join(file_name);
        std::fs::write(&path, bytes).map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

impl ArtifactStore for DirectoryStore {
    fn store(
        &self,
        context: &str,
        name: &str,
        document: &[u8],
        raster: &[u8],
    ) -> Result<ArtifactRef, StoreError> {
        check_artifact(context, name)?;
        std::fs::create_dir_all(&self.root).map_err(|source| StoreError::Write {
            path: self.root.clone(),
            source,
        })?;
        let document = self.write(&format!("{}.svg", name), document)?;
        let raster = self.write(&format!("{}.png", name), raster)?;
        debug!(context, document = %document.display(), "stored artifact");
        Ok(ArtifactRef {
            context: context.to_string(),
            document: document.display().to_string(),
            raster: raster.display().to_string(),
        })
    }

    fn remove_context(&self, context: &str) -> Result<usize, StoreError> {
        check_id(context)?;
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(StoreError::List {
                    path: self.root.clone(),
                    source,
                })
            }
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::List {
                path: self.root.clone(),
                source,
            })?;
            let file_name = entry.file_name();
            if !belongs_to(&file_name.to_string_lossy(), context) {
                continue;
            }
            let path = entry.path();
            std::fs::remove_file(&path).map_err(|source| StoreError::Remove {
                path: path.clone(),
                source,
            })?;
            removed += 1;
        }
        Ok(removed)
    }
}

/// Keeps artifacts in memory, keyed by file name
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, file_name: &str) -> Option<Vec<u8>> {
        self.files().get(file_name).cloned()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files().keys().cloned().collect()
    }

    fn files(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ArtifactStore for MemoryStore {
    fn store(
        &self,
        context: &str,
        name: &str,
        document: &[u8],
        raster: &[u8],
    ) -> Result<ArtifactRef, StoreError> {
        check_artifact(context, name)?;
        let document_name = format!("{}.svg", name);
        let raster_name = format!("{}.png", name);
        let mut files = self.files();
        files.insert(document_name.clone(), document.to_vec());
        files.insert(raster_name.clone(), raster.to_vec());
        Ok(ArtifactRef {
            context: context.to_string(),
            document: document_name,
            raster: raster_name,
        })
    }

    fn remove_context(&self, context: &str) -> Result<usize, StoreError> {
        check_id(context)?;
        let mut files = self.files();
        let before = files.len();
        files.retain(|name, _| !belongs_to(name, context));
        Ok(before - files.len())
    }
}
