//! Backup and restore.
//!
//! Two independent strategies, chosen by the caller:
//! - [`BackupFormat::Binary`] copies database pages (same format version only).
//! - [`BackupFormat::Rdf`] writes every statement as Turtle and restores through the
//!   normal write path, so constraints are checked again.
//!
//! Both run on tokio's blocking pool and honour a [`CancellationToken`]. A backup
//! writes to a temporary file next to the destination and renames it into place
//! only after it is complete.

pub mod binary;
pub mod rdf;

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupFormat {
    Binary,
    Rdf,
}

impl std::fmt::Display for BackupFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Binary => "binary",
            Self::Rdf => "rdf",
        })
    }
}

/// `dir/.name.partial` for `dir/name`.
pub(crate) fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "backup".into());
    dest.with_file_name(format!(".{name}.partial"))
}

async fn run_blocking<T, F>(path: PathBuf, task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| Error::io(path, std::io::Error::other(e)))?
}

impl Store {
    /// Write a backup of the store to `dest`.
    ///
    /// Returns the number of statements written for RDF backups, 0 for binary ones.
    pub async fn backup(&self, dest: impl Into<PathBuf>, format: BackupFormat, cancel: CancellationToken) -> Result<u64> {
        let dest = dest.into();
        let store = self.clone();
        tracing::info!(dest = %dest.display(), %format, "backup started");
        let target = dest.clone();
        let result = run_blocking(dest.clone(), move || match format {
            BackupFormat::Binary => binary::backup_to(&store, &target, &cancel).map(|()| 0),
            BackupFormat::Rdf => rdf::export_to(&store, &target, &cancel),
        })
        .await;
        match &result {
            Ok(statements) => tracing::info!(dest = %dest.display(), %format, statements, "backup finished"),
            Err(e) => tracing::warn!(dest = %dest.display(), %format, error = %e, "backup failed"),
        }
        result
    }

    /// Replace the store's contents with the backup at `src`.
    ///
    /// Returns the number of statements restored for RDF backups, 0 for binary ones.
    pub async fn restore(&self, src: impl Into<PathBuf>, format: BackupFormat, cancel: CancellationToken) -> Result<u64> {
        let src = src.into();
        let store = self.clone();
        tracing::info!(src = %src.display(), %format, "restore started");
        let source = src.clone();
        let result = run_blocking(src.clone(), move || match format {
            BackupFormat::Binary => binary::restore_from(&store, &source, &cancel).map(|()| 0),
            BackupFormat::Rdf => rdf::restore_from(&store, &source, &cancel),
        })
        .await;
        match &result {
            Ok(statements) => tracing::info!(src = %src.display(), %format, statements, "restore finished"),
            Err(e) => tracing::warn!(src = %src.display(), %format, error = %e, "restore failed"),
        }
        result
    }
}
