//! Page-level copies with SQLite's online backup API.

use std::path::Path;
use std::time::Duration;

use rusqlite::backup::{Backup, StepResult};
use rusqlite::Connection;
use tokio_util::sync::CancellationToken;

use super::partial_path;
use crate::db::journal::{self, Operation};
use crate::db::migrations::{self, CURRENT_SCHEMA_VERSION};
use crate::db;
use crate::error::{BackupStage, Error, Result, SchemaError};
use crate::schema::evolution::OntologySnapshot;
use crate::store::Store;

/// Copy every page of `src` into `dst`, `step` pages at a time.
fn copy_pages(src: &Connection, dst: &mut Connection, step: i32, cancel: &CancellationToken) -> Result<()> {
    let backup = Backup::new(src, dst)?;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match backup.step(step)? {
            StepResult::Done => return Ok(()),
            StepResult::More => {
                let progress = backup.progress();
                tracing::trace!(remaining = progress.remaining, total = progress.pagecount, "backup step");
            }
            StepResult::Busy | StepResult::Locked => std::thread::sleep(Duration::from_millis(50)),
            _ => std::thread::sleep(Duration::from_millis(50)),
        }
    }
}

/// Snapshot the store into `dest`, leaving nothing at `dest` on failure.
pub fn backup_to(store: &Store, dest: &Path, cancel: &CancellationToken) -> Result<()> {
    let src = store
        .open_readonly_connection()
        .map_err(|e| e.at_stage(BackupStage::OpenSource))?;
    let partial = partial_path(dest);

    let result = write_copy(&src, &partial, store.options().page_step, cancel).and_then(|()| {
        std::fs::rename(&partial, dest).map_err(|e| Error::io(dest, e).at_stage(BackupStage::Finalize))
    });
    if result.is_err() && partial.exists() {
        if let Err(e) = std::fs::remove_file(&partial) {
            tracing::warn!(path = %partial.display(), error = %e, "could not remove partial backup");
        }
    }
    result
}

fn write_copy(src: &Connection, partial: &Path, step: i32, cancel: &CancellationToken) -> Result<()> {
    if partial.exists() {
        std::fs::remove_file(partial)
            .map_err(|e| Error::io(partial, e).at_stage(BackupStage::OpenDestination))?;
    }
    if let Some(parent) = partial.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::io(parent, e).at_stage(BackupStage::OpenDestination))?;
    }
    let mut dst = Connection::open(partial).map_err(|e| Error::from(e).at_stage(BackupStage::OpenDestination))?;
    copy_pages(src, &mut dst, step, cancel).map_err(|e| e.at_stage(BackupStage::CopyPages))?;
    dst.close()
        .map_err(|(_, e)| Error::from(e).at_stage(BackupStage::Finalize))?;
    Ok(())
}

/// Replace the live store's pages with those of the backup at `src`.
///
/// The backup must have the current format version and the same ontology,
/// including the row ids of every class and property.
pub fn restore_from(store: &Store, src: &Path, cancel: &CancellationToken) -> Result<()> {
    if !src.is_file() {
        return Err(Error::io(
            src,
            std::io::Error::new(std::io::ErrorKind::NotFound, "backup file not found"),
        )
        .at_stage(BackupStage::OpenSource));
    }
    let source = db::open_readonly(src, store.options().busy_timeout, store.locale())
        .map_err(|e| e.at_stage(BackupStage::OpenSource))?;
    check_compatible(store, &source, src)?;

    let mut conn = store.lock_writer()?;
    copy_pages(&source, &mut conn, store.options().page_step, cancel)
        .map_err(|e| e.at_stage(BackupStage::CopyPages))?;
    journal::record(&conn, Operation::Restore, 0, 0)?;
    Ok(())
}

fn check_compatible(store: &Store, source: &Connection, path: &Path) -> Result<()> {
    let found = migrations::probe_schema_version(source)?.unwrap_or(0);
    if found != CURRENT_SCHEMA_VERSION {
        return Err(Error::VersionMismatch {
            path: path.to_path_buf(),
            found,
            expected: CURRENT_SCHEMA_VERSION,
        });
    }

    let mismatch = || -> Error {
        SchemaError::OntologyMismatch {
            path: path.to_path_buf(),
        }
        .into()
    };
    let expected = OntologySnapshot::capture(store.ontology(), store.layout());
    if OntologySnapshot::load(source)?.as_ref() != Some(&expected) {
        return Err(mismatch());
    }

    let ontology = store.ontology();
    let mut lookup = source.prepare("SELECT ID FROM Resource WHERE Uri = ?1")?;
    let bound = ontology
        .classes()
        .iter()
        .map(|c| (c.uri(), c.numeric_id()))
        .chain(ontology.properties().iter().map(|p| (p.uri(), p.numeric_id())));
    for (uri, id) in bound {
        let stored: Option<i64> = lookup
            .query_row([uri], |r| r.get(0))
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        if stored != id {
            tracing::warn!(uri, ?stored, ?id, "backup assigns a different row id");
            return Err(mismatch());
        }
    }
    Ok(())
}
