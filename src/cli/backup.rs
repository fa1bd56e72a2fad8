//! CLI `backup` and `restore` commands.

use anyhow::{Context, Result};
use std::path::Path;
use tokio_util::sync::CancellationToken;

use ontostore::config::StoreConfig;
use ontostore::BackupFormat;

/// A token cancelled on Ctrl-C.
fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            child.cancel();
        }
    });
    token
}

pub async fn backup(config: &StoreConfig, format: BackupFormat, dest: &Path) -> Result<()> {
    let store = super::open_store(config)?;
    let pb = super::spinner(format!("writing {format} backup to {}", dest.display()));
    let result = store.backup(dest, format, ctrl_c_token()).await;
    pb.finish_and_clear();

    let n = result.with_context(|| format!("backup to {} failed", dest.display()))?;
    match format {
        BackupFormat::Binary => println!("Backup written to {}", dest.display()),
        BackupFormat::Rdf => println!("Backup written to {} ({n} statements)", dest.display()),
    }
    Ok(())
}

pub async fn restore(config: &StoreConfig, format: BackupFormat, src: &Path) -> Result<()> {
    let store = super::open_store(config)?;
    let pb = super::spinner(format!("restoring {format} backup from {}", src.display()));
    let result = store.restore(src, format, ctrl_c_token()).await;
    pb.finish_and_clear();

    let n = result.with_context(|| format!("restore from {} failed", src.display()))?;
    match format {
        BackupFormat::Binary => println!("Store restored from {}", src.display()),
        BackupFormat::Rdf => println!("Store restored from {} ({n} statements)", src.display()),
    }
    Ok(())
}
