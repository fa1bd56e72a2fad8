use anyhow::{Context, Result};
use std::path::Path;

use ontostore::config::StoreConfig;

/// Insert the statements of `file` (an RDF file or a directory of them).
pub fn load(config: &StoreConfig, file: &Path) -> Result<()> {
    let store = super::open_store(config)?;
    let pb = super::spinner(format!("loading {}", file.display()));
    let result = store.load_data(&[file.to_path_buf()], None);
    pb.finish_and_clear();

    let n = result.with_context(|| format!("failed to load {}", file.display()))?;
    println!("Loaded {n} statements from {}", file.display());
    Ok(())
}
