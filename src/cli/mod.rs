pub mod backup;
pub mod doctor;
pub mod load;
pub mod query;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use ontostore::config::StoreConfig;
use ontostore::Store;

/// Open the configured store. Fails with a hint when no ontology is configured.
fn open_store(config: &StoreConfig) -> Result<Store> {
    let options = config.to_options();
    anyhow::ensure!(
        !options.ontology_sources.is_empty(),
        "no ontology configured; pass --ontology or set [ontology] sources"
    );
    Store::open(options)
        .with_context(|| format!("failed to open store in {}", config.resolved_data_dir().display()))
}

/// A spinner on stderr for long-running commands.
fn spinner(message: impl Into<std::borrow::Cow<'static, str>>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner} {msg} ({elapsed})") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
