//! CLI `doctor` command: run store diagnostics and print a health report.

use anyhow::{Context, Result};

use ontostore::config::StoreConfig;

/// Run store diagnostics and print a health report.
pub fn doctor(config: &StoreConfig) -> Result<()> {
    let options = config.to_options();
    let db_path = options.db_path();

    if !db_path.exists() {
        println!("Store: not found at {}", db_path.display());
        println!("Run `ontostore load --ontology <path> --file <data>` to create it.");
        return Ok(());
    }

    let store = super::open_store(config).context("failed to open store (may be corrupt)")?;
    let report = store.check_health().context("failed to run health check")?;

    println!("Ontostore Health Report");
    println!("=======================");
    println!();
    println!("Database:          {}", report.path.display());
    println!("File size:         {}", format_bytes(report.file_size));
    println!("Format version:    {}", report.schema_version);
    println!("Schema generation: {}", report.generation);
    println!("Collation locale:  {}", report.locale);
    println!();
    println!("Ontology:");
    println!("  Classes:         {}", report.classes);
    println!("  Properties:      {}", report.properties);
    println!();
    println!("Row counts:");
    println!("  Resources:       {}", report.resources);
    println!("  Typed resources: {}", report.typed_resources);
    println!("  Transactions:    {}", report.transactions);
    println!();
    match &report.integrity {
        None => println!("Integrity check:   PASSED"),
        Some(details) => println!("Integrity check:   FAILED ({details})"),
    }

    if !report.is_healthy() {
        println!();
        println!("Recovery steps:");
        println!("  1. Restore a binary backup: ontostore restore --binary backup.db");
        println!("  2. Or restore a Turtle export into a fresh store:");
        println!("     ontostore --database <new dir> restore --rdf backup.ttl");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
