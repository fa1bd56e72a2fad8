//! CLI `query` command: run one query and print tab-delimited rows.

use anyhow::{Context, Result};
use std::path::Path;

use ontostore::config::StoreConfig;
use ontostore::cursor::Cursor;
use ontostore::Term;

/// Parse `name=value` bindings. `<...>` values are IRIs, anything else a plain string.
fn parse_bindings(args: &[String]) -> Result<Vec<(String, Term)>> {
    args.iter()
        .map(|arg| {
            let (name, value) = arg
                .split_once('=')
                .with_context(|| format!("binding {arg:?} is not NAME=VALUE"))?;
            let term = match value.strip_prefix('<').and_then(|v| v.strip_suffix('>')) {
                Some(iri) => Term::iri(iri),
                None => Term::string(value),
            };
            Ok((name.trim_start_matches('~').to_string(), term))
        })
        .collect()
}

pub fn query(config: &StoreConfig, text: Option<&str>, file: Option<&Path>, args: &[String]) -> Result<()> {
    let text = match (text, file) {
        (Some(text), _) => text.to_string(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read query file {}", path.display()))?,
        (None, None) => anyhow::bail!("either --query or --file is required"),
    };
    let bindings = parse_bindings(args)?;
    let bindings: Vec<(&str, Term)> = bindings.iter().map(|(n, t)| (n.as_str(), t.clone())).collect();

    let store = super::open_store(config)?;
    let reader = store.reader()?;
    let mut prepared = reader.prepare(&text, &bindings).context("query failed to compile")?;
    println!(
        "{}",
        prepared.variables().iter().map(|v| format!("?{v}")).collect::<Vec<_>>().join("\t")
    );

    let mut cursor = prepared.cursor()?;
    let mut rows = 0usize;
    while cursor.next()? {
        let line: Vec<&str> = (0..cursor.n_columns())
            .map(|c| cursor.get_string(c).unwrap_or(""))
            .collect();
        println!("{}", line.join("\t"));
        rows += 1;
    }
    tracing::debug!(rows, "query finished");
    Ok(())
}
