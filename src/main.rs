mod cli;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use ontostore::config::StoreConfig;
use ontostore::{BackupFormat, Error, ErrorKind};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ontostore", version, about = "Ontology-governed RDF store backed by SQLite")]
struct Cli {
    /// Store directory (overrides config and ONTOSTORE_DB)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Ontology file or directory; repeat to layer several
    #[arg(long, global = true)]
    ontology: Vec<PathBuf>,

    /// Open the store read-only
    #[arg(long, global = true)]
    readonly: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a query and print tab-delimited rows
    Query {
        /// Query text
        #[arg(long, short, conflicts_with = "file", required_unless_present = "file")]
        query: Option<String>,
        /// Read the query from a file
        #[arg(long, short)]
        file: Option<PathBuf>,
        /// Bind a `~name` placeholder: `name=value`, or `name=<iri>`
        #[arg(long = "arg", value_name = "NAME=VALUE")]
        args: Vec<String>,
    },
    /// Insert the statements of an RDF file or directory
    Load {
        #[arg(long, short)]
        file: PathBuf,
    },
    /// Write a backup of the store
    Backup {
        #[command(flatten)]
        format: FormatArg,
        dest: PathBuf,
    },
    /// Replace the store's contents with a backup
    Restore {
        #[command(flatten)]
        format: FormatArg,
        src: PathBuf,
    },
    /// Check store health and print a report
    Doctor,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct FormatArg {
    /// Page-level SQLite copy
    #[arg(long)]
    binary: bool,
    /// Turtle serialization
    #[arg(long)]
    rdf: bool,
}

impl FormatArg {
    fn format(&self) -> BackupFormat {
        if self.binary {
            BackupFormat::Binary
        } else {
            BackupFormat::Rdf
        }
    }
}

/// Process exit code for a failed command.
fn exit_code(err: &anyhow::Error) -> u8 {
    let Some(kind) = err.chain().find_map(|e| e.downcast_ref::<Error>()).map(Error::kind) else {
        return 1;
    };
    match kind {
        ErrorKind::Ontology | ErrorKind::Format => 2,
        ErrorKind::Schema | ErrorKind::Version => 3,
        ErrorKind::Integrity => 4,
        ErrorKind::Busy => 5,
        ErrorKind::ConstraintViolation => 6,
        ErrorKind::Cancelled => 7,
        ErrorKind::Io | ErrorKind::Storage => 1,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Load config (for log level)
    let mut config = StoreConfig::load()?;

    // Log to stderr so stdout stays clean for query rows.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(dir) = cli.database {
        config.storage.data_dir = dir.to_string_lossy().into_owned();
    }
    if !cli.ontology.is_empty() {
        config.ontology.sources = cli.ontology.iter().map(|p| p.to_string_lossy().into_owned()).collect();
    }
    if cli.readonly {
        config.storage.readonly = true;
    }

    match cli.command {
        Command::Query { query, file, args } => {
            cli::query::query(&config, query.as_deref(), file.as_deref(), &args)?;
        }
        Command::Load { file } => {
            cli::load::load(&config, &file)?;
        }
        Command::Backup { format, dest } => {
            cli::backup::backup(&config, format.format(), &dest).await?;
        }
        Command::Restore { format, src } => {
            cli::backup::restore(&config, format.format(), &src).await?;
        }
        Command::Doctor => {
            cli::doctor::doctor(&config)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_kind() {
        let err = anyhow::Error::from(Error::Cancelled).context("backup failed");
        assert_eq!(exit_code(&err), 7);
        let err = anyhow::Error::from(Error::Integrity("bad page".into()));
        assert_eq!(exit_code(&err), 4);
        assert_eq!(exit_code(&anyhow::anyhow!("plain")), 1);
    }

    #[test]
    fn backup_needs_exactly_one_format() {
        assert!(Cli::try_parse_from(["ontostore", "backup", "out.db"]).is_err());
        assert!(Cli::try_parse_from(["ontostore", "backup", "--binary", "--rdf", "out.db"]).is_err());
        let cli = Cli::try_parse_from(["ontostore", "--database", "/tmp/s", "backup", "--rdf", "out.ttl"]).unwrap();
        assert!(matches!(cli.command, Command::Backup { ref format, .. } if format.format() == BackupFormat::Rdf));
    }
}
