//! Ontology-driven RDF storage on SQLite.
//!
//! `ontostore` keeps RDF statements in a relational layout derived from an
//! ontology: one table per class for single-valued properties, one table per
//! multi-valued property, and an FTS5 table for fulltext-indexed properties.
//! Writes are checked against the ontology's ranges, domains and cardinalities
//! at commit time.
//!
//! | Piece | What it owns |
//! |-------|--------------|
//! | **Ontology** | Classes, properties, namespaces; frozen once loaded |
//! | **Schema** | Tables, columns and indexes derived from the ontology |
//! | **Store** | Open gate, write transactions, read-only queries |
//! | **Backup** | Binary page copies and Turtle exports |
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`cursor`]: Forward-only row iteration over RDF files, directories and queries
//! - [`db`]: SQLite connections, fixed tables, format migrations, collation, journal
//! - [`ontology`]: The ontology model and its Turtle loader
//! - [`schema`]: Relational layout, DDL and ontology evolution
//! - [`query`]: Query compilation to SQL
//! - [`store`]: The store handle, transactions and readers
//! - [`backup`]: Binary and RDF backup/restore

pub mod backup;
pub mod config;
pub mod cursor;
pub mod db;
pub mod error;
pub mod ontology;
pub mod query;
pub mod schema;
pub mod store;
pub mod value;

pub use backup::BackupFormat;
pub use error::{Error, ErrorKind, Result};
pub use store::{HealthReport, Store, StoreOptions, Transaction};
pub use value::Term;
