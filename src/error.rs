//! Error taxonomy for the store.
//!
//! Every fallible library operation returns [`Error`]. Each variant corresponds to one
//! error kind (see [`ErrorKind`]) and carries the offending identifier (class or
//! property URI, file path, line/column) in its message.

use std::fmt;
use std::path::PathBuf;

use rusqlite::ErrorCode;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Flat classification of [`Error`], used for exit codes and test assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Ontology,
    Schema,
    ConstraintViolation,
    Io,
    Format,
    Version,
    Integrity,
    Busy,
    Cancelled,
    Storage,
}

/// Top-level store error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Ontology(#[from] OntologyError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    ConstraintViolation(#[from] ConstraintViolation),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("database version {found} is newer than the supported version {supported}")]
    UnsupportedFutureVersion { found: u32, supported: u32 },

    #[error("no migration from format version {from} to {to}")]
    NoMigrationPath { from: u32, to: u32 },

    #[error("{} has format version {found}, expected {expected}", path.display())]
    VersionMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("backup failed while {stage}: {source}")]
    Backup {
        stage: BackupStage,
        #[source]
        source: Box<Error>,
    },

    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("database is busy: {0}")]
    Busy(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("storage error: {0}")]
    Storage(rusqlite::Error),
}

impl Error {
    pub(crate) fn at_stage(self, stage: BackupStage) -> Self {
        match self {
            Self::Cancelled => Self::Cancelled,
            other => Self::Backup {
                stage,
                source: Box::new(other),
            },
        }
    }
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Ontology(_) => ErrorKind::Ontology,
            Self::Schema(_) => ErrorKind::Schema,
            Self::ConstraintViolation(_) => ErrorKind::ConstraintViolation,
            Self::Io { .. } => ErrorKind::Io,
            Self::Format(_) => ErrorKind::Format,
            Self::UnsupportedFutureVersion { .. } | Self::VersionMismatch { .. } | Self::NoMigrationPath { .. } => {
                ErrorKind::Version
            }
            Self::Backup { source, .. } => source.kind(),
            Self::Integrity(_) => ErrorKind::Integrity,
            Self::Busy(_) => ErrorKind::Busy,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                Self::Busy(err.to_string())
            }
            Some(ErrorCode::DatabaseCorrupt) | Some(ErrorCode::NotADatabase) => {
                Self::Integrity(err.to_string())
            }
            _ => Self::Storage(err),
        }
    }
}

/// The step of a binary backup or restore that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStage {
    OpenSource,
    OpenDestination,
    CopyPages,
    Finalize,
}

impl fmt::Display for BackupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OpenSource => "opening the source database",
            Self::OpenDestination => "creating the destination",
            Self::CopyPages => "copying pages",
            Self::Finalize => "finalizing the destination",
        })
    }
}

/// Errors raised while building or mutating the ontology model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OntologyError {
    #[error("class {uri} is already defined with a different set of superclasses")]
    DuplicateClass { uri: String },

    #[error("making {superclass} a superclass of {class} would create an inheritance cycle")]
    CyclicInheritance { class: String, superclass: String },

    #[error("property {property} refers to unknown class {uri}")]
    UnknownDomainOrRange { property: String, uri: String },

    #[error("property {uri} is already defined with a conflicting definition")]
    DuplicateProperty { uri: String },

    #[error("unknown class {uri}")]
    UnknownClass { uri: String },

    #[error("unknown property {uri}")]
    UnknownProperty { uri: String },

    #[error("{location}: {message}")]
    InvalidDefinition {
        location: SourceLocation,
        message: String,
    },

    #[error("the ontology is frozen and can no longer be modified")]
    OntologyFrozen,
}

/// Errors raised while deriving or evolving the relational layout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error(
        "property {property} changed from multi-valued to single-valued on a populated store; \
         enable destructive migration to narrow it"
    )]
    UnmappableCardinalityChange { property: String },

    #[error(
        "property {property} changed data type from {from} to {to} on a populated store; \
         enable destructive migration to convert it"
    )]
    UnmappableTypeChange {
        property: String,
        from: String,
        to: String,
    },

    #[error("stored ontology snapshot is unreadable: {0}")]
    CorruptSnapshot(String),

    #[error("backup at {path} was taken with a different ontology")]
    OntologyMismatch { path: PathBuf },
}

/// The specific rule a committed statement broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Range,
    Domain,
    Cardinality,
    InverseFunctional,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Range => "range",
            Self::Domain => "domain",
            Self::Cardinality => "cardinality",
            Self::InverseFunctional => "inverse-functional",
        })
    }
}

/// A statement that would leave the store violating its ontology.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} constraint violated by <{subject}> <{property}>: {message}")]
pub struct ConstraintViolation {
    pub kind: ConstraintKind,
    pub subject: String,
    pub property: String,
    pub message: String,
}

/// Where in an ontology or data source a statement came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub path: Option<PathBuf>,
    pub line: u64,
    pub column: u64,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}:{}:{}", path.display(), self.line, self.column),
            None => write!(f, "<input>:{}:{}", self.line, self.column),
        }
    }
}

/// Unparseable or unrecognised ontology/data sources.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("{location}: {message}")]
    Syntax {
        location: SourceLocation,
        message: String,
    },

    #[error("{}: not a recognised RDF serialization", path.display())]
    Unrecognized { path: PathBuf },

    #[error("invalid {datatype} literal {value:?}")]
    InvalidLiteral { value: String, datatype: String },

    #[error("{0}")]
    Query(String),
}
