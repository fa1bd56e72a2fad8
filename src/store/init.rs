//! The initialization gate run by [`Store::open`].

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OptionalExtension};

use super::{Store, StoreInner, StoreOptions};
use crate::db::collation::{self, Locale};
use crate::db::migrations::{self, CURRENT_SCHEMA_VERSION};
use crate::db::{self, schema as meta};
use crate::error::{Error, Result, SchemaError};
use crate::ontology::loader::load_ontology_sources;
use crate::ontology::Ontology;
use crate::query::QueryCompiler;
use crate::schema::evolution::{self, OntologySnapshot};
use crate::schema::{ddl, derive_schema, SchemaLayout};

pub(super) fn open(options: StoreOptions, compiler: Arc<dyn QueryCompiler>) -> Result<Store> {
    let db_path = options.db_path();
    let locale = options.locale.clone().unwrap_or_else(Locale::current);

    // A broken ontology must fail before anything touches the disk.
    let mut ontology = load_ontology_sources(&options.ontology_sources)?;

    let existed = db_path.exists();
    if existed {
        check_future_version(&db_path, &options, &locale)?;
    }

    let (conn, layout) = if options.readonly {
        open_existing_readonly(&db_path, &options, &locale, &mut ontology)?
    } else {
        open_writable(&db_path, &options, &locale, &mut ontology)?
    };

    tracing::info!(
        path = %db_path.display(),
        created = !existed,
        readonly = options.readonly,
        classes = ontology.classes().len(),
        properties = ontology.properties().len(),
        "store opened"
    );

    let seed = (!existed && !options.readonly && !options.data_sources.is_empty())
        .then(|| options.data_sources.clone());
    let store = Store {
        inner: Arc::new(StoreInner {
            options,
            db_path,
            locale,
            ontology: Arc::new(ontology),
            layout: Arc::new(layout),
            compiler,
            writer: Mutex::new(conn),
        }),
    };
    if let Some(sources) = seed {
        store.load_data(&sources, None)?;
    }
    Ok(store)
}

/// Refuse stores written by a newer format, without writing anything.
fn check_future_version(db_path: &Path, options: &StoreOptions, locale: &Locale) -> Result<()> {
    let probe = db::open_readonly(db_path, options.busy_timeout, locale)?;
    if let Some(found) = migrations::probe_schema_version(&probe)? {
        if found > CURRENT_SCHEMA_VERSION {
            tracing::error!(found, supported = CURRENT_SCHEMA_VERSION, "store is from a newer version");
            return Err(Error::UnsupportedFutureVersion {
                found,
                supported: CURRENT_SCHEMA_VERSION,
            });
        }
    }
    Ok(())
}

fn open_writable(
    db_path: &Path,
    options: &StoreOptions,
    locale: &Locale,
    ontology: &mut Ontology,
) -> Result<(Connection, SchemaLayout)> {
    let conn = db::open_database(db_path, options.busy_timeout, locale)?;
    verify_integrity(&conn, &options.sentinel_path())?;

    meta::init_schema(&conn)?;
    migrations::run_migrations(&conn)?;

    bind_ids(&conn, ontology)?;
    ontology.freeze();
    let layout = derive_schema(ontology)?;

    match OntologySnapshot::load(&conn)? {
        None => create_fresh(&conn, ontology, &layout)?,
        Some(previous) => {
            let plan = evolution::plan_evolution(
                &previous,
                ontology,
                &layout,
                options.allow_destructive_migration,
                |p| evolution::property_has_values(&conn, p),
            )?;
            if !plan.is_empty() {
                tracing::info!(steps = plan.len(), "ontology changed since last open");
            }
            evolution::apply_plan(&conn, ontology, &layout, &plan)?;
        }
    }

    collation::reindex_if_locale_changed(&conn, locale)?;
    Ok((conn, layout))
}

fn create_fresh(conn: &Connection, ontology: &Ontology, layout: &SchemaLayout) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    ddl::create_schema(&tx, ontology, layout)?;
    OntologySnapshot::capture(ontology, layout).store(&tx)?;
    meta::bump_generation(&tx)?;
    tx.commit()?;
    Ok(())
}

/// A read-only store must already be at the current format and ontology.
fn open_existing_readonly(
    db_path: &Path,
    options: &StoreOptions,
    locale: &Locale,
    ontology: &mut Ontology,
) -> Result<(Connection, SchemaLayout)> {
    if !db_path.exists() {
        return Err(Error::io(
            db_path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "no store to open read-only"),
        ));
    }
    let conn = db::open_readonly(db_path, options.busy_timeout, locale)?;
    let found = migrations::probe_schema_version(&conn)?.unwrap_or(0);
    if found != CURRENT_SCHEMA_VERSION {
        return Err(Error::VersionMismatch {
            path: db_path.to_path_buf(),
            found,
            expected: CURRENT_SCHEMA_VERSION,
        });
    }

    let mut missing = None;
    ontology.bind_numeric_ids::<Error>(|uri| {
        let id = conn
            .query_row("SELECT ID FROM Resource WHERE Uri = ?1", [uri], |r| r.get(0))
            .optional()?;
        Ok(id.unwrap_or_else(|| {
            missing.get_or_insert_with(|| uri.to_string());
            -1
        }))
    })?;
    ontology.freeze();
    let layout = derive_schema(ontology)?;

    let stored = OntologySnapshot::load(&conn)?;
    if missing.is_some() || stored.as_ref() != Some(&OntologySnapshot::capture(ontology, &layout)) {
        tracing::error!(missing = ?missing, "ontology differs from the one the store was built with");
        return Err(SchemaError::OntologyMismatch {
            path: db_path.to_path_buf(),
        }
        .into());
    }
    Ok((conn, layout))
}

/// Give every class and property the `Resource` row id of its URI.
fn bind_ids(conn: &Connection, ontology: &mut Ontology) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut insert = tx.prepare("INSERT OR IGNORE INTO Resource (Uri) VALUES (?1)")?;
        let mut select = tx.prepare("SELECT ID FROM Resource WHERE Uri = ?1")?;
        ontology.bind_numeric_ids::<Error>(|uri| {
            insert.execute([uri])?;
            Ok(select.query_row([uri], |r| r.get(0))?)
        })?;
    }
    tx.commit()?;
    Ok(())
}

/// Check the marker and the database itself, repairing if either is bad.
fn verify_integrity(conn: &Connection, sentinel: &Path) -> Result<()> {
    let flagged = sentinel.exists();
    let problem = db::integrity_check(conn, true)?;
    if !flagged && problem.is_none() {
        return Ok(());
    }

    match &problem {
        Some(details) => tracing::warn!(details = %details, "consistency check failed"),
        None => tracing::warn!(sentinel = %sentinel.display(), "previous session left a corruption marker"),
    }
    db::repair(conn)?;

    match db::integrity_check(conn, false)? {
        None => {
            if flagged {
                std::fs::remove_file(sentinel).map_err(|e| Error::io(sentinel, e))?;
            }
            tracing::info!("store repaired");
            Ok(())
        }
        Some(details) => {
            std::fs::write(sentinel, &details).map_err(|e| Error::io(sentinel, e))?;
            tracing::error!(details = %details, "repair failed");
            Err(Error::Integrity(details))
        }
    }
}

