//! Locale-aware collation for string columns.
//!
//! Every connection registers the [`COLLATION`] collation before touching ontology
//! tables. Its ordering depends on the process locale, so the locale in effect when
//! indexes were last built is stamped in `schema_meta`; opening the store under a
//! different locale rebuilds every index that uses the collation.
//!
//! Only two orderings exist: `C`/`POSIX` compare code points, and every other locale
//! compares case-folded text with code points as the tie-break. Language-specific
//! tailoring (for example `de_DE` versus `sv_SE`) is not applied, so switching between
//! two non-`C` locales rebuilds the indexes without changing their order.

use std::cmp::Ordering;

use rusqlite::Connection;

use super::schema::{get_meta, set_meta, META_LOCALE};
use crate::schema::COLLATION;

/// The collation locale of this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale(String);

impl Locale {
    /// Resolve from `LC_ALL`, then `LC_COLLATE`, then `LANG`. Defaults to `C`.
    pub fn current() -> Self {
        ["LC_ALL", "LC_COLLATE", "LANG"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|v| !v.is_empty())
            .map_or_else(|| Self::new("C"), Self)
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `C` and `POSIX` (in any encoding) order by code point.
    pub fn is_bytewise(&self) -> bool {
        let base = self.0.split('.').next().unwrap_or_default();
        base == "C" || base == "POSIX"
    }
}

/// Compare two strings the way the collation does under a locale.
pub fn compare(bytewise: bool, a: &str, b: &str) -> Ordering {
    if bytewise {
        return a.cmp(b);
    }
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Register the collation on `conn`.
pub fn register(conn: &Connection, locale: &Locale) -> rusqlite::Result<()> {
    let bytewise = locale.is_bytewise();
    conn.create_collation(COLLATION, move |a: &str, b: &str| compare(bytewise, a, b))
}

/// Rebuild collated indexes when the stored locale differs from `locale`.
///
/// Returns `true` if a rebuild happened. The first call on a store only stamps.
pub fn reindex_if_locale_changed(conn: &Connection, locale: &Locale) -> rusqlite::Result<bool> {
    let stored = get_meta(conn, META_LOCALE)?.unwrap_or_default();
    if stored == locale.as_str() {
        return Ok(false);
    }
    let rebuild = !stored.is_empty();
    if rebuild {
        tracing::info!(from = %stored, to = %locale.as_str(), "locale changed, rebuilding collated indexes");
        conn.execute_batch(&format!("REINDEX {COLLATION}"))?;
    }
    set_meta(conn, META_LOCALE, locale.as_str())?;
    Ok(rebuild)
}
