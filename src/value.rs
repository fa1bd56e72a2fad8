//! RDF terms and their physical encoding.
//!
//! Literals are stored in the SQL type of their property (see
//! [`DataType::sql_type`]): dates and datetimes as Unix seconds in UTC (an INTEGER,
//! or a REAL when the value has a fractional second, kept to the microsecond),
//! booleans as 0/1, language-tagged strings as `text NUL lang` blobs.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::types::{Value, ValueRef};

use crate::cursor::{Cell, Cursor, ValueType};
use crate::ontology::DataType;

/// Prefix of the IRIs minted for blank nodes.
pub const BNODE_PREFIX: &str = "urn:bnode:";

/// The object (or subject) of a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Iri(String),
    BlankNode(String),
    Literal(Literal),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub value: String,
    pub datatype: Option<String>,
    pub language: Option<String>,
}

impl Term {
    pub fn iri(iri: impl Into<String>) -> Self {
        Self::Iri(iri.into())
    }

    pub fn blank(id: impl Into<String>) -> Self {
        Self::BlankNode(id.into())
    }

    /// A plain string literal.
    pub fn string(value: impl Into<String>) -> Self {
        Self::Literal(Literal {
            value: value.into(),
            datatype: None,
            language: None,
        })
    }

    pub fn typed(value: impl Into<String>, data_type: DataType) -> Self {
        Self::Literal(Literal {
            value: value.into(),
            datatype: data_type.datatype_iri().map(str::to_string),
            language: None,
        })
    }

    pub fn lang_string(value: impl Into<String>, language: impl Into<String>) -> Self {
        Self::Literal(Literal {
            value: value.into(),
            datatype: DataType::LangString.datatype_iri().map(str::to_string),
            language: Some(language.into()),
        })
    }

    pub fn integer(value: i64) -> Self {
        Self::typed(value.to_string(), DataType::Integer)
    }

    pub fn boolean(value: bool) -> Self {
        Self::typed(value.to_string(), DataType::Boolean)
    }

    pub fn double(value: f64) -> Self {
        Self::typed(value.to_string(), DataType::Double)
    }

    /// The term in `column` of the cursor's current row.
    pub fn from_cursor(cursor: &dyn Cursor, column: usize) -> Option<Self> {
        let text = cursor.get_string(column)?;
        Some(match cursor.get_value_type(column) {
            ValueType::Unbound => return None,
            ValueType::Uri => Self::Iri(text.to_string()),
            ValueType::BlankNode => Self::BlankNode(text.to_string()),
            _ => Self::Literal(Literal {
                value: text.to_string(),
                datatype: cursor.get_datatype(column).map(str::to_string),
                language: cursor.get_language(column).map(str::to_string),
            }),
        })
    }

    pub fn as_resource(&self) -> Option<&str> {
        match self {
            Self::Iri(iri) | Self::BlankNode(iri) => Some(iri),
            Self::Literal(_) => None,
        }
    }
}

impl std::fmt::Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Iri(iri) => write!(f, "<{iri}>"),
            Self::BlankNode(id) => write!(f, "_:{id}"),
            Self::Literal(l) => match (&l.language, &l.datatype) {
                (Some(lang), _) => write!(f, "{:?}@{lang}", l.value),
                (None, Some(dt)) => write!(f, "{:?}^^<{dt}>", l.value),
                (None, None) => write!(f, "{:?}", l.value),
            },
        }
    }
}

/// Convert a literal into the SQL value stored for `data_type`.
///
/// Fails with a human-readable reason when the lexical form does not parse.
pub fn encode_literal(data_type: DataType, literal: &Literal) -> Result<Value, String> {
    let v = literal.value.trim();
    let bad = || format!("{:?} is not a valid {data_type}", literal.value);

    if let Some(dt) = literal.datatype.as_deref().and_then(DataType::from_datatype_iri) {
        if !compatible(dt, data_type) {
            return Err(format!("{dt} literal given for a {data_type} property"));
        }
    }

    Ok(match data_type {
        DataType::String => Value::Text(literal.value.clone()),
        DataType::LangString => {
            let lang = literal.language.as_deref().unwrap_or_default();
            let mut blob = Vec::with_capacity(literal.value.len() + lang.len() + 1);
            blob.extend_from_slice(literal.value.as_bytes());
            blob.push(0);
            blob.extend_from_slice(lang.as_bytes());
            Value::Blob(blob)
        }
        DataType::Boolean => match v {
            "true" | "1" => Value::Integer(1),
            "false" | "0" => Value::Integer(0),
            _ => return Err(bad()),
        },
        DataType::Integer => Value::Integer(v.parse().map_err(|_| bad())?),
        DataType::Double => Value::Real(v.parse().map_err(|_| bad())?),
        DataType::Date | DataType::DateTime => timestamp_value(parse_timestamp(v).ok_or_else(bad)?),
        DataType::Resource => return Err("a literal cannot be stored in a resource property".into()),
    })
}

fn compatible(given: DataType, declared: DataType) -> bool {
    given == declared
        || given == DataType::String
        || matches!(
            (given, declared),
            (DataType::Integer, DataType::Double)
                | (DataType::Date, DataType::DateTime)
                | (DataType::DateTime, DataType::Date)
                | (DataType::LangString, DataType::String)
        )
}

/// The UTC instant of an `xsd:date` or `xsd:dateTime` lexical form. A datetime
/// without an offset is taken as UTC.
pub fn parse_timestamp(v: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(v) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(v, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(v, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Whole seconds as INTEGER, anything finer as REAL seconds rounded to the microsecond.
fn timestamp_value(dt: DateTime<Utc>) -> Value {
    let micros = dt.timestamp_subsec_micros();
    if micros == 0 {
        Value::Integer(dt.timestamp())
    } else {
        Value::Real(dt.timestamp() as f64 + f64::from(micros) / 1e6)
    }
}

/// Inverse of [`timestamp_value`].
fn timestamp_from_value(value: ValueRef<'_>) -> Option<DateTime<Utc>> {
    match value {
        ValueRef::Integer(secs) => DateTime::from_timestamp(secs, 0),
        ValueRef::Real(r) => {
            let secs = r.floor();
            let micros = ((r - secs) * 1e6).round() as i64;
            DateTime::from_timestamp(secs as i64, 0)
                .map(|dt| dt + chrono::Duration::microseconds(micros))
        }
        ValueRef::Text(t) => std::str::from_utf8(t).ok()?.parse().ok().and_then(|s| DateTime::from_timestamp(s, 0)),
        _ => None,
    }
}

/// Fill `cell` from a stored SQL value of a `data_type` column.
pub(crate) fn decode_into(data_type: DataType, value: ValueRef<'_>, cell: &mut Cell) {
    let text = match value {
        ValueRef::Null => {
            cell.clear();
            return;
        }
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => String::from_utf8_lossy(b).into_owned(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(r) => r.to_string(),
    };

    match data_type {
        DataType::Resource => cell.set(ValueType::Uri, &text),
        DataType::String => {
            cell.set(ValueType::String, &text);
        }
        DataType::LangString => {
            let (value, lang) = text.split_once('\0').unwrap_or((text.as_str(), ""));
            cell.set(ValueType::String, value);
            if !lang.is_empty() {
                cell.language = Some(lang.to_string());
            }
        }
        DataType::Boolean => {
            let b = matches!(value, ValueRef::Integer(i) if i != 0) || text == "true";
            cell.set(ValueType::Boolean, if b { "true" } else { "false" });
        }
        DataType::Integer => cell.set(ValueType::Integer, &text),
        DataType::Double => cell.set(ValueType::Double, &text),
        DataType::Date | DataType::DateTime => {
            let formatted = timestamp_from_value(value)
                .map(|dt| {
                    if data_type == DataType::Date {
                        dt.date_naive().format("%Y-%m-%d").to_string()
                    } else {
                        dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
                    }
                })
                .unwrap_or(text);
            cell.set(ValueType::DateTime, &formatted);
        }
    }
    if data_type != DataType::Resource {
        cell.datatype = data_type.datatype_iri().map(str::to_string);
    }
}

/// `true` for IRIs minted for blank nodes.
pub fn is_skolem_iri(iri: &str) -> bool {
    iri.starts_with(BNODE_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(value: &str) -> Literal {
        Literal {
            value: value.into(),
            datatype: None,
            language: None,
        }
    }

    fn decode(data_type: DataType, value: Value) -> Cell {
        let mut cell = Cell::default();
        decode_into(data_type, ValueRef::from(&value), &mut cell);
        cell
    }

    #[test]
    fn datetimes_are_stored_as_unix_seconds() {
        let v = encode_literal(DataType::DateTime, &lit("2024-01-31T10:00:00Z")).unwrap();
        assert_eq!(v, Value::Integer(1_706_695_200));
        let cell = decode(DataType::DateTime, v);
        assert_eq!(cell.text, "2024-01-31T10:00:00Z");
        assert_eq!(cell.kind, ValueType::DateTime);

        let v = encode_literal(DataType::Date, &lit("2024-01-31")).unwrap();
        assert_eq!(decode(DataType::Date, v).text, "2024-01-31");
    }

    #[test]
    fn fractional_seconds_survive_storage() {
        let v = encode_literal(DataType::DateTime, &lit("2024-01-31T10:00:00.750Z")).unwrap();
        assert_eq!(v, Value::Real(1_706_695_200.75));
        assert_eq!(decode(DataType::DateTime, v).text, "2024-01-31T10:00:00.750Z");

        let v = encode_literal(DataType::DateTime, &lit("2024-01-31T10:00:00.123456")).unwrap();
        assert_eq!(decode(DataType::DateTime, v).text, "2024-01-31T10:00:00.123456Z");
    }

    #[test]
    fn offsets_are_normalised_to_utc() {
        let v = encode_literal(DataType::DateTime, &lit("2024-01-31T12:00:00+02:00")).unwrap();
        assert_eq!(decode(DataType::DateTime, v).text, "2024-01-31T10:00:00Z");
    }

    #[test]
    fn lang_strings_keep_their_tag() {
        let Term::Literal(l) = Term::lang_string("Hallo", "de") else {
            unreachable!()
        };
        let v = encode_literal(DataType::LangString, &l).unwrap();
        let cell = decode(DataType::LangString, v);
        assert_eq!(cell.text, "Hallo");
        assert_eq!(cell.language.as_deref(), Some("de"));
    }

    #[test]
    fn unparseable_literals_are_rejected() {
        assert!(encode_literal(DataType::Integer, &lit("twelve")).is_err());
        assert!(encode_literal(DataType::Boolean, &lit("yes")).is_err());
        assert!(encode_literal(DataType::Date, &lit("31/01/2024")).is_err());
        let Term::Literal(b) = Term::boolean(true) else { unreachable!() };
        assert!(encode_literal(DataType::Integer, &b).is_err());
    }

    #[test]
    fn booleans_decode_to_words() {
        let v = encode_literal(DataType::Boolean, &lit("1")).unwrap();
        assert_eq!(decode(DataType::Boolean, v).text, "true");
        assert_eq!(decode(DataType::Boolean, Value::Null).kind, ValueType::Unbound);
    }
}
