//! Class and property descriptors.
//!
//! Classes and properties live in arenas owned by [`super::Ontology`]; they refer to
//! each other through [`ClassId`] and [`PropertyId`] indexes rather than pointers, so
//! the inheritance graph never forms ownership cycles.

use serde::{Deserialize, Serialize};

use crate::error::SourceLocation;

/// Index of a class inside its ontology's class arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(pub(crate) u32);

/// Index of a property inside its ontology's property arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyId(pub(crate) u32);

impl ClassId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl PropertyId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Value type of a property's objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    Boolean,
    Integer,
    Double,
    Date,
    DateTime,
    /// Object is another resource (an IRI).
    Resource,
    /// `rdf:langString`.
    LangString,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Double => "double",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Resource => "resource",
            Self::LangString => "langstring",
        }
    }

    /// Map an XSD/RDF datatype IRI onto a literal data type.
    pub fn from_datatype_iri(iri: &str) -> Option<Self> {
        let local = iri
            .strip_prefix(super::vocab::XSD)
            .map(|l| ("xsd", l))
            .or_else(|| iri.strip_prefix(super::vocab::RDF).map(|l| ("rdf", l)))?;
        match local {
            ("xsd", "string") => Some(Self::String),
            ("xsd", "boolean") => Some(Self::Boolean),
            ("xsd", "integer" | "int" | "long" | "short" | "byte" | "nonNegativeInteger") => {
                Some(Self::Integer)
            }
            ("xsd", "double" | "float" | "decimal") => Some(Self::Double),
            ("xsd", "date") => Some(Self::Date),
            ("xsd", "dateTime") => Some(Self::DateTime),
            ("rdf", "langString") => Some(Self::LangString),
            _ => None,
        }
    }

    /// The canonical datatype IRI used when serializing literals of this type.
    pub fn datatype_iri(&self) -> Option<&'static str> {
        match self {
            Self::String => Some("http://www.w3.org/2001/XMLSchema#string"),
            Self::Boolean => Some("http://www.w3.org/2001/XMLSchema#boolean"),
            Self::Integer => Some("http://www.w3.org/2001/XMLSchema#integer"),
            Self::Double => Some("http://www.w3.org/2001/XMLSchema#double"),
            Self::Date => Some("http://www.w3.org/2001/XMLSchema#date"),
            Self::DateTime => Some("http://www.w3.org/2001/XMLSchema#dateTime"),
            Self::LangString => Some("http://www.w3.org/1999/02/22-rdf-syntax-ns#langString"),
            Self::Resource => None,
        }
    }

    /// SQL column type for values of this type.
    pub fn sql_type(&self) -> &'static str {
        match self {
            Self::String => "TEXT",
            Self::LangString => "BLOB",
            Self::Boolean | Self::Integer | Self::Date | Self::DateTime | Self::Resource => {
                "INTEGER"
            }
            Self::Double => "REAL",
        }
    }

    /// Whether string comparison on this column goes through the locale collation.
    pub fn is_collated(&self) -> bool {
        matches!(self, Self::String)
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(Self::String),
            "boolean" => Ok(Self::Boolean),
            "integer" => Ok(Self::Integer),
            "double" => Ok(Self::Double),
            "date" => Ok(Self::Date),
            "datetime" => Ok(Self::DateTime),
            "resource" => Ok(Self::Resource),
            "langstring" => Ok(Self::LangString),
            _ => Err(format!("unknown data type: {s}")),
        }
    }
}

/// How many values a property may hold per subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    Single,
    Multiple,
}

impl Cardinality {
    pub fn is_multiple(&self) -> bool {
        matches!(self, Self::Multiple)
    }
}

/// What objects of a property must be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Range {
    /// A resource that is an instance of the class (or a descendant).
    Class(ClassId),
    /// A literal of the given type.
    Literal(DataType),
}

/// A class descriptor.
#[derive(Debug, Clone)]
pub struct Class {
    pub(crate) uri: String,
    pub(crate) name: String,
    pub(crate) id: ClassId,
    pub(crate) numeric_id: Option<i64>,
    pub(crate) super_classes: Vec<ClassId>,
    pub(crate) sub_classes: Vec<ClassId>,
    pub(crate) domain_indexes: Vec<PropertyId>,
    pub(crate) notify: bool,
    pub(crate) location: Option<SourceLocation>,
}

impl Class {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Short, prefixed name (e.g. `nfo:Document`), used for physical table names.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> ClassId {
        self.id
    }

    /// The stable row identifier assigned when the ontology was bound to a store.
    pub fn numeric_id(&self) -> Option<i64> {
        self.numeric_id
    }

    pub fn super_classes(&self) -> &[ClassId] {
        &self.super_classes
    }

    pub fn sub_classes(&self) -> &[ClassId] {
        &self.sub_classes
    }

    pub fn domain_indexes(&self) -> &[PropertyId] {
        &self.domain_indexes
    }

    pub fn notify(&self) -> bool {
        self.notify
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }
}

/// A property descriptor.
#[derive(Debug, Clone)]
pub struct Property {
    pub(crate) uri: String,
    pub(crate) name: String,
    pub(crate) id: PropertyId,
    pub(crate) numeric_id: Option<i64>,
    pub(crate) domain: ClassId,
    pub(crate) range: Range,
    pub(crate) cardinality: Cardinality,
    pub(crate) indexed: bool,
    pub(crate) fulltext_indexed: bool,
    pub(crate) secondary_index: Option<PropertyId>,
    pub(crate) inverse_functional: bool,
    pub(crate) weight: i64,
    pub(crate) super_properties: Vec<PropertyId>,
    pub(crate) domain_indexes: Vec<ClassId>,
    pub(crate) location: Option<SourceLocation>,
}

impl Property {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Short, prefixed name (e.g. `nie:title`), used for physical column names.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> PropertyId {
        self.id
    }

    pub fn numeric_id(&self) -> Option<i64> {
        self.numeric_id
    }

    pub fn domain(&self) -> ClassId {
        self.domain
    }

    pub fn range(&self) -> Range {
        self.range
    }

    pub fn data_type(&self) -> DataType {
        match self.range {
            Range::Class(_) => DataType::Resource,
            Range::Literal(t) => t,
        }
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn is_multi_valued(&self) -> bool {
        self.cardinality.is_multiple()
    }

    pub fn indexed(&self) -> bool {
        self.indexed
    }

    pub fn fulltext_indexed(&self) -> bool {
        self.fulltext_indexed
    }

    pub fn secondary_index(&self) -> Option<PropertyId> {
        self.secondary_index
    }

    pub fn inverse_functional(&self) -> bool {
        self.inverse_functional
    }

    pub fn weight(&self) -> i64 {
        self.weight
    }

    pub fn super_properties(&self) -> &[PropertyId] {
        &self.super_properties
    }

    pub fn domain_indexes(&self) -> &[ClassId] {
        &self.domain_indexes
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }
}

/// Arguments for [`super::Ontology::register_property`].
#[derive(Debug, Clone)]
pub struct PropertyDefinition {
    pub uri: String,
    /// Domain class URI.
    pub domain: String,
    /// Range class URI or XSD datatype IRI.
    pub range: String,
    pub cardinality: Cardinality,
    pub indexed: bool,
    pub fulltext_indexed: bool,
    pub inverse_functional: bool,
    pub weight: i64,
    pub location: Option<SourceLocation>,
}

impl PropertyDefinition {
    pub fn new(uri: impl Into<String>, domain: impl Into<String>, range: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            domain: domain.into(),
            range: range.into(),
            cardinality: Cardinality::Multiple,
            indexed: false,
            fulltext_indexed: false,
            inverse_functional: false,
            weight: 1,
            location: None,
        }
    }

    pub fn single_valued(mut self) -> Self {
        self.cardinality = Cardinality::Single;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn fulltext(mut self) -> Self {
        self.fulltext_indexed = true;
        self
    }

    pub fn inverse_functional(mut self) -> Self {
        self.inverse_functional = true;
        self
    }

    pub fn weight(mut self, weight: i64) -> Self {
        self.weight = weight;
        self
    }
}
