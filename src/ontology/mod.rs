//! In-memory ontology model.
//!
//! An [`Ontology`] owns every [`Class`] and [`Property`] of one store, plus the
//! [`NamespaceManager`] used to derive short names. It is built up mutably (usually by
//! [`loader::load_ontology`]), bound to stable row identifiers by the store, and then
//! frozen. A frozen ontology is shared behind an `Arc` by every reader without locking.

pub mod loader;
pub mod namespace;
pub mod types;
pub mod vocab;

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use crate::error::OntologyError;

pub use namespace::NamespaceManager;
pub use types::{
    Cardinality, Class, ClassId, DataType, Property, PropertyDefinition, PropertyId, Range,
};

type OntologyResult<T> = std::result::Result<T, OntologyError>;

/// The aggregate of classes, properties and namespaces for one store.
#[derive(Debug)]
pub struct Ontology {
    classes: Vec<Class>,
    properties: Vec<Property>,
    class_by_uri: HashMap<String, ClassId>,
    property_by_uri: HashMap<String, PropertyId>,
    namespaces: NamespaceManager,
    ontology_uris: Vec<String>,
    frozen: bool,
    effective: RwLock<HashMap<ClassId, Arc<[PropertyId]>>>,
}

impl Default for Ontology {
    fn default() -> Self {
        Self::new()
    }
}

impl Ontology {
    /// An ontology holding only the built-ins: `rdfs:Resource` and `rdf:type`.
    pub fn new() -> Self {
        let mut ontology = Self {
            classes: Vec::new(),
            properties: Vec::new(),
            class_by_uri: HashMap::new(),
            property_by_uri: HashMap::new(),
            namespaces: NamespaceManager::with_defaults(),
            ontology_uris: Vec::new(),
            frozen: false,
            effective: RwLock::new(HashMap::new()),
        };
        let resource = ontology.insert_class(vocab::RDFS_RESOURCE);
        let rdf_type =
            PropertyDefinition::new(vocab::RDF_TYPE, vocab::RDFS_RESOURCE, vocab::RDFS_RESOURCE).indexed();
        ontology.insert_property(&rdf_type, resource, Range::Class(resource));
        ontology
    }

    fn ensure_mutable(&self) -> OntologyResult<()> {
        if self.frozen {
            return Err(OntologyError::OntologyFrozen);
        }
        Ok(())
    }

    fn invalidate_effective(&self) {
        if let Ok(mut memo) = self.effective.write() {
            memo.clear();
        }
    }

    fn short_name(&self, uri: &str) -> String {
        self.namespaces
            .compress(uri)
            .unwrap_or_else(|| uri.to_string())
    }

    fn insert_class(&mut self, uri: &str) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(Class {
            uri: uri.to_string(),
            name: self.short_name(uri),
            id,
            numeric_id: None,
            super_classes: Vec::new(),
            sub_classes: Vec::new(),
            domain_indexes: Vec::new(),
            notify: false,
            location: None,
        });
        self.class_by_uri.insert(uri.to_string(), id);
        id
    }

    fn insert_property(&mut self, def: &PropertyDefinition, domain: ClassId, range: Range) -> PropertyId {
        let id = PropertyId(self.properties.len() as u32);
        self.properties.push(Property {
            uri: def.uri.clone(),
            name: self.short_name(&def.uri),
            id,
            numeric_id: None,
            domain,
            range,
            cardinality: def.cardinality,
            indexed: def.indexed,
            fulltext_indexed: def.fulltext_indexed,
            secondary_index: None,
            inverse_functional: def.inverse_functional,
            weight: def.weight,
            super_properties: Vec::new(),
            domain_indexes: Vec::new(),
            location: def.location.clone(),
        });
        self.property_by_uri.insert(def.uri.clone(), id);
        id
    }

    // --- Mutation -------------------------------------------------------------------

    /// Register a class with the given direct superclasses.
    ///
    /// Idempotent when the class exists and `superclasses` is empty or equal to the
    /// existing set; a different non-empty set fails with `DuplicateClass`.
    pub fn register_class(&mut self, uri: &str, superclasses: &[ClassId]) -> OntologyResult<ClassId> {
        self.ensure_mutable()?;

        if let Some(&existing) = self.class_by_uri.get(uri) {
            let current: BTreeSet<_> = self.classes[existing.index()].super_classes.iter().collect();
            let requested: BTreeSet<_> = superclasses.iter().collect();
            if requested.is_empty() || requested == current {
                return Ok(existing);
            }
            return Err(OntologyError::DuplicateClass { uri: uri.to_string() });
        }

        for sup in superclasses {
            self.check_class(*sup)?;
        }

        let id = self.insert_class(uri);
        for sup in superclasses {
            self.add_superclass(id, *sup)?;
        }
        Ok(id)
    }

    /// Add `superclass` as a direct superclass of `class`.
    ///
    /// Fails with `CyclicInheritance`, leaving the model untouched, if `class` is
    /// already an ancestor of (or equal to) `superclass`.
    pub fn add_superclass(&mut self, class: ClassId, superclass: ClassId) -> OntologyResult<()> {
        self.ensure_mutable()?;
        self.check_class(class)?;
        self.check_class(superclass)?;

        if self.is_subclass_of(superclass, class) {
            return Err(OntologyError::CyclicInheritance {
                class: self.classes[class.index()].uri.clone(),
                superclass: self.classes[superclass.index()].uri.clone(),
            });
        }

        if !self.classes[class.index()].super_classes.contains(&superclass) {
            self.classes[class.index()].super_classes.push(superclass);
            self.classes[superclass.index()].sub_classes.push(class);
            self.invalidate_effective();
        }
        Ok(())
    }

    /// Register a property. Idempotent for an identical redefinition.
    pub fn register_property(&mut self, def: &PropertyDefinition) -> OntologyResult<PropertyId> {
        self.ensure_mutable()?;

        let domain = self
            .class_by_uri
            .get(&def.domain)
            .copied()
            .ok_or_else(|| OntologyError::UnknownDomainOrRange {
                property: def.uri.clone(),
                uri: def.domain.clone(),
            })?;
        let range = self.resolve_range(&def.uri, &def.range)?;

        if let Some(&existing) = self.property_by_uri.get(&def.uri) {
            let prop = &self.properties[existing.index()];
            if prop.domain == domain && prop.range == range && prop.cardinality == def.cardinality {
                return Ok(existing);
            }
            return Err(OntologyError::DuplicateProperty { uri: def.uri.clone() });
        }

        let id = self.insert_property(def, domain, range);
        self.invalidate_effective();
        Ok(id)
    }

    fn resolve_range(&self, property: &str, range: &str) -> OntologyResult<Range> {
        if let Some(t) = DataType::from_datatype_iri(range) {
            return Ok(Range::Literal(t));
        }
        self.class_by_uri
            .get(range)
            .map(|&c| Range::Class(c))
            .ok_or_else(|| OntologyError::UnknownDomainOrRange {
                property: property.to_string(),
                uri: range.to_string(),
            })
    }

    /// Add `super_property` as a direct super-property of `property`.
    pub fn add_super_property(&mut self, property: PropertyId, super_property: PropertyId) -> OntologyResult<()> {
        self.ensure_mutable()?;
        self.check_property(property)?;
        self.check_property(super_property)?;

        if self.property_ancestors(super_property).contains(&property) {
            return Err(OntologyError::CyclicInheritance {
                class: self.properties[property.index()].uri.clone(),
                superclass: self.properties[super_property.index()].uri.clone(),
            });
        }
        let supers = &mut self.properties[property.index()].super_properties;
        if !supers.contains(&super_property) {
            supers.push(super_property);
        }
        Ok(())
    }

    /// Declare a composite `(property, secondary)` index.
    pub fn set_secondary_index(&mut self, property: PropertyId, secondary: PropertyId) -> OntologyResult<()> {
        self.ensure_mutable()?;
        self.check_property(property)?;
        self.check_property(secondary)?;
        self.properties[property.index()].secondary_index = Some(secondary);
        Ok(())
    }

    /// Ask for a denormalised copy of `property` on `class`'s table.
    pub fn add_domain_index(&mut self, class: ClassId, property: PropertyId) -> OntologyResult<()> {
        self.ensure_mutable()?;
        self.check_class(class)?;
        self.check_property(property)?;
        if !self.classes[class.index()].domain_indexes.contains(&property) {
            self.classes[class.index()].domain_indexes.push(property);
            self.properties[property.index()].domain_indexes.push(class);
        }
        Ok(())
    }

    pub fn set_notify(&mut self, class: ClassId, notify: bool) -> OntologyResult<()> {
        self.ensure_mutable()?;
        self.check_class(class)?;
        self.classes[class.index()].notify = notify;
        Ok(())
    }

    pub(crate) fn class_mut(&mut self, class: ClassId) -> OntologyResult<&mut Class> {
        self.ensure_mutable()?;
        self.check_class(class)?;
        Ok(&mut self.classes[class.index()])
    }

    pub(crate) fn property_mut(&mut self, property: PropertyId) -> OntologyResult<&mut Property> {
        self.ensure_mutable()?;
        self.check_property(property)?;
        Ok(&mut self.properties[property.index()])
    }

    /// Register a namespace prefix; short names are recomputed on [`Self::freeze`].
    pub fn add_namespace(&mut self, prefix: &str, base: &str) -> OntologyResult<()> {
        self.ensure_mutable()?;
        self.namespaces.add(prefix, base);
        Ok(())
    }

    pub fn add_ontology_uri(&mut self, uri: &str) -> OntologyResult<()> {
        self.ensure_mutable()?;
        if !self.ontology_uris.iter().any(|u| u == uri) {
            self.ontology_uris.push(uri.to_string());
        }
        Ok(())
    }

    /// Assign stable row identifiers to every class and property.
    ///
    /// `assign` is called once per URI, classes first, in arena order.
    pub fn bind_numeric_ids<E>(&mut self, mut assign: impl FnMut(&str) -> Result<i64, E>) -> Result<(), E>
    where
        E: From<OntologyError>,
    {
        self.ensure_mutable()?;
        for class in &mut self.classes {
            class.numeric_id = Some(assign(&class.uri)?);
        }
        for property in &mut self.properties {
            property.numeric_id = Some(assign(&property.uri)?);
        }
        Ok(())
    }

    /// Make the model immutable. Short names are finalised against the namespace table.
    pub fn freeze(&mut self) {
        if self.frozen {
            return;
        }
        for i in 0..self.classes.len() {
            self.classes[i].name = self.short_name(&self.classes[i].uri);
        }
        for i in 0..self.properties.len() {
            self.properties[i].name = self.short_name(&self.properties[i].uri);
        }
        self.frozen = true;
        tracing::debug!(
            classes = self.classes.len(),
            properties = self.properties.len(),
            "ontology frozen"
        );
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    // --- Lookup ---------------------------------------------------------------------

    fn check_class(&self, class: ClassId) -> OntologyResult<()> {
        if class.index() < self.classes.len() {
            Ok(())
        } else {
            Err(OntologyError::UnknownClass { uri: format!("#{}", class.0) })
        }
    }

    fn check_property(&self, property: PropertyId) -> OntologyResult<()> {
        if property.index() < self.properties.len() {
            Ok(())
        } else {
            Err(OntologyError::UnknownProperty { uri: format!("#{}", property.0) })
        }
    }

    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.index()]
    }

    pub fn property(&self, id: PropertyId) -> &Property {
        &self.properties[id.index()]
    }

    pub fn class_by_uri(&self, uri: &str) -> Option<&Class> {
        self.class_by_uri.get(uri).map(|id| &self.classes[id.index()])
    }

    pub fn property_by_uri(&self, uri: &str) -> Option<&Property> {
        self.property_by_uri.get(uri).map(|id| &self.properties[id.index()])
    }

    pub fn class_by_numeric_id(&self, numeric_id: i64) -> Option<&Class> {
        self.classes.iter().find(|c| c.numeric_id == Some(numeric_id))
    }

    pub fn classes(&self) -> &[Class] {
        &self.classes
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn namespaces(&self) -> &NamespaceManager {
        &self.namespaces
    }

    pub fn ontology_uris(&self) -> &[String] {
        &self.ontology_uris
    }

    pub fn resource_class(&self) -> ClassId {
        ClassId(0)
    }

    pub fn rdf_type(&self) -> PropertyId {
        PropertyId(0)
    }

    /// Expand a prefixed name or pass a full IRI through.
    pub fn expand_name(&self, name: &str) -> Option<String> {
        if name.contains("://") || name.starts_with("urn:") {
            Some(name.to_string())
        } else {
            self.namespaces.expand(name)
        }
    }

    // --- Inheritance ----------------------------------------------------------------

    /// `true` if `class` equals `ancestor` or transitively inherits from it.
    pub fn is_subclass_of(&self, class: ClassId, ancestor: ClassId) -> bool {
        self.ancestors(class).contains(&ancestor)
    }

    /// `class` followed by every transitive superclass, breadth-first, without repeats.
    pub fn ancestors(&self, class: ClassId) -> Vec<ClassId> {
        self.closure(class, |c| self.classes[c.index()].super_classes.as_slice())
    }

    /// `class` followed by every transitive subclass, breadth-first, without repeats.
    pub fn descendants(&self, class: ClassId) -> Vec<ClassId> {
        self.closure(class, |c| self.classes[c.index()].sub_classes.as_slice())
    }

    fn closure<'a>(&'a self, start: ClassId, edges: impl Fn(ClassId) -> &'a [ClassId]) -> Vec<ClassId> {
        let mut seen = vec![start];
        let mut queue = VecDeque::from([start]);
        while let Some(next) = queue.pop_front() {
            for &edge in edges(next) {
                if !seen.contains(&edge) {
                    seen.push(edge);
                    queue.push_back(edge);
                }
            }
        }
        seen
    }

    fn property_ancestors(&self, property: PropertyId) -> Vec<PropertyId> {
        let mut seen = vec![property];
        let mut queue = VecDeque::from([property]);
        while let Some(next) = queue.pop_front() {
            for &sup in &self.properties[next.index()].super_properties {
                if !seen.contains(&sup) {
                    seen.push(sup);
                    queue.push_back(sup);
                }
            }
        }
        seen
    }

    /// Properties whose declared domain is exactly `class`.
    pub fn declared_properties(&self, class: ClassId) -> impl Iterator<Item = &Property> {
        self.properties.iter().filter(move |p| p.domain == class)
    }

    /// Own and inherited properties of `class`, memoized until the next superclass
    /// edge or property registration.
    pub fn resolve_effective_properties(&self, class: ClassId) -> Arc<[PropertyId]> {
        if let Some(hit) = self.effective.read().ok().and_then(|m| m.get(&class).cloned()) {
            return hit;
        }

        let ancestors = self.ancestors(class);
        let set: Arc<[PropertyId]> = self
            .properties
            .iter()
            .filter(|p| ancestors.contains(&p.domain))
            .map(|p| p.id)
            .collect();

        if let Ok(mut memo) = self.effective.write() {
            memo.insert(class, Arc::clone(&set));
        }
        set
    }
}
