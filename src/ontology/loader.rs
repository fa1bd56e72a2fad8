//! Builds an [`Ontology`] from ontology description statements.
//!
//! Loading runs in two passes. The first drains the cursor and groups the statements
//! the loader understands by subject, remembering where each came from. The second
//! registers namespaces, classes, inheritance edges and properties, then applies the
//! index and notification flags. Problems are collected rather than raised one by
//! one; if there are any, the load fails with the first and nothing is returned.
//!
//! When the same attribute is given twice (typically by a later file layered over a
//! base ontology) the later value wins and the override is logged.

use std::collections::HashMap;
use std::path::PathBuf;

use super::{vocab, Cardinality, ClassId, Ontology, PropertyDefinition};
use crate::cursor::{columns, open_sources, Cursor};
use crate::error::{OntologyError, Result, SourceLocation};
use crate::value::Term;

/// Load the ontology described by every file in `sources` (files or directories).
///
/// With no sources the result holds only the built-in classes and properties.
pub fn load_ontology_sources(sources: &[PathBuf]) -> Result<Ontology> {
    if sources.is_empty() {
        return Ok(Ontology::new());
    }
    let mut cursor = open_sources(sources)?;
    load_ontology(cursor.as_mut())
}

/// Load an ontology from a statement cursor (subject, predicate, object columns).
pub fn load_ontology(cursor: &mut dyn Cursor) -> Result<Ontology> {
    let mut drafts = Drafts::default();
    let mut count = 0usize;
    while cursor.next()? {
        let (Some(subject), Some(predicate), Some(object)) = (
            cursor.get_string(columns::SUBJECT),
            cursor.get_string(columns::PREDICATE),
            Term::from_cursor(cursor, columns::OBJECT),
        ) else {
            continue;
        };
        let location = cursor.get_parser_location().unwrap_or_default();
        drafts.collect(subject, predicate, object, location);
        count += 1;
    }
    tracing::debug!(statements = count, "collected ontology statements");

    let mut builder = Builder {
        ontology: Ontology::new(),
        errors: Vec::new(),
    };
    builder.apply(&drafts);

    match builder.errors.into_iter().next() {
        Some(first) => Err(first.into()),
        None => {
            tracing::info!(
                classes = builder.ontology.classes().len(),
                properties = builder.ontology.properties().len(),
                "ontology loaded"
            );
            Ok(builder.ontology)
        }
    }
}

#[derive(Debug, Clone)]
struct Attr {
    value: String,
    location: SourceLocation,
}

#[derive(Debug, Default)]
struct ClassDraft {
    location: SourceLocation,
    declared: bool,
    super_classes: Vec<Attr>,
    domain_indexes: Vec<Attr>,
    notify: Option<Attr>,
}

#[derive(Debug, Default)]
struct PropertyDraft {
    location: SourceLocation,
    declared: bool,
    inverse_functional: bool,
    attrs: HashMap<&'static str, Attr>,
    super_properties: Vec<Attr>,
}

/// Statements of the first pass, grouped by subject in order of first appearance.
#[derive(Debug, Default)]
struct Drafts {
    class_order: Vec<String>,
    classes: HashMap<String, ClassDraft>,
    property_order: Vec<String>,
    properties: HashMap<String, PropertyDraft>,
    namespaces: Vec<(String, Attr)>,
    ontologies: Vec<String>,
}

const PROPERTY_ATTRS: &[(&str, &str)] = &[
    (vocab::RDFS_DOMAIN, "domain"),
    (vocab::RDFS_RANGE, "range"),
    (vocab::NRL_MAX_CARDINALITY, "maxCardinality"),
    (vocab::NRL_INDEXED, "indexed"),
    (vocab::NRL_FULLTEXT_INDEXED, "fulltextIndexed"),
    (vocab::NRL_WEIGHT, "weight"),
    (vocab::NRL_SECONDARY_INDEX, "secondaryIndex"),
];

impl Drafts {
    fn class(&mut self, uri: &str) -> &mut ClassDraft {
        if !self.classes.contains_key(uri) {
            self.class_order.push(uri.to_string());
        }
        self.classes.entry(uri.to_string()).or_default()
    }

    fn property(&mut self, uri: &str) -> &mut PropertyDraft {
        if !self.properties.contains_key(uri) {
            self.property_order.push(uri.to_string());
        }
        self.properties.entry(uri.to_string()).or_default()
    }

    fn collect(&mut self, subject: &str, predicate: &str, object: Term, location: SourceLocation) {
        let value = match &object {
            Term::Iri(iri) | Term::BlankNode(iri) => iri.clone(),
            Term::Literal(l) => l.value.clone(),
        };
        let attr = Attr { value, location };

        match predicate {
            vocab::RDF_TYPE => match attr.value.as_str() {
                vocab::RDFS_CLASS => {
                    let class = self.class(subject);
                    class.declared = true;
                    class.location = attr.location;
                }
                vocab::RDF_PROPERTY | vocab::NRL_INVERSE_FUNCTIONAL_PROPERTY => {
                    let inverse = attr.value == vocab::NRL_INVERSE_FUNCTIONAL_PROPERTY;
                    let property = self.property(subject);
                    if !property.declared {
                        property.location = attr.location;
                    }
                    property.declared = true;
                    property.inverse_functional |= inverse;
                }
                vocab::NRL_ONTOLOGY => self.ontologies.push(subject.to_string()),
                _ => {}
            },
            vocab::NRL_PREFIX => self.namespaces.push((subject.to_string(), attr)),
            vocab::RDFS_SUB_CLASS_OF => self.class(subject).super_classes.push(attr),
            vocab::RDFS_SUB_PROPERTY_OF => self.property(subject).super_properties.push(attr),
            vocab::NRL_DOMAIN_INDEX => self.class(subject).domain_indexes.push(attr),
            vocab::NRL_NOTIFY => {
                let class = self.class(subject);
                override_attr(subject, "notify", &mut class.notify, attr);
            }
            _ => {
                if let Some(&(_, key)) = PROPERTY_ATTRS.iter().find(|(p, _)| *p == predicate) {
                    let property = self.property(subject);
                    let mut slot = property.attrs.remove(key);
                    override_attr(subject, key, &mut slot, attr);
                    if let Some(a) = slot {
                        property.attrs.insert(key, a);
                    }
                }
            }
        }
    }
}

fn override_attr(subject: &str, key: &str, slot: &mut Option<Attr>, attr: Attr) {
    if let Some(previous) = slot.as_ref() {
        if previous.value != attr.value {
            tracing::warn!(
                subject,
                attribute = key,
                old = %previous.value,
                new = %attr.value,
                at = %attr.location,
                "ontology attribute overridden"
            );
        }
    }
    *slot = Some(attr);
}

struct Builder {
    ontology: Ontology,
    errors: Vec<OntologyError>,
}

impl Builder {
    fn fail(&mut self, location: &SourceLocation, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(at = %location, "{message}");
        self.errors.push(OntologyError::InvalidDefinition {
            location: location.clone(),
            message,
        });
    }

    fn check<T>(&mut self, location: &SourceLocation, result: std::result::Result<T, OntologyError>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                self.fail(location, e.to_string());
                None
            }
        }
    }

    fn class_id(&mut self, uri: &str, location: &SourceLocation) -> Option<ClassId> {
        match self.ontology.class_by_uri(uri) {
            Some(c) => Some(c.id()),
            None => {
                self.fail(location, format!("unknown class {uri}"));
                None
            }
        }
    }

    fn apply(&mut self, drafts: &Drafts) {
        for uri in &drafts.ontologies {
            let _ = self.ontology.add_ontology_uri(uri);
        }
        for (base, prefix) in &drafts.namespaces {
            let r = self.ontology.add_namespace(&prefix.value, base);
            self.check(&prefix.location, r);
        }

        self.apply_classes(drafts);
        self.apply_properties(drafts);
        self.apply_class_flags(drafts);
    }

    fn apply_classes(&mut self, drafts: &Drafts) {
        for uri in &drafts.class_order {
            let draft = &drafts.classes[uri];
            if !draft.declared {
                let at = draft
                    .super_classes
                    .first()
                    .or(draft.domain_indexes.first())
                    .or(draft.notify.as_ref())
                    .map(|a| a.location.clone())
                    .unwrap_or_default();
                if self.ontology.class_by_uri(uri).is_none() {
                    self.fail(&at, format!("{uri} is used as a class but never declared as rdfs:Class"));
                }
                continue;
            }
            let r = self.ontology.register_class(uri, &[]);
            if let Some(id) = self.check(&draft.location, r) {
                if let Ok(class) = self.ontology.class_mut(id) {
                    class.location = Some(draft.location.clone());
                }
            }
        }

        let resource = self.ontology.resource_class();
        for uri in &drafts.class_order {
            let draft = &drafts.classes[uri];
            let Some(class) = self.ontology.class_by_uri(uri).map(|c| c.id()) else {
                continue;
            };
            for sup in &draft.super_classes {
                if let Some(sup_id) = self.class_id(&sup.value, &sup.location) {
                    let r = self.ontology.add_superclass(class, sup_id);
                    self.check(&sup.location, r);
                }
            }
            if class != resource && self.ontology.class(class).super_classes().is_empty() {
                let r = self.ontology.add_superclass(class, resource);
                self.check(&draft.location, r);
            }
        }
    }

    fn apply_properties(&mut self, drafts: &Drafts) {
        for uri in &drafts.property_order {
            let draft = &drafts.properties[uri];
            if !draft.declared {
                let at = draft.attrs.values().next().map(|a| a.location.clone()).unwrap_or_default();
                if self.ontology.property_by_uri(uri).is_none() {
                    self.fail(&at, format!("{uri} is used as a property but never declared as rdf:Property"));
                }
                continue;
            }
            if let Some(def) = self.definition(uri, draft) {
                let r = self.ontology.register_property(&def);
                self.check(&draft.location, r);
            }
        }

        for uri in &drafts.property_order {
            let draft = &drafts.properties[uri];
            let Some(property) = self.ontology.property_by_uri(uri).map(|p| p.id()) else {
                continue;
            };
            for sup in &draft.super_properties {
                match self.ontology.property_by_uri(&sup.value).map(|p| p.id()) {
                    Some(sup_id) => {
                        let r = self.ontology.add_super_property(property, sup_id);
                        self.check(&sup.location, r);
                    }
                    None => self.fail(&sup.location, format!("unknown property {}", sup.value)),
                }
            }

            if let Some(secondary) = draft.attrs.get("secondaryIndex") {
                self.apply_secondary_index(uri, secondary);
            }
        }
    }

    fn definition(&mut self, uri: &str, draft: &PropertyDraft) -> Option<PropertyDefinition> {
        let (Some(domain), Some(range)) = (draft.attrs.get("domain"), draft.attrs.get("range")) else {
            self.fail(&draft.location, format!("property {uri} needs both rdfs:domain and rdfs:range"));
            return None;
        };

        let mut def = PropertyDefinition::new(uri, &domain.value, &range.value);
        def.location = Some(draft.location.clone());
        def.inverse_functional = draft.inverse_functional;

        if let Some(max) = draft.attrs.get("maxCardinality") {
            match max.value.trim().parse::<u64>() {
                Ok(0) => {
                    self.fail(&max.location, format!("property {uri} has nrl:maxCardinality 0"));
                    return None;
                }
                Ok(1) => def.cardinality = Cardinality::Single,
                Ok(_) => def.cardinality = Cardinality::Multiple,
                Err(_) => {
                    self.fail(&max.location, format!("invalid nrl:maxCardinality {:?} on {uri}", max.value));
                    return None;
                }
            }
        }
        if let Some(a) = draft.attrs.get("indexed") {
            def.indexed = self.boolean(a)?;
        }
        if let Some(a) = draft.attrs.get("fulltextIndexed") {
            def.fulltext_indexed = self.boolean(a)?;
        }
        if let Some(a) = draft.attrs.get("weight") {
            match a.value.trim().parse() {
                Ok(w) => def.weight = w,
                Err(_) => {
                    self.fail(&a.location, format!("invalid nrl:weight {:?} on {uri}", a.value));
                    return None;
                }
            }
        }
        Some(def)
    }

    fn boolean(&mut self, attr: &Attr) -> Option<bool> {
        match attr.value.trim() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            other => {
                self.fail(&attr.location, format!("expected a boolean, found {other:?}"));
                None
            }
        }
    }

    fn apply_secondary_index(&mut self, uri: &str, secondary: &Attr) {
        let describe = |p: &super::Property| (p.id(), p.indexed(), p.is_multi_valued(), p.domain());
        let Some((primary, indexed, primary_multi, primary_domain)) = self.ontology.property_by_uri(uri).map(describe)
        else {
            return;
        };
        let Some((other, _, other_multi, other_domain)) =
            self.ontology.property_by_uri(&secondary.value).map(describe)
        else {
            self.fail(&secondary.location, format!("unknown property {}", secondary.value));
            return;
        };
        if !indexed {
            self.fail(&secondary.location, format!("{uri} has a secondary index but is not nrl:indexed"));
            return;
        }
        if primary_multi || other_multi {
            self.fail(
                &secondary.location,
                format!("secondary index {uri}/{} requires single-valued properties", secondary.value),
            );
            return;
        }
        // Both columns must sit in the domain's class table.
        if primary_domain != other_domain {
            self.fail(
                &secondary.location,
                format!("secondary index {uri}/{} requires both properties to share a domain", secondary.value),
            );
            return;
        }
        let r = self.ontology.set_secondary_index(primary, other);
        self.check(&secondary.location, r);
    }

    fn apply_class_flags(&mut self, drafts: &Drafts) {
        for uri in &drafts.class_order {
            let draft = &drafts.classes[uri];
            let Some(class) = self.ontology.class_by_uri(uri).map(|c| c.id()) else {
                continue;
            };

            if let Some(notify) = &draft.notify {
                if let Some(flag) = self.boolean(notify) {
                    let r = self.ontology.set_notify(class, flag);
                    self.check(&notify.location, r);
                }
            }

            for index in &draft.domain_indexes {
                let Some(property) = self.ontology.property_by_uri(&index.value) else {
                    self.fail(&index.location, format!("unknown property {}", index.value));
                    continue;
                };
                let (property, domain) = (property.id(), property.domain());
                if domain == class {
                    self.fail(
                        &index.location,
                        format!("{} already has domain {uri}; a domain index would duplicate it", index.value),
                    );
                    continue;
                }
                if !self.ontology.is_subclass_of(class, domain) {
                    self.fail(
                        &index.location,
                        format!("{uri} does not inherit {}, so it cannot index it", index.value),
                    );
                    continue;
                }
                if self.ontology.property(property).is_multi_valued() {
                    self.fail(&index.location, format!("domain index {} must be single-valued", index.value));
                    continue;
                }
                let r = self.ontology.add_domain_index(class, property);
                self.check(&index.location, r);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ErrorKind};
    use crate::ontology::DataType;
    use std::path::Path;

    const PREAMBLE: &str = r#"@prefix rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#> .
@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
@prefix xsd: <http://www.w3.org/2001/XMLSchema#> .
@prefix nrl: <http://tracker.api.gnome.org/ontology/v3/nrl#> .
@prefix ex: <http://example.org/ex#> .
"#;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("{PREAMBLE}{body}")).unwrap();
        path
    }

    fn load_str(body: &str) -> Result<Ontology> {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write(tmp.path(), "test.ontology", body);
        load_ontology_sources(&[path])
    }

    #[test]
    fn loads_classes_properties_and_flags() {
        let o = load_str(
            r#"
ex: a nrl:Namespace, nrl:Ontology ; nrl:prefix "ex" .
ex:Person a rdfs:Class ; rdfs:subClassOf rdfs:Resource .
ex:Employee a rdfs:Class ; rdfs:subClassOf ex:Person ; nrl:notify true .
ex:name a rdf:Property ; rdfs:domain ex:Person ; rdfs:range xsd:string ;
    nrl:maxCardinality 1 ; nrl:indexed true ; nrl:fulltextIndexed true ; nrl:weight 5 .
ex:email a nrl:InverseFunctionalProperty ; rdfs:domain ex:Person ; rdfs:range xsd:string .
ex:boss a rdf:Property ; rdfs:domain ex:Employee ; rdfs:range ex:Person ; nrl:maxCardinality 1 .
"#,
        )
        .unwrap();

        assert_eq!(o.ontology_uris(), ["http://example.org/ex#"]);
        let name = o.property_by_uri("http://example.org/ex#name").unwrap();
        assert!(!name.is_multi_valued());
        assert!(name.indexed());
        assert!(name.fulltext_indexed());
        assert_eq!(name.weight(), 5);
        assert_eq!(name.data_type(), DataType::String);

        let email = o.property_by_uri("http://example.org/ex#email").unwrap();
        assert!(email.inverse_functional());
        assert!(email.is_multi_valued());

        let employee = o.class_by_uri("http://example.org/ex#Employee").unwrap();
        assert!(employee.notify());
        let person = o.class_by_uri("http://example.org/ex#Person").unwrap();
        assert!(o.is_subclass_of(employee.id(), person.id()));
        assert_eq!(
            o.property_by_uri("http://example.org/ex#boss").unwrap().data_type(),
            DataType::Resource
        );
    }

    #[test]
    fn errors_carry_file_location() {
        let err = load_str(
            r#"
ex:Thing a rdfs:Class .
ex:size a rdf:Property ; rdfs:domain ex:Thing ; rdfs:range xsd:integer ; nrl:maxCardinality 0 .
"#,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Ontology);
        let Error::Ontology(OntologyError::InvalidDefinition { location, message }) = &err else {
            panic!("unexpected error {err}");
        };
        assert!(location.path.as_ref().unwrap().ends_with("test.ontology"));
        assert!(location.line > 0);
        assert!(message.contains("maxCardinality 0"), "{message}");
    }

    #[test]
    fn unknown_domain_fails_the_whole_load() {
        let err = load_str(
            r#"
ex:Thing a rdfs:Class .
ex:a a rdf:Property ; rdfs:domain ex:Missing ; rdfs:range xsd:string .
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("http://example.org/ex#Missing"), "{err}");
    }

    #[test]
    fn secondary_index_requires_indexed_single_valued_properties() {
        let err = load_str(
            r#"
ex:Thing a rdfs:Class .
ex:a a rdf:Property ; rdfs:domain ex:Thing ; rdfs:range xsd:string ; nrl:maxCardinality 1 ;
    nrl:secondaryIndex ex:b .
ex:b a rdf:Property ; rdfs:domain ex:Thing ; rdfs:range xsd:string ; nrl:maxCardinality 1 .
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("not nrl:indexed"), "{err}");

        let err = load_str(
            r#"
ex:A a rdfs:Class .
ex:B a rdfs:Class .
ex:a a rdf:Property ; rdfs:domain ex:A ; rdfs:range xsd:string ; nrl:maxCardinality 1 ;
    nrl:indexed true ; nrl:secondaryIndex ex:b .
ex:b a rdf:Property ; rdfs:domain ex:B ; rdfs:range xsd:string ; nrl:maxCardinality 1 .
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Ontology(OntologyError::InvalidDefinition { .. })), "{err}");
        assert!(err.to_string().contains("share a domain"), "{err}");
    }

    #[test]
    fn domain_index_on_own_domain_is_rejected() {
        let err = load_str(
            r#"
ex:Thing a rdfs:Class ; nrl:domainIndex ex:a .
ex:a a rdf:Property ; rdfs:domain ex:Thing ; rdfs:range xsd:string ; nrl:maxCardinality 1 .
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("domain index"), "{err}");
    }

    #[test]
    fn later_files_extend_and_override_earlier_ones() {
        let tmp = tempfile::TempDir::new().unwrap();
        write(
            tmp.path(),
            "base.ontology",
            r#"
ex:Item a rdfs:Class .
ex:title a rdf:Property ; rdfs:domain ex:Item ; rdfs:range xsd:string ; nrl:weight 1 .
"#,
        );
        write(
            tmp.path(),
            "ext.ontology",
            r#"
ex:tag a rdf:Property ; rdfs:domain ex:Item ; rdfs:range xsd:string .
ex:title nrl:weight 9 .
"#,
        );

        let o = load_ontology_sources(&[tmp.path().to_path_buf()]).unwrap();
        let item = o.class_by_uri("http://example.org/ex#Item").unwrap().id();
        let names: Vec<_> = o
            .resolve_effective_properties(item)
            .iter()
            .map(|p| o.property(*p).uri().to_string())
            .collect();
        assert!(names.contains(&"http://example.org/ex#tag".to_string()));
        assert_eq!(o.property_by_uri("http://example.org/ex#title").unwrap().weight(), 9);
    }

    #[test]
    fn classes_without_superclass_inherit_from_resource() {
        let o = load_str("ex:Lonely a rdfs:Class .\n").unwrap();
        let lonely = o.class_by_uri("http://example.org/ex#Lonely").unwrap();
        assert_eq!(lonely.super_classes(), &[o.resource_class()]);
    }
}
