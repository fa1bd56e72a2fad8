//! IRIs of the vocabularies the ontology loader understands.

pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDFS: &str = "http://www.w3.org/2000/01/rdf-schema#";
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";
pub const NRL: &str = "http://tracker.api.gnome.org/ontology/v3/nrl#";
pub const FTS: &str = "http://tracker.api.gnome.org/ontology/v3/fts#";

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const RDF_PROPERTY: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#Property";

pub const RDFS_RESOURCE: &str = "http://www.w3.org/2000/01/rdf-schema#Resource";
pub const RDFS_CLASS: &str = "http://www.w3.org/2000/01/rdf-schema#Class";
pub const RDFS_DOMAIN: &str = "http://www.w3.org/2000/01/rdf-schema#domain";
pub const RDFS_RANGE: &str = "http://www.w3.org/2000/01/rdf-schema#range";
pub const RDFS_SUB_CLASS_OF: &str = "http://www.w3.org/2000/01/rdf-schema#subClassOf";
pub const RDFS_SUB_PROPERTY_OF: &str = "http://www.w3.org/2000/01/rdf-schema#subPropertyOf";

pub const NRL_ONTOLOGY: &str = "http://tracker.api.gnome.org/ontology/v3/nrl#Ontology";
pub const NRL_NAMESPACE: &str = "http://tracker.api.gnome.org/ontology/v3/nrl#Namespace";
pub const NRL_INVERSE_FUNCTIONAL_PROPERTY: &str =
    "http://tracker.api.gnome.org/ontology/v3/nrl#InverseFunctionalProperty";
pub const NRL_PREFIX: &str = "http://tracker.api.gnome.org/ontology/v3/nrl#prefix";
pub const NRL_MAX_CARDINALITY: &str = "http://tracker.api.gnome.org/ontology/v3/nrl#maxCardinality";
pub const NRL_NOTIFY: &str = "http://tracker.api.gnome.org/ontology/v3/nrl#notify";
pub const NRL_INDEXED: &str = "http://tracker.api.gnome.org/ontology/v3/nrl#indexed";
pub const NRL_DOMAIN_INDEX: &str = "http://tracker.api.gnome.org/ontology/v3/nrl#domainIndex";
pub const NRL_SECONDARY_INDEX: &str = "http://tracker.api.gnome.org/ontology/v3/nrl#secondaryIndex";
pub const NRL_FULLTEXT_INDEXED: &str =
    "http://tracker.api.gnome.org/ontology/v3/nrl#fulltextIndexed";
pub const NRL_WEIGHT: &str = "http://tracker.api.gnome.org/ontology/v3/nrl#weight";

pub const FTS_MATCH: &str = "http://tracker.api.gnome.org/ontology/v3/fts#match";
