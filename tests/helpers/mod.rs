#![allow(dead_code)]

use std::path::{Path, PathBuf};

use ontostore::{Store, StoreOptions, Term};
use tempfile::TempDir;

pub const EX: &str = "http://example.org/ex#";

pub const PREAMBLE: &str = r#"@prefix rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#> .
@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
@prefix xsd: <http://www.w3.org/2001/XMLSchema#> .
@prefix nrl: <http://tracker.api.gnome.org/ontology/v3/nrl#> .
@prefix ex: <http://example.org/ex#> .
"#;

/// `Person(name: string, age: integer)` plus a multi-valued, indexed `tag`.
pub const PERSON: &str = r#"
ex: a nrl:Namespace, nrl:Ontology ; nrl:prefix "ex" .
ex:Person a rdfs:Class ; rdfs:subClassOf rdfs:Resource .
ex:name a rdf:Property ; rdfs:domain ex:Person ; rdfs:range xsd:string ;
    nrl:maxCardinality 1 ; nrl:fulltextIndexed true .
ex:age a rdf:Property ; rdfs:domain ex:Person ; rdfs:range xsd:integer ; nrl:maxCardinality 1 .
ex:knows a rdf:Property ; rdfs:domain ex:Person ; rdfs:range ex:Person .
"#;

pub fn ex(local: &str) -> String {
    format!("{EX}{local}")
}

/// Write an ontology file (preamble included) into `dir`.
pub fn write_ontology(dir: &Path, name: &str, body: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, format!("{PREAMBLE}{body}")).unwrap();
    path
}

/// A temp dir holding `ontology/person.ontology`, and options for a store in `store/`.
pub fn person_options() -> (TempDir, StoreOptions) {
    let tmp = TempDir::new().unwrap();
    let ontology = write_ontology(&tmp.path().join("ontology"), "person.ontology", PERSON);
    let options = StoreOptions::new(tmp.path().join("store")).with_ontology(ontology);
    (tmp, options)
}

pub fn open_person_store() -> (TempDir, Store) {
    let (tmp, options) = person_options();
    let store = Store::open(options).unwrap();
    (tmp, store)
}

/// Insert `uri` as a Person with the given name and age in one transaction.
pub fn add_person(store: &Store, uri: &str, name: &str, age: i64) {
    let mut tx = store.begin().unwrap();
    tx.insert(uri, "rdf:type", &Term::iri(ex("Person"))).unwrap();
    tx.insert(uri, "ex:name", &Term::string(name)).unwrap();
    tx.insert(uri, "ex:age", &Term::integer(age)).unwrap();
    tx.commit().unwrap();
}

/// Rows of `text`, sorted so comparisons ignore physical order.
pub fn sorted_rows(store: &Store, text: &str) -> Vec<Vec<Option<String>>> {
    let mut rows = store.query(text, &[]).unwrap();
    rows.sort();
    rows
}
