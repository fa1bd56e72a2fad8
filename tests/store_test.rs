mod helpers;

use std::time::Duration;

use helpers::*;
use ontostore::error::ConstraintKind;
use ontostore::{Error, ErrorKind, Store, StoreOptions, Term};
use tempfile::TempDir;

#[test]
fn inserted_name_is_found_by_query() {
    let (_tmp, store) = open_person_store();
    add_person(&store, "urn:1", "Alice", 30);
    add_person(&store, "urn:2", "Bob", 25);

    let rows = store.query("SELECT ?x WHERE { ?x ex:name \"Alice\" }", &[]).unwrap();
    assert_eq!(rows, vec![vec![Some("urn:1".to_string())]]);
}

#[test]
fn bindings_fill_placeholders() {
    let (_tmp, store) = open_person_store();
    add_person(&store, "urn:1", "Alice", 30);

    let rows = store
        .query("SELECT ?a WHERE { ?x ex:name ~name . ?x ex:age ?a }", &[("name", Term::string("Alice"))])
        .unwrap();
    assert_eq!(rows, vec![vec![Some("30".to_string())]]);
}

#[test]
fn fulltext_match_finds_words() {
    let (_tmp, store) = open_person_store();
    add_person(&store, "urn:1", "Ada Lovelace", 36);
    add_person(&store, "urn:2", "Grace Hopper", 85);

    let rows = store.query("SELECT ?x WHERE { ?x fts:match \"hopper\" }", &[]).unwrap();
    assert_eq!(rows, vec![vec![Some("urn:2".to_string())]]);
}

#[test]
fn range_violation_leaves_store_unchanged() {
    let (_tmp, store) = open_person_store();
    add_person(&store, "urn:1", "Alice", 30);
    let before = sorted_rows(&store, "SELECT ?x ?n WHERE { ?x ex:name ?n }");
    let journal_before = store.journal(100).unwrap().len();

    let mut tx = store.begin().unwrap();
    tx.insert("urn:2", "rdf:type", &Term::iri(ex("Person"))).unwrap();
    tx.insert("urn:2", "ex:name", &Term::string("Mallory")).unwrap();
    tx.insert("urn:2", "ex:age", &Term::string("old")).unwrap();
    let err = tx.commit().unwrap_err();

    let Error::ConstraintViolation(violation) = &err else {
        panic!("unexpected error {err}");
    };
    assert_eq!(violation.kind, ConstraintKind::Range);
    assert_eq!(violation.subject, "urn:2");
    assert_eq!(sorted_rows(&store, "SELECT ?x ?n WHERE { ?x ex:name ?n }"), before);
    assert_eq!(store.journal(100).unwrap().len(), journal_before);
}

#[test]
fn knows_requires_a_person_object() {
    let (_tmp, store) = open_person_store();
    add_person(&store, "urn:1", "Alice", 30);

    let mut tx = store.begin().unwrap();
    tx.insert("urn:1", "ex:knows", &Term::iri("urn:stranger")).unwrap();
    assert_eq!(tx.commit().unwrap_err().kind(), ErrorKind::ConstraintViolation);

    add_person(&store, "urn:2", "Bob", 25);
    let mut tx = store.begin().unwrap();
    tx.insert("urn:1", "ex:knows", &Term::iri("urn:2")).unwrap();
    tx.commit().unwrap();
    assert_eq!(
        store.query("SELECT ?y WHERE { <urn:1> ex:knows ?y }", &[]).unwrap(),
        vec![vec![Some("urn:2".to_string())]]
    );
}

#[test]
fn data_survives_reopen() {
    let (_tmp, options) = person_options();
    {
        let store = Store::open(options.clone()).unwrap();
        add_person(&store, "urn:1", "Alice", 30);
    }
    let store = Store::open(options).unwrap();
    assert_eq!(store.query("SELECT ?x WHERE { ?x ex:age 30 }", &[]).unwrap().len(), 1);
    assert_eq!(store.generation().unwrap(), 1);
}

#[test]
fn data_sources_seed_a_new_store_once() {
    let (tmp, options) = person_options();
    let data = tmp.path().join("seed.ttl");
    std::fs::write(
        &data,
        format!("{PREAMBLE}<urn:1> a ex:Person ; ex:name \"Seed\" .\n[] a ex:Person ; ex:name \"Anon\" .\n"),
    )
    .unwrap();

    let options = options.with_data(&data);
    {
        let store = Store::open(options.clone()).unwrap();
        assert_eq!(sorted_rows(&store, "SELECT ?n WHERE { ?x ex:name ?n }").len(), 2);
        let anon = store.query("SELECT ?x WHERE { ?x ex:name \"Anon\" }", &[]).unwrap();
        assert!(anon[0][0].as_deref().unwrap().starts_with("urn:bnode:"));
    }
    let store = Store::open(options).unwrap();
    assert_eq!(sorted_rows(&store, "SELECT ?n WHERE { ?x ex:name ?n }").len(), 2);
}

#[test]
fn second_writer_times_out_as_busy() {
    let (_tmp, options) = person_options();
    let store = Store::open(options.with_busy_timeout(Duration::from_millis(100))).unwrap();
    let tx = store.begin().unwrap();

    std::thread::scope(|s| {
        let err = s.spawn(|| store.begin().map(|_| ()).unwrap_err()).join().unwrap();
        assert_eq!(err.kind(), ErrorKind::Busy);
    });

    tx.rollback().unwrap();
    store.begin().unwrap().commit().unwrap();
}

#[test]
fn readers_see_only_committed_state() {
    let (_tmp, store) = open_person_store();
    let mut tx = store.begin().unwrap();
    tx.insert("urn:1", "rdf:type", &Term::iri(ex("Person"))).unwrap();
    tx.insert("urn:1", "ex:name", &Term::string("Pending")).unwrap();

    assert!(store.query("SELECT ?x WHERE { ?x ex:name ?n }", &[]).unwrap().is_empty());
    tx.commit().unwrap();
    assert_eq!(store.query("SELECT ?x WHERE { ?x ex:name ?n }", &[]).unwrap().len(), 1);
}

#[test]
fn readonly_store_serves_queries_and_refuses_writes() {
    let (_tmp, options) = person_options();
    {
        let store = Store::open(options.clone()).unwrap();
        add_person(&store, "urn:1", "Alice", 30);
    }

    let store = Store::open(options.readonly()).unwrap();
    assert_eq!(store.query("SELECT ?x WHERE { ?x ex:name \"Alice\" }", &[]).unwrap().len(), 1);
    assert_eq!(store.begin().map(|_| ()).unwrap_err().kind(), ErrorKind::Io);
}

#[test]
fn readonly_open_of_a_missing_store_fails() {
    let (_tmp, options) = person_options();
    let err = Store::open(options.readonly()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn directory_layers_extension_over_base() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("ontology");
    write_ontology(
        &dir,
        "base.ontology",
        r#"
ex: a nrl:Namespace ; nrl:prefix "ex" .
ex:Item a rdfs:Class ; rdfs:subClassOf rdfs:Resource .
ex:title a rdf:Property ; rdfs:domain ex:Item ; rdfs:range xsd:string ; nrl:maxCardinality 1 .
"#,
    );
    write_ontology(
        &dir,
        "ext.ontology",
        "ex:tag a rdf:Property ; rdfs:domain ex:Item ; rdfs:range xsd:string .\n",
    );

    let store = Store::open(StoreOptions::new(tmp.path().join("store")).with_ontology(&dir)).unwrap();
    let ontology = store.ontology();
    let item = ontology.class_by_uri(&ex("Item")).unwrap();
    let effective: Vec<&str> = ontology
        .resolve_effective_properties(item.id())
        .iter()
        .map(|&p| ontology.property(p).uri())
        .collect();
    assert!(effective.contains(&ex("title").as_str()));
    assert!(effective.contains(&ex("tag").as_str()));

    let mut tx = store.begin().unwrap();
    tx.insert("urn:i", "rdf:type", &Term::iri(ex("Item"))).unwrap();
    tx.insert("urn:i", "ex:tag", &Term::string("red")).unwrap();
    tx.insert("urn:i", "ex:tag", &Term::string("blue")).unwrap();
    tx.commit().unwrap();
    assert_eq!(sorted_rows(&store, "SELECT ?t WHERE { <urn:i> ex:tag ?t }").len(), 2);
}

#[test]
fn broken_ontology_fails_before_touching_disk() {
    let tmp = TempDir::new().unwrap();
    let ontology = write_ontology(
        tmp.path(),
        "bad.ontology",
        "ex:a a rdf:Property ; rdfs:domain ex:Missing ; rdfs:range xsd:string .\n",
    );
    let store_dir = tmp.path().join("store");
    let err = Store::open(StoreOptions::new(&store_dir).with_ontology(ontology)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Ontology);
    assert!(!store_dir.exists());
}

#[test]
fn health_report_counts_rows() {
    let (_tmp, store) = open_person_store();
    add_person(&store, "urn:1", "Alice", 30);
    add_person(&store, "urn:2", "Bob", 25);

    let report = store.check_health().unwrap();
    assert!(report.is_healthy());
    assert_eq!(report.typed_resources, 2);
    assert_eq!(report.transactions, 2);
    assert_eq!(report.schema_version, ontostore::db::migrations::CURRENT_SCHEMA_VERSION);
    assert!(report.classes >= 2);
}

#[test]
fn superclass_pattern_lists_subclass_instances_once() {
    let (tmp, options) = person_options();
    write_ontology(
        &tmp.path().join("ontology"),
        "person.ontology",
        &format!("{PERSON}ex:Employee a rdfs:Class ; rdfs:subClassOf ex:Person .\n"),
    );
    let store = Store::open(options).unwrap();
    add_person(&store, "urn:p", "Pat", 40);
    let mut tx = store.begin().unwrap();
    tx.insert("urn:e", "rdf:type", &Term::iri(ex("Employee"))).unwrap();
    tx.commit().unwrap();

    assert_eq!(
        sorted_rows(&store, "SELECT ?x WHERE { ?x a ex:Person }"),
        vec![vec![Some("urn:e".to_string())], vec![Some("urn:p".to_string())]]
    );
    assert_eq!(
        store.query("SELECT ?x WHERE { ?x a ex:Employee }", &[]).unwrap(),
        vec![vec![Some("urn:e".to_string())]]
    );
}
