//! Prefix ↔ IRI base mapping.

use std::collections::BTreeMap;

use super::vocab;

/// Maps short prefixes (`nfo`) to IRI bases (`http://.../nfo#`).
#[derive(Debug, Clone, Default)]
pub struct NamespaceManager {
    by_prefix: BTreeMap<String, String>,
}

impl NamespaceManager {
    /// A manager pre-populated with the built-in vocabularies.
    pub fn with_defaults() -> Self {
        let mut ns = Self::default();
        ns.add("rdf", vocab::RDF);
        ns.add("rdfs", vocab::RDFS);
        ns.add("xsd", vocab::XSD);
        ns.add("nrl", vocab::NRL);
        ns.add("fts", vocab::FTS);
        ns
    }

    /// Register (or replace) a prefix.
    pub fn add(&mut self, prefix: impl Into<String>, base: impl Into<String>) {
        self.by_prefix.insert(prefix.into(), base.into());
    }

    pub fn base_for(&self, prefix: &str) -> Option<&str> {
        self.by_prefix.get(prefix).map(String::as_str)
    }

    pub fn prefix_for(&self, base: &str) -> Option<&str> {
        self.by_prefix
            .iter()
            .find(|(_, b)| b.as_str() == base)
            .map(|(p, _)| p.as_str())
    }

    /// Compress `iri` into `prefix:local` using the longest matching base.
    pub fn compress(&self, iri: &str) -> Option<String> {
        self.by_prefix
            .iter()
            .filter(|(_, base)| iri.len() > base.len() && iri.starts_with(base.as_str()))
            .max_by_key(|(_, base)| base.len())
            .map(|(prefix, base)| format!("{prefix}:{}", &iri[base.len()..]))
    }

    /// Expand `prefix:local` into a full IRI. Returns `None` for unknown prefixes.
    pub fn expand(&self, name: &str) -> Option<String> {
        let (prefix, local) = name.split_once(':')?;
        self.base_for(prefix).map(|base| format!("{base}{local}"))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_prefix.iter().map(|(p, b)| (p.as_str(), b.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_picks_longest_base() {
        let mut ns = NamespaceManager::default();
        ns.add("ex", "http://example.org/");
        ns.add("exv", "http://example.org/vocab#");
        assert_eq!(
            ns.compress("http://example.org/vocab#Person").as_deref(),
            Some("exv:Person")
        );
        assert_eq!(ns.compress("http://example.org/a").as_deref(), Some("ex:a"));
        assert_eq!(ns.compress("urn:x"), None);
    }

    #[test]
    fn expand_unknown_prefix_is_none() {
        let ns = NamespaceManager::with_defaults();
        assert_eq!(ns.expand("rdf:type").as_deref(), Some(vocab::RDF_TYPE));
        assert_eq!(ns.expand("zzz:type"), None);
    }
}
