//! GraphFragment: one provider's graph, prior to merge
//!
//! An arena keyed by URI with edges stored as URI values. The reverse-edge
//! index is derived on demand; fragments are provider-private, so no
//! locking is involved.

use super::element::{ElementType, GraphElement, Uri};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// The graph produced by converting one provider's cleaned data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphFragment {
    elements: BTreeMap<Uri, GraphElement>,
}

impl GraphFragment {
    /// Create an empty fragment
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an element, replacing any previous one at the same URI
    pub fn insert(&mut self, element: GraphElement) -> Uri {
        let uri = element.uri.clone();
        self.elements.insert(uri.clone(), element);
        uri
    }

    /// Get an element by URI
    pub fn get(&self, uri: &Uri) -> Option<&GraphElement> {
        self.elements.get(uri)
    }

    /// Get a mutable reference to an element
    pub fn get_mut(&mut self, uri: &Uri) -> Option<&mut GraphElement> {
        self.elements.get_mut(uri)
    }

    /// Remove an element by URI. Referring edges are left in place;
    /// callers that need them gone use `detach` or the dangling sweep.
    pub fn remove(&mut self, uri: &Uri) -> Option<GraphElement> {
        self.elements.remove(uri)
    }

    /// Remove an element and strip every edge pointing at it
    pub fn detach(&mut self, uri: &Uri) -> Option<GraphElement> {
        let removed = self.elements.remove(uri)?;
        for element in self.elements.values_mut() {
            let predicates: Vec<String> = element
                .edges
                .iter()
                .filter(|(_, targets)| targets.contains(uri))
                .map(|(p, _)| p.clone())
                .collect();
            for p in predicates {
                element.remove_edge(&p, uri);
            }
        }
        Some(removed)
    }

    pub fn contains(&self, uri: &Uri) -> bool {
        self.elements.contains_key(uri)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Iterate over all elements, ordered by URI
    pub fn iter(&self) -> impl Iterator<Item = &GraphElement> {
        self.elements.values()
    }

    /// Iterate mutably over all elements
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut GraphElement> {
        self.elements.values_mut()
    }

    /// URIs of elements matching a predicate, collected up front so the
    /// caller can mutate while iterating
    pub fn uris_where(&self, f: impl Fn(&GraphElement) -> bool) -> Vec<Uri> {
        self.elements
            .values()
            .filter(|e| f(e))
            .map(|e| e.uri.clone())
            .collect()
    }

    /// Derived reverse-edge index: target URI → set of referrer URIs
    pub fn reverse_index(&self) -> HashMap<Uri, BTreeSet<Uri>> {
        let mut index: HashMap<Uri, BTreeSet<Uri>> = HashMap::new();
        for element in self.elements.values() {
            for target in element.all_targets() {
                index
                    .entry(target.clone())
                    .or_default()
                    .insert(element.uri.clone());
            }
        }
        index
    }

    /// Move an element to a new URI, rewriting every edge that pointed at
    /// the old one.
    ///
    /// If an element already exists at the new URI, the old element is
    /// unified into it instead of replacing it.
    pub fn rewrite_uri(&mut self, old: &Uri, new: Uri) {
        if *old == new {
            return;
        }
        if let Some(mut element) = self.elements.remove(old) {
            element.uri = new.clone();
            match self.elements.get_mut(&new) {
                Some(existing) => existing.unify(element),
                None => {
                    self.elements.insert(new.clone(), element);
                }
            }
        }
        for element in self.elements.values_mut() {
            let predicates: Vec<String> = element
                .edges
                .iter()
                .filter(|(_, targets)| targets.contains(old))
                .map(|(p, _)| p.clone())
                .collect();
            for p in predicates {
                element.remove_edge(&p, old);
                element.add_edge(p, new.clone());
            }
        }
    }

    /// Remove utility elements with no referrers, repeating until a fixed
    /// point. Returns the number of elements removed.
    pub fn remove_dangling_utilities(&mut self) -> usize {
        let mut removed = 0;
        loop {
            let index = self.reverse_index();
            let dangling: Vec<Uri> = self
                .elements
                .values()
                .filter(|e| e.element_type.is_utility())
                .filter(|e| index.get(&e.uri).map_or(true, |r| r.is_empty()))
                .map(|e| e.uri.clone())
                .collect();
            if dangling.is_empty() {
                return removed;
            }
            for uri in dangling {
                self.elements.remove(&uri);
                removed += 1;
            }
        }
    }

    /// Elements of a given type
    pub fn of_type(&self, element_type: ElementType) -> impl Iterator<Item = &GraphElement> {
        self.elements
            .values()
            .filter(move |e| e.element_type == element_type)
    }

    /// Parse a fragment from the JSON exchange format
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Serialize to the JSON exchange format
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl FromIterator<GraphElement> for GraphFragment {
    fn from_iter<T: IntoIterator<Item = GraphElement>>(iter: T) -> Self {
        let mut fragment = Self::new();
        for element in iter {
            fragment.insert(element);
        }
        fragment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::element::{CrossReference, Strength};

    fn protein_with_xref(base: &str, protein: &str, db: &str, id: &str) -> GraphFragment {
        let xref = CrossReference::new(db, id, Strength::Exact);
        let xref_el = xref.to_element(base);
        let p = GraphElement::new(protein, ElementType::Protein)
            .with_edge("xref", xref_el.uri.clone());
        [p, xref_el].into_iter().collect()
    }

    #[test]
    fn reverse_index_tracks_referrers() {
        let fragment = protein_with_xref("http://x/", "http://x/p1", "uniprot", "P04150");
        let index = fragment.reverse_index();
        let xref_uri = CrossReference::new("uniprot", "P04150", Strength::Exact).uri("http://x/");
        assert_eq!(
            index.get(&xref_uri).map(|r| r.len()),
            Some(1),
            "xref should have one referrer"
        );
    }

    #[test]
    fn rewrite_uri_moves_element_and_edges() {
        let mut fragment = protein_with_xref("http://x/", "http://x/p1", "uniprot", "P04150-2");
        let old = CrossReference::new("uniprot", "P04150-2", Strength::Exact).uri("http://x/");
        let new = CrossReference::new("uniprot", "P04150", Strength::Exact).uri("http://x/");
        fragment.rewrite_uri(&old, new.clone());

        assert!(!fragment.contains(&old));
        let p = fragment.get(&Uri::from("http://x/p1")).unwrap();
        assert!(p.targets("xref").any(|t| *t == new));
        assert!(!p.targets("xref").any(|t| *t == old));
    }

    #[test]
    fn rewrite_uri_unifies_into_existing_target() {
        let mut fragment = protein_with_xref("http://x/", "http://x/p1", "uniprot", "P04150");
        // a second, duplicate xref under a different URI
        let dup = GraphElement::new("http://x/dup", ElementType::ExactXref)
            .with_attribute("db", "uniprot")
            .with_attribute("id", "P04150")
            .with_attribute("source", "curated");
        let dup_uri = fragment.insert(dup);
        let canonical = CrossReference::new("uniprot", "P04150", Strength::Exact).uri("http://x/");

        fragment.rewrite_uri(&dup_uri, canonical.clone());
        assert_eq!(fragment.len(), 2);
        let merged = fragment.get(&canonical).unwrap();
        assert!(merged.attributes.contains_key("source"));
    }

    #[test]
    fn dangling_sweep_reaches_fixed_point() {
        let mut fragment = GraphFragment::new();
        // vocabulary term referenced only by an xref, which itself is orphaned
        let term = GraphElement::new("http://x/term", ElementType::VocabularyTerm);
        let xref = GraphElement::new("http://x/rx", ElementType::RelaxedXref)
            .with_attribute("db", "go")
            .with_attribute("id", "GO:0005737")
            .with_edge("vocabulary", "http://x/term");
        fragment.insert(term);
        fragment.insert(xref);

        let removed = fragment.remove_dangling_utilities();
        assert_eq!(removed, 2, "cascade removes the xref, then the term");
        assert!(fragment.is_empty());
    }

    #[test]
    fn dangling_sweep_keeps_referenced_utilities() {
        let fragment = protein_with_xref("http://x/", "http://x/p1", "uniprot", "P04150");
        let mut fragment = fragment;
        assert_eq!(fragment.remove_dangling_utilities(), 0);
        assert_eq!(fragment.len(), 2);
    }

    #[test]
    fn exchange_format_round_trip() {
        let fragment = protein_with_xref("http://x/", "http://x/p1", "uniprot", "P04150");
        let json = fragment.to_json().unwrap();
        let parsed = GraphFragment::from_json(json.as_bytes()).unwrap();
        assert_eq!(fragment, parsed);
    }
}
