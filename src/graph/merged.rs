//! MergedGraph: the shared accumulation target
//!
//! A URI-keyed arena with an incrementally maintained reverse-edge index.
//! Mutators are crate-private — only the merge engine writes here, under
//! the orchestrator's single-writer discipline.

use super::element::{GraphElement, Uri};
use super::fragment::GraphFragment;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// The merged all-providers graph. Enforces one element per URI.
#[derive(Debug, Default)]
pub struct MergedGraph {
    elements: BTreeMap<Uri, GraphElement>,
    /// target URI → referrer URIs; used for dangling detection and safe removal
    reverse: HashMap<Uri, BTreeSet<Uri>>,
}

impl MergedGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uri: &Uri) -> Option<&GraphElement> {
        self.elements.get(uri)
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

    /// Referrers of the given URI
    pub fn referrers(&self, uri: &Uri) -> impl Iterator<Item = &Uri> {
        self.reverse.get(uri).into_iter().flatten()
    }

    pub fn referrer_count(&self, uri: &Uri) -> usize {
        self.reverse.get(uri).map_or(0, |r| r.len())
    }

    /// Snapshot the whole graph as a fragment (for export)
    pub fn to_fragment(&self) -> GraphFragment {
        self.elements.values().cloned().collect()
    }

    fn index_edges(&mut self, element: &GraphElement) {
        for target in element.all_targets() {
            self.reverse
                .entry(target.clone())
                .or_default()
                .insert(element.uri.clone());
        }
    }

    fn unindex_edges(&mut self, element: &GraphElement) {
        for target in element.all_targets() {
            if let Some(referrers) = self.reverse.get_mut(target) {
                referrers.remove(&element.uri);
                if referrers.is_empty() {
                    self.reverse.remove(target);
                }
            }
        }
    }

    /// Insert a new element. The caller has already established that no
    /// element exists at this URI.
    pub(crate) fn insert(&mut self, element: GraphElement) {
        debug_assert!(!self.elements.contains_key(&element.uri));
        self.index_edges(&element);
        self.elements.insert(element.uri.clone(), element);
    }

    /// Union an incoming element into the existing one at the same URI.
    pub(crate) fn unify(&mut self, incoming: GraphElement) {
        let uri = incoming.uri.clone();
        let Some(mut existing) = self.elements.remove(&uri) else {
            self.insert(incoming);
            return;
        };
        self.unindex_edges(&existing);
        existing.unify(incoming);
        self.index_edges(&existing);
        self.elements.insert(uri, existing);
    }

    /// Remove an element; its own outgoing edges leave the reverse index.
    /// Edges pointing at it from elsewhere remain (the caller rewrites or
    /// sweeps them).
    pub(crate) fn remove(&mut self, uri: &Uri) -> Option<GraphElement> {
        let element = self.elements.remove(uri)?;
        self.unindex_edges(&element);
        Some(element)
    }

    /// Add a single edge, maintaining the reverse index
    pub(crate) fn add_edge(&mut self, from: &Uri, predicate: &str, to: Uri) {
        if let Some(element) = self.elements.get_mut(from) {
            element.add_edge(predicate, to.clone());
            self.reverse.entry(to).or_default().insert(from.clone());
        }
    }

    /// Drop every edge under a predicate from one element
    pub(crate) fn remove_edges(&mut self, from: &Uri, predicate: &str) {
        let Some(element) = self.elements.get_mut(from) else {
            return;
        };
        let targets = element.remove_edges(predicate);
        let still_referenced: BTreeSet<Uri> = self
            .elements
            .get(from)
            .map(|e| e.all_targets().cloned().collect())
            .unwrap_or_default();
        for target in targets {
            if still_referenced.contains(&target) {
                continue; // another predicate on the same element still points there
            }
            if let Some(referrers) = self.reverse.get_mut(&target) {
                referrers.remove(from);
                if referrers.is_empty() {
                    self.reverse.remove(&target);
                }
            }
        }
    }

    /// Remove a single edge
    pub(crate) fn remove_edge(&mut self, from: &Uri, predicate: &str, to: &Uri) {
        let Some(element) = self.elements.get_mut(from) else {
            return;
        };
        if !element.remove_edge(predicate, to) {
            return;
        }
        let still_referenced = self
            .elements
            .get(from)
            .is_some_and(|e| e.all_targets().any(|t| t == to));
        if !still_referenced {
            if let Some(referrers) = self.reverse.get_mut(to) {
                referrers.remove(from);
                if referrers.is_empty() {
                    self.reverse.remove(to);
                }
            }
        }
    }

    /// Rewrite every edge pointing at `old` to point at `new` instead
    pub(crate) fn rewrite_references(&mut self, old: &Uri, new: &Uri) {
        let referrers: Vec<Uri> = self.referrers(old).cloned().collect();
        for referrer in referrers {
            let predicates: Vec<String> = self
                .elements
                .get(&referrer)
                .map(|e| {
                    e.edges
                        .iter()
                        .filter(|(_, targets)| targets.contains(old))
                        .map(|(p, _)| p.clone())
                        .collect()
                })
                .unwrap_or_default();
            for p in predicates {
                self.remove_edge(&referrer, &p, old);
                self.add_edge(&referrer, &p, new.clone());
            }
        }
    }

    /// Remove utility elements with no referrers until a fixed point.
    /// Bounds graph growth from orphaned support objects.
    pub(crate) fn sweep_dangling(&mut self) -> usize {
        let mut removed = 0;
        loop {
            let dangling: Vec<Uri> = self
                .elements
                .values()
                .filter(|e| e.element_type.is_utility())
                .filter(|e| self.referrer_count(&e.uri) == 0)
                .map(|e| e.uri.clone())
                .collect();
            if dangling.is_empty() {
                return removed;
            }
            for uri in dangling {
                self.remove(&uri);
                removed += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::element::ElementType;

    #[test]
    fn unify_keeps_one_element_per_uri() {
        let mut graph = MergedGraph::new();
        graph.insert(GraphElement::new("u", ElementType::Protein).with_attribute("name", "a"));
        graph.unify(GraphElement::new("u", ElementType::Protein).with_attribute("alias", "b"));
        assert_eq!(graph.len(), 1);
        let e = graph.get(&Uri::from("u")).unwrap();
        assert!(e.attributes.contains_key("name"));
        assert!(e.attributes.contains_key("alias"));
    }

    #[test]
    fn reverse_index_follows_edge_changes() {
        let mut graph = MergedGraph::new();
        graph.insert(GraphElement::new("x", ElementType::RelaxedXref));
        graph.insert(GraphElement::new("p", ElementType::Protein).with_edge("xref", "x"));
        assert_eq!(graph.referrer_count(&Uri::from("x")), 1);

        graph.remove_edges(&Uri::from("p"), "xref");
        assert_eq!(graph.referrer_count(&Uri::from("x")), 0);
    }

    #[test]
    fn rewrite_references_moves_all_predicates() {
        let mut graph = MergedGraph::new();
        graph.insert(GraphElement::new("old", ElementType::Pathway));
        graph.insert(GraphElement::new("new", ElementType::Pathway));
        graph.insert(
            GraphElement::new("i", ElementType::Interaction)
                .with_edge("pathwayComponent", "old")
                .with_edge("controller", "old"),
        );

        graph.rewrite_references(&Uri::from("old"), &Uri::from("new"));
        let i = graph.get(&Uri::from("i")).unwrap();
        assert!(i.targets("pathwayComponent").any(|t| t.as_str() == "new"));
        assert!(i.targets("controller").any(|t| t.as_str() == "new"));
        assert_eq!(graph.referrer_count(&Uri::from("old")), 0);
        assert_eq!(graph.referrer_count(&Uri::from("new")), 1);
    }

    #[test]
    fn sweep_removes_orphan_chains_only() {
        let mut graph = MergedGraph::new();
        graph.insert(GraphElement::new("term", ElementType::VocabularyTerm));
        graph.insert(
            GraphElement::new("rx", ElementType::RelaxedXref).with_edge("vocabulary", "term"),
        );
        graph.insert(GraphElement::new("keep", ElementType::RelaxedXref));
        graph.insert(GraphElement::new("p", ElementType::Protein).with_edge("xref", "keep"));

        assert_eq!(graph.sweep_dangling(), 2);
        assert!(graph.contains(&Uri::from("keep")));
        assert!(graph.contains(&Uri::from("p")));
        assert!(!graph.contains(&Uri::from("rx")));
        assert!(!graph.contains(&Uri::from("term")));
    }
}
