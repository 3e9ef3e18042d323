//! Merge engine: folds resolved provider fragments into the merged graph
//!
//! Merging is build-then-apply: conflicts are detected against the current
//! graph before any mutation, so a conflicting element never leaves the
//! graph half-written. The orchestrator serializes access; nothing here
//! locks.

use crate::graph::{
    AttributeValue, ElementType, GraphElement, GraphFragment, MergedGraph, Uri, ALTERNATE_URIS,
    DATA_SOURCE,
};
use std::collections::BTreeSet;

/// A URI already bound to a different element type.
///
/// Conflicts are data, not errors: the conflicting element is skipped and
/// the rest of the fragment merges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    pub uri: Uri,
    pub existing: ElementType,
    pub incoming: ElementType,
}

/// What one merge call did
#[derive(Debug, Default, Clone)]
pub struct MergeResult {
    /// Elements inserted or unified
    pub applied: usize,
    /// Elements skipped over a type conflict
    pub conflicts: Vec<MergeConflict>,
    /// Duplicate elements absorbed through alternate-URI reconciliation
    pub reconciled: usize,
    /// Orphaned utility elements swept afterwards
    pub swept: usize,
}

/// The single writer of the merged graph.
#[derive(Debug)]
pub struct MergeEngine {
    graph: MergedGraph,
    xml_base: String,
}

impl MergeEngine {
    pub fn new(xml_base: impl Into<String>) -> Self {
        Self {
            graph: MergedGraph::new(),
            xml_base: xml_base.into(),
        }
    }

    /// Read access to the accumulated graph
    pub fn graph(&self) -> &MergedGraph {
        &self.graph
    }

    /// URI of the provenance element for a source
    pub fn provenance_uri(&self, source: &str) -> Uri {
        Uri::new(format!("{}provenance/{}", self.xml_base, source))
    }

    /// Merge one resolved fragment, attributing its top-level elements to
    /// `from_source`.
    pub fn merge(&mut self, fragment: GraphFragment, from_source: &str) -> MergeResult {
        let mut result = MergeResult::default();

        // stage: find type conflicts before mutating anything
        for incoming in fragment.iter() {
            let Some(existing) = self.graph.get(&incoming.uri) else {
                continue;
            };
            if existing.element_type != incoming.element_type {
                tracing::warn!(
                    uri = %incoming.uri,
                    existing = %existing.element_type,
                    incoming = %incoming.element_type,
                    "type conflict, element skipped"
                );
                result.conflicts.push(MergeConflict {
                    uri: incoming.uri.clone(),
                    existing: existing.element_type,
                    incoming: incoming.element_type,
                });
            }
        }
        let skipped: BTreeSet<Uri> = result.conflicts.iter().map(|c| c.uri.clone()).collect();

        // admitted URIs; edges into skipped elements still resolve because
        // the skipped URI stays bound in the graph
        let admitted: Vec<Uri> = fragment
            .iter()
            .filter(|e| !skipped.contains(&e.uri))
            .map(|e| e.uri.clone())
            .collect();
        let known: BTreeSet<Uri> = admitted
            .iter()
            .cloned()
            .chain(self.graph.iter().map(|e| e.uri.clone()))
            .collect();

        let mut top_level: Vec<Uri> = Vec::new();
        let mut alternates: Vec<(Uri, BTreeSet<Uri>)> = Vec::new();
        for uri in &admitted {
            let Some(element) = fragment.get(uri) else {
                continue;
            };
            let mut element = element.clone();
            // an edge whose target exists in neither the graph nor this
            // fragment would dangle; drop it now
            let unresolved: Vec<(String, Uri)> = element
                .edges
                .iter()
                .flat_map(|(p, targets)| {
                    targets
                        .iter()
                        .filter(|t| !known.contains(t))
                        .map(|t| (p.clone(), t.clone()))
                        .collect::<Vec<_>>()
                })
                .collect();
            for (predicate, target) in unresolved {
                tracing::warn!(uri = %uri, %predicate, %target, "dropping unresolved edge");
                element.remove_edge(&predicate, &target);
            }
            // the alternate-URI hint is consumed here, never stored
            if let Some(listed) = alternate_uris(&element) {
                alternates.push((uri.clone(), listed));
            }
            element.attributes.remove(ALTERNATE_URIS);
            if element.element_type.is_top_level() {
                top_level.push(uri.clone());
            }
            if self.graph.contains(uri) {
                self.graph.unify(element);
            } else {
                self.graph.insert(element);
            }
            result.applied += 1;
        }

        // provenance: exactly one dataSource edge per contributed element,
        // latest merge wins
        if !top_level.is_empty() {
            let marker = self.provenance_uri(from_source);
            if !self.graph.contains(&marker) {
                self.graph.insert(
                    GraphElement::new(marker.clone(), ElementType::Provenance)
                        .with_attribute("displayName", from_source),
                );
            }
            for uri in top_level {
                self.graph.remove_edges(&uri, DATA_SOURCE);
                self.graph.add_edge(&uri, DATA_SOURCE, marker.clone());
            }
        }

        // alternate-URI reconciliation: the canonical element absorbs any
        // already-present duplicate it names
        for (canonical, listed) in alternates {
            for alternate in listed {
                if alternate == canonical || !self.graph.contains(&alternate) {
                    continue;
                }
                tracing::debug!(%canonical, %alternate, "absorbing alternate identity");
                self.graph.rewrite_references(&alternate, &canonical);
                if let Some(mut absorbed) = self.graph.remove(&alternate) {
                    absorbed.uri = canonical.clone();
                    self.graph.unify(absorbed);
                    result.reconciled += 1;
                }
            }
        }

        result.swept = self.graph.sweep_dangling();
        result
    }
}

/// Alternate URIs listed on an element, if any
fn alternate_uris(element: &GraphElement) -> Option<BTreeSet<Uri>> {
    let listed = match element.attributes.get(ALTERNATE_URIS)? {
        AttributeValue::String(s) => BTreeSet::from([Uri::new(s.as_str())]),
        AttributeValue::Array(values) => values
            .iter()
            .filter_map(|v| v.as_str())
            .map(Uri::new)
            .collect(),
        _ => return None,
    };
    (!listed.is_empty()).then_some(listed)
}
