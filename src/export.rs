//! Merged-graph snapshots in the JSON exchange format
//!
//! The full export is simply the whole graph. The per-provider export
//! takes every element attributed to one source plus its reachable
//! closure, so the sub-graph stands alone with no open edges.

use crate::graph::{GraphFragment, MergedGraph, Uri, DATA_SOURCE};
use std::collections::{BTreeSet, VecDeque};

/// Serialize the whole merged graph
pub fn export_full(graph: &MergedGraph) -> Result<String, serde_json::Error> {
    graph.to_fragment().to_json()
}

/// The sub-graph contributed by one source: elements whose provenance
/// edge points at `marker`, closed over everything they reach.
pub fn export_provider(graph: &MergedGraph, marker: &Uri) -> GraphFragment {
    let mut included: BTreeSet<Uri> = BTreeSet::new();
    let mut queue: VecDeque<Uri> = graph
        .iter()
        .filter(|e| e.targets(DATA_SOURCE).any(|t| t == marker))
        .map(|e| e.uri.clone())
        .collect();
    while let Some(uri) = queue.pop_front() {
        if !included.insert(uri.clone()) {
            continue;
        }
        if let Some(element) = graph.get(&uri) {
            for target in element.all_targets() {
                if !included.contains(target) {
                    queue.push_back(target.clone());
                }
            }
        }
    }
    included
        .into_iter()
        .filter_map(|uri| graph.get(&uri).cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ElementType, GraphElement, XREF};
    use crate::merge::MergeEngine;

    fn two_source_engine() -> MergeEngine {
        let mut engine = MergeEngine::new("http://test/");
        engine.merge(
            [
                GraphElement::new("http://test/p1", ElementType::Protein)
                    .with_edge(XREF, "http://test/x1"),
                GraphElement::new("http://test/x1", ElementType::ExactXref)
                    .with_attribute("db", "uniprot")
                    .with_attribute("id", "P04150"),
            ]
            .into_iter()
            .collect(),
            "alpha",
        );
        engine.merge(
            [GraphElement::new("http://test/m1", ElementType::SmallMolecule)]
                .into_iter()
                .collect(),
            "beta",
        );
        engine
    }

    #[test]
    fn full_export_round_trips() {
        let engine = two_source_engine();
        let json = export_full(engine.graph()).unwrap();
        let parsed = GraphFragment::from_json(json.as_bytes()).unwrap();
        assert_eq!(parsed.len(), engine.graph().len());
    }

    #[test]
    fn provider_export_is_a_closed_subgraph() {
        let engine = two_source_engine();
        let subgraph = export_provider(engine.graph(), &engine.provenance_uri("alpha"));

        assert!(subgraph.contains(&Uri::from("http://test/p1")));
        assert!(subgraph.contains(&Uri::from("http://test/x1")));
        assert!(!subgraph.contains(&Uri::from("http://test/m1")));
        // no open edges
        for element in subgraph.iter() {
            for target in element.all_targets() {
                assert!(subgraph.contains(target), "open edge to {}", target);
            }
        }
    }
}
