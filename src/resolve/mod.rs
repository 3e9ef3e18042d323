//! Identity resolution over one provider's converted fragment
//!
//! Cross-references are what later makes independently-curated records
//! merge: two proteins carrying the same exact UniProt reference are the
//! same protein. Before a fragment may merge, its references are
//! canonicalized, deduplicated, demoted where shared, and disambiguated
//! where contradictory. The fragment's entities themselves are never
//! dropped over identity problems.

use crate::graph::{
    CrossReference, ElementType, GraphFragment, Strength, Uri, VARIANT_OF, XREF,
};
use crate::warehouse::{normalize, MappingWarehouse};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Per-namespace cap on warehouse-derived annotations per entity
const MAX_MAPPED_XREFS: usize = 5;

/// Counters describing what resolution did to a fragment
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResolveReport {
    /// Malformed cross-references removed
    pub dropped: usize,
    /// References rewritten to their canonical URI
    pub canonicalized: usize,
    /// Exact references demoted to relaxed because multiple entities shared them
    pub demoted: usize,
    /// Losing exact references re-typed during per-entity disambiguation
    pub disambiguated: usize,
    /// Relaxed references added from warehouse lookups
    pub mapped: usize,
}

/// Resolves cross-reference identities within a fragment.
///
/// Stateless apart from configuration; one resolver is shared across
/// provider tasks.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    xml_base: String,
    warehouse: Option<Arc<MappingWarehouse>>,
}

impl IdentityResolver {
    pub fn new(xml_base: impl Into<String>) -> Self {
        Self {
            xml_base: xml_base.into(),
            warehouse: None,
        }
    }

    /// Enable warehouse-backed annotation of entities with canonical
    /// accessions
    pub fn with_warehouse(mut self, warehouse: Arc<MappingWarehouse>) -> Self {
        self.warehouse = Some(warehouse);
        self
    }

    /// Resolve identities in place. Never fails: problems are repaired or
    /// logged and skipped.
    pub fn resolve(&self, fragment: &mut GraphFragment) -> ResolveReport {
        let mut report = ResolveReport::default();
        self.drop_malformed(fragment, &mut report);
        self.canonicalize(fragment, &mut report);
        self.demote_shared(fragment, &mut report);
        self.disambiguate(fragment, &mut report);
        if self.warehouse.is_some() {
            self.annotate_from_warehouse(fragment, &mut report);
        }
        fragment.remove_dangling_utilities();
        report
    }

    /// A reference without both a database name and an identifier asserts
    /// nothing; remove it and every edge pointing at it.
    fn drop_malformed(&self, fragment: &mut GraphFragment, report: &mut ResolveReport) {
        let malformed = fragment.uris_where(|e| {
            matches!(
                e.element_type,
                ElementType::ExactXref | ElementType::RelaxedXref
            ) && e
                .as_xref()
                .map_or(true, |x| x.db.is_empty() || x.id.is_empty())
        });
        for uri in malformed {
            tracing::warn!(%uri, "dropping malformed cross-reference");
            fragment.detach(&uri);
            report.dropped += 1;
        }
    }

    /// Rewrite every reference to the deterministic URI of its normalized
    /// (db, id) pair. Per-fragment duplicates collapse into one element
    /// as a side effect of the URI rewrite.
    fn canonicalize(&self, fragment: &mut GraphFragment, report: &mut ResolveReport) {
        let xref_uris = fragment.uris_where(|e| e.as_xref().is_some());
        for uri in xref_uris {
            let Some(xref) = fragment.get(&uri).and_then(|e| e.as_xref()) else {
                continue; // already unified into a canonical element
            };
            let canonical =
                CrossReference::new(xref.db.as_str(), normalize(&xref.db, &xref.id), xref.strength);
            let canonical_uri = canonical.uri(&self.xml_base);
            if canonical_uri == uri && canonical.id == xref.id {
                continue;
            }
            if let Some(element) = fragment.get_mut(&uri) {
                element
                    .attributes
                    .insert("id".to_string(), canonical.id.as_str().into());
            }
            fragment.rewrite_uri(&uri, canonical_uri);
            report.canonicalized += 1;
        }
    }

    /// An exact reference shared by several entities cannot identify any
    /// of them; re-type it as a single relaxed reference all owners reuse.
    fn demote_shared(&self, fragment: &mut GraphFragment, report: &mut ResolveReport) {
        let index = fragment.reverse_index();
        // only entities count as owners; variantOf links from other
        // references do not make an identity "shared"
        let owner_count = |uri: &Uri| {
            index.get(uri).map_or(0, |referrers| {
                referrers
                    .iter()
                    .filter(|r| fragment.get(r).is_some_and(|e| e.element_type.is_top_level()))
                    .count()
            })
        };
        let shared: Vec<Uri> = fragment
            .uris_where(|e| e.element_type == ElementType::ExactXref)
            .into_iter()
            .filter(|uri| owner_count(uri) > 1)
            .collect();
        for uri in shared {
            let Some(xref) = fragment.get(&uri).and_then(|e| e.as_xref()) else {
                continue;
            };
            let relaxed = CrossReference::new(xref.db, xref.id, Strength::Relaxed);
            let relaxed_uri = relaxed.uri(&self.xml_base);
            tracing::debug!(from = %uri, to = %relaxed_uri, "demoting shared exact reference");
            if let Some(element) = fragment.get_mut(&uri) {
                element.element_type = ElementType::RelaxedXref;
            }
            fragment.rewrite_uri(&uri, relaxed_uri);
            report.demoted += 1;
        }
    }

    /// An entity asserting several exact identities in the same namespace
    /// keeps the lexicographically smallest; the rest become relaxed
    /// references marked as variants of the kept one.
    fn disambiguate(&self, fragment: &mut GraphFragment, report: &mut ResolveReport) {
        let owners = fragment.uris_where(|e| e.element_type.is_top_level());
        for owner in owners {
            let mut by_db: BTreeMap<String, Vec<(String, Uri)>> = BTreeMap::new();
            let Some(element) = fragment.get(&owner) else {
                continue;
            };
            for target in element.targets(XREF) {
                if let Some(xref) = fragment.get(target).and_then(|e| e.as_xref()) {
                    if xref.strength == Strength::Exact {
                        by_db
                            .entry(xref.db)
                            .or_default()
                            .push((xref.id, target.clone()));
                    }
                }
            }
            for (db, mut ids) in by_db {
                if ids.len() < 2 {
                    continue;
                }
                ids.sort();
                let (_, kept_uri) = ids[0].clone();
                for (id, loser_uri) in ids.into_iter().skip(1) {
                    tracing::debug!(
                        owner = %owner, db = %db, id = %id,
                        "competing exact identity re-typed as variant"
                    );
                    let relaxed = CrossReference::new(db.as_str(), id, Strength::Relaxed);
                    let relaxed_uri = relaxed.uri(&self.xml_base);
                    if let Some(loser) = fragment.get_mut(&loser_uri) {
                        loser.element_type = ElementType::RelaxedXref;
                        loser.add_edge(VARIANT_OF, kept_uri.clone());
                    }
                    fragment.rewrite_uri(&loser_uri, relaxed_uri);
                    report.disambiguated += 1;
                }
            }
        }
    }

    /// Attach relaxed references carrying canonical accessions looked up
    /// from the mapping warehouse, so entities that only arrived with
    /// secondary identifiers still land next to their canonical record.
    fn annotate_from_warehouse(&self, fragment: &mut GraphFragment, report: &mut ResolveReport) {
        let Some(warehouse) = &self.warehouse else {
            return;
        };
        let owners = fragment.uris_where(|e| {
            matches!(
                e.element_type,
                ElementType::Protein | ElementType::Gene | ElementType::SmallMolecule
            )
        });
        for owner in owners {
            let Some(element) = fragment.get(&owner) else {
                continue;
            };
            let dst_space = match element.element_type {
                ElementType::SmallMolecule => "CHEBI",
                _ => "UNIPROT",
            };
            let mut present: BTreeSet<String> = BTreeSet::new();
            let mut accessions: BTreeSet<String> = BTreeSet::new();
            for target in element.targets(XREF) {
                if let Some(xref) = fragment.get(target).and_then(|e| e.as_xref()) {
                    if xref.db.eq_ignore_ascii_case(dst_space) {
                        present.insert(xref.id.clone());
                    }
                    accessions.extend(warehouse.map(&xref.id, Some(&xref.db), dst_space));
                }
            }
            let new_ids: Vec<String> = accessions
                .into_iter()
                .filter(|id| !present.contains(id))
                .take(MAX_MAPPED_XREFS)
                .collect();
            for id in new_ids {
                let relaxed = CrossReference::new(dst_space, id, Strength::Relaxed);
                let relaxed_uri = relaxed.uri(&self.xml_base);
                if !fragment.contains(&relaxed_uri) {
                    fragment.insert(relaxed.to_element(&self.xml_base));
                }
                if let Some(element) = fragment.get_mut(&owner) {
                    element.add_edge(XREF, relaxed_uri);
                }
                report.mapped += 1;
            }
        }
    }
}
