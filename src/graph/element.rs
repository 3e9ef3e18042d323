//! Graph element representation: URIs, typed elements, cross-references

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Canonical URI of a graph element — the identity key, globally unique
/// within the merged graph.
///
/// Serializes as a plain string (e.g. "http://pathfuse.org/UX_uniprot_P04150")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uri(String);

impl Uri {
    /// Create a Uri from a string
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Uri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Uri {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Uri {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Type tag of a graph element.
///
/// Utility types (cross-references, vocabulary terms, provenance nodes)
/// are support objects: they are swept from the merged graph once no
/// other element refers to them. Exact and Relaxed cross-references are
/// distinct types — demoting a reference re-types it under a new URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ElementType {
    Pathway,
    Interaction,
    Protein,
    SmallMolecule,
    Gene,
    Complex,
    ExactXref,
    RelaxedXref,
    VocabularyTerm,
    Provenance,
}

impl ElementType {
    /// True for support objects subject to the dangling sweep
    pub fn is_utility(&self) -> bool {
        matches!(
            self,
            Self::ExactXref | Self::RelaxedXref | Self::VocabularyTerm | Self::Provenance
        )
    }

    /// True for entities that carry a provenance marker
    pub fn is_top_level(&self) -> bool {
        !self.is_utility()
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pathway => "pathway",
            Self::Interaction => "interaction",
            Self::Protein => "protein",
            Self::SmallMolecule => "smallMolecule",
            Self::Gene => "gene",
            Self::Complex => "complex",
            Self::ExactXref => "exactXref",
            Self::RelaxedXref => "relaxedXref",
            Self::VocabularyTerm => "vocabularyTerm",
            Self::Provenance => "provenance",
        };
        write!(f, "{}", s)
    }
}

/// Typed scalar attribute values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<AttributeValue>),
}

impl AttributeValue {
    /// Union a new value into an existing one.
    ///
    /// Equal values are a no-op; a scalar collision promotes the slot to
    /// an array holding both; arrays absorb only genuinely new members.
    /// The operation is idempotent.
    pub fn union(&mut self, incoming: AttributeValue) {
        if *self == incoming {
            return;
        }
        match (&mut *self, incoming) {
            (AttributeValue::Array(existing), AttributeValue::Array(new)) => {
                for v in new {
                    if !existing.contains(&v) {
                        existing.push(v);
                    }
                }
            }
            (AttributeValue::Array(existing), v) => {
                if !existing.contains(&v) {
                    existing.push(v);
                }
            }
            (_, v) => {
                let prev = self.clone();
                *self = AttributeValue::Array(vec![prev, v]);
            }
        }
    }

    /// The string payload, if this is a String value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

/// The unit of the knowledge graph.
///
/// Edges are stored as typed predicate → target-URI sets, never as direct
/// object handles — cyclic references are resolved through the arena
/// (fragment or merged graph) that owns the elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphElement {
    /// Canonical identity
    pub uri: Uri,
    /// Type tag
    pub element_type: ElementType,
    /// Scalar attributes
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Typed edges to other elements' URIs
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub edges: BTreeMap<String, BTreeSet<Uri>>,
}

impl GraphElement {
    /// Create a new element
    pub fn new(uri: impl Into<Uri>, element_type: ElementType) -> Self {
        Self {
            uri: uri.into(),
            element_type,
            attributes: BTreeMap::new(),
            edges: BTreeMap::new(),
        }
    }

    /// Set an attribute (builder style)
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Add an edge (builder style)
    pub fn with_edge(mut self, predicate: impl Into<String>, target: impl Into<Uri>) -> Self {
        self.add_edge(predicate, target);
        self
    }

    /// Add a typed edge to another element's URI
    pub fn add_edge(&mut self, predicate: impl Into<String>, target: impl Into<Uri>) {
        self.edges
            .entry(predicate.into())
            .or_default()
            .insert(target.into());
    }

    /// Remove all edges under the given predicate, returning the old targets
    pub fn remove_edges(&mut self, predicate: &str) -> BTreeSet<Uri> {
        self.edges.remove(predicate).unwrap_or_default()
    }

    /// Remove a single edge; true if it was present
    pub fn remove_edge(&mut self, predicate: &str, target: &Uri) -> bool {
        let removed = match self.edges.get_mut(predicate) {
            Some(targets) => targets.remove(target),
            None => false,
        };
        if removed && self.edges.get(predicate).is_some_and(|t| t.is_empty()) {
            self.edges.remove(predicate);
        }
        removed
    }

    /// Targets of the given predicate
    pub fn targets(&self, predicate: &str) -> impl Iterator<Item = &Uri> {
        self.edges.get(predicate).into_iter().flatten()
    }

    /// All edge targets, across predicates
    pub fn all_targets(&self) -> impl Iterator<Item = &Uri> {
        self.edges.values().flatten()
    }

    /// Union another element's attributes and edges into this one.
    ///
    /// The caller guarantees matching URIs and types; only genuinely new
    /// values are added.
    pub fn unify(&mut self, other: GraphElement) {
        for (key, value) in other.attributes {
            match self.attributes.get_mut(&key) {
                Some(existing) => existing.union(value),
                None => {
                    self.attributes.insert(key, value);
                }
            }
        }
        for (predicate, targets) in other.edges {
            self.edges.entry(predicate).or_default().extend(targets);
        }
    }

    /// Interpret this element as a cross-reference, if it is one
    pub fn as_xref(&self) -> Option<CrossReference> {
        let strength = match self.element_type {
            ElementType::ExactXref => Strength::Exact,
            ElementType::RelaxedXref => Strength::Relaxed,
            _ => return None,
        };
        let db = self.attributes.get("db")?.as_str()?.to_string();
        let id = self.attributes.get("id")?.as_str()?.to_string();
        Some(CrossReference { db, id, strength })
    }
}

/// Strength of a cross-reference annotation.
///
/// Exact asserts "same real-world entity"; Relaxed asserts "related to".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strength {
    Exact,
    Relaxed,
}

/// A (database, identifier) annotation attached to a graph element.
///
/// Database names are case-insensitive and stored lowercased; identifiers
/// are case-sensitive (`ZHX1-C8orf76` and `ZHX1-C8ORF76` are distinct).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CrossReference {
    pub db: String,
    pub id: String,
    pub strength: Strength,
}

impl CrossReference {
    /// Create a cross-reference; the db name is lowercased
    pub fn new(db: impl Into<String>, id: impl Into<String>, strength: Strength) -> Self {
        Self {
            db: db.into().to_lowercase(),
            id: id.into(),
            strength,
        }
    }

    /// Deterministic element URI for this reference under the given base.
    ///
    /// Exact references get a `UX_` prefix, relaxed ones `RX_`, so a
    /// demoted reference never collides with its exact ancestor.
    pub fn uri(&self, xml_base: &str) -> Uri {
        let tag = match self.strength {
            Strength::Exact => "UX",
            Strength::Relaxed => "RX",
        };
        Uri::new(format!(
            "{}{}_{}_{}",
            xml_base,
            tag,
            sanitize(&self.db),
            sanitize(&self.id)
        ))
    }

    /// Materialize as a graph element under the given base URI
    pub fn to_element(&self, xml_base: &str) -> GraphElement {
        let element_type = match self.strength {
            Strength::Exact => ElementType::ExactXref,
            Strength::Relaxed => ElementType::RelaxedXref,
        };
        GraphElement::new(self.uri(xml_base), element_type)
            .with_attribute("db", self.db.as_str())
            .with_attribute("id", self.id.as_str())
    }
}

/// Replace URI-hostile characters, preserving case (identifiers in this
/// domain differ meaningfully by case).
fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
