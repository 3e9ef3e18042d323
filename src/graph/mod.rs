//! Domain graph model: elements, provider fragments, and the merged graph

mod element;
mod fragment;
mod merged;

pub use element::{AttributeValue, CrossReference, ElementType, GraphElement, Strength, Uri};
pub use fragment::GraphFragment;
pub use merged::MergedGraph;

/// Edge predicate naming the contributing data source (the provenance marker)
pub const DATA_SOURCE: &str = "dataSource";

/// Edge predicate attaching a cross-reference to its owner
pub const XREF: &str = "xref";

/// Edge predicate linking an alternate identity to the kept one
pub const VARIANT_OF: &str = "variantOf";

/// Attribute listing other URIs known to denote the same real-world record
pub const ALTERNATE_URIS: &str = "alternateUris";
