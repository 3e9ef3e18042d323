//! Pathfuse: pathway data integration engine
//!
//! Ingests biological pathway and interaction data from independently
//! curated providers and folds it into one internally-consistent knowledge
//! graph with globally unique identities.
//!
//! # Core Concepts
//!
//! - **Graph elements**: URI-keyed entities and their utility objects
//!   (cross-references, vocabulary terms, provenance markers)
//! - **Fragments**: one provider's converted graph, private until merged
//! - **Warehouse**: identifier mappings to canonical accession spaces
//! - **Pipeline**: clean → convert → resolve identities → validate → merge,
//!   with per-provider failure isolation
//!
//! # Example
//!
//! ```
//! use pathfuse::{MergeEngine, GraphFragment};
//!
//! let mut engine = MergeEngine::new("http://pathfuse.org/");
//! let result = engine.merge(GraphFragment::new(), "example");
//! assert_eq!(result.applied, 0);
//! ```

pub mod error;
pub mod export;
mod graph;
mod merge;
pub mod pipeline;
mod resolve;
pub mod warehouse;

pub use error::{CapabilityError, PipelineError, RegistryError};
pub use graph::{
    AttributeValue, CrossReference, ElementType, GraphElement, GraphFragment, MergedGraph,
    Strength, Uri, ALTERNATE_URIS, DATA_SOURCE, VARIANT_OF, XREF,
};
pub use merge::{MergeConflict, MergeEngine, MergeResult};
pub use pipeline::{
    CapabilityRegistry, Cleaner, Converter, DataSourceRecord, PathwayDataFile, PipelineConfig,
    PipelineOrchestrator, ProviderOutcome, ProviderPayload, ProviderRegistry, ProviderState,
    RunReport, SourceKind, Stage, ValidationReport, Validator,
};
pub use resolve::{IdentityResolver, ResolveReport};
pub use warehouse::{MappingEntry, MappingWarehouse};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
