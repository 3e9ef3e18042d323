//! Pipeline: providers, capabilities, stages, and the orchestrator

mod cancel;
mod capability;
mod orchestrator;
mod outcome;
mod provider;

pub use cancel::CancellationToken;
pub use capability::{
    CapabilityRegistry, Cleaner, Converter, Severity, StructuralValidator, ValidationIssue,
    ValidationReport, Validator,
};
pub use orchestrator::{PipelineConfig, PipelineOrchestrator, ProviderPayload};
pub use outcome::{ProviderOutcome, ProviderState, RunReport, Stage};
pub use provider::{DataSourceRecord, PathwayDataFile, ProviderRegistry, SourceKind};
