//! Pluggable per-provider capabilities
//!
//! Cleaners repair provider-specific quirks in raw bytes; converters turn
//! cleaned bytes into a graph fragment; validators judge a fragment.
//! Providers name their capabilities in the registry config; the
//! orchestrator looks them up here.

use crate::error::CapabilityError;
use crate::graph::GraphFragment;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Repairs a provider's raw payload before conversion
#[async_trait]
pub trait Cleaner: Send + Sync {
    async fn clean(&self, raw: &[u8]) -> Result<Vec<u8>, CapabilityError>;
}

/// Turns cleaned bytes into a graph fragment
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(&self, cleaned: &[u8]) -> Result<GraphFragment, CapabilityError>;
}

/// Judges a resolved fragment before it may merge
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, fragment: &GraphFragment) -> Result<ValidationReport, CapabilityError>;
}

/// How bad a validation finding is. Warnings still merge; errors fail the
/// file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub message: String,
}

/// Outcome of validating one fragment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn passed() -> Self {
        Self::default()
    }

    pub fn warn(mut self, message: impl Into<String>) -> Self {
        self.issues.push(ValidationIssue {
            severity: Severity::Warning,
            message: message.into(),
        });
        self
    }

    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.issues.push(ValidationIssue {
            severity: Severity::Error,
            message: message.into(),
        });
        self
    }

    /// True when no error-severity issue was found
    pub fn is_valid(&self) -> bool {
        self.issues.iter().all(|i| i.severity != Severity::Error)
    }

    pub fn warnings(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    pub fn errors(&self) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .collect()
    }
}

/// Named capability implementations available to providers
#[derive(Default)]
pub struct CapabilityRegistry {
    cleaners: HashMap<String, Arc<dyn Cleaner>>,
    converters: HashMap<String, Arc<dyn Converter>>,
    validators: HashMap<String, Arc<dyn Validator>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_cleaner(&mut self, name: impl Into<String>, cleaner: Arc<dyn Cleaner>) {
        self.cleaners.insert(name.into(), cleaner);
    }

    pub fn register_converter(&mut self, name: impl Into<String>, converter: Arc<dyn Converter>) {
        self.converters.insert(name.into(), converter);
    }

    pub fn register_validator(&mut self, name: impl Into<String>, validator: Arc<dyn Validator>) {
        self.validators.insert(name.into(), validator);
    }

    pub fn cleaner(&self, name: &str) -> Option<Arc<dyn Cleaner>> {
        self.cleaners.get(name).cloned()
    }

    pub fn converter(&self, name: &str) -> Option<Arc<dyn Converter>> {
        self.converters.get(name).cloned()
    }

    pub fn validator(&self, name: &str) -> Option<Arc<dyn Validator>> {
        self.validators.get(name).cloned()
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("cleaners", &self.cleaners.keys().collect::<Vec<_>>())
            .field("converters", &self.converters.keys().collect::<Vec<_>>())
            .field("validators", &self.validators.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Default validator: checks structural invariants of a fragment.
///
/// Edges whose target is missing from the fragment fail the file; an
/// empty fragment is a warning (the file cleaned and converted into
/// nothing usable).
#[derive(Debug, Default)]
pub struct StructuralValidator;

#[async_trait]
impl Validator for StructuralValidator {
    async fn validate(&self, fragment: &GraphFragment) -> Result<ValidationReport, CapabilityError> {
        let mut report = ValidationReport::passed();
        if fragment.is_empty() {
            report = report.warn("fragment contains no elements");
        }
        for element in fragment.iter() {
            for target in element.all_targets() {
                if !fragment.contains(target) {
                    report = report.fail(format!(
                        "{} has an edge to {}, which is not in the fragment",
                        element.uri, target
                    ));
                }
            }
        }
        Ok(report)
    }
}
