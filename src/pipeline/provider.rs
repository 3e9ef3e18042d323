//! Provider registry: who the data comes from and how to treat it
//!
//! Providers are declared in a YAML config file and immutable after load.
//! The identifier doubles as the provenance key, so its shape is
//! validated up front.

use crate::error::RegistryError;
use crate::graph::GraphFragment;
use crate::pipeline::capability::ValidationReport;
use crate::pipeline::outcome::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// What kind of data a provider contributes, which decides its path
/// through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Molecular interaction records; full pipeline
    InteractionData,
    /// Curated pathway models; full pipeline
    PathwayData,
    /// Canonical entity reference sets; skips validation
    WarehouseData,
    /// Identifier-mapping tables; feeds the warehouse, never the graph
    MappingData,
}

/// One declared data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceRecord {
    /// Unique key, used in provenance URIs; no spaces or dashes
    pub identifier: String,
    /// Ordered names; the first is the display name
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Where the data was obtained
    #[serde(default)]
    pub data_url: Option<String>,
    #[serde(default)]
    pub homepage_url: Option<String>,
    pub kind: SourceKind,
    /// Registered cleaner name; absent means the data needs no cleaning
    #[serde(default)]
    pub cleaner: Option<String>,
    /// Registered converter name; absent means the payload is already in
    /// the exchange format
    #[serde(default)]
    pub converter: Option<String>,
    /// Registered validator name; absent uses the structural default
    #[serde(default)]
    pub validator: Option<String>,
    #[serde(default)]
    pub added_at: Option<DateTime<Utc>>,
}

impl DataSourceRecord {
    pub fn display_name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or(&self.identifier)
    }

    fn check_identifier(&self) -> Result<(), RegistryError> {
        let id = &self.identifier;
        if id.is_empty() || id.contains(' ') || id.contains('-') {
            return Err(RegistryError::InvalidIdentifier(id.clone()));
        }
        Ok(())
    }
}

/// The loaded provider registry, keyed by identifier
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, DataSourceRecord>,
}

impl ProviderRegistry {
    /// Parse and validate a YAML registry (a list of provider records)
    pub fn from_yaml(text: &str) -> Result<Self, RegistryError> {
        let records: Vec<DataSourceRecord> = serde_yaml::from_str(text)?;
        let mut providers = BTreeMap::new();
        for record in records {
            record.check_identifier()?;
            if providers.contains_key(&record.identifier) {
                return Err(RegistryError::DuplicateIdentifier(record.identifier));
            }
            providers.insert(record.identifier.clone(), record);
        }
        Ok(Self { providers })
    }

    pub fn from_file(path: &Path) -> Result<Self, RegistryError> {
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }

    pub fn get(&self, identifier: &str) -> Option<&DataSourceRecord> {
        self.providers.get(identifier)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataSourceRecord> {
        self.providers.values()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// One file of provider data moving through the stages.
///
/// Intermediate artifacts are kept so a failure report can say exactly
/// where a file stopped.
#[derive(Debug, Clone)]
pub struct PathwayDataFile {
    pub name: String,
    pub raw: Vec<u8>,
    pub cleaned: Option<Vec<u8>>,
    pub fragment: Option<GraphFragment>,
    pub validation: Option<ValidationReport>,
    pub stage: Stage,
    /// Why this file stopped, when it did
    pub failure: Option<String>,
}

impl PathwayDataFile {
    pub fn new(name: impl Into<String>, raw: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            raw,
            cleaned: None,
            fragment: None,
            validation: None,
            stage: Stage::Fetched,
            failure: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub(crate) fn fail(&mut self, cause: impl Into<String>) {
        self.failure = Some(cause.into());
    }
}
