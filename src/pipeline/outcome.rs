//! Pipeline stages and run reporting

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Where a provider (or one of its files) is in the pipeline.
///
/// Stages advance strictly left to right; `Failed` carries the stage the
/// provider stopped at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetched,
    Cleaned,
    Converted,
    IdentityResolved,
    Validated,
    Merged,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Fetched => "fetched",
            Self::Cleaned => "cleaned",
            Self::Converted => "converted",
            Self::IdentityResolved => "identity_resolved",
            Self::Validated => "validated",
            Self::Merged => "merged",
        };
        write!(f, "{}", s)
    }
}

/// Terminal state of one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ProviderState {
    Merged,
    /// The warehouse was updated; nothing entered the graph
    WarehouseLoaded,
    Failed {
        stage: Stage,
        cause: String,
    },
}

/// Everything the run learned about one provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderOutcome {
    pub provider: String,
    pub state: ProviderState,
    pub files_processed: usize,
    pub files_failed: usize,
    pub validation_warnings: usize,
    pub merged_elements: usize,
    pub merge_conflicts: usize,
}

impl ProviderOutcome {
    pub fn failed(provider: impl Into<String>, stage: Stage, cause: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            state: ProviderState::Failed {
                stage,
                cause: cause.into(),
            },
            files_processed: 0,
            files_failed: 0,
            validation_warnings: 0,
            merged_elements: 0,
            merge_conflicts: 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, ProviderState::Failed { .. })
    }
}

/// The report of one whole pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Provider identifier → terminal outcome
    pub outcomes: BTreeMap<String, ProviderOutcome>,
}

impl RunReport {
    pub fn outcome(&self, provider: &str) -> Option<&ProviderOutcome> {
        self.outcomes.get(provider)
    }

    pub fn failed_providers(&self) -> impl Iterator<Item = &ProviderOutcome> {
        self.outcomes.values().filter(|o| o.is_failed())
    }
}
