//! Pipeline orchestrator: runs every provider to a terminal state
//!
//! One tokio task per provider, bounded by a semaphore. Every stage up to
//! the merge touches only provider-private data plus the read-only
//! warehouse snapshot; the merge itself is serialized through a mutex.
//! A provider's failure never touches another provider's outcome.

use crate::graph::GraphFragment;
use crate::merge::MergeEngine;
use crate::pipeline::cancel::CancellationToken;
use crate::pipeline::capability::{CapabilityRegistry, StructuralValidator, Validator};
use crate::pipeline::outcome::{ProviderOutcome, ProviderState, RunReport, Stage};
use crate::pipeline::provider::{DataSourceRecord, PathwayDataFile, SourceKind};
use crate::resolve::IdentityResolver;
use crate::warehouse::MappingWarehouse;
use crate::error::{CapabilityError, PipelineError};
use chrono::Utc;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use uuid::Uuid;

/// Tunables for one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// URI prefix for generated elements (canonical references, provenance)
    pub xml_base: String,
    /// Providers processed at once
    pub max_concurrent_providers: usize,
    /// A provider exceeding this fails with a timeout instead of hanging
    /// the run
    pub provider_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            xml_base: "http://pathfuse.org/".to_string(),
            max_concurrent_providers: 4,
            provider_timeout: Duration::from_secs(600),
        }
    }
}

/// One provider's input to a run
#[derive(Debug, Clone)]
pub struct ProviderPayload {
    pub record: DataSourceRecord,
    pub files: Vec<PathwayDataFile>,
}

/// Everything a provider task needs; cheap to clone into the task
#[derive(Clone)]
struct WorkerCtx {
    capabilities: Arc<CapabilityRegistry>,
    warehouse: Arc<MappingWarehouse>,
    merge: Arc<Mutex<MergeEngine>>,
    stages: Arc<DashMap<String, Stage>>,
    cancel: CancellationToken,
    resolver: IdentityResolver,
}

/// Drives payloads through the stages and reports per-provider outcomes.
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    ctx: WorkerCtx,
}

impl PipelineOrchestrator {
    pub fn new(
        config: PipelineConfig,
        capabilities: Arc<CapabilityRegistry>,
        warehouse: Arc<MappingWarehouse>,
    ) -> Self {
        let resolver =
            IdentityResolver::new(config.xml_base.clone()).with_warehouse(warehouse.clone());
        let merge = Arc::new(Mutex::new(MergeEngine::new(config.xml_base.clone())));
        Self {
            config,
            ctx: WorkerCtx {
                capabilities,
                warehouse,
                merge,
                stages: Arc::new(DashMap::new()),
                cancel: CancellationToken::new(),
                resolver,
            },
        }
    }

    /// The shared merge engine, for inspecting or exporting the graph
    /// after a run
    pub fn merge_engine(&self) -> Arc<Mutex<MergeEngine>> {
        self.ctx.merge.clone()
    }

    pub fn warehouse(&self) -> Arc<MappingWarehouse> {
        self.ctx.warehouse.clone()
    }

    /// The stage a provider was last seen in, while a run is live
    pub fn stage_of(&self, provider: &str) -> Option<Stage> {
        self.ctx.stages.get(provider).map(|s| *s)
    }

    /// Token that cancels in-flight providers cooperatively
    pub fn cancellation_token(&self) -> CancellationToken {
        self.ctx.cancel.clone()
    }

    /// Run every payload to a terminal state and report.
    pub async fn run(&self, payloads: Vec<ProviderPayload>) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(%run_id, providers = payloads.len(), "pipeline run starting");

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_providers));
        let timeout = self.config.provider_timeout;
        let mut tasks = JoinSet::new();
        for payload in payloads {
            let ctx = self.ctx.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let provider = payload.record.identifier.clone();
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return ProviderOutcome::failed(
                            provider,
                            Stage::Fetched,
                            PipelineError::Cancelled.to_string(),
                        )
                    }
                };
                // the stages run in their own task so a panicking
                // capability implementation still yields an outcome
                let worker = tokio::spawn({
                    let ctx = ctx.clone();
                    async move { run_provider(&ctx, payload).await }
                });
                let abort = worker.abort_handle();
                match tokio::time::timeout(timeout, worker).await {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(e)) => {
                        let stage = last_seen_stage(&ctx, &provider);
                        tracing::error!(%provider, %stage, error = %e, "provider task panicked");
                        ProviderOutcome::failed(
                            provider,
                            stage,
                            format!("task panicked: {}", e),
                        )
                    }
                    Err(_) => {
                        abort.abort();
                        let stage = last_seen_stage(&ctx, &provider);
                        tracing::warn!(%provider, %stage, "provider timed out");
                        ProviderOutcome::failed(
                            provider,
                            stage,
                            PipelineError::Timeout(timeout).to_string(),
                        )
                    }
                }
            });
        }

        let mut outcomes = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    tracing::info!(provider = %outcome.provider, failed = outcome.is_failed(), "provider finished");
                    outcomes.insert(outcome.provider.clone(), outcome);
                }
                Err(e) => tracing::error!(error = %e, "provider task panicked"),
            }
        }

        let finished_at = Utc::now();
        tracing::info!(%run_id, "pipeline run finished");
        RunReport {
            run_id,
            started_at,
            finished_at,
            outcomes,
        }
    }
}

/// One provider's walk through the stages. Per-file failures mark the
/// file and continue; the provider fails a stage only when no file
/// survives it.
async fn run_provider(ctx: &WorkerCtx, payload: ProviderPayload) -> ProviderOutcome {
    let record = payload.record;
    let provider = record.identifier.clone();
    let mut files = payload.files;
    ctx.stages.insert(provider.clone(), Stage::Fetched);

    if files.is_empty() {
        return ProviderOutcome::failed(&provider, Stage::Fetched, "provider has no data files");
    }

    // cleaning
    if let Err(outcome) = clean_stage(ctx, &record, &mut files).await {
        return *outcome;
    }
    if ctx.cancel.is_cancelled() {
        return cancelled(&provider, Stage::Cleaned);
    }

    // mapping data never enters the graph; it reloads the warehouse
    if record.kind == SourceKind::MappingData {
        return load_mappings(ctx, &provider, files);
    }

    // conversion
    if let Err(outcome) = convert_stage(ctx, &record, &mut files).await {
        return *outcome;
    }
    if ctx.cancel.is_cancelled() {
        return cancelled(&provider, Stage::Converted);
    }

    // identity resolution; repairs, never fails a file
    ctx.stages.insert(provider.clone(), Stage::IdentityResolved);
    for file in files.iter_mut().filter(|f| !f.is_failed()) {
        if let Some(fragment) = file.fragment.as_mut() {
            let report = ctx.resolver.resolve(fragment);
            tracing::debug!(%provider, file = %file.name, ?report, "identities resolved");
            file.stage = Stage::IdentityResolved;
        }
    }

    // validation; canonical reference sets are trusted as-is
    let mut validation_warnings = 0;
    if record.kind != SourceKind::WarehouseData {
        match validate_stage(ctx, &record, &mut files).await {
            Ok(warnings) => validation_warnings = warnings,
            Err(outcome) => return *outcome,
        }
    }
    if ctx.cancel.is_cancelled() {
        return cancelled(&provider, Stage::Validated);
    }

    // merge, serialized across providers; the live stage stays at the
    // last completed one until the merge is actually done, so a timeout
    // spent waiting on the merge lock never reports a terminal stage
    let mut merged_elements = 0;
    let mut merge_conflicts = 0;
    {
        let mut engine = ctx.merge.lock().await;
        for file in files.iter_mut().filter(|f| !f.is_failed()) {
            if let Some(fragment) = file.fragment.take() {
                let result = engine.merge(fragment, &provider);
                merged_elements += result.applied;
                merge_conflicts += result.conflicts.len();
                file.stage = Stage::Merged;
            }
        }
    }

    ctx.stages.insert(provider.clone(), Stage::Merged);
    let files_failed = files.iter().filter(|f| f.is_failed()).count();
    ProviderOutcome {
        provider,
        state: ProviderState::Merged,
        files_processed: files.len(),
        files_failed,
        validation_warnings,
        merged_elements,
        merge_conflicts,
    }
}

fn last_seen_stage(ctx: &WorkerCtx, provider: &str) -> Stage {
    ctx.stages
        .get(provider)
        .map(|s| *s)
        .unwrap_or(Stage::Fetched)
}

fn cancelled(provider: &str, stage: Stage) -> ProviderOutcome {
    ProviderOutcome::failed(provider, stage, PipelineError::Cancelled.to_string())
}

/// Fail the provider when no file survived the stage
fn check_survivors(
    provider: &str,
    stage: Stage,
    files: &[PathwayDataFile],
) -> Result<(), Box<ProviderOutcome>> {
    if files.iter().any(|f| !f.is_failed()) {
        return Ok(());
    }
    let cause = files
        .iter()
        .find_map(|f| f.failure.clone())
        .unwrap_or_else(|| "no file survived".to_string());
    let mut outcome = ProviderOutcome::failed(provider, stage, cause);
    outcome.files_processed = files.len();
    outcome.files_failed = files.len();
    Err(Box::new(outcome))
}

async fn clean_stage(
    ctx: &WorkerCtx,
    record: &DataSourceRecord,
    files: &mut [PathwayDataFile],
) -> Result<(), Box<ProviderOutcome>> {
    let provider = &record.identifier;
    ctx.stages.insert(provider.clone(), Stage::Cleaned);
    let cleaner = match &record.cleaner {
        Some(name) => match ctx.capabilities.cleaner(name) {
            Some(cleaner) => Some(cleaner),
            None => {
                return Err(Box::new(ProviderOutcome::failed(
                    provider,
                    Stage::Cleaned,
                    PipelineError::MissingCapability {
                        kind: "cleaner",
                        name: name.clone(),
                    }
                    .to_string(),
                )))
            }
        },
        None => None,
    };
    for file in files.iter_mut() {
        match &cleaner {
            Some(cleaner) => match cleaner.clean(&file.raw).await {
                Ok(cleaned) => {
                    file.cleaned = Some(cleaned);
                    file.stage = Stage::Cleaned;
                }
                Err(e) => {
                    tracing::warn!(%provider, file = %file.name, error = %e, "cleaning failed");
                    file.fail(PipelineError::Cleaning(e).to_string());
                }
            },
            // nothing to repair
            None => {
                file.cleaned = Some(file.raw.clone());
                file.stage = Stage::Cleaned;
            }
        }
    }
    check_survivors(provider, Stage::Cleaned, files)
}

async fn convert_stage(
    ctx: &WorkerCtx,
    record: &DataSourceRecord,
    files: &mut [PathwayDataFile],
) -> Result<(), Box<ProviderOutcome>> {
    let provider = &record.identifier;
    ctx.stages.insert(provider.clone(), Stage::Converted);
    let converter = match &record.converter {
        Some(name) => match ctx.capabilities.converter(name) {
            Some(converter) => Some(converter),
            None => {
                return Err(Box::new(ProviderOutcome::failed(
                    provider,
                    Stage::Converted,
                    PipelineError::MissingCapability {
                        kind: "converter",
                        name: name.clone(),
                    }
                    .to_string(),
                )))
            }
        },
        None => None,
    };
    for file in files.iter_mut().filter(|f| !f.is_failed()) {
        let cleaned = file.cleaned.as_deref().unwrap_or(&file.raw);
        let converted = match &converter {
            Some(converter) => converter.convert(cleaned).await,
            // no converter: the payload is already in the exchange format
            None => GraphFragment::from_json(cleaned).map_err(CapabilityError::from),
        };
        match converted {
            Ok(fragment) => {
                file.fragment = Some(fragment);
                file.stage = Stage::Converted;
            }
            Err(e) => {
                tracing::warn!(%provider, file = %file.name, error = %e, "conversion failed");
                file.fail(PipelineError::Conversion(e).to_string());
            }
        }
    }
    check_survivors(provider, Stage::Converted, files)
}

async fn validate_stage(
    ctx: &WorkerCtx,
    record: &DataSourceRecord,
    files: &mut [PathwayDataFile],
) -> Result<usize, Box<ProviderOutcome>> {
    let provider = &record.identifier;
    ctx.stages.insert(provider.clone(), Stage::Validated);
    let validator: Arc<dyn Validator> = match &record.validator {
        Some(name) => match ctx.capabilities.validator(name) {
            Some(validator) => validator,
            None => {
                return Err(Box::new(ProviderOutcome::failed(
                    provider,
                    Stage::Validated,
                    PipelineError::MissingCapability {
                        kind: "validator",
                        name: name.clone(),
                    }
                    .to_string(),
                )))
            }
        },
        None => Arc::new(StructuralValidator),
    };
    let mut warnings = 0;
    for file in files.iter_mut().filter(|f| !f.is_failed()) {
        let Some(fragment) = file.fragment.as_ref() else {
            continue;
        };
        match validator.validate(fragment).await {
            Ok(report) => {
                warnings += report.warnings();
                if !report.is_valid() {
                    let causes: Vec<String> =
                        report.errors().iter().map(|i| i.message.clone()).collect();
                    tracing::warn!(%provider, file = %file.name, "validation rejected file");
                    file.fail(format!("validation failed: {}", causes.join("; ")));
                } else {
                    file.stage = Stage::Validated;
                }
                file.validation = Some(report);
            }
            Err(e) => {
                tracing::warn!(%provider, file = %file.name, error = %e, "validator error");
                file.fail(PipelineError::Validation(e.to_string()).to_string());
            }
        }
    }
    check_survivors(provider, Stage::Validated, files)?;
    Ok(warnings)
}

/// Terminal handling for mapping providers: cleaned files become
/// warehouse rows, the graph is never touched.
fn load_mappings(
    ctx: &WorkerCtx,
    provider: &str,
    mut files: Vec<PathwayDataFile>,
) -> ProviderOutcome {
    ctx.stages.insert(provider.to_string(), Stage::Converted);
    let mut loaded = 0;
    for file in files.iter_mut().filter(|f| !f.is_failed()) {
        let cleaned = file.cleaned.as_deref().unwrap_or(&file.raw);
        match MappingWarehouse::parse_tsv(cleaned) {
            Ok(entries) => {
                loaded += ctx.warehouse.append(entries);
                file.stage = Stage::Converted;
            }
            Err(e) => {
                tracing::warn!(%provider, file = %file.name, error = %e, "mapping file rejected");
                file.fail(
                    PipelineError::Conversion(CapabilityError::MalformedInput(e.to_string()))
                        .to_string(),
                );
            }
        }
    }
    if let Err(outcome) = check_survivors(provider, Stage::Converted, &files) {
        return *outcome;
    }
    tracing::info!(%provider, rows = loaded, "warehouse updated");
    let files_failed = files.iter().filter(|f| f.is_failed()).count();
    ProviderOutcome {
        provider: provider.to_string(),
        state: ProviderState::WarehouseLoaded,
        files_processed: files.len(),
        files_failed,
        validation_warnings: 0,
        merged_elements: 0,
        merge_conflicts: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CapabilityError;
    use crate::graph::{ElementType, GraphElement, Uri, DATA_SOURCE};
    use async_trait::async_trait;

    fn record(identifier: &str, kind: SourceKind) -> DataSourceRecord {
        DataSourceRecord {
            identifier: identifier.to_string(),
            names: vec![],
            description: None,
            data_url: None,
            homepage_url: None,
            kind,
            cleaner: None,
            converter: None,
            validator: None,
            added_at: None,
        }
    }

    fn exchange_payload(identifier: &str, uri: &str) -> ProviderPayload {
        let fragment: GraphFragment =
            [GraphElement::new(uri, ElementType::Protein).with_attribute("displayName", identifier)]
                .into_iter()
                .collect();
        ProviderPayload {
            record: record(identifier, SourceKind::PathwayData),
            files: vec![PathwayDataFile::new(
                "data.json",
                fragment.to_json().unwrap().into_bytes(),
            )],
        }
    }

    fn orchestrator() -> PipelineOrchestrator {
        PipelineOrchestrator::new(
            PipelineConfig::default(),
            Arc::new(CapabilityRegistry::new()),
            Arc::new(MappingWarehouse::new()),
        )
    }

    struct BrokenConverter;

    #[async_trait]
    impl crate::pipeline::capability::Converter for BrokenConverter {
        async fn convert(&self, _: &[u8]) -> Result<GraphFragment, CapabilityError> {
            Err(CapabilityError::MalformedInput("not today".to_string()))
        }
    }

    struct PanickingConverter;

    #[async_trait]
    impl crate::pipeline::capability::Converter for PanickingConverter {
        async fn convert(&self, _: &[u8]) -> Result<GraphFragment, CapabilityError> {
            panic!("converter blew up");
        }
    }

    #[tokio::test]
    async fn provider_without_converter_parses_exchange_format() {
        let orchestrator = orchestrator();
        let report = orchestrator
            .run(vec![exchange_payload("alpha", "http://test/p1")])
            .await;
        let outcome = report.outcome("alpha").unwrap();
        assert_eq!(outcome.state, ProviderState::Merged);
        assert_eq!(outcome.merged_elements, 1);

        let engine = orchestrator.merge_engine();
        let engine = engine.lock().await;
        let p = engine.graph().get(&Uri::from("http://test/p1")).unwrap();
        assert!(p
            .targets(DATA_SOURCE)
            .any(|t| t.as_str() == "http://pathfuse.org/provenance/alpha"));
    }

    #[tokio::test]
    async fn one_failing_provider_does_not_touch_the_other() {
        let mut capabilities = CapabilityRegistry::new();
        capabilities.register_converter("broken", Arc::new(BrokenConverter));
        let orchestrator = PipelineOrchestrator::new(
            PipelineConfig::default(),
            Arc::new(capabilities),
            Arc::new(MappingWarehouse::new()),
        );

        let mut failing = exchange_payload("failing", "http://test/f1");
        failing.record.converter = Some("broken".to_string());
        let healthy = exchange_payload("healthy", "http://test/p1");

        let report = orchestrator.run(vec![failing, healthy]).await;
        match &report.outcome("failing").unwrap().state {
            ProviderState::Failed { stage, cause } => {
                assert_eq!(*stage, Stage::Converted);
                // the cause carries the taxonomy's stage prefix
                assert!(cause.starts_with("conversion failed:"), "cause: {}", cause);
            }
            other => panic!("unexpected state: {:?}", other),
        }
        assert_eq!(report.outcome("healthy").unwrap().state, ProviderState::Merged);
        let engine = orchestrator.merge_engine();
        let engine = engine.lock().await;
        assert!(engine.graph().contains(&Uri::from("http://test/p1")));
        assert!(!engine.graph().contains(&Uri::from("http://test/f1")));
    }

    #[tokio::test]
    async fn panicking_capability_still_yields_an_outcome() {
        let mut capabilities = CapabilityRegistry::new();
        capabilities.register_converter("crashy", Arc::new(PanickingConverter));
        let orchestrator = PipelineOrchestrator::new(
            PipelineConfig::default(),
            Arc::new(capabilities),
            Arc::new(MappingWarehouse::new()),
        );

        let mut crasher = exchange_payload("crasher", "http://test/c1");
        crasher.record.converter = Some("crashy".to_string());
        let healthy = exchange_payload("healthy", "http://test/p1");

        let report = orchestrator.run(vec![crasher, healthy]).await;
        let outcome = report
            .outcome("crasher")
            .expect("a panicking provider still appears in the report");
        match &outcome.state {
            ProviderState::Failed { stage, cause } => {
                assert_eq!(*stage, Stage::Converted);
                assert!(cause.contains("panicked"), "cause: {}", cause);
            }
            other => panic!("unexpected state: {:?}", other),
        }
        assert_eq!(report.outcome("healthy").unwrap().state, ProviderState::Merged);
    }

    #[tokio::test]
    async fn live_stage_reaches_merged_only_on_completion() {
        let orchestrator = orchestrator();
        let report = orchestrator
            .run(vec![exchange_payload("alpha", "http://test/p1")])
            .await;
        assert_eq!(report.outcome("alpha").unwrap().state, ProviderState::Merged);
        assert_eq!(orchestrator.stage_of("alpha"), Some(Stage::Merged));
    }

    #[tokio::test]
    async fn missing_capability_fails_at_its_stage() {
        let orchestrator = orchestrator();
        let mut payload = exchange_payload("alpha", "http://test/p1");
        payload.record.cleaner = Some("nonexistent".to_string());
        let report = orchestrator.run(vec![payload]).await;
        match &report.outcome("alpha").unwrap().state {
            ProviderState::Failed { stage, cause } => {
                assert_eq!(*stage, Stage::Cleaned);
                assert!(cause.contains("nonexistent"));
            }
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[tokio::test]
    async fn mapping_provider_feeds_warehouse_not_graph() {
        let orchestrator = orchestrator();
        let payload = ProviderPayload {
            record: record("mappings", SourceKind::MappingData),
            files: vec![PathwayDataFile::new(
                "uniprot.tsv",
                b"REFSEQ\tUNIPROT\nNP_012345\tP04150\n".to_vec(),
            )],
        };
        let report = orchestrator.run(vec![payload]).await;
        assert_eq!(
            report.outcome("mappings").unwrap().state,
            ProviderState::WarehouseLoaded
        );
        let hits = orchestrator
            .warehouse()
            .map("NP_012345.2", Some("REFSEQ"), "UNIPROT");
        assert!(hits.contains("P04150"));
        let engine = orchestrator.merge_engine();
        assert!(engine.lock().await.graph().is_empty());
    }

    #[tokio::test]
    async fn per_file_failure_spares_sibling_files() {
        let orchestrator = orchestrator();
        let good: GraphFragment =
            [GraphElement::new("http://test/ok", ElementType::Protein)]
                .into_iter()
                .collect();
        let payload = ProviderPayload {
            record: record("alpha", SourceKind::PathwayData),
            files: vec![
                PathwayDataFile::new("bad.json", b"not json".to_vec()),
                PathwayDataFile::new("good.json", good.to_json().unwrap().into_bytes()),
            ],
        };
        let report = orchestrator.run(vec![payload]).await;
        let outcome = report.outcome("alpha").unwrap();
        assert_eq!(outcome.state, ProviderState::Merged);
        assert_eq!(outcome.files_processed, 2);
        assert_eq!(outcome.files_failed, 1);
        let engine = orchestrator.merge_engine();
        assert!(engine.lock().await.graph().contains(&Uri::from("http://test/ok")));
    }

    #[tokio::test]
    async fn empty_payload_fails_before_any_stage() {
        let orchestrator = orchestrator();
        let payload = ProviderPayload {
            record: record("alpha", SourceKind::PathwayData),
            files: vec![],
        };
        let report = orchestrator.run(vec![payload]).await;
        match &report.outcome("alpha").unwrap().state {
            ProviderState::Failed { stage, .. } => assert_eq!(*stage, Stage::Fetched),
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[tokio::test]
    async fn cancelled_run_reports_cancelled_providers() {
        let orchestrator = orchestrator();
        orchestrator.cancellation_token().cancel();
        let report = orchestrator
            .run(vec![exchange_payload("alpha", "http://test/p1")])
            .await;
        match &report.outcome("alpha").unwrap().state {
            ProviderState::Failed { cause, .. } => assert!(cause.contains("cancelled")),
            other => panic!("unexpected state: {:?}", other),
        }
    }
}
