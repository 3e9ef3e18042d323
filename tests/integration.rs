//! End-to-end pipeline scenarios
//!
//! Drives the orchestrator the way an operator would: a provider registry,
//! raw data files, custom capabilities, and assertions on the merged graph
//! that comes out the other side.

use async_trait::async_trait;
use pathfuse::{
    CapabilityError, CapabilityRegistry, CrossReference, DataSourceRecord, ElementType,
    GraphElement, GraphFragment, MappingWarehouse, PathwayDataFile, PipelineConfig,
    PipelineOrchestrator, ProviderPayload, ProviderState, SourceKind, Stage, Strength, Uri,
    DATA_SOURCE, XREF,
};
use std::sync::Arc;
use std::time::Duration;

const BASE: &str = "http://pathfuse.org/";

/// Strips comment lines; stands in for a provider-specific cleaner
struct HashCommentCleaner;

#[async_trait]
impl pathfuse::Cleaner for HashCommentCleaner {
    async fn clean(&self, raw: &[u8]) -> Result<Vec<u8>, CapabilityError> {
        let text = String::from_utf8_lossy(raw);
        Ok(text
            .lines()
            .filter(|l| !l.starts_with('#'))
            .collect::<Vec<_>>()
            .join("\n")
            .into_bytes())
    }
}

/// Parses a toy line format: `uri<TAB>uniprot_accession`, one protein with
/// one exact reference per line
struct TabularConverter;

#[async_trait]
impl pathfuse::Converter for TabularConverter {
    async fn convert(&self, cleaned: &[u8]) -> Result<GraphFragment, CapabilityError> {
        let text = std::str::from_utf8(cleaned)
            .map_err(|e| CapabilityError::MalformedInput(e.to_string()))?;
        let mut fragment = GraphFragment::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let (uri, accession) = line
                .split_once('\t')
                .ok_or_else(|| CapabilityError::MalformedInput(format!("bad line: {}", line)))?;
            let xref = CrossReference::new("uniprot", accession, Strength::Exact);
            let xref_uri = fragment.insert(xref.to_element(BASE));
            fragment.insert(
                GraphElement::new(uri, ElementType::Protein).with_edge(XREF, xref_uri),
            );
        }
        Ok(fragment)
    }
}

fn record(identifier: &str, kind: SourceKind) -> DataSourceRecord {
    DataSourceRecord {
        identifier: identifier.to_string(),
        names: vec![identifier.to_string()],
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

fn registry_with_tabular() -> Arc<CapabilityRegistry> {
    let mut capabilities = CapabilityRegistry::new();
    capabilities.register_cleaner("hash_comments", Arc::new(HashCommentCleaner));
    capabilities.register_converter("tabular", Arc::new(TabularConverter));
    Arc::new(capabilities)
}

fn orchestrator(capabilities: Arc<CapabilityRegistry>) -> PipelineOrchestrator {
    PipelineOrchestrator::new(
        PipelineConfig::default(),
        capabilities,
        Arc::new(MappingWarehouse::new()),
    )
}

#[tokio::test]
async fn clean_convert_resolve_merge_end_to_end() {
    let orchestrator = orchestrator(registry_with_tabular());

    let mut rec = record("reactome", SourceKind::PathwayData);
    rec.cleaner = Some("hash_comments".to_string());
    rec.converter = Some("tabular".to_string());
    // the isoform suffix must be gone by the time the graph is merged
    let raw = b"# comment line\nhttp://pathfuse.org/p1\tP04150-2\nhttp://pathfuse.org/p2\tQ00987\n";
    let payload = ProviderPayload {
        record: rec,
        files: vec![PathwayDataFile::new("reactome.tsv", raw.to_vec())],
    };

    let report = orchestrator.run(vec![payload]).await;
    let outcome = report.outcome("reactome").unwrap();
    assert_eq!(outcome.state, ProviderState::Merged);
    assert_eq!(outcome.files_failed, 0);

    let engine = orchestrator.merge_engine();
    let engine = engine.lock().await;
    let graph = engine.graph();

    let canonical = CrossReference::new("uniprot", "P04150", Strength::Exact).uri(BASE);
    let isoform = CrossReference::new("uniprot", "P04150-2", Strength::Exact).uri(BASE);
    assert!(graph.contains(&canonical), "isoform id was canonicalized");
    assert!(!graph.contains(&isoform));

    // every protein is attributed to the provider
    let marker = engine.provenance_uri("reactome");
    for uri in ["http://pathfuse.org/p1", "http://pathfuse.org/p2"] {
        let p = graph.get(&Uri::from(uri)).unwrap();
        assert!(p.targets(DATA_SOURCE).any(|t| *t == marker));
    }
}

#[tokio::test]
async fn broken_provider_is_isolated_from_healthy_one() {
    let orchestrator = orchestrator(registry_with_tabular());

    let mut broken = record("broken", SourceKind::PathwayData);
    broken.converter = Some("tabular".to_string());
    let broken_payload = ProviderPayload {
        record: broken,
        files: vec![PathwayDataFile::new("bad.tsv", b"no tab separator here".to_vec())],
    };

    let mut healthy = record("healthy", SourceKind::PathwayData);
    healthy.converter = Some("tabular".to_string());
    let healthy_payload = ProviderPayload {
        record: healthy,
        files: vec![PathwayDataFile::new(
            "good.tsv",
            b"http://pathfuse.org/p1\tP04150\n".to_vec(),
        )],
    };

    let report = orchestrator.run(vec![broken_payload, healthy_payload]).await;

    match &report.outcome("broken").unwrap().state {
        ProviderState::Failed { stage, .. } => assert_eq!(*stage, Stage::Converted),
        other => panic!("unexpected state: {:?}", other),
    }
    assert_eq!(report.outcome("healthy").unwrap().state, ProviderState::Merged);

    let engine = orchestrator.merge_engine();
    let engine = engine.lock().await;
    assert!(engine.graph().contains(&Uri::from("http://pathfuse.org/p1")));
}

/// Never returns; stands in for a hung upstream parser
struct StalledConverter;

#[async_trait]
impl pathfuse::Converter for StalledConverter {
    async fn convert(&self, _: &[u8]) -> Result<GraphFragment, CapabilityError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(GraphFragment::new())
    }
}

#[tokio::test]
async fn hung_provider_times_out_while_sibling_merges() {
    let mut capabilities = CapabilityRegistry::new();
    capabilities.register_converter("stalled", Arc::new(StalledConverter));
    let config = PipelineConfig {
        provider_timeout: Duration::from_millis(200),
        ..PipelineConfig::default()
    };
    let orchestrator = PipelineOrchestrator::new(
        config,
        Arc::new(capabilities),
        Arc::new(MappingWarehouse::new()),
    );

    let mut hung = record("hung", SourceKind::PathwayData);
    hung.converter = Some("stalled".to_string());
    let hung_payload = ProviderPayload {
        record: hung,
        files: vec![PathwayDataFile::new("slow.dat", b"whatever".to_vec())],
    };

    let healthy: GraphFragment = [GraphElement::new(
        "http://pathfuse.org/p1",
        ElementType::Protein,
    )]
    .into_iter()
    .collect();
    let healthy_payload = ProviderPayload {
        record: record("healthy", SourceKind::PathwayData),
        files: vec![PathwayDataFile::new(
            "good.json",
            healthy.to_json().unwrap().into_bytes(),
        )],
    };

    let report = orchestrator.run(vec![hung_payload, healthy_payload]).await;

    match &report.outcome("hung").unwrap().state {
        ProviderState::Failed { stage, cause } => {
            // the stage it hung in, never a terminal one
            assert_eq!(*stage, Stage::Converted);
            assert!(cause.contains("timed out"), "cause: {}", cause);
        }
        other => panic!("unexpected state: {:?}", other),
    }
    assert_eq!(report.outcome("healthy").unwrap().state, ProviderState::Merged);

    let engine = orchestrator.merge_engine();
    let engine = engine.lock().await;
    assert!(engine.graph().contains(&Uri::from("http://pathfuse.org/p1")));
}

#[tokio::test]
async fn two_providers_describing_one_entity_union_their_knowledge() {
    let orchestrator = orchestrator(Arc::new(CapabilityRegistry::new()));

    // both providers ship exchange-format JSON for the same URI
    let first: GraphFragment = [GraphElement::new(
        "http://pathfuse.org/p1",
        ElementType::Protein,
    )
    .with_attribute("displayName", "GR")]
    .into_iter()
    .collect();
    let second: GraphFragment = [GraphElement::new(
        "http://pathfuse.org/p1",
        ElementType::Protein,
    )
    .with_attribute("displayName", "NR3C1")
    .with_attribute("organism", "9606")]
    .into_iter()
    .collect();

    let report = orchestrator
        .run(vec![ProviderPayload {
            record: record("alpha", SourceKind::PathwayData),
            files: vec![PathwayDataFile::new(
                "a.json",
                first.to_json().unwrap().into_bytes(),
            )],
        }])
        .await;
    assert_eq!(report.outcome("alpha").unwrap().state, ProviderState::Merged);

    let report = orchestrator
        .run(vec![ProviderPayload {
            record: record("beta", SourceKind::PathwayData),
            files: vec![PathwayDataFile::new(
                "b.json",
                second.to_json().unwrap().into_bytes(),
            )],
        }])
        .await;
    assert_eq!(report.outcome("beta").unwrap().state, ProviderState::Merged);

    let engine = orchestrator.merge_engine();
    let engine = engine.lock().await;
    let p = engine
        .graph()
        .get(&Uri::from("http://pathfuse.org/p1"))
        .unwrap();

    // names from both providers survive
    let names = p.attributes.get("displayName").unwrap();
    let json = serde_json::to_string(names).unwrap();
    assert!(json.contains("GR") && json.contains("NR3C1"));
    // the second provider's extra attribute is present
    assert!(p.attributes.contains_key("organism"));
    // exactly one provenance edge, and the latest merge owns it
    let sources: Vec<&Uri> = p.targets(DATA_SOURCE).collect();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0], &engine.provenance_uri("beta"));
}

#[tokio::test]
async fn mapping_provider_enables_warehouse_annotation_in_later_run() {
    let orchestrator = orchestrator(registry_with_tabular());

    // first run: load the identifier mappings
    let report = orchestrator
        .run(vec![ProviderPayload {
            record: record("uniprot_mappings", SourceKind::MappingData),
            files: vec![PathwayDataFile::new(
                "refseq.tsv",
                b"REFSEQ\tUNIPROT\nNP_000167\tP04150\n".to_vec(),
            )],
        }])
        .await;
    assert_eq!(
        report.outcome("uniprot_mappings").unwrap().state,
        ProviderState::WarehouseLoaded
    );

    // second run: a protein known only by its RefSeq accession
    let fragment: GraphFragment = {
        let mut f = GraphFragment::new();
        let xref = CrossReference::new("refseq", "NP_000167", Strength::Exact);
        let xref_uri = f.insert(xref.to_element(BASE));
        f.insert(
            GraphElement::new("http://pathfuse.org/p1", ElementType::Protein)
                .with_edge(XREF, xref_uri),
        );
        f
    };
    let report = orchestrator
        .run(vec![ProviderPayload {
            record: record("alpha", SourceKind::PathwayData),
            files: vec![PathwayDataFile::new(
                "a.json",
                fragment.to_json().unwrap().into_bytes(),
            )],
        }])
        .await;
    assert_eq!(report.outcome("alpha").unwrap().state, ProviderState::Merged);

    // the resolver attached the canonical accession from the warehouse
    let engine = orchestrator.merge_engine();
    let engine = engine.lock().await;
    let mapped = CrossReference::new("uniprot", "P04150", Strength::Relaxed).uri(BASE);
    assert!(engine.graph().contains(&mapped));
    let p = engine
        .graph()
        .get(&Uri::from("http://pathfuse.org/p1"))
        .unwrap();
    assert!(p.targets(XREF).any(|t| *t == mapped));
}

#[tokio::test]
async fn shared_exact_identity_is_demoted_before_merge() {
    let orchestrator = orchestrator(registry_with_tabular());

    // two proteins claiming the same exact accession in one file
    let mut rec = record("reactome", SourceKind::PathwayData);
    rec.converter = Some("tabular".to_string());
    let raw = b"http://pathfuse.org/p1\tP04150\nhttp://pathfuse.org/p2\tP04150\n";
    let report = orchestrator
        .run(vec![ProviderPayload {
            record: rec,
            files: vec![PathwayDataFile::new("r.tsv", raw.to_vec())],
        }])
        .await;
    assert_eq!(report.outcome("reactome").unwrap().state, ProviderState::Merged);

    let engine = orchestrator.merge_engine();
    let engine = engine.lock().await;
    let graph = engine.graph();
    let exact = CrossReference::new("uniprot", "P04150", Strength::Exact).uri(BASE);
    let relaxed = CrossReference::new("uniprot", "P04150", Strength::Relaxed).uri(BASE);
    assert!(!graph.contains(&exact), "ambiguous exact identity was demoted");
    let shared = graph.get(&relaxed).expect("one shared relaxed reference");
    assert_eq!(shared.element_type, ElementType::RelaxedXref);
    assert_eq!(graph.referrer_count(&relaxed), 2);
}
