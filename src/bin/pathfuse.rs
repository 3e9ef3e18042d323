//! Pathfuse CLI — pathway data integration pipeline.
//!
//! Usage:
//!   pathfuse run --registry providers.yaml [--data-dir dir] [--export out.json]
//!   pathfuse map <id> --to UNIPROT [--from REFSEQ] --mappings table.tsv
//!   pathfuse normalize <namespace> <id>

use clap::{Parser, Subcommand};
use pathfuse::export::{export_full, export_provider};
use pathfuse::{
    warehouse, CapabilityRegistry, MappingWarehouse, PathwayDataFile, PipelineConfig,
    PipelineOrchestrator, ProviderPayload, ProviderRegistry, ProviderState, RunReport,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "pathfuse",
    version,
    about = "Pathway data integration engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the integration pipeline over a provider registry
    Run {
        /// Path to the YAML provider registry
        #[arg(long)]
        registry: PathBuf,
        /// Directory holding one subdirectory of data files per provider
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// URI prefix for generated elements
        #[arg(long, default_value = "http://pathfuse.org/")]
        xml_base: String,
        /// Providers processed at once
        #[arg(long, default_value_t = 4)]
        max_concurrent: usize,
        /// Per-provider timeout in seconds
        #[arg(long, default_value_t = 600)]
        timeout_secs: u64,
        /// Write the merged graph to this file afterwards
        #[arg(long)]
        export: Option<PathBuf>,
        /// Also write one <provider>.json sub-graph per merged provider,
        /// next to the full export
        #[arg(long)]
        export_by_source: bool,
    },
    /// Map an identifier into a destination namespace using a mapping table
    Map {
        /// The identifier to map
        id: String,
        /// Destination namespace (e.g. UNIPROT, CHEBI)
        #[arg(long)]
        to: String,
        /// Source namespace hint
        #[arg(long)]
        from: Option<String>,
        /// Tab-separated mapping file (header names the namespaces)
        #[arg(long)]
        mappings: PathBuf,
    },
    /// Show the canonical form of an identifier in a namespace
    Normalize {
        /// Namespace the identifier belongs to
        namespace: String,
        /// The identifier
        id: String,
    },
}

/// Default data directory (~/.local/share/pathfuse)
fn default_data_dir() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("pathfuse")
}

/// Read every file in the provider's subdirectory
fn load_files(data_dir: &Path, provider: &str) -> std::io::Result<Vec<PathwayDataFile>> {
    let dir = data_dir.join(provider);
    let mut files = Vec::new();
    if !dir.is_dir() {
        return Ok(files);
    }
    let mut entries: Vec<PathBuf> = std::fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    entries.sort();
    for path in entries {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        files.push(PathwayDataFile::new(name, std::fs::read(&path)?));
    }
    Ok(files)
}

fn print_report(report: &RunReport) {
    println!("run {} ({} providers)", report.run_id, report.outcomes.len());
    println!(
        "{:<24}  {:<16}  {:>5}  {:>6}  {:>7}  {:>9}",
        "PROVIDER", "STATE", "FILES", "FAILED", "MERGED", "CONFLICTS"
    );
    println!("{}", "-".repeat(78));
    for outcome in report.outcomes.values() {
        let state = match &outcome.state {
            ProviderState::Merged => "merged".to_string(),
            ProviderState::WarehouseLoaded => "warehouse".to_string(),
            ProviderState::Failed { stage, .. } => format!("failed@{}", stage),
        };
        println!(
            "{:<24}  {:<16}  {:>5}  {:>6}  {:>7}  {:>9}",
            outcome.provider,
            state,
            outcome.files_processed,
            outcome.files_failed,
            outcome.merged_elements,
            outcome.merge_conflicts
        );
    }
    for outcome in report.failed_providers() {
        if let ProviderState::Failed { cause, .. } = &outcome.state {
            eprintln!("{}: {}", outcome.provider, cause);
        }
    }
}

async fn cmd_run(
    registry: PathBuf,
    data_dir: Option<PathBuf>,
    xml_base: String,
    max_concurrent: usize,
    timeout_secs: u64,
    export: Option<PathBuf>,
    export_by_source: bool,
) -> i32 {
    let registry = match ProviderRegistry::from_file(&registry) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: failed to load registry: {}", e);
            return 1;
        }
    };
    let data_dir = data_dir.unwrap_or_else(default_data_dir);

    let mut payloads = Vec::new();
    for record in registry.iter() {
        match load_files(&data_dir, &record.identifier) {
            Ok(files) => payloads.push(ProviderPayload {
                record: record.clone(),
                files,
            }),
            Err(e) => {
                eprintln!("Error: reading {} data: {}", record.identifier, e);
                return 1;
            }
        }
    }

    let config = PipelineConfig {
        xml_base,
        max_concurrent_providers: max_concurrent,
        provider_timeout: Duration::from_secs(timeout_secs),
    };
    let orchestrator = PipelineOrchestrator::new(
        config,
        Arc::new(CapabilityRegistry::new()),
        Arc::new(MappingWarehouse::new()),
    );
    let report = orchestrator.run(payloads).await;
    print_report(&report);

    if let Some(path) = export {
        let engine = orchestrator.merge_engine();
        let engine = engine.lock().await;
        let json = match export_full(engine.graph()) {
            Ok(json) => json,
            Err(e) => {
                eprintln!("Error: export failed: {}", e);
                return 1;
            }
        };
        if let Err(e) = std::fs::write(&path, json) {
            eprintln!("Error: writing {}: {}", path.display(), e);
            return 1;
        }
        println!("Wrote merged graph to {}", path.display());

        if export_by_source {
            let out_dir = path.parent().unwrap_or_else(|| Path::new("."));
            for outcome in report.outcomes.values() {
                if outcome.state != ProviderState::Merged {
                    continue;
                }
                let marker = engine.provenance_uri(&outcome.provider);
                let subgraph = export_provider(engine.graph(), &marker);
                let out = out_dir.join(format!("{}.json", outcome.provider));
                let json = match subgraph.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        eprintln!("Error: export failed for {}: {}", outcome.provider, e);
                        return 1;
                    }
                };
                if let Err(e) = std::fs::write(&out, json) {
                    eprintln!("Error: writing {}: {}", out.display(), e);
                    return 1;
                }
                println!("Wrote {} sub-graph to {}", outcome.provider, out.display());
            }
        }
    }

    if report.failed_providers().next().is_some() {
        2
    } else {
        0
    }
}

fn cmd_map(id: &str, to: &str, from: Option<&str>, mappings: &Path) -> i32 {
    let bytes = match std::fs::read(mappings) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error: reading {}: {}", mappings.display(), e);
            return 1;
        }
    };
    let entries = match MappingWarehouse::parse_tsv(&bytes) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let warehouse = MappingWarehouse::new();
    warehouse.reload(entries);
    let hits = warehouse.map(id, from, to);
    if hits.is_empty() {
        eprintln!("No {} mapping for '{}'", to, id);
        return 1;
    }
    for accession in hits {
        println!("{}", accession);
    }
    0
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Run {
            registry,
            data_dir,
            xml_base,
            max_concurrent,
            timeout_secs,
            export,
            export_by_source,
        } => {
            cmd_run(
                registry,
                data_dir,
                xml_base,
                max_concurrent,
                timeout_secs,
                export,
                export_by_source,
            )
            .await
        }
        Commands::Map {
            id,
            to,
            from,
            mappings,
        } => cmd_map(&id, &to, from.as_deref(), &mappings),
        Commands::Normalize { namespace, id } => {
            println!("{}", warehouse::normalize(&namespace, &id));
            0
        }
    };
    std::process::exit(code);
}
