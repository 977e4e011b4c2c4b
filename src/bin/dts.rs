//! dts CLI tool
//!
//! Command-line interface for discovering an XBRL DTS and compiling its relationships.
//!
//! ## Commands
//!
//! - `crawl <seeds...>`: Discover every document reachable from the seeds and materialize
//!   relationships
//! - `summary <snapshot>`: Print the networks held in a store snapshot
//!
//! Seeds may be absolute URIs, files, or directories. Directories are walked for `.xsd` and
//! `.xml` files.
//!
//! ## Resuming
//!
//! With `--work-state FILE`, documents left pending or failed at the end of a crawl are written
//! to FILE and queued again by the next run. Pair it with `--snapshot FILE` so documents that
//! were already loaded are not fetched again.

use clap::{Parser, Subcommand};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::mpsc::unbounded_channel;
use url::Url;
use walkdir::WalkDir;
use xbrl_dts::{
    codec::{CrawlReport, DiscoveryCrawler},
    config::{DtsConfig, WorkStateFile, WorkStateProvider},
    event::DtsEvent,
    networks::Networks,
    store::{FileSource, FragmentStore, MemoryStore},
    DtsError,
};

#[derive(Parser)]
#[command(name = "dts")]
#[command(author, version, about = "Discover XBRL taxonomies and compile their relationships", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl from seed URIs, files or directories
    Crawl {
        /// Seed URIs, files or directories
        seeds: Vec<String>,

        /// Configuration file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Follow xsi:schemaLocation hints
        #[arg(long)]
        schema_locations: bool,

        /// Skip relationship materialization after the crawl
        #[arg(long)]
        no_relationships: bool,

        /// File recording pending and failed documents between runs
        #[arg(long)]
        work_state: Option<PathBuf>,

        /// JSON store snapshot to resume from and save to
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Directory of local copies of remote documents, laid out as <host>/<path>
        #[arg(long)]
        mirror: Option<PathBuf>,

        /// Print every progress event
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the networks in a store snapshot
    Summary {
        /// JSON store snapshot
        snapshot: PathBuf,
    },
}

/// Expand a command line seed into document URIs.
fn seed_uris(seed: &str) -> Result<Vec<Url>, DtsError> {
    let path = Path::new(seed);
    if !path.exists() {
        return Ok(vec![Url::parse(seed)?]);
    }
    let to_uri = |p: &Path| -> Result<Url, DtsError> {
        let canonical = p.canonicalize()?;
        Url::from_file_path(&canonical)
            .map_err(|_| DtsError::InvalidUri(format!("{canonical:?} is not an absolute path")))
    };
    if path.is_file() {
        return Ok(vec![to_uri(path)?]);
    }
    let mut uris = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(|e| DtsError::Io(e.to_string()))?;
        let is_document = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "xsd" || e == "xml");
        if entry.file_type().is_file() && is_document {
            uris.push(to_uri(entry.path())?);
        }
    }
    Ok(uris)
}

fn print_summary(networks: &Networks) {
    println!("{} networks", networks.len());
    for network in networks.iter() {
        println!(
            "  {} | {}: {} relationships, {} active, {} roots",
            network.arcrole(),
            network.link_role(),
            network.len(),
            network.active_len(),
            network.root_indices().len()
        );
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Crawl {
            seeds,
            config,
            schema_locations,
            no_relationships,
            work_state,
            snapshot,
            mirror,
            verbose,
        } => {
            let mut dts_config = match config {
                Some(path) => DtsConfig::from_file(path)?,
                None => DtsConfig::default(),
            };
            dts_config.seeds.extend(seeds);
            if schema_locations {
                dts_config.crawl.use_schema_locations = true;
            }
            if no_relationships {
                dts_config.crawl.persist_relationships = false;
            }
            let work_state = work_state.or(dts_config.work_state.clone());
            let snapshot = snapshot.or(dts_config.snapshot.clone());
            let mirror = mirror.or(dts_config.mirror.clone());

            let mut uris = Vec::new();
            for seed in dts_config.seeds.iter() {
                uris.extend(seed_uris(seed)?);
            }
            let work_file = work_state.map(WorkStateFile::new);
            if uris.is_empty() && work_file.is_none() {
                eprintln!("Error: no seeds given");
                std::process::exit(1);
            }

            let store = Arc::new(match snapshot.as_ref() {
                Some(path) => MemoryStore::load(path)?,
                None => MemoryStore::new(),
            });
            if let Some(file) = work_file.as_ref() {
                let resumed = file.load()?;
                if !resumed.is_empty() {
                    println!("Resuming {} documents from {:?}", resumed.len(), file.path());
                }
                store.persist_work_state(resumed)?;
            }
            let source = Arc::new(match mirror {
                Some(dir) => FileSource::with_mirror(dir),
                None => FileSource::new(),
            });

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let report: Result<CrawlReport, DtsError> = runtime.block_on(async {
                let (tx, mut rx) = unbounded_channel::<DtsEvent>();
                let printer = tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        if verbose {
                            println!("{event}");
                        }
                    }
                });

                let mut crawler =
                    DiscoveryCrawler::new(store.clone(), source, dts_config.crawl).with_events(tx);
                crawler.seed(uris.iter())?;

                // Set up Ctrl-C handler
                let interrupt = crawler.interrupt_handle();
                ctrlc::set_handler(move || {
                    println!("\nStopping after the current document...");
                    interrupt.request_interrupt();
                })
                .map_err(|e| DtsError::Io(e.to_string()))?;

                let report = crawler.run().await;
                drop(crawler);
                printer.await.ok();
                report
            });
            let report = report?;

            println!(
                "Explored: {}, pending: {}, failed: {}",
                report.explored,
                report.pending.len(),
                report.failed.len()
            );
            for (uri, reason) in report.failed.iter() {
                println!("  failed {uri}: {reason}");
            }
            if dts_config.crawl.persist_relationships {
                println!(
                    "Relationships: {} stored, {} already present, {} failed",
                    report.relationships.stored,
                    report.relationships.skipped,
                    report.relationships.failed
                );
            }

            if let Some(file) = work_file.as_ref() {
                let remaining = store.take_work_state()?;
                if remaining.is_empty() {
                    file.clear()?;
                } else {
                    file.save(&remaining)?;
                    println!("{} documents recorded in {:?}", remaining.len(), file.path());
                }
            }
            if let Some(path) = snapshot.as_ref() {
                store.save(path)?;
            }

            print_summary(&Networks::from_store(store.as_ref())?);
            Ok(())
        }

        Commands::Summary { snapshot } => {
            let store = MemoryStore::load(&snapshot)?;
            println!(
                "{} documents, {} fragments, {} relationships, {} error markers",
                store.document_uris().len(),
                store.fragment_count(),
                store.relationship_count(),
                store.errors(None).len()
            );
            print_summary(&Networks::from_store(&store)?);
            Ok(())
        }
    }
}
