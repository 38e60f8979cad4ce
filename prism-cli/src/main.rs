//! PRISM CLI
//!
//! Drives the pipeline run and the graph post-processing passes
//! (synthesis, layout relaxation, 3D export) over one output root.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use prism_adapters::{CollectedBatch, Seed, Signal};
use prism_collect::{Collector, Scheduler, SchedulerConfig, SpoolCollector};
use prism_core::IntelObject;
use prism_graph::{
    build_layout_export, elements_from_objects, relax, synthesize, EdgeData, ExportConfig,
    GraphStore, LayoutConfig, NodeData, SynthConfig,
};
use prism_pipeline::{
    LiveSource, Plan, QuarantineWriter, RecordStore, Runner, RunnerConfig, SnapshotStore,
};

#[derive(Parser)]
#[command(name = "prism")]
#[command(author, version, about = "PRISM: OSINT correlation and spectrum graph pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1")]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a pipeline plan over a seed document
    Run {
        /// Stage plan JSON
        #[arg(short, long)]
        plan: PathBuf,

        /// Seed document JSON
        #[arg(short, long)]
        seed: PathBuf,

        /// Directory holding stores, quarantine files, and exports
        #[arg(short, long, default_value = "prism-data")]
        output_root: PathBuf,

        /// Days of raw records collect stages keep
        #[arg(long)]
        retention_days: Option<i64>,

        /// Drain live batches from the spool during collect stages
        #[arg(long)]
        live: bool,

        /// Spool root, one subdirectory per source (default: <output-root>/spool)
        #[arg(long)]
        spool: Option<PathBuf>,

        /// Run identifier stamped into exports
        #[arg(long, default_value = "prism-pipeline")]
        run_id: String,
    },

    /// Re-run graph synthesis over the persisted element store
    Synth {
        #[arg(short, long, default_value = "prism-data")]
        output_root: PathBuf,

        /// Days before nodes age out of the graph
        #[arg(long)]
        retention_days: Option<i64>,
    },

    /// Relax node positions with the force-directed layout
    Layout {
        #[arg(short, long, default_value = "prism-data")]
        output_root: PathBuf,

        /// Physics iterations
        #[arg(long)]
        iterations: Option<usize>,
    },

    /// Write the denormalized 3D layout bundle
    Export3d {
        #[arg(short, long, default_value = "prism-data")]
        output_root: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match cli.command {
        Commands::Run {
            plan,
            seed,
            output_root,
            retention_days,
            live,
            spool,
            run_id,
        } => {
            run_pipeline(plan, seed, output_root, retention_days, live, spool, run_id).await?;
        }
        Commands::Synth {
            output_root,
            retention_days,
        } => {
            run_synth(&output_root, retention_days)?;
        }
        Commands::Layout {
            output_root,
            iterations,
        } => {
            run_layout(&output_root, iterations)?;
        }
        Commands::Export3d { output_root } => {
            run_export3d(&output_root)?;
        }
    }

    Ok(())
}

/// Bridges the async collection runtime into the synchronous collect
/// stage. Retries and rate limits live inside `collect_once`; a cycle
/// that fails entirely surfaces as an empty batch.
struct LiveCollector {
    handle: tokio::runtime::Handle,
    scheduler: Scheduler,
    collectors: Vec<Arc<dyn Collector>>,
}

impl LiveCollector {
    fn new(collectors: Vec<SpoolCollector>) -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
            scheduler: Scheduler::new(SchedulerConfig::default()),
            collectors: collectors
                .into_iter()
                .map(|c| Arc::new(c) as Arc<dyn Collector>)
                .collect(),
        }
    }
}

impl LiveSource for LiveCollector {
    fn collect(&mut self, targets: &[Signal]) -> CollectedBatch {
        self.handle
            .block_on(self.scheduler.collect_once(&self.collectors, targets))
    }
}

async fn run_pipeline(
    plan_path: PathBuf,
    seed_path: PathBuf,
    output_root: PathBuf,
    retention_days: Option<i64>,
    live: bool,
    spool: Option<PathBuf>,
    run_id: String,
) -> Result<()> {
    let plan = Plan::from_path(&plan_path)?;
    let seed: Seed = serde_json::from_str(
        &fs::read_to_string(&seed_path)
            .with_context(|| format!("cannot read seed document {}", seed_path.display()))?,
    )
    .with_context(|| format!("invalid seed document {}", seed_path.display()))?;

    let mut config = RunnerConfig {
        run_id,
        live_collect: live,
        ..RunnerConfig::default()
    };
    if let Some(days) = retention_days {
        config.retention_days = days;
    }

    println!("🔬 PRISM pipeline");
    println!("📋 Plan: {} | Case: {}", plan_path.display(), seed.case_id);
    println!("📂 Output root: {}\n", output_root.display());

    let records = RecordStore::new(output_root.join("records.json"));
    let snapshots = SnapshotStore::new(output_root.join("snapshot.json"));
    let quarantine = QuarantineWriter::new(output_root.join("quarantine"));

    let mut runner = Runner::new(plan, seed, &output_root, config, records, snapshots, quarantine);
    if live {
        let spool_root = spool.unwrap_or_else(|| output_root.join("spool"));
        let collectors = SpoolCollector::from_spool_root(&spool_root)
            .with_context(|| format!("unreadable spool root {}", spool_root.display()))?;
        if collectors.is_empty() {
            println!(
                "⚠️  No sources under {}; live collection will be empty\n",
                spool_root.display()
            );
        }
        runner = runner.with_live_source(Box::new(LiveCollector::new(collectors)));
    }

    // The runner is synchronous; keep it off the async worker so the
    // live bridge can block on collection futures.
    let report = tokio::task::spawn_blocking(move || runner.run())
        .await
        .context("pipeline task panicked")??;

    println!("✅ Run complete: {} stages", report.stages.len());
    for stage in &report.stages {
        let committed: usize = stage.committed.values().sum();
        println!(
            "   {}: {} committed, {} quarantined",
            stage.id, committed, stage.quarantined
        );
    }
    for export in &report.exports {
        println!("📄 {} written to {}", export.name, export.path);
    }
    if !report.bundle_written {
        println!("⚠️  No bundle exporter in the plan; bundle not written");
    }

    Ok(())
}

fn merge_by_id<T>(existing: &mut Vec<T>, incoming: Vec<T>, id_of: impl Fn(&T) -> &str) {
    let mut index: std::collections::HashMap<String, usize> = existing
        .iter()
        .enumerate()
        .map(|(i, item)| (id_of(item).to_string(), i))
        .collect();
    for item in incoming {
        match index.get(id_of(&item)) {
            Some(&i) => existing[i] = item,
            None => {
                index.insert(id_of(&item).to_string(), existing.len());
                existing.push(item);
            }
        }
    }
}

fn run_synth(output_root: &Path, retention_days: Option<i64>) -> Result<()> {
    let store = GraphStore::new(output_root);
    let (mut nodes, mut edges) = store.load_elements()?;

    // Fold in objects exported by the latest pipeline run, if any.
    let graph_path = output_root.join("out/graph.json");
    if graph_path.exists() {
        let objects: Vec<IntelObject> = serde_json::from_str(&fs::read_to_string(&graph_path)?)
            .with_context(|| format!("invalid graph objects at {}", graph_path.display()))?;
        let (new_nodes, new_edges) = elements_from_objects(&objects);
        merge_by_id(&mut nodes, new_nodes, |n: &NodeData| &n.id);
        merge_by_id(&mut edges, new_edges, |e: &EdgeData| &e.id);
    }

    let mut positions = store.load_positions()?;
    let mut config = SynthConfig::default();
    if let Some(days) = retention_days {
        config.retention_days = days;
    }

    let (nodes, edges, report) = synthesize(nodes, edges, &mut positions, &config, Utc::now())?;
    store.save_elements(&nodes, &edges)?;
    store.save_positions(&positions)?;

    println!(
        "✅ Synthesis complete: {} nodes, {} edges ({} synthetic edges, {} hubs, {} aged out)",
        nodes.len(),
        edges.len(),
        report.synthetic_edges,
        report.hub_nodes,
        report.pruned_nodes
    );
    Ok(())
}

fn run_layout(output_root: &Path, iterations: Option<usize>) -> Result<()> {
    let store = GraphStore::new(output_root);
    let (nodes, edges) = store.load_elements()?;
    if nodes.is_empty() {
        println!("⚠️  Element store is empty; run synth first");
        return Ok(());
    }

    let mut config = LayoutConfig::default();
    if let Some(n) = iterations {
        config.iterations = n;
    }

    let mut positions = store.load_positions()?;
    relax(&nodes, &edges, &mut positions, &config);
    store.save_positions(&positions)?;

    println!(
        "✅ Layout relaxed: {} nodes over {} iterations",
        nodes.len(),
        config.iterations
    );
    Ok(())
}

fn run_export3d(output_root: &Path) -> Result<()> {
    let store = GraphStore::new(output_root);
    let (nodes, edges) = store.load_elements()?;
    if nodes.is_empty() {
        println!("⚠️  Element store is empty; run synth first");
        return Ok(());
    }

    let positions = store.load_positions()?;
    let export = build_layout_export(&nodes, &edges, &positions, &ExportConfig::default(), Utc::now());
    store.save_export(&export)?;

    println!(
        "✅ 3D layout written to {} ({} nodes, {} edges)",
        store.export_path().display(),
        export.meta.nodes,
        export.meta.edges
    );
    Ok(())
}
