//! Constellation CLI: seed patterns, discover, review and materialize relationships.
//!
//! Usage:
//!   constellation seed <dir>
//!   constellation discover [--max-clusters N] [--dry-run] [--reset] [--summary]
//!   constellation review <stats|pending|interactive|batch-confidence|batch-type|approve|reject|export>
//!   constellation materialize
//!   constellation related <id>

use clap::{Parser, Subcommand};
use constellation::pipeline::{
    staging_summary, AssumeYes, DiscoveryPlan, ReviewPrompt, TerminalPrompt,
};
use constellation::{
    ChatCompletionClient, Clusterer, Config, DataFiles, DiscoveryEngine, DiscoveryOptions,
    DiscoveryRun, GraphStore, Materializer, OpenStore, PatternDirectory, RelationshipType,
    ReviewEngine, SqliteStore, StoreSource,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "constellation",
    version,
    about = "Pattern knowledge graph with reviewed relationship discovery"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Directory for staging, approved, progress and export files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Path to config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load pattern markdown files into the graph store
    Seed {
        /// Directory of *.md pattern files
        dir: PathBuf,
    },
    /// Propose relationships for unprocessed clusters
    Discover {
        /// Process at most this many clusters
        #[arg(long)]
        max_clusters: Option<usize>,
        /// Show what would be processed without calling the model
        #[arg(long)]
        dry_run: bool,
        /// Forget which clusters were already processed
        #[arg(long)]
        reset: bool,
        /// Summarize the staging file and exit
        #[arg(long)]
        summary: bool,
        /// Concurrent inference calls
        #[arg(long)]
        concurrency: Option<usize>,
        /// Maximum patterns per cluster
        #[arg(long)]
        cluster_size: Option<usize>,
        /// Drop proposals below this confidence
        #[arg(long)]
        min_confidence: Option<f64>,
    },
    /// Review staged relationships
    Review {
        #[command(subcommand)]
        action: ReviewAction,
        /// Skip confirmation prompts
        #[arg(long, short = 'y', global = true)]
        yes: bool,
    },
    /// Write approved relationships into the graph store
    Materialize,
    /// List a pattern's relationships
    Related {
        /// Pattern id
        id: String,
    },
}

#[derive(Subcommand)]
enum ReviewAction {
    /// Show review statistics
    Stats,
    /// List pending relationships with their ids
    Pending {
        /// Show at most this many
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Review pending relationships one at a time
    Interactive,
    /// Approve every pending relationship at or above a confidence
    BatchConfidence {
        #[arg(default_value_t = 0.85)]
        min: f64,
    },
    /// Approve every pending relationship of one type
    BatchType {
        /// ENABLES, REQUIRES or TENSIONS_WITH
        relationship_type: String,
    },
    /// Approve one relationship by id (or unique id prefix)
    Approve { id: String },
    /// Reject one relationship by id (or unique id prefix)
    Reject { id: String },
    /// Export approved relationships for loading
    Export,
}

/// Config with command-line path overrides applied
struct Settings {
    config: Config,
    files: DataFiles,
    db_path: PathBuf,
}

fn load_settings(cli: &Cli) -> Result<Settings, String> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .map_err(|e| e.to_string())?;

    if let Some(dir) = &cli.data_dir {
        config.paths.data_dir = Some(dir.clone());
    }
    if let Some(db) = &cli.db {
        config.paths.db_path = Some(db.clone());
    }

    let files = config.data_files().map_err(|e| e.to_string())?;
    let db_path = config.db_path().map_err(|e| e.to_string())?;
    Ok(Settings {
        config,
        files,
        db_path,
    })
}

fn open_store(settings: &Settings) -> Result<Arc<SqliteStore>, String> {
    SqliteStore::open(&settings.db_path)
        .map(Arc::new)
        .map_err(|e| format!("Failed to open database {}: {}", settings.db_path.display(), e))
}

fn cmd_seed(settings: &Settings, dir: &Path) -> i32 {
    let store = match open_store(settings) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    match PatternDirectory::new(dir).seed_into(store.as_ref()) {
        Ok(report) => {
            println!(
                "Loaded {} patterns ({} skipped, {} errors)",
                report.loaded, report.skipped, report.errors
            );
            if report.errors > 0 {
                1
            } else {
                0
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn print_plan(plan: &DiscoveryPlan) {
    println!("Patterns: {}", plan.entities);
    println!("Clusters: {} ({} already processed)", plan.clusters_total, plan.already_processed);
    println!("Remaining: {}", plan.remaining);
    println!("\n[DRY RUN] Would process {} clusters:", plan.clusters.len());
    for cluster in plan.clusters.iter().take(10) {
        println!("  Cluster {} [{}]: {} patterns", cluster.id(), cluster.tag(), cluster.len());
        for member in cluster.members().iter().take(3) {
            println!("    - {}", member.title);
        }
        if cluster.len() > 3 {
            println!("    ... and {} more", cluster.len() - 3);
        }
    }
    if plan.clusters.len() > 10 {
        println!("  ... and {} more clusters", plan.clusters.len() - 10);
    }
}

fn cmd_discover_summary(settings: &Settings) -> i32 {
    match staging_summary(&settings.files) {
        Ok(summary) => {
            println!("Staged relationships: {}", summary.total);
            println!("\nBy type:");
            for (ty, count) in &summary.by_type {
                println!("  {:20} {:5}", ty.as_str(), count);
            }
            println!("\nBy status:");
            for (status, count) in &summary.by_status {
                println!("  {:20} {:5}", status.as_str(), count);
            }
            println!("\nClusters processed: {}", summary.clusters_processed);
            match summary.last_updated {
                Some(ts) => println!("Last updated: {}", ts.to_rfc3339()),
                None => println!("Last updated: never"),
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_discover(
    settings: &Settings,
    max_clusters: Option<usize>,
    dry_run: bool,
    reset: bool,
    concurrency: Option<usize>,
    cluster_size: Option<usize>,
    min_confidence: Option<f64>,
) -> i32 {
    let discovery = &settings.config.discovery;
    let clusterer = match Clusterer::new(cluster_size.unwrap_or(discovery.cluster_size)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let store = match open_store(settings) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let source = StoreSource::new(store);
    let run = DiscoveryRun::new(&source, clusterer, settings.files.clone());
    let options = DiscoveryOptions {
        max_clusters,
        reset,
        concurrency: concurrency.unwrap_or(discovery.concurrency),
    };

    if dry_run {
        return match run.plan(&options) {
            Ok(plan) => {
                print_plan(&plan);
                0
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        };
    }

    let inference = &settings.config.inference;
    let client = inference
        .resolved_api_key()
        .map_err(|e| e.to_string())
        .and_then(|key| {
            ChatCompletionClient::builder()
                .api_key(key)
                .base_url(&inference.base_url)
                .model(&inference.model)
                .temperature(inference.temperature)
                .max_tokens(inference.max_tokens)
                .timeout_secs(inference.timeout_secs)
                .build()
                .map_err(|e| e.to_string())
        });
    let engine = match client.and_then(|c| {
        DiscoveryEngine::new(Arc::new(c))
            .with_min_confidence(min_confidence.unwrap_or(discovery.min_confidence))
            .map_err(|e| e.to_string())
    }) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to create tokio runtime: {}", e);
            return 1;
        }
    };

    match rt.block_on(run.run(&engine, &options)) {
        Ok(report) => {
            println!("Discovery complete");
            println!("  Clusters attempted:   {}", report.clusters_attempted);
            println!("  Clusters failed:      {}", report.clusters_failed);
            println!("  New relationships:    {}", report.new_relationships);
            println!("  Low confidence:       {}", report.filtered_low_confidence);
            println!("  Invalid:              {}", report.invalid);
            println!("  Already staged:       {}", report.already_staged);
            println!("  Total in staging:     {}", report.total_relationships);
            println!(
                "  Clusters processed:   {}/{}",
                report.clusters_processed, report.clusters_total
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

/// `--yes` answers confirmations; interactive review has none to answer
fn check_review_flags(action: &ReviewAction, yes: bool) -> Result<(), &'static str> {
    if yes && matches!(action, ReviewAction::Interactive) {
        return Err("--yes cannot be used with interactive review");
    }
    Ok(())
}

fn cmd_review(settings: &Settings, action: ReviewAction, yes: bool) -> i32 {
    if let Err(e) = check_review_flags(&action, yes) {
        eprintln!("Error: {}", e);
        return 1;
    }

    let engine = ReviewEngine::open(settings.files.clone())
        .map(|e| e.with_reviewer(&settings.config.review.reviewer));
    let mut engine = match engine {
        Ok(engine) => match open_store(settings) {
            Ok(store) => engine.with_titles(store),
            Err(e) => {
                eprintln!("Warning: {}; showing raw ids", e);
                engine
            }
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let mut prompt: Box<dyn ReviewPrompt> = if yes {
        Box::new(AssumeYes)
    } else {
        Box::new(TerminalPrompt::stdio())
    };

    let result = match action {
        ReviewAction::Stats => {
            let stats = engine.statistics();
            println!("\nBy status:");
            for (status, count) in &stats.by_status {
                println!("  {:20} {:5}", status.as_str(), count);
            }
            println!("\nBy type:");
            for (ty, count) in &stats.by_type {
                println!("  {:20} {:5}", ty.as_str(), count);
            }
            println!("\nBy confidence:");
            println!("  High (>= 0.85):      {:5}", stats.high_confidence);
            println!("  Medium (0.7-0.85):   {:5}", stats.medium_confidence);
            println!("  Low (< 0.7):         {:5}", stats.low_confidence);
            println!("\nApproved (ready for graph): {}", stats.approved_total);
            Ok(())
        }
        ReviewAction::Pending { limit } => {
            let views = engine.pending_views();
            if views.is_empty() {
                println!("No relationships pending review.");
                return 0;
            }
            let shown = limit.unwrap_or(views.len()).min(views.len());
            for view in &views[..shown] {
                let rel = view.relationship;
                println!(
                    "{}  {:.2}  {} -[{}]-> {}",
                    rel.short_id(),
                    rel.confidence,
                    view.source_title,
                    rel.relationship_type,
                    view.target_title
                );
            }
            if shown < views.len() {
                println!("... {} more", views.len() - shown);
            }
            Ok(())
        }
        ReviewAction::Interactive => {
            let pending = engine.staging().pending_count();
            if pending == 0 {
                println!("No relationships pending review.");
                return 0;
            }
            println!("{} relationships pending review.", pending);
            println!("  a = approve, r = reject, s = skip, e = edit type, q = quit");
            engine.interactive(prompt.as_mut()).map(|s| {
                println!("\nSession summary:");
                println!("  Approved: {}", s.approved);
                println!("  Rejected: {}", s.rejected);
                println!("  Skipped:  {}", s.skipped);
                println!("  Still pending: {}", s.remaining_pending);
            })
        }
        ReviewAction::BatchConfidence { min } => {
            engine.batch_by_confidence(min, prompt.as_mut()).map(|o| {
                if o.matched == 0 {
                    println!("No relationships meet the threshold.");
                } else if o.cancelled {
                    println!("Cancelled.");
                } else {
                    println!("Approved {} relationships", o.approved);
                }
            })
        }
        ReviewAction::BatchType { relationship_type } => {
            let ty = match relationship_type.parse::<RelationshipType>() {
                Ok(ty) => ty,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return 1;
                }
            };
            engine.batch_by_type(ty, prompt.as_mut()).map(|o| {
                if o.matched == 0 {
                    println!("No pending {} relationships.", ty);
                } else if o.cancelled {
                    println!("Cancelled.");
                } else {
                    println!("Approved {} relationships", o.approved);
                }
            })
        }
        ReviewAction::Approve { id } => engine
            .resolve_id(&id)
            .and_then(|uuid| engine.approve(uuid).map(|_| uuid))
            .map(|uuid| println!("Approved {}", uuid)),
        ReviewAction::Reject { id } => engine
            .resolve_id(&id)
            .and_then(|uuid| engine.reject(uuid).map(|_| uuid))
            .map(|uuid| println!("Rejected {}", uuid)),
        ReviewAction::Export => {
            if engine.approved().is_empty() {
                println!("No approved relationships to export.");
                return 0;
            }
            engine.export().map(|n| {
                println!(
                    "Exported {} relationships to {}",
                    n,
                    settings.files.export().display()
                )
            })
        }
    };

    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_materialize(settings: &Settings) -> i32 {
    let store = match open_store(settings) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let materializer = Materializer::new(store.as_ref());
    let report = match materializer.materialize_approved(&settings.files) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    println!("Attempted:  {}", report.attempted);
    println!("Loaded:     {}", report.loaded);
    println!("Skipped:    {}", report.skipped);
    println!("Duplicates: {}", report.duplicates);
    println!("Errored:    {}", report.errored);
    for (ty, count) in &report.by_type {
        println!("  {:20} {:5}", ty.as_str(), count);
    }
    for error in &report.errors {
        eprintln!("  error: {}", error);
    }

    match materializer.verify() {
        Ok(counts) => {
            println!("\nEdges in store:");
            for (ty, count) in counts {
                println!("  {:20} {:5}", ty.as_str(), count);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    }

    if report.errored > 0 {
        1
    } else {
        0
    }
}

fn cmd_related(settings: &Settings, id: &str) -> i32 {
    let store = match open_store(settings) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    match store.find_entity(id) {
        Ok(Some(entity)) => println!("{} ({})", entity.title, entity.id),
        Ok(None) => {
            eprintln!("Error: pattern '{}' not found", id);
            return 1;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    }

    match store.edges_for(id) {
        Ok(edges) if edges.is_empty() => {
            println!("  (no relationships)");
            0
        }
        Ok(edges) => {
            for edge in edges {
                let (arrow, other) = if edge.source_id == id {
                    ("->", &edge.target_id)
                } else {
                    ("<-", &edge.source_id)
                };
                println!(
                    "  {} {:14} {} ({:.2})",
                    arrow,
                    edge.relationship_type.as_str(),
                    store.title_of(other),
                    edge.confidence
                );
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = match load_settings(&cli) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Seed { dir } => cmd_seed(&settings, &dir),
        Commands::Discover {
            max_clusters,
            dry_run,
            reset,
            summary,
            concurrency,
            cluster_size,
            min_confidence,
        } => {
            if summary {
                cmd_discover_summary(&settings)
            } else {
                cmd_discover(
                    &settings,
                    max_clusters,
                    dry_run,
                    reset,
                    concurrency,
                    cluster_size,
                    min_confidence,
                )
            }
        }
        Commands::Review { action, yes } => cmd_review(&settings, action, yes),
        Commands::Materialize => cmd_materialize(&settings),
        Commands::Related { id } => cmd_related(&settings, &id),
    };
    std::process::exit(code);
}
