//! Rules CLI
//!
//! Command-line interface for the legal rule retrieval engine.

use anyhow::Context;
use clap::{Parser, Subcommand};
use rule_index::embeddings;
use rule_index::query::{render_hits, top_k_from_signed};
use rule_index::{
    IndexManager, QueryService, RetrievalConfig, RocksRuleStore, RuleCatalog, RuleStore,
    SnapshotStore, StartupOutcome,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Rules CLI - semantic search over legal rules
#[derive(Parser)]
#[command(name = "rules")]
#[command(about = "Store legal rules and find the ones closest to a free-text question", long_about = None)]
#[command(version)]
struct Cli {
    /// Data directory (overrides RULES_DATA_DIR and the config file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results and logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a rule and re-index
    Add {
        /// Rule title
        #[arg(long)]
        title: String,

        /// Rule description
        #[arg(long)]
        description: String,
    },

    /// Semantic search
    Query {
        /// Free-text question
        text: String,

        /// Number of results (zero or negative returns none)
        #[arg(long, allow_negative_numbers = true)]
        top_k: Option<i64>,
    },

    /// Rebuild the index from the rule store
    Rebuild,

    /// List stored rules
    List,

    /// Index state and live generation
    Status,
}

/// Everything a command needs, opened from configuration.
struct Engine {
    config: RetrievalConfig,
    store: Arc<RocksRuleStore>,
    index: Arc<IndexManager>,
}

impl Engine {
    fn open(config: RetrievalConfig) -> anyhow::Result<Self> {
        let store_dir = config.store_dir();
        std::fs::create_dir_all(&store_dir)?;

        let store = Arc::new(RocksRuleStore::open(&store_dir)?);
        let embedder = embeddings::from_config(&config)?;
        let index = Arc::new(IndexManager::new(
            store.clone(),
            embedder,
            SnapshotStore::new(config.snapshot_dir()),
            config.call_timeout(),
        ));

        Ok(Self { config, store, index })
    }

    async fn start(&self) -> anyhow::Result<()> {
        match self.index.startup().await? {
            StartupOutcome::Restored { entries } => tracing::debug!(entries, "index restored"),
            StartupOutcome::Rebuilt { entries } => tracing::debug!(entries, "index rebuilt at startup"),
        }
        Ok(())
    }

    fn query_service(&self) -> QueryService {
        QueryService::new(self.index.clone()).with_default_top_k(self.config.default_top_k)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let mut config = RetrievalConfig::resolve(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let engine = Engine::open(config)?;

    match cli.command {
        Commands::Add { title, description } => {
            cmd_add(&engine, &title, &description, cli.json).await?;
        }
        Commands::Query { text, top_k } => {
            cmd_query(&engine, &text, top_k, cli.json).await?;
        }
        Commands::Rebuild => {
            cmd_rebuild(&engine, cli.json).await?;
        }
        Commands::List => {
            cmd_list(&engine, cli.json).await?;
        }
        Commands::Status => {
            cmd_status(&engine, cli.json).await?;
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn cmd_add(engine: &Engine, title: &str, description: &str, json: bool) -> anyhow::Result<()> {
    // the worker rebuilds after the insert anyway; a cold start would embed twice
    if engine.index.restore().await.is_none() {
        tracing::debug!("no usable snapshot; the post-insert rebuild builds from scratch");
    }

    let (catalog, worker) = RuleCatalog::new(engine.store.clone(), engine.index.clone());
    let handle = worker.spawn();

    let record = catalog.add_rule(title, description).await?;
    // closing the channel lets the worker finish its rebuild and exit
    drop(catalog);
    let report = handle
        .await?
        .with_context(|| format!("rule {} stored but the index rebuild failed; run `rules rebuild`", record.id))?;

    if json {
        let out = serde_json::json!({
            "rule": record,
            "indexed_entries": report.map(|r| r.entries),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("✓ Stored rule");
        println!("  ID: {}", record.id);
        println!("  Title: {}", record.title);
        if let Some(report) = report {
            println!("  Index entries: {}", report.entries);
        }
    }
    Ok(())
}

async fn cmd_query(engine: &Engine, text: &str, top_k: Option<i64>, json: bool) -> anyhow::Result<()> {
    engine.start().await?;

    let service = engine.query_service();
    let hits = match top_k {
        Some(k) => service.query(text, top_k_from_signed(k)).await?,
        None => service.query_default(text).await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
    } else {
        println!("{}", render_hits(&hits));
    }
    Ok(())
}

async fn cmd_rebuild(engine: &Engine, json: bool) -> anyhow::Result<()> {
    let report = engine.index.rebuild().await?;

    if json {
        let out = serde_json::json!({
            "entries": report.entries,
            "persisted": report.persisted,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("✓ Index rebuilt");
        println!("  Entries: {}", report.entries);
        if !report.persisted {
            println!("  Snapshot not written (see logs)");
        }
    }
    Ok(())
}

async fn cmd_list(engine: &Engine, json: bool) -> anyhow::Result<()> {
    let records = engine.store.list_all().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No rules stored");
    }
    for record in &records {
        println!("[{}] {}", record.id, record.title);
        println!("    {}", record.description);
    }
    Ok(())
}

async fn cmd_status(engine: &Engine, json: bool) -> anyhow::Result<()> {
    engine.start().await?;
    let status = engine.index.status();

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("State: {:?}", status.state);
    println!("Model: {}", status.model);
    match status.generation {
        Some(info) => {
            println!("Entries: {}", info.entries);
            println!("Dimensions: {}", info.dimensions);
            println!("Built at: {}", info.built_at);
            println!("Source: {:?}", info.source);
        }
        None => println!("No index generation"),
    }
    Ok(())
}
