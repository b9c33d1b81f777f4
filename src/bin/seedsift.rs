//! seedsift binary
//!
//! Runs a condition-tree seed search against the synthetic world oracle and
//! prints one JSON event per line.
//!
//! ## Configuration (TOML / env via `config` crate, flags via `clap`)
//!
//! | Key                     | Default  | Description                         |
//! |-------------------------|----------|-------------------------------------|
//! | `SEEDSIFT_CONFIG`       | *(none)* | TOML file with a `SearchConfig`     |
//! | `SEEDSIFT_MC`           | `1.21`   | Game release to emulate             |
//! | `SEEDSIFT_THREADS`      | `4`      | Worker threads                      |
//! | `SEEDSIFT_MAX_RESULTS`  | `0`      | Stop after this many hits (0 = all) |
//! | `SEEDSIFT_LARGE_BIOMES` | `false`  | Large-biomes world option           |
//! | `SEEDSIFT_WORLD`        | `hashed` | Synthetic world fill (hashed/empty) |
//!
//! Flags override the file, which overrides the built-in defaults.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use seedsift::{
    protocol::{SearchEvent, SearchPayload, SearchStarted},
    script::ScriptRegistry,
    synthetic::{Fill, SyntheticOracle},
    types::{McVersion, SearchConfig, SearchMode},
    SearchDriver,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, ValueEnum)]
enum WorldFill {
    Hashed,
    Empty,
}

#[derive(Parser, Debug)]
#[command(name = "seedsift", about = "Condition tree seed search", version)]
struct Args {
    /// TOML search configuration
    #[arg(long, env = "SEEDSIFT_CONFIG")]
    config: Option<String>,

    /// Game release, e.g. 1.21
    #[arg(long, env = "SEEDSIFT_MC")]
    mc: Option<McVersion>,

    /// Worker threads
    #[arg(long, env = "SEEDSIFT_THREADS")]
    threads: Option<usize>,

    /// Stop after this many hits (0 = unlimited)
    #[arg(long, env = "SEEDSIFT_MAX_RESULTS")]
    max_results: Option<usize>,

    /// Large-biomes world option
    #[arg(long, env = "SEEDSIFT_LARGE_BIOMES")]
    large_biomes: Option<bool>,

    /// Hex-encoded condition (repeatable)
    #[arg(long = "condition", short = 'c')]
    conditions: Vec<String>,

    /// Test exactly these seeds instead of a range
    #[arg(long, value_delimiter = ',')]
    seeds: Vec<i64>,

    /// First 48-bit candidate of a range search
    #[arg(long)]
    start: Option<u64>,

    /// End (exclusive) of a range search
    #[arg(long)]
    end: Option<u64>,

    /// Upper 16-bit values expanded per surviving candidate
    #[arg(long)]
    upper: Option<u32>,

    /// Synthetic world fill
    #[arg(long, env = "SEEDSIFT_WORLD", value_enum, default_value = "hashed")]
    world: WorldFill,

    /// Label attached to every output line
    #[arg(long, default_value = "seedsift")]
    label: String,
}

/// Defaults, then the optional TOML file, then `SEEDSIFT_*` variables.
fn load_config(path: Option<&str>) -> Result<SearchConfig> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::with_name(path));
    }
    let settings = builder
        .add_source(
            // values stay strings so versions like 1.20 are not read as floats
            config::Environment::with_prefix("SEEDSIFT").ignore_empty(true),
        )
        .build()
        .context("failed to read search configuration")?;
    settings
        .try_deserialize::<SearchConfig>()
        .context("search configuration does not match the expected layout")
}

fn apply_args(mut config: SearchConfig, args: &Args) -> SearchConfig {
    if let Some(mc) = args.mc {
        config.mc = mc;
    }
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    if let Some(max) = args.max_results {
        config.max_results = max;
    }
    if let Some(large) = args.large_biomes {
        config.large_biomes = large;
    }
    if !args.conditions.is_empty() {
        config.conditions = args.conditions.clone();
    }
    if !args.seeds.is_empty() {
        config.mode = SearchMode::Seeds {
            seeds: args.seeds.iter().map(|&s| s as u64).collect(),
        };
    } else if args.start.is_some() || args.end.is_some() || args.upper.is_some() {
        let (start, end, upper) = match config.mode {
            SearchMode::Range48 { start, end, upper } => (start, end, upper),
            SearchMode::Seeds { .. } => (0, 1 << 20, 1),
        };
        config.mode = SearchMode::Range48 {
            start: args.start.unwrap_or(start),
            end: args.end.unwrap_or(end),
            upper: args.upper.unwrap_or(upper),
        };
    }
    config
}

fn emit(label: &str, payload: SearchPayload) -> Result<()> {
    let line = serde_json::to_string(&SearchEvent::new(label, payload))?;
    println!("{}", line);
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("seedsift=debug".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = apply_args(load_config(args.config.as_deref())?, &args);

    let fill = match args.world {
        WorldFill::Hashed => Fill::Hashed,
        WorldFill::Empty => Fill::Empty,
    };
    let oracle = Arc::new(SyntheticOracle::new(fill));
    let mut driver = SearchDriver::from_config(config, oracle, ScriptRegistry::new())?;

    log::info!(
        "Starting seedsift (mc={}, threads={}, mode={:?})",
        driver.config().mc,
        driver.config().threads,
        driver.config().mode,
    );
    emit(
        &args.label,
        SearchPayload::Started(SearchStarted {
            mc: driver.config().mc,
            threads: driver.config().threads.max(1),
            conditions: driver.tree().len(),
        }),
    )?;

    let stop = driver.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupt received, stopping search");
            stop.store(true, Ordering::Relaxed);
        }
    });

    let mut hits = driver.subscribe();
    let label = args.label.clone();
    let printer = tokio::spawn(async move {
        while let Some(hit) = hits.recv().await {
            if let Err(e) = emit(&label, SearchPayload::Hit(hit)) {
                log::warn!("failed to print hit: {}", e);
            }
        }
    });

    let report = driver.run().await?;
    printer.await.context("hit printer panicked")?;
    emit(&args.label, SearchPayload::Finished(report))
}
