//! Venue Profiler
//!
//! Main entry point.
//!
//! Subcommands:
//! - discover: scan factories, enrich volumes, apply coverage, write the
//!   venue universe, discovery summary, venue CSV and tracked-contract list
//! - backfill: decode and profile a fixed block range
//! - tail: follow the chain head, optionally refreshing the universe
//!
//! backfill / tail reuse the universe file from a previous `discover` when
//! present and run discovery first otherwise. Profiles are written on exit,
//! including after Ctrl-C.
//!
//! Author: AI-Generated
//! Created: 2026-10-19

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use venue_profiler::config::EngineConfig;
use venue_profiler::discovery::{
    build_providers, save_discovery_outputs, spawn_universe_refresh, DiscoveryRunner, UniverseHandle,
    VenueUniverse,
};
use venue_profiler::logging::init_tracing;
use venue_profiler::pipeline::Pipeline;
use venue_profiler::profile::{
    load_profiles, save_profiles, InMemoryProfileStore, ProfileEngine, ProfileStore, RuleSet,
};
use venue_profiler::registry::{FactoryRegistry, SelectorRegistry};
use venue_profiler::retry::RetryPolicy;
use venue_profiler::{ChainSource, RpcChainSource, TransactionDecoder};

/// DeFi venue discovery and user behavior profiling
#[derive(Parser)]
#[command(name = "venue-profiler", version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "VENUE_PROFILER_CONFIG", default_value = "config/venue_profiler.toml")]
    config: PathBuf,

    /// Log level or full filter directive
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the venue universe and export it
    Discover,
    /// Profile a fixed block range
    Backfill {
        #[arg(long)]
        start_block: u64,
        #[arg(long)]
        end_block: u64,
        /// Run discovery even when a universe file exists
        #[arg(long)]
        rediscover: bool,
        /// Continue from the existing profile snapshot
        #[arg(long)]
        resume: bool,
    },
    /// Follow the chain head until Ctrl-C
    Tail {
        /// First block to process (default: the first confirmed block)
        #[arg(long)]
        start_block: Option<u64>,
        #[arg(long)]
        rediscover: bool,
        #[arg(long)]
        resume: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.json_logs);

    info!("Venue Profiler starting");
    let config = EngineConfig::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;
    info!("RPC URL: {}", config.node.rpc_url.chars().take(40).collect::<String>());

    let registry = Arc::new(
        FactoryRegistry::new(config.factories.clone(), config.core_contracts.clone())
            .context("Invalid factory / core contract tables")?,
    );
    let chain: Arc<dyn ChainSource> = Arc::new(
        RpcChainSource::connect_http(&config.node.rpc_url, Duration::from_secs(config.node.request_timeout_secs))
            .context("Failed to build RPC client")?,
    );
    let providers = build_providers(&config.enrichment).context("Failed to build volume providers")?;
    let runner = Arc::new(DiscoveryRunner::new(chain.clone(), registry.clone(), providers, &config));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl-C received, finishing current block and shutting down");
                cancel.cancel();
            }
        });
    }

    match args.command {
        Command::Discover => {
            let universe = discover(&runner, &registry, &config, &cancel).await?;
            info!("Discovery complete: {} venues", universe.len());
        }
        Command::Backfill {
            start_block,
            end_block,
            rediscover,
            resume,
        } => {
            if start_block > end_block {
                anyhow::bail!("--start-block {} is after --end-block {}", start_block, end_block);
            }
            let universe = load_or_discover(&runner, &registry, &config, rediscover, &cancel).await?;
            let pipeline = build_pipeline(chain, UniverseHandle::new(universe), &config, resume)?;

            let result = pipeline.run_historical(start_block, end_block, &cancel).await;
            finish(pipeline.engine(), &config, result.map(|_| ()))?;
        }
        Command::Tail {
            start_block,
            rediscover,
            resume,
        } => {
            let universe = load_or_discover(&runner, &registry, &config, rediscover, &cancel).await?;
            let handle = UniverseHandle::new(universe);

            let refresh = config.pipeline.universe_refresh_secs.map(|secs| {
                info!("Universe refresh every {}s", secs);
                spawn_universe_refresh(runner.clone(), handle.clone(), Duration::from_secs(secs), cancel.clone())
            });

            let pipeline = build_pipeline(chain, handle, &config, resume)?;
            let result = pipeline.run_live(start_block, &cancel).await;

            cancel.cancel();
            if let Some(task) = refresh {
                if let Err(e) = task.await {
                    error!("Universe refresh task failed: {}", e);
                }
            }
            finish(pipeline.engine(), &config, result.map(|_| ()))?;
        }
    }

    info!("Venue Profiler stopped");
    Ok(())
}

async fn discover(
    runner: &DiscoveryRunner,
    registry: &FactoryRegistry,
    config: &EngineConfig,
    cancel: &CancellationToken,
) -> Result<VenueUniverse> {
    let (universe, report) = runner.run(cancel).await.context("Venue discovery failed")?;
    if report.scan.is_partial() {
        warn!(
            "Universe built from a partial scan ({} failed chunks)",
            report.scan.failed_chunks.len()
        );
    }
    save_discovery_outputs(&universe, &report, &config.output)
        .with_context(|| format!("Failed to write discovery outputs next to {}", config.output.universe_path))?;
    registry
        .export_contract_list(&config.output.contract_list_path)
        .with_context(|| format!("Failed to write contract list to {}", config.output.contract_list_path))?;
    Ok(universe)
}

async fn load_or_discover(
    runner: &DiscoveryRunner,
    registry: &FactoryRegistry,
    config: &EngineConfig,
    rediscover: bool,
    cancel: &CancellationToken,
) -> Result<VenueUniverse> {
    let path = Path::new(&config.output.universe_path);
    if !rediscover && path.exists() {
        return VenueUniverse::load_json(path)
            .with_context(|| format!("Failed to load universe from {}", path.display()));
    }
    discover(runner, registry, config, cancel).await
}

fn build_pipeline(
    chain: Arc<dyn ChainSource>,
    universe: UniverseHandle,
    config: &EngineConfig,
    resume: bool,
) -> Result<Pipeline> {
    let selectors = SelectorRegistry::with_extra(&config.signatures).context("Invalid [[signature]] table")?;
    info!("Selector table: {} signatures", selectors.len());
    let rules = RuleSet::from_config(&config.profile, &config.rules).context("Invalid [[rule]] table")?;

    let store: Arc<dyn ProfileStore> = Arc::new(InMemoryProfileStore::new());
    let engine = ProfileEngine::new(
        store,
        rules,
        config.pipeline.replay_policy,
        config.pipeline.dedupe_capacity,
    );
    // Profiles and the dedupe window, so an overlapping range is not counted twice
    let profiles_path = Path::new(&config.output.profiles_path);
    if resume && profiles_path.exists() {
        load_profiles(&engine, profiles_path)
            .with_context(|| format!("Failed to resume from {}", profiles_path.display()))?;
    }

    let pipeline = Pipeline::new(
        chain,
        universe,
        Arc::new(TransactionDecoder::new(Arc::new(selectors))),
        Arc::new(engine),
        config.pipeline.clone(),
        RetryPolicy::from_config(&config.node),
    );
    Ok(pipeline)
}

/// Write profiles whatever the run outcome, then surface the run error.
fn finish(engine: &ProfileEngine, config: &EngineConfig, run: venue_profiler::Result<()>) -> Result<()> {
    save_profiles(engine, &config.output.profiles_path)
        .with_context(|| format!("Failed to write profiles to {}", config.output.profiles_path))?;
    run.context("Pipeline stopped with an error")
}
