use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use archive::{HttpStorage, Registry, RestRegistry, RetryPolicy};
use clap::{Args, Parser, Subcommand};
use metrics::server::{run_metrics_server, MetricsServerConfig};
use metrics::Metrics;
use node_config::{Network, DEFAULT_BLOCK_CHANNEL_CAPACITY, DEFAULT_METRICS_PORT, DEFAULT_PAGE_LIMIT};
use orchestrator::{find_snapshot, BlockSync, SnapshotQuery, StartHeight, SyncOptions};
use replay::{Engine, FileStoreEngine};
use supervisor::{ProcessSupervisor, StartMode};
use tokio::sync::oneshot;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ksync", version, about = "Sync a node from archived block bundles instead of P2P")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply archived blocks starting after an explicit height.
    BlockSync {
        #[command(flatten)]
        sync: SyncArgs,

        /// Start after this height. 0 resumes from the engine's continuation height.
        #[arg(long, default_value_t = 0)]
        start_height: u64,
    },
    /// Apply archived blocks starting at the nearest snapshot below the target.
    HeightSync {
        #[command(flatten)]
        sync: SyncArgs,

        #[arg(long, env = "KSYNC_SNAPSHOT_POOL_ID")]
        snapshot_pool_id: u64,
    },
    /// Look up the snapshot bundle for a height.
    FindSnapshot {
        #[command(flatten)]
        registry: RegistryArgs,

        #[arg(long, env = "KSYNC_SNAPSHOT_POOL_ID")]
        snapshot_pool_id: u64,

        #[arg(long)]
        height: u64,

        /// Require a snapshot taken at exactly `--height`.
        #[arg(long)]
        exact: bool,
    },
    /// Print a pool's runtime and key range.
    PoolInfo {
        #[command(flatten)]
        registry: RegistryArgs,

        #[arg(long)]
        pool_id: u64,
    },
}

#[derive(Args, Debug)]
struct RegistryArgs {
    #[arg(long, env = "KSYNC_CHAIN_ID", default_value = "kyve-1")]
    chain_id: Network,

    /// Registry REST endpoint, overriding the chain's default.
    #[arg(long, env = "KSYNC_REGISTRY_URL")]
    registry_url: Option<String>,

    #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT)]
    page_limit: u32,

    /// Retries for transient registry and storage failures. 0 fails on the first error.
    #[arg(long, default_value_t = 0)]
    fetch_retries: u32,
}

impl RegistryArgs {
    fn retry(&self) -> RetryPolicy {
        RetryPolicy::with_retries(self.fetch_retries)
    }

    fn registry(&self) -> Result<RestRegistry> {
        let url = self
            .registry_url
            .clone()
            .unwrap_or_else(|| self.chain_id.registry_url().to_string());
        let registry = RestRegistry::new(url).context("Failed to create registry client")?;
        Ok(registry.with_retry(self.retry()))
    }
}

#[derive(Args, Debug)]
struct SyncArgs {
    #[command(flatten)]
    registry: RegistryArgs,

    /// Node home directory.
    #[arg(long, env = "KSYNC_HOME")]
    home: PathBuf,

    /// Node binary to run in a restricted mode during the sync.
    #[arg(long, env = "KSYNC_BINARY")]
    binary: Option<PathBuf>,

    /// Run the binary with P2P isolated instead of without consensus.
    #[arg(long)]
    isolated: bool,

    #[arg(long, env = "KSYNC_BLOCK_POOL_ID")]
    block_pool_id: u64,

    /// Last height to apply. 0 syncs until the archive is exhausted.
    #[arg(long, default_value_t = 0)]
    target_height: u64,

    #[arg(long, default_value_t = DEFAULT_BLOCK_CHANNEL_CAPACITY)]
    channel_capacity: usize,

    /// Storage gateway overriding the per-provider default.
    #[arg(long)]
    storage_gateway: Option<String>,

    #[arg(long)]
    metrics: bool,

    #[arg(long, default_value = "127.0.0.1")]
    metrics_address: IpAddr,

    #[arg(long, default_value_t = DEFAULT_METRICS_PORT)]
    metrics_port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Command::BlockSync { sync, start_height } => {
            let start = match start_height {
                0 => StartHeight::Continuation,
                height => StartHeight::Explicit(height),
            };
            run_sync(sync, start).await
        }
        Command::HeightSync { sync, snapshot_pool_id } => {
            run_sync(sync, StartHeight::NearestSnapshot { snapshot_pool_id }).await
        }
        Command::FindSnapshot {
            registry,
            snapshot_pool_id,
            height,
            exact,
        } => {
            let client = registry.registry()?;
            let query = if exact {
                SnapshotQuery::Exact(height)
            } else {
                SnapshotQuery::Nearest(height)
            };

            match find_snapshot(&client, snapshot_pool_id, query, registry.page_limit).await {
                Ok(location) => {
                    println!(
                        "snapshot_height={} bundle_id={}",
                        location.snapshot_height, location.bundle_id
                    );
                    Ok(())
                }
                Err(err) if err.is_not_found() => {
                    eprintln!("snapshot height not found: {err}");
                    std::process::exit(1);
                }
                Err(err) => Err(err).context("Snapshot lookup failed"),
            }
        }
        Command::PoolInfo { registry, pool_id } => {
            let pool = registry
                .registry()?
                .pool(pool_id)
                .await
                .with_context(|| format!("Failed to fetch pool {pool_id}"))?;
            println!("id={}", pool.id);
            println!("name={}", pool.data.name);
            println!("runtime={}", pool.data.runtime);
            println!("start_key={}", pool.data.start_key);
            println!("current_key={}", pool.data.current_key);
            Ok(())
        }
    }
}

async fn run_sync(args: SyncArgs, start: StartHeight) -> Result<()> {
    let registry = Arc::new(args.registry.registry()?);
    let mut storage = HttpStorage::new()
        .context("Failed to create storage client")?
        .with_retry(args.registry.retry());
    if let Some(gateway) = &args.storage_gateway {
        storage = storage.with_gateway(gateway.clone());
    }

    let mut sync = BlockSync::new(registry, storage);

    let mut metrics_server = None;
    if args.metrics {
        let metrics = Arc::new(Metrics::new());
        let config = MetricsServerConfig {
            metrics_address: args.metrics_address,
            metrics_port: args.metrics_port,
        };
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server_metrics = metrics.clone();
        let handle = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.await;
            };
            if let Err(err) = run_metrics_server(config, server_metrics, shutdown).await {
                error!(error = %err, "Metrics server exited");
            }
        });
        metrics_server = Some((shutdown_tx, handle));
        sync = sync.with_metrics(metrics);
    }

    if let Some(binary) = &args.binary {
        let mode = if args.isolated {
            StartMode::IsolatedNetwork
        } else {
            StartMode::DatabaseOnly
        };
        sync = sync.with_supervisor(ProcessSupervisor::new(binary, &args.home), mode);
    }

    let options = SyncOptions {
        start,
        target_height: (args.target_height > 0).then_some(args.target_height),
        page_limit: args.registry.page_limit,
        channel_capacity: args.channel_capacity,
        ..SyncOptions::new(&args.home, args.block_pool_id)
    };

    info!(
        chain_id = %args.registry.chain_id,
        home = %args.home.display(),
        block_pool_id = args.block_pool_id,
        "Starting ksync"
    );

    let engines: Vec<Box<dyn Engine>> = vec![Box::new(FileStoreEngine::new())];
    let result = sync.run(&options, engines).await;

    if let Some((shutdown_tx, handle)) = metrics_server {
        let _ = shutdown_tx.send(());
        let _ = handle.await;
    }

    let report = result.context("Block sync failed")?;

    println!(
        "synced engine={} start_height={} last_applied={} blocks_applied={}",
        report.engine,
        report.start_height,
        report
            .last_applied_height
            .map_or_else(|| "none".to_string(), |height| height.to_string()),
        report.blocks_applied
    );
    Ok(())
}
