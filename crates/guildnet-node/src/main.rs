//! guildnet-node — the coordination-layer daemon.
//!
//! Startup sequence:
//!   1. Resolve configuration (environment + flags); fatal errors exit non-zero
//!   2. Open the state database
//!   3. Build the lifecycle engine and, if a signer key is present, the relayer
//!   4. Spawn the chain indexer streams, the deadline sweeper, and the RPC server
//!   5. Wait for ctrl-c, then shut the workers down cooperatively

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use guildnet_core::clock::SystemClock;
use guildnet_core::config::Config;
use guildnet_core::constants::{TYPED_DATA_DOMAIN_NAME, TYPED_DATA_DOMAIN_VERSION};
use guildnet_crypto::EthKeyPair;
use guildnet_indexer::{ChainStream, HttpChainClient, StreamScanner};
use guildnet_lifecycle::{run_sweeper, MissionEngine};
use guildnet_relayer::{SigningRelayer, TypedDomain};
use guildnet_rpc::{RpcServer, RpcServerState};
use guildnet_state::StateDb;

#[derive(Parser, Debug)]
#[command(
    name = "guildnet-node",
    version,
    about = "Guildnet node — off-chain coordination for the agent labor market"
)]
struct Args {
    /// Directory for the persistent state database. Overrides DB_URL.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// JSON-RPC listen address.
    #[arg(long, default_value = "127.0.0.1:8791")]
    rpc_addr: SocketAddr,

    /// Skip the chain indexer streams (API-only deployments).
    #[arg(long, default_value_t = false)]
    no_indexer: bool,

    /// On a large cursor gap, jump to head minus the safe lookback instead
    /// of replaying history.
    #[arg(long, default_value_t = true)]
    realtime: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,guildnet=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let mut config = Config::from_env().context("resolving configuration")?;
    if let Some(dir) = &args.data_dir {
        config.db_url = dir.display().to_string();
    }
    info!(db = %config.db_url, chain_id = config.chain_id, "guildnet node starting");

    // ── State database ────────────────────────────────────────────────────────
    let db = Arc::new(StateDb::open(&config.db_url).context("opening state database")?);
    let clock = Arc::new(SystemClock);

    // ── Lifecycle engine ──────────────────────────────────────────────────────
    let engine = Arc::new(MissionEngine::new(
        Arc::clone(&db),
        clock.clone(),
        config.clone(),
    ));

    // ── Signing relayer (optional) ────────────────────────────────────────────
    let relayer = match &config.signer_key {
        Some(key_hex) => {
            let signer = EthKeyPair::from_hex(key_hex)
                .map_err(|e| anyhow::anyhow!("parsing SIGNER_KEY: {e}"))?;
            info!(signer = %signer.address, "signing relayer enabled");
            Some(Arc::new(SigningRelayer::new(
                Arc::clone(&db),
                clock.clone(),
                signer,
                TypedDomain {
                    name: TYPED_DATA_DOMAIN_NAME.to_string(),
                    version: TYPED_DATA_DOMAIN_VERSION.to_string(),
                    chain_id: config.chain_id,
                    verifying_contract: config.manager_address,
                },
                config.max_escrow,
                config.rate_limit_per_minute,
            )))
        }
        None => {
            warn!("SIGNER_KEY not set — signing relayer disabled");
            None
        }
    };

    // ── Shutdown signal ───────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Chain indexer streams ─────────────────────────────────────────────────
    if args.no_indexer {
        warn!("indexer disabled by flag");
    } else {
        let client = Arc::new(
            HttpChainClient::new(&config.chain_rpc_url)
                .map_err(|e| anyhow::anyhow!("building chain client: {e}"))?,
        );
        for (stream, contract) in [
            (ChainStream::AgentRegistry, config.registry_address),
            (ChainStream::Manager, config.manager_address),
        ] {
            let scanner = StreamScanner::new(
                stream,
                contract,
                Arc::clone(&client),
                Arc::clone(&db),
                clock.clone(),
                args.realtime,
            );
            tokio::spawn(scanner.run(shutdown_rx.clone()));
        }
    }

    // ── Deadline sweeper ──────────────────────────────────────────────────────
    tokio::spawn(run_sweeper(Arc::clone(&engine), shutdown_rx.clone()));

    // ── RPC server ────────────────────────────────────────────────────────────
    let rpc_state = Arc::new(RpcServerState {
        db: Arc::clone(&db),
        engine: Arc::clone(&engine),
        relayer,
    });
    let rpc_handle = RpcServer::new(rpc_state)
        .start(args.rpc_addr)
        .await
        .context("starting RPC server")?;

    info!("node ready");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;

    info!("shutting down");
    let _ = shutdown_tx.send(true);
    let _ = rpc_handle.stop();
    db.flush().context("final flush")?;
    Ok(())
}
