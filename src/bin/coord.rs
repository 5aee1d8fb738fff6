//! Coordinator binary

use clap::{Parser, Subcommand};
use shardmigrate::common::{spawn_reloader, Config, RuntimeConfig, StoreBackend};
use shardmigrate::coordinator::http::{self, AdminState};
use shardmigrate::coordinator::{Coordinator, DryRunDelegate, ShutdownHooks, StaticMembers};
use shardmigrate::store;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "shardmigrate-coord")]
#[command(about = "Bucket migration coordinator for sharded clusters")]
#[command(version = shardmigrate::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the coordinator for every member listed in the config
    Serve {
        /// TOML config file (re-read periodically for hot-reloadable values)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Service root in the coordination store
        #[arg(long)]
        service: Option<String>,

        /// Directory backing the fs coordination store
        #[arg(long)]
        store_root: Option<PathBuf>,

        /// Bind address for the admin HTTP API
        #[arg(long)]
        admin: Option<SocketAddr>,

        /// Log every action/status transition
        #[arg(long)]
        trace: bool,
    },

    /// Validate a config file and print the effective configuration
    CheckConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config: config_path,
            service,
            store_root,
            admin,
            trace,
        } => {
            // Load config from file, then override with CLI arguments
            let mut config = Config::load(config_path.as_deref())?;
            if let Some(service) = service {
                config.service_name = service;
            }
            if let Some(root) = store_root {
                config.store.backend = StoreBackend::Fs;
                config.store.root = root;
            }
            if admin.is_some() {
                config.admin.bind_addr = admin;
            }
            if trace {
                config.trace_transitions = true;
            }
            config.validate()?;

            init_tracing(&config.log_level);
            serve(config, config_path).await?;
        }
        Commands::CheckConfig {
            config: config_path,
        } => {
            let config = Config::load(config_path.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn init_tracing(log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(config: Config, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    if config.members.is_empty() {
        tracing::warn!("No local members configured; coordinator will idle");
    }
    tracing::warn!("No migration engine wired in; using the dry-run delegate");

    let runtime = Arc::new(RuntimeConfig::new(config.trace_transitions));
    let store = store::open(&config.store)?;

    let mut coordinator = Coordinator::builder(config.service_name.clone(), store)
        .delegate(Arc::new(DryRunDelegate))
        .members(Arc::new(StaticMembers::new(config.local_members())))
        .runtime(runtime.clone())
        .watcher(config.watcher.clone())
        .build()?;
    coordinator.start().await?;

    let shutdown = coordinator.shutdown_signal();
    let mut background = Vec::new();

    if let Some(path) = config_path {
        background.push(spawn_reloader(
            path,
            runtime,
            config.reload_interval(),
            shutdown.clone(),
        ));
    }

    if let Some(addr) = config.admin.bind_addr {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("  Admin API: {}", addr);
        let state = AdminState {
            service_name: config.service_name.clone(),
            members: coordinator.members(),
        };
        let signal = shutdown.clone();
        background.push(tokio::spawn(async move {
            if let Err(e) = http::serve(listener, state, signal).await {
                tracing::error!("Admin server error: {}", e);
            }
        }));
    }

    let mut hooks = ShutdownHooks::new();
    coordinator.register_shutdown(&mut hooks);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    hooks.run_all().await;

    let grace = config.watcher.shutdown_timeout();
    for task in background {
        if tokio::time::timeout(grace, task).await.is_err() {
            tracing::warn!("Background task did not stop within {:?}", grace);
        }
    }
    Ok(())
}
