mod cli;
mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use activity_log::{DrainLoop, FileSink, HttpSink, Sink};
use credential_vault::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
use host_bridge::{Bridge, BridgeConfig, BridgePrompt, OriginPolicy};
use logger_session::{LoggerSession, PromptUi};

use crate::cli::Cli;
use crate::config::{SinkConfig, SinkKind, VaultConfig, VaultKind};

// ---------------------------------------------------------------------------
// Component construction
// ---------------------------------------------------------------------------

async fn open_sink(cfg: &SinkConfig) -> Result<Box<dyn Sink>> {
    let sink: Box<dyn Sink> = match cfg.kind {
        SinkKind::File => Box::new(
            FileSink::open(&cfg.path)
                .await
                .with_context(|| format!("failed to open log file {}", cfg.path.display()))?,
        ),
        SinkKind::Http => Box::new(
            HttpSink::new(&cfg.endpoint, Duration::from_secs(cfg.timeout_secs))
                .context("failed to build HTTP client")?,
        ),
    };
    Ok(sink)
}

fn open_store(cfg: &VaultConfig) -> Arc<dyn CredentialStore> {
    match cfg.kind {
        VaultKind::File => Arc::new(FileCredentialStore::new(&cfg.path)),
        VaultKind::Memory => Arc::new(MemoryCredentialStore::new()),
    }
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("failed to register SIGTERM handler")?;

        tokio::select! {
            r = tokio::signal::ctrl_c() => {
                r.context("failed to listen for ctrl-c")?;
                info!("received SIGINT (ctrl-c)");
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for ctrl-c")?;
        info!("received SIGINT (ctrl-c)");
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args.
    let cli = Cli::parse();

    // 2. Load config, then merge CLI overrides.
    let mut cfg = config::load(&cli.config)?;

    if let Some(ref path) = cli.log_file {
        cfg.sink.kind = SinkKind::File;
        cfg.sink.path = path.clone();
    }
    if let Some(ref endpoint) = cli.endpoint {
        cfg.sink.kind = SinkKind::Http;
        cfg.sink.endpoint = endpoint.clone();
    }
    if let Some(ref listen) = cli.listen {
        cfg.bridge.listen_addr = listen.clone();
    }

    // 3. Init tracing-subscriber with JSON format.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!(
        config_file = %cli.config.display(),
        realm = %cfg.realm,
        sink = ?cfg.sink.kind,
        vault = ?cfg.vault.kind,
        listen = %cfg.bridge.listen_addr,
        "tab-logger starting"
    );

    // 4. Sink and drain loop.
    let sink = open_sink(&cfg.sink).await?;
    let (queue, drain) = DrainLoop::start(sink, cfg.drain.to_drain_config());

    // 5. Credential store and logging session.
    let store = open_store(&cfg.vault);
    let prompt = Arc::new(BridgePrompt::new());
    let session = Arc::new(LoggerSession::new(
        cfg.realm.clone(),
        store,
        queue,
        Arc::clone(&prompt) as Arc<dyn PromptUi>,
    ));

    // 6. Extension bridge.
    let listen_addr: SocketAddr = cfg
        .bridge
        .listen_addr
        .parse()
        .context("invalid listen address")?;

    let bridge = Bridge::new(
        BridgeConfig {
            listen_addr,
            origins: OriginPolicy::new(cfg.bridge.origin_allowlist.clone()),
        },
        session,
        prompt,
    );

    // 7. Serve until the bridge fails or a signal arrives.
    let result = tokio::select! {
        r = bridge.run() => {
            info!("host bridge exited");
            r
        }
        r = shutdown_signal() => r,
    };

    // 8. Stop the drain loop; the sink is flushed and closed.
    info!("tab-logger shutting down");
    let stats = drain.shutdown().await;
    info!(
        written = stats.written,
        failed = stats.failed,
        dropped = stats.dropped,
        "drain loop stopped"
    );

    result
}
