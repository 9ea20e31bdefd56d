//! courier-server: presence-aware chat and notification delivery.
//!
//! Authenticates WebSocket upgrades against an auth service (or a static
//! token table), then routes chat frames and notifications to online users.

use clap::Parser;
use courier_server::auth::{Authenticator, RemoteAuthenticator, StaticAuthenticator};
use courier_server::config::{Overrides, ServerConfig};
use courier_server::store::{MemoryStore, MessageStore, Seed};
use courier_server::CourierServer;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// courier-server — real-time message delivery
#[derive(Parser, Debug)]
#[command(name = "courier-server", version, about = "Real-time chat delivery server")]
struct Cli {
    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Config file path
    #[arg(long, default_value = "~/.courier/config.toml")]
    config: String,

    /// JSON seed file for the in-memory store (users, follows, groups)
    #[arg(long)]
    seed: Option<String>,

    /// Base URL of the auth service
    #[arg(long, env = "COURIER_AUTH_URL")]
    auth_url: Option<String>,

    /// Base URL of a remote notification service
    #[arg(long, env = "COURIER_NOTIFICATION_URL")]
    notification_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting courier-server");

    // Load server config (file + CLI overrides)
    let config_path = PathBuf::from(&cli.config);
    let config = match ServerConfig::load(
        Some(&config_path),
        Overrides {
            port: cli.port,
            bind: cli.bind,
            auth_url: cli.auth_url,
            notification_url: cli.notification_url,
            seed: cli.seed,
        },
    ) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let authenticator: Arc<dyn Authenticator> = match &config.auth.url {
        Some(url) => match RemoteAuthenticator::new(
            url,
            config.auth.request_timeout,
            config.auth.cache_ttl,
        ) {
            Ok(auth) => {
                info!(url = %url, "verifying tokens with auth service");
                Arc::new(auth)
            }
            Err(e) => {
                error!(error = %e, "failed to create auth client");
                std::process::exit(1);
            }
        },
        None => {
            let auth = StaticAuthenticator::new(config.auth.tokens.clone());
            if auth.is_empty() {
                warn!("no auth service and no static tokens configured; every upgrade will be refused");
            } else {
                info!(tokens = auth.len(), "using static token table");
            }
            Arc::new(auth)
        }
    };

    let store: Arc<dyn MessageStore> = match &config.seed_path {
        Some(path) => match Seed::from_path(path) {
            Ok(seed) => Arc::new(MemoryStore::from_seed(seed)),
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to load seed");
                std::process::exit(1);
            }
        },
        None => Arc::new(MemoryStore::new()),
    };

    // Create server
    let server = match CourierServer::new(config, store, authenticator) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to create server");
            std::process::exit(1);
        }
    };
    let mut handle = match server.start().await {
        Ok(h) => h,
        Err(e) => {
            error!(error = %e, "failed to start server");
            std::process::exit(1);
        }
    };

    // Run until shutdown signal
    tokio::select! {
        _ = handle.closed() => {
            warn!("accept loop ended");
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    handle.shutdown().await;
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
