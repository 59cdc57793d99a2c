//! Server supervision.
//!
//! Boot builds a [`ServerContext`] (configuration, user store, node pool)
//! and the run loop supervises one task per enabled listener. Hot reload is
//! a controlled restart: stop listeners, reload configuration, start again.
//! A failed reload keeps the previous context so a bad edit never takes
//! the board down. In-flight sessions hold their Arc to the old context
//! until they end.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use crate::ansi;
use crate::config::Config;
use crate::logutil;
use crate::nodes::NodeRegistry;
use crate::ssh::SshServer;
use crate::store::Store;
use crate::telnet::TelnetServer;

/// Immutable-per-run handles threaded through listeners and sessions.
pub struct ServerContext {
    pub config: Config,
    pub store: Store,
    pub nodes: NodeRegistry,
}

/// Load configuration and assemble a fresh context.
pub async fn boot(config_path: &str) -> Result<Arc<ServerContext>> {
    let config = Config::load(config_path).await.with_context(|| {
        format!(
            "could not boot from {config_path}; set --config or EUPHIO_CONFIG, \
             or run `euphio init` to scaffold one"
        )
    })?;

    logutil::init_logging(&config.loggers, false);

    tokio::fs::create_dir_all(&config.paths.data)
        .await
        .with_context(|| format!("failed to create data path {}", config.paths.data))?;
    let store = Store::open(&config.paths.data).await?;
    let nodes = NodeRegistry::new(config.max_nodes());

    info!("loaded configuration file={config_path}");
    Ok(Arc::new(ServerContext {
        config,
        store,
        nodes,
    }))
}

/// Run the board until SIGINT/SIGTERM. Restarts the listener set whenever
/// a watched configuration file changes (if hot reload is enabled).
pub async fn run(config_path: &str) -> Result<()> {
    let mut ctx = boot(config_path).await?;
    print_boot_banner(&ctx).await;

    let (restart_tx, mut restart_rx) = mpsc::channel::<()>(1);

    loop {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let _watcher = if ctx.config.general.hot_reload {
            match spawn_watcher(&ctx, restart_tx.clone()) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    error!("failed to watch config files err={e}");
                    None
                }
            }
        } else {
            None
        };

        let mut listeners = JoinSet::new();
        let telnet_enabled = ctx.config.listeners.telnet.enabled;
        let ssh_enabled = ctx.config.listeners.ssh.enabled;

        if telnet_enabled {
            let mut server = TelnetServer::new(ctx.clone(), shutdown_rx.clone());
            listeners.spawn(async move {
                if let Err(e) = server.run().await {
                    error!("telnet server stopped err={e}");
                }
            });
        }
        if ssh_enabled {
            let mut server = SshServer::new(ctx.clone(), shutdown_rx.clone());
            listeners.spawn(async move {
                if let Err(e) = server.run().await {
                    error!("ssh server stopped err={e}");
                }
            });
        }
        if !telnet_enabled && !ssh_enabled {
            warn!("no listeners enabled");
        }

        tokio::select! {
            _ = shutdown_signal() => {
                info!("shutting down");
                let _ = shutdown_tx.send(true);
                while listeners.join_next().await.is_some() {}
                return Ok(());
            }
            Some(()) = restart_rx.recv() => {
                info!("configuration changed, restarting listeners");
                let _ = shutdown_tx.send(true);
                while listeners.join_next().await.is_some() {}
                match boot(config_path).await {
                    Ok(new_ctx) => ctx = new_ctx,
                    Err(e) => {
                        error!("reload failed, keeping previous configuration err={e:#}");
                    }
                }
            }
        }
    }
}

/// Watch every loaded configuration file; writes trigger a restart. The
/// returned watcher must stay alive for the callbacks to fire.
fn spawn_watcher(ctx: &ServerContext, restart_tx: mpsc::Sender<()>) -> Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) if event.kind.is_modify() => {
                // A restart is already pending when try_send fails; fine.
                let _ = restart_tx.try_send(());
            }
            Ok(_) => {}
            Err(e) => error!("config watcher error err={e}"),
        }
    })?;

    for path in &ctx.config.loaded_files {
        match watcher.watch(path, RecursiveMode::NonRecursive) {
            Ok(()) => debug!("watching config file file={}", path.display()),
            Err(e) => error!("failed to watch config file file={} err={e}", path.display()),
        }
    }
    Ok(watcher)
}

async fn print_boot_banner(ctx: &ServerContext) {
    match ansi::compose_art(&ctx.config, crate::VERSION, "boot", true, HashMap::new()).await {
        Ok(bytes) => print!("{}", String::from_utf8_lossy(&bytes)),
        Err(e) => debug!("no boot banner err={e}"),
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("sigterm handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
