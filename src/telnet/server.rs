//! Telnet listener.
//!
//! Accepts sockets, admits them into the node pool and hands them to the
//! session loop. Connections that arrive while the board is full are closed
//! without a greeting.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;

use super::connection::TelnetConnection;
use crate::nodes::Connection;
use crate::server::ServerContext;
use crate::session;

/// How long the deferred negotiation logger waits for the handshake to
/// settle before reporting.
const NEGOTIATION_DEADLINE: Duration = Duration::from_secs(2);

pub struct TelnetServer {
    ctx: Arc<ServerContext>,
    shutdown: watch::Receiver<bool>,
}

impl TelnetServer {
    pub fn new(ctx: Arc<ServerContext>, shutdown: watch::Receiver<bool>) -> Self {
        TelnetServer { ctx, shutdown }
    }

    /// Accept connections until shutdown is signalled, then drain the
    /// remaining session tasks.
    pub async fn run(&mut self) -> Result<()> {
        let port = self.ctx.config.listeners.telnet.port;
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        info!("telnet server listening port={port}");

        let mut sessions = JoinSet::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let ctx = Arc::clone(&self.ctx);
                        let shutdown = self.shutdown.clone();
                        sessions.spawn(handle_connection(ctx, stream, peer, shutdown));
                    }
                    Err(e) => {
                        error!("telnet accept error err={e}");
                    }
                },
                _ = self.shutdown.changed() => break,
            }
        }

        drop(listener);
        // Sessions observe the same shutdown signal and exit cleanly.
        while sessions.join_next().await.is_some() {}
        info!("telnet server stopped port={port}");
        Ok(())
    }
}

async fn handle_connection(
    ctx: Arc<ServerContext>,
    stream: TcpStream,
    peer: SocketAddr,
    shutdown: watch::Receiver<bool>,
) {
    let node = match ctx.nodes.acquire() {
        Ok(node) => node,
        Err(e) => {
            warn!("telnet connection rejected addr={peer} err={e}");
            return;
        }
    };
    let node_id = node.id;

    let conn = Arc::new(TelnetConnection::new(stream, peer));
    node.attach(conn.clone());
    debug!("telnet connection from addr={peer} node={node_id}");

    if let Err(e) = conn.begin_negotiation().await {
        error!("telnet negotiation failed addr={peer} err={e}");
        ctx.nodes.release(node_id);
        return;
    }
    conn.start_negotiation_logger(NEGOTIATION_DEADLINE);

    let initial_view = ctx.config.listeners.telnet.initial_view.clone();
    session::run_session(ctx.clone(), node, conn.clone(), &initial_view, shutdown).await;

    conn.close().await;
    ctx.nodes.release(node_id);
    info!("telnet connection closed addr={peer} node={node_id}");
}
