//! SSH transport.
//!
//! Wraps russh's callback-driven server into the same [`Connection`]
//! surface the telnet side exposes. Inbound channel data is pumped into a
//! queue the session reader drains; writes go straight out through the
//! session handle. Password authentication is delegated to the user store,
//! and the authenticated user is bound to the node before the session
//! starts.

use std::net::SocketAddr;
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use log::{debug, error, info, warn};
use russh::server::{Auth, Handle, Msg, Server as _, Session};
use russh::{Channel, ChannelId, CryptoVec, Pty};
use tokio::sync::{mpsc, watch, Mutex};

use crate::nodes::{Connection, TerminalInfo};
use crate::server::ServerContext;
use crate::session;
use crate::store::User;

/// Queue depth between russh's data callback and the session reader.
const DATA_QUEUE: usize = 32;

pub struct SshServer {
    ctx: Arc<ServerContext>,
    shutdown: watch::Receiver<bool>,
}

impl SshServer {
    pub fn new(ctx: Arc<ServerContext>, shutdown: watch::Receiver<bool>) -> Self {
        SshServer { ctx, shutdown }
    }

    /// Listen until shutdown is signalled. Sessions observe the same
    /// signal and unwind on their own.
    pub async fn run(&mut self) -> Result<()> {
        let cfg = &self.ctx.config.listeners.ssh;
        let key = russh_keys::load_secret_key(&cfg.key_file, None)
            .with_context(|| format!("failed to load SSH host key {}", cfg.key_file))?;

        let config = Arc::new(russh::server::Config {
            auth_rejection_time: Duration::from_secs(1),
            keys: vec![key],
            ..Default::default()
        });

        info!("ssh server listening port={}", cfg.port);
        let mut listener = SshListener {
            ctx: self.ctx.clone(),
            shutdown: self.shutdown.clone(),
        };

        let port = cfg.port;
        tokio::select! {
            result = listener.run_on_address(config, ("0.0.0.0", port)) => {
                result.context("ssh server terminated")?;
            }
            _ = self.shutdown.changed() => {}
        }
        info!("ssh server stopped port={port}");
        Ok(())
    }
}

struct SshListener {
    ctx: Arc<ServerContext>,
    shutdown: watch::Receiver<bool>,
}

impl russh::server::Server for SshListener {
    type Handler = SshHandler;

    fn new_client(&mut self, peer: Option<SocketAddr>) -> SshHandler {
        SshHandler {
            ctx: self.ctx.clone(),
            shutdown: self.shutdown.clone(),
            peer: peer.unwrap_or_else(|| "0.0.0.0:0".parse().expect("static addr")),
            user: None,
            conn: None,
            data_tx: None,
        }
    }
}

pub struct SshHandler {
    ctx: Arc<ServerContext>,
    shutdown: watch::Receiver<bool>,
    peer: SocketAddr,
    user: Option<User>,
    conn: Option<Arc<SshConnection>>,
    data_tx: Option<mpsc::Sender<Vec<u8>>>,
}

#[async_trait]
impl russh::server::Handler for SshHandler {
    type Error = anyhow::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        match self.ctx.store.authenticate(user, password).await {
            Ok(found) => {
                self.user = Some(found);
                Ok(Auth::Accept)
            }
            Err(e) => {
                debug!("ssh login failed user={user} err={e}");
                Ok(Auth::Reject {
                    proceed_with_methods: None,
                })
            }
        }
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let (tx, rx) = mpsc::channel(DATA_QUEUE);
        self.data_tx = Some(tx);
        self.conn = Some(Arc::new(SshConnection::new(
            session.handle(),
            channel.id(),
            self.peer,
            rx,
        )));
        Ok(true)
    }

    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(conn) = &self.conn {
            conn.set_terminal(term, col_width as u16, row_height as u16);
        }
        session.channel_success(channel);
        Ok(())
    }

    async fn window_change_request(
        &mut self,
        _channel: ChannelId,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(conn) = &self.conn {
            conn.set_dimensions(col_width as u16, row_height as u16);
        }
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        session.channel_success(channel);

        let Some(conn) = self.conn.clone() else {
            return Ok(());
        };
        let ctx = self.ctx.clone();
        let user = self.user.clone();
        let shutdown = self.shutdown.clone();
        let peer = self.peer;

        tokio::spawn(async move {
            let node = match ctx.nodes.acquire() {
                Ok(node) => node,
                Err(e) => {
                    warn!("ssh connection rejected addr={peer} err={e}");
                    conn.close().await;
                    return;
                }
            };
            let node_id = node.id;
            node.attach(conn.clone());
            if let Some(user) = user {
                node.set_user(user);
            }

            let tinfo = conn.terminal_info();
            info!(
                "ssh connection established addr={peer} node={node_id} user={} term={} window={}x{}",
                node.username(),
                tinfo.term_type,
                tinfo.width,
                tinfo.height
            );

            let initial_view = ctx.config.listeners.ssh.initial_view.clone();
            session::run_session(ctx.clone(), node, conn.clone(), &initial_view, shutdown).await;

            conn.close().await;
            ctx.nodes.release(node_id);
            info!("ssh connection closed addr={peer} node={node_id}");
        });

        Ok(())
    }

    async fn data(
        &mut self,
        _channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(tx) = &self.data_tx {
            if tx.send(data.to_vec()).await.is_err() {
                error!("ssh session queue closed addr={}", self.peer);
            }
        }
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        _channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        // Dropping the sender wakes the session reader with EOF.
        self.data_tx = None;
        Ok(())
    }

    async fn channel_close(
        &mut self,
        _channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.data_tx = None;
        Ok(())
    }
}

struct RxState {
    rx: mpsc::Receiver<Vec<u8>>,
    pending: BytesMut,
}

/// Adapts one SSH channel to the [`Connection`] capability surface.
pub struct SshConnection {
    handle: Handle,
    channel: ChannelId,
    peer: SocketAddr,
    read: Mutex<RxState>,
    info: StdRwLock<TerminalInfo>,
}

impl SshConnection {
    fn new(
        handle: Handle,
        channel: ChannelId,
        peer: SocketAddr,
        rx: mpsc::Receiver<Vec<u8>>,
    ) -> Self {
        SshConnection {
            handle,
            channel,
            peer,
            read: Mutex::new(RxState {
                rx,
                pending: BytesMut::new(),
            }),
            info: StdRwLock::new(TerminalInfo::default()),
        }
    }

    fn set_terminal(&self, term: &str, width: u16, height: u16) {
        let mut info = self.info.write().expect("terminal info lock poisoned");
        info.term_type = term.to_string();
        info.width = width;
        info.height = height;
    }

    fn set_dimensions(&self, width: u16, height: u16) {
        let mut info = self.info.write().expect("terminal info lock poisoned");
        info.width = width;
        info.height = height;
    }
}

#[async_trait]
impl Connection for SshConnection {
    async fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut state = self.read.lock().await;
        if state.pending.is_empty() {
            match state.rx.recv().await {
                Some(chunk) => state.pending.extend_from_slice(&chunk),
                None => return Ok(0),
            }
        }
        let n = buf.len().min(state.pending.len());
        buf[..n].copy_from_slice(&state.pending[..n]);
        state.pending.advance(n);
        Ok(n)
    }

    async fn write(&self, data: &[u8]) -> std::io::Result<usize> {
        self.handle
            .data(self.channel, CryptoVec::from_slice(data))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "ssh channel closed"))?;
        Ok(data.len())
    }

    async fn send_line(&self, msg: &str) -> std::io::Result<()> {
        let mut line = msg.as_bytes().to_vec();
        line.extend_from_slice(b"\r\n");
        self.write(&line).await.map(|_| ())
    }

    async fn close(&self) {
        let _ = self.handle.close(self.channel).await;
    }

    fn remote_addr(&self) -> SocketAddr {
        self.peer
    }

    fn terminal_info(&self) -> TerminalInfo {
        self.info.read().expect("terminal info lock poisoned").clone()
    }

    /// SSH clients are modern terminals; art is transcoded to UTF-8.
    fn is_utf8(&self) -> bool {
        true
    }
}
