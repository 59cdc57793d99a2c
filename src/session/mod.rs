//! Per-connection session loop.
//!
//! Each admitted connection runs one consumer task fed by a bounded event
//! channel. A dedicated reader task turns socket reads into `Input` events;
//! deferred view transitions and the periodic tick arrive over the same
//! channel, so everything that can change navigation state funnels through
//! one place in FIFO order. A timed transition racing user input is
//! resolved by whichever event lands first, which lets callers click past
//! a splash screen.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};
use tokio::sync::{mpsc, watch};

use crate::ansi;
use crate::logutil::escape_log;
use crate::modules::ModuleRegistry;
use crate::nodes::{Connection, Node};
use crate::server::ServerContext;
use crate::views::{ViewError, ViewManager};

/// Events delivered to a session consumer.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Decoded user bytes from the reader task.
    Input(Vec<u8>),
    /// Navigate to a view (deferred transitions land here).
    ChangeView(String),
    Disconnect,
    /// Periodic heartbeat, reserved for refresh work.
    Tick,
}

/// Bounded channel capacity; backpressure on a stuck session is preferable
/// to unbounded growth.
const EVENT_CAPACITY: usize = 10;

const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Drive a session until disconnect or server shutdown. The caller owns
/// node release and connection close.
pub async fn run_session(
    ctx: Arc<ServerContext>,
    node: Arc<Node>,
    conn: Arc<dyn Connection>,
    initial_view: &str,
    mut shutdown: watch::Receiver<bool>,
) {
    let (tx, mut rx) = mpsc::channel::<SessionEvent>(EVENT_CAPACITY);

    let registry = Arc::new(ModuleRegistry::with_builtins());
    let mut vm = ViewManager::new(ctx.clone(), registry, initial_view, tx.clone());

    let _ = conn.write(ansi::HIDE_CURSOR.as_bytes()).await;
    if !vm.current().is_empty() && !render_view(&mut vm, conn.as_ref(), &node).await {
        return;
    }

    // Blocking reader task: every successful read becomes an Input event,
    // the first failure becomes Disconnect.
    let reader_conn = conn.clone();
    let reader_tx = tx.clone();
    let reader = tokio::spawn(async move {
        let mut buf = [0u8; 1024];
        loop {
            match reader_conn.read(&mut buf).await {
                Ok(0) | Err(_) => {
                    let _ = reader_tx.send(SessionEvent::Disconnect).await;
                    return;
                }
                Ok(n) => {
                    if reader_tx
                        .send(SessionEvent::Input(buf[..n].to_vec()))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }
        }
    });

    let mut tick = tokio::time::interval(TICK_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    SessionEvent::Input(bytes) => {
                        let input = String::from_utf8_lossy(&bytes).trim().to_string();
                        debug!("session input node={} input={}", node.id, escape_log(&input));
                        match vm.handle_input(conn.as_ref(), &input, &node).await {
                            Ok(true) => {
                                if !render_view(&mut vm, conn.as_ref(), &node).await {
                                    break;
                                }
                            }
                            Ok(false) => {}
                            Err(ViewError::NotFound(name)) => {
                                if !recover_missing_view(&mut vm, conn.as_ref(), &node, &name).await {
                                    break;
                                }
                            }
                            Err(e) => error!("session input error node={} err={e}", node.id),
                        }
                    }
                    SessionEvent::ChangeView(view) => {
                        vm.push(&view);
                        if !render_view(&mut vm, conn.as_ref(), &node).await {
                            break;
                        }
                    }
                    SessionEvent::Disconnect => {
                        debug!("session disconnect node={}", node.id);
                        break;
                    }
                    SessionEvent::Tick => {}
                }
            }
            _ = tick.tick() => {
                let _ = tx.try_send(SessionEvent::Tick);
            }
            _ = shutdown.changed() => {
                debug!("session shutdown node={}", node.id);
                break;
            }
        }
    }

    reader.abort();
}

/// Render the current view, unwinding the stack on missing views. Returns
/// false when the session cannot continue.
async fn render_view(vm: &mut ViewManager, conn: &dyn Connection, node: &Node) -> bool {
    loop {
        match vm.render_current(conn, node).await {
            Ok(()) => return true,
            Err(ViewError::NotFound(name)) => {
                warn!("render failed, view missing view={name} node={}", node.id);
                let _ = conn
                    .send_line(&format!("The view '{name}' does not exist."))
                    .await;
                if vm.pop().is_none() {
                    return false;
                }
            }
            Err(e) => {
                error!("render failed view={} node={} err={e}", vm.current(), node.id);
                return true;
            }
        }
    }
}

async fn recover_missing_view(
    vm: &mut ViewManager,
    conn: &dyn Connection,
    node: &Node,
    name: &str,
) -> bool {
    warn!("view missing during input view={name} node={}", node.id);
    let _ = conn
        .send_line(&format!("The view '{name}' does not exist."))
        .await;
    if vm.pop().is_none() {
        return false;
    }
    render_view(vm, conn, node).await
}
