//! Navigation behavior of the view state machine, driven through the same
//! surfaces a live session uses.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use euphio::config::Config;
use euphio::modules::ModuleRegistry;
use euphio::nodes::{Connection, NodeRegistry, TerminalInfo};
use euphio::server::ServerContext;
use euphio::session::SessionEvent;
use euphio::store::Store;
use euphio::views::{ViewError, ViewManager};
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

/// A connection double that records writes and has nothing to read.
struct RecordingConnection {
    written: Mutex<Vec<u8>>,
}

impl RecordingConnection {
    fn new() -> Self {
        RecordingConnection {
            written: Mutex::new(Vec::new()),
        }
    }

    async fn written(&self) -> Vec<u8> {
        self.written.lock().await.clone()
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    async fn read(&self, _buf: &mut [u8]) -> std::io::Result<usize> {
        Ok(0)
    }

    async fn write(&self, data: &[u8]) -> std::io::Result<usize> {
        self.written.lock().await.extend_from_slice(data);
        Ok(data.len())
    }

    async fn send_line(&self, msg: &str) -> std::io::Result<()> {
        let mut line = msg.as_bytes().to_vec();
        line.extend_from_slice(b"\r\n");
        self.write(&line).await.map(|_| ())
    }

    async fn close(&self) {}

    fn remote_addr(&self) -> SocketAddr {
        "127.0.0.1:49999".parse().unwrap()
    }

    fn terminal_info(&self) -> TerminalInfo {
        TerminalInfo::default()
    }

    fn is_utf8(&self) -> bool {
        true
    }
}

async fn context_from_views(views_yaml: &str) -> (Arc<ServerContext>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.views = serde_yaml::from_str(views_yaml).unwrap();
    let store = Store::open(dir.path().to_str().unwrap()).await.unwrap();
    let ctx = Arc::new(ServerContext {
        nodes: NodeRegistry::new(config.max_nodes()),
        config,
        store,
    });
    (ctx, dir)
}

fn manager(
    ctx: Arc<ServerContext>,
    initial: &str,
) -> (ViewManager, mpsc::Receiver<SessionEvent>) {
    let (tx, rx) = mpsc::channel(10);
    let vm = ViewManager::new(ctx, Arc::new(ModuleRegistry::with_builtins()), initial, tx);
    (vm, rx)
}

const NAV_VIEWS: &str = r#"
welcome:
  next: menu
menu:
  actions:
    "1": bbs
    "b": BACK
bbs:
  actions:
    "b": BACK
"#;

#[tokio::test]
async fn any_key_then_action_then_back() {
    let (ctx, _dir) = context_from_views(NAV_VIEWS).await;
    let node = ctx.nodes.acquire().unwrap();
    let conn = RecordingConnection::new();
    let (mut vm, _rx) = manager(ctx.clone(), "welcome");

    assert_eq!(vm.current(), "welcome");

    // Any key advances a delay-0 next.
    let handled = vm.handle_input(&conn, "x", &node).await.unwrap();
    assert!(handled);
    assert_eq!(vm.current(), "menu");

    // Mapped action pushes its target.
    let handled = vm.handle_input(&conn, "1", &node).await.unwrap();
    assert!(handled);
    assert_eq!(vm.current(), "bbs");

    // BACK pops to the previous view.
    let handled = vm.handle_input(&conn, "b", &node).await.unwrap();
    assert!(handled);
    assert_eq!(vm.current(), "menu");

    // Unmapped input is left unhandled.
    let handled = vm.handle_input(&conn, "zzz", &node).await.unwrap();
    assert!(!handled);
}

#[tokio::test]
async fn rendering_unknown_view_is_an_error() {
    let (ctx, _dir) = context_from_views("{}").await;
    let node = ctx.nodes.acquire().unwrap();
    let conn = RecordingConnection::new();
    let (mut vm, _rx) = manager(ctx, "ghost");

    let err = vm.render_current(&conn, &node).await.unwrap_err();
    assert!(matches!(err, ViewError::NotFound(name) if name == "ghost"));
}

#[tokio::test]
async fn clear_screen_and_cursor_flags_emit_sequences() {
    let (ctx, _dir) = context_from_views(
        "home:\n  clearScreen: true\n  hideCursor: true\n",
    )
    .await;
    let node = ctx.nodes.acquire().unwrap();
    let conn = RecordingConnection::new();
    let (mut vm, _rx) = manager(ctx, "home");

    vm.render_current(&conn, &node).await.unwrap();
    let written = conn.written().await;
    let text = String::from_utf8_lossy(&written);
    assert!(text.starts_with("\x1b[2J\x1b[H"));
    assert!(text.contains("\x1b[?25l"));
}

#[tokio::test]
async fn timed_transition_posts_change_view_event() {
    let (ctx, _dir) = context_from_views(
        "splash:\n  next:\n    view: menu\n    delay: 20\nmenu: {}\n",
    )
    .await;
    let node = ctx.nodes.acquire().unwrap();
    let conn = RecordingConnection::new();
    let (mut vm, mut rx) = manager(ctx, "splash");

    vm.render_current(&conn, &node).await.unwrap();

    let event = timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("deferred transition never arrived")
        .expect("event channel closed");
    assert!(matches!(event, SessionEvent::ChangeView(v) if v == "menu"));
}

#[tokio::test]
async fn missing_art_degrades_but_view_still_renders() {
    let (ctx, _dir) =
        context_from_views("home:\n  art: nonexistent_art\n").await;
    let node = ctx.nodes.acquire().unwrap();
    let conn = RecordingConnection::new();
    let (mut vm, _rx) = manager(ctx, "home");

    // No error: the view proceeds without its backdrop.
    vm.render_current(&conn, &node).await.unwrap();
}

#[tokio::test]
async fn prompt_consumes_input_then_advances() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.views = serde_yaml::from_str(
        "gate:\n  prompt: pause\n  next: menu\nmenu: {}\n",
    )
    .unwrap();
    config.prompts =
        serde_yaml::from_str("pause:\n  lineFeed: true\n").unwrap();
    let store = Store::open(dir.path().to_str().unwrap()).await.unwrap();
    let ctx = Arc::new(ServerContext {
        nodes: NodeRegistry::new(config.max_nodes()),
        config,
        store,
    });

    let node = ctx.nodes.acquire().unwrap();
    let conn = RecordingConnection::new();
    let (mut vm, _rx) = manager(ctx, "gate");

    vm.render_current(&conn, &node).await.unwrap();

    // Empty input: prompt declines, and with a prompt active the delay-0
    // next must NOT fire.
    let handled = vm.handle_input(&conn, "", &node).await.unwrap();
    assert!(!handled);
    assert_eq!(vm.current(), "gate");

    // Any real input completes the pause prompt and advances.
    let handled = vm.handle_input(&conn, "x", &node).await.unwrap();
    assert!(handled);
    assert_eq!(vm.current(), "menu");
}
