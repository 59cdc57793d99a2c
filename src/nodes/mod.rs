//! Nodes: admitted, numbered session slots.
//!
//! A node is the unit of presence on the board. Every accepted connection
//! occupies exactly one node for its lifetime, which gives sessions a stable
//! small identifier for display ("Node 3") and cross-session messaging.

pub mod registry;

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::store::User;

pub use registry::{NodeRegistry, RegistryError};

/// Terminal capabilities learned during negotiation (telnet) or from the
/// pty request (SSH).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminalInfo {
    pub term_type: String,
    pub width: u16,
    pub height: u16,
}

/// The capability surface sessions and views consume, independent of the
/// wire protocol underneath.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Read decoded user data. `Ok(0)` means the peer is gone.
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize>;
    /// Write raw bytes, applying any protocol-level escaping.
    async fn write(&self, data: &[u8]) -> io::Result<usize>;
    /// Write a message followed by CRLF.
    async fn send_line(&self, msg: &str) -> io::Result<()>;
    async fn close(&self);
    fn remote_addr(&self) -> SocketAddr;
    fn terminal_info(&self) -> TerminalInfo;
    /// Whether the peer renders UTF-8. Legacy telnet callers expect
    /// code-page-native CP437 output instead.
    fn is_utf8(&self) -> bool;
}

/// An occupied session slot.
pub struct Node {
    pub id: usize,
    conn: RwLock<Option<Arc<dyn Connection>>>,
    user: RwLock<Option<User>>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node").field("id", &self.id).finish()
    }
}

impl Node {
    pub(crate) fn new(id: usize) -> Self {
        Node {
            id,
            conn: RwLock::new(None),
            user: RwLock::new(None),
        }
    }

    /// Bind the connection that owns this slot.
    pub fn attach(&self, conn: Arc<dyn Connection>) {
        *self.conn.write().expect("node conn lock poisoned") = Some(conn);
    }

    pub fn connection(&self) -> Option<Arc<dyn Connection>> {
        self.conn.read().expect("node conn lock poisoned").clone()
    }

    pub fn set_user(&self, user: User) {
        *self.user.write().expect("node user lock poisoned") = Some(user);
    }

    pub fn user(&self) -> Option<User> {
        self.user.read().expect("node user lock poisoned").clone()
    }

    /// Authenticated username, or "guest".
    pub fn username(&self) -> String {
        self.user()
            .map_or_else(|| "guest".to_string(), |u| u.username)
    }

    pub fn is_utf8(&self) -> bool {
        self.connection().map_or(false, |c| c.is_utf8())
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.connection() {
            Some(conn) => write!(f, "Node {} ({})", self.id, conn.remote_addr()),
            None => write!(f, "Node {} (Disconnected)", self.id),
        }
    }
}
