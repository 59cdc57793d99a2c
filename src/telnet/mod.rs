//! Telnet transport.
//!
//! Split the way the protocol splits: [`consts`] holds the RFC 854 bytes,
//! [`reader`] demultiplexes inbound traffic into user data and protocol
//! events, [`writer`] frames and escapes outbound bytes, [`connection`]
//! owns option negotiation on top of both, and [`server`] accepts sockets.

pub mod connection;
pub mod consts;
pub mod reader;
pub mod server;
pub mod writer;

pub use connection::TelnetConnection;
pub use reader::{ProtocolEvent, TelnetReader};
pub use server::TelnetServer;
pub use writer::TelnetWriter;
