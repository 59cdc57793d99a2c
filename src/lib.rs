//! # EUPHiO - a terminal bulletin board system
//!
//! EUPHiO serves classic BBS sessions to modern and legacy terminals over
//! Telnet and SSH. Screens are ANSI/CP437 art files driven by a
//! configurable view state machine, so a board is assembled from YAML and
//! art rather than code.
//!
//! ## Features
//!
//! - **Dual transports**: a Telnet listener with full option negotiation
//!   (Echo, SGA, Binary, NAWS, terminal type) and an SSH listener with
//!   password authentication against the user store.
//! - **Art pipeline**: SAUCE-aware loading, template expansion, CP437 to
//!   UTF-8 transcoding for capable terminals, CRLF canonicalization.
//! - **View state machine**: stack-based navigation defined entirely in
//!   configuration, with timed transitions, prompts and pluggable modules.
//! - **Node pool**: bounded admission with small stable node numbers and
//!   cross-session broadcast.
//! - **Hot reload**: configuration file changes restart the listener set
//!   in place; a failed reload keeps the previous configuration.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! euphio::server::run("config.yml").await
//! # }
//! ```
//!
//! ## Module organization
//!
//! - [`server`] - boot, listener supervision, hot reload and shutdown
//! - [`telnet`] - RFC 854 transport: reader, writer, option negotiation
//! - [`ssh`] - SSH transport adapter over russh
//! - [`session`] - per-connection event loop
//! - [`views`] - the navigation state machine
//! - [`prompts`] / [`modules`] - input consumers bound to views
//! - [`nodes`] - the bounded node pool and connection capability trait
//! - [`ansi`] - art loading, SAUCE, CP437 and template expansion
//! - [`config`] - hierarchical YAML configuration
//! - [`store`] - user accounts

pub mod ansi;
pub mod assets;
pub mod config;
pub mod logutil;
pub mod modules;
pub mod nodes;
pub mod prompts;
pub mod server;
pub mod session;
pub mod ssh;
pub mod store;
pub mod telnet;
pub mod views;

/// Version string exposed to art templates and log lines.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
