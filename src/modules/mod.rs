//! Pluggable modules.
//!
//! A module is a named handler a view can bind to via its `module` field.
//! Modules that process user commands override [`Module::handle_command`];
//! the default implementation declines everything, which is how a
//! display-only module looks to the view manager.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::nodes::{Connection, Node};
use crate::server::ServerContext;

#[async_trait]
pub trait Module: Send + Sync {
    /// Unique registry key.
    fn name(&self) -> &'static str;

    /// Process one command. Returns `Ok(true)` when the input was consumed.
    async fn handle_command(
        &self,
        _conn: &dyn Connection,
        _ctx: &ServerContext,
        _node: &Node,
        _cmd: &str,
        _args: &str,
    ) -> Result<bool> {
        Ok(false)
    }
}

/// Keyed module lookup, populated at session start.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: HashMap<&'static str, Arc<dyn Module>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        ModuleRegistry::default()
    }

    /// A registry with the built-in modules installed.
    pub fn with_builtins() -> Self {
        let mut registry = ModuleRegistry::new();
        registry.register(Arc::new(DebugModule));
        registry
    }

    pub fn register(&mut self, module: Arc<dyn Module>) {
        self.modules.insert(module.name(), module);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.modules.get(name).cloned()
    }
}

/// Diagnostics available from any view wired to `module: debug`.
pub struct DebugModule;

#[async_trait]
impl Module for DebugModule {
    fn name(&self) -> &'static str {
        "debug"
    }

    async fn handle_command(
        &self,
        conn: &dyn Connection,
        ctx: &ServerContext,
        node: &Node,
        cmd: &str,
        args: &str,
    ) -> Result<bool> {
        // The view manager hands the whole input line through as `cmd`.
        let (cmd, rest) = match cmd.split_once(char::is_whitespace) {
            Some((head, tail)) => (head, tail.trim()),
            None => (cmd, args),
        };

        match cmd {
            "help" => {
                conn.send_line("Debug commands: help, info, time, whoami, yell <msg>")
                    .await?;
                Ok(true)
            }
            "info" => {
                let info = conn.terminal_info();
                conn.send_line(&format!(
                    "Terminal: {} ({}x{})",
                    if info.term_type.is_empty() {
                        "unknown"
                    } else {
                        &info.term_type
                    },
                    info.width,
                    info.height
                ))
                .await?;
                Ok(true)
            }
            "whoami" => {
                conn.send_line(&format!(
                    "You are {} on Node {}.",
                    node.username(),
                    node.id
                ))
                .await?;
                Ok(true)
            }
            "time" => {
                conn.send_line(&format!(
                    "Board time is {}.",
                    Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
                ))
                .await?;
                Ok(true)
            }
            "yell" => {
                if rest.is_empty() {
                    conn.send_line("Usage: yell <message>").await?;
                    return Ok(true);
                }
                let msg = format!("[Node {} yells]: {}", node.id, rest);
                ctx.nodes.broadcast_except(&msg, node.id).await;
                conn.send_line("You yelled to everyone.").await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
