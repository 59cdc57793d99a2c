//! View state machine.
//!
//! Views are named screens defined in configuration. A session navigates
//! them through a stack: entering a view pushes the previous one, `back`
//! pops. Rendering a view walks a fixed order (clear, cursor, art, prompt,
//! deferred transition) and input routing walks a fixed order too (prompt,
//! module, action map, any-key transition).

use std::sync::Arc;

use log::{debug, warn};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Duration;

use crate::ansi;
use crate::config::ViewConfig;
use crate::modules::ModuleRegistry;
use crate::nodes::{Connection, Node};
use crate::prompts::{BasicPrompt, Prompt};
use crate::server::ServerContext;
use crate::session::SessionEvent;

#[derive(Debug, Error)]
pub enum ViewError {
    /// The current view has no definition in configuration.
    #[error("view not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("module error: {0}")]
    Module(#[source] anyhow::Error),
}

pub struct ViewManager {
    ctx: Arc<ServerContext>,
    registry: Arc<ModuleRegistry>,
    stack: Vec<String>,
    current: String,
    current_prompt: Option<Box<dyn Prompt>>,
    events: mpsc::Sender<SessionEvent>,
}

impl ViewManager {
    pub fn new(
        ctx: Arc<ServerContext>,
        registry: Arc<ModuleRegistry>,
        initial_view: &str,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        ViewManager {
            ctx,
            registry,
            stack: Vec::new(),
            current: initial_view.to_string(),
            current_prompt: None,
            events,
        }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    #[cfg(test)]
    pub(crate) fn stack(&self) -> &[String] {
        &self.stack
    }

    /// Enter `view`, remembering where we came from. Any active prompt is
    /// dropped; it belonged to the previous screen.
    pub fn push(&mut self, view: &str) {
        debug!("view push view={view} prev={}", self.current);
        if !self.current.is_empty() {
            self.stack.push(self.current.clone());
        }
        self.current = view.to_string();
        self.current_prompt = None;
    }

    /// Return to the previous view. A pop with nothing underneath is a
    /// no-op returning `None`.
    pub fn pop(&mut self) -> Option<String> {
        let prev = self.stack.pop()?;
        debug!("view pop view={prev} from={}", self.current);
        self.current = prev.clone();
        self.current_prompt = None;
        Some(prev)
    }

    /// Render the current view to the connection.
    pub async fn render_current(
        &mut self,
        conn: &dyn Connection,
        node: &Node,
    ) -> Result<(), ViewError> {
        debug!("view render view={} stack={:?}", self.current, self.stack);
        let view = self
            .ctx
            .config
            .views
            .get(&self.current)
            .cloned()
            .ok_or_else(|| ViewError::NotFound(self.current.clone()))?;

        if view.clear_screen {
            conn.write(ansi::CLEAR_SCREEN.as_bytes()).await?;
        }
        if view.hide_cursor {
            conn.write(ansi::HIDE_CURSOR.as_bytes()).await?;
        } else {
            conn.write(ansi::SHOW_CURSOR.as_bytes()).await?;
        }

        if let Some(art) = &view.art {
            // Art problems degrade the screen, not the session.
            if let Err(e) = ansi::render_art(conn, &self.ctx.config, crate::VERSION, art).await {
                warn!("view art failed view={} art={art} err={e}", self.current);
            }
        }

        if let Some(prompt_name) = &view.prompt {
            if let Some(prompt_cfg) = self.ctx.config.prompts.get(prompt_name) {
                let prompt = BasicPrompt::new(prompt_cfg.clone());
                if let Err(e) = prompt.render(conn, &self.ctx, node).await {
                    warn!(
                        "prompt render failed view={} prompt={prompt_name} err={e}",
                        self.current
                    );
                }
                self.current_prompt = Some(Box::new(prompt));
            } else {
                warn!(
                    "prompt not defined view={} prompt={prompt_name}",
                    self.current
                );
            }
        }

        // A timed transition is delivered as an event so this task stays
        // the only writer of navigation state. Delay 0 is key-triggered and
        // handled in handle_input instead.
        if let Some(next) = &view.next {
            let delay = next.delay_ms();
            if delay > 0 {
                debug!(
                    "view auto-next scheduled view={} next={} delay={delay}",
                    self.current,
                    next.view()
                );
                let target = next.view().to_string();
                let events = self.events.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    let _ = events.send(SessionEvent::ChangeView(target)).await;
                });
            }
        }

        Ok(())
    }

    /// Route one turn of input. Returns `Ok(true)` when the input was
    /// consumed (the caller should re-render).
    pub async fn handle_input(
        &mut self,
        conn: &dyn Connection,
        input: &str,
        node: &Node,
    ) -> Result<bool, ViewError> {
        debug!(
            "view input current={} input={}",
            self.current,
            crate::logutil::escape_log(input)
        );
        let view = self
            .ctx
            .config
            .views
            .get(&self.current)
            .cloned()
            .ok_or_else(|| ViewError::NotFound(self.current.clone()))?;

        // 1. An active prompt gets first refusal.
        if let Some(prompt) = self.current_prompt.as_mut() {
            let outcome = prompt.handle_input(input, node);
            if outcome.handled {
                if outcome.done {
                    if let Some(next) = &view.next {
                        debug!("prompt done, advancing next={}", next.view());
                        let target = next.view().to_string();
                        self.push(&target);
                    }
                }
                return Ok(true);
            }
        }

        // 2. The view's module, if it handles commands.
        if let Some(module_name) = &view.module {
            match self.registry.get(module_name) {
                Some(module) => {
                    let handled = module
                        .handle_command(conn, &self.ctx, node, input, "")
                        .await
                        .map_err(ViewError::Module)?;
                    if handled {
                        return Ok(true);
                    }
                }
                None => warn!("module not found view={} module={module_name}", self.current),
            }
        }

        // 3. Explicit action mapping.
        if let Some(target) = view.actions.get(input) {
            debug!("view action matched target={target}");
            if target == "back" || target == "BACK" {
                self.pop();
            } else {
                let target = target.clone();
                self.push(&target);
            }
            return Ok(true);
        }

        // 4. Press-any-key transition: only when no prompt holds the input.
        if self.current_prompt.is_none() {
            if let Some(next) = &view.next {
                if next.delay_ms() == 0 {
                    let target = next.view().to_string();
                    debug!("view next triggered by input next={target}");
                    self.push(&target);
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::nodes::NodeRegistry;
    use crate::server::ServerContext;
    use crate::store::Store;

    async fn test_context(views_yaml: &str) -> Arc<ServerContext> {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.views = serde_yaml::from_str(views_yaml).unwrap();
        let store = Store::open(dir.path().to_str().unwrap()).await.unwrap();
        Arc::new(ServerContext {
            nodes: NodeRegistry::new(config.max_nodes()),
            config,
            store,
        })
    }

    fn manager(ctx: Arc<ServerContext>, initial: &str) -> ViewManager {
        let (tx, _rx) = mpsc::channel(10);
        ViewManager::new(ctx, Arc::new(ModuleRegistry::with_builtins()), initial, tx)
    }

    #[tokio::test]
    async fn push_and_pop_mirror_each_other() {
        let ctx = test_context("{}").await;
        let mut vm = manager(ctx, "a");

        vm.push("b");
        assert_eq!(vm.current(), "b");
        assert_eq!(vm.stack(), ["a"]);

        vm.push("c");
        assert_eq!(vm.stack(), ["a", "b"]);

        assert_eq!(vm.pop().as_deref(), Some("b"));
        assert_eq!(vm.current(), "b");
        assert_eq!(vm.stack(), ["a"]);
    }

    #[tokio::test]
    async fn pop_on_empty_stack_is_noop() {
        let ctx = test_context("{}").await;
        let mut vm = manager(ctx, "a");
        assert_eq!(vm.pop(), None);
        assert_eq!(vm.current(), "a");
    }

    #[tokio::test]
    async fn push_from_empty_current_leaves_stack_clean() {
        let ctx = test_context("{}").await;
        let mut vm = manager(ctx, "");
        vm.push("menu");
        assert_eq!(vm.current(), "menu");
        assert!(vm.stack().is_empty());
    }
}
