//! Prompts: input consumers bound to views.
//!
//! A prompt renders a surface (often a "press any key" bar) and then owns
//! one turn of input, reporting whether it consumed the input and whether
//! it is finished. The basic prompt is the pause prompt: any non-empty
//! input completes it.

use async_trait::async_trait;
use log::warn;

use crate::ansi;
use crate::config::PromptConfig;
use crate::nodes::{Connection, Node};
use crate::server::ServerContext;

/// Result of a prompt input turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptOutcome {
    pub handled: bool,
    pub done: bool,
}

#[async_trait]
pub trait Prompt: Send + Sync {
    async fn render(
        &self,
        conn: &dyn Connection,
        ctx: &ServerContext,
        node: &Node,
    ) -> std::io::Result<()>;

    fn handle_input(&mut self, input: &str, node: &Node) -> PromptOutcome;
}

pub struct BasicPrompt {
    cfg: PromptConfig,
}

impl BasicPrompt {
    pub fn new(cfg: PromptConfig) -> Self {
        BasicPrompt { cfg }
    }
}

#[async_trait]
impl Prompt for BasicPrompt {
    async fn render(
        &self,
        conn: &dyn Connection,
        ctx: &ServerContext,
        _node: &Node,
    ) -> std::io::Result<()> {
        if let Some(art) = &self.cfg.art {
            if let Err(e) =
                ansi::render_art(conn, &ctx.config, crate::VERSION, art).await
            {
                // A missing surface should not block the prompt itself.
                warn!("prompt art failed art={art} err={e}");
            }
        }
        if self.cfg.line_feed {
            conn.write(b"\r\n").await?;
        }
        Ok(())
    }

    fn handle_input(&mut self, input: &str, _node: &Node) -> PromptOutcome {
        if input.is_empty() {
            return PromptOutcome {
                handled: false,
                done: false,
            };
        }
        PromptOutcome {
            handled: true,
            done: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PromptConfig;
    use crate::nodes::Node;

    #[test]
    fn empty_input_is_not_handled() {
        let mut prompt = BasicPrompt::new(PromptConfig::default());
        let node = Node::new(1);
        let outcome = prompt.handle_input("", &node);
        assert!(!outcome.handled);
        assert!(!outcome.done);
    }

    #[test]
    fn any_input_completes() {
        let mut prompt = BasicPrompt::new(PromptConfig::default());
        let node = Node::new(1);
        let outcome = prompt.handle_input(" ", &node);
        assert!(outcome.handled);
        assert!(outcome.done);
    }
}
