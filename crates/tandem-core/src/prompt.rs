// Dynamic system prompts
//
// A SystemPromptGenerator produces one block of system prompt text from the
// run context. Generators run at the start of every run, strictly in the
// order they were registered, and may await other agents before returning.

use crate::context::RunContext;
use crate::error::{AgentError, Result};
use crate::message::Message;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Produces part of an agent's system prompt for one run
#[async_trait]
pub trait SystemPromptGenerator<D>: Send + Sync {
    async fn generate(&self, ctx: &RunContext<D>) -> anyhow::Result<String>;
}

/// Generator backed by an async closure
///
/// The closure receives an owned clone of the context so it can move it into
/// the returned future.
pub struct AsyncPromptFn<F>(pub F);

#[async_trait]
impl<D, F, Fut> SystemPromptGenerator<D> for AsyncPromptFn<F>
where
    D: Send + Sync + 'static,
    F: Fn(RunContext<D>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    async fn generate(&self, ctx: &RunContext<D>) -> anyhow::Result<String> {
        (self.0)(ctx.clone()).await
    }
}

/// Generator backed by a plain closure
pub struct SyncPromptFn<F>(pub F);

#[async_trait]
impl<D, F> SystemPromptGenerator<D> for SyncPromptFn<F>
where
    D: Send + Sync + 'static,
    F: Fn(&RunContext<D>) -> String + Send + Sync,
{
    async fn generate(&self, ctx: &RunContext<D>) -> anyhow::Result<String> {
        Ok((self.0)(ctx))
    }
}

/// Fixed text, useful when a generator list is built programmatically
#[async_trait]
impl<D> SystemPromptGenerator<D> for String
where
    D: Send + Sync + 'static,
{
    async fn generate(&self, _ctx: &RunContext<D>) -> anyhow::Result<String> {
        Ok(self.clone())
    }
}

/// System prompt blocks in the order they are sent to the model
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssembledPrompt {
    pub parts: Vec<String>,
}

impl AssembledPrompt {
    /// All parts joined with blank lines
    pub fn text(&self) -> String {
        self.parts.join("\n\n")
    }

    /// One system message per part
    pub fn to_messages(&self) -> Vec<Message> {
        self.parts.iter().map(Message::system).collect()
    }

    pub fn push(&mut self, part: impl Into<String>) {
        let part = part.into();
        if !part.trim().is_empty() {
            self.parts.push(part);
        }
    }
}

/// Evaluates a static prompt followed by an ordered generator list
pub struct PromptAssembler<'a, D> {
    static_prompt: &'a str,
    generators: &'a [Arc<dyn SystemPromptGenerator<D>>],
}

impl<'a, D> PromptAssembler<'a, D>
where
    D: Send + Sync + 'static,
{
    pub fn new(static_prompt: &'a str, generators: &'a [Arc<dyn SystemPromptGenerator<D>>]) -> Self {
        Self {
            static_prompt,
            generators,
        }
    }

    /// Run every generator in registration order
    ///
    /// Empty outputs are dropped. The first failing generator aborts assembly.
    pub async fn assemble(&self, ctx: &RunContext<D>) -> Result<AssembledPrompt> {
        let mut prompt = AssembledPrompt::default();
        prompt.push(self.static_prompt);

        for (index, generator) in self.generators.iter().enumerate() {
            let part = generator.generate(ctx).await.map_err(|e| {
                AgentError::PromptGenerator(format!("generator #{}: {:#}", index, e))
            })?;
            debug!(
                agent = %ctx.agent_name(),
                generator = index,
                chars = part.len(),
                "Dynamic prompt generated"
            );
            prompt.push(part);
        }

        Ok(prompt)
    }
}
