// Run context
//
// RunContext is what prompt generators and tools see of the run they belong
// to: the shared, read-only dependency bundle plus run metadata.

use crate::message::Message;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Per-run context handed to prompt generators and tools
pub struct RunContext<D> {
    /// Dependency bundle for this run (shared, never mutated by the run)
    pub deps: Arc<D>,
    run_id: Uuid,
    agent: Arc<str>,
    model: Arc<str>,
    retry: usize,
    cancel: CancellationToken,
}

impl<D> RunContext<D> {
    pub fn new(
        deps: Arc<D>,
        agent: impl Into<Arc<str>>,
        model: impl Into<Arc<str>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            deps,
            run_id: Uuid::now_v7(),
            agent: agent.into(),
            model: model.into(),
            retry: 0,
            cancel,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn agent_name(&self) -> &str {
        &self.agent
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Number of corrective retries used so far in this run
    pub fn retry(&self) -> usize {
        self.retry
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Options for an agent run started from inside this run
    ///
    /// The nested run shares this run's cancellation token.
    pub fn nested_options(&self) -> RunOptions {
        RunOptions::with_cancel(self.cancel.clone())
    }

    pub(crate) fn with_retry(&self, retry: usize) -> Self {
        Self {
            retry,
            ..self.clone()
        }
    }
}

// Manual impl: D itself does not need to be Clone
impl<D> Clone for RunContext<D> {
    fn clone(&self) -> Self {
        Self {
            deps: Arc::clone(&self.deps),
            run_id: self.run_id,
            agent: Arc::clone(&self.agent),
            model: Arc::clone(&self.model),
            retry: self.retry,
            cancel: self.cancel.clone(),
        }
    }
}

impl<D> std::fmt::Debug for RunContext<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("agent", &self.agent)
            .field("model", &self.model)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Options for one agent or pipeline run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Cancelling this token stops further model and tool calls for the run
    pub cancel: CancellationToken,

    /// Earlier conversation to continue from (agent runs only)
    ///
    /// System messages are dropped; the agent's freshly assembled prompt
    /// takes their place.
    pub message_history: Vec<Message>,
}

impl RunOptions {
    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..Self::default()
        }
    }

    pub fn with_history(mut self, messages: Vec<Message>) -> Self {
        self.message_history = messages;
        self
    }
}
