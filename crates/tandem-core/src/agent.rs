// Agent definition and run loop
//
// An Agent binds a model handle to a static prompt, an ordered list of
// dynamic prompt generators, a tool registry and a typed result. It is
// immutable once built; every run gets its own conversation, retry counter
// and dependency bundle.
//
// One run:
// 1. Assemble the system prompt (static, generators in order, extraction instructions)
// 2. Call the model with the conversation so far
// 3. Dispatch requested tools, or extract and validate the final result
// 4. On validation failure append a corrective message and go back to 2

use futures::FutureExt;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::context::{RunContext, RunOptions};
use crate::dispatcher::ToolDispatcher;
use crate::error::{AgentError, Result};
use crate::llm::{LlmCallConfig, LlmCompletionMetadata, LlmMessage, ModelHandle};
use crate::message::{Message, MessageRole};
use crate::prompt::{AssembledPrompt, AsyncPromptFn, PromptAssembler, SyncPromptFn, SystemPromptGenerator};
use crate::schema::{
    decode_json_string, final_result_tool, parse_json_text, parse_plain_text, parse_structured,
    prompted_json_instructions, ResultExtraction, ResultSchema, FINAL_RESULT_TOOL,
};
use crate::tool_types::{ToolCall, ToolResult};
use crate::tools::{FunctionTool, Tool, ToolError, ToolRegistry};

/// Tool result text for an accepted `final_result` call
pub const FINAL_RESULT_PROCESSED: &str = "Final result processed.";

/// Tool result text for calls skipped because the run already ended
pub const TOOL_NOT_EXECUTED: &str = "Tool not executed - a final result was already processed.";

const PLAIN_TEXT_NOT_PERMITTED: &str =
    "Plain text responses are not permitted, please include your response in a tool call";

// ============================================================================
// Agent
// ============================================================================

/// A configured (model, prompts, tools, result type) unit
///
/// `D` is the dependency bundle type, `O` the result type.
pub struct Agent<D, O = String> {
    name: Arc<str>,
    model: ModelHandle,
    config: AgentConfig,
    extraction: ResultExtraction,
    prompts: Vec<Arc<dyn SystemPromptGenerator<D>>>,
    tools: ToolRegistry<D>,
    _output: PhantomData<fn() -> O>,
}

impl<D, O> Agent<D, O>
where
    D: Send + Sync + 'static,
    O: ResultSchema,
{
    /// Start defining an agent
    pub fn builder(name: impl Into<String>, model: ModelHandle) -> AgentBuilder<D, O> {
        AgentBuilder::new(name, model)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn extraction(&self) -> ResultExtraction {
        self.extraction
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.names()
    }

    /// Run with a fresh conversation
    pub async fn run(&self, input: impl Into<String>, deps: impl Into<Arc<D>>) -> Result<RunResult<O>> {
        self.run_with_options(input, deps, &RunOptions::default()).await
    }

    /// Run with cancellation and optional message history
    pub async fn run_with_options(
        &self,
        input: impl Into<String>,
        deps: impl Into<Arc<D>>,
        options: &RunOptions,
    ) -> Result<RunResult<O>> {
        let ctx = RunContext::new(
            deps.into(),
            Arc::clone(&self.name),
            self.model.model(),
            options.cancel.clone(),
        );
        let span = info_span!("agent_run", agent = %self.name, run_id = %ctx.run_id());
        self.run_loop(input.into(), ctx, &options.message_history)
            .instrument(span)
            .await
    }

    /// System prompt blocks for one run, in the order they are sent
    pub async fn assemble_prompt(&self, ctx: &RunContext<D>) -> Result<AssembledPrompt> {
        let mut prompt = PromptAssembler::new(&self.config.system_prompt, &self.prompts)
            .assemble(ctx)
            .await?;
        if self.extraction == ResultExtraction::PromptedJson {
            prompt.push(prompted_json_instructions::<O>());
        }
        Ok(prompt)
    }

    fn call_config(&self) -> LlmCallConfig {
        let mut tools = self.tools.tool_definitions();
        if self.extraction == ResultExtraction::Tool {
            tools.push(final_result_tool::<O>());
        }
        LlmCallConfig {
            model: self.model.model().to_string(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            tools,
        }
    }

    async fn run_loop(
        &self,
        input: String,
        ctx: RunContext<D>,
        history: &[Message],
    ) -> Result<RunResult<O>> {
        info!(
            model = %self.model.model(),
            extraction = %self.extraction,
            tools = self.tools.len(),
            "Agent run started"
        );

        if ctx.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        // Generators may await other agents
        let prompt = tokio::select! {
            biased;
            _ = ctx.cancellation_token().cancelled() => return Err(AgentError::Cancelled),
            prompt = self.assemble_prompt(&ctx) => prompt?,
        };
        let mut messages = prompt.to_messages();
        messages.extend(
            history
                .iter()
                .filter(|m| m.role != MessageRole::System)
                .cloned(),
        );
        let new_message_start = messages.len();
        messages.push(Message::user(input));

        let call_config = self.call_config();
        let timeout = self.config.request_timeout();
        let mut run = RunState {
            ctx,
            messages,
            usage: Usage::default(),
            retries_used: 0,
            budget: self.config.retries,
        };

        for iteration in 0..self.config.max_iterations {
            if run.ctx.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            debug!(iteration, messages = run.messages.len(), "Calling model");
            let llm_messages: Vec<LlmMessage> = run.messages.iter().map(LlmMessage::from).collect();
            let call = tokio::time::timeout(
                timeout,
                self.model.driver().chat_completion(llm_messages, &call_config),
            );

            let response = tokio::select! {
                biased;
                _ = run.ctx.cancellation_token().cancelled() => return Err(AgentError::Cancelled),
                result = call => result,
            };

            let response = match response {
                Ok(response) => response?,
                Err(_) => {
                    run.record_retry(format!("model call timed out after {:?}", timeout))
                        .map_err(|_| AgentError::ModelTimeout(timeout))?;
                    continue;
                }
            };

            run.usage.add(&response.metadata);
            let tool_calls = response.tool_calls;
            let text = response.text;
            run.messages.push(if tool_calls.is_empty() {
                Message::assistant(text.clone())
            } else {
                Message::assistant_with_tools(text.clone(), tool_calls.clone())
            });

            let output = match self.extraction {
                ResultExtraction::Tool => self.step_tool_policy(&mut run, &tool_calls).await?,
                ResultExtraction::PromptedJson | ResultExtraction::Text => {
                    self.step_text_policy(&mut run, &text, &tool_calls).await?
                }
            };

            if let Some(output) = output {
                info!(
                    iterations = iteration + 1,
                    retries = run.retries_used,
                    requests = run.usage.requests,
                    "Agent run completed"
                );
                return Ok(RunResult {
                    output,
                    run_id: run.ctx.run_id(),
                    messages: run.messages,
                    new_message_start,
                    usage: run.usage,
                    retries: run.retries_used,
                });
            }
        }

        warn!(max_iterations = self.config.max_iterations, "Agent run hit iteration limit");
        Err(AgentError::MaxIterationsReached(self.config.max_iterations))
    }

    /// `final_result` tool policy
    async fn step_tool_policy(&self, run: &mut RunState<D>, calls: &[ToolCall]) -> Result<Option<O>> {
        let final_call = calls.iter().find(|c| c.name == FINAL_RESULT_TOOL);

        let Some(final_call) = final_call else {
            if calls.is_empty() {
                run.record_retry(PLAIN_TEXT_NOT_PERMITTED.to_string())?;
                run.messages.push(Message::user(corrective(&format!(
                    "{}. You must call the `{}` tool.",
                    PLAIN_TEXT_NOT_PERMITTED, FINAL_RESULT_TOOL
                ))));
            } else {
                let results = ToolDispatcher::new(&self.tools, &run.ctx)
                    .dispatch_all(calls)
                    .await?;
                run.push_results(results);
            }
            return Ok(None);
        };

        match parse_structured::<O>(decode_json_string(final_call.arguments.clone())) {
            Ok(output) => {
                let mut final_seen = false;
                for call in calls {
                    let text = if call.name == FINAL_RESULT_TOOL && !final_seen {
                        final_seen = true;
                        FINAL_RESULT_PROCESSED
                    } else {
                        TOOL_NOT_EXECUTED
                    };
                    run.messages.push(Message::tool_result(ToolResult::success(call, text, None)));
                }
                Ok(Some(output))
            }
            Err(message) => {
                debug!(error = %message, "final_result arguments rejected");
                let dispatcher = ToolDispatcher::new(&self.tools, &run.ctx);
                let mut results = Vec::with_capacity(calls.len());
                for call in calls {
                    if call.name == FINAL_RESULT_TOOL {
                        results.push(ToolResult::error(call, corrective(&message)));
                    } else {
                        if run.ctx.is_cancelled() {
                            return Err(AgentError::Cancelled);
                        }
                        results.push(dispatcher.dispatch(call).await?);
                    }
                }
                run.push_results(results);
                run.record_retry(message)?;
                Ok(None)
            }
        }
    }

    /// Text and prompted-JSON policies
    async fn step_text_policy(
        &self,
        run: &mut RunState<D>,
        text: &str,
        calls: &[ToolCall],
    ) -> Result<Option<O>> {
        if !calls.is_empty() {
            let results = ToolDispatcher::new(&self.tools, &run.ctx)
                .dispatch_all(calls)
                .await?;
            run.push_results(results);
            return Ok(None);
        }

        let parsed = match self.extraction {
            ResultExtraction::PromptedJson => parse_json_text::<O>(text),
            _ => parse_plain_text::<O>(text),
        };

        match parsed {
            Ok(output) => Ok(Some(output)),
            Err(message) => {
                debug!(error = %message, "Model response rejected");
                run.record_retry(message.clone())?;
                run.messages.push(Message::user(corrective(&message)));
                Ok(None)
            }
        }
    }
}

fn corrective(errors: &str) -> String {
    format!("{}\n\nFix the errors and try again.", errors)
}

/// Mutable state of one run
struct RunState<D> {
    ctx: RunContext<D>,
    messages: Vec<Message>,
    usage: Usage,
    retries_used: usize,
    budget: usize,
}

impl<D> RunState<D> {
    /// Count one corrective retry; fails once the budget is exhausted
    fn record_retry(&mut self, message: String) -> Result<()> {
        self.retries_used += 1;
        if self.retries_used > self.budget {
            warn!(attempts = self.retries_used, error = %message, "Retry budget exhausted");
            return Err(AgentError::ResultValidationFailed {
                attempts: self.retries_used,
                message,
            });
        }
        warn!(
            retry = self.retries_used,
            budget = self.budget,
            error = %message,
            "Retrying model call"
        );
        self.ctx = self.ctx.with_retry(self.retries_used);
        Ok(())
    }

    fn push_results(&mut self, results: Vec<ToolResult>) {
        self.messages
            .extend(results.into_iter().map(Message::tool_result));
    }
}

impl<D, O> Clone for Agent<D, O> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            model: self.model.clone(),
            config: self.config.clone(),
            extraction: self.extraction,
            prompts: self.prompts.clone(),
            tools: self.tools.clone(),
            _output: PhantomData,
        }
    }
}

impl<D, O> std::fmt::Debug for Agent<D, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("extraction", &self.extraction)
            .field("prompts", &self.prompts.len())
            .field("tools", &self.tools)
            .field("retries", &self.config.retries)
            .finish()
    }
}

// ============================================================================
// AgentBuilder
// ============================================================================

/// Builder for Agent with fluent API
pub struct AgentBuilder<D, O> {
    name: String,
    model: ModelHandle,
    config: AgentConfig,
    extraction: Option<ResultExtraction>,
    prompts: Vec<Arc<dyn SystemPromptGenerator<D>>>,
    tools: ToolRegistry<D>,
    _output: PhantomData<fn() -> O>,
}

impl<D, O> AgentBuilder<D, O>
where
    D: Send + Sync + 'static,
    O: ResultSchema,
{
    pub fn new(name: impl Into<String>, model: ModelHandle) -> Self {
        Self {
            name: name.into(),
            model,
            config: AgentConfig::default(),
            extraction: None,
            prompts: Vec::new(),
            tools: ToolRegistry::new(),
            _output: PhantomData,
        }
    }

    /// Replace the whole configuration (static prompt included)
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the static system prompt
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    /// Add an async prompt generator
    pub fn dynamic_prompt<F, Fut>(self, generator: F) -> Self
    where
        F: Fn(RunContext<D>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        self.prompt_generator(AsyncPromptFn(generator))
    }

    /// Add a synchronous prompt generator
    pub fn dynamic_prompt_fn<F>(self, generator: F) -> Self
    where
        F: Fn(&RunContext<D>) -> String + Send + Sync + 'static,
    {
        self.prompt_generator(SyncPromptFn(generator))
    }

    /// Add any prompt generator
    pub fn prompt_generator(mut self, generator: impl SystemPromptGenerator<D> + 'static) -> Self {
        self.prompts.push(Arc::new(generator));
        self
    }

    /// Register a tool
    pub fn tool(mut self, tool: impl Tool<D> + 'static) -> Self {
        self.tools.register(tool);
        self
    }

    /// Register an async closure as a tool
    pub fn tool_fn<A, F, Fut, T>(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F,
    ) -> Self
    where
        A: JsonSchema + DeserializeOwned + Send + 'static,
        F: Fn(RunContext<D>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, ToolError>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        self.tool(FunctionTool::new(name, description, handler))
    }

    /// Corrective retries allowed after the first attempt
    pub fn retries(mut self, retries: usize) -> Self {
        self.config.retries = retries;
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.max_tokens = Some(max_tokens);
        self
    }

    /// Timeout for each model call
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_request_timeout(timeout);
        self
    }

    /// Override the result extraction policy
    pub fn extraction(mut self, extraction: ResultExtraction) -> Self {
        self.extraction = Some(extraction);
        self
    }

    pub fn build(self) -> Result<Agent<D, O>> {
        let extraction = self
            .extraction
            .unwrap_or_else(ResultExtraction::default_for::<O>);

        if self.name.trim().is_empty() {
            return Err(AgentError::config("Agent name must not be empty"));
        }
        if self.config.max_iterations == 0 {
            return Err(AgentError::config("max_iterations must be at least 1"));
        }
        if extraction == ResultExtraction::Tool && self.tools.has(FINAL_RESULT_TOOL) {
            return Err(AgentError::config(format!(
                "Tool name '{}' is reserved for the structured result",
                FINAL_RESULT_TOOL
            )));
        }

        Ok(Agent {
            name: Arc::from(self.name),
            model: self.model,
            config: self.config,
            extraction,
            prompts: self.prompts,
            tools: self.tools,
            _output: PhantomData,
        })
    }
}

// ============================================================================
// RunResult
// ============================================================================

/// Token and request accounting for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub requests: usize,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn add(&mut self, metadata: &LlmCompletionMetadata) {
        let prompt = metadata.prompt_tokens.unwrap_or(0) as u64;
        let completion = metadata.completion_tokens.unwrap_or(0) as u64;
        self.requests += 1;
        self.prompt_tokens += prompt;
        self.completion_tokens += completion;
        self.total_tokens += metadata
            .total_tokens
            .map(u64::from)
            .unwrap_or(prompt + completion);
    }
}

/// Successful outcome of an agent run
#[derive(Debug, Clone)]
pub struct RunResult<O> {
    pub output: O,
    run_id: Uuid,
    messages: Vec<Message>,
    new_message_start: usize,
    usage: Usage,
    retries: usize,
}

impl<O> RunResult<O> {
    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn into_output(self) -> O {
        self.output
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The whole conversation, system prompts and history included
    pub fn all_messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages produced by this run, starting with the user input
    pub fn new_messages(&self) -> &[Message] {
        &self.messages[self.new_message_start..]
    }

    pub fn usage(&self) -> Usage {
        self.usage
    }

    /// Corrective retries used
    pub fn retries(&self) -> usize {
        self.retries
    }
}

/// Boxed future used when an agent run has to be stored or erased
pub type AgentRunFuture<'a, O> = futures::future::BoxFuture<'a, Result<RunResult<O>>>;

impl<D, O> Agent<D, O>
where
    D: Send + Sync + 'static,
    O: ResultSchema,
{
    /// Owned, boxed version of `run_with_options`
    pub fn run_boxed(
        self: Arc<Self>,
        input: String,
        deps: Arc<D>,
        options: RunOptions,
    ) -> AgentRunFuture<'static, O> {
        async move { self.run_with_options(input, deps, &options).await }.boxed()
    }
}
