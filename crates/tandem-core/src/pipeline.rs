// Pipeline Orchestrator
//
// A Pipeline is a typed chain of stages: the output of stage i is the input
// of stage i+1. Stages run strictly one after the other. When a stage fails
// the pipeline stops and reports the failing stage together with snapshots
// of everything that completed before it.
//
// Pipelines hold no state between runs; `run` always starts a fresh chain.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

use crate::agent::Agent;
use crate::context::RunOptions;
use crate::error::{AgentError, Result};
use crate::schema::ResultSchema;

// ============================================================================
// Stage
// ============================================================================

/// One step of a pipeline
#[async_trait]
pub trait Stage<I>: Send + Sync {
    type Output: Send;

    fn name(&self) -> &str;

    async fn run(&self, input: I, options: &RunOptions) -> Result<Self::Output>;
}

/// What an agent stage is invoked with
#[derive(Debug, Clone)]
pub struct StageInput<D> {
    /// User prompt for the agent
    pub prompt: String,
    /// Dependency bundle for the agent run
    pub deps: D,
}

impl<D> StageInput<D> {
    pub fn new(prompt: impl Into<String>, deps: D) -> Self {
        Self {
            prompt: prompt.into(),
            deps,
        }
    }
}

/// Combines a stage's input with its agent's output
pub trait StageMerge<I, O>: Send + Sync {
    type Output: Send;

    fn merge(&self, input: I, output: O) -> Self::Output;
}

/// Pass the agent output through unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepOutput;

impl<I, O: Send> StageMerge<I, O> for KeepOutput {
    type Output = O;

    fn merge(&self, _input: I, output: O) -> O {
        output
    }
}

/// Merge with a closure
pub struct MergeFn<F>(F);

impl<I, O, N, F> StageMerge<I, O> for MergeFn<F>
where
    F: Fn(I, O) -> N + Send + Sync,
    N: Send,
{
    type Output = N;

    fn merge(&self, input: I, output: O) -> N {
        (self.0)(input, output)
    }
}

/// Stage that runs an agent
///
/// `wire` builds the agent's prompt and dependency bundle from the stage
/// input. By default the stage output is the agent's result; `merge` can
/// combine it with the input instead.
pub struct AgentStage<I, D, O, W, M = KeepOutput> {
    name: String,
    agent: Arc<Agent<D, O>>,
    wire: W,
    merge: M,
    _input: PhantomData<fn(I)>,
}

impl<I, D, O, W> AgentStage<I, D, O, W, KeepOutput>
where
    W: Fn(&I) -> StageInput<D>,
{
    pub fn new(name: impl Into<String>, agent: impl Into<Arc<Agent<D, O>>>, wire: W) -> Self {
        Self {
            name: name.into(),
            agent: agent.into(),
            wire,
            merge: KeepOutput,
            _input: PhantomData,
        }
    }

    /// Output `merge(input, agent_output)` instead of the bare agent output
    pub fn merge<F, N>(self, merge: F) -> AgentStage<I, D, O, W, MergeFn<F>>
    where
        F: Fn(I, O) -> N,
    {
        AgentStage {
            name: self.name,
            agent: self.agent,
            wire: self.wire,
            merge: MergeFn(merge),
            _input: PhantomData,
        }
    }
}

#[async_trait]
impl<I, D, O, W, M> Stage<I> for AgentStage<I, D, O, W, M>
where
    I: Send + 'static,
    D: Send + Sync + 'static,
    O: ResultSchema,
    W: Fn(&I) -> StageInput<D> + Send + Sync,
    M: StageMerge<I, O>,
{
    type Output = M::Output;

    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: I, options: &RunOptions) -> Result<Self::Output> {
        let StageInput { prompt, deps } = (self.wire)(&input);
        let result = self
            .agent
            .run_with_options(prompt, Arc::new(deps), options)
            .await?;
        Ok(self.merge.merge(input, result.output))
    }
}

/// Stage backed by an async closure
pub struct FnStage<F> {
    name: String,
    f: F,
}

impl<F> FnStage<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<I, F, Fut, O> Stage<I> for FnStage<F>
where
    I: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O>> + Send + 'static,
    O: Send,
{
    type Output = O;

    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: I, _options: &RunOptions) -> Result<O> {
        (self.f)(input).await
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Snapshot of a completed stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub index: usize,
    pub name: String,
    /// Stage output as JSON
    pub output: Value,
    pub elapsed_ms: u64,
}

/// A stage failure, with everything completed before it
#[derive(Debug, thiserror::Error)]
#[error("Pipeline stage {stage_index} ('{stage_name}') failed: {source}")]
pub struct PipelineError {
    /// Zero-based index of the failing stage
    pub stage_index: usize,
    pub stage_name: String,
    /// Outputs of the stages that finished before the failure
    pub completed: Vec<StageRecord>,
    pub source: AgentError,
}

/// Successful pipeline outcome
#[derive(Debug, Clone)]
pub struct PipelineOutput<O> {
    pub output: O,
    pub stages: Vec<StageRecord>,
}

type Chain<I, O> = Arc<
    dyn Fn(I, RunOptions) -> BoxFuture<'static, std::result::Result<(O, Vec<StageRecord>), PipelineError>>
        + Send
        + Sync,
>;

/// Typed sequence of stages from `I` to `O`
pub struct Pipeline<I, O> {
    name: Arc<str>,
    stage_names: Vec<String>,
    chain: Chain<I, O>,
}

impl<I> Pipeline<I, I>
where
    I: Send + 'static,
{
    /// Empty pipeline; its output is its input
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
            stage_names: Vec::new(),
            chain: Arc::new(|input: I, _options: RunOptions| {
                async move { Ok::<_, PipelineError>((input, Vec::<StageRecord>::new())) }.boxed()
            }),
        }
    }
}

impl<I, O> Pipeline<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage_names(&self) -> &[String] {
        &self.stage_names
    }

    /// Append a stage consuming this pipeline's output
    pub fn then<S>(self, stage: S) -> Pipeline<I, S::Output>
    where
        S: Stage<O> + 'static,
        S::Output: Serialize + 'static,
    {
        let prev = self.chain;
        let stage = Arc::new(stage);
        let index = self.stage_names.len();
        let pipeline = Arc::clone(&self.name);

        let mut stage_names = self.stage_names;
        stage_names.push(stage.name().to_string());

        let chain: Chain<I, S::Output> = Arc::new(move |input: I, options: RunOptions| {
            let prev = Arc::clone(&prev);
            let stage = Arc::clone(&stage);
            let pipeline = Arc::clone(&pipeline);

            async move {
                let (stage_input, mut completed) = (*prev)(input, options.clone()).await?;
                let stage_name = stage.name().to_string();

                if options.cancel.is_cancelled() {
                    return Err(PipelineError {
                        stage_index: index,
                        stage_name,
                        completed,
                        source: AgentError::Cancelled,
                    });
                }

                info!(pipeline = %pipeline, stage = %stage_name, stage_index = index, "Stage started");
                let started = Instant::now();

                match stage.run(stage_input, &options).await {
                    Ok(output) => {
                        let elapsed_ms = started.elapsed().as_millis() as u64;
                        info!(
                            pipeline = %pipeline,
                            stage = %stage_name,
                            stage_index = index,
                            elapsed_ms,
                            "Stage completed"
                        );
                        let snapshot = serde_json::to_value(&output).unwrap_or_else(|e| {
                            warn!(
                                pipeline = %pipeline,
                                stage = %stage_name,
                                error = %e,
                                "Stage output could not be snapshotted"
                            );
                            json!({ "unserializable": e.to_string() })
                        });
                        completed.push(StageRecord {
                            index,
                            name: stage_name,
                            output: snapshot,
                            elapsed_ms,
                        });
                        Ok::<_, PipelineError>((output, completed))
                    }
                    Err(source) => {
                        error!(
                            pipeline = %pipeline,
                            stage = %stage_name,
                            stage_index = index,
                            error = %source,
                            "Stage failed"
                        );
                        Err(PipelineError {
                            stage_index: index,
                            stage_name,
                            completed,
                            source,
                        })
                    }
                }
            }
            .boxed()
        });

        Pipeline {
            name: self.name,
            stage_names,
            chain,
        }
    }

    pub async fn run(&self, input: I) -> std::result::Result<PipelineOutput<O>, PipelineError> {
        self.run_with_options(input, &RunOptions::default()).await
    }

    /// Run every stage in order; cancellation is checked before each stage
    pub async fn run_with_options(
        &self,
        input: I,
        options: &RunOptions,
    ) -> std::result::Result<PipelineOutput<O>, PipelineError> {
        let span = info_span!("pipeline_run", pipeline = %self.name);
        async move {
            info!(stages = self.stage_names.len(), "Pipeline started");
            let stage_options = RunOptions::with_cancel(options.cancel.clone());
            let (output, stages) = (*self.chain)(input, stage_options).await?;
            info!(stages = stages.len(), "Pipeline completed");
            Ok::<_, PipelineError>(PipelineOutput { output, stages })
        }
        .instrument(span)
        .await
    }
}

impl<I, O> Clone for Pipeline<I, O> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            stage_names: self.stage_names.clone(),
            chain: Arc::clone(&self.chain),
        }
    }
}

impl<I, O> std::fmt::Debug for Pipeline<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("stages", &self.stage_names)
            .finish()
    }
}
