// Tool Dispatcher
//
// Routes the tool calls of one assistant message to the agent's registry,
// strictly one after the other in the order the model requested them.

use tracing::{debug, warn};

use crate::context::RunContext;
use crate::error::{AgentError, Result};
use crate::tool_types::{ToolCall, ToolResult};
use crate::tools::ToolRegistry;

/// Dispatches tool calls for one run
pub struct ToolDispatcher<'a, D> {
    registry: &'a ToolRegistry<D>,
    ctx: &'a RunContext<D>,
}

impl<'a, D> ToolDispatcher<'a, D>
where
    D: Send + Sync + 'static,
{
    pub fn new(registry: &'a ToolRegistry<D>, ctx: &'a RunContext<D>) -> Self {
        Self { registry, ctx }
    }

    /// Execute a single tool call
    ///
    /// The call is abandoned as soon as the run is cancelled.
    /// Unknown tool names are reported back to the model. Invalid arguments
    /// abort with `ToolArgumentInvalid`.
    pub async fn dispatch(&self, call: &ToolCall) -> Result<ToolResult> {
        let Some(tool) = self.registry.get(&call.name) else {
            warn!(
                agent = %self.ctx.agent_name(),
                tool_name = %call.name,
                "Model requested unknown tool"
            );
            let available = self.registry.names().join(", ");
            return Ok(ToolResult::error(
                call,
                format!(
                    "Unknown tool name: '{}'. Available tools: {}",
                    call.name,
                    if available.is_empty() { "none" } else { available.as_str() }
                ),
            ));
        };

        debug!(
            agent = %self.ctx.agent_name(),
            tool_name = %call.name,
            tool_call_id = %call.id,
            "Executing tool"
        );

        let outcome = tokio::select! {
            biased;
            _ = self.ctx.cancellation_token().cancelled() => {
                debug!(tool_name = %call.name, "Run cancelled during tool execution");
                return Err(AgentError::Cancelled);
            }
            outcome = tool.execute(self.ctx, call.arguments.clone()) => outcome,
        };
        let result = outcome.into_tool_result(call)?;

        debug!(
            tool_name = %call.name,
            is_error = result.is_error,
            "Tool finished"
        );

        Ok(result)
    }

    /// Execute calls sequentially, checking for cancellation before each one
    pub async fn dispatch_all(&self, calls: &[ToolCall]) -> Result<Vec<ToolResult>> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            if self.ctx.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            results.push(self.dispatch(call).await?);
        }
        Ok(results)
    }
}
