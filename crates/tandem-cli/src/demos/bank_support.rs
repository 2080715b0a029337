// Bank support agent
//
// One agent with a prompt generator that looks up the customer's name, a
// balance tool and a validated result (risk must stay within 0..=10).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tandem_core::{
    Agent, Bounded, ModelHandle, Result, ResultSchema, RunContext, RunOptions, RunResult, ToolError,
};

/// Stand-in for the bank's customer database
#[derive(Debug, Default)]
pub struct DatabaseConn;

impl DatabaseConn {
    pub async fn customer_name(&self, customer_id: u32) -> Option<String> {
        (customer_id == 123).then(|| "Sid Saha".to_string())
    }

    pub async fn customer_balance(
        &self,
        customer_id: u32,
        _include_pending: bool,
    ) -> std::result::Result<f64, ToolError> {
        if customer_id == 123 {
            Ok(123.45)
        } else {
            Err(ToolError::failed("Customer not found"))
        }
    }
}

pub struct SupportDependencies {
    pub customer_id: u32,
    pub db: DatabaseConn,
}

impl SupportDependencies {
    pub fn new(customer_id: u32) -> Self {
        Self {
            customer_id,
            db: DatabaseConn,
        }
    }
}

/// Support agent result
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SupportResult {
    /// The support advice returned to the customer.
    pub support_advice: String,
    /// Whether to block their card
    pub block_card: bool,
    /// Risk level of the query
    pub risk: Bounded<0, 10>,
}

impl ResultSchema for SupportResult {}

#[derive(Debug, Deserialize, JsonSchema)]
struct BalanceArgs {
    /// Whether to include pending transactions
    include_pending: bool,
}

pub const SYSTEM_PROMPT: &str = "You are a support agent in our bank, provide the customer some \
support advice as per their request and judge the risk level of their query. Reply using the \
customer's name.";

pub fn support_agent(model: ModelHandle) -> Result<Agent<SupportDependencies, SupportResult>> {
    Agent::builder("support_agent", model)
        .system_prompt(SYSTEM_PROMPT)
        .dynamic_prompt(|ctx: RunContext<SupportDependencies>| async move {
            let name = ctx.deps.db.customer_name(ctx.deps.customer_id).await;
            Ok(format!(
                "The name of the customer is {}",
                name.as_deref().unwrap_or("unknown")
            ))
        })
        .tool_fn(
            "customer_balance",
            "Returns the customer's current account balance.",
            |ctx: RunContext<SupportDependencies>, args: BalanceArgs| async move {
                let balance = ctx
                    .deps
                    .db
                    .customer_balance(ctx.deps.customer_id, args.include_pending)
                    .await?;
                Ok::<_, ToolError>(format!("{:.2}", balance))
            },
        )
        .build()
}

pub async fn run(
    model: ModelHandle,
    input_text: &str,
    customer_id: u32,
    options: &RunOptions,
) -> Result<RunResult<SupportResult>> {
    support_agent(model)?
        .run_with_options(input_text, SupportDependencies::new(customer_id), options)
        .await
}
