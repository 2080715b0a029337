// Integration tests for agent runs
//
// These tests drive complete runs against the scripted mock driver and check
// prompt assembly, result validation, tool dispatch, timeouts and cancellation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tandem_core::{
    memory::{MockLlmDriver, MockLlmResponse},
    tools::INTERNAL_ERROR_MESSAGE,
    Agent, AgentError, Bounded, CancellationToken, LlmMessageRole, MessageRole, NoArgs,
    ResultExtraction, ResultSchema, RunContext, RunOptions, ToolError,
};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct SupportResult {
    /// Advice returned to the customer
    support_advice: String,
    /// Whether to block their card or not
    block_card: bool,
    /// Risk level of query
    risk: Bounded<0, 10>,
}

impl ResultSchema for SupportResult {}

struct SupportDeps {
    customer_id: u32,
    include_pending_seen: AtomicBool,
}

impl SupportDeps {
    fn new(customer_id: u32) -> Self {
        Self {
            customer_id,
            include_pending_seen: AtomicBool::new(false),
        }
    }
}

#[derive(Deserialize, JsonSchema)]
struct BalanceArgs {
    include_pending: bool,
}

fn support_agent(driver: &MockLlmDriver, retries: usize) -> Agent<SupportDeps, SupportResult> {
    Agent::builder("support_agent", driver.handle())
        .system_prompt(
            "You are a support agent in our bank, give the customer support and judge \
             the risk level of their query.",
        )
        .dynamic_prompt_fn(|ctx: &RunContext<SupportDeps>| {
            format!("The customer id is {}", ctx.deps.customer_id)
        })
        .tool_fn(
            "customer_balance",
            "Returns the customer's current account balance.",
            |ctx: RunContext<SupportDeps>, args: BalanceArgs| async move {
                ctx.deps
                    .include_pending_seen
                    .store(args.include_pending, Ordering::SeqCst);
                match ctx.deps.customer_id {
                    123 => Ok(format!("{:.2}", 123.45)),
                    500 => Err(ToolError::Internal(anyhow::anyhow!("pool timed out: 10.0.0.7"))),
                    _ => Err(ToolError::failed("Customer not found")),
                }
            },
        )
        .retries(retries)
        .build()
        .unwrap()
}

fn valid_result() -> serde_json::Value {
    json!({"support_advice": "Your balance is $123.45", "block_card": false, "risk": 1})
}

// =============================================================================
// Dynamic prompt assembly
// =============================================================================

#[tokio::test]
async fn test_prompt_generators_keep_registration_order() {
    let driver = MockLlmDriver::with_responses(vec![MockLlmResponse::text("done")]);
    let agent: Agent<(), String> = Agent::builder("ordered", driver.handle())
        .system_prompt("static")
        .dynamic_prompt_fn(|_ctx: &RunContext<()>| "A".to_string())
        .dynamic_prompt(|_ctx: RunContext<()>| async move {
            tokio::task::yield_now().await;
            Ok::<_, anyhow::Error>("B".to_string())
        })
        .build()
        .unwrap();

    agent.run("go", ()).await.unwrap();

    let calls = driver.calls().await;
    assert_eq!(calls[0].system_prompts(), vec!["static", "A", "B"]);

    let joined = calls[0].system_prompts().join("\n");
    assert!(joined.find('A').unwrap() < joined.find('B').unwrap());
}

#[tokio::test]
async fn test_generator_can_await_another_agent() {
    #[derive(Debug, Serialize, Deserialize, JsonSchema)]
    struct Detected {
        detected_language: String,
    }
    impl ResultSchema for Detected {}

    let detector_driver = MockLlmDriver::with_responses(vec![MockLlmResponse::final_result(
        json!({"detected_language": "Hindi"}),
    )]);
    let detector: Arc<Agent<(), Detected>> = Arc::new(
        Agent::builder("language_detector", detector_driver.handle())
            .system_prompt("Detect the language of the text.")
            .build()
            .unwrap(),
    );

    let translator_driver = MockLlmDriver::with_responses(vec![MockLlmResponse::text("Hello")]);
    let translator: Agent<String, String> = Agent::builder("translator", translator_driver.handle())
        .dynamic_prompt(move |ctx: RunContext<String>| {
            let detector = Arc::clone(&detector);
            async move {
                let detected = detector.run(ctx.deps.as_str(), ()).await?;
                Ok::<_, anyhow::Error>(format!(
                    "You have to convert the text from {} to English.",
                    detected.output.detected_language
                ))
            }
        })
        .build()
        .unwrap();

    let result = translator
        .run("नमस्ते", "नमस्ते".to_string())
        .await
        .unwrap();

    assert_eq!(result.output, "Hello");
    assert_eq!(detector_driver.call_count().await, 1);
    let calls = translator_driver.calls().await;
    assert_eq!(
        calls[0].system_prompts(),
        vec!["You have to convert the text from Hindi to English."]
    );
}

#[tokio::test]
async fn test_generator_failure_aborts_before_model_call() {
    let driver = MockLlmDriver::new();
    let agent: Agent<(), String> = Agent::builder("broken", driver.handle())
        .dynamic_prompt(|_ctx: RunContext<()>| async move {
            Err(anyhow::anyhow!("lookup failed"))
        })
        .build()
        .unwrap();

    let err = agent.run("go", ()).await.unwrap_err();

    assert!(matches!(err, AgentError::PromptGenerator(_)));
    assert_eq!(driver.call_count().await, 0);
}

// =============================================================================
// Result validation
// =============================================================================

#[tokio::test]
async fn test_out_of_range_risk_exhausts_retry_budget() {
    let out_of_range = json!({"support_advice": "x", "block_card": true, "risk": 11});
    let driver = MockLlmDriver::with_responses(vec![
        MockLlmResponse::final_result(out_of_range.clone()),
        MockLlmResponse::final_result(out_of_range.clone()),
        MockLlmResponse::final_result(out_of_range.clone()),
        MockLlmResponse::final_result(out_of_range.clone()),
        MockLlmResponse::final_result(valid_result()),
    ]);
    let agent = support_agent(&driver, 3);

    let err = agent
        .run("I just lost my card!", SupportDeps::new(123))
        .await
        .unwrap_err();

    match err {
        AgentError::ResultValidationFailed { attempts, message } => {
            assert_eq!(attempts, 4);
            assert!(message.contains("out of range"), "{message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(driver.call_count().await, 4);
}

#[tokio::test]
async fn test_out_of_range_risk_is_corrected() {
    let driver = MockLlmDriver::with_responses(vec![
        MockLlmResponse::final_result(json!({"support_advice": "x", "block_card": true, "risk": 42})),
        MockLlmResponse::final_result(valid_result()),
    ]);
    let agent = support_agent(&driver, 3);

    let result = agent
        .run("What is my balance?", SupportDeps::new(123))
        .await
        .unwrap();

    assert_eq!(result.output.risk.get(), 1);
    assert_eq!(result.retries(), 1);

    let calls = driver.calls().await;
    let feedback = calls[1].messages.last().unwrap();
    assert_eq!(feedback.role, LlmMessageRole::Tool);
    assert!(feedback.content.contains("out of range"));
    assert!(feedback.content.ends_with("Fix the errors and try again."));
}

#[tokio::test]
async fn test_prompted_json_extraction_from_fenced_reply() {
    let driver = MockLlmDriver::with_responses(vec![MockLlmResponse::text(
        "Here is the result:\n```json\n{\"support_advice\": \"ok\", \"block_card\": false, \"risk\": 2}\n```",
    )]);
    let agent: Agent<(), SupportResult> = Agent::builder("support_agent", driver.handle())
        .system_prompt("Judge the risk.")
        .extraction(ResultExtraction::PromptedJson)
        .build()
        .unwrap();

    let result = agent.run("hi", ()).await.unwrap();

    assert_eq!(result.output.risk.get(), 2);
    let calls = driver.calls().await;
    assert!(calls[0].tool_names().is_empty());
    let prompts = calls[0].system_prompts();
    assert_eq!(prompts[0], "Judge the risk.");
    assert!(prompts.last().unwrap().contains("\"support_advice\""));
}

#[tokio::test]
async fn test_prompted_json_invalid_reply_gets_corrective_message() {
    let driver = MockLlmDriver::with_responses(vec![
        MockLlmResponse::text("I think the risk is low."),
        MockLlmResponse::text(r#"{"support_advice": "ok", "block_card": false, "risk": 0}"#),
    ]);
    let agent: Agent<(), SupportResult> = Agent::builder("support_agent", driver.handle())
        .extraction(ResultExtraction::PromptedJson)
        .build()
        .unwrap();

    let result = agent.run("hi", ()).await.unwrap();
    assert_eq!(result.retries(), 1);

    let calls = driver.calls().await;
    let corrective = calls[1].messages.last().unwrap();
    assert_eq!(corrective.role, LlmMessageRole::User);
    assert!(corrective.content.contains("Fix the errors and try again."));
}

// =============================================================================
// Tool dispatch
// =============================================================================

#[tokio::test]
async fn test_tool_call_roundtrip_include_pending() {
    let driver = MockLlmDriver::with_responses(vec![
        MockLlmResponse::tool_call("customer_balance", json!({"include_pending": true})),
        MockLlmResponse::final_result(valid_result()),
    ]);
    let agent = support_agent(&driver, 1);
    let deps = Arc::new(SupportDeps::new(123));

    let result = agent
        .run("What is my balance?", Arc::clone(&deps))
        .await
        .unwrap();

    assert!(deps.include_pending_seen.load(Ordering::SeqCst));

    // user, assistant(tool call), tool result, ...
    let new = result.new_messages();
    assert_eq!(new[1].role, MessageRole::Assistant);
    assert_eq!(new[2].role, MessageRole::ToolResult);
    assert_eq!(new[2].content, "123.45");
    assert_eq!(new[2].value, Some(json!("123.45")));
    assert_eq!(new[2].tool_call_id.as_deref(), Some(new[1].tool_calls[0].id.as_str()));

    let calls = driver.calls().await;
    let tool_message = calls[1].messages.last().unwrap();
    assert_eq!(tool_message.role, LlmMessageRole::Tool);
    assert_eq!(tool_message.content, "123.45");
    assert_eq!(
        calls[0].tool_names(),
        vec!["customer_balance", tandem_core::FINAL_RESULT_TOOL]
    );
}

#[tokio::test]
async fn test_recoverable_tool_error_stays_in_conversation() {
    let driver = MockLlmDriver::with_responses(vec![
        MockLlmResponse::tool_call("customer_balance", json!({"include_pending": false})),
        MockLlmResponse::final_result(valid_result()),
    ]);
    let agent = support_agent(&driver, 1);

    let result = agent.run("balance?", SupportDeps::new(999)).await.unwrap();

    let tool_result = &result.new_messages()[2];
    assert!(tool_result.is_error);
    assert_eq!(tool_result.content, "Customer not found");
    assert_eq!(result.retries(), 0);
}

#[tokio::test]
async fn test_internal_tool_error_is_hidden_from_model() {
    let driver = MockLlmDriver::with_responses(vec![
        MockLlmResponse::tool_call("customer_balance", json!({"include_pending": false})),
        MockLlmResponse::final_result(valid_result()),
    ]);
    let agent = support_agent(&driver, 1);

    agent.run("balance?", SupportDeps::new(500)).await.unwrap();

    let calls = driver.calls().await;
    let tool_message = calls[1].messages.last().unwrap();
    assert_eq!(tool_message.content, INTERNAL_ERROR_MESSAGE);
    assert!(!tool_message.content.contains("10.0.0.7"));
}

#[tokio::test]
async fn test_invalid_tool_arguments_abort_run() {
    let driver = MockLlmDriver::with_responses(vec![
        MockLlmResponse::tool_call("customer_balance", json!({"include_pending": "maybe"})),
        MockLlmResponse::final_result(valid_result()),
    ]);
    let agent = support_agent(&driver, 3);

    let err = agent.run("balance?", SupportDeps::new(123)).await.unwrap_err();

    assert!(matches!(
        err,
        AgentError::ToolArgumentInvalid { ref tool, .. } if tool == "customer_balance"
    ));
    assert_eq!(driver.call_count().await, 1);
}

#[tokio::test]
async fn test_unknown_tool_is_reported_back() {
    let driver = MockLlmDriver::with_responses(vec![
        MockLlmResponse::tool_call("wire_money", json!({"amount": 1000})),
        MockLlmResponse::final_result(valid_result()),
    ]);
    let agent = support_agent(&driver, 1);

    let result = agent.run("send money", SupportDeps::new(123)).await.unwrap();

    let tool_result = &result.new_messages()[2];
    assert!(tool_result.is_error);
    assert!(tool_result.content.starts_with("Unknown tool name: 'wire_money'"));
    assert!(tool_result.content.contains("customer_balance"));
}

// =============================================================================
// Timeouts and cancellation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_model_timeout_is_retried() {
    let driver = MockLlmDriver::with_responses(vec![
        MockLlmResponse::text("too late").with_delay(Duration::from_secs(30)),
        MockLlmResponse::text("on time"),
    ]);
    let agent: Agent<(), String> = Agent::builder("slow", driver.handle())
        .request_timeout(Duration::from_secs(5))
        .retries(1)
        .build()
        .unwrap();

    let result = agent.run("hi", ()).await.unwrap();

    assert_eq!(result.output, "on time");
    assert_eq!(result.retries(), 1);
    assert_eq!(driver.call_count().await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_model_timeout_exhausts_budget() {
    let driver = MockLlmDriver::with_responses(vec![
        MockLlmResponse::text("too late").with_delay(Duration::from_secs(30)),
    ]);
    let agent: Agent<(), String> = Agent::builder("slow", driver.handle())
        .request_timeout(Duration::from_secs(5))
        .retries(0)
        .build()
        .unwrap();

    let err = agent.run("hi", ()).await.unwrap_err();

    assert!(matches!(err, AgentError::ModelTimeout(d) if d == Duration::from_secs(5)));
    assert!(err.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_in_flight_run() {
    let driver = MockLlmDriver::with_responses(vec![
        MockLlmResponse::tool_call("ping", json!({})).with_delay(Duration::from_secs(10)),
        MockLlmResponse::text("never"),
    ]);
    let agent: Agent<(), String> = Agent::builder("cancellable", driver.handle())
        .tool_fn("ping", "Replies pong", |_ctx: RunContext<()>, _args: NoArgs| async move {
            Ok::<_, ToolError>("pong")
        })
        .build()
        .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let err = agent
        .run_with_options("hi", (), &RunOptions::with_cancel(cancel))
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Cancelled));
    assert_eq!(driver.call_count().await, 1);
}

fn slow_detector(driver: &MockLlmDriver) -> Arc<Agent<(), String>> {
    Arc::new(
        Agent::builder("language_detector", driver.handle())
            .system_prompt("Detect the language of the text.")
            .build()
            .unwrap(),
    )
}

fn cancel_after(delay: Duration) -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        trigger.cancel();
    });
    cancel
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_reaches_agent_awaited_by_generator() {
    let detector_driver = MockLlmDriver::with_responses(vec![
        MockLlmResponse::text("Hindi").with_delay(Duration::from_secs(50)),
    ]);
    let detector = slow_detector(&detector_driver);
    let translator_driver = MockLlmDriver::with_responses(vec![MockLlmResponse::text("Hello")]);
    let translator: Agent<(), String> = Agent::builder("translator", translator_driver.handle())
        .dynamic_prompt(move |ctx: RunContext<()>| {
            let detector = Arc::clone(&detector);
            async move {
                let detected = detector
                    .run_with_options("नमस्ते", (), &ctx.nested_options())
                    .await?;
                Ok::<_, anyhow::Error>(format!("Translate from {}.", detected.output))
            }
        })
        .build()
        .unwrap();

    let options = RunOptions::with_cancel(cancel_after(Duration::from_millis(10)));
    let started = tokio::time::Instant::now();
    let err = translator
        .run_with_options("नमस्ते", (), &options)
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(translator_driver.call_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_reaches_agent_called_from_tool() {
    let detector_driver = MockLlmDriver::with_responses(vec![
        MockLlmResponse::text("English").with_delay(Duration::from_secs(50)),
    ]);
    let detector = slow_detector(&detector_driver);
    let orchestrator_driver = MockLlmDriver::with_responses(vec![
        MockLlmResponse::tool_call("detect_language", json!({})),
        MockLlmResponse::text("never"),
    ]);
    let orchestrator: Agent<(), String> = Agent::builder("orchestrator", orchestrator_driver.handle())
        .tool_fn(
            "detect_language",
            "Detects the language of the input text.",
            move |ctx: RunContext<()>, _args: NoArgs| {
                let detector = Arc::clone(&detector);
                async move {
                    let detected = detector
                        .run_with_options("The frog jumped.", (), &ctx.nested_options())
                        .await
                        .map_err(|e| ToolError::Internal(e.into()))?;
                    Ok::<_, ToolError>(detected.output)
                }
            },
        )
        .build()
        .unwrap();

    let options = RunOptions::with_cancel(cancel_after(Duration::from_millis(10)));
    let started = tokio::time::Instant::now();
    let err = orchestrator
        .run_with_options("The frog jumped.", (), &options)
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(orchestrator_driver.call_count().await, 1);
    assert_eq!(detector_driver.call_count().await, 1);
}

#[tokio::test]
async fn test_concurrent_runs_do_not_share_state() {
    let driver = MockLlmDriver::with_responses(vec![
        MockLlmResponse::text("one"),
        MockLlmResponse::text("two"),
    ]);
    let agent: Arc<Agent<u32, String>> = Arc::new(
        Agent::builder("per_customer", driver.handle())
            .dynamic_prompt_fn(|ctx: &RunContext<u32>| format!("customer {}", ctx.deps))
            .build()
            .unwrap(),
    );

    let (a, b) = tokio::join!(agent.run("hi", 1u32), agent.run("hi", 2u32));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.run_id(), b.run_id());

    let mut prompts: Vec<String> = driver
        .calls()
        .await
        .iter()
        .map(|c| c.system_prompts().join(""))
        .collect();
    prompts.sort();
    assert_eq!(prompts, vec!["customer 1", "customer 2"]);
}
