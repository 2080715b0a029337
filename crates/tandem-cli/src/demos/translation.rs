// Language detection and translation
//
// Three compositions of the same two agents:
// - pipeline: detect, then translate with the detected language in the prompt
// - prompt: the translator's prompt generator awaits the detector itself
// - tools: an orchestrating agent calls detect/translate as tools

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tandem_core::{
    Agent, AgentStage, ModelHandle, Pipeline, Result, ResultSchema, RunContext, StageInput,
    ToolError,
};

const DETECTOR_PROMPT: &str = "You are a language detector. Your only job is to detect the \
language of the text given to you and return the name of the language in English. You should \
ONLY output the language you detect and nothing else.
Example 1:
Input Text: I am doing well today. How are you?
Output: English
Example 2:
Input Text: आज मैं अच्छा हूँ। आप कैसे हैं?
Output: Hindi";

const TRANSLATOR_PROMPT: &str = "You are a language translator. Your job is to translate the \
given source text from the source language to a target text in the target language.";

const CONVERT_PREFIX: &str = "You have to convert the text from ";

const ORCHESTRATOR_PROMPT: &str = "You are a language translator. You are given an input text \
and the desired language to translate to. You can use a tool to detect the language of the input \
text. You can use another tool to translate the input text to the desired language. Finally, \
output the input text, the language you detected, the desired language and the translated text.";

/// Detector result
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LanguageDetected {
    /// The detected language in English of the input text, e.g. English, Hindi, Arabic
    pub detected_language: String,
}

impl ResultSchema for LanguageDetected {}

/// Translator result
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Translation {
    /// The translated text
    pub translated_text: String,
}

impl ResultSchema for Translation {}

/// Final report of every composition
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TranslationReport {
    /// The input text given to this agent
    pub input_text: String,
    /// The detected language of the input text
    pub detected_language: String,
    /// The desired language to which the input text is translated
    pub desired_language: String,
    /// The final translated output text
    pub translated_text: String,
}

impl ResultSchema for TranslationReport {}

pub type Detector = Agent<(), LanguageDetected>;

pub fn detector_agent(model: ModelHandle) -> Result<Detector> {
    Agent::builder("language_detector", model)
        .system_prompt(DETECTOR_PROMPT)
        .build()
}

// ============================================================================
// Pipeline composition
// ============================================================================

/// Languages known before the translator runs
pub struct TranslatorDeps {
    pub source_language: String,
    pub target_lang: String,
}

pub fn translator_agent(model: ModelHandle) -> Result<Agent<TranslatorDeps, Translation>> {
    Agent::builder("translator", model)
        .system_prompt(TRANSLATOR_PROMPT)
        .dynamic_prompt_fn(|ctx: &RunContext<TranslatorDeps>| {
            format!(
                "{}{} to {}.",
                CONVERT_PREFIX, ctx.deps.source_language, ctx.deps.target_lang
            )
        })
        .retries(3)
        .build()
}

/// What the translation pipeline starts from
#[derive(Debug, Clone, Serialize)]
pub struct TranslateRequest {
    pub input_text: String,
    pub target_lang: String,
}

pub fn translation_pipeline(
    detector: Detector,
    translator: Agent<TranslatorDeps, Translation>,
) -> Pipeline<TranslateRequest, TranslationReport> {
    Pipeline::new("translation")
        .then(
            AgentStage::new("detect_language", detector, |req: &TranslateRequest| {
                StageInput::new(req.input_text.clone(), ())
            })
            .merge(|req: TranslateRequest, detected: LanguageDetected| (req, detected)),
        )
        .then(
            AgentStage::new(
                "translate",
                translator,
                |(req, detected): &(TranslateRequest, LanguageDetected)| {
                    StageInput::new(
                        req.input_text.clone(),
                        TranslatorDeps {
                            source_language: detected.detected_language.clone(),
                            target_lang: req.target_lang.clone(),
                        },
                    )
                },
            )
            .merge(
                |(req, detected): (TranslateRequest, LanguageDetected), translation: Translation| {
                    TranslationReport {
                        input_text: req.input_text,
                        detected_language: detected.detected_language,
                        desired_language: req.target_lang,
                        translated_text: translation.translated_text,
                    }
                },
            ),
        )
}

// ============================================================================
// Prompt-generator composition
// ============================================================================

pub struct SelfDetectingDeps {
    pub detector: Arc<Detector>,
    pub target_lang: String,
    pub source_text: String,
    detected: OnceLock<String>,
}

impl SelfDetectingDeps {
    pub fn new(
        detector: Arc<Detector>,
        target_lang: impl Into<String>,
        source_text: impl Into<String>,
    ) -> Self {
        Self {
            detector,
            target_lang: target_lang.into(),
            source_text: source_text.into(),
            detected: OnceLock::new(),
        }
    }

    /// Language found by the prompt generator, once it has run
    pub fn detected_language(&self) -> Option<&str> {
        self.detected.get().map(String::as_str)
    }
}

/// Translator whose prompt generator runs the detector on the source text
pub fn self_detecting_translator(
    model: ModelHandle,
) -> Result<Agent<SelfDetectingDeps, Translation>> {
    Agent::builder("translator", model)
        .system_prompt(TRANSLATOR_PROMPT)
        .dynamic_prompt(|ctx: RunContext<SelfDetectingDeps>| async move {
            let detected = ctx
                .deps
                .detector
                .run_with_options(ctx.deps.source_text.as_str(), (), &ctx.nested_options())
                .await?;
            let language = detected.into_output().detected_language;
            let prompt = format!("{}{} to {}.", CONVERT_PREFIX, language, ctx.deps.target_lang);
            // first detection wins when deps are reused
            let _ = ctx.deps.detected.set(language);
            Ok::<_, anyhow::Error>(prompt)
        })
        .retries(3)
        .build()
}

// ============================================================================
// Tool composition
// ============================================================================

pub struct OrchestratorDeps {
    pub detector: Arc<Detector>,
    pub translator: Arc<Agent<TranslatorDeps, Translation>>,
    pub desired_language: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct DetectArgs {
    /// The input text given to the agent
    input_text: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct TranslateArgs {
    /// The input text given to the agent
    input_text: String,
    /// The detected language of the input text gathered from other tools
    detected_language: String,
}

pub fn orchestrator_agent(model: ModelHandle) -> Result<Agent<OrchestratorDeps, TranslationReport>> {
    Agent::builder("language_translator", model)
        .system_prompt(ORCHESTRATOR_PROMPT)
        .dynamic_prompt_fn(|ctx: &RunContext<OrchestratorDeps>| {
            format!("The desired language is {}.", ctx.deps.desired_language)
        })
        .tool_fn(
            "detect_language",
            "Detects the language of the input text given to the agent.",
            |ctx: RunContext<OrchestratorDeps>, args: DetectArgs| async move {
                let detected = ctx
                    .deps
                    .detector
                    .run_with_options(args.input_text, (), &ctx.nested_options())
                    .await
                    .map_err(|e| ToolError::Internal(e.into()))?;
                Ok::<_, ToolError>(detected.output.detected_language)
            },
        )
        .tool_fn(
            "translate_input_text",
            "Translates the input text from the detected language to the desired language.",
            |ctx: RunContext<OrchestratorDeps>, args: TranslateArgs| async move {
                let deps = TranslatorDeps {
                    source_language: args.detected_language,
                    target_lang: ctx.deps.desired_language.clone(),
                };
                let translation = ctx
                    .deps
                    .translator
                    .run_with_options(args.input_text, deps, &ctx.nested_options())
                    .await
                    .map_err(|e| ToolError::Internal(e.into()))?;
                Ok::<_, ToolError>(translation.output.translated_text)
            },
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tandem_core::memory::{MockLlmDriver, MockLlmResponse};
    use tandem_core::{AgentError, CancellationToken, RunOptions};

    const HINDI: &str = "मेंढक पानी से बाहर कूद गया और राजकुमारी की गोद में आ बैठा।";

    fn detected(language: &str) -> MockLlmResponse {
        MockLlmResponse::final_result(json!({"detected_language": language}))
    }

    fn translated(text: &str) -> MockLlmResponse {
        MockLlmResponse::final_result(json!({"translated_text": text}))
    }

    #[tokio::test]
    async fn test_pipeline_feeds_detected_language_to_translator() {
        let detector_driver = MockLlmDriver::with_responses(vec![detected("Hindi")]);
        let translator_driver = MockLlmDriver::with_responses(vec![translated(
            "The frog jumped out of the water and landed on the princess's lap.",
        )]);

        let pipeline = translation_pipeline(
            detector_agent(detector_driver.handle()).unwrap(),
            translator_agent(translator_driver.handle()).unwrap(),
        );
        let result = pipeline
            .run(TranslateRequest {
                input_text: HINDI.to_string(),
                target_lang: "English".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(result.output.detected_language, "Hindi");
        assert_eq!(result.output.desired_language, "English");
        assert_eq!(result.output.input_text, HINDI);

        let calls = translator_driver.calls().await;
        assert!(calls[0]
            .system_prompts()
            .contains(&"You have to convert the text from Hindi to English."));
    }

    #[tokio::test]
    async fn test_prompt_generator_awaits_detector() {
        let detector_driver = MockLlmDriver::with_responses(vec![detected("Hindi")]);
        let translator_driver =
            MockLlmDriver::with_responses(vec![translated("My name is Rahul")]);

        let translator = self_detecting_translator(translator_driver.handle()).unwrap();
        let deps = Arc::new(SelfDetectingDeps::new(
            Arc::new(detector_agent(detector_driver.handle()).unwrap()),
            "English",
            "मेरा नाम राहुल है",
        ));
        let result = translator
            .run("मेरा नाम राहुल है", Arc::clone(&deps))
            .await
            .unwrap();

        assert_eq!(result.output.translated_text, "My name is Rahul");
        let detector_calls = detector_driver.calls().await;
        assert_eq!(detector_calls[0].messages.last().unwrap().content, "मेरा नाम राहुल है");
        let prompts = translator_driver.calls().await[0]
            .system_prompts()
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>();
        assert_eq!(prompts[1], "You have to convert the text from Hindi to English.");
        assert_eq!(deps.detected_language(), Some("Hindi"));
    }

    #[tokio::test]
    async fn test_orchestrator_uses_tools() {
        let detector_driver = MockLlmDriver::with_responses(vec![detected("English")]);
        let translator_driver = MockLlmDriver::with_responses(vec![translated(
            "La grenouille a sauté hors de l'eau.",
        )]);
        let orchestrator_driver = MockLlmDriver::with_responses(vec![
            MockLlmResponse::tool_call(
                "detect_language",
                json!({"input_text": "The frog jumped out of the water."}),
            ),
            MockLlmResponse::tool_call(
                "translate_input_text",
                json!({
                    "input_text": "The frog jumped out of the water.",
                    "detected_language": "English"
                }),
            ),
            MockLlmResponse::final_result(json!({
                "input_text": "The frog jumped out of the water.",
                "detected_language": "English",
                "desired_language": "French",
                "translated_text": "La grenouille a sauté hors de l'eau."
            })),
        ]);

        let orchestrator = orchestrator_agent(orchestrator_driver.handle()).unwrap();
        let deps = OrchestratorDeps {
            detector: Arc::new(detector_agent(detector_driver.handle()).unwrap()),
            translator: Arc::new(translator_agent(translator_driver.handle()).unwrap()),
            desired_language: "French".to_string(),
        };
        let result = orchestrator
            .run("The frog jumped out of the water.", deps)
            .await
            .unwrap();

        assert_eq!(result.output.desired_language, "French");

        let calls = orchestrator_driver.calls().await;
        assert_eq!(calls[1].messages.last().unwrap().content, "English");
        assert_eq!(
            calls[2].messages.last().unwrap().content,
            "La grenouille a sauté hors de l'eau."
        );
        assert!(translator_driver.calls().await[0]
            .system_prompts()
            .contains(&"You have to convert the text from English to French."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_detector_inside_tool() {
        let detector_driver = MockLlmDriver::with_responses(vec![
            detected("English").with_delay(Duration::from_secs(50)),
        ]);
        let translator_driver = MockLlmDriver::new();
        let orchestrator_driver = MockLlmDriver::with_responses(vec![MockLlmResponse::tool_call(
            "detect_language",
            json!({"input_text": "The frog jumped out of the water."}),
        )]);

        let orchestrator = orchestrator_agent(orchestrator_driver.handle()).unwrap();
        let deps = OrchestratorDeps {
            detector: Arc::new(detector_agent(detector_driver.handle()).unwrap()),
            translator: Arc::new(translator_agent(translator_driver.handle()).unwrap()),
            desired_language: "French".to_string(),
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let started = tokio::time::Instant::now();
        let err = orchestrator
            .run_with_options(
                "The frog jumped out of the water.",
                deps,
                &RunOptions::with_cancel(cancel),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(translator_driver.call_count().await, 0);
    }
}
