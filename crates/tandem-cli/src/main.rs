// Tandem CLI
//
// Design Decision: Use clap derive for argument parsing; backend flags fall back to TANDEM_* env vars.
// Design Decision: Support text/json/yaml output formats for scripting.
// Design Decision: One resolved model handle is shared by every agent of a demo.

mod demos;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use demos::translation::{self, OrchestratorDeps, SelfDetectingDeps, TranslateRequest};
use output::{format_messages, print_field, print_heading, OutputFormat};
use std::sync::Arc;
use tandem_core::{BackendConfig, BackendKind, CancellationToken, ModelHandle, RunOptions};
use tandem_openai::ModelResolver;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tandem")]
#[command(about = "Tandem CLI - Run typed multi-agent LLM pipelines")]
#[command(version)]
pub struct Cli {
    /// LLM backend (lm_studio, openai_compatible, ollama, groq, openai)
    #[arg(long, global = true, env = "TANDEM_BACKEND", default_value = "ollama")]
    pub backend: BackendKind,

    /// Model id (required for ollama, groq and openai; optional pin for discovery backends)
    #[arg(long, global = true, env = "TANDEM_MODEL")]
    pub model: Option<String>,

    /// Backend base URL override
    #[arg(long, global = true, env = "TANDEM_BASE_URL")]
    pub base_url: Option<String>,

    /// API key override
    #[arg(long, global = true, env = "TANDEM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Output format
    #[arg(long, short, global = true, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Print the full conversation of agent runs
    #[arg(long, global = true)]
    pub show_messages: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask the bank support agent a question
    BankSupport {
        /// Customer question
        #[arg(long, alias = "input_text")]
        input_text: String,

        /// Customer id (123 is a known customer)
        #[arg(long, alias = "customer_id")]
        customer_id: u32,
    },

    /// Detect the language of a text and translate it
    Translate {
        /// Text to translate
        #[arg(long, alias = "input_text")]
        input_text: String,

        /// Language to translate to
        #[arg(long, alias = "target_lang")]
        target_lang: String,

        /// How the detector and translator are composed
        #[arg(long, value_enum, default_value = "pipeline")]
        mode: TranslateMode,
    },

    /// Generate a plot, its characters and one scene for a theme
    Storyteller {
        /// Theme of the story
        #[arg(long)]
        theme: String,

        /// Scene number to write
        #[arg(long, alias = "scene_num", default_value = "1")]
        scene_num: u32,
    },

    /// Ask a one-sentence question (backend smoke test)
    Ask {
        /// Question text
        #[arg(long, alias = "input_text")]
        input_text: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TranslateMode {
    /// Two-stage pipeline: detect, then translate
    Pipeline,
    /// The translator's prompt generator runs the detector
    Prompt,
    /// An orchestrating agent calls detect/translate as tools
    Tools,
}

impl Cli {
    fn backend_config(&self) -> BackendConfig {
        let mut config = BackendConfig::new(self.backend);
        config.base_url = self.base_url.clone();
        config.api_key = self.api_key.clone();
        config.model = self.model.clone();
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before parsing so TANDEM_* values reach clap
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tandem=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Ok(path) = dotenv {
        tracing::debug!("Loaded .env from {:?}", path);
    }

    let cli = Cli::parse();

    let config = cli.backend_config();
    let model = ModelResolver::new()
        .resolve(&config)
        .await
        .with_context(|| format!("Failed to resolve a model for backend '{}'", config.kind))?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling run");
            on_interrupt.cancel();
        }
    });
    let options = RunOptions::with_cancel(cancel);

    run(&cli, model, &options).await
}

async fn run(cli: &Cli, model: ModelHandle, options: &RunOptions) -> Result<()> {
    let out = cli.output;

    match &cli.command {
        Commands::BankSupport {
            input_text,
            customer_id,
        } => {
            let result = demos::bank_support::run(model, input_text, *customer_id, options).await?;
            if cli.show_messages && out.is_text() {
                print_heading("Messages");
                println!("{}\n", format_messages(result.all_messages()));
            }
            let support = result.output();
            out.print(support, || {
                [
                    ("Support advice", support.support_advice.clone()),
                    ("Block card", support.block_card.to_string()),
                    ("Risk", support.risk.to_string()),
                ]
                .iter()
                .map(|(label, value)| format!("{:<20} {}", format!("{}:", label), value))
                .collect::<Vec<_>>()
                .join("\n")
            })
        }

        Commands::Translate {
            input_text,
            target_lang,
            mode,
        } => {
            let report = match mode {
                TranslateMode::Pipeline => {
                    let pipeline = translation::translation_pipeline(
                        translation::detector_agent(model.clone())?,
                        translation::translator_agent(model)?,
                    );
                    let result = pipeline
                        .run_with_options(
                            TranslateRequest {
                                input_text: input_text.clone(),
                                target_lang: target_lang.clone(),
                            },
                            options,
                        )
                        .await?;
                    if cli.show_messages && out.is_text() {
                        print_heading("Stages");
                        for stage in &result.stages {
                            print_field(&stage.name, &stage.output.to_string());
                        }
                        println!();
                    }
                    result.output
                }
                TranslateMode::Prompt => {
                    let translator = translation::self_detecting_translator(model.clone())?;
                    let deps = Arc::new(SelfDetectingDeps::new(
                        Arc::new(translation::detector_agent(model)?),
                        target_lang.as_str(),
                        input_text.as_str(),
                    ));
                    let result = translator
                        .run_with_options(input_text.as_str(), Arc::clone(&deps), options)
                        .await?;
                    if cli.show_messages && out.is_text() {
                        print_heading("Messages");
                        println!("{}\n", format_messages(result.all_messages()));
                    }
                    let detected = deps.detected_language().unwrap_or("unknown").to_string();
                    translation::TranslationReport {
                        input_text: input_text.clone(),
                        detected_language: detected,
                        desired_language: target_lang.clone(),
                        translated_text: result.into_output().translated_text,
                    }
                }
                TranslateMode::Tools => {
                    let orchestrator = translation::orchestrator_agent(model.clone())?;
                    let deps = OrchestratorDeps {
                        detector: Arc::new(translation::detector_agent(model.clone())?),
                        translator: Arc::new(translation::translator_agent(model)?),
                        desired_language: target_lang.clone(),
                    };
                    let result = orchestrator
                        .run_with_options(input_text.as_str(), deps, options)
                        .await?;
                    if cli.show_messages && out.is_text() {
                        print_heading("Messages");
                        println!("{}\n", format_messages(result.all_messages()));
                    }
                    result.into_output()
                }
            };

            out.print(&report, || {
                format!(
                    "{} ({}) -> {}\n{}",
                    report.input_text,
                    report.detected_language,
                    report.desired_language,
                    report.translated_text
                )
            })
        }

        Commands::Storyteller { theme, scene_num } => {
            let pipeline = demos::storyteller::story_pipeline(model, *scene_num)?;
            let result = pipeline.run_with_options(theme.clone(), options).await?;
            let story = &result.output;

            if !out.is_text() {
                return out.print(story, String::new);
            }

            print_heading("Plot");
            print_field("Characters", &story.plot.characters.join(", "));
            print_field("Setting", &story.plot.setting);
            print_field("Inciting incident", &story.plot.inciting_incident);
            print_field("Action", &story.plot.action);
            print_field("Climax", &story.plot.climax);
            print_field("Resolution", &story.plot.resolution);
            println!();

            print_heading("Characters");
            for character in &story.characters.character_traits {
                print_field(&character.name, &character.personality);
            }
            println!();

            print_heading(&format!("Scene {}", scene_num));
            println!("{}", story.scene);
            Ok(())
        }

        Commands::Ask { input_text } => {
            let result = demos::ask_agent(model)?
                .run_with_options(input_text.as_str(), (), options)
                .await?;
            if cli.show_messages && out.is_text() {
                print_heading("Messages");
                println!("{}\n", format_messages(result.all_messages()));
            }
            let answer = result.output();
            out.print(answer, || answer.clone())
        }
    }
}
