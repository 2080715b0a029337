// OpenAI-compatible Backends
//
// This crate provides the HTTP side of Tandem: an LlmDriver for the
// chat-completions protocol, model discovery for local servers and the
// resolver that turns a BackendConfig into a ModelHandle.
//
// LM Studio, Ollama, Groq and OpenAI all accept the same request format, so a
// single driver covers every BackendKind.

mod discovery;
mod driver;
mod resolver;
mod types;

pub use discovery::list_models;
pub use driver::{HttpError, OpenAiCompatibleDriver};
pub use resolver::{resolve, ModelResolver};
pub use types::{decode_arguments, ChatRequest, OpenAiMessage, OpenAiResponse};

// Re-export core types for convenience
pub use tandem_core::{BackendConfig, BackendKind, LlmDriver, ModelHandle};
