// Demo agents and pipelines

pub mod bank_support;
pub mod storyteller;
pub mod translation;

use tandem_core::{Agent, ModelHandle, Result};

/// Single-sentence smoke test for a backend
pub fn ask_agent(model: ModelHandle) -> Result<Agent<(), String>> {
    Agent::builder("ask", model)
        .system_prompt("Be concise, reply with only one sentence.")
        .build()
}
