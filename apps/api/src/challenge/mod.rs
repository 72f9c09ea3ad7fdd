// Challenge generation: prompt building, the pipeline orchestrator and its HTTP handlers.
// All completion calls go through llm_client; all repository work through provisioning.

pub mod handlers;
pub mod pipeline;
pub mod prompts;
