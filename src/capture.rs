pub mod orchestrator;
pub mod source;
pub mod types;
