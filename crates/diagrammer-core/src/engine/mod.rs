pub mod orchestrator;

pub use orchestrator::{Orchestrator, Outcome, PipelineState};
