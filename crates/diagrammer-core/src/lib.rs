pub mod cache;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fingerprint;
pub mod generator;
pub mod model;
pub mod prompts;
pub mod providers;
pub mod render;
pub mod storage;
pub mod templates;

pub use engine::{Orchestrator, Outcome, PipelineState};
