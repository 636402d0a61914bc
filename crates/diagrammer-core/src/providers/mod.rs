pub mod llm;
pub mod render;
