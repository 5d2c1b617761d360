pub mod ai_gateway;
pub mod analysis_history;
pub mod config;
pub mod garment_ai;
pub mod garment_prompts;
pub mod garment_vocabulary;
pub mod response_interpreter;
