pub mod api_server;
pub mod chart;
pub mod config;
pub mod dataset;
pub mod error;
pub mod executor;
pub mod llm;
pub mod pipeline;
pub mod synthesizer;
