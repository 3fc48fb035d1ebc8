pub mod chart;
pub mod ingest;
pub mod llm_agent;
pub mod prompt;
pub mod sort_view;
