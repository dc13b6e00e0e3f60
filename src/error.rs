use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No dataset loaded. Upload a CSV file first.")]
    NoDataLoaded,

    #[error("Dataset file not found: {0}")]
    NotFound(String),

    #[error("Failed to parse dataset: {0}")]
    Parse(String),

    #[error("LLM provider error: {0}")]
    Provider(String),

    #[error("Could not parse LLM response as JSON. Raw response: {raw}")]
    GenerationParse { raw: String },

    #[error("SQL execution failed: {0}")]
    SqlExecution(String),

    #[error("Unsupported chart type: {0}")]
    UnsupportedChartKind(String),

    #[error("Chart rendering failed: {0}")]
    Render(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
