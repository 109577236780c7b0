use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Data source '{store}' failed: {source}")]
    DataSource {
        store: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Malformed contact_info for student {uuid}: {reason}")]
    MalformedContactInfo { uuid: String, reason: String },

    #[error("Schema assumption violated in '{table}': {detail}")]
    SchemaAssumptionViolation { table: String, detail: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV output failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn schema(table: impl Into<String>, detail: impl Into<String>) -> Self {
        PipelineError::SchemaAssumptionViolation {
            table: table.into(),
            detail: detail.into(),
        }
    }

    pub fn data_source<E>(store: impl Into<String>, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        PipelineError::DataSource {
            store: store.into(),
            source: source.into(),
        }
    }

    /// Short label used for metrics and the run summary
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::DataSource { .. } => "data_source",
            PipelineError::MalformedContactInfo { .. } => "malformed_contact_info",
            PipelineError::SchemaAssumptionViolation { .. } => "schema_assumption_violation",
            PipelineError::Config(_) | PipelineError::Toml(_) => "config",
            PipelineError::Json(_) | PipelineError::Csv(_) | PipelineError::Io(_) => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
