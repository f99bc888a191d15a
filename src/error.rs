use serde::Serialize;

pub type IngestResult<T> = Result<T, IngestError>;

/// Machine-readable failure category, for the shell to pick a presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Schema,
    EmptyResult,
    SourceRead,
}

/// Failures that abort an ingestion. Individual bad rows never end up here.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("CSV is missing required column(s): {}", .missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error(
        "No valid data found ({rejected} row(s) rejected). Please ensure the file has columns: name, latitude, longitude, value, category"
    )]
    EmptyResult { rejected: usize },

    #[error("Failed to read {locator}: {source}")]
    SourceRead {
        locator: String,
        #[source]
        source: std::io::Error,
    },
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Schema { .. } => ErrorKind::Schema,
            IngestError::EmptyResult { .. } => ErrorKind::EmptyResult,
            IngestError::SourceRead { .. } => ErrorKind::SourceRead,
        }
    }

    /// Only source failures can succeed on a plain retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::SourceRead { .. })
    }
}
