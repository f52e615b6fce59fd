use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{component} is not initialized: index a document first")]
    NotInitialized { component: String },

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("index storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("request failed: {0}")]
    Request(String),

    #[error(transparent)]
    Ingest(#[from] IngestError),
}

impl ChatError {
    pub fn not_initialized(component: impl Into<String>) -> Self {
        ChatError::NotInitialized {
            component: component.into(),
        }
    }

    /// Transport-class failures worth another attempt. Everything else
    /// surfaces to the caller as-is.
    pub fn is_transient(&self) -> bool {
        match self {
            ChatError::Http(error) => error.is_timeout() || error.is_connect(),
            ChatError::BackendResponse { details, .. } => {
                let status = details
                    .split_whitespace()
                    .next()
                    .and_then(|token| token.parse::<u16>().ok());
                matches!(status, Some(429) | Some(500..=599))
            }
            _ => false,
        }
    }
}

pub type Result<T, E = ChatError> = std::result::Result<T, E>;
