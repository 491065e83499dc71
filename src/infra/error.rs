use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to build the source http client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("source url `{url}` cannot address the rest api: {reason}")]
    SourceUrl { url: String, reason: String },
    #[error("source api key is not a valid header value")]
    InvalidApiKey,
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl InfraError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
