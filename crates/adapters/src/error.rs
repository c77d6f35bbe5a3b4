use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to parse response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid adapter configuration: {0}")]
    InvalidConfig(String),
    #[error("unexpected http status {status}: {body}")]
    HttpStatus { status: StatusCode, body: String },
    #[error("operation failed after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: usize,
        #[source]
        source: Box<AdapterError>,
    },
    #[error("API returned an empty response")]
    EmptyResponse,
}

impl AdapterError {
    pub fn retry_exhausted(attempts: usize, source: AdapterError) -> Self {
        AdapterError::RetryExhausted {
            attempts,
            source: Box::new(source),
        }
    }

    /// Short form for log lines: status plus the head of the body for rejected
    /// responses, the message otherwise.
    pub fn diagnostic(&self, max_chars: usize) -> String {
        match self {
            AdapterError::HttpStatus { status, body } => {
                let head: String = body.chars().take(max_chars).collect();
                format!("HTTP {}: {}", status.as_u16(), head)
            }
            AdapterError::RetryExhausted { source, .. } => source.diagnostic(max_chars),
            other => other.to_string().chars().take(max_chars).collect(),
        }
    }
}
