mod base_url;
mod completion;
mod error;
mod retry;
mod writer;

pub use base_url::resolve_endpoint;
pub use completion::{ChatCompletionClient, Sleeper, PROBE_MAX_TOKENS, PROBE_PROMPT};
pub use error::AdapterError;
pub use retry::{call_with_retry, linear_backoff, BackoffPolicy, RetryConfig, RetryState};
pub use writer::{preview_document, safe_file_stem, DocumentPreview, PlainTextWriter};

pub use autowriter_core::config::{ApiConfig, Config};
