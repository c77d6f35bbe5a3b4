use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{error, info};
use reqwest::blocking::Client;
use reqwest::header::{self, HeaderValue};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use autowriter_core::config::ApiConfig;
use autowriter_core::{
    ChatMessage, CompletionClient, GenerationRequest, GenerationResponse, SamplingParams,
};

use crate::base_url::resolve_endpoint;
use crate::error::AdapterError;
use crate::retry::{call_with_retry, linear_backoff, BackoffPolicy, RetryConfig};

pub const PROBE_PROMPT: &str = "请简单介绍一下你自己，不超过100字。";
pub const PROBE_MAX_TOKENS: u32 = 200;

const DIAGNOSTIC_CHARS: usize = 200;

/// Waits between attempts. Swapped out in tests so backoff never blocks.
pub type Sleeper = Arc<dyn Fn(Duration) + Send + Sync>;

/// Blocking client for an OpenAI-style `/chat/completions` endpoint.
///
/// Each logical call builds its own HTTP client, so connections never outlive
/// the retries of one request.
pub struct ChatCompletionClient {
    endpoint: String,
    api_key: String,
    model_name: String,
    connect_timeout: Duration,
    read_timeout: Duration,
    base_delay: Duration,
    backoff: BackoffPolicy,
    sampling: SamplingParams,
    sleeper: Sleeper,
}

impl ChatCompletionClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: &str,
        model_name: impl Into<String>,
    ) -> Result<Self, AdapterError> {
        let api_key = api_key.into();
        let model_name = model_name.into();
        if api_key.trim().is_empty() {
            return Err(AdapterError::InvalidConfig(
                "api_key must not be empty".to_string(),
            ));
        }
        if model_name.trim().is_empty() {
            return Err(AdapterError::InvalidConfig(
                "model_name must not be empty".to_string(),
            ));
        }

        let defaults = ApiConfig::default();
        Ok(Self {
            endpoint: resolve_endpoint(base_url),
            api_key,
            model_name,
            connect_timeout: defaults.connect_timeout(),
            read_timeout: defaults.read_timeout(),
            base_delay: defaults.retry_delay(),
            backoff: linear_backoff,
            sampling: SamplingParams {
                temperature: defaults.temperature,
                top_p: defaults.top_p,
            },
            sleeper: Arc::new(thread::sleep),
        })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, AdapterError> {
        Ok(Self::new(&config.api_key, &config.base_url, &config.model_name)?
            .with_timeouts(config.connect_timeout(), config.read_timeout())
            .with_retry_delay(config.retry_delay())
            .with_sampling(SamplingParams {
                temperature: config.temperature,
                top_p: config.top_p,
            }))
    }

    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    pub fn with_retry_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sampling used by [`probe`](Self::probe); staged requests carry their
    /// own.
    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_sleeper<F>(mut self, sleeper: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Like [`CompletionClient::complete`] but keeps the final error.
    pub fn try_complete(
        &self,
        request: &GenerationRequest,
        max_attempts: usize,
    ) -> Result<GenerationResponse, AdapterError> {
        if request.messages().is_empty() {
            return Err(AdapterError::InvalidConfig(
                "request must contain at least one message".to_string(),
            ));
        }

        let http = Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.read_timeout)
            .build()?;
        let config = RetryConfig::new(max_attempts, self.base_delay).with_backoff(self.backoff);

        let (content, attempts) = call_with_retry(
            || self.send_once(&http, request),
            &config,
            |delay| (self.sleeper)(delay),
        )?;
        Ok(GenerationResponse::new(content, attempts))
    }

    /// One short single-attempt call to check credentials and connectivity.
    pub fn probe(&self) -> Result<GenerationResponse, AdapterError> {
        let request = GenerationRequest::new(
            vec![ChatMessage::user(PROBE_PROMPT)],
            PROBE_MAX_TOKENS,
            self.sampling,
        );
        info!("正在测试接口连通性：{}", self.endpoint);
        self.try_complete(&request, 1)
    }

    fn send_once(
        &self,
        http: &Client,
        request: &GenerationRequest,
    ) -> Result<String, AdapterError> {
        let body = ChatCompletionRequest {
            model: &self.model_name,
            messages: request.messages(),
            max_tokens: request.max_tokens(),
            temperature: request.temperature(),
            top_p: request.top_p(),
            stream: false,
        };

        let response = http
            .post(&self.endpoint)
            .header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;
        handle_chat_response(response)
    }
}

impl CompletionClient for ChatCompletionClient {
    fn complete(
        &self,
        request: &GenerationRequest,
        max_attempts: usize,
    ) -> Option<GenerationResponse> {
        match self.try_complete(request, max_attempts) {
            Ok(response) => Some(response),
            Err(err) => {
                error!("请求最终失败：{}", err.diagnostic(DIAGNOSTIC_CHARS));
                None
            }
        }
    }
}

fn handle_chat_response(response: reqwest::blocking::Response) -> Result<String, AdapterError> {
    let status = response.status();
    if status != StatusCode::OK {
        let body = response.text().unwrap_or_default();
        return Err(AdapterError::HttpStatus { status, body });
    }

    let parsed: ChatCompletionResponse = response.json()?;
    extract_choice_content(parsed).ok_or(AdapterError::EmptyResponse)
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn extract_choice_content(response: ChatCompletionResponse) -> Option<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .filter(|content| !content.trim().is_empty())
}
