use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Role::System => "system",
            Role::User => "user",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
        }
    }
}

/// One completion call: role-tagged messages plus the response token ceiling
/// and sampling parameters. Built once per call and never mutated.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    sampling: SamplingParams,
}

impl GenerationRequest {
    pub fn new(messages: Vec<ChatMessage>, max_tokens: u32, sampling: SamplingParams) -> Self {
        Self {
            messages,
            max_tokens,
            sampling,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn temperature(&self) -> f32 {
        self.sampling.temperature
    }

    pub fn top_p(&self) -> f32 {
        self.sampling.top_p
    }

    /// Content of the first message with `role`, if any.
    pub fn content_of(&self, role: Role) -> Option<&str> {
        self.messages
            .iter()
            .find(|message| message.role == role)
            .map(|message| message.content.as_str())
    }
}

/// Text returned by a successful completion call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationResponse {
    pub content: String,
    pub attempts: usize,
}

impl GenerationResponse {
    pub fn new(content: impl Into<String>, attempts: usize) -> Self {
        Self {
            content: content.into(),
            attempts,
        }
    }
}

/// A completion endpoint with its own failure handling.
///
/// `complete` never fails loudly: transport errors and rejected responses are
/// retried inside the implementation and surface only as `None` once
/// `max_attempts` calls have been spent.
pub trait CompletionClient: Send + Sync {
    fn complete(
        &self,
        request: &GenerationRequest,
        max_attempts: usize,
    ) -> Option<GenerationResponse>;
}

impl<C: CompletionClient + ?Sized> CompletionClient for &C {
    fn complete(
        &self,
        request: &GenerationRequest,
        max_attempts: usize,
    ) -> Option<GenerationResponse> {
        (**self).complete(request, max_attempts)
    }
}

impl<C: CompletionClient + ?Sized> CompletionClient for Box<C> {
    fn complete(
        &self,
        request: &GenerationRequest,
        max_attempts: usize,
    ) -> Option<GenerationResponse> {
        (**self).complete(request, max_attempts)
    }
}
