pub mod completion;
pub mod composer;
pub mod config;
pub mod document;
pub mod draft;
pub mod input;
pub mod logging;
pub mod orchestrator;
pub mod prompts;
pub mod sanitize;

pub use completion::{
    ChatMessage, CompletionClient, GenerationRequest, GenerationResponse, Role, SamplingParams,
};
pub use composer::{ChapterPosition, ComposerLimits, PromptComposer};
pub use config::{ApiConfig, Config, ConfigError, NovelConfig, PromptConfig};
pub use document::{DocumentError, DocumentWriter, NovelDocument};
pub use draft::NovelDraft;
pub use input::{load_inputs, GenerationInput, InputError};
pub use logging::{
    LogFacade, LogLevel, LogRecord, LogSink, SharedLogSink, StdoutLogSink, VecLogSink,
};
pub use orchestrator::{GenerationError, GenerationPhase, GenerationStage, NovelService};
pub use prompts::{PromptArguments, PromptError, PromptRegistry, PromptSource, PromptTemplate};
pub use sanitize::{clean_title, sanitize};
