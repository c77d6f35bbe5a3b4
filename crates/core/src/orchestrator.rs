use std::fmt;
use thiserror::Error;

use crate::completion::{CompletionClient, GenerationRequest};
use crate::composer::PromptComposer;
use crate::config::DEFAULT_FALLBACK_TITLE;
use crate::draft::NovelDraft;
use crate::input::GenerationInput;
use crate::logging::{LogLevel, LogRecord, LogSink};
use crate::prompts::PromptError;
use crate::sanitize::{clean_title, sanitize};

pub const TITLE_CLEANUP_MAX_CHARS: usize = 20;

const DEFAULT_MAX_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("failed to render prompt for stage {stage}: {source}")]
    Prompt {
        stage: GenerationStage,
        #[source]
        source: PromptError,
    },
    #[error("stage {stage} produced no content")]
    StageFailed { stage: GenerationStage },
    #[error("chapter count must be at least 1")]
    InvalidChapterCount,
}

/// One request/response unit of a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum GenerationStage {
    Outline,
    Title,
    /// 1-based chapter number.
    Chapter(u32),
}

impl fmt::Display for GenerationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outline => f.write_str("大纲"),
            Self::Title => f.write_str("标题"),
            Self::Chapter(number) => write!(f, "第{number}章"),
        }
    }
}

/// Progress of a run. Phases only move forward; a failed chapter still
/// advances to the next one.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GenerationPhase {
    Init,
    OutlineGenerated,
    TitleGenerated,
    /// Chapter `n` has been attempted.
    Chapter(u32),
    Done,
}

impl GenerationPhase {
    /// The stage that moves the run out of this phase, or `None` once every
    /// chapter has been attempted.
    pub fn pending_stage(self, total_chapters: u32) -> Option<GenerationStage> {
        match self {
            Self::Init => Some(GenerationStage::Outline),
            Self::OutlineGenerated => Some(GenerationStage::Title),
            Self::TitleGenerated if total_chapters > 0 => Some(GenerationStage::Chapter(1)),
            Self::Chapter(number) if number < total_chapters => {
                Some(GenerationStage::Chapter(number + 1))
            }
            _ => None,
        }
    }

    /// Phase reached once `stage` has run.
    pub fn after(stage: GenerationStage) -> Self {
        match stage {
            GenerationStage::Outline => Self::OutlineGenerated,
            GenerationStage::Title => Self::TitleGenerated,
            GenerationStage::Chapter(number) => Self::Chapter(number),
        }
    }
}

/// Drives a full run: outline, title, then every chapter in order.
pub struct NovelService<'a> {
    composer: PromptComposer<'a>,
    sink: &'a dyn LogSink,
    max_attempts: usize,
    fallback_title: String,
}

impl<'a> NovelService<'a> {
    pub fn new(composer: PromptComposer<'a>, sink: &'a dyn LogSink) -> Self {
        Self {
            composer,
            sink,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            fallback_title: DEFAULT_FALLBACK_TITLE.to_string(),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_fallback_title(mut self, title: impl Into<String>) -> Self {
        self.fallback_title = title.into();
        self
    }

    /// Runs every stage. Only a failed outline ends the run early; a failed
    /// title falls back to the configured title and a failed chapter leaves an
    /// empty slot.
    pub fn run<C: CompletionClient + ?Sized>(
        &self,
        client: &C,
        input: &GenerationInput,
        user_request: &str,
        total_chapters: u32,
    ) -> Result<NovelDraft, GenerationError> {
        if total_chapters == 0 {
            return Err(GenerationError::InvalidChapterCount);
        }
        self.check_prompts(input, user_request, total_chapters)?;

        let mut draft = NovelDraft::new(String::new());
        let mut phase = GenerationPhase::Init;

        while let Some(stage) = phase.pending_stage(total_chapters) {
            match stage {
                GenerationStage::Outline => {
                    let outline = self.outline_stage(client, input, user_request, total_chapters)?;
                    draft = NovelDraft::new(outline);
                }
                GenerationStage::Title => {
                    let title = self.title_stage(client, draft.outline())?;
                    draft.set_title(title);
                }
                GenerationStage::Chapter(number) => {
                    let text = self.chapter_stage(
                        client,
                        draft.outline(),
                        &input.reference_text,
                        number,
                        total_chapters,
                    )?;
                    draft.push_chapter(text);
                }
            }
            phase = GenerationPhase::after(stage);
            self.log(LogLevel::Debug, format!("阶段推进：{phase:?}"));
        }

        phase = GenerationPhase::Done;
        self.log(LogLevel::Debug, format!("阶段推进：{phase:?}"));

        let failed = draft.failed_chapters();
        if failed.is_empty() {
            self.log(LogLevel::Info, "全部章节生成完成。");
        } else {
            self.log(
                LogLevel::Warn,
                format!(
                    "{}/{} 章生成失败：{:?}",
                    failed.len(),
                    total_chapters,
                    failed
                ),
            );
        }

        Ok(draft)
    }

    /// Renders every stage's prompt once with the real inputs, so a template
    /// that needs an argument the composer never supplies fails the run before
    /// any request is spent.
    fn check_prompts(
        &self,
        input: &GenerationInput,
        user_request: &str,
        total_chapters: u32,
    ) -> Result<(), GenerationError> {
        let result = self
            .composer
            .build_outline_prompt(
                &input.system_instruction,
                &input.reference_text,
                user_request,
                total_chapters,
            )
            .map_err(|source| (GenerationStage::Outline, source))
            .and_then(|_| {
                self.composer
                    .build_title_prompt("")
                    .map_err(|source| (GenerationStage::Title, source))
            })
            .and_then(|_| {
                // One chapter per position covers every directive.
                let mut numbers = vec![1, 2u32.min(total_chapters), total_chapters];
                numbers.dedup();
                numbers.into_iter().try_for_each(|number| {
                    self.composer
                        .build_chapter_prompt("", &input.reference_text, number, total_chapters)
                        .map(|_| ())
                        .map_err(|source| (GenerationStage::Chapter(number), source))
                })
            });

        result.map_err(|(stage, source)| {
            self.log(LogLevel::Error, format!("{stage}提示词模板无效：{source}"));
            GenerationError::Prompt { stage, source }
        })
    }

    fn outline_stage<C: CompletionClient + ?Sized>(
        &self,
        client: &C,
        input: &GenerationInput,
        user_request: &str,
        total_chapters: u32,
    ) -> Result<String, GenerationError> {
        let stage = GenerationStage::Outline;
        self.log(LogLevel::Info, "正在生成小说大纲...");
        let request = self
            .composer
            .build_outline_prompt(
                &input.system_instruction,
                &input.reference_text,
                user_request,
                total_chapters,
            )
            .map_err(|source| GenerationError::Prompt { stage, source })?;

        match self.complete(client, &request) {
            Some(outline) => {
                self.log(
                    LogLevel::Info,
                    format!("大纲生成完成（{} 字）。", outline.chars().count()),
                );
                Ok(outline)
            }
            None => {
                self.log(LogLevel::Error, "大纲生成失败，终止本次生成。");
                Err(GenerationError::StageFailed { stage })
            }
        }
    }

    fn title_stage<C: CompletionClient + ?Sized>(
        &self,
        client: &C,
        outline: &str,
    ) -> Result<String, GenerationError> {
        self.log(LogLevel::Info, "正在生成小说标题...");
        let request = self
            .composer
            .build_title_prompt(outline)
            .map_err(|source| GenerationError::Prompt {
                stage: GenerationStage::Title,
                source,
            })?;

        let title = self
            .complete(client, &request)
            .and_then(|raw| clean_title(&raw, TITLE_CLEANUP_MAX_CHARS));
        match title {
            Some(title) => {
                self.log(LogLevel::Info, format!("小说标题：{title}"));
                Ok(title)
            }
            None => {
                self.log(
                    LogLevel::Warn,
                    format!("标题生成失败，使用默认标题：{}", self.fallback_title),
                );
                Ok(self.fallback_title.clone())
            }
        }
    }

    fn chapter_stage<C: CompletionClient + ?Sized>(
        &self,
        client: &C,
        outline: &str,
        reference_text: &str,
        number: u32,
        total_chapters: u32,
    ) -> Result<String, GenerationError> {
        self.log(
            LogLevel::Info,
            format!("正在生成第{number}/{total_chapters}章..."),
        );
        let request = self
            .composer
            .build_chapter_prompt(outline, reference_text, number, total_chapters)
            .map_err(|source| GenerationError::Prompt {
                stage: GenerationStage::Chapter(number),
                source,
            })?;

        match self.complete(client, &request) {
            Some(text) => {
                self.log(
                    LogLevel::Info,
                    format!("第{number}章生成完成（{} 字）。", text.chars().count()),
                );
                Ok(text)
            }
            None => {
                self.log(
                    LogLevel::Warn,
                    format!("第{number}章生成失败，跳过该章节。"),
                );
                Ok(String::new())
            }
        }
    }

    /// Issues `request` and sanitizes the reply. Empty text after cleanup
    /// counts as no reply.
    fn complete<C: CompletionClient + ?Sized>(
        &self,
        client: &C,
        request: &GenerationRequest,
    ) -> Option<String> {
        let response = client.complete(request, self.max_attempts)?;
        if response.attempts > 1 {
            self.log(
                LogLevel::Debug,
                format!("请求在第 {} 次尝试后成功。", response.attempts),
            );
        }
        let text = sanitize(&response.content);
        if text.is_empty() {
            self.log(LogLevel::Warn, "模型返回的内容清理后为空。");
            return None;
        }
        Some(text)
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.sink.log(LogRecord::new(level, message));
    }
}
