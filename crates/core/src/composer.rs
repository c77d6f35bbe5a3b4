use crate::completion::{ChatMessage, GenerationRequest, SamplingParams};
use crate::config::NovelConfig;
use crate::prompts::{PromptError, PromptRegistry};
use crate::sanitize::truncate_chars;

pub const OUTLINE_REFERENCE_CHARS: usize = 2_000;
pub const TITLE_OUTLINE_CHARS: usize = 1_000;
pub const CHAPTER_OUTLINE_CHARS: usize = 600;
pub const CHAPTER_REFERENCE_CHARS: usize = 500;
pub const TITLE_MAX_CHARS: usize = 15;

const CHAPTER_RANGE_STEP: u32 = 500;

/// Where a chapter sits in the story, which decides its authorial directive.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChapterPosition {
    Opening,
    Middle,
    Closing,
}

impl ChapterPosition {
    /// `chapter_index` is 1-based. A single-chapter story opens rather than
    /// closes.
    pub fn of(chapter_index: u32, total_chapters: u32) -> Self {
        if chapter_index <= 1 {
            Self::Opening
        } else if chapter_index >= total_chapters {
            Self::Closing
        } else {
            Self::Middle
        }
    }

    fn directive_key(self) -> &'static str {
        match self {
            Self::Opening => "chapter_directive_opening",
            Self::Middle => "chapter_directive_middle",
            Self::Closing => "chapter_directive_closing",
        }
    }
}

/// Word and token budgets the builders embed into prompts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ComposerLimits {
    pub word_budget: u32,
    pub outline_word_target: u32,
    pub outline_max_tokens: u32,
    pub title_max_tokens: u32,
}

impl Default for ComposerLimits {
    fn default() -> Self {
        Self::from(&NovelConfig::default())
    }
}

impl From<&NovelConfig> for ComposerLimits {
    fn from(config: &NovelConfig) -> Self {
        Self {
            word_budget: config.word_budget,
            outline_word_target: config.outline_word_target,
            outline_max_tokens: config.outline_max_tokens,
            title_max_tokens: config.title_max_tokens,
        }
    }
}

/// Builds the outline, title and chapter requests. Every builder is a pure
/// function of its arguments and the template registry.
pub struct PromptComposer<'a> {
    prompts: &'a PromptRegistry,
    sampling: SamplingParams,
    limits: ComposerLimits,
}

impl<'a> PromptComposer<'a> {
    pub fn new(prompts: &'a PromptRegistry) -> Self {
        Self {
            prompts,
            sampling: SamplingParams::default(),
            limits: ComposerLimits::default(),
        }
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_limits(mut self, limits: ComposerLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> &ComposerLimits {
        &self.limits
    }

    pub fn build_outline_prompt(
        &self,
        system_instruction: &str,
        reference_text: &str,
        user_request: &str,
        total_chapters: u32,
    ) -> Result<GenerationRequest, PromptError> {
        let (words_min, words_max) =
            chapter_word_range(self.limits.outline_word_target, total_chapters);
        let user = self.prompts.format_with(
            "outline_request",
            [
                ("user_request", user_request.trim().to_string()),
                (
                    "reference_text",
                    truncate_chars(reference_text, OUTLINE_REFERENCE_CHARS).to_string(),
                ),
                (
                    "outline_word_target",
                    self.limits.outline_word_target.to_string(),
                ),
                ("total_chapters", total_chapters.to_string()),
                ("chapter_words_min", words_min.to_string()),
                ("chapter_words_max", words_max.to_string()),
            ],
        )?;

        Ok(self.request(
            system_instruction.to_string(),
            user,
            self.limits.outline_max_tokens,
        ))
    }

    pub fn build_title_prompt(&self, outline: &str) -> Result<GenerationRequest, PromptError> {
        let system = self
            .prompts
            .format_with("title_system", std::iter::empty::<(String, String)>())?;
        let user = self.prompts.format_with(
            "title_request",
            [
                (
                    "outline",
                    truncate_chars(outline, TITLE_OUTLINE_CHARS).to_string(),
                ),
                ("title_max_chars", TITLE_MAX_CHARS.to_string()),
            ],
        )?;

        Ok(self.request(system, user, self.limits.title_max_tokens))
    }

    /// `chapter_index` is 1-based.
    pub fn build_chapter_prompt(
        &self,
        outline: &str,
        reference_text: &str,
        chapter_index: u32,
        total_chapters: u32,
    ) -> Result<GenerationRequest, PromptError> {
        let target_words = target_words(self.limits.word_budget, total_chapters);
        let position = ChapterPosition::of(chapter_index, total_chapters);
        let directive = self.prompts.format_with(
            position.directive_key(),
            std::iter::empty::<(String, String)>(),
        )?;

        let system = self.prompts.format_with(
            "chapter_system",
            [
                ("chapter_number", chapter_index.to_string()),
                ("total_chapters", total_chapters.to_string()),
                ("target_words", target_words.to_string()),
            ],
        )?;
        let user = self.prompts.format_with(
            "chapter_request",
            [
                ("chapter_number", chapter_index.to_string()),
                ("total_chapters", total_chapters.to_string()),
                ("target_words", target_words.to_string()),
                (
                    "outline",
                    truncate_chars(outline, CHAPTER_OUTLINE_CHARS).to_string(),
                ),
                (
                    "reference_text",
                    truncate_chars(reference_text, CHAPTER_REFERENCE_CHARS).to_string(),
                ),
                ("directive", directive),
            ],
        )?;

        Ok(self.request(system, user, chapter_token_ceiling(target_words)))
    }

    fn request(&self, system: String, user: String, max_tokens: u32) -> GenerationRequest {
        GenerationRequest::new(
            vec![ChatMessage::system(system), ChatMessage::user(user)],
            max_tokens,
            self.sampling,
        )
    }
}

/// Per-chapter word target: the budget split evenly, rounded down.
pub fn target_words(word_budget: u32, total_chapters: u32) -> u32 {
    word_budget / total_chapters.max(1)
}

/// Response token ceiling for a chapter of `target_words` words, i.e.
/// `floor(target_words * 1.5)`.
pub fn chapter_token_ceiling(target_words: u32) -> u32 {
    target_words.saturating_mul(3) / 2
}

/// Per-chapter word range quoted in the outline prompt: the even share rounded
/// down to a multiple of 500, up to 500 more.
pub fn chapter_word_range(outline_word_target: u32, total_chapters: u32) -> (u32, u32) {
    let share = outline_word_target / total_chapters.max(1);
    let low = share / CHAPTER_RANGE_STEP * CHAPTER_RANGE_STEP;
    (low, low + CHAPTER_RANGE_STEP)
}
