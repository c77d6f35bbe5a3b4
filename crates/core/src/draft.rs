const SECTION_RULE_WIDTH: usize = 50;

/// The aggregate built up across one run.
///
/// The outline is fixed at construction, the title is set once, and chapters
/// are only ever appended. A chapter that failed to generate is kept as an
/// empty string so positions stay aligned with chapter numbers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NovelDraft {
    outline: String,
    title: Option<String>,
    chapters: Vec<String>,
}

impl NovelDraft {
    pub fn new(outline: impl Into<String>) -> Self {
        Self {
            outline: outline.into(),
            title: None,
            chapters: Vec::new(),
        }
    }

    pub fn outline(&self) -> &str {
        &self.outline
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }

    /// Sets the title. Returns `false` and keeps the existing one if a title
    /// was already set.
    pub fn set_title(&mut self, title: impl Into<String>) -> bool {
        if self.title.is_some() {
            return false;
        }
        self.title = Some(title.into());
        true
    }

    pub fn push_chapter(&mut self, text: impl Into<String>) {
        self.chapters.push(text.into());
    }

    pub fn chapters(&self) -> &[String] {
        &self.chapters
    }

    /// 1-based numbers of chapters that came back empty.
    pub fn failed_chapters(&self) -> Vec<u32> {
        self.chapters
            .iter()
            .zip(1u32..)
            .filter(|(text, _)| text.is_empty())
            .map(|(_, number)| number)
            .collect()
    }

    /// Outline section followed by every non-empty chapter.
    pub fn body(&self) -> String {
        let rule = "=".repeat(SECTION_RULE_WIDTH);
        let mut body = format!("小说大纲：\n{}\n\n{rule}\n正文内容：\n{rule}\n\n", self.outline);
        for chapter in self.chapters.iter().filter(|text| !text.is_empty()) {
            body.push_str(chapter);
            body.push_str("\n\n");
        }
        body
    }
}
