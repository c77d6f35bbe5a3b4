use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;

use autowriter_core::{DocumentError, DocumentWriter, NovelDocument};

const SEPARATOR_WIDTH: usize = 50;

static UNSAFE_FILENAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[/\\:*?"<>|]"#).expect("valid filename pattern"));

/// Writes `<title>_<YYYYmmdd_HHMMSS>.txt` into a directory.
pub struct PlainTextWriter {
    output_dir: PathBuf,
    clock: fn() -> DateTime<Local>,
}

impl PlainTextWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            clock: Local::now,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Local>) -> Self {
        self.clock = clock;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl DocumentWriter for PlainTextWriter {
    fn write(&self, document: &NovelDocument) -> Result<PathBuf, DocumentError> {
        fs::create_dir_all(&self.output_dir).map_err(|source| DocumentError::CreateDir {
            path: self.output_dir.clone(),
            source,
        })?;

        let now = (self.clock)();
        let file_name = format!(
            "{}_{}.txt",
            safe_file_stem(&document.title),
            now.format("%Y%m%d_%H%M%S")
        );
        let path = self.output_dir.join(file_name);

        let contents = render(document, &now);
        fs::write(&path, contents).map_err(|source| DocumentError::Write {
            path: path.clone(),
            source,
        })?;

        info!("小说已保存到：{}", path.display());
        Ok(path)
    }
}

/// Replaces characters that are not allowed in file names.
pub fn safe_file_stem(title: &str) -> String {
    let replaced = UNSAFE_FILENAME_RE.replace_all(title.trim(), "_");
    if replaced.is_empty() {
        "novel".to_string()
    } else {
        replaced.into_owned()
    }
}

/// Summary of a written document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentPreview {
    pub paragraphs: usize,
    pub char_count: usize,
    pub excerpt: String,
}

/// Reads `path` and keeps its first `max_chars` characters of text.
pub fn preview_document(path: &Path, max_chars: usize) -> Result<DocumentPreview, DocumentError> {
    let contents = fs::read_to_string(path).map_err(|source| DocumentError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let paragraphs: Vec<&str> = contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect();
    let text = paragraphs.join("\n");
    let char_count = text.chars().count();

    let mut excerpt: String = text.chars().take(max_chars).collect();
    if char_count > max_chars {
        excerpt.push_str("...");
    }

    Ok(DocumentPreview {
        paragraphs: paragraphs.len(),
        char_count,
        excerpt,
    })
}

fn render(document: &NovelDocument, now: &DateTime<Local>) -> String {
    let mut output = format!(
        "{}\n\n生成时间：{}\n{}\n\n",
        document.title,
        now.format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(SEPARATOR_WIDTH)
    );
    for paragraph in document
        .body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
    {
        output.push_str(paragraph);
        output.push('\n');
    }
    output
}
