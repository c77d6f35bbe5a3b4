use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::draft::NovelDraft;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to prepare output directory `{path}`: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write document `{path}`: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read document `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What the writer receives: a title and a body. Layout is the writer's
/// business.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NovelDocument {
    pub title: String,
    pub body: String,
}

impl NovelDocument {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

impl From<&NovelDraft> for NovelDocument {
    fn from(draft: &NovelDraft) -> Self {
        Self::new(draft.title(), draft.body())
    }
}

/// Persists a finished document and reports where it went.
pub trait DocumentWriter {
    fn write(&self, document: &NovelDocument) -> Result<PathBuf, DocumentError>;
}
