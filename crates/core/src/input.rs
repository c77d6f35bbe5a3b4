use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("input file `{path}` does not exist")]
    Missing { path: PathBuf },
    #[error("failed to read input file `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("input file `{path}` is empty")]
    Empty { path: PathBuf },
}

/// The two required text inputs of a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationInput {
    pub system_instruction: String,
    pub reference_text: String,
}

impl GenerationInput {
    pub fn new(system_instruction: impl Into<String>, reference_text: impl Into<String>) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            reference_text: reference_text.into(),
        }
    }
}

/// Reads the system instruction and the reference text. Both must exist and
/// hold something other than whitespace.
pub fn load_inputs(
    system_path: impl AsRef<Path>,
    reference_path: impl AsRef<Path>,
) -> Result<GenerationInput, InputError> {
    let system_instruction = read_required(system_path.as_ref())?;
    let reference_text = read_required(reference_path.as_ref())?;
    Ok(GenerationInput {
        system_instruction,
        reference_text,
    })
}

fn read_required(path: &Path) -> Result<String, InputError> {
    let contents = fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            InputError::Missing {
                path: path.to_path_buf(),
            }
        } else {
            InputError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    let trimmed = contents.trim();
    if trimmed.is_empty() {
        return Err(InputError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(trimmed.to_string())
}
