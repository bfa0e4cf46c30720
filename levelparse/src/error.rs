use std::path::PathBuf;
use thiserror::Error;

use shared::LiteralError;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("{0:?} not found")]
    NotFound(PathBuf),

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed {kind} entry with literal {literal:?}")]
    MalformedEntry { kind: &'static str, literal: String },

    #[error("could not resolve {0}")]
    AmbiguousResolution(String),
}

impl ExtractError {
    pub fn malformed(kind: &'static str, err: LiteralError) -> Self {
        ExtractError::MalformedEntry {
            kind,
            literal: err.literal().to_owned(),
        }
    }
}
