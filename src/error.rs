//! Error type shared by every stage.
//!
//! Recoverable conditions (ambiguous extensions, slot races) never reach this
//! type; they are handled structurally by the stage that meets them.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid DNA base: {0:?}")]
    InvalidBase(char),

    /// Persisted state does not match its declared shape.
    #[error("malformed {}: {detail}", path.display())]
    Malformed { path: PathBuf, detail: String },

    /// A graph invariant no longer holds; the message names the node/edge.
    #[error("graph invariant violated: {0}")]
    Inconsistent(String),

    #[error("cuckoo filter overfull after {kicks} evictions, rebuild with a larger capacity")]
    FilterOverfull { kicks: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn malformed(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Error::Malformed {
            path: path.into(),
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
