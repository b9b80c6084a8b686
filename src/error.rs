use std::fmt;

use thiserror::Error;

/// Which level of the navigation tree a lookup failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Book,
    Chapter,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Book => f.write_str("book"),
            Level::Chapter => f.write_str("chapter"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CategorizeError {
    #[error("no enclosing {level} for part {part}")]
    NotFound { part: u32, level: Level },

    #[error("part {part} is malformed: {reason}")]
    MalformedInput { part: u32, reason: String },

    #[error("part {part} is a header at end of stream, book or chapter cannot be told apart")]
    AmbiguousClassification { part: u32 },

    #[error("part {part} is missing from the store")]
    MissingPart { part: u32 },

    #[error("checkpoint was written by the {found} strategy, this run uses {expected}")]
    CheckpointMismatch { expected: String, found: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl CategorizeError {
    pub fn malformed(part: u32, reason: impl Into<String>) -> Self {
        CategorizeError::MalformedInput {
            part,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CategorizeError>;
