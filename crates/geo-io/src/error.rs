//! Error types for named-array persistence.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IoError>;

#[derive(Error, Debug)]
pub enum IoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("named array '{0}' not found in archive")]
    ArrayNotFound(String),

    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },

    #[error("corrupt archive header: {0}")]
    CorruptHeader(String),

    #[error("array name '{0}' exceeds the fixed header width of {1} bytes")]
    NameTooLong(String, usize),

    #[error("element width mismatch for '{name}': archive has {actual}, caller expected {expected}")]
    WidthMismatch {
        name: String,
        actual: usize,
        expected: usize,
    },

    #[error("frame {0} not found in '{1}'")]
    FrameNotFound(usize, String),
}
