//! Error types shared by every part of the engine.
//!
//! Setters reject invalid input and keep the previous value; nothing here is
//! fatal to the host process.

/// Invalid text filter configuration. The previous filter stays in place.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("delimiter set must not be empty")]
    EmptyDelimiters,

    #[error("delimiters must not be empty strings")]
    EmptyDelimiter,
}

/// A cloud parameter outside its valid range.
///
/// `OutOfRange::nearest` is the closest valid value; applying it is left to
/// the caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} = {value} is out of range (nearest valid value: {nearest})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        nearest: f64,
    },

    #[error("{field} must be a number")]
    NotANumber { field: &'static str },

    #[error("unknown display style: {0:?}")]
    UnknownDisplayStyle(String),

    #[error("attribute {0:?} is listed more than once")]
    DuplicateAttribute(String),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("a cloud named {0:?} already exists in this collection")]
    DuplicateCloudName(String),

    #[error("no cloud named {0:?}")]
    UnknownCloud(String),

    #[error("{0} has been destroyed")]
    Destroyed(String),

    #[error("no {0} left to allocate")]
    Exhausted(&'static str),

    #[error("export failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
