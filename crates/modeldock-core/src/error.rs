//! Error types for modeldock.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid runtimes config: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("unknown template variable {{{0}}}")]
    UnknownTemplateVar(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
