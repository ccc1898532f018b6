use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid path: {0}")]
    PathError(PathBuf),
    #[error("Could not read tags: {0}")]
    ReadTagError(String),
    #[error("Could not write tags: {0}")]
    WriteTagError(String),
    #[error("Format string is not valid: {0}")]
    InvalidFormat(String),
    #[error("Formatter '%{0}%' is not valid")]
    UnknownField(String),
    #[error("Value '{value}' is not valid for %{field}%")]
    InvalidValue { field: String, value: String },
    #[error("Cannot rename to '{}', file already exists", .0.display())]
    RenameConflict(PathBuf),
    #[error("Directory scan failed: {0}")]
    ScanError(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl From<lofty::error::LoftyError> for AppError {
    fn from(err: lofty::error::LoftyError) -> AppError {
        AppError::ReadTagError(err.to_string())
    }
}

impl From<regex::Error> for AppError {
    fn from(err: regex::Error) -> AppError {
        AppError::InvalidFormat(err.to_string())
    }
}

impl From<globwalk::GlobError> for AppError {
    fn from(err: globwalk::GlobError) -> AppError {
        AppError::ScanError(err.to_string())
    }
}

impl From<globwalk::WalkError> for AppError {
    fn from(err: globwalk::WalkError) -> AppError {
        AppError::ScanError(err.to_string())
    }
}
