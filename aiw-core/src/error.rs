use std::fmt::{self, Display, Formatter};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    Io(#[from] std::io::Error),
    Command(String),
    Timeout { command: String, seconds: u64 },
    Dependency(String),
    Validation(String),
    Serialization(String),
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            CoreError::Io(e) => write!(f, "I/O error: {}", e),
            CoreError::Command(s) => write!(f, "Command failed: {}", s),
            CoreError::Timeout { command, seconds } => {
                write!(f, "Command timed out: '{}' exceeded {}s", command, seconds)
            }
            CoreError::Dependency(s) => write!(f, "Dependency not found: {}", s),
            CoreError::Validation(s) => write!(f, "Validation error: {}", s),
            CoreError::Serialization(s) => write!(f, "Serialization error: {}", s),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
