use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SitsegError>;

#[derive(Debug, Error)]
pub enum SitsegError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config error at {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: burn::config::ConfigError,
    },
    #[error("cannot collate an empty batch")]
    EmptyBatch,
    #[error("item {index} has no {field}")]
    Empty { index: usize, field: &'static str },
    #[error("item {index} has {field} = {found}, expected {expected}")]
    ShapeMismatch {
        index: usize,
        field: &'static str,
        expected: usize,
        found: usize,
    },
}
