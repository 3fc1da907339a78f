//! hlang-project 错误类型

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to parse version '{0}': expected M.m.p")]
    Version(String),

    #[error("Failed to parse artifact type '{0}'")]
    ArtifactType(String),

    #[error("Invalid include pattern '{pattern}': {message}")]
    IncludePattern { pattern: String, message: String },
}

pub type ProjectResult<T> = Result<T, ProjectError>;
