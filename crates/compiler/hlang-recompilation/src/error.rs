//! hlang-recompilation 错误类型

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecompilationError {
    /// 反向依赖解析失败（上报后跳过，绝不静默纳入重编译集合）
    #[error("Could not read module '{module_name}': {message}")]
    ModuleUnavailable {
        module_name: String,
        message: String,
    },

    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type RecompilationResult<T> = Result<T, RecompilationError>;
