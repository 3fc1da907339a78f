//! hlang-jit 错误类型
//!
//! 全部按结果值传播；长时运行的 JIT 操作经返回的句柄延迟上报。
//! 失败的热重载保持旧状态不变并发出诊断，运行器保持存活。

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum JitError {
    /// 物化之后符号仍缺失：内部错误
    #[error("JIT lookup failure for symbol '{symbol}'")]
    LookupFailure { symbol: String },

    /// 源文件无法解析，模块不被安装
    #[error("Parse error in '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    #[error(transparent)]
    Codegen(#[from] hlang_codegen::CodegenError),

    #[error(transparent)]
    Core(#[from] hlang_core::CoreError),

    #[error(transparent)]
    Project(#[from] hlang_project::ProjectError),

    #[error(transparent)]
    Linker(#[from] hlang_codegen::LinkerError),

    /// 后端会话层错误
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Failed to load library '{path}': {message}")]
    LibraryLoad { path: PathBuf, message: String },

    #[error("File watcher error: {0}")]
    Watch(String),

    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type JitResult<T> = Result<T, JitError>;

impl From<cranelift_module::ModuleError> for JitError {
    fn from(error: cranelift_module::ModuleError) -> Self {
        JitError::Backend(error.to_string())
    }
}
