//! hlang-core 错误类型

use std::path::PathBuf;

use thiserror::Error;

/// IR 与声明数据库错误
#[derive(Error, Debug)]
pub enum CoreError {
    /// 别名链成环
    #[error("Cyclic alias chain detected while resolving '{module_name}.{declaration_name}'")]
    CyclicAlias {
        module_name: String,
        declaration_name: String,
    },

    /// `(module, name)` 冲突。替换必须显式移除旧条目。
    #[error("Declaration '{module_name}.{declaration_name}' is already registered")]
    DuplicateDeclaration {
        module_name: String,
        declaration_name: String,
    },

    /// 未知的自定义类型引用或声明
    #[error("Unknown declaration '{module_name}.{declaration_name}'")]
    UnknownDeclaration {
        module_name: String,
        declaration_name: String,
    },

    /// 语句内表达式下标越界
    #[error("Expression index {index} is out of bounds in a statement with {count} expressions")]
    InvalidExpressionIndex { index: usize, count: usize },

    /// 序列化或反序列化失败
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// 文件读写失败，携带路径
    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// hlang-core 结果类型
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CoreError::CyclicAlias {
            module_name: "m".to_string(),
            declaration_name: "X".to_string(),
        };
        assert!(error.to_string().contains("Cyclic alias"));
        assert!(error.to_string().contains("m.X"));
    }

    #[test]
    fn test_duplicate_declaration_display() {
        let error = CoreError::DuplicateDeclaration {
            module_name: "m".to_string(),
            declaration_name: "f".to_string(),
        };
        assert!(error.to_string().contains("already registered"));
    }
}
