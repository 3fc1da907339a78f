//! hlang-codegen 错误类型
//!
//! 全部按结果值传播；单个函数的降级在首个错误处短路，
//! 同模块的其余函数不受影响。

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodegenError {
    /// 降级中的空洞：未覆盖的表达式形态。编译器缺陷，中止当前函数。
    #[error("Unsupported expression kind: {0}")]
    UnsupportedExpression(String),

    /// 后端无法表示的类型
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    /// 自定义类型引用无法通过声明数据库解析
    #[error("Type resolution failure: {0}")]
    TypeResolutionFailure(String),

    /// 调用实参数量与声明不符
    #[error("Arity mismatch calling '{function_name}': expected {expected}, found {found}")]
    ArityMismatch {
        function_name: String,
        expected: usize,
        found: usize,
    },

    /// 操作数或实参类型不一致
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// 常量文本与其声明类型不一致（位宽或格式）
    #[error("Constant '{data}' does not agree with its declared type: {message}")]
    ConstantMismatch { data: String, message: String },

    /// 未定义的变量
    #[error("Undefined variable '{0}'")]
    UndefinedVariable(String),

    /// 后端拒绝了生成的 IR
    #[error("Backend error: {0}")]
    BackendError(String),
}

pub type CodegenResult<T> = Result<T, CodegenError>;

impl From<cranelift_module::ModuleError> for CodegenError {
    fn from(error: cranelift_module::ModuleError) -> Self {
        CodegenError::BackendError(error.to_string())
    }
}

impl From<hlang_core::CoreError> for CodegenError {
    fn from(error: hlang_core::CoreError) -> Self {
        CodegenError::TypeResolutionFailure(error.to_string())
    }
}
